use super::*;
use shared::domain::Gender;

fn athlete(body_weight: f64) -> Athlete {
    let mut a = Athlete {
        id: AthleteId(1),
        first_name: "Lia".into(),
        last_name: "Moreno".into(),
        team: "TEAM".into(),
        gender: Gender::F,
        category: "F64".into(),
        age_groups: vec!["SR".into(), "JR".into()],
        body_weight: Some(body_weight),
        group: Some(GroupId(1)),
        start_number: Some(1),
        lot_number: Some(1),
        snatch: Default::default(),
        clean_jerk: Default::default(),
        previous_lift_time: None,
    };
    a.snatch[0].declaration = Some(95);
    a
}

fn record(id: i64, age_group: &str, lift: RecordLift, value: i32) -> RecordEntry {
    RecordEntry {
        id: RecordId(id),
        federation: "NAT".into(),
        record_name: "National".into(),
        age_group: age_group.into(),
        gender: Gender::F,
        bw_min: 59.0,
        bw_max: 64.0,
        lift,
        value,
        holder: "Holder".into(),
        athlete: None,
        attempt: None,
        group: None,
        set_at: None,
    }
}

fn sample_records() -> Vec<RecordEntry> {
    vec![
        record(1, "SR", RecordLift::Snatch, 100),
        record(2, "SR", RecordLift::CleanJerk, 125),
        record(3, "SR", RecordLift::Total, 222),
        record(4, "JR", RecordLift::Snatch, 94),
        record(5, "YTH", RecordLift::Snatch, 80),
        record(6, "SR", RecordLift::Snatch, 98),
    ]
}

#[test]
fn eligibility_matches_age_group_and_body_weight() {
    let eligible = eligible_records(&sample_records(), &athlete(63.5)).expect("eligible");
    let mut ids: Vec<i64> = eligible.iter().map(|r| r.id.0).collect();
    ids.sort();
    // record 6 is superseded by record 1 for the same definition
    assert_eq!(ids, vec![1, 2, 3, 4]);

    let heavier = eligible_records(&sample_records(), &athlete(64.2)).expect("eligible");
    assert!(heavier.is_empty());
}

#[test]
fn challenged_records_compare_requested_weight() {
    let a = athlete(63.5);
    let eligible = eligible_records(&sample_records(), &a).expect("eligible");
    let challenged: Vec<i64> = challenged_records(&eligible, &a, 95)
        .iter()
        .map(|r| r.id.0)
        .collect();
    assert_eq!(challenged, vec![4]);
    assert!(challenged_records(&eligible, &a, 0).is_empty());
}

#[test]
fn clean_and_jerk_challenges_total() {
    let mut a = athlete(63.5);
    a.snatch[0].actual_lift = Some(100);
    a.snatch[1].actual_lift = Some(-102);
    a.snatch[2].actual_lift = Some(-102);
    let eligible = eligible_records(&sample_records(), &a).expect("eligible");
    let challenged: Vec<RecordLift> = challenged_records(&eligible, &a, 123)
        .iter()
        .map(|r| r.lift)
        .collect();
    assert_eq!(challenged, vec![RecordLift::Total]);
}

#[test]
fn good_lift_creates_new_records() {
    let mut a = athlete(63.5);
    let eligible = eligible_records(&sample_records(), &a).expect("eligible");
    let at = Utc::now();
    a.record_attempt(101, true, at);
    let created = new_records(
        &eligible,
        &a,
        &GoodLift {
            lift: LiftKind::Snatch,
            weight: 101,
            attempt: 0,
            group: Some(GroupId(1)),
            at,
        },
    );
    assert_eq!(created.len(), 2);
    assert!(created.iter().all(|r| r.value == 101 && r.athlete == Some(a.id)));
    assert!(created.iter().all(|r| r.attempt == Some(0)));
}

#[test]
fn malformed_records_are_reported() {
    let mut bad = record(9, "SR", RecordLift::Snatch, 100);
    bad.bw_min = 70.0;
    let err = displayable_records(&[bad], &[athlete(63.5)]).expect_err("invalid");
    assert!(matches!(err, RecordsError::InvalidBounds { .. }));
}

#[test]
fn projection_flags_eligible_and_new_rows() {
    let a = athlete(63.5);
    let records = sample_records();
    let displayable = displayable_records(&records, std::slice::from_ref(&a)).expect("displayable");
    let eligible = eligible_records(&records, &a).expect("eligible");
    let challenged = challenged_records(&eligible, &a, 95);
    let mut participation = BTreeMap::new();
    participation.insert("SR".to_string(), true);
    participation.insert("YTH".to_string(), false);

    let doc = record_projection(
        &displayable,
        &eligible,
        &challenged,
        &[],
        Some(a.id),
        &participation,
    );
    assert_eq!(doc["athlete"], 1);
    assert_eq!(doc["age_groups"]["YTH"], false);
    let rows = doc["records"].as_array().expect("rows");
    assert_eq!(rows.len(), 4);
    assert!(rows
        .iter()
        .any(|row| row["age_group"] == "JR" && row["challenged"] == true));
    assert!(rows.iter().all(|row| row["new"] == false));
}
