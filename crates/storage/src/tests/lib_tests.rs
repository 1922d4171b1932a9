use super::*;
use shared::domain::{AttemptCard, Gender, RecordLift};

fn athlete(id: i64, last_name: &str, lot: u32, group: Option<GroupId>) -> Athlete {
    Athlete {
        id: AthleteId(id),
        first_name: "Test".into(),
        last_name: last_name.into(),
        team: "CLUB".into(),
        gender: Gender::M,
        category: "M73".into(),
        age_groups: vec!["SR".into()],
        body_weight: Some(72.5),
        group,
        start_number: None,
        lot_number: Some(lot),
        snatch: Default::default(),
        clean_jerk: Default::default(),
        previous_lift_time: None,
    }
}

fn record(id: i64, athlete: Option<AthleteId>, attempt: Option<usize>) -> RecordEntry {
    RecordEntry {
        id: RecordId(id),
        federation: "NAT".into(),
        record_name: "National".into(),
        age_group: "SR".into(),
        gender: Gender::M,
        bw_min: 67.0,
        bw_max: 73.0,
        lift: RecordLift::Snatch,
        value: 150,
        holder: "Someone".into(),
        athlete,
        attempt,
        group: None,
        set_at: None,
    }
}

fn storage() -> MemoryStorage {
    let group = GroupId(1);
    MemoryStorage::new(CompetitionData {
        groups: vec![Group {
            id: group,
            name: "M1".into(),
            platform: Some("A".into()),
        }],
        athletes: vec![
            athlete(1, "Zeta", 3, Some(group)),
            athlete(2, "Alpha", 1, Some(group)),
            athlete(3, "Other", 2, None),
        ],
        records: vec![record(7, None, None)],
    })
}

#[test]
fn load_group_returns_only_group_members() {
    let storage = storage();
    let roster = storage.load_group(GroupId(1)).expect("roster");
    assert_eq!(roster.group.name, "M1");
    let mut ids: Vec<_> = roster.athletes.iter().map(|a| a.id.0).collect();
    ids.sort();
    assert_eq!(ids, vec![1, 2]);

    assert!(storage.load_group(GroupId(9)).is_err());
}

#[test]
fn start_numbers_follow_lot_numbers() {
    let storage = storage();
    storage.assign_start_numbers(GroupId(1)).expect("assign");
    assert_eq!(
        storage.load_athlete(AthleteId(2)).expect("athlete").start_number,
        Some(1)
    );
    assert_eq!(
        storage.load_athlete(AthleteId(1)).expect("athlete").start_number,
        Some(2)
    );
    assert_eq!(
        storage.load_athlete(AthleteId(3)).expect("athlete").start_number,
        None
    );
}

#[test]
fn save_athlete_persists_attempts() {
    let storage = storage();
    let mut a = storage.load_athlete(AthleteId(1)).expect("athlete");
    a.snatch[0] = AttemptCard {
        declaration: Some(100),
        actual_lift: Some(100),
        ..Default::default()
    };
    storage.save_athlete(&a).expect("save");
    assert_eq!(
        storage.load_athlete(AthleteId(1)).expect("athlete").best_snatch(),
        100
    );
}

#[test]
fn saved_records_get_fresh_ids_and_can_be_removed_per_attempt() {
    let storage = storage();
    let saved = storage
        .save_record(record(0, Some(AthleteId(1)), Some(2)))
        .expect("save");
    assert_eq!(saved.id, RecordId(8));
    assert_eq!(storage.list_records().expect("records").len(), 2);

    let removed = storage
        .remove_records_for_attempt(AthleteId(1), 2)
        .expect("remove");
    assert_eq!(removed.len(), 1);
    assert_eq!(storage.list_records().expect("records").len(), 1);

    let removed = storage
        .remove_records_for_attempt(AthleteId(1), 2)
        .expect("remove again");
    assert!(removed.is_empty());
}

#[test]
fn json_round_trip_through_file() {
    let storage = storage();
    let path = std::env::temp_dir().join(format!(
        "fop_storage_test_{}.json",
        std::process::id()
    ));
    storage.write_json_file(&path).expect("write");
    let reloaded = MemoryStorage::from_json_file(&path).expect("read");
    assert_eq!(reloaded.groups().expect("groups").len(), 1);
    assert_eq!(reloaded.list_records().expect("records").len(), 1);
    std::fs::remove_file(path).expect("cleanup");
}
