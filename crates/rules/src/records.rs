use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use shared::domain::{
    Athlete, AthleteId, GroupId, LiftKind, RecordEntry, RecordId, RecordLift,
};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RecordsError {
    #[error("record {id:?} has inverted body-weight bounds ({min} > {max})")]
    InvalidBounds { id: RecordId, min: f64, max: f64 },
    #[error("record {0:?} has a non-positive value")]
    InvalidValue(RecordId),
}

type RecordKey = (String, String, String, String, u64, RecordLift);

fn key(record: &RecordEntry) -> RecordKey {
    (
        record.federation.clone(),
        record.record_name.clone(),
        record.age_group.clone(),
        format!("{:?}", record.gender),
        record.bw_max.to_bits(),
        record.lift,
    )
}

pub fn validate(records: &[RecordEntry]) -> Result<(), RecordsError> {
    for record in records {
        if record.bw_min > record.bw_max {
            return Err(RecordsError::InvalidBounds {
                id: record.id,
                min: record.bw_min,
                max: record.bw_max,
            });
        }
        if record.value <= 0 {
            return Err(RecordsError::InvalidValue(record.id));
        }
    }
    Ok(())
}

/// Keeps the highest value for each record definition; later entries win ties
/// so a record equalled during the session replaces the historical one.
fn current_bests(records: &[RecordEntry]) -> Vec<RecordEntry> {
    let mut best: HashMap<RecordKey, RecordEntry> = HashMap::new();
    for record in records {
        match best.get(&key(record)) {
            Some(existing) if existing.value > record.value => {}
            _ => {
                best.insert(key(record), record.clone());
            }
        }
    }
    let mut out: Vec<RecordEntry> = best.into_values().collect();
    sort_for_display(&mut out);
    out
}

fn sort_for_display(records: &mut [RecordEntry]) {
    records.sort_by(|a, b| {
        a.federation
            .cmp(&b.federation)
            .then_with(|| a.record_name.cmp(&b.record_name))
            .then_with(|| a.age_group.cmp(&b.age_group))
            .then(a.bw_max.total_cmp(&b.bw_max))
            .then((a.lift as u8).cmp(&(b.lift as u8)))
    });
}

fn applies_to(record: &RecordEntry, athlete: &Athlete) -> bool {
    let Some(body_weight) = athlete.body_weight else {
        return false;
    };
    record.gender == athlete.gender
        && athlete.age_groups.iter().any(|g| *g == record.age_group)
        && body_weight > record.bw_min
        && body_weight <= record.bw_max
}

/// Records that concern at least one athlete of the group.
pub fn displayable_records(
    records: &[RecordEntry],
    athletes: &[Athlete],
) -> Result<Vec<RecordEntry>, RecordsError> {
    validate(records)?;
    Ok(current_bests(records)
        .into_iter()
        .filter(|r| athletes.iter().any(|a| applies_to(r, a)))
        .collect())
}

/// Records the athlete could break given gender, age groups and body weight.
pub fn eligible_records(
    records: &[RecordEntry],
    athlete: &Athlete,
) -> Result<Vec<RecordEntry>, RecordsError> {
    validate(records)?;
    Ok(current_bests(records)
        .into_iter()
        .filter(|r| applies_to(r, athlete))
        .collect())
}

fn total_candidate(athlete: &Athlete, lift: LiftKind, weight: i32) -> Option<i32> {
    match lift {
        LiftKind::CleanJerk if athlete.best_snatch() > 0 => {
            Some(athlete.best_snatch() + weight.max(athlete.best_clean_jerk()))
        }
        _ => None,
    }
}

/// Eligible records that `weight` on the athlete's next attempt would break.
pub fn challenged_records(eligible: &[RecordEntry], athlete: &Athlete, weight: i32) -> Vec<RecordEntry> {
    if weight <= 0 {
        return Vec::new();
    }
    let lift = athlete.lift_kind();
    let total = total_candidate(athlete, lift, weight);
    eligible
        .iter()
        .filter(|r| match r.lift {
            RecordLift::Total => total.is_some_and(|t| t > r.value),
            single => single == RecordLift::from(lift) && weight > r.value,
        })
        .cloned()
        .collect()
}

pub struct GoodLift {
    pub lift: LiftKind,
    pub weight: i32,
    pub attempt: usize,
    pub group: Option<GroupId>,
    pub at: DateTime<Utc>,
}

/// New record entries created by a good lift. `athlete` must already carry
/// the lift on its card so the total reflects it.
pub fn new_records(eligible: &[RecordEntry], athlete: &Athlete, lift: &GoodLift) -> Vec<RecordEntry> {
    let total = athlete.total();
    eligible
        .iter()
        .filter_map(|r| {
            let value = match r.lift {
                RecordLift::Total if lift.lift == LiftKind::CleanJerk && total > r.value => total,
                RecordLift::Total => return None,
                single if single == RecordLift::from(lift.lift) && lift.weight > r.value => {
                    lift.weight
                }
                _ => return None,
            };
            Some(RecordEntry {
                id: RecordId(0),
                value,
                holder: athlete.full_name(),
                athlete: Some(athlete.id),
                attempt: Some(lift.attempt),
                group: lift.group,
                set_at: Some(lift.at),
                ..r.clone()
            })
        })
        .collect()
}

fn lift_label(lift: RecordLift) -> &'static str {
    match lift {
        RecordLift::Snatch => "snatch",
        RecordLift::CleanJerk => "clean_jerk",
        RecordLift::Total => "total",
    }
}

/// JSON document consumed by the record boxes of the scoreboards.
pub fn record_projection(
    displayable: &[RecordEntry],
    eligible: &[RecordEntry],
    challenged: &[RecordEntry],
    session_records: &[RecordEntry],
    current: Option<AthleteId>,
    participation: &BTreeMap<String, bool>,
) -> Value {
    let contains = |set: &[RecordEntry], r: &RecordEntry| set.iter().any(|x| key(x) == key(r));
    let rows: Vec<Value> = displayable
        .iter()
        .map(|r| {
            json!({
                "federation": r.federation,
                "record_name": r.record_name,
                "age_group": r.age_group,
                "gender": r.gender,
                "bw_max": r.bw_max,
                "lift": lift_label(r.lift),
                "value": r.value,
                "holder": r.holder,
                "eligible": contains(eligible, r),
                "challenged": contains(challenged, r),
                "new": session_records.iter().any(|x| x.id == r.id),
            })
        })
        .collect();
    json!({
        "athlete": current.map(|id| id.0),
        "age_groups": participation,
        "records": rows,
    })
}

#[cfg(test)]
#[path = "tests/records_tests.rs"]
mod tests;
