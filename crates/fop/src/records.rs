use rules::records::{self, GoodLift};
use serde_json::Value;
use shared::domain::{Athlete, AthleteId, RecordEntry};
use storage::AthleteRepository;
use tracing::warn;

use crate::roster::Roster;

/// Record sets cached for the scoreboards. Failures degrade to "no records".
#[derive(Debug, Default)]
pub struct RecordCache {
    all: Vec<RecordEntry>,
    displayable: Vec<RecordEntry>,
    eligible: Vec<RecordEntry>,
    challenged: Vec<RecordEntry>,
    session: Vec<RecordEntry>,
}

impl RecordCache {
    pub fn refresh_group(&mut self, repo: &dyn AthleteRepository, roster: &Roster) {
        self.all = repo.list_records().unwrap_or_else(|error| {
            warn!(%error, "could not list records");
            Vec::new()
        });
        self.displayable = records::displayable_records(&self.all, roster.athletes())
            .unwrap_or_else(|error| {
                warn!(%error, "invalid record definitions");
                Vec::new()
            });
    }

    pub fn refresh_athlete(&mut self, athlete: Option<&Athlete>) {
        let Some(athlete) = athlete else {
            self.eligible.clear();
            self.challenged.clear();
            return;
        };
        self.eligible = records::eligible_records(&self.all, athlete).unwrap_or_else(|error| {
            warn!(%error, athlete = athlete.id.0, "invalid record definitions");
            Vec::new()
        });
        self.challenged =
            records::challenged_records(&self.eligible, athlete, athlete.next_requested_weight());
    }

    /// Persists the records broken by a good lift and returns them.
    pub fn register_good_lift(
        &mut self,
        repo: &dyn AthleteRepository,
        athlete: &Athlete,
        lift: &GoodLift,
    ) -> Vec<RecordEntry> {
        let eligible = match records::eligible_records(&self.all, athlete) {
            Ok(eligible) => eligible,
            Err(error) => {
                warn!(%error, athlete = athlete.id.0, "invalid record definitions");
                return Vec::new();
            }
        };
        let mut saved = Vec::new();
        for record in records::new_records(&eligible, athlete, lift) {
            match repo.save_record(record) {
                Ok(record) => saved.push(record),
                Err(error) => warn!(%error, athlete = athlete.id.0, "could not save record"),
            }
        }
        self.all.extend(saved.iter().cloned());
        self.session.extend(saved.iter().cloned());
        saved
    }

    /// Drops the records set by one attempt. Returns whether any existed.
    pub fn cancel_attempt(
        &mut self,
        repo: &dyn AthleteRepository,
        athlete: AthleteId,
        attempt: usize,
    ) -> bool {
        let removed = repo
            .remove_records_for_attempt(athlete, attempt)
            .unwrap_or_else(|error| {
                warn!(%error, athlete = athlete.0, attempt, "could not remove records");
                Vec::new()
            });
        let set_by_attempt =
            |r: &RecordEntry| r.athlete == Some(athlete) && r.attempt == Some(attempt);
        self.all.retain(|r| !set_by_attempt(r));
        self.session.retain(|r| !set_by_attempt(r));
        !removed.is_empty()
    }

    pub fn session_records(&self) -> &[RecordEntry] {
        &self.session
    }

    pub fn projection(&self, roster: &Roster, current: Option<AthleteId>) -> Value {
        records::record_projection(
            &self.displayable,
            &self.eligible,
            &self.challenged,
            &self.session,
            current,
            &roster.participation(current),
        )
    }
}
