use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $name(pub i64);
    };
}

id_newtype!(AthleteId);
id_newtype!(GroupId);
id_newtype!(RecordId);

/// Number of attempts per lift kind.
pub const ATTEMPTS_PER_LIFT: usize = 3;
/// Number of attempts on an athlete card (snatch then clean & jerk).
pub const TOTAL_ATTEMPTS: usize = 2 * ATTEMPTS_PER_LIFT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    F,
    M,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiftKind {
    Snatch,
    CleanJerk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Good,
    Bad,
}

impl Verdict {
    pub fn from_good(good: bool) -> Self {
        if good {
            Verdict::Good
        } else {
            Verdict::Bad
        }
    }

    pub fn is_good(self) -> bool {
        matches!(self, Verdict::Good)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakType {
    BeforeIntroduction,
    FirstSnatch,
    FirstCleanJerk,
    Technical,
    Jury,
    Marshal,
    GroupDone,
}

impl BreakType {
    /// Interruptions pause lifting in the middle of a session; the current
    /// athlete keeps the bar when lifting resumes.
    pub fn is_interruption(self) -> bool {
        matches!(
            self,
            BreakType::Technical | BreakType::Jury | BreakType::Marshal
        )
    }

    /// Countdown breaks end with lifting starting on their own.
    pub fn starts_lifting_on_expiry(self) -> bool {
        matches!(self, BreakType::FirstSnatch | BreakType::FirstCleanJerk)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CeremonyType {
    Introduction,
    OfficialsIntroduction,
    Medals,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountdownType {
    Duration,
    Target,
    Indefinite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FopState {
    Inactive,
    Break,
    CurrentAthleteDisplayed,
    TimeRunning,
    TimeStopped,
    DownSignalVisible,
    DecisionVisible,
}

impl FopState {
    pub fn is_lifting(self) -> bool {
        !matches!(self, FopState::Inactive | FopState::Break)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptCard {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declaration: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change1: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change2: Option<i32>,
    /// Positive for a good lift, negative for a failed one, zero when the
    /// attempt was withdrawn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_lift: Option<i32>,
}

impl AttemptCard {
    pub fn requested(&self) -> Option<i32> {
        self.change2.or(self.change1).or(self.declaration)
    }

    pub fn is_done(&self) -> bool {
        self.actual_lift.is_some()
    }

    pub fn is_good(&self) -> bool {
        self.actual_lift.is_some_and(|v| v > 0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Athlete {
    pub id: AthleteId,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub team: String,
    pub gender: Gender,
    pub category: String,
    #[serde(default)]
    pub age_groups: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<GroupId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lot_number: Option<u32>,
    #[serde(default)]
    pub snatch: [AttemptCard; ATTEMPTS_PER_LIFT],
    #[serde(default)]
    pub clean_jerk: [AttemptCard; ATTEMPTS_PER_LIFT],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_lift_time: Option<DateTime<Utc>>,
}

impl Athlete {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.last_name.to_uppercase(), self.first_name)
    }

    /// Card for an attempt index in `0..TOTAL_ATTEMPTS`.
    pub fn card(&self, index: usize) -> &AttemptCard {
        if index < ATTEMPTS_PER_LIFT {
            &self.snatch[index]
        } else {
            &self.clean_jerk[index - ATTEMPTS_PER_LIFT]
        }
    }

    pub fn card_mut(&mut self, index: usize) -> &mut AttemptCard {
        if index < ATTEMPTS_PER_LIFT {
            &mut self.snatch[index]
        } else {
            &mut self.clean_jerk[index - ATTEMPTS_PER_LIFT]
        }
    }

    fn cards(&self) -> impl Iterator<Item = &AttemptCard> {
        self.snatch.iter().chain(self.clean_jerk.iter())
    }

    pub fn attempts_done(&self) -> usize {
        self.cards().take_while(|card| card.is_done()).count()
    }

    pub fn is_done(&self) -> bool {
        self.attempts_done() >= TOTAL_ATTEMPTS
    }

    pub fn snatch_done(&self) -> bool {
        self.attempts_done() >= ATTEMPTS_PER_LIFT
    }

    /// 1-based attempt number over the whole card (1..=6).
    pub fn attempt_number(&self) -> usize {
        (self.attempts_done() + 1).min(TOTAL_ATTEMPTS)
    }

    /// 1-based attempt number within the current lift kind (1..=3).
    pub fn attempt_in_lift(&self) -> usize {
        (self.attempt_number() - 1) % ATTEMPTS_PER_LIFT + 1
    }

    pub fn lift_kind(&self) -> LiftKind {
        if self.attempts_done() < ATTEMPTS_PER_LIFT {
            LiftKind::Snatch
        } else {
            LiftKind::CleanJerk
        }
    }

    /// Weight the athlete will take next: the latest change or declaration,
    /// else the automatic progression from the previous attempt of the same
    /// lift kind.
    pub fn next_requested_weight(&self) -> i32 {
        let done = self.attempts_done();
        if done >= TOTAL_ATTEMPTS {
            return 0;
        }
        self.requested_weight(done)
    }

    pub fn requested_weight(&self, index: usize) -> i32 {
        if let Some(requested) = self.card(index).requested() {
            return requested;
        }
        if index % ATTEMPTS_PER_LIFT == 0 {
            return 0;
        }
        match self.card(index - 1).actual_lift {
            Some(lift) if lift > 0 => lift + 1,
            Some(lift) if lift < 0 => -lift,
            _ => self.requested_weight(index - 1),
        }
    }

    /// Records the result of the next attempt; returns the attempt index.
    pub fn record_attempt(&mut self, weight: i32, good: bool, at: DateTime<Utc>) -> Option<usize> {
        let index = self.attempts_done();
        if index >= TOTAL_ATTEMPTS {
            return None;
        }
        self.card_mut(index).actual_lift = Some(if good { weight } else { -weight });
        self.previous_lift_time = Some(at);
        Some(index)
    }

    pub fn best_snatch(&self) -> i32 {
        best_of(&self.snatch)
    }

    pub fn best_clean_jerk(&self) -> i32 {
        best_of(&self.clean_jerk)
    }

    pub fn total(&self) -> i32 {
        let (snatch, clean_jerk) = (self.best_snatch(), self.best_clean_jerk());
        if snatch > 0 && clean_jerk > 0 {
            snatch + clean_jerk
        } else {
            0
        }
    }

    pub fn best_of_lift(&self, lift: LiftKind) -> i32 {
        match lift {
            LiftKind::Snatch => self.best_snatch(),
            LiftKind::CleanJerk => self.best_clean_jerk(),
        }
    }
}

fn best_of(cards: &[AttemptCard]) -> i32 {
    cards
        .iter()
        .filter_map(|card| card.actual_lift)
        .filter(|lift| *lift > 0)
        .max()
        .unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordLift {
    Snatch,
    CleanJerk,
    Total,
}

impl From<LiftKind> for RecordLift {
    fn from(value: LiftKind) -> Self {
        match value {
            LiftKind::Snatch => RecordLift::Snatch,
            LiftKind::CleanJerk => RecordLift::CleanJerk,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordEntry {
    pub id: RecordId,
    pub federation: String,
    pub record_name: String,
    pub age_group: String,
    pub gender: Gender,
    /// Exclusive lower body-weight bound of the category.
    pub bw_min: f64,
    /// Inclusive upper body-weight bound of the category.
    pub bw_max: f64,
    pub lift: RecordLift,
    pub value: i32,
    pub holder: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub athlete: Option<AthleteId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<GroupId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_at: Option<DateTime<Utc>>,
}
