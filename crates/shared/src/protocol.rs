use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    domain::{
        AthleteId, BreakType, CeremonyType, CountdownType, FopState, GroupId, LiftKind, Verdict,
    },
    error::Notification,
};

/// Actor that caused an input event. Displays use it to ignore their own
/// echoes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Origin {
    Session(Uuid),
    Device(String),
    Timer,
    Controller,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum FopEventKind {
    BreakStarted {
        break_type: BreakType,
        countdown: CountdownType,
        #[serde(default)]
        remaining_ms: Option<i64>,
        #[serde(default)]
        target: Option<DateTime<Utc>>,
    },
    BreakDone,
    BreakPaused {
        #[serde(default)]
        remaining_ms: Option<i64>,
    },
    /// `generation` identifies the break run that scheduled the expiry.
    BreakTimeOver {
        generation: u64,
    },
    CeremonyStarted {
        ceremony: CeremonyType,
        #[serde(default)]
        group: Option<GroupId>,
        #[serde(default)]
        category: Option<String>,
    },
    CeremonyDone {
        ceremony: CeremonyType,
    },
    StartLifting,
    SwitchGroup {
        #[serde(default)]
        group: Option<GroupId>,
    },
    TimeStarted,
    TimeStopped,
    TimeOver,
    ForceTime {
        ms: i64,
    },
    DecisionUpdate {
        ref_index: usize,
        verdict: Verdict,
        #[serde(default)]
        at_ms: Option<i64>,
    },
    DecisionFullUpdate {
        verdicts: [Option<Verdict>; 3],
        #[serde(default)]
        times: [Option<i64>; 3],
        #[serde(default)]
        immediate: bool,
    },
    ExplicitDecision {
        verdict: Verdict,
        #[serde(default)]
        verdicts: [Option<Verdict>; 3],
    },
    DecisionReset,
    DownSignal,
    JuryDecision {
        verdict: Verdict,
        #[serde(default)]
        from_jury_button: bool,
    },
    JuryMemberDecisionUpdate {
        index: usize,
        verdict: Verdict,
    },
    /// 0 summons all referees, 1 to 3 a single referee, 4 the technical
    /// controller.
    SummonReferee {
        index: usize,
    },
    WeightChange {
        athlete: AthleteId,
        #[serde(default)]
        result_change: bool,
    },
    BarbellOrPlatesChanged,
    RevealDecision {
        cycle: u64,
    },
    RefereeReminder {
        cycle: u64,
    },
    RefereeReminderTimeout {
        cycle: u64,
    },
    JuryReveal {
        cycle: u64,
    },
    ClockWarning {
        seconds: u32,
    },
}

impl FopEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            FopEventKind::BreakStarted { .. } => "break_started",
            FopEventKind::BreakDone => "break_done",
            FopEventKind::BreakPaused { .. } => "break_paused",
            FopEventKind::BreakTimeOver { .. } => "break_time_over",
            FopEventKind::CeremonyStarted { .. } => "ceremony_started",
            FopEventKind::CeremonyDone { .. } => "ceremony_done",
            FopEventKind::StartLifting => "start_lifting",
            FopEventKind::SwitchGroup { .. } => "switch_group",
            FopEventKind::TimeStarted => "time_started",
            FopEventKind::TimeStopped => "time_stopped",
            FopEventKind::TimeOver => "time_over",
            FopEventKind::ForceTime { .. } => "force_time",
            FopEventKind::DecisionUpdate { .. } => "decision_update",
            FopEventKind::DecisionFullUpdate { .. } => "decision_full_update",
            FopEventKind::ExplicitDecision { .. } => "explicit_decision",
            FopEventKind::DecisionReset => "decision_reset",
            FopEventKind::DownSignal => "down_signal",
            FopEventKind::JuryDecision { .. } => "jury_decision",
            FopEventKind::JuryMemberDecisionUpdate { .. } => "jury_member_decision_update",
            FopEventKind::SummonReferee { .. } => "summon_referee",
            FopEventKind::WeightChange { .. } => "weight_change",
            FopEventKind::BarbellOrPlatesChanged => "barbell_or_plates_changed",
            FopEventKind::RevealDecision { .. } => "reveal_decision",
            FopEventKind::RefereeReminder { .. } => "referee_reminder",
            FopEventKind::RefereeReminderTimeout { .. } => "referee_reminder_timeout",
            FopEventKind::JuryReveal { .. } => "jury_reveal",
            FopEventKind::ClockWarning { .. } => "clock_warning",
        }
    }

    /// Events whose effect depends on repository state rather than on their
    /// payload. Two in a row are two real changes.
    pub fn is_repeatable(&self) -> bool {
        matches!(
            self,
            FopEventKind::WeightChange { .. } | FopEventKind::BarbellOrPlatesChanged
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FopEvent {
    pub kind: FopEventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub athlete: Option<AthleteId>,
    pub origin: Origin,
    pub at: DateTime<Utc>,
}

impl FopEvent {
    pub fn new(kind: FopEventKind, origin: Origin) -> Self {
        Self {
            kind,
            athlete: None,
            origin,
            at: Utc::now(),
        }
    }

    pub fn with_athlete(mut self, athlete: AthleteId) -> Self {
        self.athlete = Some(athlete);
        self
    }

    /// Identity used for consecutive-duplicate suppression; the timestamp is
    /// deliberately left out.
    pub fn dedup_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.kind.hash(&mut hasher);
        self.athlete.hash(&mut hasher);
        self.origin.hash(&mut hasher);
        hasher.finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AthleteSummary {
    pub id: AthleteId,
    pub name: String,
    pub team: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_number: Option<u32>,
    pub attempt_number: usize,
    pub lift_kind: LiftKind,
    pub requested_weight: i32,
    pub done: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    FirstWarning,
    FinalWarning,
    TimeOver,
    Down,
    BreakOver,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<AthleteSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<AthleteSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<AthleteSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changing: Option<AthleteSummary>,
    pub lifting_order: Vec<AthleteSummary>,
    pub display_order: Vec<AthleteSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum UiEvent {
    LiftingOrderUpdated {
        order: OrderSnapshot,
        remaining_ms: i64,
        display_affected: bool,
        display_toggle: bool,
        in_break: bool,
        #[serde(default)]
        new_weight: Option<i32>,
    },
    BreakStarted {
        break_type: BreakType,
        countdown: CountdownType,
        #[serde(default)]
        remaining_ms: Option<i64>,
        #[serde(default)]
        target: Option<DateTime<Utc>>,
    },
    BreakPaused {
        break_type: Option<BreakType>,
        #[serde(default)]
        remaining_ms: Option<i64>,
    },
    BreakDone {
        break_type: Option<BreakType>,
    },
    Decision {
        athlete: Option<AthleteId>,
        good_lift: bool,
        verdicts: [Option<Verdict>; 3],
    },
    DecisionReset {
        athlete: Option<AthleteId>,
    },
    DownSignal {
        athlete: Option<AthleteId>,
    },
    /// `voted` hides the individual verdicts until every configured jury
    /// member has voted and the settle delay elapsed.
    JuryUpdate {
        voted: Vec<bool>,
        #[serde(default)]
        revealed: Option<JuryVerdict>,
    },
    JuryNotification {
        athlete: AthleteId,
        good_lift: bool,
        reversal: bool,
        records_cancelled: bool,
    },
    SummonRef {
        index: usize,
    },
    /// `referee` is 1-based.
    WakeUpRef {
        referee: usize,
        on: bool,
    },
    GroupDone {
        group: Option<GroupId>,
    },
    CeremonyStarted {
        ceremony: CeremonyType,
        #[serde(default)]
        group: Option<GroupId>,
        #[serde(default)]
        category: Option<String>,
    },
    CeremonyDone {
        ceremony: CeremonyType,
    },
    Notification(Notification),
    SetTime {
        athlete: Option<AthleteId>,
        remaining_ms: i64,
    },
    StartTime {
        athlete: Option<AthleteId>,
        remaining_ms: i64,
    },
    StopTime {
        athlete: Option<AthleteId>,
        remaining_ms: i64,
    },
    ResetOnNewClock {
        athlete: Option<AthleteId>,
    },
    RecordsUpdated {
        records: serde_json::Value,
    },
    Tone {
        tone: Tone,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JuryVerdict {
    pub members: Vec<Option<Verdict>>,
    pub good_lift: bool,
    pub unanimous: bool,
}

/// Point-in-time view of a field of play, used by displays that connect
/// mid-session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FopSnapshot {
    pub platform: String,
    pub state: FopState,
    #[serde(default)]
    pub break_type: Option<BreakType>,
    #[serde(default)]
    pub ceremony_type: Option<CeremonyType>,
    #[serde(default)]
    pub group: Option<GroupId>,
    pub order: OrderSnapshot,
    pub athlete_remaining_ms: i64,
    #[serde(default)]
    pub break_remaining_ms: Option<i64>,
    pub verdicts: [Option<Verdict>; 3],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_hash_ignores_timestamp() {
        let a = FopEvent::new(FopEventKind::TimeStarted, Origin::Device("clock".into()));
        let mut b = a.clone();
        b.at = a.at + chrono::Duration::seconds(5);
        assert_eq!(a.dedup_hash(), b.dedup_hash());

        let c = FopEvent::new(FopEventKind::TimeStarted, Origin::Controller);
        assert_ne!(a.dedup_hash(), c.dedup_hash());
    }

    #[test]
    fn repository_backed_events_are_repeatable() {
        assert!(FopEventKind::WeightChange {
            athlete: AthleteId(2),
            result_change: false
        }
        .is_repeatable());
        assert!(FopEventKind::BarbellOrPlatesChanged.is_repeatable());
        assert!(!FopEventKind::TimeStarted.is_repeatable());
        assert!(!FopEventKind::BreakTimeOver { generation: 3 }.is_repeatable());
    }

    #[test]
    fn input_events_use_tagged_json() {
        let kind: FopEventKind = serde_json::from_value(serde_json::json!({
            "type": "decision_update",
            "payload": { "ref_index": 1, "verdict": "good" }
        }))
        .expect("decode");
        assert_eq!(
            kind,
            FopEventKind::DecisionUpdate {
                ref_index: 1,
                verdict: Verdict::Good,
                at_ms: None
            }
        );
    }
}
