//! Field-of-play state machine.
//!
//! One [`FieldOfPlay`] drives one competition platform: it interprets input
//! events one at a time, keeps the athlete and break clocks, aggregates
//! referee and jury decisions and publishes [`UiEvent`]s for the displays.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use rules::records::GoodLift;
use shared::{
    domain::{
        AthleteId, BreakType, CeremonyType, CountdownType, FopState, GroupId, LiftKind, Verdict,
        ATTEMPTS_PER_LIFT,
    },
    error::{FopError, Notification, NotificationLevel},
    protocol::{FopEvent, FopEventKind, FopSnapshot, OrderSnapshot, Tone, UiEvent},
};
use storage::AthleteRepository;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::{
    break_timer::BreakTimer,
    config::FopConfig,
    decisions::{JuryDecisions, RefereeDecisions, REFEREES},
    records::RecordCache,
    roster::Roster,
    scheduler::{ManualScheduler, Scheduler, Task},
    timer::{AthleteTimer, FINAL_WARNING_SECONDS, FIRST_WARNING_SECONDS},
    tone::ToneSink,
};

/// Time allowed for an attempt.
pub const STANDARD_TIME_MS: i64 = 60_000;
/// Time allowed when an athlete follows their own previous attempt.
pub const CONSECUTIVE_TIME_MS: i64 = 120_000;

/// Referee slot index reserved for the technical controller in summons.
const TECHNICAL_CONTROLLER: usize = 4;

const REFEREE_TASKS: [Task; 3] = [
    Task::RevealDecision,
    Task::RefereeReminder,
    Task::RefereeReminderTimeout,
];

#[derive(Debug, Clone, PartialEq)]
struct BreakRequest {
    break_type: BreakType,
    countdown: CountdownType,
    remaining_ms: Option<i64>,
    target: Option<DateTime<Utc>>,
}

impl BreakRequest {
    fn indefinite(break_type: BreakType) -> Self {
        Self {
            break_type,
            countdown: CountdownType::Indefinite,
            remaining_ms: None,
            target: None,
        }
    }
}

/// Last lift shown to the platform, kept for jury review.
#[derive(Debug, Clone, Copy)]
struct LastLift {
    athlete: AthleteId,
    attempt: usize,
    weight: i32,
    good: bool,
}

#[derive(Debug, Default)]
struct OrderUpdate {
    changing: Option<AthleteId>,
    display_affected: bool,
    display_toggle: bool,
    new_weight: Option<i32>,
}

impl OrderUpdate {
    fn affected() -> Self {
        Self {
            display_affected: true,
            ..Self::default()
        }
    }

    fn changing(athlete: AthleteId) -> Self {
        Self {
            changing: Some(athlete),
            ..Self::default()
        }
    }
}

pub struct FieldOfPlay<S: Scheduler + 'static> {
    platform: String,
    config: FopConfig,
    repo: Arc<dyn AthleteRepository>,
    scheduler: S,
    tones: Box<dyn ToneSink>,
    events: broadcast::Sender<UiEvent>,

    state: FopState,
    break_type: Option<BreakType>,
    ceremony_type: Option<CeremonyType>,
    roster: Roster,
    cur_athlete: Option<AthleteId>,
    previous_athlete: Option<AthleteId>,
    clock_owner: Option<AthleteId>,
    athlete_timer: AthleteTimer,
    break_timer: BreakTimer,
    decisions: RefereeDecisions,
    jury: JuryDecisions,
    records: RecordCache,
    deferred_break: Option<BreakRequest>,
    forced_time: Option<i64>,
    last_lift: Option<LastLift>,
    clean_jerk_break_done: bool,
    last_event: Option<u64>,
    tone_failure_reported: bool,
}

impl<S: Scheduler + 'static> FieldOfPlay<S> {
    pub fn new(
        platform: impl Into<String>,
        config: FopConfig,
        repo: Arc<dyn AthleteRepository>,
        scheduler: S,
        tones: Box<dyn ToneSink>,
        events: broadcast::Sender<UiEvent>,
    ) -> Self {
        let jury = JuryDecisions::new(config.jury_size());
        Self {
            platform: platform.into(),
            config,
            repo,
            scheduler,
            tones,
            events,
            state: FopState::Inactive,
            break_type: None,
            ceremony_type: None,
            roster: Roster::default(),
            cur_athlete: None,
            previous_athlete: None,
            clock_owner: None,
            athlete_timer: AthleteTimer::new(),
            break_timer: BreakTimer::new(),
            decisions: RefereeDecisions::new(),
            jury,
            records: RecordCache::default(),
            deferred_break: None,
            forced_time: None,
            last_lift: None,
            clean_jerk_break_done: false,
            last_event: None,
            tone_failure_reported: false,
        }
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    pub fn state(&self) -> FopState {
        self.state
    }

    pub fn break_type(&self) -> Option<BreakType> {
        self.break_type
    }

    pub fn ceremony_type(&self) -> Option<CeremonyType> {
        self.ceremony_type
    }

    pub fn current_athlete(&self) -> Option<AthleteId> {
        self.cur_athlete
    }

    pub fn previous_athlete(&self) -> Option<AthleteId> {
        self.previous_athlete
    }

    pub fn clock_owner(&self) -> Option<AthleteId> {
        self.clock_owner
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.events.subscribe()
    }

    pub fn athlete_remaining_ms(&self) -> i64 {
        self.athlete_timer.live_remaining(self.scheduler.now())
    }

    pub fn break_remaining_ms(&self) -> Option<i64> {
        self.break_timer.live_remaining(&self.scheduler)
    }

    pub fn snapshot(&self) -> FopSnapshot {
        FopSnapshot {
            platform: self.platform.clone(),
            state: self.state,
            break_type: self.break_type,
            ceremony_type: self.ceremony_type,
            group: self.roster.group_id(),
            order: self.order_snapshot(None),
            athlete_remaining_ms: self.athlete_remaining_ms(),
            break_remaining_ms: if self.state == FopState::Break {
                self.break_remaining_ms()
            } else {
                None
            },
            verdicts: self.decisions.snapshot(),
        }
    }

    /// Single entry point. Failures never escape: they are logged, reported
    /// as an ERROR notification and the state tags are restored. A failed
    /// event is not remembered, so the same event may be retried.
    pub fn handle(&mut self, event: FopEvent) {
        let hash = (!event.kind.is_repeatable()).then(|| event.dedup_hash());
        let name = event.kind.name();
        if hash.is_some() && self.last_event == hash {
            debug!(platform = %self.platform, event = name, "duplicate event dropped");
            return;
        }

        let (state, break_type) = (self.state, self.break_type);
        debug!(platform = %self.platform, ?state, event = name, origin = ?event.origin, "handling event");
        match self.dispatch(event) {
            Ok(()) => self.last_event = hash,
            Err(err) => {
                match err {
                    FopError::UnexpectedEvent { .. } => {
                        warn!(platform = %self.platform, ?state, event = name, "{err}")
                    }
                    _ => error!(platform = %self.platform, ?state, event = name, "{err}"),
                }
                self.last_event = None;
                self.state = state;
                self.break_type = break_type;
                self.publish(UiEvent::Notification(err.to_notification()));
            }
        }
    }

    fn dispatch(&mut self, event: FopEvent) -> Result<(), FopError> {
        use FopEventKind as E;
        use FopState::*;

        match (self.state, event.kind) {
            (_, E::BreakStarted { break_type, countdown, remaining_ms, target }) => {
                self.request_break(BreakRequest {
                    break_type,
                    countdown,
                    remaining_ms,
                    target,
                });
                Ok(())
            }
            (_, E::SummonReferee { index }) => self.summon(index),
            (_, E::StartLifting) => self.start_lifting(),
            (_, E::SwitchGroup { group }) => self.switch_group(group),

            (_, E::WeightChange { athlete, result_change }) => {
                self.weight_change(athlete, result_change)
            }
            (_, E::BarbellOrPlatesChanged) => {
                self.publish_order(OrderUpdate::default());
                Ok(())
            }
            (_, E::ForceTime { ms }) => {
                self.force_time(ms);
                Ok(())
            }
            (_, E::ClockWarning { seconds }) => {
                self.clock_warning(seconds);
                Ok(())
            }
            (_, E::RevealDecision { cycle }) => {
                self.reveal(cycle);
                Ok(())
            }
            (_, E::RefereeReminder { cycle }) => {
                self.referee_reminder(cycle);
                Ok(())
            }
            (_, E::RefereeReminderTimeout { cycle }) => {
                if cycle == self.decisions.cycle() {
                    self.retract_reminder();
                }
                Ok(())
            }
            (_, E::JuryMemberDecisionUpdate { index, verdict }) => {
                self.jury_member_update(index, verdict)
            }
            (_, E::JuryReveal { cycle }) => {
                self.jury_reveal(cycle);
                Ok(())
            }
            (_, E::JuryDecision { verdict, from_jury_button }) => {
                self.jury_decision(verdict, from_jury_button)
            }

            (Inactive | Break, E::CeremonyStarted { ceremony, group, category }) => {
                info!(platform = %self.platform, ?ceremony, "ceremony started");
                self.ceremony_type = Some(ceremony);
                self.publish(UiEvent::CeremonyStarted {
                    ceremony,
                    group,
                    category,
                });
                Ok(())
            }
            (Inactive | Break, E::CeremonyDone { ceremony }) => {
                if self.ceremony_type == Some(ceremony) {
                    self.ceremony_type = None;
                }
                self.publish(UiEvent::CeremonyDone { ceremony });
                Ok(())
            }

            (Break, E::BreakPaused { remaining_ms }) => {
                self.pause_break(remaining_ms);
                Ok(())
            }
            (Break, E::BreakDone) => self.start_lifting(),
            (Break, E::BreakTimeOver { generation }) => self.break_time_over(generation),
            (_, E::BreakTimeOver { .. }) => {
                debug!(platform = %self.platform, "break expiry outside a break dropped");
                Ok(())
            }
            (Break, E::DecisionReset) => {
                self.clear_lights();
                Ok(())
            }
            (DecisionVisible, E::DecisionReset) => {
                self.decision_reset();
                Ok(())
            }
            (DownSignalVisible, E::DecisionReset) => {
                self.clear_stuck_decision();
                Ok(())
            }
            (CurrentAthleteDisplayed | TimeRunning | TimeStopped, E::DecisionReset) => {
                debug!(platform = %self.platform, "no decision to reset");
                Ok(())
            }

            (CurrentAthleteDisplayed | TimeStopped, E::TimeStarted) => self.start_time(),
            (TimeRunning, E::TimeStarted) => Ok(()),
            (TimeRunning, E::TimeStopped) => {
                self.stop_time();
                Ok(())
            }
            (
                CurrentAthleteDisplayed | TimeStopped | DownSignalVisible | DecisionVisible,
                E::TimeStopped,
            ) => Ok(()),
            (TimeRunning, E::TimeOver) => {
                self.time_over();
                Ok(())
            }
            (_, E::TimeOver) => {
                debug!(platform = %self.platform, "time over while clock stopped dropped");
                Ok(())
            }

            (
                CurrentAthleteDisplayed | TimeRunning | TimeStopped | DownSignalVisible,
                E::DecisionUpdate { ref_index, verdict, at_ms },
            ) => self.referee_update(ref_index, verdict, at_ms),
            (
                CurrentAthleteDisplayed | TimeRunning | TimeStopped | DownSignalVisible,
                E::DecisionFullUpdate { verdicts, times, immediate },
            ) => self.referee_full_update(verdicts, times, immediate),
            (DecisionVisible, E::DecisionUpdate { .. } | E::DecisionFullUpdate { .. }) => {
                debug!(platform = %self.platform, "late referee update dropped");
                Ok(())
            }
            (TimeRunning | TimeStopped, E::DownSignal) => {
                self.emit_down();
                Ok(())
            }
            (DownSignalVisible | DecisionVisible, E::DownSignal) => Ok(()),
            (
                CurrentAthleteDisplayed | TimeRunning | TimeStopped | DownSignalVisible,
                E::ExplicitDecision { verdict, verdicts },
            ) => self.explicit_decision(verdict, verdicts),

            (state, kind) => Err(FopError::UnexpectedEvent {
                state,
                event: kind.name(),
            }),
        }
    }

    fn publish(&self, event: UiEvent) {
        // no subscribers is not an error
        let _ = self.events.send(event);
    }

    fn set_state(&mut self, state: FopState) {
        if self.state != state {
            info!(platform = %self.platform, from = ?self.state, to = ?state, "state change");
            self.state = state;
        }
    }

    fn order_snapshot(&self, changing: Option<AthleteId>) -> OrderSnapshot {
        let summary = |id: Option<AthleteId>| id.and_then(|id| self.roster.summary(id));
        OrderSnapshot {
            current: summary(self.cur_athlete),
            next: summary(self.roster.next_after(self.cur_athlete)),
            previous: summary(self.previous_athlete),
            changing: summary(changing),
            lifting_order: self.roster.summaries(self.roster.lifting_order()),
            display_order: self.roster.summaries(self.roster.display_order()),
        }
    }

    fn publish_order(&self, update: OrderUpdate) {
        self.publish(UiEvent::LiftingOrderUpdated {
            order: self.order_snapshot(update.changing),
            remaining_ms: self.athlete_remaining_ms(),
            display_affected: update.display_affected,
            display_toggle: update.display_toggle,
            in_break: self.state == FopState::Break,
            new_weight: update.new_weight,
        });
    }

    fn publish_records(&self) {
        self.publish(UiEvent::RecordsUpdated {
            records: self.records.projection(&self.roster, self.cur_athlete),
        });
    }

    fn play(&mut self, tone: Tone) {
        self.publish(UiEvent::Tone { tone });
        if let Err(error) = self.tones.play(tone) {
            warn!(platform = %self.platform, ?tone, %error, "tone output unavailable");
            if !std::mem::replace(&mut self.tone_failure_reported, true) {
                self.publish(UiEvent::Notification(Notification::new(
                    NotificationLevel::Warning,
                    "Sound.Unavailable",
                )));
            }
        }
    }

    fn stop_athlete_clock(&mut self) {
        if self.athlete_timer.is_running() {
            let remaining_ms = self.athlete_timer.stop(&mut self.scheduler);
            self.publish(UiEvent::StopTime {
                athlete: self.cur_athlete,
                remaining_ms,
            });
        }
    }

    // ---- groups and lifting order

    fn load_roster(&mut self, group: GroupId) -> Result<(), FopError> {
        let loaded = self.repo.load_group(group).map_err(|error| {
            warn!(platform = %self.platform, group = group.0, %error, "could not load group");
            FopError::Repository(error)
        })?;
        let same_group = self.roster.group_id() == Some(group);
        self.roster = Roster::load(loaded);
        if !same_group {
            self.clean_jerk_break_done = self.roster.all_snatch_done();
            self.previous_athlete = None;
            self.last_lift = None;
            self.deferred_break = None;
        }
        if self.cur_athlete.is_some_and(|id| self.roster.get(id).is_none()) {
            self.cur_athlete = None;
            self.clock_owner = None;
        }
        self.records.refresh_group(self.repo.as_ref(), &self.roster);
        info!(
            platform = %self.platform,
            group = group.0,
            athletes = self.roster.len(),
            "group loaded"
        );
        Ok(())
    }

    fn switch_group(&mut self, group: Option<GroupId>) -> Result<(), FopError> {
        if let Some(group) = group {
            if self.roster.group_id() == Some(group) {
                self.load_roster(group)?;
                self.publish_order(OrderUpdate::affected());
                self.publish_records();
                return Ok(());
            }
            self.load_roster(group)?;
        } else {
            self.roster = Roster::default();
            info!(platform = %self.platform, "group unloaded");
        }

        self.scheduler.cancel_all(&REFEREE_TASKS);
        self.scheduler.cancel(Task::DecisionReset);
        self.scheduler.cancel(Task::JuryReveal);
        self.athlete_timer.stop(&mut self.scheduler);
        self.decisions.reset();
        self.jury.reset();
        self.previous_athlete = None;
        self.clock_owner = None;
        self.cur_athlete = self.roster.first_to_lift();
        if self.state != FopState::Break {
            self.break_type = None;
            self.set_state(FopState::Inactive);
        }
        self.records.refresh_athlete(self.cur_athlete.and_then(|id| self.roster.get(id)));
        self.publish_order(OrderUpdate::affected());
        self.publish_records();
        Ok(())
    }

    /// Shows the first athlete of the lifting order with a fresh clock, or
    /// closes the group when nobody has attempts left.
    fn display_next_athlete(&mut self, changing: Option<AthleteId>) {
        self.roster.recompute();
        let Some(next) = self.roster.first_to_lift() else {
            self.group_done();
            return;
        };
        if self.cur_athlete != Some(next) {
            self.clock_owner = None;
        }
        self.cur_athlete = Some(next);
        self.new_clock_cycle();
        self.set_state(FopState::CurrentAthleteDisplayed);
        self.publish_order(OrderUpdate {
            changing,
            ..OrderUpdate::affected()
        });
    }

    fn group_done(&mut self) {
        self.scheduler.cancel_all(&REFEREE_TASKS);
        self.scheduler.cancel(Task::DecisionReset);
        self.deferred_break = None;
        self.stop_athlete_clock();
        self.cur_athlete = None;
        self.clock_owner = None;
        self.break_timer.set_indefinite(&mut self.scheduler);
        self.break_type = Some(BreakType::GroupDone);
        self.set_state(FopState::Break);
        let group = self.roster.group_id();
        info!(platform = %self.platform, group = ?group.map(|g| g.0), "group done");
        self.publish(UiEvent::GroupDone { group });
        self.publish(UiEvent::BreakStarted {
            break_type: BreakType::GroupDone,
            countdown: CountdownType::Indefinite,
            remaining_ms: None,
            target: None,
        });
        self.publish_order(OrderUpdate::default());
    }

    fn weight_change(&mut self, athlete_id: AthleteId, result_change: bool) -> Result<(), FopError> {
        if self.roster.get(athlete_id).is_none() {
            return Err(FopError::UnknownAthlete(athlete_id));
        }
        let was_done = self.roster.get(athlete_id).is_some_and(|a| a.is_done());
        let group_was_closed = self.roster.first_to_lift().is_none();
        let athlete = self.repo.load_athlete(athlete_id)?;
        let withdrew_last = result_change && athlete.clean_jerk[ATTEMPTS_PER_LIFT - 1].actual_lift == Some(0);
        let new_weight = athlete.next_requested_weight();
        self.roster.replace(athlete)?;
        self.roster.recompute();

        if withdrew_last && self.state.is_lifting() && self.roster.all_done() {
            info!(platform = %self.platform, athlete = athlete_id.0, "last attempt withdrawn, closing group");
            self.group_done();
            return Ok(());
        }

        let is_current = self.cur_athlete == Some(athlete_id);
        match self.state {
            FopState::Inactive | FopState::DecisionVisible => {
                self.publish_order(OrderUpdate::changing(athlete_id));
            }
            FopState::Break => {
                let reopened = was_done
                    && group_was_closed
                    && self.roster.get(athlete_id).is_some_and(|a| !a.is_done());
                if self.break_type == Some(BreakType::GroupDone) && reopened {
                    info!(platform = %self.platform, athlete = athlete_id.0, "result edit reopens the group");
                    self.leave_break();
                    self.display_next_athlete(Some(athlete_id));
                } else {
                    self.publish_order(OrderUpdate::changing(athlete_id));
                }
            }
            FopState::CurrentAthleteDisplayed => {
                self.redisplay_after_change(athlete_id, new_weight);
            }
            FopState::TimeRunning | FopState::TimeStopped => {
                if is_current || self.clock_owner == Some(athlete_id) {
                    if self.athlete_timer.is_running() {
                        self.stop_athlete_clock();
                        self.set_state(FopState::TimeStopped);
                    }
                    self.redisplay_after_change(athlete_id, new_weight);
                } else {
                    self.publish_order(OrderUpdate::changing(athlete_id));
                }
            }
            FopState::DownSignalVisible => {
                if is_current {
                    info!(platform = %self.platform, athlete = athlete_id.0, "correction while down signal visible");
                    self.scheduler.cancel_all(&REFEREE_TASKS);
                    self.retract_reminder();
                    self.decisions.reset();
                    self.publish(UiEvent::DecisionReset {
                        athlete: self.cur_athlete,
                    });
                    self.clock_owner = None;
                    if !self.start_deferred_break() {
                        self.display_next_athlete(Some(athlete_id));
                    }
                } else {
                    self.publish_order(OrderUpdate::changing(athlete_id));
                }
            }
        }
        Ok(())
    }

    fn redisplay_after_change(&mut self, changed: AthleteId, new_weight: i32) {
        if self.roster.first_to_lift() != self.cur_athlete {
            self.clock_owner = None;
            self.display_next_athlete(Some(changed));
            return;
        }
        let is_current = self.cur_athlete == Some(changed);
        if is_current {
            self.records
                .refresh_athlete(self.cur_athlete.and_then(|id| self.roster.get(id)));
            self.publish_records();
        }
        self.publish_order(OrderUpdate {
            changing: Some(changed),
            display_affected: is_current,
            display_toggle: is_current,
            new_weight: is_current.then_some(new_weight),
        });
    }

    // ---- breaks

    fn request_break(&mut self, request: BreakRequest) {
        if matches!(
            self.state,
            FopState::DecisionVisible | FopState::DownSignalVisible
        ) {
            info!(platform = %self.platform, break_type = ?request.break_type, "break deferred until decision reset");
            self.deferred_break = Some(request);
            return;
        }
        self.start_break(request);
    }

    fn start_break(&mut self, request: BreakRequest) {
        self.scheduler.cancel_all(&REFEREE_TASKS);
        if self.decisions.count() > 0 {
            self.clear_lights();
        } else {
            self.retract_reminder();
        }
        self.stop_athlete_clock();
        let default_ms = self.config.default_break_ms;
        match (request.countdown, request.target) {
            (CountdownType::Indefinite, _) => self.break_timer.set_indefinite(&mut self.scheduler),
            (CountdownType::Target, Some(target)) => {
                self.break_timer.set_target(target, &mut self.scheduler)
            }
            _ => self
                .break_timer
                .set_duration(request.remaining_ms.unwrap_or(default_ms), &mut self.scheduler),
        }
        self.break_timer.start(&mut self.scheduler);
        self.break_type = Some(request.break_type);
        self.set_state(FopState::Break);
        info!(platform = %self.platform, break_type = ?request.break_type, "break started");
        self.publish(UiEvent::BreakStarted {
            break_type: request.break_type,
            countdown: self.break_timer.countdown(),
            remaining_ms: self.break_remaining_ms(),
            target: self.break_timer.target(),
        });
    }

    /// Starts the break requested while a decision was showing, if any.
    fn start_deferred_break(&mut self) -> bool {
        let Some(request) = self.deferred_break.take() else {
            return false;
        };
        self.roster.recompute();
        self.cur_athlete = self.roster.first_to_lift();
        self.start_break(request);
        self.publish_order(OrderUpdate::default());
        true
    }

    fn pause_break(&mut self, remaining_ms: Option<i64>) {
        let mut remaining = self.break_timer.stop(&mut self.scheduler);
        if let Some(ms) = remaining_ms {
            self.break_timer.set_duration(ms, &mut self.scheduler);
            remaining = Some(ms.max(0));
        }
        self.publish(UiEvent::BreakPaused {
            break_type: self.break_type,
            remaining_ms: remaining,
        });
    }

    fn leave_break(&mut self) {
        if self.state == FopState::Break {
            self.break_timer.stop(&mut self.scheduler);
            let break_type = self.break_type.take();
            self.publish(UiEvent::BreakDone { break_type });
        }
        self.break_type = None;
    }

    fn break_time_over(&mut self, generation: u64) -> Result<(), FopError> {
        if !self.break_timer.accept_expiry(self.scheduler.now(), generation) {
            debug!(platform = %self.platform, generation, "stale or debounced break expiry dropped");
            return Ok(());
        }
        self.play(Tone::BreakOver);
        if self.break_type.is_some_and(BreakType::starts_lifting_on_expiry) {
            return self.start_lifting();
        }
        self.publish(UiEvent::BreakPaused {
            break_type: self.break_type,
            remaining_ms: Some(0),
        });
        Ok(())
    }

    fn start_lifting(&mut self) -> Result<(), FopError> {
        if self.state.is_lifting() {
            debug!(platform = %self.platform, "already lifting");
            return Ok(());
        }
        let group = self.roster.group_id().ok_or(FopError::NoGroup)?;

        let interrupted =
            self.state == FopState::Break && self.break_type.is_some_and(BreakType::is_interruption);
        if interrupted {
            if let Some(current) = self.mid_attempt_athlete() {
                self.leave_break();
                self.set_state(FopState::CurrentAthleteDisplayed);
                info!(platform = %self.platform, athlete = current.0, "lifting resumed with current athlete");
                self.publish(UiEvent::SetTime {
                    athlete: Some(current),
                    remaining_ms: self.athlete_remaining_ms(),
                });
                self.publish_order(OrderUpdate::affected());
                return Ok(());
            }
        }

        self.load_roster(group)?;
        self.leave_break();
        self.display_next_athlete(None);
        Ok(())
    }

    /// Current athlete if they own the clock and still have attempts left.
    fn mid_attempt_athlete(&self) -> Option<AthleteId> {
        let current = self.cur_athlete?;
        let has_attempts = self.roster.get(current).is_some_and(|a| !a.is_done());
        (self.clock_owner == Some(current) && has_attempts).then_some(current)
    }

    fn summon(&mut self, index: usize) -> Result<(), FopError> {
        if index > TECHNICAL_CONTROLLER {
            return Err(FopError::InvalidRefereeIndex(index));
        }
        if index != TECHNICAL_CONTROLLER && self.state != FopState::Break {
            self.request_break(BreakRequest::indefinite(BreakType::Jury));
        }
        self.publish(UiEvent::SummonRef { index });
        Ok(())
    }

    // ---- athlete clock

    fn time_allowed(&mut self) -> i64 {
        if let Some(forced) = self.forced_time.take() {
            return forced;
        }
        let Some(current) = self.cur_athlete else {
            return STANDARD_TIME_MS;
        };
        if self.clock_owner == Some(current) && self.athlete_timer.was_stopped() {
            return self.athlete_remaining_ms();
        }
        if self.previous_athlete == Some(current) {
            let first_of_lift = self
                .roster
                .get(current)
                .is_some_and(|a| a.attempt_in_lift() == 1);
            if self.clock_owner.is_some() || first_of_lift {
                STANDARD_TIME_MS
            } else {
                CONSECUTIVE_TIME_MS
            }
        } else {
            STANDARD_TIME_MS
        }
    }

    fn new_clock_cycle(&mut self) {
        let time = self.time_allowed();
        self.scheduler.cancel_all(&REFEREE_TASKS);
        self.scheduler.cancel(Task::DecisionReset);
        self.retract_reminder();
        self.decisions.reset();
        self.athlete_timer.reset_cycle(time, &mut self.scheduler);

        let athlete = self.cur_athlete;
        debug!(platform = %self.platform, athlete = ?athlete.map(|a| a.0), time, "new clock cycle");
        self.publish(UiEvent::ResetOnNewClock { athlete });
        self.publish(UiEvent::SetTime {
            athlete,
            remaining_ms: time,
        });
        self.records
            .refresh_athlete(athlete.and_then(|id| self.roster.get(id)));
        self.publish_records();
    }

    fn force_time(&mut self, ms: i64) {
        self.forced_time = Some(ms.max(0));
        match self.state {
            FopState::CurrentAthleteDisplayed | FopState::TimeStopped => self.new_clock_cycle(),
            _ => debug!(platform = %self.platform, ms, "forced time armed for the next clock"),
        }
    }

    fn start_time(&mut self) -> Result<(), FopError> {
        let current = self.cur_athlete.ok_or(FopError::NoCurrentAthlete)?;
        self.clock_owner = Some(current);
        let remaining_ms = self.athlete_timer.start(&mut self.scheduler);
        self.set_state(FopState::TimeRunning);
        self.publish(UiEvent::StartTime {
            athlete: Some(current),
            remaining_ms,
        });
        Ok(())
    }

    fn stop_time(&mut self) {
        self.stop_athlete_clock();
        self.set_state(FopState::TimeStopped);
    }

    fn time_over(&mut self) {
        self.stop_athlete_clock();
        self.set_state(FopState::TimeStopped);
        if self.athlete_timer.take_time_over() {
            info!(platform = %self.platform, athlete = ?self.cur_athlete.map(|a| a.0), "time over");
            if self.athlete_timer.take_warning(0) {
                self.play(Tone::TimeOver);
            }
        }
    }

    fn clock_warning(&mut self, seconds: u32) {
        if self.state != FopState::TimeRunning || !self.athlete_timer.is_running() {
            debug!(platform = %self.platform, seconds, "clock warning for a stopped clock dropped");
            return;
        }
        if !self.athlete_timer.take_warning(seconds) {
            return;
        }
        let tone = match seconds {
            FIRST_WARNING_SECONDS => Tone::FirstWarning,
            FINAL_WARNING_SECONDS => Tone::FinalWarning,
            _ => return,
        };
        self.play(tone);
    }

    // ---- referee decisions

    /// Decisions given before the clock was started count as if time had
    /// been stopped for the current athlete.
    fn begin_decision_if_idle(&mut self) {
        if self.state == FopState::CurrentAthleteDisplayed {
            self.clock_owner = self.cur_athlete;
            self.set_state(FopState::TimeStopped);
        }
    }

    fn referee_update(&mut self, index: usize, verdict: Verdict, at_ms: Option<i64>) -> Result<(), FopError> {
        self.cur_athlete.ok_or(FopError::NoCurrentAthlete)?;
        let before = self.decisions.count();
        if !self.decisions.record(index, verdict, at_ms)? {
            debug!(platform = %self.platform, referee = index + 1, "stale referee update dropped");
            return Ok(());
        }
        debug!(platform = %self.platform, referee = index + 1, ?verdict, "referee decision");
        self.begin_decision_if_idle();
        self.after_referee_update(before, false);
        Ok(())
    }

    fn referee_full_update(
        &mut self,
        verdicts: [Option<Verdict>; REFEREES],
        times: [Option<i64>; REFEREES],
        immediate: bool,
    ) -> Result<(), FopError> {
        self.cur_athlete.ok_or(FopError::NoCurrentAthlete)?;
        let before = self.decisions.count();
        for (index, (verdict, at_ms)) in verdicts.into_iter().zip(times).enumerate() {
            if let Some(verdict) = verdict {
                if !self.decisions.record(index, verdict, at_ms)? {
                    debug!(platform = %self.platform, referee = index + 1, "stale referee update dropped");
                }
            }
        }
        self.begin_decision_if_idle();
        self.after_referee_update(before, immediate);
        Ok(())
    }

    fn after_referee_update(&mut self, before: usize, immediate: bool) {
        let count = self.decisions.count();
        let cycle = self.decisions.cycle();

        if self.decisions.majority().is_some() {
            self.emit_down();
        }
        if count == 2 && before < 2 {
            self.scheduler.schedule(
                Task::RefereeReminder,
                self.config.referee_reminder_delay(),
                FopEventKind::RefereeReminder { cycle },
            );
        }
        if count == REFEREES {
            self.scheduler.cancel(Task::RefereeReminder);
            self.scheduler.cancel(Task::RefereeReminderTimeout);
            self.retract_reminder();
            if immediate {
                self.scheduler.cancel(Task::RevealDecision);
                self.show_decision();
            } else if !self.scheduler.is_scheduled(Task::RevealDecision) {
                self.scheduler.schedule(
                    Task::RevealDecision,
                    self.config.reversal_window(),
                    FopEventKind::RevealDecision { cycle },
                );
            }
        }
    }

    fn emit_down(&mut self) {
        if !self.decisions.claim_down() {
            return;
        }
        self.stop_athlete_clock();
        self.set_state(FopState::DownSignalVisible);
        info!(platform = %self.platform, athlete = ?self.cur_athlete.map(|a| a.0), "down signal");
        self.publish(UiEvent::DownSignal {
            athlete: self.cur_athlete,
        });
        self.play(Tone::Down);
    }

    fn referee_reminder(&mut self, cycle: u64) {
        if cycle != self.decisions.cycle()
            || self.decisions.count() != 2
            || self.decisions.is_revealed()
        {
            debug!(platform = %self.platform, cycle, "stale referee reminder dropped");
            return;
        }
        let Some(missing) = self.decisions.missing() else {
            return;
        };
        self.decisions.set_reminded(missing);
        self.publish(UiEvent::WakeUpRef {
            referee: missing + 1,
            on: true,
        });
        self.scheduler.schedule(
            Task::RefereeReminderTimeout,
            self.config.referee_reminder_timeout(),
            FopEventKind::RefereeReminderTimeout { cycle },
        );
    }

    fn retract_reminder(&mut self) {
        if let Some(missing) = self.decisions.take_reminded() {
            self.publish(UiEvent::WakeUpRef {
                referee: missing + 1,
                on: false,
            });
        }
    }

    fn reveal(&mut self, cycle: u64) {
        let revealable = matches!(
            self.state,
            FopState::TimeRunning | FopState::TimeStopped | FopState::DownSignalVisible
        );
        if cycle != self.decisions.cycle()
            || !revealable
            || !self.decisions.is_complete()
            || self.decisions.is_revealed()
        {
            debug!(platform = %self.platform, cycle, "stale reveal dropped");
            return;
        }
        self.show_decision();
    }

    fn explicit_decision(
        &mut self,
        verdict: Verdict,
        verdicts: [Option<Verdict>; REFEREES],
    ) -> Result<(), FopError> {
        self.cur_athlete.ok_or(FopError::NoCurrentAthlete)?;
        self.scheduler.cancel_all(&REFEREE_TASKS);
        self.retract_reminder();
        self.decisions.fill(verdicts, verdict);
        if self.decisions.majority() != Some(verdict) {
            self.decisions.fill([None; REFEREES], verdict);
        }
        self.show_decision();
        Ok(())
    }

    /// Reveals the majority: records the lift, persists it, detects records
    /// and schedules the automatic reset.
    fn show_decision(&mut self) {
        let (Some(majority), Some(current)) = (self.decisions.majority(), self.cur_athlete) else {
            warn!(platform = %self.platform, "decision shown without majority or athlete");
            return;
        };
        let good = majority.is_good();
        self.decisions.claim_down();
        self.decisions.mark_revealed();
        self.stop_athlete_clock();

        let at = self.scheduler.wall_clock();
        let group = self.roster.group_id();
        let lift = self.roster.get_mut(current).and_then(|athlete| {
            let weight = athlete.next_requested_weight();
            let kind = athlete.lift_kind();
            athlete
                .record_attempt(weight, good, at)
                .map(|attempt| (weight, kind, attempt))
        });

        if let Some((weight, kind, attempt)) = lift {
            if let Some(athlete) = self.roster.get(current) {
                if let Err(error) = self.repo.save_athlete(athlete) {
                    warn!(platform = %self.platform, athlete = current.0, %error, "could not save lift");
                }
                if good {
                    let broken = self.records.register_good_lift(
                        self.repo.as_ref(),
                        athlete,
                        &GoodLift {
                            lift: kind,
                            weight,
                            attempt,
                            group,
                            at,
                        },
                    );
                    for record in &broken {
                        self.publish(UiEvent::Notification(
                            Notification::new(NotificationLevel::Info, "Record.NewRecord")
                                .with_arg(&record.holder)
                                .with_arg(record.value),
                        ));
                    }
                }
            }
            self.last_lift = Some(LastLift {
                athlete: current,
                attempt,
                weight,
                good,
            });
            info!(platform = %self.platform, athlete = current.0, attempt = attempt + 1, weight, good, "decision shown");
        }

        self.clock_owner = None;
        self.previous_athlete = Some(current);
        self.jury.reset();
        self.scheduler.cancel(Task::JuryReveal);
        self.roster.recompute();
        self.set_state(FopState::DecisionVisible);
        self.publish(UiEvent::Decision {
            athlete: Some(current),
            good_lift: good,
            verdicts: self.decisions.snapshot(),
        });
        self.records.refresh_group(self.repo.as_ref(), &self.roster);
        self.publish_records();
        self.scheduler.schedule(
            Task::DecisionReset,
            self.config.decision_visible(),
            FopEventKind::DecisionReset,
        );
    }

    fn decision_reset(&mut self) {
        self.scheduler.cancel(Task::DecisionReset);
        self.clear_lights();

        if self.start_deferred_break() {
            return;
        }
        if self.clean_jerk_break_due() {
            self.clean_jerk_break_done = true;
            let athletes = self.roster.len();
            self.cur_athlete = self.roster.first_to_lift();
            info!(platform = %self.platform, athletes, "automatic break before clean & jerk");
            self.start_break(BreakRequest {
                break_type: BreakType::FirstCleanJerk,
                countdown: CountdownType::Duration,
                remaining_ms: Some(self.config.clean_jerk_break_ms(athletes)),
                target: None,
            });
            self.publish_order(OrderUpdate::default());
            return;
        }
        self.display_next_athlete(None);
    }

    fn clean_jerk_break_due(&self) -> bool {
        self.config.auto_clean_jerk_break
            && !self.clean_jerk_break_done
            && self
                .last_lift
                .is_some_and(|lift| lift.attempt < ATTEMPTS_PER_LIFT)
            && self.roster.all_snatch_done()
            && !self.roster.all_done()
    }

    fn clear_lights(&mut self) {
        self.retract_reminder();
        self.decisions.reset();
        self.publish(UiEvent::DecisionReset {
            athlete: self.cur_athlete,
        });
    }

    /// Down signal shown but the decision never completed: clear it and let
    /// the athlete clock resume, unless a break was requested meanwhile.
    fn clear_stuck_decision(&mut self) {
        self.scheduler.cancel_all(&REFEREE_TASKS);
        self.clear_lights();
        if !self.start_deferred_break() {
            self.set_state(FopState::TimeStopped);
        }
    }

    // ---- jury

    fn jury_member_update(&mut self, index: usize, verdict: Verdict) -> Result<(), FopError> {
        let complete = self.jury.record(index, verdict)?;
        self.publish(UiEvent::JuryUpdate {
            voted: self.jury.voted(),
            revealed: None,
        });
        if complete {
            self.scheduler.schedule(
                Task::JuryReveal,
                self.config.jury_settle(),
                FopEventKind::JuryReveal {
                    cycle: self.jury.cycle(),
                },
            );
        }
        Ok(())
    }

    fn jury_reveal(&mut self, cycle: u64) {
        if cycle != self.jury.cycle() {
            debug!(platform = %self.platform, cycle, "stale jury reveal dropped");
            return;
        }
        if let Some(collective) = self.jury.collective() {
            info!(platform = %self.platform, good = collective.good_lift, unanimous = collective.unanimous, "jury votes revealed");
            self.publish(UiEvent::JuryUpdate {
                voted: self.jury.voted(),
                revealed: Some(collective),
            });
        }
    }

    fn jury_decision(&mut self, verdict: Verdict, from_jury_button: bool) -> Result<(), FopError> {
        let last = self.last_lift.ok_or(FopError::NoLiftToReview)?;
        let good = verdict.is_good();
        let reversal = good != last.good;
        let mut records_cancelled = false;

        if reversal {
            let athlete = self
                .roster
                .get_mut(last.athlete)
                .ok_or(FopError::UnknownAthlete(last.athlete))?;
            athlete.card_mut(last.attempt).actual_lift =
                Some(if good { last.weight } else { -last.weight });

            if let Some(athlete) = self.roster.get(last.athlete) {
                if let Err(error) = self.repo.save_athlete(athlete) {
                    warn!(platform = %self.platform, athlete = last.athlete.0, %error, "could not save jury decision");
                }
                if good {
                    let kind = if last.attempt < ATTEMPTS_PER_LIFT {
                        LiftKind::Snatch
                    } else {
                        LiftKind::CleanJerk
                    };
                    self.records.register_good_lift(
                        self.repo.as_ref(),
                        athlete,
                        &GoodLift {
                            lift: kind,
                            weight: last.weight,
                            attempt: last.attempt,
                            group: self.roster.group_id(),
                            at: self.scheduler.wall_clock(),
                        },
                    );
                }
            }
            if !good {
                records_cancelled =
                    self.records
                        .cancel_attempt(self.repo.as_ref(), last.athlete, last.attempt);
            }
            self.last_lift = Some(LastLift { good, ..last });
            self.roster.recompute();
            self.records.refresh_group(self.repo.as_ref(), &self.roster);
            self.records
                .refresh_athlete(self.cur_athlete.and_then(|id| self.roster.get(id)));
            self.publish_records();
            self.publish_order(OrderUpdate::changing(last.athlete));
        }

        info!(
            platform = %self.platform,
            athlete = last.athlete.0,
            good,
            reversal,
            records_cancelled,
            from_jury_button,
            "jury decision"
        );
        self.jury.reset();
        self.scheduler.cancel(Task::JuryReveal);
        self.publish(UiEvent::JuryNotification {
            athlete: last.athlete,
            good_lift: good,
            reversal,
            records_cancelled,
        });
        Ok(())
    }
}

impl FieldOfPlay<ManualScheduler> {
    /// Moves the virtual clock forward, handling every task that falls due on
    /// the way.
    pub fn advance(&mut self, by: Duration) {
        let until = self.scheduler.elapsed() + by;
        while let Some(event) = self.scheduler.pop_due(until) {
            self.handle(event);
        }
        self.scheduler.set_elapsed(until);
    }

    pub fn pending_tasks(&self) -> Vec<Task> {
        self.scheduler.pending_tasks()
    }
}

#[cfg(test)]
#[path = "tests/field_of_play_tests.rs"]
mod tests;
