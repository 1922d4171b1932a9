use std::time::Duration;

use chrono::{DateTime, Utc};
use shared::{domain::CountdownType, protocol::FopEventKind};
use tokio::time::Instant;

use crate::scheduler::{Scheduler, Task};

/// Expiries closer than this are the same expiry.
pub const EXPIRY_DEBOUNCE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq)]
enum Mode {
    Indefinite,
    Duration,
    Target(DateTime<Utc>),
}

#[derive(Debug)]
pub struct BreakTimer {
    mode: Mode,
    remaining_ms: i64,
    started_at: Option<Instant>,
    last_expiry: Option<Instant>,
    generation: u64,
}

impl Default for BreakTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl BreakTimer {
    pub fn new() -> Self {
        Self {
            mode: Mode::Indefinite,
            remaining_ms: 0,
            started_at: None,
            last_expiry: None,
            generation: 0,
        }
    }

    /// Drops the scheduled expiry. An expiry already queued keeps the old
    /// generation and is refused by [`BreakTimer::accept_expiry`].
    fn cancel_expiry(&mut self, scheduler: &mut dyn Scheduler) {
        scheduler.cancel(Task::BreakExpiry);
        self.generation += 1;
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn set_indefinite(&mut self, scheduler: &mut dyn Scheduler) {
        self.cancel_expiry(scheduler);
        self.mode = Mode::Indefinite;
        self.started_at = None;
    }

    pub fn set_duration(&mut self, remaining_ms: i64, scheduler: &mut dyn Scheduler) {
        self.cancel_expiry(scheduler);
        self.mode = Mode::Duration;
        self.remaining_ms = remaining_ms.max(0);
        self.started_at = None;
    }

    pub fn set_target(&mut self, target: DateTime<Utc>, scheduler: &mut dyn Scheduler) {
        self.cancel_expiry(scheduler);
        self.mode = Mode::Target(target);
        self.started_at = None;
    }

    pub fn countdown(&self) -> CountdownType {
        match self.mode {
            Mode::Indefinite => CountdownType::Indefinite,
            Mode::Duration => CountdownType::Duration,
            Mode::Target(_) => CountdownType::Target,
        }
    }

    pub fn target(&self) -> Option<DateTime<Utc>> {
        match self.mode {
            Mode::Target(target) => Some(target),
            _ => None,
        }
    }

    pub fn is_indefinite(&self) -> bool {
        self.mode == Mode::Indefinite
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    /// Remaining time; `None` for an indefinite break.
    pub fn live_remaining(&self, scheduler: &dyn Scheduler) -> Option<i64> {
        match self.mode {
            Mode::Indefinite => None,
            Mode::Target(target) => {
                Some((target - scheduler.wall_clock()).num_milliseconds().max(0))
            }
            Mode::Duration => Some(match self.started_at {
                Some(started) => {
                    let elapsed = scheduler
                        .now()
                        .saturating_duration_since(started)
                        .as_millis() as i64;
                    (self.remaining_ms - elapsed).max(0)
                }
                None => self.remaining_ms,
            }),
        }
    }

    /// Starts counting and replaces any scheduled expiry.
    pub fn start(&mut self, scheduler: &mut dyn Scheduler) {
        self.cancel_expiry(scheduler);
        let remaining = self.live_remaining(scheduler);
        self.started_at = Some(scheduler.now());
        if let Some(remaining) = remaining {
            scheduler.schedule(
                Task::BreakExpiry,
                Duration::from_millis(remaining as u64),
                FopEventKind::BreakTimeOver {
                    generation: self.generation,
                },
            );
        }
    }

    /// Cancels the expiry and freezes the remaining time. A target break
    /// becomes a duration break holding what was left.
    pub fn stop(&mut self, scheduler: &mut dyn Scheduler) -> Option<i64> {
        self.cancel_expiry(scheduler);
        let remaining = self.live_remaining(scheduler);
        if let Some(remaining) = remaining {
            self.remaining_ms = remaining;
            self.mode = Mode::Duration;
        }
        self.started_at = None;
        remaining
    }

    /// Returns false for an expiry scheduled by an earlier run, or one
    /// following the previous expiry within [`EXPIRY_DEBOUNCE`].
    pub fn accept_expiry(&mut self, now: Instant, generation: u64) -> bool {
        if generation != self.generation {
            return false;
        }
        if let Some(last) = self.last_expiry {
            if now.saturating_duration_since(last) <= EXPIRY_DEBOUNCE {
                return false;
            }
        }
        self.last_expiry = Some(now);
        self.started_at = None;
        if self.mode != Mode::Indefinite {
            self.mode = Mode::Duration;
            self.remaining_ms = 0;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualScheduler;

    #[test]
    fn indefinite_break_never_schedules_expiry() {
        let mut scheduler = ManualScheduler::new();
        let mut timer = BreakTimer::new();
        timer.set_indefinite(&mut scheduler);
        timer.start(&mut scheduler);
        assert_eq!(timer.live_remaining(&scheduler), None);
        assert!(!scheduler.is_scheduled(Task::BreakExpiry));
    }

    #[test]
    fn switching_mode_cancels_stale_expiry() {
        let mut scheduler = ManualScheduler::new();
        let mut timer = BreakTimer::new();
        timer.set_duration(60_000, &mut scheduler);
        timer.start(&mut scheduler);
        assert!(scheduler.is_scheduled(Task::BreakExpiry));

        timer.set_indefinite(&mut scheduler);
        assert!(!scheduler.is_scheduled(Task::BreakExpiry));

        timer.set_duration(30_000, &mut scheduler);
        timer.start(&mut scheduler);
        let fired = scheduler
            .pop_due(Duration::from_secs(120))
            .expect("expiry scheduled");
        assert_eq!(
            fired.kind,
            FopEventKind::BreakTimeOver {
                generation: timer.generation()
            }
        );
        assert_eq!(scheduler.elapsed(), Duration::from_secs(30));
    }

    #[test]
    fn stop_freezes_remaining() {
        let mut scheduler = ManualScheduler::new();
        let mut timer = BreakTimer::new();
        timer.set_duration(60_000, &mut scheduler);
        timer.start(&mut scheduler);
        scheduler.set_elapsed(Duration::from_secs(20));
        assert_eq!(timer.stop(&mut scheduler), Some(40_000));
        scheduler.set_elapsed(Duration::from_secs(50));
        assert_eq!(timer.live_remaining(&scheduler), Some(40_000));
    }

    #[test]
    fn target_mode_counts_to_wall_clock() {
        let mut scheduler = ManualScheduler::new();
        let mut timer = BreakTimer::new();
        let target = scheduler.wall_clock() + chrono::Duration::seconds(90);
        timer.set_target(target, &mut scheduler);
        assert_eq!(timer.live_remaining(&scheduler), Some(90_000));
        scheduler.set_elapsed(Duration::from_secs(30));
        assert_eq!(timer.live_remaining(&scheduler), Some(60_000));
        assert_eq!(timer.countdown(), CountdownType::Target);
    }

    #[test]
    fn close_expiries_are_debounced() {
        let mut scheduler = ManualScheduler::new();
        let mut timer = BreakTimer::new();
        timer.set_duration(1_000, &mut scheduler);
        let generation = timer.generation();
        assert!(timer.accept_expiry(scheduler.now(), generation));
        scheduler.set_elapsed(Duration::from_millis(800));
        assert!(!timer.accept_expiry(scheduler.now(), generation));
        scheduler.set_elapsed(Duration::from_millis(2_500));
        assert!(timer.accept_expiry(scheduler.now(), generation));
    }

    #[test]
    fn expiry_of_a_replaced_run_is_refused() {
        let mut scheduler = ManualScheduler::new();
        let mut timer = BreakTimer::new();
        timer.set_duration(1_000, &mut scheduler);
        timer.start(&mut scheduler);
        let first = timer.generation();

        timer.set_duration(60_000, &mut scheduler);
        timer.start(&mut scheduler);
        assert_ne!(timer.generation(), first);
        assert!(!timer.accept_expiry(scheduler.now(), first));
        assert_eq!(timer.live_remaining(&scheduler), Some(60_000));
        assert!(timer.accept_expiry(scheduler.now(), timer.generation()));
    }
}
