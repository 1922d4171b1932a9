use std::time::Duration;

use shared::protocol::FopEventKind;
use tokio::time::Instant;

use crate::scheduler::{Scheduler, Task};

pub const FIRST_WARNING_SECONDS: u32 = 90;
pub const FINAL_WARNING_SECONDS: u32 = 30;

const WARNING_TASKS: [Task; 3] = [
    Task::ClockWarning(FIRST_WARNING_SECONDS),
    Task::ClockWarning(FINAL_WARNING_SECONDS),
    Task::AthleteTimeOver,
];

#[derive(Debug, Default, Clone, Copy)]
struct WarningFlags {
    first: bool,
    last: bool,
    zero: bool,
    time_over: bool,
}

/// Countdown of the athlete currently holding the bar.
#[derive(Debug)]
pub struct AthleteTimer {
    remaining_ms: i64,
    started_at: Option<Instant>,
    stopped_at: Option<Instant>,
    stopped_once: bool,
    warnings: WarningFlags,
}

impl Default for AthleteTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl AthleteTimer {
    pub fn new() -> Self {
        Self {
            remaining_ms: 0,
            started_at: None,
            stopped_at: None,
            stopped_once: false,
            warnings: WarningFlags::default(),
        }
    }

    /// Begins a fresh clock cycle: time is set, the clock is stopped and every
    /// warning flag is re-armed.
    pub fn reset_cycle(&mut self, time_allowed_ms: i64, scheduler: &mut dyn Scheduler) {
        scheduler.cancel_all(&WARNING_TASKS);
        self.remaining_ms = time_allowed_ms.max(0);
        self.started_at = None;
        self.stopped_at = None;
        self.stopped_once = false;
        self.warnings = WarningFlags::default();
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    /// True once the clock has been stopped at least once in this cycle.
    pub fn was_stopped(&self) -> bool {
        self.stopped_once
    }

    pub fn live_remaining(&self, now: Instant) -> i64 {
        match self.started_at {
            Some(started) => {
                let elapsed = now.saturating_duration_since(started).as_millis() as i64;
                (self.remaining_ms - elapsed).max(0)
            }
            None => self.remaining_ms,
        }
    }

    /// Starts the countdown and schedules the warnings still ahead. Returns
    /// the remaining time at start.
    pub fn start(&mut self, scheduler: &mut dyn Scheduler) -> i64 {
        if self.is_running() {
            return self.live_remaining(scheduler.now());
        }
        let remaining = self.remaining_ms;
        self.started_at = Some(scheduler.now());
        self.stopped_at = None;

        for seconds in [FIRST_WARNING_SECONDS, FINAL_WARNING_SECONDS] {
            let threshold = i64::from(seconds) * 1_000;
            if remaining > threshold {
                scheduler.schedule(
                    Task::ClockWarning(seconds),
                    millis(remaining - threshold),
                    FopEventKind::ClockWarning { seconds },
                );
            }
        }
        scheduler.schedule(Task::AthleteTimeOver, millis(remaining), FopEventKind::TimeOver);
        remaining
    }

    /// Stops the countdown, keeping what is left. Returns the remaining time.
    pub fn stop(&mut self, scheduler: &mut dyn Scheduler) -> i64 {
        scheduler.cancel_all(&WARNING_TASKS);
        let now = scheduler.now();
        if self.is_running() {
            self.remaining_ms = self.live_remaining(now);
            self.started_at = None;
            self.stopped_at = Some(now);
            self.stopped_once = true;
        }
        self.remaining_ms
    }

    pub fn stopped_at(&self) -> Option<Instant> {
        self.stopped_at
    }

    /// One-shot check for the warning at `seconds` (90, 30 or 0).
    pub fn take_warning(&mut self, seconds: u32) -> bool {
        let flag = match seconds {
            FIRST_WARNING_SECONDS => &mut self.warnings.first,
            FINAL_WARNING_SECONDS => &mut self.warnings.last,
            0 => &mut self.warnings.zero,
            _ => return false,
        };
        !std::mem::replace(flag, true)
    }

    pub fn take_time_over(&mut self) -> bool {
        !std::mem::replace(&mut self.warnings.time_over, true)
    }
}

fn millis(ms: i64) -> Duration {
    Duration::from_millis(ms.max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualScheduler;

    #[test]
    fn start_schedules_pending_warnings_only() {
        let mut scheduler = ManualScheduler::new();
        let mut timer = AthleteTimer::new();
        timer.reset_cycle(60_000, &mut scheduler);
        timer.start(&mut scheduler);
        assert_eq!(
            scheduler.pending_tasks(),
            vec![Task::ClockWarning(30), Task::AthleteTimeOver]
        );
    }

    #[test]
    fn stop_keeps_remaining_time() {
        let mut scheduler = ManualScheduler::new();
        let mut timer = AthleteTimer::new();
        timer.reset_cycle(120_000, &mut scheduler);
        timer.start(&mut scheduler);
        scheduler.set_elapsed(Duration::from_millis(15_500));
        assert_eq!(timer.live_remaining(scheduler.now()), 104_500);
        assert_eq!(timer.stop(&mut scheduler), 104_500);
        assert!(timer.was_stopped());
        assert!(scheduler.pending_tasks().is_empty());

        scheduler.set_elapsed(Duration::from_millis(40_000));
        assert_eq!(timer.live_remaining(scheduler.now()), 104_500);
    }

    #[test]
    fn warnings_fire_once_per_cycle() {
        let mut scheduler = ManualScheduler::new();
        let mut timer = AthleteTimer::new();
        timer.reset_cycle(60_000, &mut scheduler);
        assert!(timer.take_warning(30));
        assert!(!timer.take_warning(30));
        assert!(timer.take_time_over());
        assert!(!timer.take_time_over());
        assert!(!timer.take_warning(45));

        timer.reset_cycle(60_000, &mut scheduler);
        assert!(timer.take_warning(30));
        assert!(timer.take_time_over());
    }
}
