//! Cancellable delayed tasks.
//!
//! Every delayed action of a field of play (reversal window, referee reminder,
//! break expiry, clock warnings...) is a task keyed by [`Task`]. Scheduling a
//! task replaces any pending task of the same kind. A fired task posts its
//! input event back into the controller's queue, so it is interpreted like any
//! other event.

use std::{collections::HashMap, time::Duration};

use chrono::{DateTime, Utc};
use shared::protocol::{FopEvent, FopEventKind, Origin};
use tokio::{sync::mpsc, task::JoinHandle, time::Instant};
use tracing::{debug, trace};

use crate::handle::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    AthleteTimeOver,
    ClockWarning(u32),
    BreakExpiry,
    RevealDecision,
    RefereeReminder,
    RefereeReminderTimeout,
    JuryReveal,
    DecisionReset,
}

pub trait Scheduler: Send {
    /// Monotonic time used by the clocks.
    fn now(&self) -> Instant;
    /// Wall-clock time, used for absolute break targets and lift timestamps.
    fn wall_clock(&self) -> DateTime<Utc>;
    fn schedule(&mut self, task: Task, delay: Duration, event: FopEventKind);
    fn cancel(&mut self, task: Task);
    fn is_scheduled(&self, task: Task) -> bool;

    fn cancel_all(&mut self, tasks: &[Task]) {
        for task in tasks {
            self.cancel(*task);
        }
    }
}

/// Runs each task as a tokio sleep that posts into the controller queue.
pub struct TokioScheduler {
    timers: HashMap<Task, JoinHandle<()>>,
    commands: mpsc::UnboundedSender<Command>,
}

impl TokioScheduler {
    pub(crate) fn new(commands: mpsc::UnboundedSender<Command>) -> Self {
        Self {
            timers: HashMap::new(),
            commands,
        }
    }
}

impl Scheduler for TokioScheduler {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn schedule(&mut self, task: Task, delay: Duration, event: FopEventKind) {
        self.cancel(task);

        let commands = self.commands.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            trace!(?task, "scheduled task fired");
            let _ = commands.send(Command::Event(FopEvent::new(event, Origin::Timer)));
        });
        self.timers.insert(task, handle);
        debug!(?task, ?delay, "task scheduled");
    }

    fn cancel(&mut self, task: Task) {
        if let Some(handle) = self.timers.remove(&task) {
            handle.abort();
            trace!(?task, "task cancelled");
        }
    }

    fn is_scheduled(&self, task: Task) -> bool {
        self.timers
            .get(&task)
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
    }
}

struct PendingTask {
    due: Duration,
    seq: u64,
    event: FopEventKind,
}

/// Virtual-time scheduler. Nothing fires on its own; the owner advances the
/// clock and feeds the due events back to the controller.
pub struct ManualScheduler {
    origin: Instant,
    wall_origin: DateTime<Utc>,
    elapsed: Duration,
    pending: HashMap<Task, PendingTask>,
    seq: u64,
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            wall_origin: Utc::now(),
            elapsed: Duration::ZERO,
            pending: HashMap::new(),
            seq: 0,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn pending_tasks(&self) -> Vec<Task> {
        let mut tasks: Vec<(Duration, u64, Task)> = self
            .pending
            .iter()
            .map(|(task, p)| (p.due, p.seq, *task))
            .collect();
        tasks.sort_by_key(|(due, seq, _)| (*due, *seq));
        tasks.into_iter().map(|(_, _, task)| task).collect()
    }

    /// Pops the earliest task due at or before `until`, moving the clock to
    /// its due time.
    pub fn pop_due(&mut self, until: Duration) -> Option<FopEvent> {
        let task = self
            .pending
            .iter()
            .filter(|(_, p)| p.due <= until)
            .min_by_key(|(_, p)| (p.due, p.seq))
            .map(|(task, _)| *task)?;
        let pending = self.pending.remove(&task)?;
        self.elapsed = self.elapsed.max(pending.due);
        Some(FopEvent::new(pending.event, Origin::Timer))
    }

    pub fn set_elapsed(&mut self, elapsed: Duration) {
        self.elapsed = self.elapsed.max(elapsed);
    }
}

impl Scheduler for ManualScheduler {
    fn now(&self) -> Instant {
        self.origin + self.elapsed
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        let offset = chrono::Duration::from_std(self.elapsed).unwrap_or_else(|_| chrono::Duration::zero());
        self.wall_origin + offset
    }

    fn schedule(&mut self, task: Task, delay: Duration, event: FopEventKind) {
        self.seq += 1;
        self.pending.insert(
            task,
            PendingTask {
                due: self.elapsed + delay,
                seq: self.seq,
                event,
            },
        );
    }

    fn cancel(&mut self, task: Task) {
        self.pending.remove(&task);
    }

    fn is_scheduled(&self, task: Task) -> bool {
        self.pending.contains_key(&task)
    }
}
