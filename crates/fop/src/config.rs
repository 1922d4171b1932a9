use std::time::Duration;

use serde::Deserialize;

/// Upper bound on configured jury members.
pub const MAX_JURY_SIZE: usize = 5;

/// Timings and thresholds of one field of play.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FopConfig {
    /// Time during which a referee can still change their verdict once all
    /// three are in.
    pub reversal_window_ms: u64,
    pub jury_settle_ms: u64,
    pub referee_reminder_delay_ms: u64,
    pub referee_reminder_timeout_ms: u64,
    /// How long a revealed decision stays on screen before the automatic reset.
    pub decision_visible_ms: u64,
    pub jury_size: usize,
    /// Default length of a duration break requested without a remaining time.
    pub default_break_ms: i64,
    pub auto_clean_jerk_break: bool,
    pub small_group_max_athletes: usize,
    pub small_group_break_ms: i64,
    pub large_group_break_ms: i64,
}

impl Default for FopConfig {
    fn default() -> Self {
        Self {
            reversal_window_ms: 3_500,
            jury_settle_ms: 200,
            referee_reminder_delay_ms: 10_000,
            referee_reminder_timeout_ms: 10_000,
            decision_visible_ms: 3_000,
            jury_size: 3,
            default_break_ms: 10 * 60_000,
            auto_clean_jerk_break: true,
            small_group_max_athletes: 9,
            small_group_break_ms: 10 * 60_000,
            large_group_break_ms: 5 * 60_000,
        }
    }
}

impl FopConfig {
    pub fn reversal_window(&self) -> Duration {
        Duration::from_millis(self.reversal_window_ms)
    }

    pub fn jury_settle(&self) -> Duration {
        Duration::from_millis(self.jury_settle_ms)
    }

    pub fn referee_reminder_delay(&self) -> Duration {
        Duration::from_millis(self.referee_reminder_delay_ms)
    }

    pub fn referee_reminder_timeout(&self) -> Duration {
        Duration::from_millis(self.referee_reminder_timeout_ms)
    }

    pub fn decision_visible(&self) -> Duration {
        Duration::from_millis(self.decision_visible_ms)
    }

    pub fn jury_size(&self) -> usize {
        self.jury_size.clamp(1, MAX_JURY_SIZE)
    }

    /// Length of the automatic break before the first clean & jerk.
    pub fn clean_jerk_break_ms(&self, athletes: usize) -> i64 {
        if athletes <= self.small_group_max_athletes {
            self.small_group_break_ms
        } else {
            self.large_group_break_ms
        }
    }
}
