//! Referee and jury decision slots.

use shared::{domain::Verdict, error::FopError, protocol::JuryVerdict};

use crate::config::MAX_JURY_SIZE;

pub const REFEREES: usize = 3;

#[derive(Debug, Default)]
pub struct RefereeDecisions {
    verdicts: [Option<Verdict>; REFEREES],
    times: [Option<i64>; REFEREES],
    cycle: u64,
    down_emitted: bool,
    revealed: bool,
    reminded: Option<usize>,
}

impl RefereeDecisions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears every slot and opens a new cycle; tasks carrying an older cycle
    /// become no-ops.
    pub fn reset(&mut self) {
        self.verdicts = [None; REFEREES];
        self.times = [None; REFEREES];
        self.down_emitted = false;
        self.revealed = false;
        self.reminded = None;
        self.cycle += 1;
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Stores one verdict. Returns `Ok(false)` when the update is older than
    /// what the slot already holds.
    pub fn record(
        &mut self,
        index: usize,
        verdict: Verdict,
        at_ms: Option<i64>,
    ) -> Result<bool, FopError> {
        if index >= REFEREES {
            return Err(FopError::InvalidRefereeIndex(index));
        }
        if let (Some(seen), Some(at)) = (self.times[index], at_ms) {
            if at < seen {
                return Ok(false);
            }
        }
        self.verdicts[index] = Some(verdict);
        if at_ms.is_some() {
            self.times[index] = at_ms;
        }
        Ok(true)
    }

    /// Fills all slots at once, used for decisions entered by an official.
    pub fn fill(&mut self, verdicts: [Option<Verdict>; REFEREES], fallback: Verdict) {
        for (slot, verdict) in self.verdicts.iter_mut().zip(verdicts) {
            *slot = Some(verdict.unwrap_or(fallback));
        }
    }

    pub fn count(&self) -> usize {
        self.verdicts.iter().flatten().count()
    }

    pub fn is_complete(&self) -> bool {
        self.count() == REFEREES
    }

    /// Verdict shared by at least two referees.
    pub fn majority(&self) -> Option<Verdict> {
        let good = self.verdicts.iter().flatten().filter(|v| v.is_good()).count();
        let bad = self.count() - good;
        if good >= 2 {
            Some(Verdict::Good)
        } else if bad >= 2 {
            Some(Verdict::Bad)
        } else {
            None
        }
    }

    /// First referee that has not decided yet.
    pub fn missing(&self) -> Option<usize> {
        self.verdicts.iter().position(Option::is_none)
    }

    /// True the first time it is called in a cycle.
    pub fn claim_down(&mut self) -> bool {
        !std::mem::replace(&mut self.down_emitted, true)
    }

    pub fn down_emitted(&self) -> bool {
        self.down_emitted
    }

    pub fn mark_revealed(&mut self) {
        self.revealed = true;
    }

    pub fn is_revealed(&self) -> bool {
        self.revealed
    }

    pub fn set_reminded(&mut self, index: usize) {
        self.reminded = Some(index);
    }

    pub fn take_reminded(&mut self) -> Option<usize> {
        self.reminded.take()
    }

    pub fn snapshot(&self) -> [Option<Verdict>; REFEREES] {
        self.verdicts
    }
}

#[derive(Debug)]
pub struct JuryDecisions {
    verdicts: [Option<Verdict>; MAX_JURY_SIZE],
    size: usize,
    cycle: u64,
}

impl JuryDecisions {
    pub fn new(size: usize) -> Self {
        Self {
            verdicts: [None; MAX_JURY_SIZE],
            size: size.clamp(1, MAX_JURY_SIZE),
            cycle: 0,
        }
    }

    pub fn reset(&mut self) {
        self.verdicts = [None; MAX_JURY_SIZE];
        self.cycle += 1;
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Returns whether every configured member has now voted.
    pub fn record(&mut self, index: usize, verdict: Verdict) -> Result<bool, FopError> {
        if index >= self.size {
            return Err(FopError::InvalidJuryIndex(index));
        }
        self.verdicts[index] = Some(verdict);
        Ok(self.is_complete())
    }

    pub fn is_complete(&self) -> bool {
        self.verdicts[..self.size].iter().all(Option::is_some)
    }

    pub fn voted(&self) -> Vec<bool> {
        self.verdicts[..self.size].iter().map(Option::is_some).collect()
    }

    pub fn snapshot(&self) -> Vec<Option<Verdict>> {
        self.verdicts[..self.size].to_vec()
    }

    /// Collective verdict, available once everybody voted.
    pub fn collective(&self) -> Option<JuryVerdict> {
        if !self.is_complete() {
            return None;
        }
        let members = self.snapshot();
        let good = members.iter().flatten().filter(|v| v.is_good()).count();
        Some(JuryVerdict {
            good_lift: good * 2 > self.size,
            unanimous: good == 0 || good == self.size,
            members,
        })
    }
}

#[cfg(test)]
#[path = "tests/decisions_tests.rs"]
mod tests;
