use std::collections::BTreeSet;

use crate::reconnect::SimulatorSession;

/// Order in which eligible sessions are bound.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ScanDirection {
    Forward,
    Reverse,
}

impl ScanDirection {
    fn flip(self) -> Self {
        match self {
            ScanDirection::Forward => ScanDirection::Reverse,
            ScanDirection::Reverse => ScanDirection::Forward,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RetryStatus {
    /// Another attempt may be made in the current cycle.
    Ok,
    /// All attempts of the current cycle were used.
    Exhausted,
}

/// Retry bookkeeping of the reconnection loop.
#[derive(Debug)]
pub struct RetryState {
    /// Failed attempts in the current cycle.
    retry_count: u32,
    max_retries: u32,
    /// Sessions reported as invalid by the registry. Never shrinks.
    blocked_sessions: BTreeSet<String>,
    scan_direction: ScanDirection,
    /// How many cycles in a row have used all of their attempts.
    failed_cycles: u32,
    /// Flip the scan direction after this many failed cycles, zero never flips.
    reverse_after: u32,
}

impl RetryState {
    pub fn new(max_retries: u32, reverse_after: u32) -> Self {
        Self {
            retry_count: 0,
            max_retries,
            blocked_sessions: Default::default(),
            scan_direction: ScanDirection::Forward,
            failed_cycles: 0,
            reverse_after,
        }
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn blocked_sessions(&self) -> &BTreeSet<String> {
        &self.blocked_sessions
    }

    pub fn scan_direction(&self) -> ScanDirection {
        self.scan_direction
    }

    pub fn failed_cycles(&self) -> u32 {
        self.failed_cycles
    }

    pub fn status(&self) -> RetryStatus {
        if self.retry_count >= self.max_retries {
            RetryStatus::Exhausted
        } else {
            RetryStatus::Ok
        }
    }

    /// A new cycle starts with a fresh attempt budget.
    pub fn on_cycle_start(&mut self) {
        self.retry_count = 0;
    }

    /// All eligible sessions were bound.
    pub fn on_success(&mut self) {
        self.retry_count = 0;
        self.failed_cycles = 0;
    }

    /// Listing or binding failed in a way that may go away by itself.
    pub fn on_attempt_fail(&mut self) {
        self.retry_count += 1;
    }

    /// The registry rejected the session, it will never be tried again.
    pub fn on_session_invalid(&mut self, session_id: &str) {
        self.blocked_sessions.insert(session_id.to_string());
        self.retry_count += 1;
    }

    /// The cycle used all of its attempts without binding every session.
    pub fn on_cycle_exhausted(&mut self) {
        self.failed_cycles += 1;
        if self.reverse_after > 0 && self.failed_cycles >= self.reverse_after {
            self.scan_direction = self.scan_direction.flip();
            self.failed_cycles = 0;
        }
    }

    /// Ids of unset, non-blocked sessions in the current scan order.
    pub fn filter_eligible(&self, sessions: &[SimulatorSession]) -> Vec<String> {
        let eligible = sessions
            .iter()
            .filter(|session| session.is_unset())
            .filter(|session| !self.blocked_sessions.contains(&session.session_id))
            .map(|session| session.session_id.clone());
        match self.scan_direction {
            ScanDirection::Forward => eligible.collect(),
            ScanDirection::Reverse => {
                let mut eligible: Vec<String> = eligible.collect();
                eligible.reverse();
                eligible
            }
        }
    }
}
