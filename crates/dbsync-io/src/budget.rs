//! Per-connection time budgets.

use std::time::Duration;

/// Time a connection or target may still spend waiting.
///
/// Budgets are charged with the wall-clock duration of each poll wait and
/// refreshed whenever bytes move. An exhausted budget is a timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBudget {
    limit: Duration,
    remaining: Duration,
}

impl TimeBudget {
    /// Creates a full budget.
    pub fn new(limit: Duration) -> Self {
        Self {
            limit,
            remaining: limit,
        }
    }

    /// Subtracts `elapsed`, saturating at zero.
    pub fn charge(&mut self, elapsed: Duration) {
        self.remaining = self.remaining.saturating_sub(elapsed);
    }

    /// Restores the full budget.
    pub fn refresh(&mut self) {
        self.remaining = self.limit;
    }

    pub fn remaining(&self) -> Duration {
        self.remaining
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining.is_zero()
    }
}
