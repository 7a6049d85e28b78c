//! Wall-clock budget shared by every stage of a batch.

use std::time::Duration;

use tokio::time::Instant;

/// Smallest timeout handed to a stage, so a nearly spent budget still lets an
/// operation start instead of failing on overhead alone.
const MIN_STAGE_TIMEOUT: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy)]
pub struct DeadlineBudget {
    started: Instant,
    total: Duration,
}

impl DeadlineBudget {
    pub fn start(total: Duration) -> Self {
        Self {
            started: Instant::now(),
            total,
        }
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.total.saturating_sub(self.elapsed())
    }

    pub fn exhausted(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Timeout for a stage that asks for `requested`, never beyond what is
    /// left of the budget and never zero.
    pub fn bound(&self, requested: Duration) -> Duration {
        requested.min(self.remaining()).max(MIN_STAGE_TIMEOUT)
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.elapsed().as_millis()
    }
}
