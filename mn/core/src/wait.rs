//! Bounded busy-waiting
//!
//! There is no timer peripheral in this subsystem, so every blocking wait
//! is bounded by an iteration budget derived from the caller's millisecond
//! allowance. The iterations-per-millisecond constant is carried in each
//! driver's configuration rather than hard-coded, so a test can hand in a
//! tiny budget instead of waiting out real time.

use crate::{Error, Result};

/// Default spin iterations assumed to elapse per millisecond
pub const DEFAULT_SPINS_PER_MS: u32 = 10_000;

/// Decrementing iteration budget for one bounded wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpinBudget {
    remaining: u32,
}

impl SpinBudget {
    /// Budget of exactly `iterations` spins
    pub const fn from_iterations(iterations: u32) -> Self {
        Self { remaining: iterations }
    }

    /// Budget for `ms` milliseconds at `spins_per_ms` iterations each
    pub const fn from_millis(ms: u32, spins_per_ms: u32) -> Self {
        Self {
            remaining: ms.saturating_mul(spins_per_ms),
        }
    }

    /// Consume one iteration; returns `true` once the budget is exhausted
    pub fn tick(&mut self) -> bool {
        if self.remaining == 0 {
            true
        } else {
            self.remaining -= 1;
            self.remaining == 0
        }
    }

    /// Iterations left in the budget
    pub const fn remaining(self) -> u32 {
        self.remaining
    }
}

/// Spin until `cond` holds or the budget runs out
pub fn spin_until<F>(mut budget: SpinBudget, mut cond: F) -> Result<()>
where
    F: FnMut() -> bool,
{
    loop {
        if cond() {
            return Ok(());
        }
        if budget.tick() {
            return Err(Error::Timeout);
        }
        core::hint::spin_loop();
    }
}
