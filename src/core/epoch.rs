//! Purpose: Generation counter that distinguishes one hydration run from the next.
//! Exports: `RunEpoch`, `EpochClock`.
//! Role: Shared between the controller and its running scheduler; refocus advances it.
//! Invariants: Epochs only move forward and are never reused within a process.
//! Invariants: Epoch 0 means no run has started.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RunEpoch(u64);

impl RunEpoch {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RunEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Default)]
pub struct EpochClock {
    current: AtomicU64,
}

impl EpochClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> RunEpoch {
        RunEpoch(self.current.load(Ordering::Acquire))
    }

    /// Starts a new generation and returns it.
    pub fn advance(&self) -> RunEpoch {
        RunEpoch(self.current.fetch_add(1, Ordering::AcqRel).saturating_add(1))
    }

    pub fn is_current(&self, epoch: RunEpoch) -> bool {
        self.current() == epoch
    }
}
