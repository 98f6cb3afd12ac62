//! Purpose: Monotonic percentage reported while a hydration run is in flight.
//! Exports: `Progress`, `COMPLETE`.
//! Invariants: Within one run the value never decreases and never exceeds 100.
//! Invariants: A new run starts from a fresh `Progress` at 0.

pub const COMPLETE: u8 = 100;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Progress {
    percent: u8,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    pub fn advance(&mut self, weight: u8) -> u8 {
        self.percent = self.percent.saturating_add(weight).min(COMPLETE);
        self.percent
    }

    pub fn is_complete(&self) -> bool {
        self.percent == COMPLETE
    }
}

#[cfg(test)]
mod tests {
    use super::Progress;

    #[test]
    fn advance_saturates_at_complete() {
        let mut progress = Progress::new();
        assert_eq!(progress.advance(60), 60);
        assert_eq!(progress.advance(0), 60);
        assert_eq!(progress.advance(90), 100);
        assert!(progress.is_complete());
        assert_eq!(progress.advance(10), 100);
    }
}
