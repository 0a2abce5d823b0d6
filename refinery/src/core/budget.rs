//! Oracle call budget and per-phase cap allocation.

use serde::Serialize;

/// Calls consumed against a fixed ceiling for one orchestration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Budget {
    max_calls: u32,
    used: u32,
}

impl Budget {
    pub fn new(max_calls: u32) -> Self {
        Self { max_calls, used: 0 }
    }

    /// Record calls a finished phase reported.
    pub fn charge(&mut self, calls: u32) {
        self.used = self.used.saturating_add(calls);
    }

    pub fn max_calls(&self) -> u32 {
        self.max_calls
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn remaining(&self) -> u32 {
        self.max_calls.saturating_sub(self.used)
    }

    pub fn is_exhausted(&self) -> bool {
        self.used >= self.max_calls
    }
}

/// Extractor iteration cap: a third of the whole budget, at least one, at most `ceiling`.
pub fn extractor_cap(max_calls: u32, ceiling: u32) -> u32 {
    if max_calls == 0 {
        return 0;
    }
    ceiling.min((max_calls / 3).max(1))
}

/// Validator iteration cap.
pub fn validator_cap(remaining: u32, ceiling: u32) -> u32 {
    ceiling.min(remaining)
}

/// Refiner iteration cap: half of what is left, at most `ceiling`.
pub fn refiner_cap(remaining: u32, ceiling: u32) -> u32 {
    ceiling.min(remaining / 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_tracks_remaining() {
        let mut budget = Budget::new(5);
        budget.charge(3);
        assert_eq!(budget.remaining(), 2);
        assert!(!budget.is_exhausted());
        budget.charge(4);
        assert_eq!(budget.remaining(), 0);
        assert!(budget.is_exhausted());
        assert_eq!(budget.used(), 7);
    }

    #[test]
    fn zero_budget_is_exhausted_immediately() {
        assert!(Budget::new(0).is_exhausted());
        assert_eq!(extractor_cap(0, 8), 0);
    }

    #[test]
    fn extractor_cap_scales_with_budget() {
        assert_eq!(extractor_cap(24, 8), 8);
        assert_eq!(extractor_cap(30, 8), 8);
        assert_eq!(extractor_cap(9, 8), 3);
        assert_eq!(extractor_cap(2, 8), 1);
    }

    #[test]
    fn later_caps_follow_remaining_calls() {
        assert_eq!(validator_cap(10, 2), 2);
        assert_eq!(validator_cap(1, 2), 1);
        assert_eq!(validator_cap(0, 2), 0);
        assert_eq!(refiner_cap(20, 5), 5);
        assert_eq!(refiner_cap(5, 5), 2);
        assert_eq!(refiner_cap(1, 5), 0);
    }
}
