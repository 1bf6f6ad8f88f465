//! Recurring nutrient-refill reminder keyed off a persisted epoch.

/// Two weeks.
pub const NUTRIENT_REMINDER_INTERVAL_SECS: u64 = 1_209_600;

/// Hour at which a due reminder is sent.
pub const NUTRIENT_REMINDER_HOUR: u8 = 9;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NutrientReminder {
    /// 0 disables the reminder.
    next_epoch: u64,
}

impl NutrientReminder {
    pub fn new(next_epoch: u64) -> Self {
        Self { next_epoch }
    }

    pub fn next_epoch(&self) -> u64 {
        self.next_epoch
    }

    pub fn is_enabled(&self) -> bool {
        self.next_epoch != 0
    }

    /// Due from the deadline onwards until reset. Never advances on its own.
    pub fn is_due(&self, now_epoch: u64) -> bool {
        self.is_enabled() && now_epoch >= self.next_epoch
    }

    /// Push the deadline one interval past `now_epoch` and return it.
    pub fn reset(&mut self, now_epoch: u64) -> u64 {
        self.next_epoch = now_epoch.saturating_add(NUTRIENT_REMINDER_INTERVAL_SECS);
        self.next_epoch
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_never_due() {
        let r = NutrientReminder::new(0);
        assert!(!r.is_enabled());
        assert!(!r.is_due(0));
        assert!(!r.is_due(u64::MAX));
    }

    #[test]
    fn due_at_and_after_deadline() {
        let r = NutrientReminder::new(1_000);
        assert!(!r.is_due(999));
        assert!(r.is_due(1_000));
        assert!(r.is_due(1_000 + 86_400 * 3));
    }

    #[test]
    fn reset_sets_two_weeks_out() {
        let mut r = NutrientReminder::default();
        let t = 1_700_000_000;
        assert_eq!(r.reset(t), t + 1_209_600);
        assert_eq!(r.next_epoch(), 1_701_209_600);
        assert!(!r.is_due(t));
    }
}
