//! Pump scheduling and the manual override timer.
//!
//! ```text
//! Scheduled ──[run command]──▶ Override ──[> PUMP_OVERRIDE_MS elapsed]──▶ Scheduled
//!     ▲ │                          │
//!     └─┘ minute edge              └── minute edges update `commanded` only
//! ```
//!
//! `PumpState` only decides. The controller writes [`PumpState::output`] to
//! the hardware whenever it changes.

/// Hours at which the pump runs for the first minute.
pub const PUMP_SCHEDULE_HOURS: [u8; 3] = [6, 12, 18];

/// Manual override duration.
pub const PUMP_OVERRIDE_MS: u64 = 60_000;

/// Scheduled decision for a wall-clock time.
pub fn scheduled_on(hour: u8, minute: u8) -> bool {
    minute == 0 && PUMP_SCHEDULE_HOURS.contains(&hour)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Override {
    pub started_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpState {
    /// Latest scheduled decision.
    pub commanded: bool,
    /// Active manual override, if any. Volatile: never persisted.
    pub manual: Option<Override>,
}

/// Result of a run-pump request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideStart {
    Started,
    /// An override was already running; its deadline is unchanged.
    AlreadyRunning { remaining_ms: u64 },
}

impl PumpState {
    /// Recompute the scheduled decision. Never touches an active override.
    pub fn apply_schedule(&mut self, hour: u8, minute: u8) {
        self.commanded = scheduled_on(hour, minute);
    }

    pub fn start_override(&mut self, now_ms: u64) -> OverrideStart {
        if let Some(ov) = self.manual {
            return OverrideStart::AlreadyRunning {
                remaining_ms: remaining(ov, now_ms),
            };
        }
        self.manual = Some(Override { started_ms: now_ms });
        OverrideStart::Started
    }

    /// Clear the override once strictly more than [`PUMP_OVERRIDE_MS`] has
    /// passed. Returns true if it expired on this call.
    pub fn poll_override(&mut self, now_ms: u64) -> bool {
        match self.manual {
            Some(ov) if now_ms.saturating_sub(ov.started_ms) > PUMP_OVERRIDE_MS => {
                self.manual = None;
                true
            }
            _ => false,
        }
    }

    pub fn override_active(&self) -> bool {
        self.manual.is_some()
    }

    pub fn override_remaining_ms(&self, now_ms: u64) -> Option<u64> {
        self.manual.map(|ov| remaining(ov, now_ms))
    }

    /// What the physical pump should be doing.
    pub fn output(&self) -> bool {
        self.override_active() || self.commanded
    }
}

fn remaining(ov: Override, now_ms: u64) -> u64 {
    PUMP_OVERRIDE_MS.saturating_sub(now_ms.saturating_sub(ov.started_ms))
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_matches_rule_for_every_minute_of_the_day() {
        for hour in 0..24u8 {
            for minute in 0..60u8 {
                let expected = minute == 0 && (hour == 6 || hour == 12 || hour == 18);
                assert_eq!(scheduled_on(hour, minute), expected, "{hour:02}:{minute:02}");
            }
        }
    }

    #[test]
    fn six_oclock_on_then_off_a_minute_later() {
        let mut pump = PumpState::default();
        pump.apply_schedule(5, 59);
        assert!(!pump.output());
        pump.apply_schedule(6, 0);
        assert!(pump.output());
        pump.apply_schedule(6, 1);
        assert!(!pump.output());
    }

    #[test]
    fn override_holds_output_on_until_expiry() {
        let mut pump = PumpState::default();
        assert_eq!(pump.start_override(1_000), OverrideStart::Started);
        assert!(pump.output());

        pump.apply_schedule(10, 15);
        assert!(pump.output(), "schedule must not turn the override off");

        assert!(!pump.poll_override(61_000), "exactly 60 s is not yet expired");
        assert!(pump.output());

        assert!(pump.poll_override(61_001));
        assert!(!pump.output());
    }

    #[test]
    fn second_start_does_not_extend_deadline() {
        let mut pump = PumpState::default();
        pump.start_override(0);
        assert_eq!(
            pump.start_override(20_000),
            OverrideStart::AlreadyRunning { remaining_ms: 40_000 }
        );
        assert!(pump.poll_override(60_001));
    }

    #[test]
    fn expiry_returns_to_scheduled_decision() {
        let mut pump = PumpState::default();
        pump.start_override(0);
        pump.apply_schedule(12, 0);
        assert!(pump.poll_override(60_500));
        assert!(pump.output(), "still inside the scheduled minute");
    }

    #[test]
    fn scheduled_on_does_not_start_an_override() {
        let mut pump = PumpState::default();
        pump.apply_schedule(18, 0);
        assert!(!pump.override_active());
        assert_eq!(pump.override_remaining_ms(0), None);
    }

    #[test]
    fn poll_without_override_is_noop() {
        let mut pump = PumpState::default();
        assert!(!pump.poll_override(u64::MAX));
    }
}
