//! Reservoir temperature high-water mark.

use crate::hw::DISCONNECTED_F;

/// Minutes between samples; sampling happens on minute edges divisible by it.
pub const SAMPLE_EVERY_MIN: u8 = 15;

/// DS18B20 measurement range, -55..=125 °C.
const VALID_RANGE_F: std::ops::RangeInclusive<f32> = -67.0..=257.0;

pub fn is_sample_minute(minute: u8) -> bool {
    minute % SAMPLE_EVERY_MIN == 0
}

/// Reject sensor sentinels and anything the probe cannot physically report.
pub fn is_valid_reading(temp_f: f32) -> bool {
    temp_f != DISCONNECTED_F && temp_f.is_finite() && VALID_RANGE_F.contains(&temp_f)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sample {
    /// Reading exceeded the stored maximum and replaced it.
    NewMax(f32),
    Recorded(f32),
    Invalid(f32),
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TemperatureMonitor {
    max_f: f32,
    last_f: Option<f32>,
}

impl TemperatureMonitor {
    pub fn new(persisted_max_f: f32) -> Self {
        Self {
            max_f: persisted_max_f,
            last_f: None,
        }
    }

    /// Fold a reading in. The maximum never decreases.
    pub fn observe(&mut self, temp_f: f32) -> Sample {
        if !is_valid_reading(temp_f) {
            return Sample::Invalid(temp_f);
        }
        self.last_f = Some(temp_f);
        if temp_f > self.max_f {
            self.max_f = temp_f;
            Sample::NewMax(temp_f)
        } else {
            Sample::Recorded(temp_f)
        }
    }

    pub fn max_f(&self) -> f32 {
        self.max_f
    }

    pub fn last_f(&self) -> Option<f32> {
        self.last_f
    }
}

// ===========================================================================
// Tests
// ===========================================================================
