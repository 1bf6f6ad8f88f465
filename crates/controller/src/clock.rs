//! Wall-clock source. The controller never reads the system clock itself;
//! every handler receives a [`Now`] captured once per loop iteration.

use anyhow::{Context, Result};
use std::time::Instant;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

/// One reading of the clock, in the controller's local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Now {
    /// 0-23
    pub hour: u8,
    /// 0-59
    pub minute: u8,
    pub epoch_secs: u64,
    /// Monotonic milliseconds since boot. Only used for override timing.
    pub uptime_ms: u64,
}

impl Now {
    /// Capture a reading from a local date-time.
    pub fn from_datetime(local: OffsetDateTime, uptime_ms: u64) -> Self {
        Self {
            hour: local.hour(),
            minute: local.minute(),
            epoch_secs: local.unix_timestamp().max(0) as u64,
            uptime_ms,
        }
    }
}

pub struct SystemClock {
    offset: UtcOffset,
    started: Instant,
}

impl SystemClock {
    pub fn new(offset: UtcOffset) -> Self {
        Self {
            offset,
            started: Instant::now(),
        }
    }

    pub fn offset(&self) -> UtcOffset {
        self.offset
    }

    pub fn now(&self) -> Now {
        Now::from_datetime(
            OffsetDateTime::now_utc().to_offset(self.offset),
            self.started.elapsed().as_millis() as u64,
        )
    }
}

/// Build a UTC offset from a signed number of minutes.
pub fn offset_from_minutes(minutes: i32) -> Result<UtcOffset> {
    UtcOffset::from_whole_seconds(minutes * 60)
        .with_context(|| format!("invalid utc offset: {minutes} minutes"))
}

/// Format an epoch as a short calendar date (`MM/DD/YY`) in `offset`.
pub fn format_date(epoch_secs: u64, offset: UtcOffset) -> Result<String> {
    let secs = i64::try_from(epoch_secs).context("epoch out of range")?;
    let date = OffsetDateTime::from_unix_timestamp(secs)
        .context("epoch out of range")?
        .to_offset(offset);
    date.format(format_description!("[month]/[day]/[year repr:last_two]"))
        .context("failed to format date")
}

// ===========================================================================
// Tests
// ===========================================================================
