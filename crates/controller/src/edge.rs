//! Turns a continuously polled clock into discrete minute/hour edges.
//!
//! Detection and acknowledgement are separate steps: the controller asks for
//! the pending edge, runs every handler, and only then acknowledges it. An
//! edge that was never acknowledged fires again on the next poll.

use crate::clock::Now;

/// Edges pending for the current clock reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub hour: u8,
    pub minute: u8,
    /// The hour also changed since the last acknowledged edge.
    pub hour_changed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockEdge {
    previous_hour: i8,
    previous_minute: i8,
}

impl Default for ClockEdge {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockEdge {
    /// Both values start unset so the first reading always fires.
    pub fn new() -> Self {
        Self {
            previous_hour: -1,
            previous_minute: -1,
        }
    }

    pub fn pending(&self, now: &Now) -> Option<Edge> {
        if i8::try_from(now.minute).ok() == Some(self.previous_minute) {
            return None;
        }
        Some(Edge {
            hour: now.hour,
            minute: now.minute,
            hour_changed: i8::try_from(now.hour).ok() != Some(self.previous_hour),
        })
    }

    /// Record `edge` as acted upon.
    pub fn acknowledge(&mut self, edge: Edge) {
        if edge.hour_changed {
            self.previous_hour = edge.hour as i8;
        }
        self.previous_minute = edge.minute as i8;
    }

    #[cfg(test)]
    pub fn previous_hour(&self) -> i8 {
        self.previous_hour
    }

    #[cfg(test)]
    pub fn previous_minute(&self) -> i8 {
        self.previous_minute
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn at(hour: u8, minute: u8) -> Now {
        Now {
            hour,
            minute,
            epoch_secs: 0,
            uptime_ms: 0,
        }
    }

    #[test]
    fn first_reading_fires_minute_and_hour() {
        let edge = ClockEdge::new();
        let e = edge.pending(&at(10, 30)).unwrap();
        assert!(e.hour_changed);
        assert_eq!((e.hour, e.minute), (10, 30));
    }

    #[test]
    fn same_minute_fires_nothing_after_ack() {
        let mut edge = ClockEdge::new();
        let e = edge.pending(&at(10, 30)).unwrap();
        edge.acknowledge(e);
        assert!(edge.pending(&at(10, 30)).is_none());
        assert!(edge.pending(&at(10, 30)).is_none());
    }

    #[test]
    fn minute_change_without_hour_change() {
        let mut edge = ClockEdge::new();
        edge.acknowledge(edge.pending(&at(10, 30)).unwrap());
        let e = edge.pending(&at(10, 31)).unwrap();
        assert!(!e.hour_changed);
    }

    #[test]
    fn hour_rollover_fires_hour_edge() {
        let mut edge = ClockEdge::new();
        edge.acknowledge(edge.pending(&at(5, 59)).unwrap());
        let e = edge.pending(&at(6, 0)).unwrap();
        assert!(e.hour_changed);
        edge.acknowledge(e);
        assert_eq!(edge.previous_hour(), 6);
        assert_eq!(edge.previous_minute(), 0);
    }

    #[test]
    fn unacknowledged_edge_fires_again() {
        let edge = ClockEdge::new();
        assert!(edge.pending(&at(6, 0)).is_some());
        assert!(edge.pending(&at(6, 0)).is_some());
        assert_eq!(edge.previous_minute(), -1);
    }

    #[test]
    fn day_rollover_fires_hour_edge() {
        let mut edge = ClockEdge::new();
        edge.acknowledge(edge.pending(&at(23, 59)).unwrap());
        let e = edge.pending(&at(0, 0)).unwrap();
        assert!(e.hour_changed);
    }
}
