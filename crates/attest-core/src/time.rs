//! Ledger time source
//!
//! Timestamps are assigned by the ledger, never by the client. The clock is a
//! trait so tests can drive time explicitly.

use chrono::Utc;
use std::fmt;

/// Source of ledger timestamps, in milliseconds since the Unix epoch
pub trait LedgerClock: Send + Sync + fmt::Debug {
    /// Current wall-clock reading
    fn now_millis(&self) -> u64;
}

/// Wall clock backed by `chrono::Utc`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl LedgerClock for SystemClock {
    fn now_millis(&self) -> u64 {
        u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
    }
}

/// Monotonic wrapper: never hands out a value lower than one already issued
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HighWaterMark(u64);

impl HighWaterMark {
    /// Start from a previously observed timestamp
    pub const fn new(start: u64) -> Self {
        Self(start)
    }

    /// Last value issued
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Propose a reading without committing it
    pub fn peek(&self, reading: u64) -> u64 {
        reading.max(self.0)
    }

    /// Commit a timestamp that was previously returned by `peek`
    pub fn advance_to(&mut self, timestamp: u64) {
        self.0 = self.0.max(timestamp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_high_water_mark_never_decreases() {
        let mut mark = HighWaterMark::new(100);
        assert_eq!(mark.peek(50), 100);
        assert_eq!(mark.peek(150), 150);
        mark.advance_to(150);
        mark.advance_to(120);
        assert_eq!(mark.value(), 150);
    }

    #[test]
    fn test_system_clock_is_positive() {
        assert!(SystemClock.now_millis() > 0);
    }
}
