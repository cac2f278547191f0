//! Time types for the tree protocol.
//!
//! Platform clocks hand out opaque time values that decompose into seconds
//! and milliseconds. The protocol folds those into a single absolute
//! millisecond counter ([`Timestamp`]) so that liveness arithmetic never
//! depends on the platform representation.

use core::ops::{Add, Mul, Sub};

/// Absolute local time in milliseconds.
///
/// Only meaningful on the node that produced it; timestamps are never
/// exchanged over the air.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Zero timestamp (clock epoch).
    pub const ZERO: Timestamp = Timestamp(0);

    /// Maximum timestamp.
    pub const MAX: Timestamp = Timestamp(u64::MAX);

    /// Create a timestamp from milliseconds.
    #[inline]
    pub const fn from_millis(ms: u64) -> Self {
        Timestamp(ms)
    }

    /// Create a timestamp from seconds.
    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        Timestamp(secs.saturating_mul(1000))
    }

    /// Combine a clock reading split into whole seconds and a millisecond part.
    #[inline]
    pub const fn from_secs_millis(secs: u64, millis: u16) -> Self {
        Timestamp(secs.saturating_mul(1000).saturating_add(millis as u64))
    }

    /// Get the timestamp as milliseconds.
    #[inline]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Get the timestamp as seconds (truncated).
    #[inline]
    pub const fn as_secs(self) -> u64 {
        self.0 / 1000
    }

    /// Millisecond part below the current second.
    #[inline]
    pub const fn subsec_millis(self) -> u16 {
        (self.0 % 1000) as u16
    }

    /// Saturating addition of a duration.
    #[inline]
    pub const fn saturating_add(self, duration: Duration) -> Self {
        Timestamp(self.0.saturating_add(duration.0))
    }

    /// Saturating subtraction of another timestamp, returning a duration.
    #[inline]
    pub const fn saturating_sub(self, other: Timestamp) -> Duration {
        Duration(self.0.saturating_sub(other.0))
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    #[inline]
    fn add(self, rhs: Duration) -> Timestamp {
        self.saturating_add(rhs)
    }
}

impl Sub for Timestamp {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: Timestamp) -> Duration {
        self.saturating_sub(rhs)
    }
}

/// Duration in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Duration(u64);

impl Duration {
    /// Zero duration.
    pub const ZERO: Duration = Duration(0);

    /// Create a duration from milliseconds.
    #[inline]
    pub const fn from_millis(ms: u64) -> Self {
        Duration(ms)
    }

    /// Create a duration from seconds.
    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        Duration(secs.saturating_mul(1000))
    }

    /// Get the duration as milliseconds.
    #[inline]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Get the duration as seconds (truncated).
    #[inline]
    pub const fn as_secs(self) -> u64 {
        self.0 / 1000
    }

    /// Saturating multiplication.
    #[inline]
    pub const fn saturating_mul(self, n: u64) -> Self {
        Duration(self.0.saturating_mul(n))
    }

    /// Integer division, used for fractional grace periods.
    #[inline]
    pub const fn div_u64(self, n: u64) -> Self {
        Duration(self.0 / n)
    }
}

impl Add for Duration {
    type Output = Duration;

    #[inline]
    fn add(self, rhs: Duration) -> Duration {
        Duration(self.0.saturating_add(rhs.0))
    }
}

impl Mul<u64> for Duration {
    type Output = Duration;

    #[inline]
    fn mul(self, rhs: u64) -> Duration {
        self.saturating_mul(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secs_millis_combination() {
        let t = Timestamp::from_secs_millis(12, 345);
        assert_eq!(t.as_millis(), 12_345);
        assert_eq!(t.as_secs(), 12);
        assert_eq!(t.subsec_millis(), 345);
    }

    #[test]
    fn test_timestamp_arithmetic() {
        let t1 = Timestamp::from_millis(1000);
        let t2 = t1 + Duration::from_millis(400);
        assert_eq!(t2.as_millis(), 1400);
        assert_eq!((t2 - t1).as_millis(), 400);
    }

    #[test]
    fn test_subtraction_saturates() {
        // An out-of-order reading must not look like a huge idle time.
        let earlier = Timestamp::from_secs(5);
        let later = Timestamp::from_secs(10);
        assert_eq!(earlier - later, Duration::ZERO);
        assert_eq!(Timestamp::MAX + Duration::from_secs(1), Timestamp::MAX);
    }

    #[test]
    fn test_duration_scaling() {
        let bcast = Duration::from_millis(200);
        assert_eq!((bcast * 2).as_millis(), 400);
        assert_eq!(bcast.div_u64(4).as_millis(), 50);
    }
}
