//! Compile-time timing configuration.
//!
//! The `TreeConfig` trait fixes the broadcast cadence and the liveness
//! thresholds derived from it. Use `DefaultConfig` for mains-powered or
//! lightly duty-cycled radios and `LowPowerConfig` when the radio sleeps
//! most of the time.
//!
//! Neighbor table capacity is not part of the trait: it is the const
//! generic `N` on [`Node`](crate::Node) and
//! [`NeighborTable`](crate::table::NeighborTable), defaulting to
//! [`MAX_NEIGHBORS`](crate::types::MAX_NEIGHBORS).
//!
//! # Example
//!
//! ```
//! use sstree::config::TreeConfig;
//! use sstree::Duration;
//!
//! struct SlowConfig;
//!
//! impl TreeConfig for SlowConfig {
//!     const BROADCAST_INTERVAL: Duration = Duration::from_secs(5);
//! }
//!
//! assert_eq!(SlowConfig::DEAD_INTERVAL, Duration::from_secs(10));
//! ```

use crate::time::Duration;

/// Timing configuration for a tree node.
pub trait TreeConfig {
    /// Period between regular state broadcasts.
    const BROADCAST_INTERVAL: Duration;

    /// Idle time after which a neighbor is evicted.
    const DEAD_INTERVAL: Duration = Self::BROADCAST_INTERVAL.saturating_mul(2);

    /// Slack past the expected next broadcast before a watchdog fires.
    const WATCHDOG_GRACE: Duration = Self::BROADCAST_INTERVAL.div_u64(4);
}

/// 200 ms cadence.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConfig;

impl TreeConfig for DefaultConfig {
    const BROADCAST_INTERVAL: Duration = Duration::from_millis(200);
}

/// 2 s cadence for duty-cycled radios.
#[derive(Debug, Clone, Copy, Default)]
pub struct LowPowerConfig;

impl TreeConfig for LowPowerConfig {
    const BROADCAST_INTERVAL: Duration = Duration::from_secs(2);
}
