//! Capability traits for the radio, clock, timer and power hardware.
//!
//! A node owns one implementation of each, handed over at construction.
//! Deployments bind real drivers; tests and the simulator bind the mocks in
//! [`test_impls`] or their own recorders.

use core::fmt::Debug;

use crate::time::Timestamp;
use crate::types::{NodeId, TimerTag};

/// Radio link shared with other protocols.
///
/// Inbound frames are not pulled through this trait: the radio driver (or
/// simulator) hands each frame to [`Node::on_receive`](crate::Node::on_receive)
/// from its receive callback.
pub trait Radio {
    /// Local node identifier.
    fn id(&self) -> NodeId;

    /// Transmit `data` to `dest`, which may be
    /// [`BROADCAST_ADDRESS`](crate::types::BROADCAST_ADDRESS).
    ///
    /// May block until the frame is on air. The node keeps the radio awake
    /// for the duration of the call.
    fn send(&mut self, dest: NodeId, data: &[u8]);
}

/// Monotonic platform clock.
///
/// Platforms expose time in their own representation; the node only asks
/// for it to be split into whole seconds and a millisecond remainder.
///
/// # Example
///
/// ```
/// use sstree::traits::test_impls::MockClock;
/// use sstree::{Clock, Duration, Timestamp};
///
/// let clock = MockClock::new();
/// clock.advance(Duration::from_millis(2_500));
/// assert_eq!(clock.now(), Timestamp::from_millis(2_500));
/// assert_eq!(clock.seconds(clock.time()), 2);
/// assert_eq!(clock.milliseconds(clock.time()), 500);
/// ```
pub trait Clock {
    /// Platform time value.
    type Time: Copy;

    /// Current platform time.
    fn time(&self) -> Self::Time;

    /// Whole seconds of `t`.
    fn seconds(&self, t: Self::Time) -> u64;

    /// Millisecond part of `t` below the second (0-999).
    fn milliseconds(&self, t: Self::Time) -> u16;

    /// Current time as absolute milliseconds.
    fn now(&self) -> Timestamp {
        let t = self.time();
        Timestamp::from_secs_millis(self.seconds(t), self.milliseconds(t))
    }
}

/// One-shot timer service.
///
/// When a scheduled timer expires the platform calls
/// [`Node::handle_timer`](crate::Node::handle_timer) with the tag it was
/// scheduled under. A cancelled timer must never be delivered.
pub trait Timer {
    /// Identifies a pending timer for cancellation.
    type Handle: Copy + PartialEq + Debug;

    /// Schedule a one-shot expiry at absolute time `at`.
    fn schedule(&mut self, at: Timestamp, tag: TimerTag) -> Self::Handle;

    /// Cancel a pending timer. Cancelling an expired handle is a no-op.
    fn cancel(&mut self, handle: Self::Handle);
}

/// Reference-counted keep-awake requests.
///
/// Every `push_caffeine` is matched by exactly one `pop_caffeine`; nested
/// pairs are allowed. The radio may sleep only when the count is zero.
pub trait PowerControl {
    fn push_caffeine(&mut self);
    fn pop_caffeine(&mut self);
}

/// Keeps the radio awake while alive.
///
/// Releases on drop, so the request is returned even if the guarded
/// operation unwinds.
pub struct Caffeine<'a, P: PowerControl> {
    power: &'a mut P,
}

impl<'a, P: PowerControl> Caffeine<'a, P> {
    pub fn acquire(power: &'a mut P) -> Self {
        power.push_caffeine();
        Self { power }
    }
}

impl<P: PowerControl> Drop for Caffeine<'_, P> {
    fn drop(&mut self) {
        self.power.pop_caffeine();
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_impls {
    //! Mock implementations of traits for unit testing and doc tests.
    //!
    //! Available when running tests or with the `test-support` feature enabled.

    use alloc::vec::Vec;
    use core::cell::Cell;

    use super::*;
    use crate::time::Duration;

    /// Mock radio recording every transmitted frame.
    pub struct MockRadio {
        id: NodeId,
        pub sent: Vec<(NodeId, Vec<u8>)>,
    }

    impl MockRadio {
        pub fn new(id: NodeId) -> Self {
            Self {
                id,
                sent: Vec::new(),
            }
        }

        /// Take all frames sent so far.
        pub fn take_sent(&mut self) -> Vec<(NodeId, Vec<u8>)> {
            core::mem::take(&mut self.sent)
        }
    }

    impl Radio for MockRadio {
        fn id(&self) -> NodeId {
            self.id
        }

        fn send(&mut self, dest: NodeId, data: &[u8]) {
            self.sent.push((dest, data.to_vec()));
        }
    }

    /// Mock clock for testing (time advances manually).
    pub struct MockClock {
        current: Cell<Timestamp>,
    }

    impl Default for MockClock {
        fn default() -> Self {
            Self {
                current: Cell::new(Timestamp::ZERO),
            }
        }
    }

    impl MockClock {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn at(time: Timestamp) -> Self {
            Self {
                current: Cell::new(time),
            }
        }

        pub fn set(&self, time: Timestamp) {
            self.current.set(time);
        }

        pub fn advance(&self, duration: Duration) {
            self.current.set(self.current.get() + duration);
        }
    }

    impl Clock for MockClock {
        type Time = Timestamp;

        fn time(&self) -> Timestamp {
            self.current.get()
        }

        fn seconds(&self, t: Timestamp) -> u64 {
            t.as_secs()
        }

        fn milliseconds(&self, t: Timestamp) -> u16 {
            t.subsec_millis()
        }
    }

    /// Mock timer recording schedules and cancellations.
    #[derive(Default)]
    pub struct MockTimer {
        next_handle: u32,
        pub scheduled: Vec<(u32, Timestamp, TimerTag)>,
        pub cancelled: Vec<u32>,
    }

    impl MockTimer {
        pub fn new() -> Self {
            Self::default()
        }

        /// Timers scheduled and not cancelled, in scheduling order.
        pub fn pending(&self) -> impl Iterator<Item = &(u32, Timestamp, TimerTag)> {
            self.scheduled
                .iter()
                .filter(|(h, _, _)| !self.cancelled.contains(h))
        }

        /// Pending timers with the given tag.
        pub fn pending_for(&self, tag: TimerTag) -> Vec<(u32, Timestamp)> {
            self.pending()
                .filter(|(_, _, t)| *t == tag)
                .map(|(h, at, _)| (*h, *at))
                .collect()
        }
    }

    impl Timer for MockTimer {
        type Handle = u32;

        fn schedule(&mut self, at: Timestamp, tag: TimerTag) -> u32 {
            let handle = self.next_handle;
            self.next_handle = self.next_handle.wrapping_add(1);
            self.scheduled.push((handle, at, tag));
            handle
        }

        fn cancel(&mut self, handle: u32) {
            self.cancelled.push(handle);
        }
    }

    /// Mock power control tracking keep-awake nesting.
    #[derive(Default)]
    pub struct MockPower {
        pub depth: u32,
        pub max_depth: u32,
        pub pushes: u32,
    }

    impl MockPower {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl PowerControl for MockPower {
        fn push_caffeine(&mut self) {
            self.depth += 1;
            self.pushes += 1;
            self.max_depth = self.max_depth.max(self.depth);
        }

        fn pop_caffeine(&mut self) {
            self.depth = self
                .depth
                .checked_sub(1)
                .expect("pop_caffeine without matching push");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_impls::*;
    use super::*;

    #[test]
    fn test_caffeine_guard_balances() {
        let mut power = MockPower::new();
        {
            let _guard = Caffeine::acquire(&mut power);
        }
        assert_eq!(power.depth, 0);
        assert_eq!(power.pushes, 1);
        assert_eq!(power.max_depth, 1);
    }

    #[test]
    fn test_clock_folds_seconds_and_millis() {
        let clock = MockClock::at(Timestamp::from_millis(61_042));
        assert_eq!(clock.now().as_millis(), 61_042);
    }

    #[test]
    fn test_mock_timer_pending_excludes_cancelled() {
        let mut timer = MockTimer::new();
        let a = timer.schedule(Timestamp::from_millis(10), TimerTag::Watchdog(3));
        let b = timer.schedule(Timestamp::from_millis(20), TimerTag::Watchdog(3));
        timer.cancel(a);
        assert_eq!(
            timer.pending_for(TimerTag::Watchdog(3)),
            alloc::vec![(b, Timestamp::from_millis(20))]
        );
    }
}
