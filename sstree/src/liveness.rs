//! Per-neighbor broadcast watchdogs.
//!
//! Each regular broadcast from a neighbor (re)arms a one-shot timer at the
//! moment its next regular broadcast is expected, plus a grace period. A
//! watchdog that fires before being re-armed reports a [`MissedBroadcast`].
//! This is separate from eviction: the neighbor stays in the table until the
//! dead interval passes.
//!
//! The expected interval is learned from the spacing of consecutive hits and
//! falls back to the configured broadcast interval for a fresh neighbor.
//! Spacings shorter than the configured interval, such as a restart followed
//! by its first tick, are raised to it.

use crate::time::{Duration, Timestamp};
use crate::traits::Timer;
use crate::types::{MissedBroadcast, NodeId, TimerTag, MAX_NEIGHBORS};

#[derive(Clone, Copy, Debug)]
struct Watchdog<H> {
    neighbor: NodeId,
    handle: H,
    deadline: Timestamp,
    last_hit: Timestamp,
    interval: Duration,
}

/// At most one pending watchdog per neighbor, `N` neighbors at most.
pub struct Watchdogs<H, const N: usize = MAX_NEIGHBORS> {
    slots: [Option<Watchdog<H>>; N],
}

impl<H: Copy + PartialEq, const N: usize> Default for Watchdogs<H, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Copy + PartialEq, const N: usize> Watchdogs<H, N> {
    pub fn new() -> Self {
        Self { slots: [None; N] }
    }

    fn index_of(&self, neighbor: NodeId) -> Option<usize> {
        self.slots
            .iter()
            .position(|w| w.is_some_and(|w| w.neighbor == neighbor))
    }

    /// Arm (or re-arm) the watchdog for `neighbor` after a regular broadcast
    /// heard at `now`. Any pending timer for the same neighbor is cancelled
    /// first. Returns the new deadline, or `None` if every slot is in use.
    pub fn arm<T>(
        &mut self,
        timer: &mut T,
        neighbor: NodeId,
        now: Timestamp,
        default_interval: Duration,
        grace: Duration,
    ) -> Option<Timestamp>
    where
        T: Timer<Handle = H>,
    {
        let (index, interval) = match self.index_of(neighbor) {
            Some(i) => {
                let previous = self.slots[i]?;
                timer.cancel(previous.handle);
                let observed = now - previous.last_hit;
                let interval = if observed == Duration::ZERO {
                    previous.interval
                } else {
                    observed.max(default_interval)
                };
                (i, interval)
            }
            None => {
                let i = self.slots.iter().position(Option::is_none)?;
                (i, default_interval)
            }
        };

        let deadline = now + interval + grace;
        let handle = timer.schedule(deadline, TimerTag::Watchdog(neighbor));
        self.slots[index] = Some(Watchdog {
            neighbor,
            handle,
            deadline,
            last_hit: now,
            interval,
        });
        Some(deadline)
    }

    /// Cancel and forget the watchdog for `neighbor`.
    pub fn disarm<T>(&mut self, timer: &mut T, neighbor: NodeId) -> bool
    where
        T: Timer<Handle = H>,
    {
        let Some(index) = self.index_of(neighbor) else {
            return false;
        };
        if let Some(w) = self.slots[index].take() {
            timer.cancel(w.handle);
        }
        true
    }

    /// Handle expiry of the watchdog timer for `neighbor` at `now`.
    ///
    /// Expiries that no longer match a pending deadline (already re-armed,
    /// disarmed, or delivered early) are ignored.
    pub fn expire(&mut self, neighbor: NodeId, now: Timestamp) -> Option<MissedBroadcast> {
        let index = self.index_of(neighbor)?;
        let w = self.slots[index]?;
        if now < w.deadline {
            return None;
        }
        self.slots[index] = None;
        Some(MissedBroadcast {
            neighbor,
            deadline: w.deadline,
        })
    }

    /// Pending deadline for `neighbor`.
    pub fn deadline(&self, neighbor: NodeId) -> Option<Timestamp> {
        self.slots[self.index_of(neighbor)?].map(|w| w.deadline)
    }

    /// Number of pending watchdogs.
    pub fn armed(&self) -> usize {
        self.slots.iter().filter(|w| w.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::test_impls::MockTimer;

    const BCAST: Duration = Duration::from_millis(200);
    const GRACE: Duration = Duration::from_millis(50);

    fn at(ms: u64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    #[test]
    fn test_first_arm_uses_default_interval() {
        let mut timer = MockTimer::new();
        let mut dogs: Watchdogs<u32> = Watchdogs::new();
        let deadline = dogs.arm(&mut timer, 4, at(1000), BCAST, GRACE);
        assert_eq!(deadline, Some(at(1250)));
        assert_eq!(timer.pending_for(TimerTag::Watchdog(4)), [(0, at(1250))]);
    }

    #[test]
    fn test_rearm_cancels_previous_and_learns_interval() {
        let mut timer = MockTimer::new();
        let mut dogs: Watchdogs<u32> = Watchdogs::new();
        dogs.arm(&mut timer, 4, at(1000), BCAST, GRACE);
        let deadline = dogs.arm(&mut timer, 4, at(1300), BCAST, GRACE);

        // Observed spacing of 300 ms replaces the default.
        assert_eq!(deadline, Some(at(1650)));
        assert_eq!(timer.cancelled, [0]);
        assert_eq!(timer.pending_for(TimerTag::Watchdog(4)), [(1, at(1650))]);
        assert_eq!(dogs.armed(), 1);
    }

    #[test]
    fn test_short_spacing_keeps_default_interval() {
        let mut timer = MockTimer::new();
        let mut dogs: Watchdogs<u32> = Watchdogs::new();
        dogs.arm(&mut timer, 4, at(1000), BCAST, GRACE);
        let deadline = dogs.arm(&mut timer, 4, at(1005), BCAST, GRACE);

        assert_eq!(deadline, Some(at(1255)));
        // The next regular broadcast, one period later, is not a miss.
        assert_eq!(dogs.expire(4, at(1205)), None);
        assert_eq!(dogs.arm(&mut timer, 4, at(1205), BCAST, GRACE), Some(at(1455)));
    }

    #[test]
    fn test_expire_reports_missed_broadcast() {
        let mut timer = MockTimer::new();
        let mut dogs: Watchdogs<u32> = Watchdogs::new();
        dogs.arm(&mut timer, 7, at(0), BCAST, GRACE);

        assert_eq!(dogs.expire(7, at(249)), None);
        assert_eq!(
            dogs.expire(7, at(250)),
            Some(MissedBroadcast {
                neighbor: 7,
                deadline: at(250)
            })
        );
        // Signalled once.
        assert_eq!(dogs.expire(7, at(300)), None);
        assert_eq!(dogs.armed(), 0);
    }

    #[test]
    fn test_stale_expiry_after_rearm_ignored() {
        let mut timer = MockTimer::new();
        let mut dogs: Watchdogs<u32> = Watchdogs::new();
        dogs.arm(&mut timer, 7, at(0), BCAST, GRACE);
        dogs.arm(&mut timer, 7, at(200), BCAST, GRACE);
        // A platform that delivered the old timer anyway.
        assert_eq!(dogs.expire(7, at(250)), None);
        assert_eq!(dogs.deadline(7), Some(at(450)));
    }

    #[test]
    fn test_disarm_cancels() {
        let mut timer = MockTimer::new();
        let mut dogs: Watchdogs<u32> = Watchdogs::new();
        dogs.arm(&mut timer, 3, at(0), BCAST, GRACE);
        assert!(dogs.disarm(&mut timer, 3));
        assert!(!dogs.disarm(&mut timer, 3));
        assert_eq!(timer.cancelled, [0]);
        assert_eq!(dogs.expire(3, at(1000)), None);
    }

    #[test]
    fn test_full_watchdog_table_skips_arming() {
        let mut timer = MockTimer::new();
        let mut dogs: Watchdogs<u32, 2> = Watchdogs::new();
        assert!(dogs.arm(&mut timer, 1, at(0), BCAST, GRACE).is_some());
        assert!(dogs.arm(&mut timer, 2, at(0), BCAST, GRACE).is_some());
        assert!(dogs.arm(&mut timer, 3, at(0), BCAST, GRACE).is_none());
        assert_eq!(timer.scheduled.len(), 2);
        // Known neighbors still re-arm.
        assert!(dogs.arm(&mut timer, 1, at(200), BCAST, GRACE).is_some());
    }
}
