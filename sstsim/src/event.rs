//! Event types and priority queue ordering for discrete event simulation.

use std::cmp::Ordering;

use sstree::{NodeId, TimerTag, Timestamp};

use crate::node::TimerHandle;

/// Unique sequence number for deterministic event ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SequenceNumber(u64);

impl SequenceNumber {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Scenario actions that can be scheduled during simulation.
#[derive(Debug, Clone)]
pub enum ScenarioAction {
    /// Partition the network into isolated groups.
    Partition { groups: Vec<Vec<NodeId>> },
    /// Heal all partitions (restore full connectivity).
    HealPartition,
    /// Disable a specific link.
    DisableLink { from: NodeId, to: NodeId },
    /// Enable a specific link.
    EnableLink { from: NodeId, to: NodeId },
    /// Set loss rate on a link.
    SetLossRate { from: NodeId, to: NodeId, rate: f64 },
    /// Power a node off permanently. It stops sending, receiving and ticking.
    KillNode { node: NodeId },
    /// Take a tree snapshot for metrics.
    TakeSnapshot,
}

/// Events in the discrete event simulation.
#[derive(Debug, Clone)]
pub enum Event {
    /// Deliver a frame to a node.
    MessageDelivery {
        to: NodeId,
        from: NodeId,
        data: Vec<u8>,
    },
    /// A timer scheduled by a node expires.
    TimerFire {
        node: NodeId,
        handle: TimerHandle,
        tag: TimerTag,
    },
    /// Execute a scenario action.
    ScenarioAction(ScenarioAction),
}

/// A scheduled event with timestamp and sequence number for ordering.
#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    /// When the event should occur.
    pub time: Timestamp,
    /// Sequence number for deterministic ordering of same-time events.
    pub seq: SequenceNumber,
    /// The event to process.
    pub event: Event,
}

impl ScheduledEvent {
    pub fn new(time: Timestamp, seq: SequenceNumber, event: Event) -> Self {
        Self { time, seq, event }
    }
}

// Reversed so that BinaryHeap (a max-heap) pops the earliest event.
impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BinaryHeap;

    use super::*;

    fn tick(node: NodeId, secs: u64, seq: u64) -> ScheduledEvent {
        ScheduledEvent::new(
            Timestamp::from_secs(secs),
            SequenceNumber::new(seq),
            Event::TimerFire {
                node,
                handle: 0,
                tag: TimerTag::Broadcast,
            },
        )
    }

    #[test]
    fn test_event_ordering() {
        let e1 = tick(1, 10, 1);
        let e2 = tick(1, 5, 2);

        // e2 has earlier time, so it should be "greater" in min-heap terms
        assert!(e2 > e1);
    }

    #[test]
    fn test_same_time_sequence_ordering() {
        let e1 = tick(1, 10, 1);
        let e2 = tick(1, 10, 2);

        // Same time, e1 has lower sequence, so e1 should be processed first
        assert!(e1 > e2);
    }

    #[test]
    fn test_heap_pops_in_time_order() {
        let mut heap = BinaryHeap::new();
        heap.push(tick(3, 7, 0));
        heap.push(tick(1, 2, 1));
        heap.push(tick(2, 2, 2));

        let order: Vec<_> = std::iter::from_fn(|| heap.pop())
            .map(|e| match e.event {
                Event::TimerFire { node, .. } => node,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(order, [1, 2, 3]);
    }
}
