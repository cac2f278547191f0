//! SimNode wrapper for simulated sstree nodes.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use hashbrown::HashSet;
use sstree::debug::DebugEvent;
use sstree::traits::{Clock, PowerControl, Radio, Timer};
use sstree::{
    DefaultConfig, Node, NodeId, Reason, TimerOutcome, TimerTag, Timestamp, TreeState,
};

/// Timer handle handed out by [`SimTimer`].
pub type TimerHandle = u64;

/// Radio that buffers transmitted frames until the simulator routes them.
///
/// Every frame goes to the broadcast domain defined by the topology; the
/// destination address is not used for routing.
pub struct SimRadio {
    id: NodeId,
    outbox: Vec<Vec<u8>>,
}

impl SimRadio {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            outbox: Vec::new(),
        }
    }

    /// Take all frames sent since the last call.
    pub fn take_sent(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.outbox)
    }
}

impl Radio for SimRadio {
    fn id(&self) -> NodeId {
        self.id
    }

    fn send(&mut self, _dest: NodeId, data: &[u8]) {
        self.outbox.push(data.to_vec());
    }
}

/// Clock for simulation.
///
/// Time is controlled externally by the simulator.
pub struct SimClock {
    current: Cell<Timestamp>,
}

impl SimClock {
    pub fn at(time: Timestamp) -> Self {
        Self {
            current: Cell::new(time),
        }
    }

    pub fn set(&self, time: Timestamp) {
        self.current.set(time);
    }
}

impl Clock for SimClock {
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

/// Timer that hands schedules to the simulator's event queue.
///
/// Cancelled handles are remembered until their expiry event comes up and
/// is discarded.
#[derive(Default)]
pub struct SimTimer {
    next_handle: TimerHandle,
    scheduled: Vec<(TimerHandle, Timestamp, TimerTag)>,
    cancelled: HashSet<TimerHandle>,
}

impl SimTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take schedules made since the last call.
    pub fn take_scheduled(&mut self) -> Vec<(TimerHandle, Timestamp, TimerTag)> {
        std::mem::take(&mut self.scheduled)
    }

    /// Consume a cancellation mark. Returns true if `handle` was cancelled.
    pub fn take_cancelled(&mut self, handle: TimerHandle) -> bool {
        self.cancelled.remove(&handle)
    }
}

impl Timer for SimTimer {
    type Handle = TimerHandle;

    fn schedule(&mut self, at: Timestamp, tag: TimerTag) -> TimerHandle {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.scheduled.push((handle, at, tag));
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        // A schedule not yet handed to the simulator is dropped outright.
        if let Some(pos) = self.scheduled.iter().position(|(h, _, _)| *h == handle) {
            self.scheduled.remove(pos);
        } else {
            self.cancelled.insert(handle);
        }
    }
}

/// Power control that counts keep-awake requests.
#[derive(Default)]
pub struct SimPower {
    depth: u32,
    pushes: u64,
}

impl SimPower {
    /// Outstanding keep-awake requests.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Total keep-awake requests made.
    pub fn pushes(&self) -> u64 {
        self.pushes
    }
}

impl PowerControl for SimPower {
    fn push_caffeine(&mut self) {
        self.depth += 1;
        self.pushes += 1;
    }

    fn pop_caffeine(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }
}

/// Neighbor table events seen by a node's callback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventCounts {
    pub new_neighbor: u64,
    pub lost_neighbor: u64,
    pub updated_neighbor: u64,
}

/// Type alias for simulated nodes.
pub type SimNodeInner = Node<SimRadio, SimClock, SimTimer, SimPower, (), DefaultConfig>;

/// Wrapper around an sstree Node for simulation.
pub struct SimNode {
    /// The underlying sstree node.
    inner: SimNodeInner,
    /// When the node was created.
    pub created_at: Timestamp,
    alive: bool,
    events: Rc<RefCell<EventCounts>>,
    missed_broadcasts: u64,
}

impl SimNode {
    /// Create a SimNode with the given radio address.
    pub fn new(id: NodeId, created_at: Timestamp) -> Self {
        let mut inner = Node::new(
            SimRadio::new(id),
            SimClock::at(created_at),
            SimTimer::new(),
            SimPower::default(),
        );

        let events = Rc::new(RefCell::new(EventCounts::default()));
        let sink = Rc::clone(&events);
        inner.set_event_callback(move |event| {
            let mut counts = sink.borrow_mut();
            match event {
                sstree::Event::NewNeighbor(_) => counts.new_neighbor += 1,
                sstree::Event::LostNeighbor(_) => counts.lost_neighbor += 1,
                sstree::Event::UpdatedNeighbor(_) => counts.updated_neighbor += 1,
            }
        });

        Self {
            inner,
            created_at,
            alive: true,
            events,
            missed_broadcasts: 0,
        }
    }

    /// Get the node's ID.
    pub fn node_id(&self) -> NodeId {
        self.inner.id()
    }

    /// Get a reference to the inner node.
    pub fn inner(&self) -> &SimNodeInner {
        &self.inner
    }

    /// Get a mutable reference to the inner node.
    pub fn inner_mut(&mut self) -> &mut SimNodeInner {
        &mut self.inner
    }

    /// Whether the node is still powered.
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Power the node off. Pending output is discarded.
    pub fn kill(&mut self) {
        self.alive = false;
        self.inner.radio_mut().take_sent();
        self.inner.timer_mut().take_scheduled();
    }

    /// Run the first cycle at `now`.
    pub fn start(&mut self, now: Timestamp) {
        self.inner.clock().set(now);
        self.inner.start();
    }

    /// Handle a frame delivered by the radio.
    pub fn handle_rx(&mut self, from: NodeId, data: &[u8], now: Timestamp) {
        if !self.alive {
            return;
        }
        self.inner.clock().set(now);
        self.inner.on_receive(from, data);
    }

    /// Handle a timer expiry. Cancelled timers and dead nodes return `None`.
    pub fn handle_timer(
        &mut self,
        handle: TimerHandle,
        tag: TimerTag,
        now: Timestamp,
    ) -> Option<TimerOutcome> {
        if !self.alive || self.inner.timer_mut().take_cancelled(handle) {
            return None;
        }
        self.inner.clock().set(now);
        let outcome = self.inner.handle_timer(tag);
        if let TimerOutcome::Missed(_) = outcome {
            self.missed_broadcasts += 1;
        }
        Some(outcome)
    }

    /// Advertise immediately, outside the periodic cadence.
    pub fn broadcast_now(&mut self, now: Timestamp) {
        if self.alive {
            self.inner.clock().set(now);
            self.inner.broadcast_state(Reason::Triggered);
        }
    }

    /// Take all frames the node transmitted.
    pub fn take_outgoing(&mut self) -> Vec<Vec<u8>> {
        self.inner.radio_mut().take_sent()
    }

    /// Take all timers the node scheduled.
    pub fn take_scheduled(&mut self) -> Vec<(TimerHandle, Timestamp, TimerTag)> {
        self.inner.timer_mut().take_scheduled()
    }

    /// Take all debug events from the node's debug channel.
    pub fn take_debug_events(&self) -> Vec<DebugEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.inner.debug_channel().try_receive() {
            events.push(event);
        }
        events
    }

    /// Local tree state.
    pub fn state(&self) -> &TreeState<()> {
        self.inner.state()
    }

    /// Check if this node currently elects itself root.
    pub fn is_root(&self) -> bool {
        self.inner.is_root()
    }

    /// Get the parent node ID, if any.
    pub fn parent_id(&self) -> Option<NodeId> {
        self.inner.parent()
    }

    /// Get the number of known neighbors.
    pub fn neighbor_count(&self) -> usize {
        self.inner.neighbor_count()
    }

    /// Neighbor table events seen so far.
    pub fn event_counts(&self) -> EventCounts {
        *self.events.borrow()
    }

    /// Watchdog expiries seen so far.
    pub fn missed_broadcasts(&self) -> u64 {
        self.missed_broadcasts
    }

    /// Keep-awake requests still outstanding (always 0 between sends).
    pub fn caffeine_depth(&self) -> u32 {
        self.inner.power().depth()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simnode_creation() {
        let mut node = SimNode::new(42, Timestamp::ZERO);
        assert_eq!(node.node_id(), 42);
        node.start(Timestamp::ZERO);
        assert!(node.is_root());
        assert_eq!(node.parent_id(), None);
    }

    #[test]
    fn test_start_sends_and_schedules() {
        let mut node = SimNode::new(7, Timestamp::ZERO);
        node.start(Timestamp::ZERO);

        assert_eq!(node.take_outgoing().len(), 1);
        let timers = node.take_scheduled();
        assert_eq!(timers.len(), 1);
        assert_eq!(timers[0].1, Timestamp::from_millis(200));
        assert_eq!(timers[0].2, TimerTag::Broadcast);
        assert_eq!(node.caffeine_depth(), 0);
    }

    #[test]
    fn test_cancelled_timer_not_delivered() {
        let mut node = SimNode::new(7, Timestamp::ZERO);
        node.start(Timestamp::ZERO);
        let (handle, at, tag) = node.take_scheduled()[0];

        node.inner_mut().timer_mut().cancel(handle);
        assert_eq!(node.handle_timer(handle, tag, at), None);
    }

    #[test]
    fn test_cancel_before_handoff_drops_schedule() {
        let mut timer = SimTimer::new();
        let h = timer.schedule(Timestamp::from_millis(5), TimerTag::Watchdog(3));
        timer.cancel(h);
        assert!(timer.take_scheduled().is_empty());
        assert!(!timer.take_cancelled(h));
    }

    #[test]
    fn test_dead_node_is_inert() {
        let mut a = SimNode::new(1, Timestamp::ZERO);
        let mut b = SimNode::new(2, Timestamp::ZERO);
        a.start(Timestamp::ZERO);
        let frame = a.take_outgoing().remove(0);

        b.kill();
        b.handle_rx(1, &frame, Timestamp::from_millis(1));
        assert_eq!(b.neighbor_count(), 0);
        assert_eq!(b.event_counts(), EventCounts::default());
    }

    #[test]
    fn test_event_counts_track_callback() {
        let mut a = SimNode::new(1, Timestamp::ZERO);
        let mut b = SimNode::new(2, Timestamp::ZERO);
        a.start(Timestamp::ZERO);
        let frame = a.take_outgoing().remove(0);

        b.handle_rx(1, &frame, Timestamp::from_millis(1));
        b.handle_rx(1, &frame, Timestamp::from_millis(2));
        let counts = b.event_counts();
        assert_eq!(counts.new_neighbor, 1);
        assert_eq!(counts.updated_neighbor, 1);
        assert!(!b.take_debug_events().is_empty());
    }
}
