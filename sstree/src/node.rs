//! Node struct and public API.
//!
//! A [`Node`] owns its collaborators, its neighbor table and the per-neighbor
//! watchdogs. Everything is driven from outside: the radio driver passes each
//! inbound frame to [`Node::on_receive`] and the timer service passes each
//! expiry to [`Node::handle_timer`]. No call blocks except the radio send,
//! which is bracketed by a keep-awake request.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::marker::PhantomData;
use core::mem;

use crate::config::{DefaultConfig, TreeConfig};
use crate::debug::{DebugEvent, IgnoreReason};
use crate::liveness::Watchdogs;
use crate::table::{NeighborEntry, NeighborTable};
use crate::time::Timestamp;
use crate::traits::{Caffeine, Clock, PowerControl, Radio, Timer};
use crate::types::{
    Event, MissedBroadcast, Neighbor, NodeId, Reason, TimerTag, TreeState, BROADCAST_ADDRESS,
    MAX_NEIGHBORS, NULL_NODE_ID,
};
use crate::wire::{encode_state, is_tree_state, Decode, TreeStateMessage, UserData, Writer};

/// Receives neighbor table changes.
pub type EventCallback = Box<dyn FnMut(Event)>;

/// Result of dispatching a timer expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOutcome {
    /// Periodic cycle ran. `changed` reports whether the neighbor set or the
    /// local state differs from the previous cycle.
    Tick { changed: bool },
    /// A neighbor's regular broadcast is overdue.
    Missed(MissedBroadcast),
    /// Expiry no longer matched a pending watchdog.
    Ignored,
}

/// A self-stabilizing tree node.
///
/// Type parameters: radio `R`, clock `Clk`, timer `Tm`, power control `P`,
/// user payload `U`, timing profile `C` and table capacity `N`.
///
/// # Example
///
/// ```
/// use sstree::traits::test_impls::{MockClock, MockPower, MockRadio, MockTimer};
/// use sstree::Node;
///
/// let mut node: Node<_, _, _, _> = Node::new(
///     MockRadio::new(10),
///     MockClock::new(),
///     MockTimer::new(),
///     MockPower::new(),
/// );
/// node.start();
///
/// // Alone, a node elects itself.
/// assert!(node.is_root());
/// assert_eq!(node.state().root, 10);
/// assert_eq!(node.radio().sent.len(), 1);
/// ```
pub struct Node<R, Clk, Tm, P, U = (), C = DefaultConfig, const N: usize = MAX_NEIGHBORS>
where
    Tm: Timer,
{
    // Collaborators
    radio: R,
    clock: Clk,
    timer: Tm,
    power: P,

    // Identity and derived state
    id: NodeId,
    state: TreeState<U>,

    // Neighbors
    table: NeighborTable<U, N>,
    watchdogs: Watchdogs<Tm::Handle, N>,

    // Cycle bookkeeping
    new_neighbors: bool,
    lost_neighbors: bool,
    broadcast_timer: Option<Tm::Handle>,

    event_callback: Option<EventCallback>,
    tx_buf: Vec<u8>,

    #[cfg(feature = "debug")]
    debug: crate::debug::DebugChannel,

    _config: PhantomData<C>,
}

impl<R, Clk, Tm, P, U, C, const N: usize> Node<R, Clk, Tm, P, U, C, N>
where
    R: Radio,
    Clk: Clock,
    Tm: Timer,
    P: PowerControl,
    U: UserData,
    C: TreeConfig,
{
    /// Create a node bound to its collaborators.
    ///
    /// The local state starts unknown; call [`start`](Self::start) to run the
    /// first cycle and begin periodic broadcasting.
    pub fn new(radio: R, clock: Clk, timer: Tm, power: P) -> Self {
        let id = radio.id();
        Self {
            radio,
            clock,
            timer,
            power,

            id,
            state: TreeState::default(),

            table: NeighborTable::new(),
            watchdogs: Watchdogs::new(),

            new_neighbors: false,
            lost_neighbors: false,
            broadcast_timer: None,

            event_callback: None,
            tx_buf: Vec::new(),

            #[cfg(feature = "debug")]
            debug: crate::debug::DebugChannel::new(),

            _config: PhantomData,
        }
    }

    /// Run the first cycle: converge, broadcast and schedule the next tick.
    ///
    /// Calling it again restarts the cadence from now.
    pub fn start(&mut self) -> bool {
        self.tick()
    }

    /// Register the event callback, replacing any previous one.
    ///
    /// Only one subscriber is kept. The callback runs synchronously inside
    /// table mutations and must not block.
    pub fn set_event_callback<F>(&mut self, callback: F)
    where
        F: FnMut(Event) + 'static,
    {
        self.event_callback = Some(Box::new(callback));
    }

    /// Remove the event callback.
    pub fn clear_event_callback(&mut self) {
        self.event_callback = None;
    }

    pub(crate) fn notify(&mut self, event: Event) {
        if let Some(callback) = self.event_callback.as_mut() {
            callback(event);
        }
    }

    /// Handle an inbound radio frame.
    ///
    /// Frames of other protocols, malformed frames and frames from the NULL
    /// address are dropped without side effects.
    pub fn on_receive(&mut self, from: NodeId, data: &[u8]) {
        let Some(&message_type) = data.first() else {
            self.ignore(from, data, IgnoreReason::Empty);
            return;
        };
        if !is_tree_state(data) {
            self.ignore(from, data, IgnoreReason::ForeignType(message_type));
            return;
        }
        if from == NULL_NODE_ID {
            self.ignore(from, data, IgnoreReason::NullSender);
            return;
        }
        if from == self.id {
            self.ignore(from, data, IgnoreReason::OwnFrame);
            return;
        }
        let msg = match TreeStateMessage::<U>::decode_from_slice(data) {
            Ok(msg) => msg,
            Err(_) => {
                self.ignore(from, data, IgnoreReason::Malformed);
                return;
            }
        };

        let now = self.now();
        let reason = msg.reason;
        let stored = self.add_neighbor(from, msg.state, now);
        if stored && reason == Reason::Regular {
            self.arm_watchdog(from, now);
        }
    }

    fn ignore(&mut self, from: NodeId, data: &[u8], reason: IgnoreReason) {
        emit_debug!(
            self,
            DebugEvent::FrameIgnored {
                from,
                len: data.len(),
                reason,
            }
        );
    }

    fn arm_watchdog(&mut self, neighbor: NodeId, now: Timestamp) {
        let armed = self.watchdogs.arm(
            &mut self.timer,
            neighbor,
            now,
            C::BROADCAST_INTERVAL,
            C::WATCHDOG_GRACE,
        );
        if let Some(deadline) = armed {
            emit_debug!(self, DebugEvent::WatchdogArmed { neighbor, deadline });
        }
    }

    /// Transmit the local state to the broadcast address.
    ///
    /// The radio is kept awake for the duration of the send.
    pub fn broadcast_state(&mut self, reason: Reason) {
        let mut w = Writer::reuse(mem::take(&mut self.tx_buf));
        encode_state(&mut w, reason, &self.state);
        self.tx_buf = w.finish();

        {
            let _awake = Caffeine::acquire(&mut self.power);
            self.radio.send(BROADCAST_ADDRESS, &self.tx_buf);
        }

        emit_debug!(
            self,
            DebugEvent::BroadcastSent {
                timestamp: self.now(),
                reason,
                root: self.state.root,
                distance: self.state.distance,
                parent: self.state.parent,
            }
        );
    }

    /// Dispatch a timer expiry scheduled under `tag`.
    pub fn handle_timer(&mut self, tag: TimerTag) -> TimerOutcome {
        match tag {
            TimerTag::Broadcast => {
                self.broadcast_timer = None;
                TimerOutcome::Tick {
                    changed: self.tick(),
                }
            }
            TimerTag::Watchdog(neighbor) => {
                let now = self.now();
                match self.watchdogs.expire(neighbor, now) {
                    Some(missed) => {
                        emit_debug!(
                            self,
                            DebugEvent::WatchdogExpired {
                                neighbor,
                                deadline: missed.deadline,
                            }
                        );
                        TimerOutcome::Missed(missed)
                    }
                    None => TimerOutcome::Ignored,
                }
            }
        }
    }

    /// One periodic cycle: converge (evicting silent neighbors first),
    /// broadcast, then schedule the next cycle. Returns the cycle's change flag.
    pub fn tick(&mut self) -> bool {
        let now = self.now();
        let changed = self.update_state();
        self.broadcast_state(Reason::Regular);
        self.schedule_tick(now);
        changed
    }

    fn schedule_tick(&mut self, now: Timestamp) {
        if let Some(handle) = self.broadcast_timer.take() {
            self.timer.cancel(handle);
        }
        let at = now + C::BROADCAST_INTERVAL;
        self.broadcast_timer = Some(self.timer.schedule(at, TimerTag::Broadcast));
    }

    /// Current local time.
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// This node's identifier.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Local tree state as of the last convergence pass.
    pub fn state(&self) -> &TreeState<U> {
        &self.state
    }

    /// Whether this node currently elects itself root.
    pub fn is_root(&self) -> bool {
        self.state.is_root_state(self.id)
    }

    /// Elected parent, `None` while root or before the first cycle.
    pub fn parent(&self) -> Option<NodeId> {
        let parent = self.state.parent;
        (parent != NULL_NODE_ID && parent != self.id).then_some(parent)
    }

    /// Payload advertised with the next broadcast.
    pub fn user_data(&self) -> &U {
        &self.state.user_data
    }

    pub fn set_user_data(&mut self, user_data: U) {
        self.state.user_data = user_data;
    }

    /// Identifier of the `idx`-th non-parent neighbor (ascending).
    ///
    /// Indices shift on every insertion or eviction.
    pub fn child(&self, idx: usize) -> Option<NodeId> {
        self.table.children().get(idx).map(|e| e.address)
    }

    /// Payload last advertised by the `idx`-th non-parent neighbor.
    pub fn child_user_data(&self, idx: usize) -> Option<&U> {
        self.table.children().get(idx).map(|e| &e.state.user_data)
    }

    /// Index of `id` among the non-parent neighbors.
    pub fn child_index(&self, id: NodeId) -> Option<usize> {
        match self.table.find_position(id) {
            Ok(slot) if slot >= 1 => Some(slot - 1),
            _ => None,
        }
    }

    pub fn child_count(&self) -> usize {
        self.table.children().len()
    }

    pub fn neighbor_count(&self) -> usize {
        self.table.len()
    }

    /// Stored entry for a neighbor.
    pub fn neighbor(&self, id: NodeId) -> Option<&NeighborEntry<U>> {
        self.table.get(id)
    }

    /// All neighbors with their edge direction.
    pub fn neighbors(&self) -> impl Iterator<Item = Neighbor> + '_ {
        self.table.iter()
    }

    /// Neighbors currently advertising this node as their parent.
    pub fn tree_children(&self) -> impl Iterator<Item = NodeId> + '_ {
        let id = self.id;
        self.table
            .entries()
            .iter()
            .filter(move |e| e.state.parent == id)
            .map(|e| e.address)
    }

    pub fn table(&self) -> &NeighborTable<U, N> {
        &self.table
    }

    pub(crate) fn table_mut(&mut self) -> &mut NeighborTable<U, N> {
        &mut self.table
    }

    pub(crate) fn local_state_mut(&mut self) -> &mut TreeState<U> {
        &mut self.state
    }

    pub(crate) fn take_cycle_flags(&mut self) -> (bool, bool) {
        (
            mem::take(&mut self.new_neighbors),
            mem::take(&mut self.lost_neighbors),
        )
    }

    pub(crate) fn mark_new_neighbor(&mut self) {
        self.new_neighbors = true;
    }

    pub(crate) fn mark_lost_neighbor(&mut self, neighbor: NodeId) {
        self.lost_neighbors = true;
        self.watchdogs.disarm(&mut self.timer, neighbor);
    }

    /// Pending watchdog deadline for a neighbor.
    pub fn watchdog_deadline(&self, neighbor: NodeId) -> Option<Timestamp> {
        self.watchdogs.deadline(neighbor)
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn clock(&self) -> &Clk {
        &self.clock
    }

    pub fn timer(&self) -> &Tm {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut Tm {
        &mut self.timer
    }

    pub fn power(&self) -> &P {
        &self.power
    }

    /// Debug event channel.
    #[cfg(feature = "debug")]
    pub fn debug_channel(&self) -> &crate::debug::DebugChannel {
        &self.debug
    }
}
