//! Discrete event simulator for sstree networks.

use std::collections::BinaryHeap;

use hashbrown::HashMap;
use sstree::{Duration, NodeId, TimerOutcome, TimerTag, Timestamp};
use tracing::{debug, info, trace};

use crate::event::{Event, ScenarioAction, ScheduledEvent, SequenceNumber};
use crate::metrics::{SimMetrics, SimulationResult, TreeSnapshot};
use crate::node::{SimNode, TimerHandle};
use crate::topology::Topology;

/// Discrete event simulator for sstree networks.
pub struct Simulator {
    nodes: HashMap<NodeId, SimNode>,
    topology: Topology,
    current_time: Timestamp,
    event_queue: BinaryHeap<ScheduledEvent>,
    metrics: SimMetrics,
    next_seq: u64,
    /// LCG state for link loss.
    rng_state: u64,
    snapshot_interval: Option<Duration>,
    next_snapshot: Option<Timestamp>,
}

impl Simulator {
    /// Create a simulator whose link loss is drawn from `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            nodes: HashMap::new(),
            topology: Topology::new(),
            current_time: Timestamp::ZERO,
            event_queue: BinaryHeap::new(),
            metrics: SimMetrics::new(),
            next_seq: 0,
            rng_state: seed,
            snapshot_interval: None,
            next_snapshot: None,
        }
    }

    /// Set the topology. Call before adding nodes so their first frames are routed.
    pub fn with_topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }

    /// Record a tree snapshot every `interval`.
    pub fn with_snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval = Some(interval);
        self.next_snapshot = Some(self.current_time + interval);
        self
    }

    /// Power on a node with radio address `id` at the current time.
    ///
    /// # Panics
    ///
    /// Panics if `id` is already in use.
    pub fn add_node(&mut self, id: NodeId) -> NodeId {
        assert!(!self.nodes.contains_key(&id), "duplicate node id {id}");

        let mut node = SimNode::new(id, self.current_time);
        node.start(self.current_time);
        self.nodes.insert(id, node);
        self.flush_node(id);
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&SimNode> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut SimNode> {
        self.nodes.get_mut(&id)
    }

    /// All node ids, ascending.
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Ids of nodes that have not been killed, ascending.
    pub fn live_node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.is_alive())
            .map(|(&id, _)| id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn current_time(&self) -> Timestamp {
        self.current_time
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn topology_mut(&mut self) -> &mut Topology {
        &mut self.topology
    }

    pub fn metrics(&self) -> &SimMetrics {
        &self.metrics
    }

    pub fn schedule(&mut self, time: Timestamp, event: Event) {
        let seq = SequenceNumber::new(self.next_seq);
        self.next_seq += 1;
        self.event_queue.push(ScheduledEvent::new(time, seq, event));
    }

    pub fn schedule_action(&mut self, time: Timestamp, action: ScenarioAction) {
        self.schedule(time, Event::ScenarioAction(action));
    }

    /// Process every event up to and including `end_time`, then take a final snapshot.
    pub fn run_until(&mut self, end_time: Timestamp) -> SimulationResult {
        while self
            .event_queue
            .peek()
            .is_some_and(|next| next.time <= end_time)
        {
            let Some(scheduled) = self.event_queue.pop() else {
                break;
            };
            self.advance_time(scheduled.time);
            self.process_event(scheduled.event);
            self.maybe_take_snapshot();
        }

        self.advance_time(end_time);
        self.finish()
    }

    pub fn run_for(&mut self, duration: Duration) -> SimulationResult {
        self.run_until(self.current_time + duration)
    }

    /// Process at most `max_events` events.
    pub fn run_events(&mut self, max_events: usize) -> SimulationResult {
        for _ in 0..max_events {
            let Some(scheduled) = self.event_queue.pop() else {
                break;
            };
            self.advance_time(scheduled.time);
            self.process_event(scheduled.event);
            self.maybe_take_snapshot();
        }
        self.finish()
    }

    fn finish(&mut self) -> SimulationResult {
        self.take_snapshot();
        SimulationResult {
            end_time: self.current_time,
            metrics: self.metrics.clone(),
            queue_exhausted: self.event_queue.is_empty(),
        }
    }

    fn advance_time(&mut self, time: Timestamp) {
        if time > self.current_time {
            self.current_time = time;
        }
    }

    fn process_event(&mut self, event: Event) {
        match event {
            Event::MessageDelivery { to, from, data } => self.deliver_message(to, from, data),
            Event::TimerFire { node, handle, tag } => self.fire_timer(node, handle, tag),
            Event::ScenarioAction(action) => self.execute_action(action),
        }
    }

    fn deliver_message(&mut self, to: NodeId, from: NodeId, data: Vec<u8>) {
        let now = self.current_time;
        match self.nodes.get_mut(&to) {
            Some(node) if node.is_alive() => {
                node.handle_rx(from, &data, now);
                self.metrics.messages_delivered += 1;
            }
            _ => return,
        }
        self.flush_node(to);
    }

    fn fire_timer(&mut self, node_id: NodeId, handle: TimerHandle, tag: TimerTag) {
        let now = self.current_time;
        let Some(node) = self.nodes.get_mut(&node_id) else {
            return;
        };

        match node.handle_timer(handle, tag, now) {
            Some(TimerOutcome::Missed(missed)) => {
                self.metrics.missed_broadcasts += 1;
                debug!(
                    node = node_id,
                    neighbor = missed.neighbor,
                    deadline_ms = missed.deadline.as_millis(),
                    "missed broadcast"
                );
            }
            Some(TimerOutcome::Tick { changed: true }) => {
                let state = node.state();
                trace!(
                    node = node_id,
                    root = state.root,
                    distance = state.distance,
                    parent = state.parent,
                    "tree state changed"
                );
            }
            Some(_) | None => {}
        }
        self.flush_node(node_id);
    }

    /// Route frames, queue timers and log debug events produced by a node.
    fn flush_node(&mut self, node_id: NodeId) {
        let Some(node) = self.nodes.get_mut(&node_id) else {
            return;
        };
        let frames = node.take_outgoing();
        let timers = node.take_scheduled();
        for event in node.take_debug_events() {
            trace!(node = node_id, ?event);
        }

        for (handle, at, tag) in timers {
            self.schedule(
                at,
                Event::TimerFire {
                    node: node_id,
                    handle,
                    tag,
                },
            );
        }
        for frame in frames {
            self.route_message(node_id, frame);
        }
    }

    /// Queue a copy of `data` for every node hearing `sender`.
    fn route_message(&mut self, sender: NodeId, data: Vec<u8>) {
        self.metrics.messages_sent += 1;

        let mut deliveries = Vec::new();
        for neighbor in self.topology.neighbors(sender) {
            let Some(link) = self.topology.get_link(sender, neighbor) else {
                continue;
            };
            let (loss_rate, delay) = (link.loss_rate, link.delay);
            if loss_rate > 0.0 && self.random_f64() < loss_rate {
                self.metrics.messages_dropped += 1;
                continue;
            }
            deliveries.push((neighbor, delay));
        }

        let now = self.current_time;
        for (neighbor, delay) in deliveries {
            self.schedule(
                now + delay,
                Event::MessageDelivery {
                    to: neighbor,
                    from: sender,
                    data: data.clone(),
                },
            );
        }
    }

    fn execute_action(&mut self, action: ScenarioAction) {
        info!(time_ms = self.current_time.as_millis(), ?action, "scenario action");
        match action {
            ScenarioAction::Partition { groups } => self.topology.partition(&groups),
            ScenarioAction::HealPartition => self.topology.heal(),
            ScenarioAction::DisableLink { from, to } => {
                if let Some(link) = self.topology.get_link_mut(from, to) {
                    link.active = false;
                }
            }
            ScenarioAction::EnableLink { from, to } => {
                if let Some(link) = self.topology.get_link_mut(from, to) {
                    link.active = true;
                }
            }
            ScenarioAction::SetLossRate { from, to, rate } => {
                if let Some(link) = self.topology.get_link_mut(from, to) {
                    link.loss_rate = rate.clamp(0.0, 1.0);
                }
            }
            ScenarioAction::KillNode { node } => {
                if let Some(n) = self.nodes.get_mut(&node) {
                    n.kill();
                }
            }
            ScenarioAction::TakeSnapshot => self.take_snapshot(),
        }
    }

    fn maybe_take_snapshot(&mut self) {
        let (Some(next), Some(interval)) = (self.next_snapshot, self.snapshot_interval) else {
            return;
        };
        if self.current_time >= next {
            self.take_snapshot();
            self.next_snapshot = Some(next + interval);
        }
    }

    /// Record the tree state of every live node.
    pub fn take_snapshot(&mut self) {
        let mut snapshot = TreeSnapshot::new(self.current_time);
        for (&id, node) in self.nodes.iter().filter(|(_, n)| n.is_alive()) {
            let state = node.state();
            snapshot.record_node(id, state.root, state.distance, state.parent);
        }
        self.metrics.add_snapshot(snapshot);
    }

    /// Uniform in [0, 1).
    fn random_f64(&mut self) -> f64 {
        self.rng_state = self
            .rng_state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.rng_state >> 11) as f64 / (1u64 << 53) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulator_creation() {
        let sim = Simulator::new(42);
        assert_eq!(sim.current_time(), Timestamp::ZERO);
        assert!(sim.node_ids().is_empty());
    }

    #[test]
    fn test_add_nodes() {
        let mut sim = Simulator::new(42);
        sim.add_node(9);
        sim.add_node(4);

        assert_eq!(sim.node_ids(), [4, 9]);
        assert!(sim.node(4).is_some_and(|n| n.is_root()));
    }

    #[test]
    #[should_panic(expected = "duplicate node id")]
    fn test_duplicate_id_rejected() {
        let mut sim = Simulator::new(42);
        sim.add_node(3);
        sim.add_node(3);
    }

    #[test]
    fn test_isolated_node_stays_root() {
        let mut sim = Simulator::new(42);
        sim.add_node(5);
        sim.run_for(Duration::from_secs(1));

        let node = sim.node(5).unwrap();
        assert!(node.is_root());
        assert_eq!(node.neighbor_count(), 0);
        // One broadcast at start, then every 200 ms up to and including t = 1 s.
        assert_eq!(sim.metrics().messages_sent, 6);
    }

    #[test]
    fn test_two_nodes_elect_smaller() {
        let mut sim = Simulator::new(42).with_topology(Topology::fully_connected(&[7, 2]));
        sim.add_node(7);
        sim.add_node(2);

        let result = sim.run_for(Duration::from_secs(1));
        assert_eq!(result.final_root(), Some(2));
        assert_eq!(sim.node(7).unwrap().parent_id(), Some(2));
        assert_eq!(sim.metrics().missed_broadcasts, 0);
    }

    #[test]
    fn test_partition_action_applies() {
        let mut sim = Simulator::new(42).with_topology(Topology::fully_connected(&[1, 2]));
        sim.add_node(1);
        sim.add_node(2);
        sim.schedule_action(
            Timestamp::from_millis(500),
            ScenarioAction::Partition {
                groups: vec![vec![1], vec![2]],
            },
        );

        sim.run_for(Duration::from_secs(1));
        assert!(!sim.topology().is_connected(1, 2));
    }

    #[test]
    fn test_killed_node_leaves_snapshot() {
        let mut sim = Simulator::new(42).with_topology(Topology::fully_connected(&[1, 2]));
        sim.add_node(1);
        sim.add_node(2);
        sim.schedule_action(Timestamp::from_millis(500), ScenarioAction::KillNode { node: 1 });

        let result = sim.run_for(Duration::from_secs(2));
        assert_eq!(sim.live_node_ids(), [2]);
        let last = result.metrics.latest_snapshot().unwrap();
        assert!(!last.views.contains_key(&1));
        // Node 2 evicted the dead root and took over.
        assert_eq!(result.final_root(), Some(2));
        assert_eq!(sim.node(2).unwrap().event_counts().lost_neighbor, 1);
    }

    #[test]
    fn test_full_loss_drops_everything() {
        let mut topo = Topology::fully_connected(&[1, 2]);
        topo.set_global_loss_rate(1.0);
        let mut sim = Simulator::new(42).with_topology(topo);
        sim.add_node(1);
        sim.add_node(2);

        let result = sim.run_for(Duration::from_secs(1));
        assert_eq!(result.metrics.messages_delivered, 0);
        assert_eq!(result.metrics.messages_dropped, result.metrics.messages_sent);
        assert_eq!(result.final_tree_count(), 2);
    }

    #[test]
    fn test_snapshot_interval() {
        let mut sim = Simulator::new(42).with_snapshot_interval(Duration::from_millis(250));
        sim.add_node(1);
        let result = sim.run_for(Duration::from_secs(1));
        // Periodic snapshots plus the final one.
        assert!(result.metrics.snapshots.len() >= 4);
    }
}
