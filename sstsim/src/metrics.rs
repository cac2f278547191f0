//! Metrics collection for simulation analysis.

use hashbrown::HashMap;
use sstree::{NodeId, Timestamp};

/// What a single node believed at snapshot time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeView {
    pub root: NodeId,
    pub distance: u8,
    pub parent: NodeId,
}

/// Tree state of every live node at a point in time.
#[derive(Debug, Clone)]
pub struct TreeSnapshot {
    pub time: Timestamp,
    pub views: HashMap<NodeId, NodeView>,
}

impl TreeSnapshot {
    pub fn new(time: Timestamp) -> Self {
        Self {
            time,
            views: HashMap::new(),
        }
    }

    pub fn record_node(&mut self, node: NodeId, root: NodeId, distance: u8, parent: NodeId) {
        self.views.insert(
            node,
            NodeView {
                root,
                distance,
                parent,
            },
        );
    }

    /// True if every node agrees on the root.
    pub fn all_same_root(&self) -> bool {
        let mut roots = self.views.values().map(|v| v.root);
        match roots.next() {
            Some(first) => roots.all(|r| r == first),
            None => true,
        }
    }

    /// Distinct roots across all nodes.
    pub fn tree_count(&self) -> usize {
        self.distinct_roots().len()
    }

    /// Roots claimed by at least one node, ascending.
    pub fn distinct_roots(&self) -> Vec<NodeId> {
        let mut roots: Vec<NodeId> = self.views.values().map(|v| v.root).collect();
        roots.sort_unstable();
        roots.dedup();
        roots
    }

    /// Nodes that elect themselves root, ascending.
    pub fn roots(&self) -> Vec<NodeId> {
        let mut roots: Vec<NodeId> = self
            .views
            .iter()
            .filter(|(&id, v)| v.root == id && v.distance == 0)
            .map(|(&id, _)| id)
            .collect();
        roots.sort_unstable();
        roots
    }

    /// True if every node's root is the smallest node id recorded.
    pub fn converged_to_min(&self) -> bool {
        match self.views.keys().min() {
            Some(&min) => self.views.values().all(|v| v.root == min),
            None => true,
        }
    }

    /// True if parent pointers form shortest-path trees.
    ///
    /// Every non-root node must point at a recorded node that shares its root
    /// and sits exactly one hop closer to it.
    pub fn is_consistent(&self) -> bool {
        self.views.iter().all(|(&id, v)| {
            if v.root == id {
                return v.distance == 0 && v.parent == id;
            }
            self.views
                .get(&v.parent)
                .is_some_and(|p| p.root == v.root && p.distance + 1 == v.distance)
        })
    }

    pub fn max_distance(&self) -> u8 {
        self.views.values().map(|v| v.distance).max().unwrap_or(0)
    }
}

/// Simulation metrics collected over time.
#[derive(Debug, Clone, Default)]
pub struct SimMetrics {
    /// Frames handed to the radio (one per broadcast, not per receiver).
    pub messages_sent: u64,
    /// Per-receiver deliveries lost to link loss.
    pub messages_dropped: u64,
    /// Per-receiver deliveries that reached a live node.
    pub messages_delivered: u64,
    /// Watchdog expiries reported by nodes.
    pub missed_broadcasts: u64,
    pub snapshots: Vec<TreeSnapshot>,
}

impl SimMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_snapshot(&mut self, snapshot: TreeSnapshot) {
        self.snapshots.push(snapshot);
    }

    /// True if the first snapshot at or after `time` shows a single tree.
    pub fn converged_by(&self, time: Timestamp) -> bool {
        self.snapshots
            .iter()
            .find(|s| s.time >= time)
            .is_some_and(|s| s.all_same_root())
    }

    /// Start of the final run of single-tree snapshots.
    ///
    /// Transient agreement that later breaks is not counted.
    pub fn convergence_time(&self) -> Option<Timestamp> {
        let unstable = self.snapshots.iter().rposition(|s| !s.all_same_root());
        let first_stable = unstable.map_or(0, |i| i + 1);
        self.snapshots.get(first_stable).map(|s| s.time)
    }

    pub fn latest_snapshot(&self) -> Option<&TreeSnapshot> {
        self.snapshots.last()
    }
}

/// Result of running a simulation.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    pub end_time: Timestamp,
    pub metrics: SimMetrics,
    /// True if the run stopped because no events were left.
    pub queue_exhausted: bool,
}

impl SimulationResult {
    /// True if the final snapshot shows every live node under one root.
    pub fn converged(&self) -> bool {
        self.metrics
            .latest_snapshot()
            .is_some_and(|s| s.all_same_root())
    }

    /// The root shared by every node, if they agree.
    pub fn final_root(&self) -> Option<NodeId> {
        let snapshot = self.metrics.latest_snapshot()?;
        match snapshot.distinct_roots().as_slice() {
            [root] => Some(*root),
            _ => None,
        }
    }

    pub fn final_tree_count(&self) -> usize {
        self.metrics
            .latest_snapshot()
            .map(|s| s.tree_count())
            .unwrap_or(0)
    }
}
