//! Core types and constants for the tree protocol.

use crate::time::Timestamp;

// Memory bounds
pub const MAX_NEIGHBORS: usize = 16;

// Node identifiers
pub const NULL_NODE_ID: NodeId = 0;
pub const BROADCAST_ADDRESS: NodeId = 0xFFFF;

// Hop counts (0-254 finite; 255 = unknown)
pub const DISTANCE_UNKNOWN: u8 = u8::MAX;
pub const MAX_DISTANCE: u8 = DISTANCE_UNKNOWN - 1;

/// Radio-level node identifier.
///
/// [`NULL_NODE_ID`] marks an empty neighbor slot and never names a real
/// node. Smaller identifiers win the root election.
pub type NodeId = u16;

/// Why a state message was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// Scheduled periodic advertisement. Arms the receiver's watchdog.
    Regular,
    /// Out-of-schedule advertisement after a state change.
    Triggered,
}

/// A node's view of its position in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeState<U> {
    /// Node believed to be the tree root.
    pub root: NodeId,
    /// Hops to the root, or [`DISTANCE_UNKNOWN`].
    pub distance: u8,
    /// Next hop towards the root. A root names itself.
    pub parent: NodeId,
    /// Opaque application payload carried with every advertisement.
    pub user_data: U,
}

impl<U: Default> Default for TreeState<U> {
    fn default() -> Self {
        Self {
            root: NULL_NODE_ID,
            distance: DISTANCE_UNKNOWN,
            parent: NULL_NODE_ID,
            user_data: U::default(),
        }
    }
}

impl<U> TreeState<U> {
    /// Whether root and distance both carry usable values.
    pub fn is_known(&self) -> bool {
        self.root != NULL_NODE_ID && self.distance != DISTANCE_UNKNOWN
    }

    /// Whether this state describes `id` as the tree root.
    pub fn is_root_state(&self, id: NodeId) -> bool {
        self.root == id && self.parent == id && self.distance == 0
    }

    /// Update root, reporting whether it changed.
    pub fn set_root(&mut self, root: NodeId) -> bool {
        let changed = self.root != root;
        self.root = root;
        changed
    }

    /// Update distance, reporting whether it changed.
    pub fn set_distance(&mut self, distance: u8) -> bool {
        let changed = self.distance != distance;
        self.distance = distance;
        changed
    }

    /// Update parent, reporting whether it changed.
    pub fn set_parent(&mut self, parent: NodeId) -> bool {
        let changed = self.parent != parent;
        self.parent = parent;
        changed
    }
}

/// Kind of neighbor table change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    NewNeighbor,
    LostNeighbor,
    UpdatedNeighbor,
}

/// Neighbor table change reported to the owning application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// First broadcast heard from this address.
    NewNeighbor(NodeId),
    /// Neighbor evicted after staying silent for the dead interval.
    LostNeighbor(NodeId),
    /// Fresh state stored for a known neighbor (fires even if unchanged).
    UpdatedNeighbor(NodeId),
}

impl Event {
    pub fn kind(&self) -> EventType {
        match self {
            Event::NewNeighbor(_) => EventType::NewNeighbor,
            Event::LostNeighbor(_) => EventType::LostNeighbor,
            Event::UpdatedNeighbor(_) => EventType::UpdatedNeighbor,
        }
    }

    pub fn neighbor(&self) -> NodeId {
        match *self {
            Event::NewNeighbor(n) | Event::LostNeighbor(n) | Event::UpdatedNeighbor(n) => n,
        }
    }
}

/// Direction of the tree edge towards a neighbor.
///
/// Iteration only ever produces `Outbound` (the parent slot) and `Inbound`
/// (everything else). `Bidirectional` exists for consumers that merge
/// views from several sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Inbound,
    Outbound,
    Bidirectional,
}

/// A neighbor as seen through iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Neighbor {
    pub id: NodeId,
    pub edge: Edge,
}

/// What a scheduled timer is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerTag {
    /// Periodic eviction, convergence and broadcast.
    Broadcast,
    /// Expected next regular broadcast from a neighbor.
    Watchdog(NodeId),
}

/// A neighbor's regular broadcast did not arrive before its watchdog fired.
///
/// Distinct from eviction: the neighbor stays in the table until the dead
/// interval passes. What to do about it is up to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissedBroadcast {
    pub neighbor: NodeId,
    pub deadline: Timestamp,
}
