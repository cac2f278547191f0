//! Tree formation and maintenance.
//!
//! This module handles:
//! - Storing advertised neighbor states
//! - Evicting neighbors silent for the dead interval
//! - Electing root, distance and parent from the table

use crate::config::TreeConfig;
use crate::debug::DebugEvent;
use crate::node::Node;
use crate::table::Upsert;
use crate::time::Timestamp;
use crate::traits::{Clock, PowerControl, Radio, Timer};
use crate::types::{Event, NodeId, TreeState, MAX_DISTANCE};
use crate::wire::UserData;

/// Best route offered by a neighbor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Candidate {
    root: NodeId,
    distance: u8,
    via: NodeId,
}

impl Candidate {
    /// Smaller root wins; equal roots go to the shorter route.
    fn beats(&self, other: &Candidate) -> bool {
        (self.root, self.distance) < (other.root, other.distance)
    }
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
    /// Store `state` for `addr` and report the change.
    ///
    /// Returns false if the table was full. A full table drops every
    /// message, known sender or not.
    pub(crate) fn add_neighbor(&mut self, addr: NodeId, state: TreeState<U>, now: Timestamp) -> bool {
        let (root, distance) = (state.root, state.distance);
        match self.table_mut().insert_or_update(addr, state, now) {
            Upsert::Inserted(slot) => {
                self.mark_new_neighbor();
                emit_debug!(
                    self,
                    DebugEvent::NeighborAdded {
                        timestamp: now,
                        neighbor: addr,
                        slot,
                    }
                );
                self.notify(Event::NewNeighbor(addr));
                true
            }
            Upsert::Updated(_) => {
                emit_debug!(
                    self,
                    DebugEvent::NeighborUpdated {
                        neighbor: addr,
                        root,
                        distance,
                    }
                );
                self.notify(Event::UpdatedNeighbor(addr));
                true
            }
            Upsert::Dropped => {
                emit_debug!(
                    self,
                    DebugEvent::NeighborDropped {
                        neighbor: addr,
                        capacity: N,
                    }
                );
                false
            }
        }
    }

    /// Remove every neighbor whose last update is at least the dead interval
    /// old, cancelling its watchdog and firing `LostNeighbor`.
    fn evict_stale(&mut self, now: Timestamp) {
        let mut from = 0;
        while let Some(slot) = self.table().next_stale(from, now, C::DEAD_INTERVAL) {
            let neighbor = self.table_mut().remove_at(slot).address;
            self.mark_lost_neighbor(neighbor);
            emit_debug!(
                self,
                DebugEvent::NeighborEvicted {
                    timestamp: now,
                    neighbor,
                }
            );
            self.notify(Event::LostNeighbor(neighbor));
            from = slot;
        }
    }

    fn best_candidate(&self) -> Option<Candidate> {
        let id = self.id();
        let mut best: Option<Candidate> = None;
        // Slot 0 is visited first, so the current parent keeps ties.
        for entry in self.table().entries() {
            let s = &entry.state;
            if s.parent == id || !s.is_known() || s.distance >= MAX_DISTANCE {
                continue;
            }
            let candidate = Candidate {
                root: s.root,
                distance: s.distance + 1,
                via: entry.address,
            };
            if best.map_or(true, |b| candidate.beats(&b)) {
                best = Some(candidate);
            }
        }
        best
    }

    /// Evict silent neighbors, then recompute root, distance and parent
    /// from what is left in the table.
    ///
    /// Returns true if a neighbor was added or evicted since the previous
    /// pass or any of the three fields changed.
    pub fn update_state(&mut self) -> bool {
        let now = self.now();
        self.evict_stale(now);

        let id = self.id();
        let (root, distance, parent) = match self.best_candidate() {
            Some(c) if c.root < id => (c.root, c.distance, c.via),
            _ => (id, 0, id),
        };

        let state = self.local_state_mut();
        let mut changed = state.set_root(root);
        changed |= state.set_distance(distance);
        changed |= state.set_parent(parent);

        if parent != id {
            self.promote_parent(parent);
        }

        if changed {
            emit_debug!(
                self,
                DebugEvent::StateChanged {
                    timestamp: now,
                    root,
                    distance,
                    parent,
                }
            );
        }

        let (new_neighbors, lost_neighbors) = self.take_cycle_flags();
        changed || new_neighbors || lost_neighbors
    }

    /// Keep the elected parent in slot 0.
    fn promote_parent(&mut self, parent: NodeId) {
        let previous = match self.table().parent_slot() {
            Some(entry) if entry.address == parent => return,
            Some(entry) => entry.address,
            None => return,
        };
        if self.table_mut().promote(parent) {
            emit_debug!(self, DebugEvent::ParentPromoted { parent, previous });
        }
    }
}
