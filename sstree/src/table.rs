//! Fixed-capacity neighbor table.
//!
//! Slot 0 holds the current parent (or the lowest-address neighbor before
//! the first convergence pass). Slots `1..len` hold every other neighbor in
//! strictly ascending address order. Occupied slots are always contiguous:
//! every insertion and removal splices the array in place by rotating the
//! affected range, so no slot is ever left vacant between two entries.
//!
//! Slot indices are only valid until the next mutation. Re-resolve by
//! address with [`NeighborTable::find_position`] after any insert or evict.

use core::mem;

use crate::time::{Duration, Timestamp};
use crate::types::{Edge, Neighbor, NodeId, TreeState, MAX_NEIGHBORS, NULL_NODE_ID};

/// One known neighbor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NeighborEntry<U> {
    /// Neighbor address, [`NULL_NODE_ID`] for a vacant slot.
    pub address: NodeId,
    /// Local time of the most recent message from this neighbor.
    pub last_update: Timestamp,
    /// Most recently advertised state.
    pub state: TreeState<U>,
}

impl<U: Default> NeighborEntry<U> {
    fn vacant() -> Self {
        Self {
            address: NULL_NODE_ID,
            last_update: Timestamp::ZERO,
            state: TreeState::default(),
        }
    }
}

impl<U> NeighborEntry<U> {
    pub fn is_vacant(&self) -> bool {
        self.address == NULL_NODE_ID
    }

    /// Whether this entry has been silent for at least `dead` at `now`.
    pub fn is_stale(&self, now: Timestamp, dead: Duration) -> bool {
        self.last_update + dead <= now
    }
}

/// Outcome of [`NeighborTable::insert_or_update`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Upsert {
    /// New neighbor stored at the given slot.
    Inserted(usize),
    /// Known neighbor refreshed in place at the given slot.
    Updated(usize),
    /// Table full; nothing was stored.
    Dropped,
}

/// Neighbor table with compile-time capacity `N`.
pub struct NeighborTable<U, const N: usize = MAX_NEIGHBORS> {
    entries: [NeighborEntry<U>; N],
    len: usize,
}

impl<U: Default, const N: usize> Default for NeighborTable<U, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<U: Default, const N: usize> NeighborTable<U, N> {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            entries: core::array::from_fn(|_| NeighborEntry::vacant()),
            len: 0,
        }
    }

    /// Store `state` for `addr`, inserting a new entry if needed.
    ///
    /// While the table is full every message is dropped, including those
    /// from known neighbors. Entries then age out through eviction.
    pub fn insert_or_update(&mut self, addr: NodeId, state: TreeState<U>, now: Timestamp) -> Upsert {
        if self.is_full() {
            return Upsert::Dropped;
        }
        match self.find_position(addr) {
            Ok(slot) => {
                let entry = &mut self.entries[slot];
                entry.state = state;
                entry.last_update = now;
                Upsert::Updated(slot)
            }
            Err(pos) => {
                let entry = NeighborEntry {
                    address: addr,
                    last_update: now,
                    state,
                };
                if pos == 0 {
                    self.install_parent(entry);
                } else {
                    self.insert_child(pos, entry);
                }
                Upsert::Inserted(pos)
            }
        }
    }

    /// Remove the entry at `slot`, shifting later entries left.
    ///
    /// Removing slot 0 slides the lowest child into the parent slot.
    pub fn remove_at(&mut self, slot: usize) -> NeighborEntry<U> {
        assert!(slot < self.len, "remove_at: slot {} out of bounds", slot);
        let removed = mem::replace(&mut self.entries[slot], NeighborEntry::vacant());
        self.entries[slot..self.len].rotate_left(1);
        self.len -= 1;
        removed
    }

    /// Remove the entry for `addr`, if present.
    pub fn remove(&mut self, addr: NodeId) -> Option<NeighborEntry<U>> {
        let slot = self.find_position(addr).ok()?;
        Some(self.remove_at(slot))
    }

    /// First slot at or after `from` whose entry has been silent for at
    /// least `dead`.
    pub fn next_stale(&self, from: usize, now: Timestamp, dead: Duration) -> Option<usize> {
        self.entries()
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, e)| e.is_stale(now, dead))
            .map(|(slot, _)| slot)
    }

    /// Move `addr` into slot 0, re-inserting the previous slot-0 entry among
    /// the children. Returns false if `addr` is unknown.
    pub fn promote(&mut self, addr: NodeId) -> bool {
        match self.find_position(addr) {
            Ok(0) => true,
            Ok(slot) => {
                let entry = self.remove_at(slot);
                self.install_parent(entry);
                true
            }
            Err(_) => false,
        }
    }

    /// Put `entry` into slot 0, moving any current occupant into the
    /// children region.
    fn install_parent(&mut self, entry: NeighborEntry<U>) {
        assert!(self.len < N, "install_parent: table full");
        if self.len == 0 {
            self.entries[0] = entry;
            self.len = 1;
            return;
        }
        let previous = mem::replace(&mut self.entries[0], entry);
        let pos = match self.search_children(previous.address) {
            Ok(_) => unreachable!("address {} stored twice", previous.address),
            Err(pos) => pos,
        };
        self.insert_child(pos, previous);
    }

    /// Insert at `pos` in the children region, shifting later entries right.
    fn insert_child(&mut self, pos: usize, entry: NeighborEntry<U>) {
        assert!(
            pos >= 1 && pos <= self.len && self.len < N,
            "insert_child: position {} invalid for len {} / capacity {}",
            pos,
            self.len,
            N
        );
        // entries[len] is vacant; rotating it to `pos` opens the gap.
        self.entries[pos..=self.len].rotate_right(1);
        self.entries[pos] = entry;
        self.len += 1;
    }
}

impl<U, const N: usize> NeighborTable<U, N> {
    /// Exact slot of `addr` (`Ok`) or the slot where it would be inserted
    /// (`Err`).
    ///
    /// Slot 0 is checked first; the children region is binary searched. An
    /// empty table resolves to `Err(0)`.
    pub fn find_position(&self, addr: NodeId) -> Result<usize, usize> {
        if self.len == 0 {
            return Err(0);
        }
        if self.entries[0].address == addr {
            return Ok(0);
        }
        self.search_children(addr)
    }

    fn search_children(&self, addr: NodeId) -> Result<usize, usize> {
        let upper = self.len.max(1);
        self.entries[1..upper]
            .binary_search_by_key(&addr, |e| e.address)
            .map(|i| i + 1)
            .map_err(|i| i + 1)
    }

    /// Entry for `addr`, if known.
    pub fn get(&self, addr: NodeId) -> Option<&NeighborEntry<U>> {
        self.find_position(addr).ok().map(|slot| &self.entries[slot])
    }

    /// Entry at `slot`, if occupied.
    pub fn slot(&self, slot: usize) -> Option<&NeighborEntry<U>> {
        self.entries[..self.len].get(slot)
    }

    /// The slot-0 entry.
    pub fn parent_slot(&self) -> Option<&NeighborEntry<U>> {
        self.slot(0)
    }

    /// Occupied slots after slot 0, ascending by address.
    pub fn children(&self) -> &[NeighborEntry<U>] {
        if self.len == 0 {
            &[]
        } else {
            &self.entries[1..self.len]
        }
    }

    /// All occupied slots.
    pub fn entries(&self) -> &[NeighborEntry<U>] {
        &self.entries[..self.len]
    }

    pub fn contains(&self, addr: NodeId) -> bool {
        self.find_position(addr).is_ok()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == N
    }

    pub fn capacity(&self) -> usize {
        N
    }

    /// Neighbors with their edge direction: slot 0 is outbound, the rest
    /// inbound.
    pub fn iter(&self) -> impl Iterator<Item = Neighbor> + '_ {
        self.entries().iter().enumerate().map(|(slot, e)| Neighbor {
            id: e.address,
            edge: if slot == 0 { Edge::Outbound } else { Edge::Inbound },
        })
    }

    /// Check structural invariants, panicking on violation.
    #[cfg(any(test, feature = "test-support"))]
    pub fn assert_invariants(&self) {
        assert!(self.len <= N);
        for (slot, e) in self.entries().iter().enumerate() {
            assert!(!e.is_vacant(), "vacant slot {} inside occupied range", slot);
        }
        for e in &self.entries[self.len..] {
            assert!(e.is_vacant(), "occupied slot past len");
        }
        let children = self.children();
        for pair in children.windows(2) {
            assert!(pair[0].address < pair[1].address, "children not strictly ascending");
        }
        if let Some(parent) = self.parent_slot() {
            assert!(
                children.binary_search_by_key(&parent.address, |e| e.address).is_err(),
                "parent address duplicated among children"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::*;

    fn state(root: NodeId, distance: u8, parent: NodeId) -> TreeState<()> {
        TreeState {
            root,
            distance,
            parent,
            user_data: (),
        }
    }

    fn addrs<const N: usize>(t: &NeighborTable<(), N>) -> Vec<NodeId> {
        t.entries().iter().map(|e| e.address).collect()
    }

    fn at(ms: u64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    #[test]
    fn test_first_insert_goes_to_slot_zero() {
        let mut t: NeighborTable<()> = NeighborTable::new();
        assert_eq!(t.find_position(9), Err(0));
        assert_eq!(t.insert_or_update(9, state(9, 0, 9), at(0)), Upsert::Inserted(0));
        assert_eq!(t.find_position(9), Ok(0));
        assert_eq!(t.len(), 1);
        t.assert_invariants();
    }

    #[test]
    fn test_children_kept_sorted() {
        let mut t: NeighborTable<()> = NeighborTable::new();
        for addr in [50, 30, 70, 10, 60, 20] {
            t.insert_or_update(addr, state(1, 1, 1), at(0));
            t.assert_invariants();
        }
        assert_eq!(addrs(&t), [50, 10, 20, 30, 60, 70]);
    }

    #[test]
    fn test_find_position_insertion_points() {
        let mut t: NeighborTable<()> = NeighborTable::new();
        for addr in [5, 10, 20, 30] {
            t.insert_or_update(addr, state(1, 1, 1), at(0));
        }
        // slot 0 = 5, children = [10, 20, 30]
        assert_eq!(t.find_position(5), Ok(0));
        assert_eq!(t.find_position(10), Ok(1));
        assert_eq!(t.find_position(30), Ok(3));
        assert_eq!(t.find_position(1), Err(1));
        assert_eq!(t.find_position(15), Err(2));
        assert_eq!(t.find_position(25), Err(3));
        assert_eq!(t.find_position(99), Err(4));
    }

    #[test]
    fn test_update_in_place_keeps_order() {
        let mut t: NeighborTable<()> = NeighborTable::new();
        for addr in [4, 8, 6] {
            t.insert_or_update(addr, state(4, 0, 4), at(0));
        }
        let before = addrs(&t);
        assert_eq!(t.insert_or_update(6, state(4, 0, 4), at(100)), Upsert::Updated(1));
        assert_eq!(t.insert_or_update(6, state(4, 0, 4), at(200)), Upsert::Updated(1));
        assert_eq!(addrs(&t), before);
        assert_eq!(t.get(6).unwrap().last_update, at(200));
    }

    #[test]
    fn test_full_table_drops_every_message() {
        let mut t: NeighborTable<(), 4> = NeighborTable::new();
        for addr in 1..=4 {
            t.insert_or_update(addr, state(1, 0, 1), at(0));
        }
        assert!(t.is_full());
        let before = addrs(&t);

        assert_eq!(t.insert_or_update(9, state(1, 1, 1), at(10)), Upsert::Dropped);
        assert_eq!(t.insert_or_update(3, state(1, 5, 1), at(10)), Upsert::Dropped);
        assert_eq!(addrs(&t), before);
        let known = t.get(3).unwrap();
        assert_eq!(known.last_update, at(0));
        assert_eq!(known.state.distance, 0);
    }

    #[test]
    fn test_remove_compacts() {
        let mut t: NeighborTable<()> = NeighborTable::new();
        for addr in [5, 1, 2, 3] {
            t.insert_or_update(addr, state(1, 1, 1), at(0));
        }
        let removed = t.remove(2).unwrap();
        assert_eq!(removed.address, 2);
        assert_eq!(addrs(&t), [5, 1, 3]);
        t.assert_invariants();
        assert!(t.remove(2).is_none());
    }

    #[test]
    fn test_removing_parent_slides_lowest_child_up() {
        let mut t: NeighborTable<()> = NeighborTable::new();
        for addr in [5, 7, 3] {
            t.insert_or_update(addr, state(1, 1, 1), at(0));
        }
        assert_eq!(addrs(&t), [5, 3, 7]);
        t.remove_at(0);
        assert_eq!(addrs(&t), [3, 7]);
        t.assert_invariants();
    }

    #[test]
    fn test_next_stale_boundary() {
        let mut t: NeighborTable<()> = NeighborTable::new();
        t.insert_or_update(4, state(4, 0, 4), at(0));
        t.insert_or_update(6, state(4, 1, 4), at(100));
        t.insert_or_update(8, state(4, 1, 4), at(0));
        let dead = Duration::from_millis(400);

        assert_eq!(t.next_stale(0, at(399), dead), None);
        // last_update + dead <= now is stale exactly at the boundary.
        assert_eq!(t.next_stale(0, at(400), dead), Some(0));
        assert_eq!(t.next_stale(1, at(400), dead), Some(2));
        assert_eq!(t.next_stale(3, at(400), dead), None);

        let mut lost = Vec::new();
        let mut from = 0;
        while let Some(slot) = t.next_stale(from, at(400), dead) {
            lost.push(t.remove_at(slot).address);
            from = slot;
        }
        assert_eq!(lost, [4, 8]);
        assert_eq!(addrs(&t), [6]);
        t.assert_invariants();
    }

    #[test]
    fn test_promote_swaps_parent() {
        let mut t: NeighborTable<()> = NeighborTable::new();
        for addr in [9, 2, 5, 12] {
            t.insert_or_update(addr, state(1, 1, 1), at(0));
        }
        assert_eq!(addrs(&t), [9, 2, 5, 12]);
        assert!(t.promote(5));
        assert_eq!(addrs(&t), [5, 2, 9, 12]);
        t.assert_invariants();

        assert!(t.promote(5));
        assert_eq!(addrs(&t), [5, 2, 9, 12]);
        assert!(!t.promote(77));
    }

    #[test]
    fn test_promote_in_full_table() {
        let mut t: NeighborTable<(), 3> = NeighborTable::new();
        for addr in [3, 1, 2] {
            t.insert_or_update(addr, state(1, 1, 1), at(0));
        }
        assert!(t.is_full());
        assert!(t.promote(2));
        assert_eq!(addrs(&t), [2, 1, 3]);
        t.assert_invariants();
    }

    #[test]
    fn test_iter_edges() {
        let mut t: NeighborTable<()> = NeighborTable::new();
        for addr in [4, 8] {
            t.insert_or_update(addr, state(1, 1, 1), at(0));
        }
        let edges: Vec<_> = t.iter().collect();
        assert_eq!(
            edges,
            [
                Neighbor { id: 4, edge: Edge::Outbound },
                Neighbor { id: 8, edge: Edge::Inbound },
            ]
        );
        assert_eq!(NeighborTable::<(), 2>::new().iter().count(), 0);
    }

    #[test]
    fn test_children_of_empty_table() {
        let t: NeighborTable<()> = NeighborTable::new();
        assert!(t.children().is_empty());
        assert!(t.parent_slot().is_none());
        assert_eq!(t.capacity(), MAX_NEIGHBORS);
    }
}
