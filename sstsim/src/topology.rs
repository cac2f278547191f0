//! Radio reachability between simulated nodes.

use hashbrown::HashMap;
use sstree::{Duration, NodeId};

/// A bidirectional radio link.
#[derive(Debug, Clone)]
pub struct Link {
    /// Probability that a frame is lost (0.0 to 1.0).
    pub loss_rate: f64,
    /// Air time plus processing delay.
    pub delay: Duration,
    /// Cleared while the link is cut by a partition or a scenario action.
    pub active: bool,
}

impl Default for Link {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            delay: Duration::from_millis(1),
            active: true,
        }
    }
}

impl Link {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loss_rate(mut self, rate: f64) -> Self {
        self.loss_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }
}

/// Which nodes hear each other's broadcasts.
///
/// Links are stored once per unordered pair.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    links: HashMap<(NodeId, NodeId), Link>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every node hears every other node.
    pub fn fully_connected(nodes: &[NodeId]) -> Self {
        let mut topo = Self::new();
        for (i, &a) in nodes.iter().enumerate() {
            for &b in &nodes[i + 1..] {
                topo.add_link(a, b, Link::default());
            }
        }
        topo
    }

    /// Each node hears only its predecessor and successor.
    pub fn chain(nodes: &[NodeId]) -> Self {
        let mut topo = Self::new();
        for pair in nodes.windows(2) {
            topo.add_link(pair[0], pair[1], Link::default());
        }
        topo
    }

    /// The first node is a hub heard by all others; spokes do not hear each other.
    pub fn star(nodes: &[NodeId]) -> Self {
        let mut topo = Self::new();
        if let Some((&hub, spokes)) = nodes.split_first() {
            for &spoke in spokes {
                topo.add_link(hub, spoke, Link::default());
            }
        }
        topo
    }

    /// Nodes laid out row by row on a grid `width` columns wide, linked to
    /// their horizontal and vertical neighbors.
    pub fn grid(nodes: &[NodeId], width: usize) -> Self {
        let mut topo = Self::new();
        let width = width.max(1);
        for (i, &a) in nodes.iter().enumerate() {
            if (i + 1) % width != 0 {
                if let Some(&b) = nodes.get(i + 1) {
                    topo.add_link(a, b, Link::default());
                }
            }
            if let Some(&b) = nodes.get(i + width) {
                topo.add_link(a, b, Link::default());
            }
        }
        topo
    }

    /// Random geometric graph in the unit square.
    ///
    /// Positions are derived from `seed`. Nodes within `radius` of each other
    /// are linked; if that leaves the graph disconnected the shortest bridging
    /// edges are added until it is not.
    pub fn random_geometric(nodes: &[NodeId], seed: u64, radius: f64) -> Self {
        let mut topo = Self::new();
        if nodes.len() < 2 {
            return topo;
        }

        let positions = place_nodes(nodes.len(), seed);
        let mut edges = Vec::with_capacity(nodes.len() * (nodes.len() - 1) / 2);
        for i in 0..nodes.len() {
            for j in i + 1..nodes.len() {
                let (dx, dy) = (
                    positions[i].0 - positions[j].0,
                    positions[i].1 - positions[j].1,
                );
                let dist = dx.hypot(dy);
                if dist <= radius {
                    topo.add_link(nodes[i], nodes[j], Link::default());
                }
                edges.push((dist, i, j));
            }
        }

        topo.bridge_components(nodes, &mut edges);
        topo
    }

    /// Random geometric graph with a radius giving about five neighbors per node.
    pub fn random_geometric_adaptive(nodes: &[NodeId], seed: u64) -> Self {
        Self::random_geometric(nodes, seed, adaptive_radius(nodes.len()))
    }

    pub fn add_link(&mut self, a: NodeId, b: NodeId, link: Link) {
        self.links.insert(key(a, b), link);
    }

    pub fn remove_link(&mut self, a: NodeId, b: NodeId) -> Option<Link> {
        self.links.remove(&key(a, b))
    }

    pub fn get_link(&self, a: NodeId, b: NodeId) -> Option<&Link> {
        self.links.get(&key(a, b))
    }

    pub fn get_link_mut(&mut self, a: NodeId, b: NodeId) -> Option<&mut Link> {
        self.links.get_mut(&key(a, b))
    }

    /// True if a link exists and is active.
    pub fn is_connected(&self, a: NodeId, b: NodeId) -> bool {
        self.get_link(a, b).is_some_and(|link| link.active)
    }

    /// Nodes reachable from `node` over active links, in ascending order.
    pub fn neighbors(&self, node: NodeId) -> Vec<NodeId> {
        let mut result: Vec<NodeId> = self
            .links
            .iter()
            .filter(|(_, link)| link.active)
            .filter_map(|(&(a, b), _)| match node {
                n if n == a => Some(b),
                n if n == b => Some(a),
                _ => None,
            })
            .collect();
        result.sort_unstable();
        result
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Cut every link whose endpoints fall in different groups.
    ///
    /// Nodes not listed in any group count as one extra group.
    pub fn partition(&mut self, groups: &[Vec<NodeId>]) {
        let group_of = |n: NodeId| groups.iter().position(|g| g.contains(&n));
        for (&(a, b), link) in self.links.iter_mut() {
            if group_of(a) != group_of(b) {
                link.active = false;
            }
        }
    }

    /// Reactivate every link.
    pub fn heal(&mut self) {
        for link in self.links.values_mut() {
            link.active = true;
        }
    }

    /// Deactivate all links touching `node`.
    pub fn isolate(&mut self, node: NodeId) {
        for (&(a, b), link) in self.links.iter_mut() {
            if a == node || b == node {
                link.active = false;
            }
        }
    }

    pub fn set_global_loss_rate(&mut self, rate: f64) {
        let rate = rate.clamp(0.0, 1.0);
        for link in self.links.values_mut() {
            link.loss_rate = rate;
        }
    }

    pub fn set_global_delay(&mut self, delay: Duration) {
        for link in self.links.values_mut() {
            link.delay = delay;
        }
    }

    /// Add the shortest edges joining separate components (Kruskal).
    fn bridge_components(&mut self, nodes: &[NodeId], edges: &mut [(f64, usize, usize)]) {
        edges.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut sets = DisjointSets::new(nodes.len());
        for &(_, i, j) in edges.iter() {
            if self.is_connected(nodes[i], nodes[j]) {
                sets.union(i, j);
            }
        }
        for &(_, i, j) in edges.iter() {
            if sets.components == 1 {
                break;
            }
            if sets.union(i, j) {
                self.add_link(nodes[i], nodes[j], Link::default());
            }
        }
    }
}

fn key(a: NodeId, b: NodeId) -> (NodeId, NodeId) {
    (a.min(b), a.max(b))
}

/// Deterministic positions in the unit square (glibc LCG constants).
fn place_nodes(count: usize, seed: u64) -> Vec<(f64, f64)> {
    let mut state = seed;
    let mut next = move || {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        ((state >> 16) & 0x7FFF) as f64 / 32767.0
    };
    (0..count).map(|_| (next(), next())).collect()
}

/// r = sqrt(k / ((n - 1) * pi)) with k = 5, clamped to [0.15, 0.70].
pub(crate) fn adaptive_radius(num_nodes: usize) -> f64 {
    if num_nodes < 2 {
        return 0.5;
    }
    let n = num_nodes as f64;
    (5.0 / ((n - 1.0) * core::f64::consts::PI))
        .sqrt()
        .clamp(0.15, 0.70)
}

struct DisjointSets {
    parent: Vec<usize>,
    components: usize,
}

impl DisjointSets {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            components: n,
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Returns false if already joined.
    fn union(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        self.parent[ra] = rb;
        self.components -= 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_nodes(count: usize) -> Vec<NodeId> {
        (1..=count as NodeId).collect()
    }

    fn assert_topology_connected(topo: &Topology, nodes: &[NodeId]) {
        let mut seen = vec![nodes[0]];
        let mut stack = vec![nodes[0]];
        while let Some(n) = stack.pop() {
            for m in topo.neighbors(n) {
                if !seen.contains(&m) {
                    seen.push(m);
                    stack.push(m);
                }
            }
        }
        assert_eq!(seen.len(), nodes.len(), "graph is disconnected");
    }

    #[test]
    fn test_fully_connected() {
        let nodes = make_nodes(3);
        let topo = Topology::fully_connected(&nodes);

        assert!(topo.is_connected(1, 2));
        assert!(topo.is_connected(1, 3));
        assert!(topo.is_connected(3, 2));
        assert_eq!(topo.link_count(), 3);
    }

    #[test]
    fn test_chain() {
        let nodes = make_nodes(4);
        let topo = Topology::chain(&nodes);

        assert!(topo.is_connected(1, 2));
        assert!(topo.is_connected(2, 3));
        assert!(topo.is_connected(3, 4));
        assert!(!topo.is_connected(1, 3));
        assert!(!topo.is_connected(1, 4));
    }

    #[test]
    fn test_star() {
        let nodes = make_nodes(4);
        let topo = Topology::star(&nodes);

        assert_eq!(topo.neighbors(1), [2, 3, 4]);
        assert_eq!(topo.neighbors(3), [1]);
        assert!(!topo.is_connected(2, 3));
    }

    #[test]
    fn test_grid() {
        // 1 2 3
        // 4 5 6
        let nodes = make_nodes(6);
        let topo = Topology::grid(&nodes, 3);

        assert_eq!(topo.neighbors(5), [2, 4, 6]);
        assert_eq!(topo.neighbors(1), [2, 4]);
        assert!(!topo.is_connected(3, 4));
        assert_eq!(topo.link_count(), 7);
    }

    #[test]
    fn test_partition_and_heal() {
        let nodes = make_nodes(4);
        let mut topo = Topology::fully_connected(&nodes);

        topo.partition(&[vec![1, 2], vec![3, 4]]);
        assert!(topo.is_connected(1, 2));
        assert!(topo.is_connected(3, 4));
        assert!(!topo.is_connected(1, 3));
        assert!(!topo.is_connected(2, 4));
        assert_eq!(topo.neighbors(1), [2]);

        topo.heal();
        assert!(topo.is_connected(1, 3));
    }

    #[test]
    fn test_isolate() {
        let nodes = make_nodes(3);
        let mut topo = Topology::fully_connected(&nodes);
        topo.isolate(2);

        assert!(topo.neighbors(2).is_empty());
        assert!(topo.is_connected(1, 3));
    }

    #[test]
    fn test_link_lookup_is_symmetric() {
        let mut topo = Topology::new();
        topo.add_link(9, 4, Link::new().with_loss_rate(1.5));

        assert_eq!(topo.get_link(4, 9).map(|l| l.loss_rate), Some(1.0));
        if let Some(link) = topo.get_link_mut(9, 4) {
            link.active = false;
        }
        assert!(!topo.is_connected(4, 9));
        assert!(topo.remove_link(4, 9).is_some());
        assert_eq!(topo.link_count(), 0);
    }

    #[test]
    fn test_random_geometric_connected() {
        let nodes = make_nodes(20);
        let topo = Topology::random_geometric(&nodes, 42, 0.3);
        assert_topology_connected(&topo, &nodes);
    }

    #[test]
    fn test_random_geometric_tiny_radius_still_connected() {
        let nodes = make_nodes(10);
        let topo = Topology::random_geometric(&nodes, 42, 0.01);
        assert_topology_connected(&topo, &nodes);
        assert!(topo.link_count() >= nodes.len() - 1);
    }

    #[test]
    fn test_random_geometric_deterministic() {
        let nodes = make_nodes(10);
        let a = Topology::random_geometric(&nodes, 123, 0.4);
        let b = Topology::random_geometric(&nodes, 123, 0.4);

        for &n in &nodes {
            assert_eq!(a.neighbors(n), b.neighbors(n));
        }
    }

    #[test]
    fn test_random_geometric_adaptive_density() {
        let nodes = make_nodes(50);
        let topo = Topology::random_geometric_adaptive(&nodes, 42);
        assert_topology_connected(&topo, &nodes);

        let total: usize = nodes.iter().map(|&n| topo.neighbors(n).len()).sum();
        let avg = total as f64 / nodes.len() as f64;
        assert!((3.0..=15.0).contains(&avg), "average degree {avg}");
    }

    #[test]
    fn test_adaptive_radius_bounds() {
        assert!((adaptive_radius(2) - 0.70).abs() < 0.01);
        let r5 = adaptive_radius(5);
        let r100 = adaptive_radius(100);
        assert!(r100 < r5);
        assert!((adaptive_radius(1000) - 0.15).abs() < 0.01);
    }
}
