//! Scenario builder for setting up and running simulations.

use sstree::{Duration, NodeId, Timestamp};

use crate::event::ScenarioAction;
use crate::metrics::SimulationResult;
use crate::sim::Simulator;
use crate::topology::Topology;

#[derive(Debug, Clone)]
enum TopologyType {
    FullyConnected,
    Chain,
    Star,
    Grid { width: usize },
    RandomGeometric { radius: f64 },
    RandomGeometricAdaptive,
    Custom(Topology),
}

/// Scenario step addressed by node index, resolved to ids at build time.
#[derive(Debug, Clone)]
enum PlannedAction {
    Partition(Vec<Vec<usize>>),
    Heal,
    Kill(usize),
    Snapshot,
}

/// Builder for simulation scenarios.
///
/// Nodes are addressed by index (0..num_nodes) while building. Unless ids are
/// given explicitly, index `i` gets a seed-dependent id from 1..=num_nodes so
/// that the eventual root sits at a different place in each topology.
pub struct ScenarioBuilder {
    num_nodes: usize,
    seed: u64,
    node_ids: Option<Vec<NodeId>>,
    topology_type: Option<TopologyType>,
    loss_rate: f64,
    delay: Duration,
    actions: Vec<(Timestamp, PlannedAction)>,
    snapshot_interval: Option<Duration>,
}

impl Default for ScenarioBuilder {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ScenarioBuilder {
    /// A scenario with `num_nodes` nodes.
    ///
    /// A topology must be chosen before [`build`](Self::build).
    pub fn new(num_nodes: usize) -> Self {
        Self {
            num_nodes,
            seed: 42,
            node_ids: None,
            topology_type: None,
            loss_rate: 0.0,
            delay: Duration::from_millis(1),
            actions: Vec::new(),
            snapshot_interval: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Use these radio addresses, in index order. Overrides the node count.
    pub fn with_node_ids(mut self, ids: Vec<NodeId>) -> Self {
        self.num_nodes = ids.len();
        self.node_ids = Some(ids);
        self
    }

    /// Use a custom topology over the scenario's node ids.
    pub fn topology(mut self, topo: Topology) -> Self {
        self.topology_type = Some(TopologyType::Custom(topo));
        self
    }

    pub fn fully_connected(mut self) -> Self {
        self.topology_type = Some(TopologyType::FullyConnected);
        self
    }

    pub fn chain_topology(mut self) -> Self {
        self.topology_type = Some(TopologyType::Chain);
        self
    }

    /// Star with node index 0 as hub.
    pub fn star_topology(mut self) -> Self {
        self.topology_type = Some(TopologyType::Star);
        self
    }

    pub fn grid_topology(mut self, width: usize) -> Self {
        self.topology_type = Some(TopologyType::Grid { width });
        self
    }

    /// Random geometric graph, made connected if the radius leaves gaps.
    pub fn random_geometric(mut self, radius: f64) -> Self {
        self.topology_type = Some(TopologyType::RandomGeometric { radius });
        self
    }

    /// Random geometric graph with about five neighbors per node.
    pub fn random_geometric_adaptive(mut self) -> Self {
        self.topology_type = Some(TopologyType::RandomGeometricAdaptive);
        self
    }

    pub fn with_loss_rate(mut self, rate: f64) -> Self {
        self.loss_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval = Some(interval);
        self
    }

    /// Cut the network into groups of node indices at `time`.
    pub fn partition_at(mut self, time: Timestamp, groups: Vec<Vec<usize>>) -> Self {
        self.actions.push((time, PlannedAction::Partition(groups)));
        self
    }

    pub fn heal_at(mut self, time: Timestamp) -> Self {
        self.actions.push((time, PlannedAction::Heal));
        self
    }

    /// Power off node `index` at `time`.
    pub fn kill_at(mut self, time: Timestamp, index: usize) -> Self {
        self.actions.push((time, PlannedAction::Kill(index)));
        self
    }

    pub fn snapshot_at(mut self, time: Timestamp) -> Self {
        self.actions.push((time, PlannedAction::Snapshot));
        self
    }

    /// Radio addresses by node index.
    pub fn node_ids(&self) -> Vec<NodeId> {
        match &self.node_ids {
            Some(ids) => ids.clone(),
            None => shuffled_ids(self.num_nodes, self.seed),
        }
    }

    /// Create the simulator, power on every node at t = 0 and queue the
    /// scenario actions. Returns the node ids by index.
    ///
    /// # Panics
    ///
    /// Panics if no topology was chosen.
    pub fn build(self) -> (Simulator, Vec<NodeId>) {
        let ids = self.node_ids();

        let mut topo = match self.topology_type {
            Some(TopologyType::FullyConnected) => Topology::fully_connected(&ids),
            Some(TopologyType::Chain) => Topology::chain(&ids),
            Some(TopologyType::Star) => Topology::star(&ids),
            Some(TopologyType::Grid { width }) => Topology::grid(&ids, width),
            Some(TopologyType::RandomGeometric { radius }) => {
                Topology::random_geometric(&ids, self.seed, radius)
            }
            Some(TopologyType::RandomGeometricAdaptive) => {
                Topology::random_geometric_adaptive(&ids, self.seed)
            }
            Some(TopologyType::Custom(t)) => t,
            None => panic!(
                "topology must be chosen: use .fully_connected(), .chain_topology(), \
                 .star_topology(), .grid_topology(), .random_geometric(), \
                 .random_geometric_adaptive() or .topology()"
            ),
        };
        if self.loss_rate > 0.0 {
            topo.set_global_loss_rate(self.loss_rate);
        }
        topo.set_global_delay(self.delay);

        let mut sim = Simulator::new(self.seed).with_topology(topo);
        if let Some(interval) = self.snapshot_interval {
            sim = sim.with_snapshot_interval(interval);
        }
        for &id in &ids {
            sim.add_node(id);
        }

        for (time, planned) in self.actions {
            let action = match planned {
                PlannedAction::Partition(groups) => ScenarioAction::Partition {
                    groups: groups
                        .into_iter()
                        .map(|g| g.into_iter().filter_map(|i| ids.get(i).copied()).collect())
                        .collect(),
                },
                PlannedAction::Heal => ScenarioAction::HealPartition,
                PlannedAction::Kill(index) => match ids.get(index) {
                    Some(&node) => ScenarioAction::KillNode { node },
                    None => continue,
                },
                PlannedAction::Snapshot => ScenarioAction::TakeSnapshot,
            };
            sim.schedule_action(time, action);
        }

        (sim, ids)
    }

    pub fn run_for(self, duration: Duration) -> SimulationResult {
        let (mut sim, _) = self.build();
        sim.run_for(duration)
    }

    pub fn run_until(self, time: Timestamp) -> SimulationResult {
        let (mut sim, _) = self.build();
        sim.run_until(time)
    }
}

/// N-node fully connected scenario.
pub fn simple_scenario(num_nodes: usize) -> ScenarioBuilder {
    ScenarioBuilder::new(num_nodes).fully_connected()
}

/// Multi-hop scenario over a lossy random geometric graph.
pub fn lossy_scenario(num_nodes: usize, loss_rate: f64) -> ScenarioBuilder {
    ScenarioBuilder::new(num_nodes)
        .random_geometric_adaptive()
        .with_loss_rate(loss_rate)
}

/// Ids 1..=count in a seed-dependent order (Fisher-Yates over an LCG).
fn shuffled_ids(count: usize, seed: u64) -> Vec<NodeId> {
    let mut ids: Vec<NodeId> = (1..=count).map(|i| i as NodeId).collect();
    let mut state = seed;
    for i in (1..ids.len()).rev() {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let j = ((state >> 33) % (i as u64 + 1)) as usize;
        ids.swap(i, j);
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_builder_basic() {
        let (sim, nodes) = ScenarioBuilder::new(3)
            .with_seed(123)
            .fully_connected()
            .build();

        assert_eq!(nodes.len(), 3);
        assert_eq!(sim.node_ids(), [1, 2, 3]);
    }

    #[test]
    fn test_shuffled_ids_are_a_permutation() {
        let mut ids = shuffled_ids(20, 7);
        assert_eq!(ids, shuffled_ids(20, 7));
        ids.sort_unstable();
        assert_eq!(ids, (1..=20).collect::<Vec<NodeId>>());
    }

    #[test]
    fn test_explicit_node_ids() {
        let builder = ScenarioBuilder::new(0)
            .with_node_ids(vec![30, 10, 20])
            .chain_topology();
        assert_eq!(builder.node_ids(), [30, 10, 20]);

        let (sim, nodes) = builder.build();
        assert_eq!(nodes, [30, 10, 20]);
        assert!(sim.topology().is_connected(30, 10));
        assert!(!sim.topology().is_connected(30, 20));
    }

    #[test]
    #[should_panic(expected = "topology must be chosen")]
    fn test_missing_topology_panics() {
        let _ = ScenarioBuilder::new(2).build();
    }

    #[test]
    fn test_scenario_run_for() {
        let result = simple_scenario(2).run_for(Duration::from_secs(1));

        assert!(result.end_time >= Timestamp::from_secs(1));
        assert!(!result.metrics.snapshots.is_empty());
    }

    #[test]
    fn test_scenario_link_settings() {
        let (sim, nodes) = ScenarioBuilder::new(2)
            .fully_connected()
            .with_loss_rate(0.5)
            .with_delay(Duration::from_millis(30))
            .build();

        let link = sim.topology().get_link(nodes[0], nodes[1]).unwrap();
        assert_eq!(link.loss_rate, 0.5);
        assert_eq!(link.delay, Duration::from_millis(30));
    }

    #[test]
    fn test_scenario_partition() {
        let (mut sim, nodes) = ScenarioBuilder::new(4)
            .fully_connected()
            .partition_at(Timestamp::from_millis(500), vec![vec![0, 1], vec![2, 3]])
            .build();

        assert!(sim.topology().is_connected(nodes[0], nodes[2]));
        sim.run_for(Duration::from_secs(1));

        assert!(!sim.topology().is_connected(nodes[0], nodes[2]));
        assert!(sim.topology().is_connected(nodes[0], nodes[1]));
        assert!(sim.topology().is_connected(nodes[2], nodes[3]));
    }

    #[test]
    fn test_scenario_kill_by_index() {
        let (mut sim, nodes) = ScenarioBuilder::new(3)
            .fully_connected()
            .kill_at(Timestamp::from_millis(100), 1)
            .kill_at(Timestamp::from_millis(100), 99)
            .build();

        sim.run_for(Duration::from_millis(200));
        let live = sim.live_node_ids();
        assert_eq!(live.len(), 2);
        assert!(!live.contains(&nodes[1]));
    }
}
