//! sstsim - Discrete event network simulator for sstree.
//!
//! Runs many [`sstree::Node`]s in one process against a simulated radio
//! medium. Time only advances when the next event is popped, so minutes of
//! protocol activity take milliseconds and every run is reproducible from
//! its seed.
//!
//! # Features
//!
//! - **Deterministic**: events ordered by (time, sequence number); loss drawn
//!   from a seeded generator
//! - **Topologies**: fully connected, chain, star, grid, random geometric, or custom
//! - **Link properties**: loss rate and delay per link
//! - **Scenarios**: scheduled partitions, healing and node failures
//! - **Metrics**: tree snapshots, frame counts, watchdog misses
//!
//! # Example
//!
//! ```
//! use sstsim::{Duration, ScenarioBuilder};
//!
//! let result = ScenarioBuilder::new(5)
//!     .with_seed(42)
//!     .fully_connected()
//!     .run_for(Duration::from_secs(5));
//!
//! assert!(result.converged());
//! assert_eq!(result.final_root(), Some(1));
//! ```
//!
//! # Architecture
//!
//! The simulator keeps a priority queue of events. Each step pops the
//! earliest event, advances the clock, and calls the node's receive or timer
//! handler directly. Frames and timer schedules the node produced are then
//! collected: frames are copied to every node the topology says can hear the
//! sender, and timers become future events. Debug events from each node are
//! forwarded to `tracing` at trace level.

pub mod event;
pub mod metrics;
pub mod node;
pub mod scenario;
pub mod sim;
pub mod topology;

pub use event::{Event, ScenarioAction, ScheduledEvent};
pub use metrics::{NodeView, SimMetrics, SimulationResult, TreeSnapshot};
pub use node::SimNode;
pub use scenario::{lossy_scenario, simple_scenario, ScenarioBuilder};
pub use sim::Simulator;
pub use sstree::{Duration, NodeId, Timestamp};
pub use topology::{Link, Topology};
