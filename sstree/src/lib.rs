#![forbid(unsafe_code)]
//! sstree - Self-stabilizing spanning tree for low-power radio networks
//!
//! Every node periodically broadcasts its view of the tree (root, hop
//! distance, parent) and rebuilds that view from what its neighbors last
//! advertised. The node with the smallest identifier in a connected component
//! becomes root; every other node picks the neighbor offering the shortest
//! route to it. Silent neighbors are evicted, so the tree repairs itself
//! after failures without any reset.
//!
//! This crate is `no_std` but **requires the `alloc` crate** for the event
//! callback box and the transmit buffer. Neighbor storage is a fixed array
//! sized by a const generic.
//!
//! # Key Properties
//!
//! - Converges to the minimum identifier within a number of broadcast rounds
//!   on the order of the network diameter
//! - Bounded memory: at most `N` neighbors, no per-entry allocation
//! - Single-threaded: driven entirely by receive and timer callbacks
//! - The radio is kept awake across every transmission
//!
//! # Example (basic usage)
//!
//! ```
//! use sstree::traits::test_impls::{MockClock, MockPower, MockRadio, MockTimer};
//! use sstree::wire::{Encode, TreeStateMessage};
//! use sstree::{Event, Node, Reason, TreeState};
//!
//! let mut node: Node<_, _, _, _> = Node::new(
//!     MockRadio::new(10),
//!     MockClock::new(),
//!     MockTimer::new(),
//!     MockPower::new(),
//! );
//! node.set_event_callback(|event: Event| {
//!     let _ = event.neighbor();
//! });
//! node.start();
//! assert!(node.is_root());
//!
//! // Node 4 advertises itself as root.
//! let frame = TreeStateMessage::new(
//!     Reason::Regular,
//!     TreeState { root: 4, distance: 0, parent: 4, user_data: () },
//! )
//! .encode_to_vec();
//! node.on_receive(4, &frame);
//! node.update_state();
//!
//! assert_eq!(node.parent(), Some(4));
//! assert_eq!(node.state().distance, 1);
//! ```
//!
//! # Example (integration pattern)
//!
//! ```text
//! // Radio driver receive callback:
//! //     node.on_receive(from, frame);
//! // Timer service expiry callback:
//! //     match node.handle_timer(tag) {
//! //         TimerOutcome::Tick { changed: true } => node.broadcast_state(Reason::Triggered),
//! //         TimerOutcome::Missed(m) => log_missed(m.neighbor),
//! //         _ => {}
//! //     }
//! ```
//!
//! # Module Structure
//!
//! - [`types`] - Core types (NodeId, TreeState, Event, ...)
//! - [`wire`] - Wire format serialization
//! - [`traits`] - Radio, Clock, Timer, PowerControl traits
//! - [`node`] - Main Node struct and public API
//! - [`tree`] - Neighbor bookkeeping and convergence
//! - [`table`] - Fixed-capacity neighbor table
//! - [`liveness`] - Per-neighbor broadcast watchdogs
//! - [`time`] - Timestamp and Duration types
//! - [`config`] - Compile-time timing configuration
//! - [`debug`] - Protocol tracing events

#![no_std]

// Prevent test/debug features from being used in release builds.
#[cfg(all(feature = "test-support", not(test), not(debug_assertions)))]
compile_error!(
    "The `test-support` feature must not be enabled in release builds. \
     It exposes mock radio, clock, timer and power implementations."
);

#[cfg(all(feature = "debug", not(test), not(debug_assertions)))]
compile_error!(
    "The `debug` feature must not be enabled in release builds. \
     It adds protocol tracing overhead intended only for development and simulation."
);

extern crate alloc;

pub mod config;
#[macro_use]
pub mod debug;
pub mod liveness;
pub mod node;
pub mod table;
pub mod time;
pub mod traits;
pub mod tree;
pub mod types;
pub mod wire;

// Re-export main types at crate root
pub use config::{DefaultConfig, LowPowerConfig, TreeConfig};
pub use node::{EventCallback, Node, TimerOutcome};
pub use table::{NeighborEntry, NeighborTable};
pub use time::{Duration, Timestamp};
pub use traits::{Caffeine, Clock, PowerControl, Radio, Timer};
pub use types::{
    Edge, Event, EventType, MissedBroadcast, Neighbor, NodeId, Reason, TimerTag, TreeState,
};
pub use wire::{Decode, DecodeError, Encode, TreeStateMessage, UserData};

// Re-export constants
pub use types::{
    BROADCAST_ADDRESS, DISTANCE_UNKNOWN, MAX_DISTANCE, MAX_NEIGHBORS, NULL_NODE_ID,
};
