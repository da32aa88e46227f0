//! Mesh simulation core.
//!
//! Everything needed to run a time-stepped wireless mesh without any outer
//! surface:
//! - Packets with hop budgets and copy-on-forward path traces
//! - Node state machines (beacons, neighbor tables, dedup, store-and-forward)
//! - The delivery engine resolving geometric reachability each tick
//!
//! ## Module Organization
//!
//! - `types`: Shared data structures (ids, destinations, positions, history, errors)
//! - `packet`: Packet model and the driver-facing `PacketSpec`
//! - `geometry`: Distance and range checks, random placement
//! - `node`: Per-node protocol state machine
//! - `network`: The environment that owns all nodes and drives ticks
//!
//! Nodes never hold references to each other; they meet only through the
//! delivery queue owned by [`Network`].

pub mod geometry;
pub mod network;
pub mod node;
pub mod packet;
pub mod types;

// Re-export commonly used types
pub use network::{Network, NetworkStats, NodeSpec, NodeStatus};
pub use node::{Node, ReceiveOutcome};
pub use packet::{Packet, PacketId, PacketKind, PacketSpec};
pub use types::{Destination, NetworkError, NodeId, NodeMessage, Point};
