//! Type definitions for the simulation.
//!
//! Contains the small data structures shared across the core:
//! - Node identifiers and packet destinations
//! - World positions
//! - The per-node message history record
//! - The error type returned by node-addressed operations

use serde::{Deserialize, Serialize};
use std::fmt;

use super::packet::{PacketId, PacketKind};

/// Maximum message history per node (ring buffer). Bounded to keep memory predictable
/// in long runs where every HELLO beacon would otherwise be recorded forever.
pub const NODE_MESSAGES_CAPACITY: usize = 1000;

/// Wire spelling of the broadcast destination sentinel.
pub const BROADCAST: &str = "BROADCAST";

/// Stable identifier of a node for its whole lifetime (e.g. `"0-0"` in grid scenes).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        NodeId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        NodeId::new(id)
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        NodeId(id)
    }
}

/// Packet destination: a single node or every node that hears the packet.
///
/// Serialized as a plain string, with `"BROADCAST"` reserved for the sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Destination {
    Broadcast,
    Node(NodeId),
}

impl Destination {
    /// True if `node` is the addressed destination. Broadcast matches nobody:
    /// a broadcast packet is never "delivered", only flooded.
    pub fn is_node(&self, node: &NodeId) -> bool {
        matches!(self, Destination::Node(id) if id == node)
    }
}

impl From<String> for Destination {
    fn from(value: String) -> Self {
        if value == BROADCAST { Destination::Broadcast } else { Destination::Node(NodeId(value)) }
    }
}

impl From<Destination> for String {
    fn from(value: Destination) -> Self {
        match value {
            Destination::Broadcast => BROADCAST.to_string(),
            Destination::Node(id) => id.0,
        }
    }
}

impl From<NodeId> for Destination {
    fn from(id: NodeId) -> Self {
        Destination::Node(id)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Broadcast => f.write_str(BROADCAST),
            Destination::Node(id) => write!(f, "{}", id),
        }
    }
}

/// Simple 2D point in world units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }
}

/// What happened to a packet at a node. Recorded in the node's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageEvent {
    /// The node put the packet on the air (origination, beacon or retry).
    Sent,
    /// A HELLO beacon refreshed the neighbor table.
    NeighborSeen,
    /// The node was the destination.
    Delivered,
    /// A forwarded copy was produced.
    Forwarded,
    /// Hop budget exhausted; dropped.
    Expired,
    /// Stored for store-and-forward retry.
    Buffered,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeMessage {
    /// Simulation timestamp when the event was recorded.
    pub timestamp: f64,
    pub event: MessageEvent,
    pub packet_id: PacketId,
    pub kind: PacketKind,
    /// Originator of the packet (not the immediate sender).
    pub source: NodeId,
    pub destination: Destination,
    /// TTL carried by the packet as observed at this node.
    pub ttl: u32,
    /// Number of forwarding hops already recorded in the packet's path trace.
    pub hops: usize,
}

/// Error type for operations addressed to nodes of a [`Network`](super::network::Network).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// A node ID was referenced but is not part of the roster.
    NodeNotFound(NodeId),
    /// Two node specs share the same ID.
    DuplicateNode(NodeId),
    /// A construction parameter is out of range (world size, comm range, ...).
    InvalidParameter(String),
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::NodeNotFound(id) => write!(f, "node {} not found", id),
            NetworkError::DuplicateNode(id) => write!(f, "node {} is defined more than once", id),
            NetworkError::InvalidParameter(msg) => write!(f, "invalid parameter: {}", msg),
        }
    }
}

impl std::error::Error for NetworkError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_round_trips_broadcast_sentinel() {
        let d: Destination = serde_json::from_str("\"BROADCAST\"").unwrap();
        assert_eq!(d, Destination::Broadcast);
        let d: Destination = serde_json::from_str("\"3-3\"").unwrap();
        assert_eq!(d, Destination::Node(NodeId::new("3-3")));
        assert_eq!(serde_json::to_string(&Destination::Broadcast).unwrap(), "\"BROADCAST\"");
    }

    #[test]
    fn broadcast_is_never_a_node_destination() {
        let id = NodeId::new("a");
        assert!(!Destination::Broadcast.is_node(&id));
        assert!(Destination::Node(id.clone()).is_node(&id));
        assert!(!Destination::Node(NodeId::new("b")).is_node(&id));
    }

    #[test]
    fn error_display() {
        let e = NetworkError::NodeNotFound(NodeId::new("9-9"));
        assert_eq!(e.to_string(), "node 9-9 not found");
        let e: Box<dyn std::error::Error> = Box::new(NetworkError::DuplicateNode(NodeId::new("a")));
        assert!(e.to_string().contains("more than once"));
    }
}
