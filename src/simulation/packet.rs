//! Packet record exchanged between nodes.
//!
//! A packet is a value: once created it is never mutated. Forwarding produces a
//! new packet with a decremented TTL and a longer path trace, so several queued
//! delivery copies of the same origination never observe each other's hops.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::types::{Destination, NodeId};

/// Hop budget for packets created without an explicit TTL.
pub const DEFAULT_TTL: u32 = 10;

/// HELLO beacons reach direct neighbors only.
pub const HELLO_TTL: u32 = 1;

static NEXT_PACKET_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque packet identifier. Process-wide unique, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PacketId(u64);

impl PacketId {
    /// Allocate a fresh identifier.
    pub fn next() -> Self {
        PacketId(NEXT_PACKET_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PacketKind {
    Hello,
    Data,
    Ack,
    Sensing,
    Sos,
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketKind::Hello => write!(f, "HELLO"),
            PacketKind::Data => write!(f, "DATA"),
            PacketKind::Ack => write!(f, "ACK"),
            PacketKind::Sensing => write!(f, "SENSING"),
            PacketKind::Sos => write!(f, "SOS"),
        }
    }
}

/// Deduplication key: the packet id together with its originator.
pub type PacketSignature = (PacketId, NodeId);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    pub id: PacketId,
    pub kind: PacketKind,
    /// Originating node. Unchanged by forwarding.
    pub source: NodeId,
    pub destination: Destination,
    /// Remaining hop budget.
    pub ttl: u32,
    pub payload: String,
    /// Origination time in simulation seconds. Informational only.
    pub created_at: f64,
    /// Nodes that forwarded this copy, in order.
    pub path_trace: Vec<NodeId>,
}

impl Packet {
    /// Create a packet with a fresh id, the default TTL and an empty path trace.
    pub fn new(kind: PacketKind, source: NodeId, destination: impl Into<Destination>) -> Self {
        Packet {
            id: PacketId::next(),
            kind,
            source,
            destination: destination.into(),
            ttl: DEFAULT_TTL,
            payload: String::new(),
            created_at: 0.0,
            path_trace: Vec::new(),
        }
    }

    /// Single-hop neighbor discovery beacon.
    pub fn hello(source: NodeId, now: f64) -> Self {
        Packet::new(PacketKind::Hello, source, Destination::Broadcast).with_ttl(HELLO_TTL).created_at(now)
    }

    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn created_at(mut self, time: f64) -> Self {
        self.created_at = time;
        self
    }

    pub fn signature(&self) -> PacketSignature {
        (self.id, self.source.clone())
    }

    pub fn is_addressed_to(&self, node: &NodeId) -> bool {
        self.destination.is_node(node)
    }

    pub fn hop_count(&self) -> usize {
        self.path_trace.len()
    }

    /// Copy-on-forward: the copy `node` rebroadcasts.
    ///
    /// Returns `None` when the hop budget is exhausted. The returned packet
    /// keeps the id and source (so downstream deduplication still matches),
    /// carries `ttl - 1`, and has `node` appended to its path trace. `self`
    /// is left untouched.
    pub fn forwarded_by(&self, node: &NodeId) -> Option<Packet> {
        if self.ttl == 0 {
            return None;
        }
        let mut copy = self.clone();
        copy.ttl -= 1;
        copy.path_trace.push(node.clone());
        Some(copy)
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Packet {} ({}) Src:{} -> Dst:{} TTL:{}>", self.id, self.kind, self.source, self.destination, self.ttl)
    }
}

/// Driver-facing description of a packet to originate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketSpec {
    pub kind: PacketKind,
    pub destination: Destination,
    /// Falls back to the configured default TTL.
    #[serde(default)]
    pub ttl: Option<u32>,
    #[serde(default)]
    pub payload: String,
}

impl PacketSpec {
    pub fn new(kind: PacketKind, destination: impl Into<Destination>) -> Self {
        PacketSpec {
            kind,
            destination: destination.into(),
            ttl: None,
            payload: String::new(),
        }
    }

    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Materialize as a fresh packet from `source` at time `now`.
    pub fn build(&self, source: NodeId, now: f64, default_ttl: u32) -> Packet {
        Packet::new(self.kind, source, self.destination.clone())
            .with_ttl(self.ttl.unwrap_or(default_ttl))
            .with_payload(self.payload.clone())
            .created_at(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_ids_are_unique() {
        let a = Packet::new(PacketKind::Data, NodeId::new("a"), Destination::Broadcast);
        let b = Packet::new(PacketKind::Data, NodeId::new("a"), Destination::Broadcast);
        assert_ne!(a.id, b.id);
        assert_eq!(a.ttl, DEFAULT_TTL);
        assert!(a.path_trace.is_empty());
    }

    #[test]
    fn forward_copy_leaves_original_untouched() {
        let original = Packet::new(PacketKind::Sos, NodeId::new("0-0"), NodeId::new("3-3")).with_ttl(4);
        let relay = NodeId::new("0-1");

        let copy = original.forwarded_by(&relay).unwrap();

        assert_eq!(copy.ttl, 3);
        assert_eq!(copy.path_trace, vec![relay]);
        assert_eq!(copy.signature(), original.signature());
        assert_eq!(original.ttl, 4);
        assert!(original.path_trace.is_empty());
    }

    #[test]
    fn fan_out_copies_do_not_share_state() {
        let original = Packet::new(PacketKind::Data, NodeId::new("s"), Destination::Broadcast).with_ttl(5);
        let a = original.forwarded_by(&NodeId::new("a")).unwrap();
        let b = original.forwarded_by(&NodeId::new("b")).unwrap();
        let aa = a.forwarded_by(&NodeId::new("c")).unwrap();

        assert_eq!(a.path_trace, vec![NodeId::new("a")]);
        assert_eq!(b.path_trace, vec![NodeId::new("b")]);
        assert_eq!(aa.ttl, 3);
        assert_eq!(a.ttl, 4);
        assert_eq!(b.ttl, 4);
    }

    #[test]
    fn zero_ttl_is_accepted_but_never_forwarded() {
        let p = Packet::new(PacketKind::Data, NodeId::new("s"), Destination::Broadcast).with_ttl(0);
        assert!(p.forwarded_by(&NodeId::new("r")).is_none());
    }

    #[test]
    fn hello_is_single_hop_broadcast() {
        let p = Packet::hello(NodeId::new("n"), 1.5);
        assert_eq!(p.kind, PacketKind::Hello);
        assert_eq!(p.ttl, HELLO_TTL);
        assert_eq!(p.destination, Destination::Broadcast);
        assert_eq!(p.created_at, 1.5);
    }

    #[test]
    fn spec_builds_with_default_ttl() {
        let spec = PacketSpec::new(PacketKind::Sos, NodeId::new("3-3")).with_payload("HELP");
        let p = spec.build(NodeId::new("0-0"), 2.0, 7);
        assert_eq!(p.ttl, 7);
        assert_eq!(p.payload, "HELP");
        assert!(p.is_addressed_to(&NodeId::new("3-3")));

        let p = spec.clone().with_ttl(15).build(NodeId::new("0-0"), 2.0, 7);
        assert_eq!(p.ttl, 15);
    }

    #[test]
    fn spec_deserializes_from_json() {
        let spec: PacketSpec = serde_json::from_str(r#"{"kind":"SOS","destination":"3-3","ttl":10,"payload":"HELP"}"#).unwrap();
        assert_eq!(spec.kind, PacketKind::Sos);
        assert_eq!(spec.ttl, Some(10));
        assert_eq!(spec.destination, Destination::Node(NodeId::new("3-3")));
    }
}
