//! Per-node protocol state machine.
//!
//! Each node:
//! - Beacons a HELLO at most once per `hello_interval` and keeps a neighbor
//!   table refreshed by the HELLOs it hears, pruned after `neighbor_timeout`
//! - Deduplicates every received packet on `(packet id, source)`
//! - Floods packets it is not the destination of, once, with TTL - 1
//! - Retries buffered packets (store-and-forward) whenever it knows a neighbor
//!
//! Nodes never talk to each other directly: the [`Network`](super::network::Network)
//! calls [`Node::step`] and [`Node::receive`] and routes whatever they return.

use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::common::config::SimulationConfig;

use super::packet::{Packet, PacketKind, PacketSignature};
use super::types::{MessageEvent, NODE_MESSAGES_CAPACITY, NodeId, NodeMessage, Point};

/// Result of handing one delivered copy to a node.
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiveOutcome {
    /// The node has failed; the copy was not processed.
    Inactive,
    /// Signature already processed; dropped without side effects.
    Duplicate,
    /// A HELLO refreshed the neighbor table. HELLOs are never forwarded.
    NeighborSeen,
    /// The node is the destination. Nothing is sent back.
    Delivered,
    /// The copy this node rebroadcasts.
    Forward(Packet),
    /// Not for this node and no hop budget left.
    Expired,
}

impl ReceiveOutcome {
    /// The forwarded copy, if the node produced one.
    pub fn into_forward(self) -> Option<Packet> {
        match self {
            ReceiveOutcome::Forward(packet) => Some(packet),
            _ => None,
        }
    }
}

/// Radio node with a fixed position and range.
///
/// Failure is modeled as `active == false`; a failed node keeps its identity,
/// position and tables so it stays inspectable.
#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    position: Point,
    comm_range: f64,
    active: bool,
    /// neighbor id -> time its last HELLO was received.
    neighbors: BTreeMap<NodeId, f64>,
    /// signature -> time it was first processed.
    seen_packets: HashMap<PacketSignature, f64>,
    outbound: VecDeque<Packet>,
    last_hello_at: f64,
    hello_interval: f64,
    neighbor_timeout: f64,
    seen_retention: Option<f64>,
    history: VecDeque<NodeMessage>,
    delivered: Vec<Packet>,
}

impl Node {
    pub fn new(id: NodeId, position: Point, comm_range: f64, config: &SimulationConfig) -> Self {
        Node {
            id,
            position,
            comm_range,
            active: true,
            neighbors: BTreeMap::new(),
            seen_packets: HashMap::new(),
            outbound: VecDeque::new(),
            last_hello_at: 0.0,
            hello_interval: config.hello_interval,
            neighbor_timeout: config.neighbor_timeout,
            seen_retention: config.seen_retention,
            history: VecDeque::with_capacity(NODE_MESSAGES_CAPACITY.min(64)),
            delivered: Vec::new(),
        }
    }

    /// Periodic work for one tick: beacon, prune, retry one buffered packet.
    ///
    /// Returns every packet the node puts on the air this tick. An inactive
    /// node does nothing.
    pub fn step(&mut self, now: f64) -> Vec<Packet> {
        if !self.active {
            return Vec::new();
        }

        let mut outgoing = Vec::new();

        if now - self.last_hello_at > self.hello_interval {
            self.last_hello_at = now;
            let hello = Packet::hello(self.id.clone(), now);
            log::trace!("[{}] HELLO {} at {:.2}", self.id, hello.id, now);
            self.record(now, MessageEvent::Sent, &hello);
            outgoing.push(hello);
        }

        let timeout = self.neighbor_timeout;
        let before = self.neighbors.len();
        self.neighbors.retain(|_, last_seen| now - *last_seen <= timeout);
        if self.neighbors.len() != before {
            log::debug!("[{}] pruned {} stale neighbor(s)", self.id, before - self.neighbors.len());
        }

        if let Some(retention) = self.seen_retention {
            self.seen_packets.retain(|_, first_seen| now - *first_seen <= retention);
        }

        // Store-and-forward: retry only while someone is listening.
        if !self.neighbors.is_empty() {
            if let Some(packet) = self.outbound.pop_front() {
                if packet.ttl > 0 {
                    log::debug!("[{}] retrying buffered {}", self.id, packet);
                    self.record(now, MessageEvent::Sent, &packet);
                    outgoing.push(packet);
                } else {
                    self.record(now, MessageEvent::Expired, &packet);
                }
            }
        }

        outgoing
    }

    /// Handle one delivered copy.
    ///
    /// Order matters: dedup first (so a repeat has no effect at all), then
    /// HELLO bookkeeping, then delivery, then flooding.
    pub fn receive(&mut self, packet: &Packet, now: f64) -> ReceiveOutcome {
        if !self.active {
            return ReceiveOutcome::Inactive;
        }

        let signature = packet.signature();
        if self.seen_packets.contains_key(&signature) {
            return ReceiveOutcome::Duplicate;
        }
        self.seen_packets.insert(signature, now);

        if packet.kind == PacketKind::Hello {
            self.neighbors.insert(packet.source.clone(), now);
            self.record(now, MessageEvent::NeighborSeen, packet);
            return ReceiveOutcome::NeighborSeen;
        }

        log::debug!("[{}] received {} from {}", self.id, packet.kind, packet.source);

        if packet.is_addressed_to(&self.id) {
            log::info!(
                "[{}] DELIVERED {} {} from {} after {} hop(s)",
                self.id,
                packet.kind,
                packet.id,
                packet.source,
                packet.hop_count()
            );
            self.record(now, MessageEvent::Delivered, packet);
            self.delivered.push(packet.clone());
            return ReceiveOutcome::Delivered;
        }

        match packet.forwarded_by(&self.id) {
            Some(copy) => {
                self.record(now, MessageEvent::Forwarded, &copy);
                ReceiveOutcome::Forward(copy)
            }
            None => {
                self.record(now, MessageEvent::Expired, packet);
                ReceiveOutcome::Expired
            }
        }
    }

    /// Mark a packet this node creates as already processed, so echoes from
    /// neighbors are dropped instead of re-flooded by the origin.
    pub fn originate(&mut self, packet: &Packet, now: f64) {
        self.seen_packets.insert(packet.signature(), now);
    }

    /// Note a transmission the engine made on this node's behalf.
    pub(crate) fn record_sent(&mut self, packet: &Packet, now: f64) {
        self.record(now, MessageEvent::Sent, packet);
    }

    /// Append to the store-and-forward buffer (FIFO).
    pub fn enqueue_outbound(&mut self, packet: Packet, now: f64) {
        self.record(now, MessageEvent::Buffered, &packet);
        self.outbound.push_back(packet);
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }

    pub fn reactivate(&mut self) {
        self.active = true;
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn position(&self) -> &Point {
        &self.position
    }

    pub fn comm_range(&self) -> f64 {
        self.comm_range
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Neighbor table entries: id and last time a HELLO was heard from it.
    pub fn neighbors(&self) -> impl Iterator<Item = (&NodeId, f64)> {
        self.neighbors.iter().map(|(id, seen)| (id, *seen))
    }

    pub fn knows_neighbor(&self, id: &NodeId) -> bool {
        self.neighbors.contains_key(id)
    }

    pub fn neighbor_count(&self) -> usize {
        self.neighbors.len()
    }

    pub fn seen_count(&self) -> usize {
        self.seen_packets.len()
    }

    pub fn has_seen(&self, signature: &PacketSignature) -> bool {
        self.seen_packets.contains_key(signature)
    }

    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    pub fn history(&self) -> &VecDeque<NodeMessage> {
        &self.history
    }

    /// Packets for which this node was the destination, in arrival order.
    pub fn delivered(&self) -> &[Packet] {
        &self.delivered
    }

    /// Push an event into this node's bounded history, popping the oldest if
    /// at capacity.
    fn record(&mut self, now: f64, event: MessageEvent, packet: &Packet) {
        if self.history.len() >= NODE_MESSAGES_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(NodeMessage {
            timestamp: now,
            event,
            packet_id: packet.id,
            kind: packet.kind,
            source: packet.source.clone(),
            destination: packet.destination.clone(),
            ttl: packet.ttl,
            hops: packet.hop_count(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::types::Destination;

    fn node(id: &str) -> Node {
        Node::new(NodeId::new(id), Point::new(0.0, 0.0), 100.0, &SimulationConfig::default())
    }

    fn data(source: &str, dest: impl Into<Destination>, ttl: u32) -> Packet {
        Packet::new(PacketKind::Data, NodeId::new(source), dest).with_ttl(ttl)
    }

    #[test]
    fn duplicate_delivery_has_no_effect() {
        let mut n = node("n");
        let p = data("s", Destination::Broadcast, 5);

        let first = n.receive(&p, 1.0);
        assert!(matches!(first, ReceiveOutcome::Forward(_)));
        let seen = n.seen_count();
        let history = n.history().len();

        assert_eq!(n.receive(&p, 1.1), ReceiveOutcome::Duplicate);
        assert_eq!(n.seen_count(), seen);
        assert_eq!(n.history().len(), history);
    }

    #[test]
    fn duplicate_hello_does_not_refresh_neighbor() {
        let mut n = node("n");
        let hello = Packet::hello(NodeId::new("a"), 1.0);

        assert_eq!(n.receive(&hello, 1.0), ReceiveOutcome::NeighborSeen);
        assert_eq!(n.receive(&hello, 2.0), ReceiveOutcome::Duplicate);
        let seen: Vec<_> = n.neighbors().collect();
        assert_eq!(seen, vec![(&NodeId::new("a"), 1.0)]);
    }

    #[test]
    fn forwarded_copy_has_one_less_ttl_and_longer_trace() {
        let mut n = node("relay");
        let p = data("s", NodeId::new("d"), 3);

        let copy = n.receive(&p, 0.5).into_forward().unwrap();

        assert_eq!(copy.ttl, 2);
        assert_eq!(copy.path_trace, vec![NodeId::new("relay")]);
        assert_eq!(copy.id, p.id);
        assert_eq!(p.ttl, 3);
        assert!(p.path_trace.is_empty());
    }

    #[test]
    fn zero_ttl_is_not_forwarded() {
        let mut n = node("relay");
        let p = data("s", NodeId::new("d"), 0);
        assert_eq!(n.receive(&p, 0.5), ReceiveOutcome::Expired);
        assert_eq!(n.history().back().map(|m| m.event), Some(MessageEvent::Expired));
    }

    #[test]
    fn zero_ttl_still_reaches_its_destination() {
        let mut n = node("d");
        let p = data("s", NodeId::new("d"), 0);
        assert_eq!(n.receive(&p, 0.5), ReceiveOutcome::Delivered);
        assert_eq!(n.delivered().len(), 1);
    }

    #[test]
    fn destination_consumes_packet() {
        let mut n = node("3-3");
        let p = Packet::new(PacketKind::Sos, NodeId::new("0-0"), NodeId::new("3-3")).with_payload("HELP");

        assert_eq!(n.receive(&p, 2.0), ReceiveOutcome::Delivered);
        assert_eq!(n.delivered()[0].id, p.id);
        assert_eq!(n.delivered()[0].payload, "HELP");
    }

    #[test]
    fn hello_is_never_forwarded() {
        let mut n = node("n");
        let hello = Packet::hello(NodeId::new("a"), 1.0);
        assert_eq!(n.receive(&hello, 1.0), ReceiveOutcome::NeighborSeen);
        assert!(n.knows_neighbor(&NodeId::new("a")));
        assert!(n.history().iter().all(|m| m.event != MessageEvent::Forwarded));
    }

    #[test]
    fn hello_is_rate_limited() {
        let mut n = node("n");
        let mut hellos = 0;
        let mut now = 0.0;
        for _ in 0..50 {
            now += 0.1;
            hellos += n.step(now).iter().filter(|p| p.kind == PacketKind::Hello).count();
        }
        // 5 seconds with a 1 second interval: strictly-greater comparison gives a
        // beacon roughly every 1.1 s.
        assert!((4..=5).contains(&hellos), "unexpected HELLO count {}", hellos);
    }

    #[test]
    fn stale_neighbors_are_pruned() {
        let mut n = node("n");
        n.receive(&Packet::hello(NodeId::new("a"), 0.5), 0.5);
        n.receive(&Packet::hello(NodeId::new("b"), 2.0), 2.0);

        n.step(3.5);
        assert_eq!(n.neighbor_count(), 2);

        n.step(3.6);
        assert!(!n.knows_neighbor(&NodeId::new("a")));
        assert!(n.knows_neighbor(&NodeId::new("b")));
    }

    #[test]
    fn buffered_packet_waits_for_a_neighbor() {
        let mut n = node("n");
        let p = data("n", NodeId::new("far"), 5);
        n.enqueue_outbound(p.clone(), 0.0);

        let out = n.step(0.1);
        assert!(out.iter().all(|q| q.id != p.id));
        assert_eq!(n.outbound_len(), 1);

        n.receive(&Packet::hello(NodeId::new("a"), 0.15), 0.15);
        let out = n.step(0.2);
        assert_eq!(out.iter().filter(|q| q.id == p.id).count(), 1);
        assert_eq!(n.outbound_len(), 0);
    }

    #[test]
    fn buffer_drains_one_packet_per_step_in_fifo_order() {
        let mut n = node("n");
        let first = data("n", Destination::Broadcast, 2);
        let second = data("n", Destination::Broadcast, 2);
        n.enqueue_outbound(first.clone(), 0.0);
        n.enqueue_outbound(second.clone(), 0.0);
        n.receive(&Packet::hello(NodeId::new("a"), 0.05), 0.05);

        let out: Vec<_> = n.step(0.1).into_iter().filter(|p| p.kind != PacketKind::Hello).collect();
        assert_eq!(out, vec![first]);
        let out: Vec<_> = n.step(0.2).into_iter().filter(|p| p.kind != PacketKind::Hello).collect();
        assert_eq!(out, vec![second]);
    }

    #[test]
    fn expired_buffered_packet_is_discarded() {
        let mut n = node("n");
        n.enqueue_outbound(data("n", Destination::Broadcast, 0), 0.0);
        n.receive(&Packet::hello(NodeId::new("a"), 0.05), 0.05);

        let out = n.step(0.1);
        assert!(out.iter().all(|p| p.kind == PacketKind::Hello));
        assert_eq!(n.outbound_len(), 0);
    }

    #[test]
    fn inactive_node_is_silent() {
        let mut n = node("n");
        n.deactivate();
        assert!(n.step(5.0).is_empty());
        assert_eq!(n.receive(&data("s", Destination::Broadcast, 3), 5.0), ReceiveOutcome::Inactive);
        assert_eq!(n.seen_count(), 0);

        n.reactivate();
        assert!(!n.step(6.0).is_empty());
    }

    #[test]
    fn originated_packet_is_not_reflooded_by_origin() {
        let mut n = node("s");
        let p = data("s", NodeId::new("d"), 5);
        n.originate(&p, 1.0);

        let echo = p.forwarded_by(&NodeId::new("a")).unwrap();
        assert_eq!(n.receive(&echo, 1.0), ReceiveOutcome::Duplicate);
    }

    #[test]
    fn seen_signatures_expire_with_retention() {
        let config = SimulationConfig {
            seen_retention: Some(2.0),
            ..SimulationConfig::default()
        };
        let mut n = Node::new(NodeId::new("n"), Point::new(0.0, 0.0), 10.0, &config);
        let p = data("s", Destination::Broadcast, 3);
        n.receive(&p, 1.0);

        n.step(2.5);
        assert!(n.has_seen(&p.signature()));
        n.step(3.5);
        assert!(!n.has_seen(&p.signature()));
    }

    #[test]
    fn history_is_bounded() {
        let mut n = node("n");
        for i in 0..(NODE_MESSAGES_CAPACITY + 10) {
            n.receive(&data("s", Destination::Broadcast, 1), i as f64);
        }
        assert_eq!(n.history().len(), NODE_MESSAGES_CAPACITY);
    }
}
