//! Delivery engine driving the time-stepped simulation.
//!
//! High-level flow of each [`Network::tick`]:
//! 1) Advance the clock by `time_step`.
//! 2) Let every active node `step`; every packet it emits is copied once per
//!    node currently in range of the emitter and queued for delivery.
//! 3) Drain the delivery queue, handing each copy to its target's `receive`.
//!    A forwarded copy is broadcast from the forwarding node's position and
//!    its deliveries join the queue: drained in the same pass in
//!    [`PropagationMode::SameTick`], left for the next tick in
//!    [`PropagationMode::NextTick`].
//!
//! Range membership is decided when a copy is queued and is not rechecked when
//! it is dequeued; only the target's `active` flag is.

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

use crate::common::config::{PropagationMode, SimulationConfig};

use super::geometry::{in_range, random_point};
use super::node::{Node, ReceiveOutcome};
use super::packet::{Packet, PacketId, PacketSpec};
use super::types::{NetworkError, NodeId, Point};

/// Construction-time description of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub node_id: NodeId,
    /// Random uniform placement inside the world when absent.
    #[serde(default)]
    pub position: Option<Point>,
    /// Falls back to `default-comm-range` when absent.
    #[serde(default)]
    pub comm_range: Option<f64>,
}

impl NodeSpec {
    pub fn new(node_id: impl Into<NodeId>) -> Self {
        NodeSpec {
            node_id: node_id.into(),
            position: None,
            comm_range: None,
        }
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Some(Point::new(x, y));
        self
    }

    pub fn with_range(mut self, comm_range: f64) -> Self {
        self.comm_range = Some(comm_range);
        self
    }
}

/// One copy of a packet in flight towards one target.
#[derive(Debug, Clone)]
struct PendingDelivery {
    packet: Packet,
    /// Immediate sender (not necessarily the packet's source).
    sender: NodeId,
    /// Index into `Network::nodes`.
    target: usize,
}

/// Global counters, cumulative since construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NetworkStats {
    /// Broadcasts: beacons, originations, retries and forwards.
    pub transmissions: u64,
    /// Copies handed to an active node's `receive`.
    pub receptions: u64,
    /// Copies dropped by deduplication.
    pub duplicates: u64,
    /// Copies that reached their destination node.
    pub delivered: u64,
    /// Copies dropped with no hop budget left.
    pub expired: u64,
    /// Copies whose target failed between enqueue and dequeue.
    pub skipped_inactive: u64,
}

/// Observation record for drivers and diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeStatus {
    pub node_id: NodeId,
    pub position: Point,
    pub comm_range: f64,
    pub active: bool,
    pub neighbor_count: usize,
    pub seen_count: usize,
    pub outbound_len: usize,
    pub delivered_count: usize,
}

impl From<&Node> for NodeStatus {
    fn from(node: &Node) -> Self {
        NodeStatus {
            node_id: node.id().clone(),
            position: *node.position(),
            comm_range: node.comm_range(),
            active: node.is_active(),
            neighbor_count: node.neighbor_count(),
            seen_count: node.seen_count(),
            outbound_len: node.outbound_len(),
            delivered_count: node.delivered().len(),
        }
    }
}

/// The network environment: owns every node, the clock and the delivery queue.
pub struct Network {
    config: SimulationConfig,
    width: f64,
    height: f64,
    /// Fixed roster in construction order; iteration order is deterministic.
    nodes: Vec<Node>,
    index: HashMap<NodeId, usize>,
    time: f64,
    pending: VecDeque<PendingDelivery>,
    stats: NetworkStats,
}

impl Network {
    /// Build an environment of `width x height` world units.
    ///
    /// Nodes without a position are placed uniformly at random (seeded from
    /// `config.seed` when set). Nodes without a range use
    /// `config.default_comm_range`.
    ///
    /// # Errors
    ///
    /// * `InvalidParameter` for a non-positive world size, range or an
    ///   invalid config
    /// * `DuplicateNode` when two specs share an id
    pub fn new(config: SimulationConfig, width: f64, height: f64, specs: Vec<NodeSpec>) -> Result<Self, NetworkError> {
        config.validate().map_err(NetworkError::InvalidParameter)?;
        if !(width.is_finite() && width > 0.0 && height.is_finite() && height > 0.0) {
            return Err(NetworkError::InvalidParameter(format!("world size {}x{} must be positive", width, height)));
        }

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut nodes = Vec::with_capacity(specs.len());
        let mut index = HashMap::with_capacity(specs.len());
        for spec in specs {
            if index.contains_key(&spec.node_id) {
                return Err(NetworkError::DuplicateNode(spec.node_id));
            }
            let comm_range = spec.comm_range.unwrap_or(config.default_comm_range);
            if !(comm_range.is_finite() && comm_range > 0.0) {
                return Err(NetworkError::InvalidParameter(format!(
                    "node {} comm_range {} must be positive",
                    spec.node_id, comm_range
                )));
            }
            let position = spec.position.unwrap_or_else(|| random_point(&mut rng, width, height));

            index.insert(spec.node_id.clone(), nodes.len());
            nodes.push(Node::new(spec.node_id, position, comm_range, &config));
        }

        log::info!("Network created: {} node(s) in {}x{}, {:?} propagation", nodes.len(), width, height, config.propagation);

        Ok(Network {
            config,
            width,
            height,
            nodes,
            index,
            time: 0.0,
            pending: VecDeque::new(),
            stats: NetworkStats::default(),
        })
    }

    /// `count` randomly placed nodes with ids `"0"`, `"1"`, ...
    pub fn with_random_nodes(config: SimulationConfig, width: f64, height: f64, count: usize) -> Result<Self, NetworkError> {
        let specs = (0..count).map(|i| NodeSpec::new(NodeId::new(i.to_string()))).collect();
        Self::new(config, width, height, specs)
    }

    /// Advance the simulation by one `time_step`.
    pub fn tick(&mut self) {
        self.time += self.config.time_step;
        let now = self.time;

        for sender in 0..self.nodes.len() {
            if !self.nodes[sender].is_active() {
                continue;
            }
            for packet in self.nodes[sender].step(now) {
                self.broadcast_from(sender, packet);
            }
        }

        match self.config.propagation {
            PropagationMode::SameTick => {
                // Forwards land at the back of the same queue and are drained too.
                while let Some(delivery) = self.pending.pop_front() {
                    self.deliver(delivery, now);
                }
            }
            PropagationMode::NextTick => {
                let current = std::mem::take(&mut self.pending);
                for delivery in current {
                    self.deliver(delivery, now);
                }
            }
        }

        log::trace!("T={:.2} tick done, {} delivery(ies) pending", now, self.pending.len());
    }

    /// Deactivate a node. It stays in the roster and remains inspectable.
    pub fn inject_failure(&mut self, node_id: &NodeId) -> Result<(), NetworkError> {
        let idx = self.index_of(node_id)?;
        self.nodes[idx].deactivate();
        log::info!("T={:.2} node {} FAILED", self.time, node_id);
        Ok(())
    }

    /// Bring a failed node back. Its tables are kept as they were.
    pub fn recover(&mut self, node_id: &NodeId) -> Result<(), NetworkError> {
        let idx = self.index_of(node_id)?;
        self.nodes[idx].reactivate();
        log::info!("T={:.2} node {} recovered", self.time, node_id);
        Ok(())
    }

    /// Create a packet at `source` and put it on the air immediately.
    ///
    /// The copies are queued for the source's current in-range neighbors and
    /// are resolved by the next [`tick`](Self::tick). If nobody is in range,
    /// or the source itself has failed, the packet goes to the source's
    /// store-and-forward buffer instead.
    ///
    /// # Returns
    ///
    /// The id of the new packet, or `NodeNotFound` for an unknown source.
    pub fn originate(&mut self, spec: &PacketSpec, source: &NodeId) -> Result<PacketId, NetworkError> {
        let idx = self.index_of(source)?;
        let now = self.time;
        let packet = spec.build(source.clone(), now, self.config.default_ttl);
        let packet_id = packet.id;

        self.nodes[idx].originate(&packet, now);

        let reachable = self.nodes[idx].is_active() && !self.find_target_nodes(idx).is_empty();
        if reachable {
            log::info!("T={:.2} {} originates {}", now, source, packet);
            self.nodes[idx].record_sent(&packet, now);
            self.broadcast_from(idx, packet);
        } else {
            log::info!("T={:.2} {} has no reachable neighbor, buffering {}", now, source, packet);
            self.nodes[idx].enqueue_outbound(packet, now);
        }

        Ok(packet_id)
    }

    /// Active nodes currently within `node_id`'s range, in roster order.
    pub fn neighbors_of(&self, node_id: &NodeId) -> Result<Vec<NodeId>, NetworkError> {
        let idx = self.index_of(node_id)?;
        Ok(self.find_target_nodes(idx).into_iter().map(|i| self.nodes[i].id().clone()).collect())
    }

    pub fn node(&self, node_id: &NodeId) -> Result<&Node, NetworkError> {
        let idx = self.index_of(node_id)?;
        Ok(&self.nodes[idx])
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// Copies queued but not yet handed to their target.
    pub fn pending_deliveries(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn dimensions(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    pub fn snapshot(&self) -> Vec<NodeStatus> {
        self.nodes.iter().map(NodeStatus::from).collect()
    }

    fn index_of(&self, node_id: &NodeId) -> Result<usize, NetworkError> {
        self.index.get(node_id).copied().ok_or_else(|| NetworkError::NodeNotFound(node_id.clone()))
    }

    /// Find every active node within the sender's range.
    ///
    /// Uses the sender's own `comm_range` only, so links are one-directional
    /// when ranges differ. Evaluated fresh on every call: failures change the
    /// active set between ticks.
    ///
    /// # Returns
    ///
    /// Indices into `self.nodes`, excluding the sender.
    fn find_target_nodes(&self, sender: usize) -> Vec<usize> {
        let origin = &self.nodes[sender];
        self.nodes
            .iter()
            .enumerate()
            .filter(|(i, other)| *i != sender && other.is_active() && in_range(origin.position(), other.position(), origin.comm_range()))
            .map(|(i, _)| i)
            .collect()
    }

    /// Queue one copy of `packet` per node in range of `sender`.
    fn broadcast_from(&mut self, sender: usize, packet: Packet) {
        let targets = self.find_target_nodes(sender);
        self.stats.transmissions += 1;
        log::trace!("{} -> {} target(s): {}", self.nodes[sender].id(), targets.len(), packet);

        let sender_id = self.nodes[sender].id().clone();
        for target in targets {
            self.pending.push_back(PendingDelivery {
                packet: packet.clone(),
                sender: sender_id.clone(),
                target,
            });
        }
    }

    /// Hand one copy to its target and route whatever comes back.
    fn deliver(&mut self, delivery: PendingDelivery, now: f64) {
        let PendingDelivery { packet, sender, target } = delivery;

        if !self.nodes[target].is_active() {
            self.stats.skipped_inactive += 1;
            return;
        }
        self.stats.receptions += 1;

        match self.nodes[target].receive(&packet, now) {
            ReceiveOutcome::Forward(copy) => {
                log::debug!("T={:.2} {} forwards {} (heard from {})", now, self.nodes[target].id(), copy, sender);
                self.broadcast_from(target, copy);
            }
            ReceiveOutcome::Delivered => self.stats.delivered += 1,
            ReceiveOutcome::Duplicate => self.stats.duplicates += 1,
            ReceiveOutcome::Expired => self.stats.expired += 1,
            ReceiveOutcome::NeighborSeen | ReceiveOutcome::Inactive => {}
        }
    }
}
