//! Scenario driver: timed events applied to a running [`Network`].
//!
//! Contains:
//! - `ScenarioAction`, the things a scene can make happen (originate, fail, recover)
//! - `EventSchedule`, an ordered queue of actions keyed by simulation time
//! - The built-in disaster scene (4x4 grid with a mid-run double failure)
//! - `run`, the headless tick loop

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::common::config::SimulationConfig;
use crate::simulation::network::{Network, NodeSpec};
use crate::simulation::packet::{PacketKind, PacketSpec};
use crate::simulation::types::{NetworkError, NodeId};

/// Slack when comparing accumulated clock values against event times, so an
/// event at `1.0` fires on the tick whose clock reads `0.9999999999999999`.
pub const TIME_EPSILON: f64 = 1e-9;

/// Default length of a headless run, in simulated seconds.
pub const DEFAULT_DURATION: f64 = 15.0;

/// One thing a scene can make happen. Tagged by `"type"` in scene files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioAction {
    Originate { source: NodeId, packet: PacketSpec },
    Failure { node_id: NodeId },
    Recover { node_id: NodeId },
}

impl ScenarioAction {
    /// Run the action against `network` at its current time.
    pub fn apply(&self, network: &mut Network) -> Result<(), NetworkError> {
        match self {
            ScenarioAction::Originate { source, packet } => {
                let id = network.originate(packet, source)?;
                log::info!("[EVENT] T={:.1}s: {} {} sent from {} to {}", network.time(), packet.kind, id, source, packet.destination);
            }
            ScenarioAction::Failure { node_id } => {
                network.inject_failure(node_id)?;
                log::info!("[EVENT] T={:.1}s: node {} destroyed", network.time(), node_id);
            }
            ScenarioAction::Recover { node_id } => {
                network.recover(node_id)?;
                log::info!("[EVENT] T={:.1}s: node {} back online", network.time(), node_id);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledEvent {
    /// Simulation time at which the action fires.
    #[serde(rename = "time")]
    pub at: f64,
    pub action: ScenarioAction,
}

impl ScheduledEvent {
    pub fn new(at: f64, action: ScenarioAction) -> Self {
        ScheduledEvent { at, action }
    }
}

/// Events ordered by trigger time. Events sharing a time keep insertion order.
#[derive(Debug, Clone, Default)]
pub struct EventSchedule {
    events: VecDeque<ScheduledEvent>,
}

impl EventSchedule {
    pub fn new(mut events: Vec<ScheduledEvent>) -> Self {
        // sort_by is stable
        events.sort_by(|a, b| a.at.total_cmp(&b.at));
        EventSchedule { events: events.into() }
    }

    pub fn push(&mut self, event: ScheduledEvent) {
        let pos = self.events.partition_point(|e| e.at <= event.at);
        self.events.insert(pos, event);
    }

    /// Remove and return every event whose time has been reached at `now`.
    pub fn poll_due(&mut self, now: f64) -> Vec<ScheduledEvent> {
        let mut due = Vec::new();
        while self.events.front().is_some_and(|e| e.at <= now + TIME_EPSILON) {
            if let Some(event) = self.events.pop_front() {
                due.push(event);
            }
        }
        due
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Outcome of a [`run`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub ticks: u64,
    pub end_time: f64,
    pub events_applied: usize,
    /// Events that referenced an unknown node; logged and skipped.
    pub events_failed: usize,
}

/// Tick `network` until `duration` simulated seconds have passed.
///
/// The schedule is polled after every tick, so an event fires on the first
/// tick whose clock has reached its time. A failing event is logged and the
/// run continues.
pub fn run(network: &mut Network, schedule: &mut EventSchedule, duration: f64) -> RunReport {
    let ticks = (duration / network.config().time_step).round().max(0.0) as u64;
    let mut report = RunReport::default();

    log::info!("Running {} tick(s), {} scheduled event(s)", ticks, schedule.len());

    for _ in 0..ticks {
        network.tick();
        report.ticks += 1;

        for event in schedule.poll_due(network.time()) {
            match event.action.apply(network) {
                Ok(()) => report.events_applied += 1,
                Err(e) => {
                    log::warn!("T={:.2} event scheduled at {:.2} skipped: {}", network.time(), event.at, e);
                    report.events_failed += 1;
                }
            }
        }
    }

    report.end_time = network.time();
    log::info!(
        "Run finished at T={:.2}: {} event(s) applied, {} failed, {} left unscheduled",
        report.end_time,
        report.events_applied,
        report.events_failed,
        schedule.len()
    );
    report
}

/// `rows x cols` grid of nodes with ids `"r-c"`.
///
/// Cells are spaced `width / (cols + 1)` by `height / (rows + 1)`, starting one
/// spacing in from the origin, and each position is shaken by up to `jitter`
/// units on both axes. The jitter is reproducible when `seed` is set.
pub fn disaster_grid(rows: usize, cols: usize, width: f64, height: f64, comm_range: f64, jitter: f64, seed: Option<u64>) -> Vec<NodeSpec> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let spacing_x = width / (cols + 1) as f64;
    let spacing_y = height / (rows + 1) as f64;

    let mut specs = Vec::with_capacity(rows * cols);
    for r in 0..rows {
        for c in 0..cols {
            let (mut dx, mut dy) = (0.0, 0.0);
            if jitter > 0.0 {
                dx = rng.gen_range(-jitter..=jitter);
                dy = rng.gen_range(-jitter..=jitter);
            }
            let x = ((c + 1) as f64 * spacing_x + dx).clamp(0.0, width);
            let y = ((r + 1) as f64 * spacing_y + dy).clamp(0.0, height);
            specs.push(NodeSpec::new(format!("{}-{}", r, c)).at(x, y).with_range(comm_range));
        }
    }
    specs
}

/// SOS from the corner, then the two central relays die, then a retry.
pub fn disaster_script() -> EventSchedule {
    let sos = |payload: &str, ttl: u32| ScenarioAction::Originate {
        source: NodeId::new("0-0"),
        packet: PacketSpec::new(PacketKind::Sos, NodeId::new("3-3")).with_ttl(ttl).with_payload(payload),
    };

    EventSchedule::new(vec![
        ScheduledEvent::new(1.0, sos("HELP! FLOOD RISING", 10)),
        ScheduledEvent::new(5.0, ScenarioAction::Failure { node_id: NodeId::new("1-1") }),
        ScheduledEvent::new(5.0, ScenarioAction::Failure { node_id: NodeId::new("2-2") }),
        ScheduledEvent::new(8.0, sos("STILL HERE, NEED RESCUE", 15)),
    ])
}

/// The built-in 800x800 disaster scene: 4x4 grid, range 250, jitter 20.
pub fn disaster_network(config: SimulationConfig) -> Result<Network, NetworkError> {
    let specs = disaster_grid(4, 4, 800.0, 800.0, 250.0, 20.0, config.seed);
    Network::new(config, 800.0, 800.0, specs)
}
