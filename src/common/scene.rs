//! Scene loading, parsing, and validation logic.
//!
//! A scene is a JSON file describing the world rectangle, the node roster and
//! the timed events of one run:
//!
//! ```json
//! {
//!   "width": 800, "height": 800,
//!   "nodes": [{ "node_id": "0-0", "position": { "x": 160, "y": 160 }, "comm_range": 250 }],
//!   "random_node_count": 0,
//!   "events": [{ "time": 5.0, "action": { "type": "failure", "node_id": "0-0" } }]
//! }
//! ```

use anyhow::Context;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;

use crate::common::config::SimulationConfig;
use crate::scenario::{EventSchedule, ScheduledEvent};
use crate::simulation::network::{Network, NodeSpec};
use crate::simulation::types::{NetworkError, NodeId};

/// Error type for scene loading failures.
#[derive(Debug)]
pub enum SceneLoadError {
    FileReadError(String),
    ParseError(String),
    ValidationError(String),
}

impl std::fmt::Display for SceneLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SceneLoadError::FileReadError(msg) => write!(f, "Failed to read file: {}", msg),
            SceneLoadError::ParseError(msg) => write!(f, "Failed to parse JSON: {}", msg),
            SceneLoadError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for SceneLoadError {}

/// Root structure representing the entire scene.
#[derive(Debug, Clone, Deserialize)]
pub struct Scene {
    /// Width of the world in world units.
    pub width: f64,
    /// Height of the world in world units.
    pub height: f64,
    /// Explicitly described nodes, in roster order.
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    /// Extra nodes placed at random, with ids `"0"`, `"1"`, ... appended
    /// after the explicit ones.
    #[serde(default)]
    pub random_node_count: usize,
    #[serde(default)]
    pub events: Vec<ScheduledEvent>,
}

impl Scene {
    /// Full roster: explicit nodes followed by the random ones.
    pub fn node_specs(&self) -> Vec<NodeSpec> {
        let mut specs = self.nodes.clone();
        specs.extend((0..self.random_node_count).map(|i| NodeSpec::new(NodeId::new(i.to_string()))));
        specs
    }

    /// Build the environment and its event schedule.
    pub fn build(&self, config: SimulationConfig) -> Result<(Network, EventSchedule), NetworkError> {
        let network = Network::new(config, self.width, self.height, self.node_specs())?;
        Ok((network, EventSchedule::new(self.events.clone())))
    }
}

/// Load and parse a scene from a file.
///
/// # Parameters
///
/// * `path` - Path to the scene JSON file
///
/// # Returns
///
/// Parsed and validated Scene or an error.
pub fn load_scene(path: &str) -> Result<Scene, SceneLoadError> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path))
        .map_err(|e| SceneLoadError::FileReadError(e.to_string()))?;

    parse_scene(&data)
}

/// Parse and validate a scene from its JSON text.
pub fn parse_scene(data: &str) -> Result<Scene, SceneLoadError> {
    let scene: Scene = serde_json::from_str(data)
        .context("Invalid JSON format")
        .map_err(|e| SceneLoadError::ParseError(format!("{:#}", e)))?;

    validate_scene(&scene).map_err(SceneLoadError::ValidationError)?;

    Ok(scene)
}

/// Validate scene configuration.
///
/// # Parameters
///
/// * `scene` - The parsed scene to validate
///
/// # Returns
///
/// `Ok(())` if validation passes, `Err(String)` with error description otherwise.
pub fn validate_scene(scene: &Scene) -> Result<(), String> {
    const MAX_NODES: usize = 10000;

    if !(scene.width.is_finite() && scene.width > 0.0 && scene.height.is_finite() && scene.height > 0.0) {
        return Err(format!("World size {}x{} must be positive", scene.width, scene.height));
    }

    // Check node count
    let total = scene.nodes.len() + scene.random_node_count;
    if total == 0 {
        return Err("Scene must contain at least one node".to_string());
    }
    if total > MAX_NODES {
        return Err(format!("Node count {} exceeds maximum of {}", total, MAX_NODES));
    }

    // Check for duplicate node IDs, random ones included
    let mut node_ids = HashSet::new();
    for spec in scene.node_specs() {
        if !node_ids.insert(spec.node_id.clone()) {
            return Err(format!("Duplicate node_id found: {}", spec.node_id));
        }
    }

    for node in &scene.nodes {
        if let Some(position) = &node.position {
            if !(0.0..=scene.width).contains(&position.x) || !(0.0..=scene.height).contains(&position.y) {
                return Err(format!(
                    "Node {} position ({}, {}) outside world bounds ({}x{})",
                    node.node_id, position.x, position.y, scene.width, scene.height
                ));
            }
        }
        if let Some(range) = node.comm_range {
            if !(range.is_finite() && range > 0.0) {
                return Err(format!("Node {} comm_range {} must be positive", node.node_id, range));
            }
        }
    }

    for (idx, event) in scene.events.iter().enumerate() {
        if !(event.at.is_finite() && event.at >= 0.0) {
            return Err(format!("Event {} has invalid time {}, must be non-negative", idx, event.at));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::ScenarioAction;

    const GRID_SCENE: &str = r#"{
        "width": 400, "height": 200,
        "nodes": [
            { "node_id": "a", "position": { "x": 50, "y": 100 }, "comm_range": 120 },
            { "node_id": "b", "position": { "x": 150, "y": 100 } },
            { "node_id": "c", "position": { "x": 250, "y": 100 }, "comm_range": 120 }
        ],
        "events": [
            { "time": 2.0, "action": { "type": "failure", "node_id": "b" } },
            { "time": 0.5, "action": { "type": "originate", "source": "a",
              "packet": { "kind": "DATA", "destination": "c", "payload": "status ok" } } }
        ]
    }"#;

    fn validation_error(json: &str) -> String {
        match parse_scene(json) {
            Err(SceneLoadError::ValidationError(msg)) => msg,
            other => panic!("expected a validation error, got {:?}", other.map(|s| s.nodes.len())),
        }
    }

    #[test]
    fn parses_nodes_and_events() {
        let scene = parse_scene(GRID_SCENE).unwrap();
        assert_eq!(scene.nodes.len(), 3);
        assert_eq!(scene.nodes[1].comm_range, None);
        assert_eq!(scene.events.len(), 2);
        assert_eq!(scene.events[0].action, ScenarioAction::Failure { node_id: NodeId::new("b") });
    }

    #[test]
    fn build_applies_defaults_and_orders_events() {
        let scene = parse_scene(GRID_SCENE).unwrap();
        let config = SimulationConfig {
            default_comm_range: 120.0,
            ..SimulationConfig::default()
        };
        let (mut network, mut schedule) = scene.build(config).unwrap();
        assert_eq!(network.node(&NodeId::new("b")).unwrap().comm_range(), 120.0);

        let first = schedule.poll_due(0.5);
        assert_eq!(first.len(), 1);
        assert!(matches!(first[0].action, ScenarioAction::Originate { .. }));

        first[0].action.apply(&mut network).unwrap();
        network.tick();
        assert_eq!(network.node(&NodeId::new("c")).unwrap().delivered().len(), 1);
    }

    #[test]
    fn random_nodes_extend_the_roster() {
        let scene = parse_scene(r#"{ "width": 100, "height": 100, "nodes": [{ "node_id": "x" }], "random_node_count": 3 }"#).unwrap();
        let ids: Vec<String> = scene.node_specs().iter().map(|s| s.node_id.to_string()).collect();
        assert_eq!(ids, vec!["x", "0", "1", "2"]);
    }

    #[test]
    fn rejects_empty_roster() {
        let msg = validation_error(r#"{ "width": 100, "height": 100 }"#);
        assert!(msg.contains("at least one node"));
    }

    #[test]
    fn rejects_duplicate_ids() {
        let msg = validation_error(r#"{ "width": 100, "height": 100, "nodes": [{ "node_id": "1" }], "random_node_count": 2 }"#);
        assert!(msg.contains("Duplicate node_id found: 1"));
    }

    #[test]
    fn rejects_out_of_world_positions_and_bad_ranges() {
        let msg = validation_error(r#"{ "width": 100, "height": 100, "nodes": [{ "node_id": "a", "position": { "x": 101, "y": 5 } }] }"#);
        assert!(msg.contains("outside world bounds"));
        let msg = validation_error(r#"{ "width": 100, "height": 100, "nodes": [{ "node_id": "a", "comm_range": 0 }] }"#);
        assert!(msg.contains("comm_range"));
    }

    #[test]
    fn rejects_negative_event_time() {
        let msg = validation_error(
            r#"{ "width": 100, "height": 100, "nodes": [{ "node_id": "a" }],
                 "events": [{ "time": -1.0, "action": { "type": "recover", "node_id": "a" } }] }"#,
        );
        assert!(msg.contains("non-negative"));
    }

    #[test]
    fn reports_parse_and_read_errors() {
        assert!(matches!(parse_scene("{ not json"), Err(SceneLoadError::ParseError(_))));
        let err = load_scene("/nonexistent/scene.json").err().unwrap();
        assert!(matches!(err, SceneLoadError::FileReadError(_)));
        assert!(err.to_string().starts_with("Failed to read file"));
    }
}
