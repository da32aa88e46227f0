//! Protocol and timing configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::simulation::packet::DEFAULT_TTL;

/// How far a flood may travel within a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PropagationMode {
    /// Forwards produced while draining are drained in the same tick, so a
    /// flood can cross the whole network in one tick.
    #[default]
    SameTick,
    /// Forwards wait for the next tick: one hop per tick.
    NextTick,
}

/// Timing and protocol parameters shared by the engine and every node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SimulationConfig {
    /// Seconds added to the simulation clock per tick.
    pub time_step: f64,
    /// Minimum gap between HELLO beacons of one node.
    pub hello_interval: f64,
    /// A neighbor not heard from for longer than this is pruned.
    pub neighbor_timeout: f64,
    /// TTL for originated packets whose `PacketSpec` carries none.
    pub default_ttl: u32,
    /// Range for nodes whose `NodeSpec` carries none.
    pub default_comm_range: f64,
    pub propagation: PropagationMode,
    /// Age after which dedup signatures are evicted. `None` keeps them forever.
    pub seen_retention: Option<f64>,
    /// Seed for random node placement. `None` draws from OS entropy.
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            time_step: 0.1,
            hello_interval: 1.0,
            neighbor_timeout: 3.0,
            default_ttl: DEFAULT_TTL,
            default_comm_range: 150.0,
            propagation: PropagationMode::SameTick,
            seen_retention: None,
            seed: None,
        }
    }
}

impl SimulationConfig {
    /// Load configuration from a TOML file.
    ///
    /// Missing keys fall back to their defaults.
    ///
    /// # Arguments
    /// * `config_path` - Path to the config.toml file
    ///
    /// # Returns
    /// * `Ok(SimulationConfig)` if the file was successfully loaded, parsed and validated
    /// * `Err(String)` with a descriptive error message otherwise
    pub fn load(config_path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(config_path).map_err(|e| format!("Failed to read config file: {}", e))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, String> {
        let config: SimulationConfig = toml::from_str(content).map_err(|e| format!("Failed to parse config file: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall the clock or make every node deaf.
    pub fn validate(&self) -> Result<(), String> {
        fn positive(name: &str, value: f64) -> Result<(), String> {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(format!("Invalid {}, must be a positive number (got {})", name, value))
            }
        }

        positive("time-step", self.time_step)?;
        positive("hello-interval", self.hello_interval)?;
        positive("neighbor-timeout", self.neighbor_timeout)?;
        positive("default-comm-range", self.default_comm_range)?;
        if let Some(retention) = self.seen_retention {
            positive("seen-retention", retention)?;
        }
        Ok(())
    }

    /// Derive the config path from a scene file path.
    ///
    /// Replaces the scene filename with "config.toml" in the same directory.
    pub fn config_path_from_scene(scene_path: &str) -> std::path::PathBuf {
        let scene = Path::new(scene_path);
        scene.parent().unwrap_or(Path::new(".")).join("config.toml")
    }
}
