use anyhow::Context;
use env_logger::Builder;
use log::{LevelFilter, info};
use serde::Serialize;

use disaster_mesh_simulator::common::config::SimulationConfig;
use disaster_mesh_simulator::common::scene::load_scene;
use disaster_mesh_simulator::scenario::{self, DEFAULT_DURATION, RunReport};
use disaster_mesh_simulator::simulation::{NetworkStats, NodeStatus};

#[derive(Serialize)]
struct Summary<'a> {
    report: RunReport,
    stats: &'a NetworkStats,
    nodes: Vec<NodeStatus>,
}

/// Usage: `disaster-mesh-simulator [scene.json] [config.toml]`
///
/// Without a scene the built-in disaster grid is run. Without an explicit
/// config, `config.toml` next to the scene is used if present.
fn main() -> anyhow::Result<()> {
    // Logging setup
    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter(Some("disaster_mesh_simulator"), LevelFilter::Debug)
        .parse_default_env()
        .init();

    info!("Starting up");

    let mut args = std::env::args().skip(1);
    let scene_path = args.next();
    let config_path = args.next().map(std::path::PathBuf::from).or_else(|| {
        scene_path
            .as_deref()
            .map(SimulationConfig::config_path_from_scene)
            .filter(|p| p.exists())
    });

    let config = match &config_path {
        Some(path) => {
            info!("Loading config from {}", path.display());
            SimulationConfig::load(path).map_err(anyhow::Error::msg)?
        }
        None => SimulationConfig::default(),
    };

    let (mut network, mut schedule) = match &scene_path {
        Some(path) => {
            info!("Loading scene from {}", path);
            let scene = load_scene(path).with_context(|| format!("Cannot load scene {}", path))?;
            scene.build(config)?
        }
        None => {
            info!("No scene given, running the built-in disaster grid");
            (scenario::disaster_network(config)?, scenario::disaster_script())
        }
    };

    let report = scenario::run(&mut network, &mut schedule, DEFAULT_DURATION);

    let summary = Summary {
        report,
        stats: network.stats(),
        nodes: network.snapshot(),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
