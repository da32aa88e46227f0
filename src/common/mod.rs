//! File-backed inputs shared by the simulation driver: the TOML protocol
//! configuration and the JSON scene description.

pub mod config;
pub mod scene;
