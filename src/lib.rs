//! Disaster-recovery wireless mesh simulator.
//!
//! Battery-powered nodes scattered over a 2D area relay emergency traffic to
//! each other by controlled flooding. Nodes discover neighbors with periodic
//! HELLO beacons, suppress duplicates, bound every flood with a hop budget and
//! hold packets they could not send until a neighbor appears. Nodes can be
//! destroyed mid-run to observe how the mesh routes around the damage.

pub mod common;
pub mod scenario;
pub mod simulation;
