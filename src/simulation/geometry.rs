//! Geometry calculations for radio reachability.
//!
//! Contains helper functions for:
//! - Distance calculations (squared distance to avoid sqrt in hot paths)
//! - The one-directional range check used for neighbor resolution
//! - Uniform random placement inside the world rectangle

use rand::Rng;

use super::types::Point;

/// Squared Euclidean distance in world units (avoids a sqrt in hot paths).
///
/// Comparing d² against range² gives the same answer as comparing d against
/// range, so the range check never needs the square root.
pub fn distance2(a: &Point, b: &Point) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy
}

/// True if a transmitter at `sender` with radius `range` reaches `receiver`.
///
/// The check is evaluated from the sender's side only. With heterogeneous
/// ranges the relation is not symmetric: a strong transmitter may reach a weak
/// one that cannot answer.
///
/// The boundary is inclusive (`distance <= range`).
pub fn in_range(sender: &Point, receiver: &Point, range: f64) -> bool {
    distance2(sender, receiver) <= range * range
}

/// Uniformly random point inside `[0, width] x [0, height]`.
pub fn random_point<R: Rng + ?Sized>(rng: &mut R, width: f64, height: f64) -> Point {
    Point {
        x: rng.gen_range(0.0..=width),
        y: rng.gen_range(0.0..=height),
    }
}
