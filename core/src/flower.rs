//! Trajectory ("flower") invariant
//!
//! The last few windows of a run trace a short cycle in the
//! (risk, spectral entropy) plane. The area that cycle encloses is a cheap
//! hysteresis signal: a run oscillating around a loop sweeps real area,
//! a run moving along a line sweeps none.

use serde::{Deserialize, Serialize};

/// Number of trailing windows exported as the trajectory cycle
pub const CYCLE_LEN: usize = 6;

/// Enclosed area plus the points it was computed from
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlowerInvariant {
    pub petal_area: f64,
    /// Ordered (risk, specH) points, stored as pairs
    pub points: Vec<[f64; 2]>,
}

impl FlowerInvariant {
    /// Build from an ordered cycle of (risk, specH) points.
    /// Fewer than 3 points enclose nothing and yield `None`.
    pub fn from_cycle(points: &[[f64; 2]]) -> Option<Self> {
        if points.len() < 3 {
            return None;
        }
        Some(Self {
            petal_area: shoelace_area(points),
            points: points.to_vec(),
        })
    }
}

/// Absolute polygon area of an ordered point sequence (shoelace formula).
/// The polygon is closed implicitly (last point connects back to first).
/// Fewer than 3 points have zero area.
pub fn shoelace_area(points: &[[f64; 2]]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..n {
        let [x1, y1] = points[i];
        let [x2, y2] = points[(i + 1) % n];
        sum += x1 * y2 - x2 * y1;
    }
    sum.abs() * 0.5
}
