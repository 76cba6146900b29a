//! Uniform expansion of a point cloud and Hubble-law recession.
//!
//! The scale factor grows linearly, `a(t) = 1 + H0·t / 1000`, and every
//! position is multiplied by it, so relative distances grow while the shape
//! of the cloud is preserved. Recession follows `v = H0·d` with redshift
//! `z = v / c` (non-relativistic).

use super::{require_non_negative, ModelError, Point};
use serde::{Deserialize, Serialize};

/// Speed of light used for redshift, km/s.
pub const SPEED_OF_LIGHT_KM_S: f64 = 3.0e5;

/// Expansion model parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionParams {
    /// Hubble constant, km/s/Mpc.
    pub h0_km_s_mpc: f64,
    /// Points per axis of the initial lattice.
    pub lattice_per_axis: usize,
    pub lattice_spacing: f64,
    /// 2 for a planar cloud, 3 for a volume.
    pub dimensions: usize,
}

impl Default for ExpansionParams {
    fn default() -> Self {
        Self {
            h0_km_s_mpc: 70.0,
            lattice_per_axis: 5,
            lattice_spacing: 1.0,
            dimensions: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpansionModelState {
    pub time: f64,
    /// Always ≥ 1.
    pub scale_factor: f64,
    pub positions: Vec<Point>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RecessionSample {
    pub distance_mpc: f64,
    pub velocity_km_s: f64,
    pub redshift: f64,
}

/// `1 + h0·t / 1000`. Negative inputs would shrink space and are rejected.
pub fn scale_factor(h0: f64, t: f64) -> Result<f64, ModelError> {
    let h0 = require_non_negative("h0", h0)?;
    let t = require_non_negative("time", t)?;
    Ok(1.0 + h0 * t / 1000.0)
}

/// Positions at time `t`, every point multiplied by the scale factor.
pub fn expand(points: &[Point], h0: f64, t: f64) -> Result<ExpansionModelState, ModelError> {
    let scale = scale_factor(h0, t)?;
    Ok(ExpansionModelState {
        time: t,
        scale_factor: scale,
        positions: points.iter().map(|p| p.scaled(scale)).collect(),
    })
}

pub fn recession_velocity(h0: f64, distance_mpc: f64) -> f64 {
    h0 * distance_mpc
}

pub fn redshift(h0: f64, distance_mpc: f64) -> f64 {
    recession_velocity(h0, distance_mpc) / SPEED_OF_LIGHT_KM_S
}

pub fn recession(h0: f64, distance_mpc: f64) -> Result<RecessionSample, ModelError> {
    let h0 = require_non_negative("h0", h0)?;
    let distance_mpc = require_non_negative("distance", distance_mpc)?;
    Ok(RecessionSample {
        distance_mpc,
        velocity_km_s: recession_velocity(h0, distance_mpc),
        redshift: redshift(h0, distance_mpc),
    })
}

/// A regular lattice centred on the origin, `per_axis` points per axis.
pub fn lattice_cloud(
    per_axis: usize,
    spacing: f64,
    dimensions: usize,
) -> Result<Vec<Point>, ModelError> {
    if !(2..=3).contains(&dimensions) {
        return Err(ModelError::invalid(
            "dimensions",
            dimensions as f64,
            "must be 2 or 3",
        ));
    }
    let spacing = require_non_negative("spacing", spacing)?;
    let centre = (per_axis as f64 - 1.0) / 2.0;
    let coord = |i: usize| (i as f64 - centre) * spacing;
    let depth = if dimensions == 3 { per_axis } else { 1 };

    let mut points = Vec::with_capacity(per_axis * per_axis * depth);
    for k in 0..depth {
        for j in 0..per_axis {
            for i in 0..per_axis {
                let z = if dimensions == 3 { coord(k) } else { 0.0 };
                points.push(Point::new(coord(i), coord(j), z));
            }
        }
    }
    Ok(points)
}

/// `steps + 1` evenly spaced states from `t = 0` to `t_end`.
pub fn timeline(
    points: &[Point],
    h0: f64,
    t_end: f64,
    steps: usize,
) -> Result<Vec<ExpansionModelState>, ModelError> {
    let t_end = require_non_negative("t_end", t_end)?;
    if steps == 0 {
        return Err(ModelError::invalid("steps", 0.0, "must be at least 1"));
    }
    (0..=steps)
        .map(|i| expand(points, h0, t_end * i as f64 / steps as f64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_factor_starts_at_one_and_grows() {
        assert_eq!(scale_factor(70.0, 0.0).unwrap(), 1.0);
        assert!((scale_factor(70.0, 10.0).unwrap() - 1.7).abs() < 1e-12);
        let mut previous = 1.0;
        for step in 1..20 {
            let s = scale_factor(67.4, step as f64 * 0.5).unwrap();
            assert!(s > previous, "scale must grow with time");
            previous = s;
        }
    }

    #[test]
    fn scale_factor_grows_with_expansion_rate() {
        let t = 3.0;
        assert_eq!(scale_factor(0.0, t).unwrap(), 1.0);
        let mut previous = 1.0;
        for h0 in [10.0, 50.0, 67.4, 70.0, 73.0, 100.0] {
            let s = scale_factor(h0, t).unwrap();
            assert!(s > previous, "scale must grow with H0 (H0 = {h0})");
            previous = s;
        }
    }

    #[test]
    fn negative_inputs_rejected() {
        assert!(scale_factor(-70.0, 1.0).is_err());
        assert!(scale_factor(70.0, -1.0).is_err());
        assert!(expand(&[Point::default()], 70.0, f64::NAN).is_err());
    }

    #[test]
    fn expansion_preserves_shape() {
        let points = vec![Point::new(1.0, 0.0, 0.0), Point::new(0.0, 2.0, 0.0)];
        let state = expand(&points, 50.0, 4.0).unwrap();
        assert!((state.scale_factor - 1.2).abs() < 1e-12);
        assert!((state.positions[0].x - 1.2).abs() < 1e-12);
        assert!((state.positions[1].y - 2.4).abs() < 1e-12);
        let ratio = state.positions[1].norm() / state.positions[0].norm();
        assert!((ratio - 2.0).abs() < 1e-12);
    }

    #[test]
    fn hubble_law() {
        let sample = recession(70.0, 100.0).unwrap();
        assert_eq!(sample.velocity_km_s, 7000.0);
        assert!((sample.redshift - 7000.0 / 3.0e5).abs() < 1e-15);
        assert!(recession(70.0, -1.0).is_err());
    }

    #[test]
    fn lattice_layouts() {
        let cube = lattice_cloud(3, 2.0, 3).unwrap();
        assert_eq!(cube.len(), 27);
        assert_eq!(cube[0], Point::new(-2.0, -2.0, -2.0));
        assert_eq!(cube[13], Point::new(0.0, 0.0, 0.0));

        let plane = lattice_cloud(4, 1.0, 2).unwrap();
        assert_eq!(plane.len(), 16);
        assert!(plane.iter().all(|p| p.z == 0.0));
        assert_eq!(plane[0], Point::new(-1.5, -1.5, 0.0));

        assert!(lattice_cloud(3, 1.0, 4).is_err());
    }

    #[test]
    fn timeline_is_monotonic() {
        let points = lattice_cloud(2, 1.0, 2).unwrap();
        let states = timeline(&points, 70.0, 10.0, 5).unwrap();
        assert_eq!(states.len(), 6);
        assert_eq!(states[0].time, 0.0);
        assert_eq!(states[5].time, 10.0);
        assert!(states.windows(2).all(|w| w[1].scale_factor > w[0].scale_factor));
        assert!(timeline(&points, 70.0, 10.0, 0).is_err());
    }
}
