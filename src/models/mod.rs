//! # Physical Models
//!
//! Three small, pure simulators driven by configuration:
//!
//! - [`expansion`]: uniform scale-factor growth of a point cloud plus
//!   Hubble-law recession
//! - [`habitable`]: habitable-zone bounds around a brightening star
//! - [`tidal`]: inverse-cube tidal forcing over a lunar orbit, with a
//!   spring–neap envelope and a diurnal variant
//!
//! Every evaluation builds fresh value objects; nothing is cached or shared.

pub mod expansion;
pub mod habitable;
pub mod tidal;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("invalid {name} = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },
}

impl ModelError {
    pub(crate) fn invalid(name: &'static str, value: f64, reason: &'static str) -> Self {
        Self::InvalidParameter {
            name,
            value,
            reason,
        }
    }
}

/// Reject NaN, infinities and negative values.
pub(crate) fn require_non_negative(name: &'static str, value: f64) -> Result<f64, ModelError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ModelError::invalid(name, value, "must be finite and non-negative"))
    }
}

/// Reject NaN, infinities, zero and negative values.
pub(crate) fn require_positive(name: &'static str, value: f64) -> Result<f64, ModelError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ModelError::invalid(name, value, "must be finite and positive"))
    }
}

/// A position in model space. Planar clouds use `z = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn scaled(self, factor: f64) -> Self {
        Self {
            x: self.x * factor,
            y: self.y * factor,
            z: self.z * factor,
        }
    }

    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}
