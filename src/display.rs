//! # Display Scaling
//!
//! Percentile clipping for rendering images: pixels below the low percentile
//! map to black, above the high percentile to white, linear in between.
//! Percentiles use linear interpolation between order statistics and skip
//! non-finite pixels.

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

/// Clip percentiles, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayScaling {
    pub low_percentile: f64,
    pub high_percentile: f64,
}

impl Default for DisplayScaling {
    fn default() -> Self {
        Self {
            low_percentile: 5.0,
            high_percentile: 99.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClipLimits {
    pub low: f64,
    pub high: f64,
}

impl ClipLimits {
    /// Map a pixel to [0, 1]. NaN stays NaN.
    pub fn normalize(&self, value: f64) -> f64 {
        if value.is_nan() {
            return f64::NAN;
        }
        let span = self.high - self.low;
        if span <= 0.0 {
            return if value >= self.high { 1.0 } else { 0.0 };
        }
        ((value - self.low) / span).clamp(0.0, 1.0)
    }
}

/// Percentile `p` (0–100) of sorted finite data.
fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

impl DisplayScaling {
    /// Clip limits over the finite pixels; `None` when there are none.
    pub fn limits(&self, image: &ArrayD<f64>) -> Option<ClipLimits> {
        self.limits_of(image.iter().copied())
    }

    pub fn limits_of(&self, values: impl IntoIterator<Item = f64>) -> Option<ClipLimits> {
        let mut finite: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return None;
        }
        finite.sort_by(f64::total_cmp);
        Some(ClipLimits {
            low: percentile_sorted(&finite, self.low_percentile),
            high: percentile_sorted(&finite, self.high_percentile),
        })
    }

    pub fn is_valid(&self) -> bool {
        (0.0..=100.0).contains(&self.low_percentile)
            && (0.0..=100.0).contains(&self.high_percentile)
            && self.low_percentile < self.high_percentile
    }
}
