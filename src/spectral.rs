//! # Spectral Derivation
//!
//! Turns image rows or 1-D series into wavelength-tagged spectra and derives
//! a black-body temperature from the peak via Wien's displacement law.
//!
//! The wavelength axis is synthetic: a linear grid spanning the configured
//! band (400–700 nm by default) with one point per pixel column. Peak
//! detection assumes finite intensities; [`sanitize_non_finite`] is the
//! caller-side helper that establishes that.

use ndarray::{s, ArrayD};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wien's displacement constant in nm·K.
pub const WIEN_CONSTANT_NM_K: f64 = 2.898e6;

/// A quantity outside the domain of a physical formula.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{quantity} = {value} is outside the valid domain")]
pub struct DomainError {
    pub quantity: &'static str,
    pub value: f64,
}

#[derive(Debug, Error)]
pub enum DerivationError {
    #[error("image has {0} dimension(s); at least 2 are needed for a row spectrum")]
    DimensionTooLow(usize),

    #[error("row {row} is outside an image of height {height}")]
    RowOutOfRange { row: usize, height: usize },

    #[error("row has no samples")]
    EmptyRow,

    #[error("invalid spectrum: {0}")]
    InvalidSample(String),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("cannot reshape image: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Wavelength range mapped onto pixel columns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectralBand {
    pub min_nm: f64,
    pub max_nm: f64,
}

impl Default for SpectralBand {
    fn default() -> Self {
        Self {
            min_nm: 400.0,
            max_nm: 700.0,
        }
    }
}

impl SpectralBand {
    /// `n` evenly spaced wavelengths from `min_nm` to `max_nm` inclusive.
    pub fn linspace(&self, n: usize) -> Vec<f64> {
        match n {
            0 => Vec::new(),
            1 => vec![self.min_nm],
            _ => {
                let step = (self.max_nm - self.min_nm) / (n - 1) as f64;
                (0..n).map(|i| self.min_nm + step * i as f64).collect()
            }
        }
    }
}

/// Intensities tagged with strictly increasing wavelengths.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpectralSample {
    pub wavelengths_nm: Vec<f64>,
    pub intensities: Vec<f64>,
}

impl SpectralSample {
    pub fn new(wavelengths_nm: Vec<f64>, intensities: Vec<f64>) -> Result<Self, DerivationError> {
        if intensities.is_empty() {
            return Err(DerivationError::EmptyRow);
        }
        if wavelengths_nm.len() != intensities.len() {
            return Err(DerivationError::InvalidSample(format!(
                "{} wavelengths for {} intensities",
                wavelengths_nm.len(),
                intensities.len()
            )));
        }
        if wavelengths_nm.windows(2).any(|w| w[1] <= w[0]) {
            return Err(DerivationError::InvalidSample(
                "wavelengths must be strictly increasing".into(),
            ));
        }
        Ok(Self {
            wavelengths_nm,
            intensities,
        })
    }

    pub fn len(&self) -> usize {
        self.intensities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intensities.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DerivedTemperature {
    pub peak_wavelength_nm: f64,
    pub temperature_k: f64,
}

/// Sample one pixel row of an image as a spectrum.
///
/// A 2-D image yields one sample. Higher-dimensional images are treated as
/// stacks of 2-D planes (leading axes flattened into channels) and yield one
/// sample per plane, all taken at the same row. `row` defaults to the middle
/// row.
pub fn extract_row_spectrum(
    image: &ArrayD<f64>,
    row: Option<usize>,
    band: &SpectralBand,
) -> Result<Vec<SpectralSample>, DerivationError> {
    let shape = image.shape();
    let ndim = shape.len();
    if ndim < 2 {
        return Err(DerivationError::DimensionTooLow(ndim));
    }
    let (height, width) = (shape[ndim - 2], shape[ndim - 1]);
    let channels: usize = shape[..ndim - 2].iter().product();
    if width == 0 || channels == 0 {
        return Err(DerivationError::EmptyRow);
    }

    let row = row.unwrap_or(height / 2);
    if row >= height {
        return Err(DerivationError::RowOutOfRange { row, height });
    }

    let standard = image.as_standard_layout();
    let cube = standard
        .view()
        .into_shape_with_order((channels, height, width))?;
    let wavelengths = band.linspace(width);

    (0..channels)
        .map(|c| {
            SpectralSample::new(
                wavelengths.clone(),
                cube.slice(s![c, row, ..]).to_vec(),
            )
        })
        .collect()
}

/// Tag a 1-D intensity series with the band's wavelength grid.
pub fn spectrum_from_series(
    intensities: &[f64],
    band: &SpectralBand,
) -> Result<SpectralSample, DerivationError> {
    SpectralSample::new(band.linspace(intensities.len()), intensities.to_vec())
}

/// Replace NaN and ±∞ with zero.
pub fn sanitize_non_finite(values: &[f64]) -> Vec<f64> {
    values
        .iter()
        .map(|&v| if v.is_finite() { v } else { 0.0 })
        .collect()
}

/// Wavelength at the first maximum intensity. NaN never wins; a sample
/// with no finite maximum reports its first wavelength.
pub fn peak_wavelength(sample: &SpectralSample) -> f64 {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in sample.intensities.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    let index = best.map(|(i, _)| i).unwrap_or(0);
    sample.wavelengths_nm[index]
}

/// Black-body temperature (K) whose emission peaks at `peak_nm`.
pub fn wien_temperature(peak_nm: f64) -> Result<f64, DomainError> {
    if !peak_nm.is_finite() || peak_nm <= 0.0 {
        return Err(DomainError {
            quantity: "peak wavelength (nm)",
            value: peak_nm,
        });
    }
    Ok(WIEN_CONSTANT_NM_K / peak_nm)
}

/// Peak wavelength and Wien temperature of a sample.
pub fn derive_temperature(sample: &SpectralSample) -> Result<DerivedTemperature, DerivationError> {
    let peak_wavelength_nm = peak_wavelength(sample);
    let temperature_k = wien_temperature(peak_wavelength_nm)?;
    Ok(DerivedTemperature {
        peak_wavelength_nm,
        temperature_k,
    })
}

/// Effective temperature from a B−V colour index (Ballesteros 2012).
pub fn color_index_temperature(b_minus_v: f64) -> Result<f64, DomainError> {
    // Both denominators must stay positive.
    if !b_minus_v.is_finite() || 0.92 * b_minus_v + 0.62 <= 0.0 {
        return Err(DomainError {
            quantity: "B-V colour index",
            value: b_minus_v,
        });
    }
    Ok(4600.0 * (1.0 / (0.92 * b_minus_v + 1.7) + 1.0 / (0.92 * b_minus_v + 0.62)))
}
