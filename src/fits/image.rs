//! Image arrays: big-endian pixel decoding with BSCALE/BZERO/BLANK applied.

use super::{FormatError, Header, Result};
use log::debug;
use ndarray::{ArrayD, IxDyn};

/// Pixel storage type declared by `BITPIX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bitpix {
    U8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl Bitpix {
    pub fn from_value(value: i64) -> Result<Self> {
        match value {
            8 => Ok(Self::U8),
            16 => Ok(Self::I16),
            32 => Ok(Self::I32),
            64 => Ok(Self::I64),
            -32 => Ok(Self::F32),
            -64 => Ok(Self::F64),
            other => Err(FormatError::InvalidBitpix(other)),
        }
    }

    pub fn value(self) -> i64 {
        match self {
            Self::U8 => 8,
            Self::I16 => 16,
            Self::I32 => 32,
            Self::I64 => 64,
            Self::F32 => -32,
            Self::F64 => -64,
        }
    }

    /// Bytes per pixel.
    pub fn size(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::I16 => 2,
            Self::I32 | Self::F32 => 4,
            Self::I64 | Self::F64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    /// Read one big-endian pixel. `raw` must hold exactly [`Bitpix::size`] bytes.
    pub(crate) fn read(self, raw: &[u8]) -> Raw {
        match self {
            Self::U8 => Raw::Int(raw[0] as i64),
            Self::I16 => Raw::Int(i16::from_be_bytes([raw[0], raw[1]]) as i64),
            Self::I32 => Raw::Int(i32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as i64),
            Self::I64 => {
                let mut b = [0u8; 8];
                b.copy_from_slice(&raw[..8]);
                Raw::Int(i64::from_be_bytes(b))
            }
            Self::F32 => Raw::Float(f32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as f64),
            Self::F64 => {
                let mut b = [0u8; 8];
                b.copy_from_slice(&raw[..8]);
                Raw::Float(f64::from_be_bytes(b))
            }
        }
    }
}

/// A pixel before scaling; integer pixels are kept exact for BLANK matching.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Raw {
    Int(i64),
    Float(f64),
}

/// Linear pixel scaling: `physical = raw * scale + zero`, with `blank`
/// (integer images only) mapping to NaN.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Scaling {
    pub scale: f64,
    pub zero: f64,
    pub blank: Option<i64>,
}

impl Default for Scaling {
    fn default() -> Self {
        Self {
            scale: 1.0,
            zero: 0.0,
            blank: None,
        }
    }
}

impl Scaling {
    pub fn from_header(header: &Header) -> Self {
        Self {
            scale: header.get_f64("BSCALE").unwrap_or(1.0),
            zero: header.get_f64("BZERO").unwrap_or(0.0),
            blank: header.get_i64("BLANK"),
        }
    }

    pub fn apply(&self, raw: Raw) -> f64 {
        match raw {
            Raw::Int(v) if Some(v) == self.blank => f64::NAN,
            Raw::Int(v) => v as f64 * self.scale + self.zero,
            Raw::Float(v) => v * self.scale + self.zero,
        }
    }
}

/// Image axes from `NAXISn`, in C order (`[NAXISn, …, NAXIS1]`).
pub(crate) fn axes(header: &Header, prefix: &str) -> Result<Vec<usize>> {
    let naxis_key = format!("{prefix}NAXIS");
    let naxis = header.require_i64(&naxis_key)?;
    if !(0..=999).contains(&naxis) {
        return Err(FormatError::invalid(naxis_key, naxis));
    }
    let mut dims = Vec::with_capacity(naxis as usize);
    for i in 1..=naxis {
        let key = format!("{prefix}NAXIS{i}");
        let n = header.require_i64(&key)?;
        if n < 0 {
            return Err(FormatError::invalid(key, n));
        }
        dims.push(n as usize);
    }
    dims.reverse();
    Ok(dims)
}

/// Total pixel count of a shape; zero when there are no axes.
pub(crate) fn pixel_count(shape: &[usize]) -> Result<usize> {
    if shape.is_empty() {
        return Ok(0);
    }
    checked_product(shape).ok_or_else(|| FormatError::invalid("NAXIS", format!("{shape:?}")))
}

/// Product of `values`, `None` on overflow.
pub(crate) fn checked_product(values: &[usize]) -> Option<usize> {
    values.iter().try_fold(1usize, |acc, &n| acc.checked_mul(n))
}

/// Decode a primary or IMAGE data unit.
pub(crate) fn decode(header: &Header, data: &[u8]) -> Result<ArrayD<f64>> {
    let bitpix = Bitpix::from_value(header.require_i64("BITPIX")?)?;
    let shape = axes(header, "")?;
    let scaling = Scaling::from_header(header);
    debug!(
        "decoding {:?} image {:?} (bscale={}, bzero={})",
        bitpix, shape, scaling.scale, scaling.zero
    );
    decode_pixels(data, bitpix, &shape, scaling)
}

pub(crate) fn decode_pixels(
    data: &[u8],
    bitpix: Bitpix,
    shape: &[usize],
    scaling: Scaling,
) -> Result<ArrayD<f64>> {
    let count = pixel_count(shape)?;
    let needed = count
        .checked_mul(bitpix.size())
        .ok_or_else(|| FormatError::invalid("NAXIS", count))?;
    let raw = super::slice_at(data, 0, needed, "image data")?;

    let values: Vec<f64> = raw
        .chunks_exact(bitpix.size())
        .map(|chunk| scaling.apply(bitpix.read(chunk)))
        .collect();

    ArrayD::from_shape_vec(IxDyn(shape), values)
        .map_err(|e| FormatError::invalid("NAXIS", e))
}
