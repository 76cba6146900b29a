//! # FITS Container Store
//!
//! Loads a multi-unit FITS container from an in-memory byte slice and exposes
//! its units (HDUs) in stored order. The caller never touches a path: a
//! collaborator materializes the bytes and hands them over.
//!
//! ## Decoding pipeline
//!
//! ```text
//!  bytes ──► gzip wrapper? ──► header blocks ──► data blocks ──► Unit
//!                                                  │
//!                       IMAGE / primary ───────────┼──► ArrayD<f64>
//!                       BINTABLE (ZIMAGE = T) ─────┼──► tiles ──► ArrayD<f64>
//!                       BINTABLE / TABLE ──────────┴──► Table
//! ```
//!
//! Tile-compressed images are presented as ordinary image units: the caller
//! cannot tell whether a unit was stored compressed.

mod container;
mod header;
mod image;
mod rice;
mod table;
mod tiled;

pub use container::{load, select, Container, Payload, Unit, UnitKind, UnitNotFound, UnitSummary};
pub use header::{Card, Header, Value};
pub use image::Bitpix;
pub use table::{Column, ColumnData, Table};

use thiserror::Error;

/// Size of one FITS logical record; headers and data are padded to it.
pub const BLOCK_SIZE: usize = 2880;

/// Width of a single header card.
pub const CARD_SIZE: usize = 80;

/// Failures that make a byte stream unusable as a container.
///
/// Every variant is fatal to the [`load`] call that produced it and to
/// nothing else.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("input is empty")]
    Empty,

    #[error("truncated {what}: needed {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        what: &'static str,
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("header starting at offset {0} has no END card")]
    MissingEnd(usize),

    #[error("header card at offset {0} contains non-ASCII bytes")]
    NonAscii(usize),

    #[error("not a FITS stream: first card must be SIMPLE = T")]
    NotFits,

    #[error("missing required keyword {0}")]
    MissingKeyword(String),

    #[error("invalid value for {keyword}: {value}")]
    InvalidKeyword { keyword: String, value: String },

    #[error("invalid BITPIX value {0}")]
    InvalidBitpix(i64),

    #[error("unsupported column format '{0}'")]
    ColumnFormat(String),

    #[error("columns have different lengths ({expected} vs {found})")]
    RaggedColumns { expected: usize, found: usize },

    #[error("unsupported tile compression {0}")]
    UnsupportedCompression(String),

    #[error("corrupt compressed data: {0}")]
    Compression(String),

    #[error("gzip stream error: {0}")]
    Gzip(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FormatError>;

impl FormatError {
    pub(crate) fn invalid(keyword: impl Into<String>, value: impl ToString) -> Self {
        Self::InvalidKeyword {
            keyword: keyword.into(),
            value: value.to_string(),
        }
    }

    pub(crate) fn compression(message: impl Into<String>) -> Self {
        Self::Compression(message.into())
    }
}

/// Round `len` up to the next multiple of [`BLOCK_SIZE`].
pub(crate) fn padded_len(len: usize) -> usize {
    len.div_ceil(BLOCK_SIZE) * BLOCK_SIZE
}

/// Borrow `len` bytes at `offset`, reporting truncation instead of panicking.
pub(crate) fn slice_at<'a>(
    data: &'a [u8],
    offset: usize,
    len: usize,
    what: &'static str,
) -> Result<&'a [u8]> {
    let end = offset.checked_add(len).ok_or(FormatError::Truncated {
        what,
        offset,
        needed: len,
        available: data.len().saturating_sub(offset),
    })?;
    data.get(offset..end).ok_or(FormatError::Truncated {
        what,
        offset,
        needed: len,
        available: data.len().saturating_sub(offset),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padded_len_rounds_to_blocks() {
        assert_eq!(padded_len(0), 0);
        assert_eq!(padded_len(1), BLOCK_SIZE);
        assert_eq!(padded_len(BLOCK_SIZE), BLOCK_SIZE);
        assert_eq!(padded_len(BLOCK_SIZE + 1), 2 * BLOCK_SIZE);
    }

    #[test]
    fn slice_at_reports_truncation() {
        let data = [0u8; 10];
        assert_eq!(slice_at(&data, 2, 4, "test").unwrap().len(), 4);
        match slice_at(&data, 8, 4, "test") {
            Err(FormatError::Truncated {
                needed, available, ..
            }) => {
                assert_eq!(needed, 4);
                assert_eq!(available, 2);
            }
            other => panic!("expected truncation, got {other:?}"),
        }
    }
}
