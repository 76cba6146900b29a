//! # Astro Explorer Core Library
//!
//! Inspection of astronomical observation files and a handful of simplified
//! astrophysical models. The library never touches the filesystem for data:
//! callers hand it bytes and get value objects back, which the
//! `astro-explorer` binary prints as text or JSON.
//!
//! ## Data Flow
//!
//! 1. **Load**: [`fits::load`] parses a FITS container (plain, whole-file
//!    gzip, or tile-compressed images) into ordered [`fits::Unit`]s
//! 2. **Select**: [`fits::select`] picks the first image or table unit that
//!    actually carries data
//! 3. **Derive**: the selected unit feeds independent derivations, each of
//!    which may fail on its own without affecting the others:
//!    - [`astrometry::resolve`]: pixel ↔ sky projection from WCS keywords
//!    - [`sky::observer_alt_az_from_header`]: horizon position of the target
//!    - [`spectral::extract_row_spectrum`] → [`spectral::derive_temperature`]
//!    - [`tabular::pair_columns`]: aligned samples of two table columns
//!    - [`display::DisplayScaling`]: percentile clip limits for rendering
//!
//! The [`models`] are driven by [`config::Config`] alone.
//!
//! ## Error Model
//!
//! Each module reports its own `thiserror` type. Absences that a caller is
//! expected to branch on ([`fits::UnitNotFound`], [`astrometry::NoAstrometry`],
//! [`sky::NoTarget`]) are plain values rather than failures of the whole
//! file.

pub mod astrometry;
pub mod config;
pub mod display;
pub mod fits;
pub mod lunar;
pub mod models;
pub mod sky;
pub mod spectral;
pub mod tabular;
