//! Container loading, unit access and unit selection.

use super::image::{self, Bitpix};
use super::table::{self, Table};
use super::{padded_len, slice_at, tiled, FormatError, Header, Result};
use flate2::read::GzDecoder;
use log::{debug, warn};
use ndarray::ArrayD;
use serde::Serialize;
use std::fmt;
use std::io::Read;
use thiserror::Error;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Kind of content a unit carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnitKind {
    Image,
    Table,
    /// No payload: zero-size data, random groups, or an unknown extension.
    Empty,
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            UnitKind::Image => "Image",
            UnitKind::Table => "Table",
            UnitKind::Empty => "Empty",
        };
        f.pad(label)
    }
}

/// Decoded data of a unit.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// C order, shape `[NAXISn, …, NAXIS1]`, physical values, NaN for blanks.
    Image(ArrayD<f64>),
    Table(Table),
}

/// One header-data unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    pub index: usize,
    pub kind: UnitKind,
    pub header: Header,
    pub payload: Option<Payload>,
}

impl Unit {
    /// `EXTNAME`, or `PRIMARY` for the first unit.
    pub fn name(&self) -> &str {
        match self.header.get_str("EXTNAME") {
            Some(name) => name,
            None if self.index == 0 => "PRIMARY",
            None => "",
        }
    }

    pub fn image(&self) -> Option<&ArrayD<f64>> {
        match &self.payload {
            Some(Payload::Image(image)) => Some(image),
            _ => None,
        }
    }

    pub fn table(&self) -> Option<&Table> {
        match &self.payload {
            Some(Payload::Table(table)) => Some(table),
            _ => None,
        }
    }

    pub fn has_payload(&self) -> bool {
        match &self.payload {
            Some(Payload::Image(image)) => !image.is_empty(),
            Some(Payload::Table(table)) => table.rows > 0,
            None => false,
        }
    }

    pub fn summary(&self) -> UnitSummary {
        let (dimensions, format) = match &self.payload {
            Some(Payload::Image(image)) => {
                let axes: Vec<String> = image.shape().iter().rev().map(|n| n.to_string()).collect();
                let format = self
                    .header
                    .get_i64("BITPIX")
                    .and_then(|b| Bitpix::from_value(b).ok())
                    .map(pixel_format)
                    .unwrap_or("")
                    .to_string();
                (format!("({})", axes.join(", ")), format)
            }
            Some(Payload::Table(table)) => {
                let formats: Vec<&str> = table.columns.iter().map(|c| c.format.as_str()).collect();
                (
                    format!("{}R x {}C", table.rows, table.columns.len()),
                    format!("[{}]", formats.join(", ")),
                )
            }
            None => ("()".to_string(), String::new()),
        };
        UnitSummary {
            index: self.index,
            name: self.name().to_string(),
            kind: self.kind,
            cards: self.header.len(),
            dimensions,
            format,
        }
    }
}

fn pixel_format(bitpix: Bitpix) -> &'static str {
    match bitpix {
        Bitpix::U8 => "uint8",
        Bitpix::I16 => "int16",
        Bitpix::I32 => "int32",
        Bitpix::I64 => "int64",
        Bitpix::F32 => "float32",
        Bitpix::F64 => "float64",
    }
}

/// One line of a container listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitSummary {
    pub index: usize,
    pub name: String,
    pub kind: UnitKind,
    pub cards: usize,
    pub dimensions: String,
    pub format: String,
}

impl fmt::Display for UnitSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<4}{:<20}{:<8}{:>6}   {:<16}{}",
            self.index, self.name, self.kind, self.cards, self.dimensions, self.format
        )
    }
}

/// Ordered, immutable sequence of units. Index 0 is the primary unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Container {
    units: Vec<Unit>,
}

impl Container {
    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    pub fn get(&self, index: usize) -> Option<&Unit> {
        self.units.get(index)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Unit> {
        self.units.iter()
    }

    pub fn summary(&self) -> Vec<UnitSummary> {
        self.units.iter().map(Unit::summary).collect()
    }
}

/// No unit of the requested kind carries data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no {kind} unit with data in container")]
pub struct UnitNotFound {
    pub kind: UnitKind,
}

/// First unit of the requested kind with a non-empty payload.
pub fn select(container: &Container, want: UnitKind) -> std::result::Result<&Unit, UnitNotFound> {
    container
        .iter()
        .find(|unit| unit.kind == want && unit.has_payload())
        .ok_or(UnitNotFound { kind: want })
}

/// Parse a container from its bytes, unwrapping a whole-file gzip layer
/// first when present.
pub fn load(bytes: &[u8]) -> Result<Container> {
    if bytes.is_empty() {
        return Err(FormatError::Empty);
    }
    if bytes.starts_with(&GZIP_MAGIC) {
        let mut inflated = Vec::new();
        GzDecoder::new(bytes).read_to_end(&mut inflated)?;
        debug!("gzip wrapper: {} -> {} bytes", bytes.len(), inflated.len());
        return parse_units(&inflated);
    }
    parse_units(bytes)
}

fn parse_units(bytes: &[u8]) -> Result<Container> {
    if bytes.is_empty() {
        return Err(FormatError::Empty);
    }
    if !bytes.starts_with(b"SIMPLE  =") {
        return Err(FormatError::NotFits);
    }

    let mut units = Vec::new();
    let mut offset = 0;
    while offset < bytes.len() {
        let index = units.len();
        if index > 0 && is_padding(&bytes[offset..]) {
            debug!("ignoring {} trailing padding bytes", bytes.len() - offset);
            break;
        }

        let (header, header_len) = Header::parse(bytes, offset)?;
        if index == 0 && header.get_bool("SIMPLE") != Some(true) {
            return Err(FormatError::NotFits);
        }
        if index > 0 && header.get_str("XTENSION").is_none() {
            return Err(FormatError::MissingKeyword("XTENSION".into()));
        }

        let data_len = data_size(&header)?;
        let data_start = offset + header_len;
        let data = slice_at(bytes, data_start, data_len, "data unit")?;
        debug!(
            "unit {index}: {} cards, {data_len} data bytes at offset {data_start}",
            header.len()
        );

        units.push(decode_unit(index, header, data)?);
        offset = data_start + padded_len(data_len);
    }

    Ok(Container { units })
}

/// True when the rest of the stream is zero or blank fill.
fn is_padding(rest: &[u8]) -> bool {
    rest.iter().all(|&b| b == 0 || b == b' ')
}

fn is_random_groups(header: &Header) -> bool {
    header.get_bool("GROUPS") == Some(true) && header.get_i64("NAXIS1") == Some(0)
}

/// Byte length of the data following a header, before block padding.
fn data_size(header: &Header) -> Result<usize> {
    let bitpix = Bitpix::from_value(header.require_i64("BITPIX")?)?;
    let naxis = header.require_i64("NAXIS")?;
    if naxis == 0 {
        return Ok(0);
    }
    let mut axes = image::axes(header, "")?;
    // C order: the last entry is NAXIS1, which random groups set to zero.
    if is_random_groups(header) {
        axes.pop();
    }
    let pcount = header.get_i64("PCOUNT").unwrap_or(0).max(0) as usize;
    let gcount = header.get_i64("GCOUNT").unwrap_or(1).max(1) as usize;
    image::checked_product(&axes)
        .and_then(|pixels| pixels.checked_add(pcount))
        .and_then(|n| n.checked_mul(gcount))
        .and_then(|n| n.checked_mul(bitpix.size()))
        .ok_or_else(|| FormatError::invalid("NAXIS", format!("{axes:?} overflows the data size")))
}

fn decode_unit(index: usize, header: Header, data: &[u8]) -> Result<Unit> {
    let empty = |header: Header| Unit {
        index,
        kind: UnitKind::Empty,
        header,
        payload: None,
    };

    let xtension = if index == 0 {
        "PRIMARY".to_string()
    } else {
        header
            .get_str("XTENSION")
            .unwrap_or_default()
            .trim()
            .to_ascii_uppercase()
    };

    match xtension.as_str() {
        "PRIMARY" | "IMAGE" => {
            if is_random_groups(&header) {
                warn!("unit {index}: random groups data is not supported, treating as empty");
                return Ok(empty(header));
            }
            if image::pixel_count(&image::axes(&header, "")?)? == 0 {
                return Ok(empty(header));
            }
            let array = image::decode(&header, data)?;
            Ok(Unit {
                index,
                kind: UnitKind::Image,
                header,
                payload: Some(Payload::Image(array)),
            })
        }
        "BINTABLE" if tiled::is_tiled(&header) => {
            let (image_header, array) = tiled::decode(&header, data)?;
            if array.is_empty() {
                return Ok(empty(image_header));
            }
            Ok(Unit {
                index,
                kind: UnitKind::Image,
                header: image_header,
                payload: Some(Payload::Image(array)),
            })
        }
        "BINTABLE" | "TABLE" => {
            let table = if xtension == "TABLE" {
                table::decode_ascii(&header, data)?
            } else {
                table::decode_binary(&header, data)?
            };
            if table.rows == 0 {
                return Ok(empty(header));
            }
            Ok(Unit {
                index,
                kind: UnitKind::Table,
                header,
                payload: Some(Payload::Table(table)),
            })
        }
        other => {
            warn!("unit {index}: unsupported extension type '{other}', treating as empty");
            Ok(empty(header))
        }
    }
}
