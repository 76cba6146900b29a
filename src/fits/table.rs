//! Table extensions: BINTABLE and ASCII `TABLE` data decoded into named columns.
//!
//! Scalar numeric and logical columns become [`ColumnData::Numeric`] with
//! `TSCALn`/`TZEROn` applied and `TNULLn` mapped to NaN. Character columns
//! become [`ColumnData::Text`]. Vector cells (repeat > 1, bit arrays, complex
//! values, and variable-length `P`/`Q` arrays) become [`ColumnData::Array`].

use super::{slice_at, FormatError, Header, Result};
use log::debug;
use serde::Serialize;

/// Decoded column values; every variant holds one entry per row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "values", rename_all = "snake_case")]
pub enum ColumnData {
    Numeric(Vec<f64>),
    Text(Vec<String>),
    Array(Vec<Vec<f64>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Text(v) => v.len(),
            ColumnData::Array(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_numeric(&self) -> Option<&[f64]> {
        match self {
            ColumnData::Numeric(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    /// The `TFORMn` code as written in the header.
    pub format: String,
    pub unit: Option<String>,
    pub data: ColumnData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub rows: usize,
    pub columns: Vec<Column>,
}

impl Table {
    /// Build a table, checking every column has the same number of rows.
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let rows = columns.first().map(|c| c.data.len()).unwrap_or(0);
        if let Some(bad) = columns.iter().find(|c| c.data.len() != rows) {
            return Err(FormatError::RaggedColumns {
                expected: rows,
                found: bad.data.len(),
            });
        }
        Ok(Self { rows, columns })
    }

    /// Column lookup: exact name first, then case-insensitive.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .or_else(|| self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name)))
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

// ---------------------------------------------------------------------------
// Binary table layout
// ---------------------------------------------------------------------------

/// Element type of a binary table field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TypeCode {
    Logical,
    Bit,
    Byte,
    Short,
    Int,
    Long,
    Char,
    Float,
    Double,
    ComplexFloat,
    ComplexDouble,
}

impl TypeCode {
    fn from_char(c: char) -> Option<Self> {
        Some(match c {
            'L' => Self::Logical,
            'X' => Self::Bit,
            'B' => Self::Byte,
            'I' => Self::Short,
            'J' => Self::Int,
            'K' => Self::Long,
            'A' => Self::Char,
            'E' => Self::Float,
            'D' => Self::Double,
            'C' => Self::ComplexFloat,
            'M' => Self::ComplexDouble,
            _ => return None,
        })
    }

    /// Bytes per element; bit arrays are sized separately.
    pub fn size(self) -> usize {
        match self {
            Self::Logical | Self::Bit | Self::Byte | Self::Char => 1,
            Self::Short => 2,
            Self::Int | Self::Float => 4,
            Self::Long | Self::Double | Self::ComplexFloat => 8,
            Self::ComplexDouble => 16,
        }
    }

    fn is_integer(self) -> bool {
        matches!(self, Self::Byte | Self::Short | Self::Int | Self::Long)
    }

    fn byte_len(self, count: usize) -> usize {
        match self {
            Self::Bit => count.div_ceil(8),
            other => other.size() * count,
        }
    }
}

/// Heap descriptor width: `P` (32-bit) or `Q` (64-bit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Descriptor {
    P,
    Q,
}

#[derive(Debug, Clone)]
pub(crate) struct Field {
    pub name: String,
    pub tform: String,
    pub unit: Option<String>,
    pub code: TypeCode,
    pub repeat: usize,
    pub descriptor: Option<Descriptor>,
    /// Byte offset within a row.
    pub offset: usize,
    pub scale: f64,
    pub zero: f64,
    pub null: Option<i64>,
}

impl Field {
    fn width(&self) -> usize {
        match self.descriptor {
            Some(Descriptor::P) => 8 * self.repeat.min(1),
            Some(Descriptor::Q) => 16 * self.repeat.min(1),
            None => self.code.byte_len(self.repeat),
        }
    }
}

/// A variable-length array cell located in the heap.
#[derive(Debug, Clone, Copy)]
pub(crate) struct VarCell<'a> {
    pub bytes: &'a [u8],
    pub count: usize,
    pub code: TypeCode,
}

impl VarCell<'_> {
    /// Elements as unscaled floats.
    pub fn values(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.count);
        push_elements(self.code, self.bytes, self.count, &mut out);
        out
    }
}

/// Row layout of a BINTABLE extension plus the location of its heap.
#[derive(Debug, Clone)]
pub(crate) struct BinLayout {
    pub row_len: usize,
    pub rows: usize,
    pub fields: Vec<Field>,
    heap_start: usize,
    heap_len: usize,
}

/// Split a `TFORMn` value such as `1J`, `20A`, `1PB(2000)` or `QD`.
fn parse_tform(tform: &str) -> Result<(usize, TypeCode, Option<Descriptor>)> {
    let trimmed = tform.trim();
    let digits_end = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| FormatError::ColumnFormat(tform.to_string()))?;
    let repeat = if digits_end == 0 {
        1
    } else {
        trimmed[..digits_end]
            .parse()
            .map_err(|_| FormatError::ColumnFormat(tform.to_string()))?
    };

    let mut chars = trimmed[digits_end..].chars();
    let head = chars
        .next()
        .ok_or_else(|| FormatError::ColumnFormat(tform.to_string()))?;
    let (descriptor, code_char) = match head {
        'P' => (Some(Descriptor::P), chars.next()),
        'Q' => (Some(Descriptor::Q), chars.next()),
        other => (None, Some(other)),
    };
    let code = code_char
        .and_then(TypeCode::from_char)
        .ok_or_else(|| FormatError::ColumnFormat(tform.to_string()))?;
    Ok((repeat, code, descriptor))
}

impl BinLayout {
    pub fn from_header(header: &Header) -> Result<Self> {
        let row_len = usize_key(header, "NAXIS1")?;
        let rows = usize_key(header, "NAXIS2")?;
        let tfields = usize_key(header, "TFIELDS")?;
        let pcount = header.get_i64("PCOUNT").unwrap_or(0).max(0) as usize;

        let mut fields = Vec::with_capacity(tfields);
        let mut offset = 0;
        for i in 1..=tfields {
            let tform_key = format!("TFORM{i}");
            let tform = header
                .get_str(&tform_key)
                .ok_or(FormatError::MissingKeyword(tform_key))?
                .to_string();
            let (repeat, code, descriptor) = parse_tform(&tform)?;
            let field = Field {
                name: header
                    .get_str(&format!("TTYPE{i}"))
                    .map(|s| s.trim().to_string())
                    .unwrap_or_else(|| format!("COL{i}")),
                tform,
                unit: header.get_str(&format!("TUNIT{i}")).map(str::to_string),
                code,
                repeat,
                descriptor,
                offset,
                scale: header.get_f64(&format!("TSCAL{i}")).unwrap_or(1.0),
                zero: header.get_f64(&format!("TZERO{i}")).unwrap_or(0.0),
                null: header.get_i64(&format!("TNULL{i}")),
            };
            offset += field.width();
            fields.push(field);
        }

        if offset > row_len {
            return Err(FormatError::invalid("NAXIS1", row_len));
        }

        let main_len = row_len * rows;
        let heap_start = header
            .get_i64("THEAP")
            .map(|t| t.max(0) as usize)
            .unwrap_or(main_len);
        let heap_len = (main_len + pcount).saturating_sub(heap_start);

        Ok(Self {
            row_len,
            rows,
            fields,
            heap_start,
            heap_len,
        })
    }

    /// Bytes available to variable-length cells.
    pub fn heap_len(&self) -> usize {
        self.heap_len
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
    }

    fn cell<'a>(&self, data: &'a [u8], row: usize, field: &Field) -> Result<&'a [u8]> {
        slice_at(
            data,
            row * self.row_len + field.offset,
            field.width(),
            "table row",
        )
    }

    /// First element of a fixed-width numeric cell, unscaled.
    pub fn scalar(&self, data: &[u8], row: usize, index: usize) -> Result<Option<f64>> {
        let field = &self.fields[index];
        if field.descriptor.is_some() || field.repeat == 0 || field.code == TypeCode::Char {
            return Ok(None);
        }
        let raw = self.cell(data, row, field)?;
        let mut out = Vec::with_capacity(1);
        push_elements(field.code, raw, 1, &mut out);
        Ok(out.first().copied())
    }

    /// Resolve a `P`/`Q` descriptor into its heap bytes.
    pub fn var_cell<'a>(&self, data: &'a [u8], row: usize, index: usize) -> Result<VarCell<'a>> {
        let field = &self.fields[index];
        let raw = self.cell(data, row, field)?;
        let (count, offset) = match field.descriptor {
            Some(Descriptor::P) => (
                u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize,
                u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]) as usize,
            ),
            Some(Descriptor::Q) => {
                let mut n = [0u8; 8];
                let mut o = [0u8; 8];
                n.copy_from_slice(&raw[..8]);
                o.copy_from_slice(&raw[8..16]);
                (u64::from_be_bytes(n) as usize, u64::from_be_bytes(o) as usize)
            }
            None => return Err(FormatError::ColumnFormat(field.tform.clone())),
        };
        let len = field.code.byte_len(count);
        if offset.saturating_add(len) > self.heap_len {
            return Err(FormatError::Truncated {
                what: "table heap",
                offset: self.heap_start + offset,
                needed: len,
                available: self.heap_len.saturating_sub(offset),
            });
        }
        let bytes = slice_at(data, self.heap_start + offset, len, "table heap")?;
        Ok(VarCell {
            bytes,
            count,
            code: field.code,
        })
    }

    fn decode_column(&self, data: &[u8], field: &Field, index: usize) -> Result<ColumnData> {
        if field.code == TypeCode::Char && field.descriptor.is_none() {
            let mut values = Vec::with_capacity(self.rows);
            for row in 0..self.rows {
                values.push(text_cell(self.cell(data, row, field)?));
            }
            return Ok(ColumnData::Text(values));
        }

        let scalar = field.descriptor.is_none()
            && field.repeat == 1
            && !matches!(
                field.code,
                TypeCode::Bit | TypeCode::ComplexFloat | TypeCode::ComplexDouble
            );

        if scalar {
            let mut values = Vec::with_capacity(self.rows);
            for row in 0..self.rows {
                let raw = self.cell(data, row, field)?;
                values.push(scaled_element(field, raw));
            }
            return Ok(ColumnData::Numeric(values));
        }

        let mut values = Vec::with_capacity(self.rows);
        for row in 0..self.rows {
            let elements = if field.descriptor.is_some() {
                let cell = self.var_cell(data, row, index)?;
                scale_all(field, cell.values())
            } else {
                let raw = self.cell(data, row, field)?;
                let mut out = Vec::with_capacity(field.repeat);
                push_elements(field.code, raw, field.repeat, &mut out);
                scale_all(field, out)
            };
            values.push(elements);
        }
        Ok(ColumnData::Array(values))
    }
}

fn usize_key(header: &Header, key: &str) -> Result<usize> {
    let v = header.require_i64(key)?;
    usize::try_from(v).map_err(|_| FormatError::invalid(key, v))
}

fn text_cell(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).trim_end().to_string()
}

/// Append `count` big-endian elements of `code` read from `raw`.
fn push_elements(code: TypeCode, raw: &[u8], count: usize, out: &mut Vec<f64>) {
    match code {
        TypeCode::Bit => {
            for i in 0..count {
                let byte = raw.get(i / 8).copied().unwrap_or(0);
                out.push(((byte >> (7 - (i % 8))) & 1) as f64);
            }
        }
        TypeCode::Logical => out.extend(raw.iter().take(count).map(|&b| match b {
            b'T' => 1.0,
            b'F' => 0.0,
            _ => f64::NAN,
        })),
        TypeCode::Byte | TypeCode::Char => out.extend(raw.iter().take(count).map(|&b| b as f64)),
        TypeCode::Short => out.extend(
            raw.chunks_exact(2)
                .take(count)
                .map(|c| i16::from_be_bytes([c[0], c[1]]) as f64),
        ),
        TypeCode::Int => out.extend(
            raw.chunks_exact(4)
                .take(count)
                .map(|c| i32::from_be_bytes([c[0], c[1], c[2], c[3]]) as f64),
        ),
        TypeCode::Long => out.extend(raw.chunks_exact(8).take(count).map(|c| {
            let mut b = [0u8; 8];
            b.copy_from_slice(c);
            i64::from_be_bytes(b) as f64
        })),
        TypeCode::Float | TypeCode::ComplexFloat => {
            let n = if code == TypeCode::ComplexFloat { count * 2 } else { count };
            out.extend(
                raw.chunks_exact(4)
                    .take(n)
                    .map(|c| f32::from_be_bytes([c[0], c[1], c[2], c[3]]) as f64),
            )
        }
        TypeCode::Double | TypeCode::ComplexDouble => {
            let n = if code == TypeCode::ComplexDouble { count * 2 } else { count };
            out.extend(raw.chunks_exact(8).take(n).map(|c| {
                let mut b = [0u8; 8];
                b.copy_from_slice(c);
                f64::from_be_bytes(b)
            }))
        }
    }
}

fn integer_element(code: TypeCode, raw: &[u8]) -> Option<i64> {
    Some(match code {
        TypeCode::Byte => raw[0] as i64,
        TypeCode::Short => i16::from_be_bytes([raw[0], raw[1]]) as i64,
        TypeCode::Int => i32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as i64,
        TypeCode::Long => {
            let mut b = [0u8; 8];
            b.copy_from_slice(&raw[..8]);
            i64::from_be_bytes(b)
        }
        _ => return None,
    })
}

fn scaled_element(field: &Field, raw: &[u8]) -> f64 {
    if field.code.is_integer() {
        if let (Some(v), Some(null)) = (integer_element(field.code, raw), field.null) {
            if v == null {
                return f64::NAN;
            }
        }
    }
    let mut out = Vec::with_capacity(1);
    push_elements(field.code, raw, 1, &mut out);
    let v = out.first().copied().unwrap_or(f64::NAN);
    if field.code == TypeCode::Logical {
        v
    } else {
        v * field.scale + field.zero
    }
}

fn scale_all(field: &Field, values: Vec<f64>) -> Vec<f64> {
    if matches!(field.code, TypeCode::Logical | TypeCode::Bit)
        || (field.scale == 1.0 && field.zero == 0.0)
    {
        return values;
    }
    values
        .into_iter()
        .map(|v| v * field.scale + field.zero)
        .collect()
}

/// Decode a BINTABLE data unit.
pub(crate) fn decode_binary(header: &Header, data: &[u8]) -> Result<Table> {
    let layout = BinLayout::from_header(header)?;
    debug!(
        "decoding binary table: {} rows x {} columns, row length {}",
        layout.rows,
        layout.fields.len(),
        layout.row_len
    );
    let mut columns = Vec::with_capacity(layout.fields.len());
    for (index, field) in layout.fields.iter().enumerate() {
        columns.push(Column {
            name: field.name.clone(),
            format: field.tform.clone(),
            unit: field.unit.clone(),
            data: layout.decode_column(data, field, index)?,
        });
    }
    Table::new(columns)
}

// ---------------------------------------------------------------------------
// ASCII tables
// ---------------------------------------------------------------------------

/// Decode an ASCII `TABLE` data unit. Fields are located by `TBCOLn` and
/// parsed as text (`Aw`) or numbers (`Iw`, `Fw.d`, `Ew.d`, `Dw.d`).
pub(crate) fn decode_ascii(header: &Header, data: &[u8]) -> Result<Table> {
    let row_len = usize_key(header, "NAXIS1")?;
    let rows = usize_key(header, "NAXIS2")?;
    let tfields = usize_key(header, "TFIELDS")?;
    debug!("decoding ASCII table: {rows} rows x {tfields} columns");

    let mut columns = Vec::with_capacity(tfields);
    for i in 1..=tfields {
        let tform_key = format!("TFORM{i}");
        let tform = header
            .get_str(&tform_key)
            .ok_or(FormatError::MissingKeyword(tform_key))?
            .trim()
            .to_string();
        let start = usize_key(header, &format!("TBCOL{i}"))?
            .checked_sub(1)
            .ok_or_else(|| FormatError::invalid(format!("TBCOL{i}"), 0))?;
        let code = tform
            .chars()
            .next()
            .ok_or_else(|| FormatError::ColumnFormat(tform.clone()))?;
        let width: usize = tform[1..]
            .split('.')
            .next()
            .and_then(|w| w.parse().ok())
            .ok_or_else(|| FormatError::ColumnFormat(tform.clone()))?;
        if start + width > row_len {
            return Err(FormatError::invalid(format!("TBCOL{i}"), start + 1));
        }

        let scale = header.get_f64(&format!("TSCAL{i}")).unwrap_or(1.0);
        let zero = header.get_f64(&format!("TZERO{i}")).unwrap_or(0.0);
        let null = header.get_str(&format!("TNULL{i}")).map(str::trim);

        let cells = (0..rows).map(|row| slice_at(data, row * row_len + start, width, "table row"));
        let column_data = match code {
            'A' => ColumnData::Text(
                cells
                    .map(|c| c.map(text_cell))
                    .collect::<Result<Vec<_>>>()?,
            ),
            'I' | 'F' | 'E' | 'D' => {
                let mut values = Vec::with_capacity(rows);
                for cell in cells {
                    let text = String::from_utf8_lossy(cell?).trim().to_string();
                    let value = if text.is_empty() || Some(text.as_str()) == null {
                        f64::NAN
                    } else {
                        text.replace(['D', 'd'], "E")
                            .parse::<f64>()
                            .map(|v| v * scale + zero)
                            .unwrap_or(f64::NAN)
                    };
                    values.push(value);
                }
                ColumnData::Numeric(values)
            }
            _ => return Err(FormatError::ColumnFormat(tform)),
        };

        columns.push(Column {
            name: header
                .get_str(&format!("TTYPE{i}"))
                .map(|s| s.trim().to_string())
                .unwrap_or_else(|| format!("COL{i}")),
            format: tform,
            unit: header.get_str(&format!("TUNIT{i}")).map(str::to_string),
            data: column_data,
        });
    }
    Table::new(columns)
}
