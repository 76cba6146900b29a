//! Rice (`RICE_1`) tile decoding.
//!
//! Stream layout: the first pixel as a raw big-endian value of `bytepix`
//! bytes, then blocks of `blocksize` pixels. Each block starts with an
//! `fsbits`-wide field holding `fs + 1`:
//!
//! - `fs < 0`: every pixel in the block repeats the previous one
//! - `fs == fsmax`: differences are stored raw, `bbits` wide
//! - otherwise: unary high part, then `fs` low bits
//!
//! Differences are zig-zag mapped (even → `v >> 1`, odd → `!(v >> 1)`).

use super::{FormatError, Result};

/// Bit-level reader over a byte slice, most significant bit first.
struct BitReader<'a> {
    data: &'a [u8],
    bit: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, bit: 0 }
    }

    fn next_bit(&mut self) -> Result<u32> {
        let byte = self
            .data
            .get(self.bit / 8)
            .ok_or_else(|| FormatError::compression("rice stream ended early"))?;
        let value = (byte >> (7 - (self.bit % 8))) & 1;
        self.bit += 1;
        Ok(value as u32)
    }

    fn read(&mut self, n: usize) -> Result<u32> {
        let mut value = 0u32;
        for _ in 0..n {
            value = (value << 1) | self.next_bit()?;
        }
        Ok(value)
    }

    /// Count zero bits up to and including the terminating one bit.
    fn unary(&mut self) -> Result<u32> {
        let mut zeros = 0u32;
        while self.next_bit()? == 0 {
            zeros += 1;
            if zeros > 32 {
                return Err(FormatError::compression("rice code run too long"));
            }
        }
        Ok(zeros)
    }
}

/// Per-width coding parameters: `(fsbits, fsmax, bbits)`.
fn parameters(bytepix: usize) -> Result<(usize, i32, usize)> {
    match bytepix {
        1 => Ok((3, 6, 8)),
        2 => Ok((4, 14, 16)),
        4 => Ok((5, 25, 32)),
        other => Err(FormatError::compression(format!(
            "unsupported rice BYTEPIX {other}"
        ))),
    }
}

fn unmap(mapped: u32) -> i32 {
    if mapped & 1 == 0 {
        (mapped >> 1) as i32
    } else {
        !((mapped >> 1) as i32)
    }
}

/// Narrow an accumulated pixel to the output width. One-byte pixels are
/// unsigned, wider ones signed.
fn narrow(value: i32, bytepix: usize) -> i64 {
    match bytepix {
        1 => value as u8 as i64,
        2 => value as i16 as i64,
        _ => value as i64,
    }
}

/// Decode `count` pixels from a Rice stream.
pub(crate) fn decode(
    stream: &[u8],
    count: usize,
    blocksize: usize,
    bytepix: usize,
) -> Result<Vec<i64>> {
    let (fsbits, fsmax, bbits) = parameters(bytepix)?;
    if count == 0 {
        return Ok(Vec::new());
    }
    if blocksize == 0 {
        return Err(FormatError::compression("rice BLOCKSIZE must be positive"));
    }
    let head = stream
        .get(..bytepix)
        .ok_or_else(|| FormatError::compression("rice stream shorter than first pixel"))?;
    let mut last = head.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32) as i32;

    let mut reader = BitReader::new(&stream[bytepix..]);
    let mut out = Vec::with_capacity(count);

    while out.len() < count {
        let block = (count - out.len()).min(blocksize);
        let fs = reader.read(fsbits)? as i32 - 1;

        for _ in 0..block {
            if fs >= 0 {
                let mapped = if fs == fsmax {
                    reader.read(bbits)?
                } else {
                    let high = reader.unary()?;
                    let low = reader.read(fs as usize)?;
                    high.checked_shl(fs as u32)
                        .ok_or_else(|| FormatError::compression("rice value overflow"))?
                        | low
                };
                last = last.wrapping_add(unmap(mapped));
            }
            out.push(narrow(last, bytepix));
        }
    }
    Ok(out)
}
