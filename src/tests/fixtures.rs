//! In-memory FITS files for the scenario tests.
//!
//! Headers are rendered with the library's own card formatting, so these
//! fixtures also check that rendered cards parse back.

use astro_explorer_lib::fits::{Card, Value};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;

const BLOCK: usize = 2880;

fn pad(bytes: &mut Vec<u8>, fill: u8) {
    let len = bytes.len().div_ceil(BLOCK) * BLOCK;
    bytes.resize(len, fill);
}

pub fn int(keyword: &str, value: i64) -> Card {
    Card::new(keyword, Value::Integer(value))
}

pub fn real(keyword: &str, value: f64) -> Card {
    Card::new(keyword, Value::Real(value))
}

pub fn text(keyword: &str, value: &str) -> Card {
    Card::new(keyword, Value::Text(value.to_string()))
}

pub fn logical(keyword: &str, value: bool) -> Card {
    Card::new(keyword, Value::Logical(value))
}

/// Concatenates header-data units into a container.
#[derive(Default)]
pub struct FitsBuilder {
    bytes: Vec<u8>,
}

impl FitsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unit(mut self, cards: &[Card], data: &[u8]) -> Self {
        let mut header = Vec::new();
        for card in cards {
            header.extend_from_slice(format!("{:<80}", card.to_string()).as_bytes());
        }
        header.extend_from_slice(format!("{:<80}", "END").as_bytes());
        pad(&mut header, b' ');
        self.bytes.extend_from_slice(&header);

        let mut data = data.to_vec();
        pad(&mut data, 0);
        self.bytes.extend_from_slice(&data);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }
}

/// Primary header with no data.
pub fn empty_primary() -> Vec<Card> {
    vec![
        logical("SIMPLE", true),
        int("BITPIX", 8),
        int("NAXIS", 0),
        logical("EXTEND", true),
    ]
}

/// 16-bit image cards and big-endian data, `pixels` in row-major order.
/// `extension` selects an IMAGE extension instead of a primary header.
pub fn image_i16(
    width: usize,
    height: usize,
    pixels: &[i16],
    extension: bool,
    extra: Vec<Card>,
) -> (Vec<Card>, Vec<u8>) {
    assert_eq!(pixels.len(), width * height);
    let mut cards = vec![
        if extension {
            text("XTENSION", "IMAGE")
        } else {
            logical("SIMPLE", true)
        },
        int("BITPIX", 16),
        int("NAXIS", 2),
        int("NAXIS1", width as i64),
        int("NAXIS2", height as i64),
    ];
    if extension {
        cards.push(int("PCOUNT", 0));
        cards.push(int("GCOUNT", 1));
    }
    cards.extend(extra);
    let data = pixels.iter().flat_map(|p| p.to_be_bytes()).collect();
    (cards, data)
}

/// Binary table of `D` (f64) columns.
pub fn double_table(columns: &[(&str, &[f64])]) -> (Vec<Card>, Vec<u8>) {
    let rows = columns.first().map_or(0, |(_, v)| v.len());
    let mut cards = vec![
        text("XTENSION", "BINTABLE"),
        int("BITPIX", 8),
        int("NAXIS", 2),
        int("NAXIS1", 8 * columns.len() as i64),
        int("NAXIS2", rows as i64),
        int("PCOUNT", 0),
        int("GCOUNT", 1),
        int("TFIELDS", columns.len() as i64),
    ];
    for (i, (name, _)) in columns.iter().enumerate() {
        cards.push(text(&format!("TTYPE{}", i + 1), name));
        cards.push(text(&format!("TFORM{}", i + 1), "D"));
    }
    let mut data = Vec::with_capacity(rows * 8 * columns.len());
    for row in 0..rows {
        for (_, values) in columns {
            data.extend_from_slice(&values[row].to_be_bytes());
        }
    }
    (cards, data)
}

pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

/// A tile-compressed image: one `1PB` column of per-tile byte streams.
pub fn tiled_image(
    algorithm: &str,
    zbitpix: i64,
    width: usize,
    height: usize,
    tiles: &[Vec<u8>],
    extra: Vec<Card>,
) -> (Vec<Card>, Vec<u8>) {
    let heap_len: usize = tiles.iter().map(Vec::len).sum();
    let max_len = tiles.iter().map(Vec::len).max().unwrap_or(0);
    let mut cards = vec![
        text("XTENSION", "BINTABLE"),
        int("BITPIX", 8),
        int("NAXIS", 2),
        int("NAXIS1", 8),
        int("NAXIS2", tiles.len() as i64),
        int("PCOUNT", heap_len as i64),
        int("GCOUNT", 1),
        int("TFIELDS", 1),
        text("TTYPE1", "COMPRESSED_DATA"),
        text("TFORM1", &format!("1PB({max_len})")),
        logical("ZIMAGE", true),
        text("ZCMPTYPE", algorithm),
        int("ZBITPIX", zbitpix),
        int("ZNAXIS", 2),
        int("ZNAXIS1", width as i64),
        int("ZNAXIS2", height as i64),
        int("ZTILE1", width as i64),
        int("ZTILE2", 1),
    ];
    cards.extend(extra);

    let mut data = Vec::new();
    let mut offset = 0;
    for tile in tiles {
        data.extend_from_slice(&(tile.len() as i32).to_be_bytes());
        data.extend_from_slice(&(offset as i32).to_be_bytes());
        offset += tile.len();
    }
    for tile in tiles {
        data.extend_from_slice(tile);
    }
    (cards, data)
}

/// `GZIP_1` compressed 16-bit image, one tile per row.
pub fn gzip_tiled_i16(width: usize, height: usize, pixels: &[i16], extra: Vec<Card>) -> (Vec<Card>, Vec<u8>) {
    let tiles: Vec<Vec<u8>> = pixels
        .chunks(width)
        .map(|row| gzip(&row.iter().flat_map(|p| p.to_be_bytes()).collect::<Vec<_>>()))
        .collect();
    tiled_image("GZIP_1", 16, width, height, &tiles, extra)
}

/// `RICE_1` 32-bit image of one row holding `[10, 11, 9]`.
pub fn rice_tiled_row() -> (Vec<Card>, Vec<u8>) {
    let stream = vec![0x00, 0x00, 0x00, 0x0A, 0x0C, 0x88];
    tiled_image(
        "RICE_1",
        32,
        3,
        1,
        &[stream],
        vec![
            text("ZNAME1", "BLOCKSIZE"),
            int("ZVAL1", 32),
            text("ZNAME2", "BYTEPIX"),
            int("ZVAL2", 4),
        ],
    )
}

/// Minimal TAN solution centred on `(ra, dec)` at 1 arcsec per pixel.
pub fn tan_wcs(ra: f64, dec: f64, crpix: (f64, f64)) -> Vec<Card> {
    vec![
        text("CTYPE1", "RA---TAN"),
        text("CTYPE2", "DEC--TAN"),
        real("CRVAL1", ra),
        real("CRVAL2", dec),
        real("CRPIX1", crpix.0),
        real("CRPIX2", crpix.1),
        real("CDELT1", -1.0 / 3600.0),
        real("CDELT2", 1.0 / 3600.0),
    ]
}
