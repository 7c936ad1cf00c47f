//! JPEG tile stream handling.
//!
//! # Abbreviated streams
//!
//! Aperio SVS and many pyramidal TIFF writers store each tile as an
//! "abbreviated" JPEG stream: the quantization (DQT) and Huffman (DHT) tables
//! are missing from the tile and live once in the level's `JPEGTables` tag.
//!
//! ```text
//! JPEGTables:  SOI  DQT  DHT  EOI
//! tile:        SOI  SOF  SOS  <scan>  EOI
//! merged:      SOI  DQT  DHT  SOF  SOS  <scan>  EOI
//! ```

use bytes::{Bytes, BytesMut};
use image::{ImageFormat, RgbImage};

// =============================================================================
// JPEG Markers
// =============================================================================

/// Start Of Image marker
pub const SOI: [u8; 2] = [0xFF, 0xD8];

/// End Of Image marker
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// Define Huffman Table marker byte
const DHT: u8 = 0xC4;

/// Define Quantization Table marker byte
const DQT: u8 = 0xDB;

/// Start Of Scan marker byte
const SOS: u8 = 0xDA;

/// Walk the marker segments that precede the first scan.
///
/// Yields marker bytes (the byte after 0xFF) and stops after SOS, at a
/// truncated segment, or at the first byte that is not a marker.
fn header_markers(data: &[u8]) -> impl Iterator<Item = u8> + '_ {
    let mut pos = 2;
    let mut done = data.len() < 4 || data[0..2] != SOI;

    std::iter::from_fn(move || {
        if done || pos + 1 >= data.len() || data[pos] != 0xFF {
            return None;
        }
        let marker = data[pos + 1];
        match marker {
            SOS => done = true,
            // Standalone markers carry no length.
            0x01 | 0xD0..=0xD9 => pos += 2,
            _ => {
                if pos + 3 >= data.len() {
                    done = true;
                } else {
                    let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
                    pos += 2 + length;
                }
            }
        }
        Some(marker)
    })
}

/// Whether the stream reaches its scan without defining any tables.
pub fn is_abbreviated_stream(data: &[u8]) -> bool {
    let mut has_tables = false;
    for marker in header_markers(data) {
        match marker {
            DQT | DHT => has_tables = true,
            SOS => return !has_tables,
            _ => {}
        }
    }
    false
}

/// Merge JPEGTables with an abbreviated tile stream.
///
/// The tables' trailing EOI and the tile's leading SOI are dropped so the
/// result is a single well-formed stream.
pub fn merge_jpeg_tables(tables: &[u8], tile_data: &[u8]) -> Bytes {
    if tables.is_empty() {
        return Bytes::copy_from_slice(tile_data);
    }
    if tile_data.is_empty() {
        return Bytes::new();
    }

    let tables = tables.strip_suffix(&EOI).unwrap_or(tables);
    let tile_data = tile_data.strip_prefix(&SOI).unwrap_or(tile_data);

    let mut merged = BytesMut::with_capacity(tables.len() + tile_data.len());
    merged.extend_from_slice(tables);
    merged.extend_from_slice(tile_data);
    merged.freeze()
}

/// Prepare tile data for decoding, merging tables if the tile needs them.
pub fn prepare_tile_jpeg(tables: Option<&[u8]>, tile_data: &[u8]) -> Bytes {
    match tables {
        Some(tables) if is_abbreviated_stream(tile_data) => merge_jpeg_tables(tables, tile_data),
        _ => Bytes::copy_from_slice(tile_data),
    }
}

/// Decode a (possibly abbreviated) JPEG tile to RGB.
pub fn decode_jpeg_tile(tables: Option<&[u8]>, tile_data: &[u8]) -> Result<RgbImage, String> {
    let stream = prepare_tile_jpeg(tables, tile_data);
    image::load_from_memory_with_format(&stream, ImageFormat::Jpeg)
        .map(|img| img.into_rgb8())
        .map_err(|e| e.to_string())
}

// =============================================================================
// Tests
// =============================================================================
