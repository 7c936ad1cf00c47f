//! Format detection for Whole Slide Image files.
//!
//! Detection looks at the TIFF magic first and then at vendor markers in the
//! first IFD:
//!
//! - **Hamamatsu NDPI**: private tag 65420 is present
//! - **Aperio SVS**: ImageDescription contains "Aperio"
//! - **Generic Pyramidal TIFF**: anything else that parses as TIFF

use serde::Serialize;

use crate::error::FormatError;
use crate::io::RangeReader;

use super::tiff::{ByteOrder, Ifd, TiffHeader, TiffTag, TIFF_HEADER_SIZE};

// =============================================================================
// SlideFormat
// =============================================================================

/// Detected slide format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SlideFormat {
    /// Aperio SVS (JPEG tiles with shared JPEGTables)
    AperioSvs,

    /// Hamamatsu NDPI (stage offsets in private tags)
    HamamatsuNdpi,

    /// Generic pyramidal TIFF
    GenericTiff,
}

impl SlideFormat {
    /// Get a human-readable name for the format.
    pub const fn name(&self) -> &'static str {
        match self {
            SlideFormat::AperioSvs => "Aperio SVS",
            SlideFormat::HamamatsuNdpi => "Hamamatsu NDPI",
            SlideFormat::GenericTiff => "Generic Pyramidal TIFF",
        }
    }
}

// =============================================================================
// Format Detection
// =============================================================================

/// Maximum bytes of ImageDescription inspected for vendor markers.
const MAX_DESCRIPTION_BYTES: usize = 1024;

/// Marker string for Aperio SVS format.
const APERIO_MARKER: &[u8] = b"Aperio";

/// Classify a slide from an already parsed first IFD.
pub fn detect_format_from_ifd<R: RangeReader>(
    reader: &R,
    header: &TiffHeader,
    ifd: &Ifd,
) -> Result<SlideFormat, FormatError> {
    if ifd.has_tag(TiffTag::NdpiFormatFlag) {
        return Ok(SlideFormat::HamamatsuNdpi);
    }

    if let Some(description) = read_description_prefix(reader, ifd, header)? {
        if contains_aperio_marker(&description) {
            return Ok(SlideFormat::AperioSvs);
        }
    }

    Ok(SlideFormat::GenericTiff)
}

/// Read at most `MAX_DESCRIPTION_BYTES` of ImageDescription.
fn read_description_prefix<R: RangeReader>(
    reader: &R,
    ifd: &Ifd,
    header: &TiffHeader,
) -> Result<Option<Vec<u8>>, FormatError> {
    let Some(entry) = ifd.get_entry_by_tag(TiffTag::ImageDescription) else {
        return Ok(None);
    };

    let read_len = (entry.count as usize).min(MAX_DESCRIPTION_BYTES);
    if read_len == 0 {
        return Ok(None);
    }

    let bytes = if entry.is_inline {
        entry.value_offset_bytes[..read_len.min(entry.value_offset_bytes.len())].to_vec()
    } else {
        let offset = entry.value_offset(header.byte_order);
        reader.read_exact_at(offset, read_len)?.to_vec()
    };

    Ok(Some(bytes))
}

fn contains_aperio_marker(data: &[u8]) -> bool {
    data.windows(APERIO_MARKER.len())
        .any(|window| window == APERIO_MARKER)
}

/// Quick check for TIFF or BigTIFF magic and version.
pub fn is_tiff_header(bytes: &[u8]) -> bool {
    if bytes.len() < TIFF_HEADER_SIZE {
        return false;
    }

    let byte_order = match &bytes[0..2] {
        b"II" => ByteOrder::LittleEndian,
        b"MM" => ByteOrder::BigEndian,
        _ => return false,
    };

    matches!(byte_order.read_u16(&bytes[2..4]), 42 | 43)
}

// =============================================================================
// Tests
// =============================================================================
