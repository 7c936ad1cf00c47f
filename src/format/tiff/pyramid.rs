//! TIFF pyramid level identification.
//!
//! A slide file holds more IFDs than pyramid levels: labels, macro overviews
//! and thumbnails live in the same chain.
//!
//! # Identification
//!
//! 1. Only tiled IFDs with TileOffsets/TileByteCounts are candidates
//! 2. The largest candidate is level 0
//! 3. Other candidates are kept when their aspect ratio matches level 0 and
//!    their downsample is close to a power of two
//!
//! Labels and macro images have a different aspect ratio than the scan area,
//! which is what separates them from real levels.

use std::collections::HashSet;

use bytes::Bytes;
use tracing::debug;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{ByteOrder, Ifd, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};
use super::tags::TiffTag;
use super::values::ValueReader;

// =============================================================================
// Constants
// =============================================================================

/// Maximum number of IFDs to follow in the chain
const MAX_IFDS: usize = 100;

/// Relative aspect ratio difference tolerated between a level and level 0
const ASPECT_TOLERANCE: f64 = 0.1;

/// Relative difference tolerated between a downsample and its power of two
const DOWNSAMPLE_TOLERANCE: f64 = 0.2;

// =============================================================================
// PyramidLevel
// =============================================================================

/// A single level in the image pyramid.
#[derive(Debug, Clone)]
pub struct PyramidLevel {
    /// Index of this level in the pyramid (0 = highest resolution)
    pub level_index: usize,

    /// Index of the IFD in the file's IFD chain
    pub ifd_index: usize,

    /// Image width in pixels
    pub width: u32,

    /// Image height in pixels
    pub height: u32,

    pub tile_width: u32,
    pub tile_height: u32,

    /// Number of tiles in X direction
    pub tiles_x: u32,

    /// Number of tiles in Y direction
    pub tiles_y: u32,

    /// Downsample factor relative to level 0, averaged over both axes
    pub downsample: f64,

    /// Raw compression value (7 = JPEG, 1 = none)
    pub compression: u16,

    /// The parsed IFD for this level
    pub ifd: Ifd,
}

impl PyramidLevel {
    /// Create a PyramidLevel from a parsed IFD.
    ///
    /// Returns None if the IFD lacks tile geometry or tile location tags.
    fn from_ifd(ifd: Ifd, ifd_index: usize, byte_order: ByteOrder) -> Option<Self> {
        let tile_width = ifd.tile_width(byte_order).filter(|&w| w > 0)?;
        let tile_height = ifd.tile_height(byte_order).filter(|&h| h > 0)?;
        let width = ifd.image_width(byte_order).filter(|&w| w > 0)?;
        let height = ifd.image_height(byte_order).filter(|&h| h > 0)?;

        if !ifd.has_tag(TiffTag::TileOffsets) || !ifd.has_tag(TiffTag::TileByteCounts) {
            return None;
        }

        // Compression defaults to none per the TIFF baseline.
        let compression = ifd.compression(byte_order).unwrap_or(1);

        Some(PyramidLevel {
            level_index: 0,
            ifd_index,
            width,
            height,
            tile_width,
            tile_height,
            tiles_x: width.div_ceil(tile_width),
            tiles_y: height.div_ceil(tile_height),
            downsample: 1.0,
            compression,
            ifd,
        })
    }

    /// Total number of tiles.
    pub fn tile_count(&self) -> u32 {
        self.tiles_x * self.tiles_y
    }

    /// Row-major tile index for a tile coordinate, None when out of bounds.
    pub fn tile_index(&self, tile_x: u32, tile_y: u32) -> Option<u32> {
        if tile_x >= self.tiles_x || tile_y >= self.tiles_y {
            return None;
        }
        Some(tile_y * self.tiles_x + tile_x)
    }

    fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

// =============================================================================
// TiffPyramid
// =============================================================================

/// A parsed TIFF image pyramid.
#[derive(Debug, Clone)]
pub struct TiffPyramid {
    /// The TIFF header
    pub header: TiffHeader,

    /// Pyramid levels, sorted by resolution (0 = highest)
    pub levels: Vec<PyramidLevel>,

    /// Every IFD of the file in chain order
    pub ifds: Vec<Ifd>,
}

impl TiffPyramid {
    /// Parse a TIFF file and identify its pyramid levels.
    pub fn parse<R: RangeReader>(reader: &R) -> Result<Self, TiffError> {
        let header_len = BIGTIFF_HEADER_SIZE.min(reader.size() as usize);
        if header_len < TIFF_HEADER_SIZE {
            return Err(TiffError::FileTooSmall {
                required: TIFF_HEADER_SIZE as u64,
                actual: reader.size(),
            });
        }
        let header_bytes = reader.read_exact_at(0, header_len)?;
        let header = TiffHeader::parse(&header_bytes, reader.size())?;

        let ifds = Self::parse_all_ifds(reader, &header)?;
        let levels = Self::identify_levels(&header, &ifds);

        debug!(
            "{}: {} IFD(s), {} pyramid level(s)",
            reader.identifier(),
            ifds.len(),
            levels.len()
        );

        Ok(TiffPyramid {
            header,
            levels,
            ifds,
        })
    }

    /// Parse all IFDs following the next-IFD chain.
    fn parse_all_ifds<R: RangeReader>(
        reader: &R,
        header: &TiffHeader,
    ) -> Result<Vec<Ifd>, TiffError> {
        let mut ifds = Vec::new();
        let mut visited = HashSet::new();
        let mut offset = header.first_ifd_offset;

        while offset != 0 && ifds.len() < MAX_IFDS {
            if !visited.insert(offset) {
                return Err(TiffError::CorruptIfd {
                    offset,
                    message: "IFD chain loops back on itself".to_string(),
                });
            }

            let count_bytes = reader.read_exact_at(offset, header.ifd_count_size())?;
            let entry_count = header.read_entry_count(&count_bytes);
            if entry_count > super::parser::MAX_IFD_ENTRIES {
                return Err(TiffError::CorruptIfd {
                    offset,
                    message: format!("implausible entry count {entry_count}"),
                });
            }

            let ifd_size = Ifd::calculate_size(entry_count, header);
            let ifd_bytes = reader.read_exact_at(offset, ifd_size)?;
            let ifd = Ifd::parse(&ifd_bytes, header)?;

            offset = ifd.next_ifd_offset;
            ifds.push(ifd);
        }

        Ok(ifds)
    }

    /// Pick the IFDs that form a consistent pyramid.
    fn identify_levels(header: &TiffHeader, ifds: &[Ifd]) -> Vec<PyramidLevel> {
        let mut candidates: Vec<PyramidLevel> = ifds
            .iter()
            .enumerate()
            .filter_map(|(idx, ifd)| PyramidLevel::from_ifd(ifd.clone(), idx, header.byte_order))
            .collect();

        // Largest area first; the stable sort keeps chain order for ties.
        candidates.sort_by_key(|l| std::cmp::Reverse(l.width as u64 * l.height as u64));

        let mut candidates = candidates.into_iter();
        let Some(base) = candidates.next() else {
            return Vec::new();
        };

        let base_aspect = base.aspect_ratio();
        let (base_width, base_height) = (base.width as f64, base.height as f64);
        let mut levels = vec![base];

        for mut level in candidates {
            let aspect_delta = (level.aspect_ratio() - base_aspect).abs() / base_aspect;
            if aspect_delta > ASPECT_TOLERANCE {
                debug!(
                    "IFD {} ({}x{}) skipped: aspect ratio differs from level 0",
                    level.ifd_index, level.width, level.height
                );
                continue;
            }

            let downsample =
                (base_width / level.width as f64 + base_height / level.height as f64) / 2.0;
            if !is_power_of_two_downsample(downsample) {
                continue;
            }
            if let Some(previous) = levels.last() {
                if (previous.downsample - downsample).abs() < 0.5 {
                    continue;
                }
            }

            level.level_index = levels.len();
            level.downsample = downsample;
            levels.push(level);
        }

        levels
    }

    /// Get the number of pyramid levels.
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Get a pyramid level by index.
    pub fn get_level(&self, level: usize) -> Option<&PyramidLevel> {
        self.levels.get(level)
    }

    /// Get dimensions of the base level.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.levels.first().map(|l| (l.width, l.height))
    }

    /// The first IFD of the file, where vendors put slide-wide metadata.
    pub fn first_ifd(&self) -> Option<&Ifd> {
        self.ifds.first()
    }

    /// Whether any image in the file is organized in strips.
    pub fn has_stripped_images(&self) -> bool {
        self.ifds.iter().any(Ifd::is_stripped)
    }
}

/// Whether `downsample` is within tolerance of a power of two >= 2.
fn is_power_of_two_downsample(downsample: f64) -> bool {
    let rounded = downsample.log2().round();
    if rounded < 1.0 {
        return false;
    }
    let ratio = downsample / 2f64.powf(rounded);
    (1.0 - DOWNSAMPLE_TOLERANCE..1.0 + DOWNSAMPLE_TOLERANCE).contains(&ratio)
}

// =============================================================================
// Tile Data Loading
// =============================================================================

/// Tile locations and shared JPEG tables of one pyramid level.
#[derive(Debug, Clone)]
pub struct TileData {
    /// Byte offset of each tile in the file
    pub offsets: Vec<u64>,

    /// Byte count (size) of each tile
    pub byte_counts: Vec<u64>,

    /// JPEGTables data (if present)
    pub jpeg_tables: Option<Bytes>,
}

impl TileData {
    /// Load tile data for a pyramid level.
    pub fn load<R: RangeReader>(
        reader: &R,
        level: &PyramidLevel,
        header: &TiffHeader,
    ) -> Result<Self, TiffError> {
        let values = ValueReader::new(reader, header);

        let offsets = level
            .ifd
            .get_entry_by_tag(TiffTag::TileOffsets)
            .ok_or(TiffError::MissingTag("TileOffsets"))
            .and_then(|entry| values.read_u64_array(entry))?;

        let byte_counts = level
            .ifd
            .get_entry_by_tag(TiffTag::TileByteCounts)
            .ok_or(TiffError::MissingTag("TileByteCounts"))
            .and_then(|entry| values.read_u64_array(entry))?;

        let expected = level.tile_count() as usize;
        if offsets.len() < expected || byte_counts.len() < expected {
            return Err(TiffError::InvalidTagValue {
                tag: "TileOffsets",
                message: format!(
                    "level {} needs {} tiles, found {} offsets and {} byte counts",
                    level.level_index,
                    expected,
                    offsets.len(),
                    byte_counts.len()
                ),
            });
        }

        let jpeg_tables = match level.ifd.get_entry_by_tag(TiffTag::JpegTables) {
            Some(entry) => Some(values.read_bytes(entry)?),
            None => None,
        };

        Ok(TileData {
            offsets,
            byte_counts,
            jpeg_tables,
        })
    }

    /// Offset and size of a tile by index.
    pub fn get_tile_location(&self, tile_index: u32) -> Option<(u64, u64)> {
        let idx = tile_index as usize;
        Some((*self.offsets.get(idx)?, *self.byte_counts.get(idx)?))
    }
}

// =============================================================================
// Tests
// =============================================================================
