//! Pyramidal TIFF slide source.
//!
//! Reads tiled levels of Aperio SVS, Hamamatsu NDPI and generic pyramidal
//! TIFF files. Regions are composited from the decoded tiles they overlap;
//! decoded tiles are kept in a [`DecodedTileCache`].
//!
//! # Supported tiles
//!
//! - JPEG (7), including abbreviated streams with shared JPEGTables
//! - Uncompressed (1), 8-bit chunky gray or RGB
//!
//! Strip-organized files are rejected. Most NDPI files store their levels as
//! strips and therefore need converting to tiled TIFF first.

use std::path::Path;
use std::sync::Arc;

use image::{GrayImage, Rgba, RgbImage, RgbaImage};
use tracing::{debug, info, warn};

use crate::coords::SlideCalibration;
use crate::error::{FormatError, SlideError, TiffError};
use crate::format::tiff::{
    Compression, Ifd, PyramidLevel, TiffPyramid, TiffTag, TileData, ValueReader,
    BIGTIFF_HEADER_SIZE,
};
use crate::format::{
    decode_jpeg_tile, detect_format_from_ifd, is_tiff_header, mpp_from_resolution, SlideFormat,
    SlideMetadata,
};
use crate::geometry::{Point, Size};
use crate::io::{FileRangeReader, RangeReader};

use super::tile_cache::{DecodedTileCache, TileKey};
use super::SlideSource;

/// ResolutionUnit default per the TIFF baseline (inch).
const DEFAULT_RESOLUTION_UNIT: u16 = 2;

/// One pyramid level with its tile locations.
#[derive(Debug, Clone)]
struct TiffLevel {
    level: PyramidLevel,
    tile_data: TileData,
    compression: Compression,
    samples_per_pixel: u16,
}

/// A slide backed by a pyramidal TIFF file.
pub struct TiffSlide<R: RangeReader = FileRangeReader> {
    reader: R,
    format: SlideFormat,
    metadata: SlideMetadata,
    levels: Vec<TiffLevel>,
    mpp: Option<(f64, f64)>,
    offset: (i64, i64),
    tile_cache: DecodedTileCache,
}

impl<R: RangeReader> std::fmt::Debug for TiffSlide<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiffSlide")
            .field("identifier", &self.reader.identifier())
            .field("format", &self.format)
            .field("levels", &self.levels.len())
            .field("mpp", &self.mpp)
            .field("offset", &self.offset)
            .finish()
    }
}

impl TiffSlide<FileRangeReader> {
    /// Open a slide file from disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SlideError> {
        let reader = FileRangeReader::open(path)?;
        Self::from_reader(reader)
    }
}

impl<R: RangeReader> TiffSlide<R> {
    /// Parse the TIFF structure behind `reader`.
    pub fn from_reader(reader: R) -> Result<Self, SlideError> {
        let header_len = BIGTIFF_HEADER_SIZE.min(reader.size() as usize);
        let magic = reader.read_exact_at(0, header_len)?;
        if !is_tiff_header(&magic) {
            return Err(FormatError::UnsupportedFormat {
                reason: format!("{} is not a TIFF file", reader.identifier()),
            }
            .into());
        }

        let pyramid = TiffPyramid::parse(&reader)?;
        if pyramid.levels.is_empty() {
            if pyramid.has_stripped_images() {
                return Err(TiffError::StripOrganization.into());
            }
            return Err(SlideError::NoLevels(reader.identifier().to_string()));
        }

        let format = match pyramid.first_ifd() {
            Some(ifd) => detect_format_from_ifd(&reader, &pyramid.header, ifd)?,
            None => SlideFormat::GenericTiff,
        };

        let values = ValueReader::new(&reader, &pyramid.header);
        let base_ifd = &pyramid.levels[0].ifd;

        let metadata = match base_ifd.get_entry_by_tag(TiffTag::ImageDescription) {
            Some(entry) => SlideMetadata::parse_description(&values.read_string(entry)?),
            None => SlideMetadata::default(),
        };

        let mpp = match metadata.mpp {
            Some(mpp) => Some((mpp, mpp)),
            None => resolution_mpp(&values, base_ifd)?,
        };

        let offset = (
            read_offset(&values, base_ifd, TiffTag::NdpiXOffsetFromSlideCentre),
            read_offset(&values, base_ifd, TiffTag::NdpiYOffsetFromSlideCentre),
        );

        let levels = pyramid
            .levels
            .iter()
            .map(|level| load_level(&reader, &pyramid, level))
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            slide = reader.identifier(),
            format = format.name(),
            levels = levels.len(),
            width = levels[0].level.width,
            height = levels[0].level.height,
            "Opened slide"
        );

        Ok(Self {
            reader,
            format,
            metadata,
            levels,
            mpp,
            offset,
            tile_cache: DecodedTileCache::new(),
        })
    }

    /// Replace the decoded-tile cache with one of `max_bytes` capacity.
    pub fn with_tile_cache_capacity(mut self, max_bytes: usize) -> Self {
        self.tile_cache = DecodedTileCache::with_capacity(max_bytes);
        self
    }

    pub fn format(&self) -> SlideFormat {
        self.format
    }

    pub fn metadata(&self) -> &SlideMetadata {
        &self.metadata
    }

    pub fn tile_cache(&self) -> &DecodedTileCache {
        &self.tile_cache
    }

    /// Tile size of a level.
    pub fn tile_size(&self, level: u32) -> Option<(u32, u32)> {
        self.levels
            .get(level as usize)
            .map(|l| (l.level.tile_width, l.level.tile_height))
    }

    /// Decoded tile, from the cache when possible.
    fn tile(&mut self, level: u32, tile_x: u32, tile_y: u32) -> Result<Arc<RgbImage>, SlideError> {
        let key = TileKey::new(level, tile_x, tile_y);
        if let Some(tile) = self.tile_cache.get(&key) {
            return Ok(tile);
        }

        let info = &self.levels[level as usize];
        let tile_index = info
            .level
            .tile_index(tile_x, tile_y)
            .ok_or_else(|| decode_error(level, 0, format!("tile ({tile_x}, {tile_y}) out of range")))?;
        let (offset, byte_count) = info
            .tile_data
            .get_tile_location(tile_index)
            .ok_or_else(|| decode_error(level, tile_index, "no tile location".to_string()))?;

        let data = self.reader.read_exact_at(offset, byte_count as usize)?;
        let tile = match info.compression {
            Compression::Jpeg => {
                let tables = info.tile_data.jpeg_tables.as_deref();
                decode_jpeg_tile(tables, &data)
            }
            _ => decode_uncompressed(
                &data,
                info.level.tile_width,
                info.level.tile_height,
                info.samples_per_pixel,
            ),
        }
        .map_err(|message| decode_error(level, tile_index, message))?;

        debug!(level, tile_x, tile_y, bytes = data.len(), "Decoded tile");
        let tile = Arc::new(tile);
        self.tile_cache.put(key, Arc::clone(&tile));
        Ok(tile)
    }
}

impl<R: RangeReader> SlideSource for TiffSlide<R> {
    fn dimensions(&self) -> (u32, u32) {
        (self.levels[0].level.width, self.levels[0].level.height)
    }

    fn level_count(&self) -> usize {
        self.levels.len()
    }

    fn level_dimensions(&self, level: u32) -> Option<(u32, u32)> {
        self.levels
            .get(level as usize)
            .map(|l| (l.level.width, l.level.height))
    }

    fn level_downsample(&self, level: u32) -> Option<f64> {
        self.levels.get(level as usize).map(|l| l.level.downsample)
    }

    fn calibration(&self) -> Result<SlideCalibration, SlideError> {
        let mpp = self.mpp.ok_or_else(|| {
            SlideError::MissingCalibration(format!(
                "{} declares neither Aperio MPP nor X/YResolution",
                self.reader.identifier()
            ))
        })?;
        Ok(SlideCalibration::new(self.dimensions(), mpp, self.offset))
    }

    fn read_region(&mut self, location: Point, level: u32, size: Size) -> Result<RgbaImage, SlideError> {
        let Some(info) = self.levels.get(level as usize) else {
            return Err(SlideError::InvalidLevel {
                level,
                count: self.levels.len(),
            });
        };
        let PyramidLevel {
            width: level_width,
            height: level_height,
            tile_width,
            tile_height,
            downsample,
            ..
        } = info.level;

        let origin_x = (location.x as f64 / downsample).floor() as i64;
        let origin_y = (location.y as f64 / downsample).floor() as i64;

        let mut region = RgbaImage::new(size.width, size.height);

        // Part of the region inside the level, in level pixels
        let x0 = origin_x.max(0);
        let y0 = origin_y.max(0);
        let x1 = (origin_x + size.width as i64).min(level_width as i64);
        let y1 = (origin_y + size.height as i64).min(level_height as i64);
        if x0 >= x1 || y0 >= y1 {
            return Ok(region);
        }

        let (tile_w, tile_h) = (tile_width as i64, tile_height as i64);
        for tile_y in (y0 / tile_h)..=((y1 - 1) / tile_h) {
            for tile_x in (x0 / tile_w)..=((x1 - 1) / tile_w) {
                let tile = self.tile(level, tile_x as u32, tile_y as u32)?;

                let (tile_left, tile_top) = (tile_x * tile_w, tile_y * tile_h);
                let cx0 = x0.max(tile_left);
                let cy0 = y0.max(tile_top);
                let cx1 = x1.min(tile_left + tile.width() as i64);
                let cy1 = y1.min(tile_top + tile.height() as i64);

                for y in cy0..cy1 {
                    for x in cx0..cx1 {
                        let [r, g, b] = tile
                            .get_pixel((x - tile_left) as u32, (y - tile_top) as u32)
                            .0;
                        region.put_pixel(
                            (x - origin_x) as u32,
                            (y - origin_y) as u32,
                            Rgba([r, g, b, 255]),
                        );
                    }
                }
            }
        }

        Ok(region)
    }
}

fn decode_error(level: u32, tile_index: u32, message: String) -> SlideError {
    TiffError::TileDecode {
        level,
        tile_index,
        message,
    }
    .into()
}

/// Check a level's pixel layout and load its tile locations.
fn load_level<R: RangeReader>(
    reader: &R,
    pyramid: &TiffPyramid,
    level: &PyramidLevel,
) -> Result<TiffLevel, SlideError> {
    let compression = Compression::from_u16(level.compression)
        .filter(|c| c.is_supported())
        .ok_or_else(|| TiffError::UnsupportedCompression(Compression::describe(level.compression)))?;

    let byte_order = pyramid.header.byte_order;
    let samples_per_pixel = level.ifd.samples_per_pixel(byte_order).unwrap_or(1);

    if compression == Compression::None {
        let planar = level.ifd.planar_configuration(byte_order).unwrap_or(1);
        let bits = match level.ifd.get_entry_by_tag(TiffTag::BitsPerSample) {
            Some(entry) => ValueReader::new(reader, &pyramid.header).read_u64_array(entry)?,
            None => vec![1],
        };
        if !matches!(samples_per_pixel, 1 | 3) || planar != 1 || bits.iter().any(|&b| b != 8) {
            return Err(TiffError::UnsupportedSampleFormat(format!(
                "level {}: {} sample(s), bits {:?}, planar configuration {}",
                level.level_index, samples_per_pixel, bits, planar
            ))
            .into());
        }
    }

    let tile_data = TileData::load(reader, level, &pyramid.header)?;
    Ok(TiffLevel {
        level: level.clone(),
        tile_data,
        compression,
        samples_per_pixel,
    })
}

/// Expand an uncompressed 8-bit tile to RGB.
fn decode_uncompressed(data: &[u8], width: u32, height: u32, samples: u16) -> Result<RgbImage, String> {
    let pixels = width as usize * height as usize;
    let expected = pixels * samples as usize;
    if data.len() < expected {
        return Err(format!("expected {expected} bytes, got {}", data.len()));
    }

    match samples {
        3 => RgbImage::from_raw(width, height, data[..expected].to_vec())
            .ok_or_else(|| "invalid RGB buffer".to_string()),
        1 => GrayImage::from_raw(width, height, data[..expected].to_vec())
            .map(|gray| image::DynamicImage::ImageLuma8(gray).into_rgb8())
            .ok_or_else(|| "invalid gray buffer".to_string()),
        other => Err(format!("{other} samples per pixel")),
    }
}

/// Microns per pixel from X/YResolution and ResolutionUnit.
fn resolution_mpp<R: RangeReader>(
    values: &ValueReader<'_, R>,
    ifd: &Ifd,
) -> Result<Option<(f64, f64)>, SlideError> {
    let (Some(x_entry), Some(y_entry)) = (
        ifd.get_entry_by_tag(TiffTag::XResolution),
        ifd.get_entry_by_tag(TiffTag::YResolution),
    ) else {
        return Ok(None);
    };

    let unit = ifd
        .get_u32(TiffTag::ResolutionUnit, values.byte_order())
        .map(|u| u as u16)
        .unwrap_or(DEFAULT_RESOLUTION_UNIT);
    let mpp_x = mpp_from_resolution(values.read_f64(x_entry)?, unit);
    let mpp_y = mpp_from_resolution(values.read_f64(y_entry)?, unit);
    Ok(mpp_x.zip(mpp_y))
}

/// A Hamamatsu stage offset in nm, 0 when absent or unreadable.
fn read_offset<R: RangeReader>(values: &ValueReader<'_, R>, ifd: &Ifd, tag: TiffTag) -> i64 {
    let Some(entry) = ifd.get_entry_by_tag(tag) else {
        warn!(?tag, "Slide has no stage offset, assuming 0");
        return 0;
    };
    match values.read_i64(entry) {
        Ok(offset) => offset,
        Err(e) => {
            warn!(?tag, error = %e, "Unreadable stage offset, assuming 0");
            0
        }
    }
}
