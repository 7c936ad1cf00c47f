//! JPEG encoding of tiles and masks.
//!
//! Tiles are stored as grayscale JPEGs unless color output is requested;
//! masks are stored as single-channel JPEGs of the mask's alpha channel.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{imageops, ExtendedColorType, GrayImage, RgbImage};

use crate::error::TileError;

use super::Tile;

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

/// Encodes tiles and their masks as JPEG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileEncoder {
    quality: u8,
    color: bool,
}

impl Default for TileEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY, false)
    }
}

impl TileEncoder {
    /// Create an encoder. `quality` is clamped to 1-100.
    pub fn new(quality: u8, color: bool) -> Self {
        Self {
            quality: clamp_quality(quality),
            color,
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn is_color(&self) -> bool {
        self.color
    }

    /// Encode a tile image, converted to luma unless color output is on.
    pub fn encode_image(&self, image: &RgbImage) -> Result<Bytes, TileError> {
        if self.color {
            self.encode(image.as_raw(), image.width(), image.height(), ExtendedColorType::Rgb8)
        } else {
            self.encode_gray(&imageops::grayscale(image))
        }
    }

    /// Encode a single-channel mask.
    pub fn encode_mask(&self, mask: &GrayImage) -> Result<Bytes, TileError> {
        self.encode_gray(mask)
    }

    /// Encode a tile's image and the alpha channel of its mask.
    pub fn encode_tile(&self, tile: &Tile) -> Result<(Bytes, Bytes), TileError> {
        Ok((
            self.encode_image(&tile.image)?,
            self.encode_mask(&tile.mask_alpha())?,
        ))
    }

    fn encode_gray(&self, image: &GrayImage) -> Result<Bytes, TileError> {
        self.encode(image.as_raw(), image.width(), image.height(), ExtendedColorType::L8)
    }

    fn encode(&self, pixels: &[u8], width: u32, height: u32, color: ExtendedColorType) -> Result<Bytes, TileError> {
        let mut output = Vec::new();
        JpegEncoder::new_with_quality(&mut output, self.quality)
            .encode(pixels, width, height, color)
            .map_err(|e| TileError::EncodeError {
                message: e.to_string(),
            })?;
        Ok(Bytes::from(output))
    }
}

/// Validate JPEG quality parameter.
#[inline]
pub fn is_valid_quality(quality: u8) -> bool {
    (MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&quality)
}

/// Clamp quality to the valid range.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}
