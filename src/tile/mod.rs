//! Tiling of annotated slides.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              TileBuilder                │
//! │  grid walk ─▶ whiteness filter ─▶ tile  │
//! │                       └─▶ rotations     │
//! └────────────────────┬────────────────────┘
//!                      │ read_region
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │            AnnotatedSlide               │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileBuilder`]: configures and starts a walk over one pyramid level
//! - [`Tiles`]: the lazy sequence of [`Tile`]s produced by a walk
//! - [`TileGrid`]: stride, tile and rotation-margin geometry of a walk
//! - [`TileFilter`]: rejects background tiles by their share of bright pixels
//! - [`TileEncoder`]: JPEG encoding of tiles and masks
//!
//! # Example
//!
//! ```ignore
//! use wsi_tiler::slide::AnnotatedSlide;
//! use wsi_tiler::annotation::MaskPolicy;
//!
//! let mut slide = AnnotatedSlide::open("a.ndpi", "a.ndpi.ndpa", MaskPolicy::default())?;
//! for tile in slide.build_tiles(2, 512, 0.0, true)? {
//!     let tile = tile?;
//!     println!("{} {} {}", tile.x, tile.y, tile.rotation);
//! }
//! ```

mod builder;
mod encoder;

use image::{GrayAlphaImage, GrayImage, RgbImage};
use imageproc::stats::histogram;

pub use builder::{rotation_margin, GridCells, TileBuilder, TileGrid, Tiles};
pub use encoder::{
    clamp_quality, is_valid_quality, TileEncoder, DEFAULT_JPEG_QUALITY, MAX_JPEG_QUALITY,
    MIN_JPEG_QUALITY,
};

/// Green values at or above this count as white.
pub const DEFAULT_WHITE_LEVEL: u8 = 220;

/// Share of white pixels at which a tile is treated as background.
pub const DEFAULT_WHITE_THRESHOLD: f64 = 0.70;

/// Default rotation angles in degrees.
pub const DEFAULT_ROTATION_ANGLES: [u32; 3] = [15, 30, 45];

/// One emitted tile and its mask.
#[derive(Debug, Clone)]
pub struct Tile {
    /// Level-0 x coordinate of the tile's top-left corner
    pub x: i64,

    /// Level-0 y coordinate of the tile's top-left corner
    pub y: i64,

    /// Counter-clockwise rotation in degrees, 0 for the base tile
    pub rotation: u32,

    pub image: RgbImage,

    /// Annotation mask; alpha is the membership channel
    pub mask: GrayAlphaImage,
}

impl Tile {
    /// The mask's alpha channel as a single-channel image.
    pub fn mask_alpha(&self) -> GrayImage {
        GrayImage::from_fn(self.mask.width(), self.mask.height(), |x, y| {
            image::Luma([self.mask.get_pixel(x, y)[1]])
        })
    }
}

/// Background detection on the green channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileFilter {
    pub white_level: u8,
    pub white_threshold: f64,
}

impl Default for TileFilter {
    fn default() -> Self {
        Self {
            white_level: DEFAULT_WHITE_LEVEL,
            white_threshold: DEFAULT_WHITE_THRESHOLD,
        }
    }
}

impl TileFilter {
    /// Fraction of pixels whose green value is at least `white_level`.
    pub fn white_fraction(&self, image: &RgbImage) -> f64 {
        let total = image.width() as u64 * image.height() as u64;
        if total == 0 {
            return 0.0;
        }
        let green = &histogram(image).channels[1];
        let white: u64 = green[self.white_level as usize..]
            .iter()
            .map(|&count| count as u64)
            .sum();
        white as f64 / total as f64
    }

    /// Whether the tile is mostly slide glass.
    pub fn is_mostly_white(&self, image: &RgbImage) -> bool {
        self.white_fraction(image) >= self.white_threshold
    }
}

/// Angles of the rotated copies emitted for each tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationSettings {
    pub angles: Vec<u32>,
}

impl Default for RotationSettings {
    fn default() -> Self {
        Self {
            angles: DEFAULT_ROTATION_ANGLES.to_vec(),
        }
    }
}
