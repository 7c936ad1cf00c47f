//! Slide sources and annotated slides.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              TileBuilder                │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │            AnnotatedSlide               │
//! │  (slide pixels + annotation mask)       │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │          SlideSource Trait              │
//! │  (pyramid levels, calibration, regions) │
//! └────────────────────┬────────────────────┘
//!                      │
//!          ┌───────────┴───────────┐
//!          ▼                       ▼
//! ┌─────────────────┐    ┌─────────────────────┐
//! │   TiffSlide     │    │    ImageSlide       │
//! │ (SVS/NDPI/TIFF) │    │    (in memory)      │
//! └─────────────────┘    └─────────────────────┘
//! ```
//!
//! Region locations are always level-0 pixel coordinates; region sizes are
//! pixels at the requested level.

mod annotated;
mod memory;
mod report;
mod tiff;
mod tile_cache;

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use image::RgbaImage;

use crate::coords::SlideCalibration;
use crate::error::SlideError;
use crate::geometry::{Point, Size};

pub use annotated::AnnotatedSlide;
pub use memory::{ImageSlide, DEFAULT_MIN_LEVEL_DIMENSION};
pub use report::{LevelReport, SlideReport};
pub use tiff::TiffSlide;
pub use tile_cache::{DecodedTileCache, TileKey, DEFAULT_TILE_CACHE_CAPACITY};

/// Suffix appended to a slide's file name to find its annotations.
pub const DEFAULT_ANNOTATION_SUFFIX: &str = ".ndpa";

/// A multi-resolution slide.
pub trait SlideSource {
    /// Level-0 width and height.
    fn dimensions(&self) -> (u32, u32);

    fn level_count(&self) -> usize;

    fn level_dimensions(&self, level: u32) -> Option<(u32, u32)>;

    /// Downsample factor of a level relative to level 0, as declared by the slide.
    fn level_downsample(&self, level: u32) -> Option<f64>;

    /// Physical calibration used to place annotations.
    fn calibration(&self) -> Result<SlideCalibration, SlideError>;

    /// Read `size` pixels of `level` starting at level-0 `location`.
    ///
    /// Pixels outside the slide are transparent black.
    fn read_region(&mut self, location: Point, level: u32, size: Size) -> Result<RgbaImage, SlideError>;
}

/// Open a slide file.
pub fn open_slide(path: impl AsRef<Path>) -> Result<TiffSlide, SlideError> {
    TiffSlide::open(path)
}

/// Annotation file next to a slide: `slide.ndpi` becomes `slide.ndpi.ndpa`.
pub fn annotation_path_for(slide_path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(slide_path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}
