//! # wsi-tiler
//!
//! Turns pyramidal Whole Slide Images and their hand-drawn polygon
//! annotations into fixed-size tiles with matching segmentation masks,
//! ready to be used as training data.
//!
//! ## Features
//!
//! - **Annotation masks**: NDP.view (`.ndpa`) polygons are mapped from stage
//!   nanometres to slide pixels and rendered per pyramid level
//! - **Native TIFF reading**: tiled Aperio SVS, Hamamatsu NDPI and generic
//!   pyramidal TIFF, JPEG or uncompressed
//! - **Tiling**: stride/overlap grid, background filtering and rotated
//!   augmentations whose crops never contain rotation fill
//!
//! ## Architecture
//!
//! - [`geometry`] - points, sizes, boxes and overlap spans
//! - [`coords`] - physical to level-0 coordinate mapping
//! - [`annotation`] - polygons, masks, collections and the NDPA parser
//! - [`io`] - byte-range readers
//! - [`mod@format`] - TIFF structure, vendor detection and JPEG tiles
//! - [`slide`] - slide sources and annotated slides
//! - [`tile`] - grid walk, filtering, rotation and JPEG encoding
//! - [`preprocess`] - folder driver writing tiles and masks
//! - [`config`] - CLI types
//!
//! ## Example
//!
//! ```rust,no_run
//! use wsi_tiler::{AnnotatedSlide, MaskPolicy};
//!
//! let mut slide = AnnotatedSlide::open("biopsy.ndpi", "biopsy.ndpi.ndpa", MaskPolicy::default())?;
//! for tile in slide.build_tiles(2, 512, 0.0, true)? {
//!     let tile = tile?;
//!     println!("({}, {}) rotated {}°", tile.x, tile.y, tile.rotation);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod annotation;
pub mod config;
pub mod coords;
pub mod error;
pub mod format;
pub mod geometry;
pub mod io;
pub mod preprocess;
pub mod slide;
pub mod tile;

// Re-export commonly used types
pub use annotation::{
    read_ndpa, Annotation, AnnotationCollection, AnnotationParser, MaskPolicy, SeedCorner,
};
pub use config::{Cli, Command};
pub use coords::{physical_to_level0, Axis, SlideCalibration};
pub use error::{
    AnnotationError, FormatError, IoError, PreprocessError, SlideError, TiffError, TileError,
};
pub use format::{is_tiff_header, SlideFormat, SlideMetadata};
pub use geometry::{relative_overlap, BoundingBox, Point, Size, Span};
pub use io::{FileRangeReader, MemoryRangeReader, RangeReader};
pub use preprocess::{PreprocessOptions, PreprocessSummary, SlidePreprocessor};
pub use slide::{
    annotation_path_for, open_slide, AnnotatedSlide, ImageSlide, SlideReport, SlideSource,
    TiffSlide,
};
pub use tile::{
    RotationSettings, Tile, TileBuilder, TileEncoder, TileFilter, TileGrid, Tiles,
    DEFAULT_JPEG_QUALITY,
};
