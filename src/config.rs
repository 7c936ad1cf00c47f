//! Command-line configuration for wsi-tiler.
//!
//! Every option can also be set through an environment variable with the
//! `WSI_TILER_` prefix:
//!
//! - `WSI_TILER_LEVEL` - Pyramid level to tile (default: 2)
//! - `WSI_TILER_TILE_SIZE` - Tile side in level pixels (default: 512)
//! - `WSI_TILER_OVERLAP` - Overlap fraction between neighbours (default: 0)
//! - `WSI_TILER_ROTATE` - Emit rotated copies (default: false)
//! - `WSI_TILER_JPEG_QUALITY` - JPEG quality (default: 80)
//! - `WSI_TILER_COLOR` - Keep tiles in color (default: false)
//! - `WSI_TILER_EXTENSIONS` - Comma-separated slide extensions (default: ndpi)
//! - `WSI_TILER_ANNOTATION_SUFFIX` - Annotation file suffix (default: .ndpa)
//! - `WSI_TILER_MASK_MARGIN`, `WSI_TILER_SEED_CORNER`, `WSI_TILER_LINE_WIDTH` - Mask rendering
//! - `WSI_TILER_WHITE_LEVEL`, `WSI_TILER_WHITE_THRESHOLD` - Background filter
//! - `WSI_TILER_ROTATION_ANGLES` - Comma-separated rotation angles (default: 15,30,45)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::annotation::{
    MaskPolicy, SeedCorner, DEFAULT_CACHED_LEVELS, DEFAULT_LINE_WIDTH, DEFAULT_MASK_MARGIN,
};
use crate::preprocess::{PreprocessOptions, DEFAULT_LEVEL, DEFAULT_SLIDE_EXTENSION, DEFAULT_TILE_SIZE};
use crate::slide::DEFAULT_ANNOTATION_SUFFIX;
use crate::tile::{
    is_valid_quality, RotationSettings, TileFilter, DEFAULT_JPEG_QUALITY, DEFAULT_WHITE_LEVEL,
    DEFAULT_WHITE_THRESHOLD,
};
use crate::geometry::MAX_LEVEL;

/// Default rotation angles, as accepted on the command line.
pub const DEFAULT_ROTATION_ANGLES_ARG: &str = "15,30,45";

// =============================================================================
// CLI Arguments
// =============================================================================

/// wsi-tiler - Turn annotated Whole Slide Images into training tiles.
///
/// Cuts slides into fixed-size JPEG tiles with matching segmentation masks
/// rendered from NDP.view annotation files.
#[derive(Parser, Debug, Clone)]
#[command(name = "wsi-tiler")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Tile every annotated slide in a folder.
    Preprocess(PreprocessArgs),

    /// Print a slide's structure and calibration, and parse its annotations.
    Check(CheckArgs),
}

#[derive(Args, Debug, Clone)]
pub struct PreprocessArgs {
    /// Folder searched recursively for slides.
    pub input_folder: PathBuf,

    /// Existing folder that receives one sub-folder per slide.
    pub output_folder: PathBuf,

    // =========================================================================
    // Tiling
    // =========================================================================
    /// Pyramid level to cut tiles from.
    #[arg(short, long, default_value_t = DEFAULT_LEVEL, env = "WSI_TILER_LEVEL")]
    pub level: u32,

    /// Tile side in pixels at the chosen level.
    #[arg(short = 's', long, default_value_t = DEFAULT_TILE_SIZE, env = "WSI_TILER_TILE_SIZE")]
    pub tile_size: u32,

    /// Fraction of a tile shared with its neighbours, in [0, 1).
    #[arg(short, long, default_value_t = 0.0, env = "WSI_TILER_OVERLAP")]
    pub overlap: f64,

    /// Also emit rotated copies of each tile.
    #[arg(long, default_value_t = false, env = "WSI_TILER_ROTATE")]
    pub rotate: bool,

    /// Rotation angles in degrees (comma-separated).
    #[arg(
        long,
        env = "WSI_TILER_ROTATION_ANGLES",
        value_delimiter = ',',
        default_value = DEFAULT_ROTATION_ANGLES_ARG
    )]
    pub rotation_angles: Vec<u32>,

    // =========================================================================
    // Output
    // =========================================================================
    /// JPEG quality (1-100).
    #[arg(long = "quality", default_value_t = DEFAULT_JPEG_QUALITY, env = "WSI_TILER_JPEG_QUALITY")]
    pub jpeg_quality: u8,

    /// Keep tiles in color instead of grayscale.
    #[arg(long, default_value_t = false, env = "WSI_TILER_COLOR")]
    pub color: bool,

    // =========================================================================
    // Discovery
    // =========================================================================
    /// Slide file extension; repeat for several.
    ///
    /// Only tiled TIFF levels can be read. Most NDPI files straight from the
    /// scanner store strips and must be converted to tiled TIFF first.
    #[arg(
        long = "extension",
        env = "WSI_TILER_EXTENSIONS",
        value_delimiter = ',',
        default_value = DEFAULT_SLIDE_EXTENSION
    )]
    pub extensions: Vec<String>,

    /// Suffix appended to a slide's file name to find its annotations.
    #[arg(long, default_value = DEFAULT_ANNOTATION_SUFFIX, env = "WSI_TILER_ANNOTATION_SUFFIX")]
    pub annotation_suffix: String,

    /// Stop at the first slide that fails.
    #[arg(long, default_value_t = false)]
    pub fail_fast: bool,

    // =========================================================================
    // Masks and filtering
    // =========================================================================
    #[command(flatten)]
    pub mask: MaskArgs,

    /// Green value from which a pixel counts as white.
    #[arg(long, default_value_t = DEFAULT_WHITE_LEVEL, env = "WSI_TILER_WHITE_LEVEL")]
    pub white_level: u8,

    /// Share of white pixels from which a tile is dropped.
    #[arg(long, default_value_t = DEFAULT_WHITE_THRESHOLD, env = "WSI_TILER_WHITE_THRESHOLD")]
    pub white_threshold: f64,

    /// Print the run summary as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

/// Annotation mask rendering options.
#[derive(Args, Debug, Clone)]
pub struct MaskArgs {
    /// Pixels added to each annotation bounding box dimension.
    #[arg(long, default_value_t = DEFAULT_MASK_MARGIN, env = "WSI_TILER_MASK_MARGIN")]
    pub mask_margin: u32,

    /// Corner the exterior fill starts from (top-left, top-right, bottom-right, bottom-left).
    #[arg(long, default_value = "top-left", env = "WSI_TILER_SEED_CORNER")]
    pub seed_corner: SeedCorner,

    /// Annotation outline width in pixels.
    #[arg(long, default_value_t = DEFAULT_LINE_WIDTH, env = "WSI_TILER_LINE_WIDTH")]
    pub line_width: u32,
}

#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    /// Slide file.
    pub slide: PathBuf,

    /// Annotation file (default: slide path plus the annotation suffix).
    #[arg(long)]
    pub annotations: Option<PathBuf>,

    /// Suffix used when no annotation file is given.
    #[arg(long, default_value = DEFAULT_ANNOTATION_SUFFIX, env = "WSI_TILER_ANNOTATION_SUFFIX")]
    pub annotation_suffix: String,

    #[command(flatten)]
    pub mask: MaskArgs,

    /// Print the report as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

impl Cli {
    /// Validate the arguments and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        match &self.command {
            Command::Preprocess(args) => args.validate(),
            Command::Check(args) => args.mask.validate(),
        }
    }
}

impl PreprocessArgs {
    pub fn validate(&self) -> Result<(), String> {
        if self.tile_size == 0 {
            return Err("tile_size must be greater than 0".to_string());
        }
        if self.level > MAX_LEVEL {
            return Err(format!("level must be at most {MAX_LEVEL}"));
        }
        if !self.overlap.is_finite() || !(0.0..1.0).contains(&self.overlap) {
            return Err("overlap must be in [0, 1)".to_string());
        }
        if !is_valid_quality(self.jpeg_quality) {
            return Err("jpeg_quality must be between 1 and 100".to_string());
        }
        if !self.white_threshold.is_finite() || !(0.0..=1.0).contains(&self.white_threshold) {
            return Err("white_threshold must be between 0 and 1".to_string());
        }
        if self.extensions.iter().all(|e| e.trim_start_matches('.').is_empty()) {
            return Err("at least one slide extension is required".to_string());
        }
        if self.annotation_suffix.is_empty() {
            return Err("annotation_suffix must not be empty".to_string());
        }
        self.mask.validate()
    }

    /// Options for the preprocessing driver.
    pub fn to_options(&self) -> PreprocessOptions {
        PreprocessOptions {
            level: self.level,
            tile_size: self.tile_size,
            overlap: self.overlap,
            rotate: self.rotate,
            jpeg_quality: self.jpeg_quality,
            color: self.color,
            slide_extensions: self.extensions.clone(),
            annotation_suffix: self.annotation_suffix.clone(),
            fail_fast: self.fail_fast,
            mask_policy: self.mask.to_policy(),
            filter: TileFilter {
                white_level: self.white_level,
                white_threshold: self.white_threshold,
            },
            rotations: RotationSettings {
                angles: self.rotation_angles.clone(),
            },
        }
    }
}

impl MaskArgs {
    pub fn validate(&self) -> Result<(), String> {
        if self.line_width == 0 {
            return Err("line_width must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn to_policy(&self) -> MaskPolicy {
        MaskPolicy {
            margin: self.mask_margin,
            seed: self.seed_corner,
            line_width: self.line_width,
            cached_levels: DEFAULT_CACHED_LEVELS,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
