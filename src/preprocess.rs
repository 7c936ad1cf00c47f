//! Folder preprocessing.
//!
//! Finds every slide under an input folder, pairs it with its annotation
//! file and writes each emitted tile and mask as JPEG:
//!
//! ```text
//! <output>/<stem>/<stem>_<x>_<y>_<deg>.jpeg
//! <output>/<stem>/<stem>_<x>_<y>_<deg>_segment.jpeg
//! ```
//!
//! Slides without an annotation file are skipped. A slide that fails is
//! logged and counted, and the run moves on unless `fail_fast` is set.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::annotation::MaskPolicy;
use crate::error::{IoError, PreprocessError, SlideError, TiffError, TileError};
use crate::slide::{annotation_path_for, AnnotatedSlide, SlideSource, DEFAULT_ANNOTATION_SUFFIX};
use crate::tile::{RotationSettings, Tile, TileBuilder, TileEncoder, TileFilter, DEFAULT_JPEG_QUALITY};

/// Default pyramid level tiles are cut from.
pub const DEFAULT_LEVEL: u32 = 2;

/// Default tile side in level pixels.
pub const DEFAULT_TILE_SIZE: u32 = 512;

/// Default slide file extension.
pub const DEFAULT_SLIDE_EXTENSION: &str = "ndpi";

/// Suffix of mask file names.
const MASK_SUFFIX: &str = "_segment";

/// Everything that controls a preprocessing run.
#[derive(Debug, Clone)]
pub struct PreprocessOptions {
    pub level: u32,
    pub tile_size: u32,
    pub overlap: f64,
    pub rotate: bool,
    pub jpeg_quality: u8,

    /// Keep tiles in color instead of converting them to grayscale
    pub color: bool,

    /// Extensions, without the dot, that identify slide files
    pub slide_extensions: Vec<String>,

    pub annotation_suffix: String,

    /// Abort the run on the first failing slide
    pub fail_fast: bool,

    pub mask_policy: MaskPolicy,
    pub filter: TileFilter,
    pub rotations: RotationSettings,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            level: DEFAULT_LEVEL,
            tile_size: DEFAULT_TILE_SIZE,
            overlap: 0.0,
            rotate: false,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            color: false,
            slide_extensions: vec![DEFAULT_SLIDE_EXTENSION.to_string()],
            annotation_suffix: DEFAULT_ANNOTATION_SUFFIX.to_string(),
            fail_fast: false,
            mask_policy: MaskPolicy::default(),
            filter: TileFilter::default(),
            rotations: RotationSettings::default(),
        }
    }
}

/// Counts from one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PreprocessSummary {
    pub slides_found: usize,
    pub slides_processed: usize,
    pub slides_skipped: usize,
    pub slides_failed: usize,
    pub tiles_written: usize,
}

/// Turns a folder of annotated slides into tile and mask files.
#[derive(Debug, Clone, Default)]
pub struct SlidePreprocessor {
    options: PreprocessOptions,
}

impl SlidePreprocessor {
    pub fn new(options: PreprocessOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &PreprocessOptions {
        &self.options
    }

    /// Process every slide under `input_dir` into `output_dir`.
    pub fn preprocess(&self, input_dir: &Path, output_dir: &Path) -> Result<PreprocessSummary, PreprocessError> {
        if !input_dir.is_dir() {
            return Err(PreprocessError::InputFolderMissing(input_dir.to_path_buf()));
        }
        if !output_dir.is_dir() {
            return Err(PreprocessError::OutputFolderMissing(output_dir.to_path_buf()));
        }

        let slides = self.discover_slides(input_dir)?;
        let mut summary = PreprocessSummary {
            slides_found: slides.len(),
            ..Default::default()
        };
        info!(input = %input_dir.display(), slides = slides.len(), "Discovered slides");
        let mut stripped = 0;

        for slide_path in slides {
            let annotation_path = annotation_path_for(&slide_path, &self.options.annotation_suffix);
            if !annotation_path.is_file() {
                warn!(slide = %slide_path.display(), "No annotation file, skipping");
                summary.slides_skipped += 1;
                continue;
            }

            match self.process_slide(&slide_path, &annotation_path, output_dir) {
                Ok(tiles) => {
                    info!(slide = %slide_path.display(), tiles, "Processed slide");
                    summary.slides_processed += 1;
                    summary.tiles_written += tiles;
                }
                Err(source) if self.options.fail_fast => {
                    return Err(PreprocessError::Slide {
                        path: slide_path,
                        source,
                    });
                }
                Err(e) => {
                    error!(slide = %slide_path.display(), error = %e, "Failed to process slide");
                    summary.slides_failed += 1;
                    if is_strip_organized(&e) {
                        stripped += 1;
                    }
                }
            }
        }

        if stripped > 0 {
            warn!(
                slides = stripped,
                "Some slides store their levels as strips, convert them to tiled TIFF first"
            );
        }

        Ok(summary)
    }

    /// Slide files under `dir`, recursively, sorted by path.
    pub fn discover_slides(&self, dir: &Path) -> Result<Vec<PathBuf>, PreprocessError> {
        let mut slides = Vec::new();
        let mut pending = vec![dir.to_path_buf()];

        while let Some(dir) = pending.pop() {
            let entries = fs::read_dir(&dir).map_err(|e| IoError::from_std(dir.display().to_string(), e))?;
            for entry in entries {
                let path = entry
                    .map_err(|e| IoError::from_std(dir.display().to_string(), e))?
                    .path();
                if path.is_dir() {
                    pending.push(path);
                } else if self.is_slide(&path) {
                    slides.push(path);
                }
            }
        }

        slides.sort();
        Ok(slides)
    }

    fn is_slide(&self, path: &Path) -> bool {
        let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        self.options
            .slide_extensions
            .iter()
            .any(|wanted| wanted.trim_start_matches('.').eq_ignore_ascii_case(extension))
    }

    /// Open one slide with its annotations and write its tiles.
    ///
    /// Returns the number of tiles written.
    pub fn process_slide(&self, slide_path: &Path, annotation_path: &Path, output_dir: &Path) -> Result<usize, TileError> {
        debug!(slide = %slide_path.display(), annotations = %annotation_path.display(), "Opening slide");
        let mut slide = AnnotatedSlide::open(slide_path, annotation_path, self.options.mask_policy)?;
        self.process_annotated(&mut slide, &slide_stem(slide_path), output_dir)
    }

    /// Write the tiles of an already opened slide under `output_dir/<stem>/`.
    pub fn process_annotated<S: SlideSource>(
        &self,
        slide: &mut AnnotatedSlide<S>,
        stem: &str,
        output_dir: &Path,
    ) -> Result<usize, TileError> {
        let slide_dir = output_dir.join(stem);
        fs::create_dir_all(&slide_dir).map_err(|e| IoError::from_std(slide_dir.display().to_string(), e))?;

        let encoder = TileEncoder::new(self.options.jpeg_quality, self.options.color);
        let tiles = TileBuilder::new(slide)
            .with_filter(self.options.filter)
            .with_rotations(self.options.rotations.clone())
            .build(
                self.options.level,
                self.options.tile_size,
                self.options.overlap,
                self.options.rotate,
            )?;

        let mut written = 0;
        for tile in tiles {
            let tile = tile?;
            let (image, mask) = encoder.encode_tile(&tile)?;
            let (image_name, mask_name) = tile_file_names(stem, &tile);
            write_file(&slide_dir.join(image_name), &image)?;
            write_file(&slide_dir.join(mask_name), &mask)?;
            written += 1;
        }
        Ok(written)
    }
}

/// File names of a tile and its mask.
pub fn tile_file_names(stem: &str, tile: &Tile) -> (String, String) {
    let base = format!("{stem}_{}_{}_{}", tile.x, tile.y, tile.rotation);
    (format!("{base}.jpeg"), format!("{base}{MASK_SUFFIX}.jpeg"))
}

/// Whether a slide failed because its images are strips rather than tiles.
///
/// Most NDPI files written by the scanner itself are organized this way.
fn is_strip_organized(error: &TileError) -> bool {
    matches!(
        error,
        TileError::Slide(SlideError::Tiff(TiffError::StripOrganization))
    )
}

/// File name without its last extension.
pub fn slide_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "slide".to_string())
}

fn write_file(path: &Path, data: &[u8]) -> Result<(), IoError> {
    fs::write(path, data).map_err(|e| IoError::from_std(path.display().to_string(), e))
}
