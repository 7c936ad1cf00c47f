//! A slide paired with its annotations.

use std::path::Path;

use image::{DynamicImage, GrayAlphaImage, RgbImage};
use tracing::debug;

use crate::annotation::{read_ndpa, AnnotationCollection, MaskPolicy};
use crate::error::{SlideError, TileError};
use crate::geometry::{downsample, Point, Size, MAX_LEVEL};
use crate::tile::{TileBuilder, Tiles};

use super::{SlideSource, TiffSlide};

/// A slide source and the annotation collection placed on it.
///
/// Every region read returns the slide pixels together with the matching
/// annotation mask.
#[derive(Debug)]
pub struct AnnotatedSlide<S = TiffSlide> {
    source: S,
    annotations: AnnotationCollection,
}

impl AnnotatedSlide<TiffSlide> {
    /// Open a slide and its NDPA annotation file.
    ///
    /// Annotation coordinates are placed using the slide's own calibration.
    pub fn open(
        slide_path: impl AsRef<Path>,
        annotation_path: impl AsRef<Path>,
        policy: MaskPolicy,
    ) -> Result<Self, SlideError> {
        let source = TiffSlide::open(slide_path)?;
        let calibration = source.calibration()?;
        let annotations = read_ndpa(annotation_path, calibration, policy)?;
        Ok(Self::new(source, annotations))
    }
}

impl<S: SlideSource> AnnotatedSlide<S> {
    pub fn new(source: S, annotations: AnnotationCollection) -> Self {
        Self {
            source,
            annotations,
        }
    }

    /// Level-0 width and height.
    pub fn dimensions(&self) -> (u32, u32) {
        self.source.dimensions()
    }

    pub fn annotations(&self) -> &AnnotationCollection {
        &self.annotations
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn into_parts(self) -> (S, AnnotationCollection) {
        (self.source, self.annotations)
    }

    /// Check that `level` exists and is a clean power-of-two downsample.
    ///
    /// Annotation placement assumes level `L` is exactly `2^L` times smaller
    /// than level 0. The declared downsample is truncated before comparing,
    /// so levels of odd-sized slides (e.g. 2.002) still pass.
    pub fn check_level(&self, level: u32) -> Result<(), SlideError> {
        let invalid = || SlideError::InvalidLevel {
            level,
            count: self.source.level_count(),
        };
        if level > MAX_LEVEL {
            return Err(invalid());
        }
        let declared = self.source.level_downsample(level).ok_or_else(invalid)?;

        let expected = downsample(level) as u64;
        if !declared.is_finite() || declared.trunc() as u64 != expected {
            return Err(SlideError::CalibrationMismatch {
                level,
                expected,
                declared,
            });
        }
        Ok(())
    }

    /// Read slide pixels and the annotation mask of the same region.
    ///
    /// `location` is in level-0 pixels and `size` in `level` pixels. Pixels
    /// outside the slide come back black.
    pub fn read_region(
        &mut self,
        location: Point,
        level: u32,
        size: Size,
    ) -> Result<(RgbImage, GrayAlphaImage), SlideError> {
        self.check_level(level)?;

        let region = self.source.read_region(location, level, size)?;
        let image = DynamicImage::ImageRgba8(region).into_rgb8();
        let mask = self.annotations.render_region(location, level, size)?;

        debug!(x = location.x, y = location.y, level, width = size.width, "Read region");
        Ok((image, mask))
    }

    /// Tile the slide with the default filter and rotation angles.
    ///
    /// See [`TileBuilder::build`].
    pub fn build_tiles(
        &mut self,
        level: u32,
        tile_size: u32,
        overlap: f64,
        rotate: bool,
    ) -> Result<Tiles<'_, S>, TileError> {
        TileBuilder::new(self).build(level, tile_size, overlap, rotate)
    }
}
