//! In-memory slide source.
//!
//! Holds every pyramid level as a decoded image. Used for synthetic slides
//! in tests and for small images that do not need a TIFF container.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbImage, RgbaImage};

use crate::coords::SlideCalibration;
use crate::error::SlideError;
use crate::geometry::{Point, Size};

use super::SlideSource;

/// Levels are generated while both sides of the next level stay at or above this.
pub const DEFAULT_MIN_LEVEL_DIMENSION: u32 = 64;

/// A pyramid of in-memory RGB images.
#[derive(Debug, Clone)]
pub struct ImageSlide {
    levels: Vec<RgbImage>,
    downsamples: Vec<f64>,
    mpp: Option<(f64, f64)>,
    offset: (i64, i64),
}

impl ImageSlide {
    /// Build a pyramid from a level-0 image by repeated 2x downscaling.
    pub fn new(base: RgbImage) -> Result<Self, SlideError> {
        Self::with_min_level_dimension(base, DEFAULT_MIN_LEVEL_DIMENSION)
    }

    /// Like [`new`](Self::new), stopping once a level's short side would drop below `min_dimension`.
    pub fn with_min_level_dimension(base: RgbImage, min_dimension: u32) -> Result<Self, SlideError> {
        let min_dimension = min_dimension.max(1);
        let mut levels = vec![base];
        while let Some(last) = levels.last() {
            let (width, height) = (last.width() / 2, last.height() / 2);
            if width.min(height) < min_dimension {
                break;
            }
            let next = imageops::resize(last, width, height, FilterType::Triangle);
            levels.push(next);
        }
        Self::from_levels(levels)
    }

    /// Use explicit level images, largest first.
    ///
    /// Each level's downsample is the level-0 size divided by the level size,
    /// averaged over both axes.
    pub fn from_levels(levels: Vec<RgbImage>) -> Result<Self, SlideError> {
        let Some(base) = levels.first() else {
            return Err(SlideError::NoLevels("in-memory slide".to_string()));
        };
        let (base_width, base_height) = base.dimensions();
        if levels.iter().any(|l| l.width() == 0 || l.height() == 0) {
            return Err(SlideError::NoLevels("in-memory slide with an empty level".to_string()));
        }

        let downsamples = levels
            .iter()
            .map(|l| {
                let dx = base_width as f64 / l.width() as f64;
                let dy = base_height as f64 / l.height() as f64;
                (dx + dy) / 2.0
            })
            .collect();

        Ok(Self {
            levels,
            downsamples,
            mpp: None,
            offset: (0, 0),
        })
    }

    /// Set the level-0 microns per pixel.
    pub fn with_mpp(mut self, mpp_x: f64, mpp_y: f64) -> Self {
        self.mpp = Some((mpp_x, mpp_y));
        self
    }

    /// Set the scanned area's offset from the slide centre, in nm.
    pub fn with_offset(mut self, x: i64, y: i64) -> Self {
        self.offset = (x, y);
        self
    }

    /// Override a level's declared downsample.
    pub fn with_declared_downsample(mut self, level: u32, downsample: f64) -> Self {
        if let Some(d) = self.downsamples.get_mut(level as usize) {
            *d = downsample;
        }
        self
    }

    pub fn level_image(&self, level: u32) -> Option<&RgbImage> {
        self.levels.get(level as usize)
    }
}

impl SlideSource for ImageSlide {
    fn dimensions(&self) -> (u32, u32) {
        self.levels[0].dimensions()
    }

    fn level_count(&self) -> usize {
        self.levels.len()
    }

    fn level_dimensions(&self, level: u32) -> Option<(u32, u32)> {
        self.levels.get(level as usize).map(|l| l.dimensions())
    }

    fn level_downsample(&self, level: u32) -> Option<f64> {
        self.downsamples.get(level as usize).copied()
    }

    fn calibration(&self) -> Result<SlideCalibration, SlideError> {
        let mpp = self
            .mpp
            .ok_or_else(|| SlideError::MissingCalibration("in-memory slide has no mpp".to_string()))?;
        Ok(SlideCalibration::new(self.dimensions(), mpp, self.offset))
    }

    fn read_region(&mut self, location: Point, level: u32, size: Size) -> Result<RgbaImage, SlideError> {
        let (image, downsample) = match (
            self.levels.get(level as usize),
            self.downsamples.get(level as usize),
        ) {
            (Some(image), Some(&downsample)) => (image, downsample),
            _ => {
                return Err(SlideError::InvalidLevel {
                    level,
                    count: self.levels.len(),
                })
            }
        };

        let origin_x = (location.x as f64 / downsample).floor() as i64;
        let origin_y = (location.y as f64 / downsample).floor() as i64;
        let (width, height) = (image.width() as i64, image.height() as i64);

        Ok(RgbaImage::from_fn(size.width, size.height, |x, y| {
            let (sx, sy) = (origin_x + x as i64, origin_y + y as i64);
            if (0..width).contains(&sx) && (0..height).contains(&sy) {
                let [r, g, b] = image.get_pixel(sx as u32, sy as u32).0;
                Rgba([r, g, b, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        }))
    }
}
