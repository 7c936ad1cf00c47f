//! Grid walk over an annotated slide.
//!
//! A walk visits stride positions column by column (outer x, inner y). Each
//! position reads one tile and its mask; background tiles are dropped by
//! the [`TileFilter`]. When rotation is enabled, a surviving tile is
//! followed by one rotated copy per angle, cut from a larger region read
//! around the same position.
//!
//! The larger region is only read once the base tile has been handed out,
//! and at most one such region is held at a time.

use std::f64::consts::FRAC_1_SQRT_2;
use std::iter::FusedIterator;

use image::{imageops, GrayAlphaImage, LumaA, Rgb, RgbImage};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use tracing::{debug, trace};

use crate::error::TileError;
use crate::geometry::{downsample, Point, Size, MAX_LEVEL};
use crate::slide::{AnnotatedSlide, SlideSource};

use super::{RotationSettings, Tile, TileFilter};

// =============================================================================
// Grid geometry
// =============================================================================

/// Geometry of one walk, in level-0 pixels unless noted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    pub width: i64,
    pub height: i64,
    pub level: u32,

    /// Tile side in level pixels
    pub tile_size: u32,

    pub tile_size_level0: i64,
    pub stride: i64,

    /// Border needed around a tile for a 45° rotation, in level pixels
    pub rotation_margin: u32,

    pub rotation_margin_level0: i64,
}

impl TileGrid {
    /// Derive the walk geometry for a slide of `dimensions` (level 0).
    pub fn new(dimensions: (u32, u32), level: u32, tile_size: u32, overlap: f64) -> Result<Self, TileError> {
        if tile_size == 0 {
            return Err(invalid("tile size must be positive".to_string()));
        }
        if !overlap.is_finite() || !(0.0..1.0).contains(&overlap) {
            return Err(invalid(format!("overlap must be in [0, 1), got {overlap}")));
        }
        if level > MAX_LEVEL {
            return Err(invalid(format!("level {level} exceeds {MAX_LEVEL}")));
        }

        let scale = downsample(level);
        let overlap_px = (tile_size as f64 * overlap).floor() as i64;
        let stride = (tile_size as i64 - overlap_px) * scale;
        if stride <= 0 {
            return Err(invalid(format!(
                "tile size {tile_size} with overlap {overlap} leaves no stride"
            )));
        }

        let rotation_margin = rotation_margin(tile_size);
        Ok(Self {
            width: dimensions.0 as i64,
            height: dimensions.1 as i64,
            level,
            tile_size,
            tile_size_level0: tile_size as i64 * scale,
            stride,
            rotation_margin,
            rotation_margin_level0: rotation_margin as i64 * scale,
        })
    }

    /// Top-left corners of every tile that fits the slide.
    pub fn cells(&self) -> GridCells {
        let fits = self.tile_size_level0 <= self.width && self.tile_size_level0 <= self.height;
        GridCells {
            grid: *self,
            next: fits.then_some(Point::new(0, 0)),
        }
    }

    /// Whether a rotated copy of the tile at `cell` stays inside the slide.
    pub fn has_rotation_room(&self, cell: Point) -> bool {
        let m = self.rotation_margin_level0;
        cell.x >= m
            && cell.y >= m
            && cell.x + self.tile_size_level0 + m <= self.width
            && cell.y + self.tile_size_level0 + m <= self.height
    }

    /// Location and size of the region a tile's rotations are cut from.
    pub fn rotation_region(&self, cell: Point) -> (Point, Size) {
        let m = self.rotation_margin_level0;
        (
            Point::new(cell.x - m, cell.y - m),
            Size::square(
                self.tile_size
                    .saturating_add(self.rotation_margin.saturating_mul(2)),
            ),
        )
    }

    fn following(&self, cell: Point) -> Option<Point> {
        if cell.y + self.stride + self.tile_size_level0 <= self.height {
            Some(Point::new(cell.x, cell.y + self.stride))
        } else if cell.x + self.stride + self.tile_size_level0 <= self.width {
            Some(Point::new(cell.x + self.stride, 0))
        } else {
            None
        }
    }
}

/// Smallest border that keeps a `tile_size` crop of a 45° rotation inside
/// the rotated image: `ceil(tile_size * (sqrt(2)/2 - 1/2))`.
pub fn rotation_margin(tile_size: u32) -> u32 {
    let size = tile_size as f64;
    (size * FRAC_1_SQRT_2 - size / 2.0).ceil() as u32
}

/// Iterator over grid positions, outer x, inner y.
#[derive(Debug, Clone)]
pub struct GridCells {
    grid: TileGrid,
    next: Option<Point>,
}

impl Iterator for GridCells {
    type Item = Point;

    fn next(&mut self) -> Option<Point> {
        let cell = self.next?;
        self.next = self.grid.following(cell);
        Some(cell)
    }
}

impl FusedIterator for GridCells {}

fn invalid(message: String) -> TileError {
    TileError::InvalidParameters { message }
}

// =============================================================================
// Builder
// =============================================================================

/// Configures a walk over an [`AnnotatedSlide`].
pub struct TileBuilder<'a, S> {
    slide: &'a mut AnnotatedSlide<S>,
    filter: TileFilter,
    rotations: RotationSettings,
}

impl<'a, S: SlideSource> TileBuilder<'a, S> {
    pub fn new(slide: &'a mut AnnotatedSlide<S>) -> Self {
        Self {
            slide,
            filter: TileFilter::default(),
            rotations: RotationSettings::default(),
        }
    }

    pub fn with_filter(mut self, filter: TileFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_rotations(mut self, rotations: RotationSettings) -> Self {
        self.rotations = rotations;
        self
    }

    /// Start a walk over `level` with square tiles of `tile_size` level pixels.
    ///
    /// Neighbouring tiles share `floor(tile_size * overlap)` pixels. With
    /// `rotate`, every kept tile that has room for it is followed by its
    /// rotated copies.
    ///
    /// # Errors
    ///
    /// `InvalidParameters` for a zero tile size or an overlap outside
    /// `[0, 1)`; a slide error if the level does not exist or is not a
    /// power-of-two downsample.
    pub fn build(self, level: u32, tile_size: u32, overlap: f64, rotate: bool) -> Result<Tiles<'a, S>, TileError> {
        let grid = TileGrid::new(self.slide.dimensions(), level, tile_size, overlap)?;
        self.slide.check_level(level)?;

        debug!(
            level,
            tile_size,
            stride = grid.stride,
            rotation_margin = grid.rotation_margin,
            rotate,
            "Starting tile walk"
        );

        let angles = if rotate {
            self.rotations.angles
        } else {
            Vec::new()
        };

        Ok(Tiles {
            slide: self.slide,
            cells: grid.cells(),
            grid,
            filter: self.filter,
            angles,
            pending: None,
            finished: false,
        })
    }
}

// =============================================================================
// Tiles iterator
// =============================================================================

/// Rotations still owed for the last emitted base tile.
struct PendingRotation {
    cell: Point,
    region: Option<(RgbImage, GrayAlphaImage)>,
    next_angle: usize,
}

/// Lazy sequence of tiles from one walk.
///
/// Stops for good after yielding an error.
pub struct Tiles<'a, S> {
    slide: &'a mut AnnotatedSlide<S>,
    grid: TileGrid,
    cells: GridCells,
    filter: TileFilter,
    angles: Vec<u32>,
    pending: Option<PendingRotation>,
    finished: bool,
}

impl<S: SlideSource> Tiles<'_, S> {
    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    fn advance(&mut self) -> Result<Option<Tile>, TileError> {
        if let Some(tile) = self.next_rotation()? {
            return Ok(Some(tile));
        }

        let size = Size::square(self.grid.tile_size);
        for cell in self.cells.by_ref() {
            let (image, mask) = self.slide.read_region(cell, self.grid.level, size)?;
            if self.filter.is_mostly_white(&image) {
                trace!(x = cell.x, y = cell.y, "Skipping background tile");
                continue;
            }

            if !self.angles.is_empty() && self.grid.has_rotation_room(cell) {
                self.pending = Some(PendingRotation {
                    cell,
                    region: None,
                    next_angle: 0,
                });
            }
            return Ok(Some(Tile {
                x: cell.x,
                y: cell.y,
                rotation: 0,
                image,
                mask,
            }));
        }
        Ok(None)
    }

    fn next_rotation(&mut self) -> Result<Option<Tile>, TileError> {
        let Some(pending) = self.pending.as_mut() else {
            return Ok(None);
        };
        let Some(&angle) = self.angles.get(pending.next_angle) else {
            self.pending = None;
            return Ok(None);
        };

        if pending.region.is_none() {
            let (location, size) = self.grid.rotation_region(pending.cell);
            pending.region = Some(self.slide.read_region(location, self.grid.level, size)?);
        }
        let Some((region, region_mask)) = &pending.region else {
            return Ok(None);
        };

        let (image, mask) = rotate_and_crop(
            region,
            region_mask,
            angle,
            self.grid.rotation_margin,
            self.grid.tile_size,
        );
        let cell = pending.cell;
        pending.next_angle += 1;
        if pending.next_angle >= self.angles.len() {
            self.pending = None;
        }

        Ok(Some(Tile {
            x: cell.x,
            y: cell.y,
            rotation: angle,
            image,
            mask,
        }))
    }
}

impl<S: SlideSource> Iterator for Tiles<'_, S> {
    type Item = Result<Tile, TileError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.advance() {
            Ok(Some(tile)) => Some(Ok(tile)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

impl<S: SlideSource> FusedIterator for Tiles<'_, S> {}

/// Rotate counter-clockwise by `degrees` and cut the central `size` square.
fn rotate_and_crop(
    image: &RgbImage,
    mask: &GrayAlphaImage,
    degrees: u32,
    margin: u32,
    size: u32,
) -> (RgbImage, GrayAlphaImage) {
    // Positive angles turn clockwise in image coordinates.
    let theta = -(degrees as f32).to_radians();

    let image = rotate_about_center(image, theta, Interpolation::Bilinear, Rgb([0, 0, 0]));
    let mask = rotate_about_center(mask, theta, Interpolation::Nearest, LumaA([0, 0]));

    (
        imageops::crop_imm(&image, margin, margin, size, size).to_image(),
        imageops::crop_imm(&mask, margin, margin, size, size).to_image(),
    )
}
