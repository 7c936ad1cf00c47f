//! A single closed polygon annotation.

use std::num::NonZeroUsize;

use image::{imageops, Rgba, RgbaImage};
use lru::LruCache;
use tracing::{debug, warn};

use crate::error::AnnotationError;
use crate::geometry::{downsample, relative_overlap, BoundingBox, Point, Size};

use super::raster::{draw_closed_polyline, flood_fill, invert_alpha};
use super::{MaskPolicy, SeedCorner};

/// Colour of the outline and of the filled exterior before inversion.
const BOUNDARY: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// One closed polygon in level-0 pixel space.
///
/// The bounding box is fixed at construction. Rendered masks are cached
/// per level; with the default capacity of one, rendering a new level
/// evicts the previous one.
pub struct Annotation {
    polygon: Vec<Point>,
    bounding_box: BoundingBox,
    seed: SeedCorner,
    line_width: u32,
    rendered: LruCache<u32, RgbaImage>,
    current_level: Option<u32>,
}

impl Annotation {
    /// Create an annotation from at least three level-0 points.
    pub fn new(polygon: Vec<Point>, policy: &MaskPolicy) -> Result<Self, AnnotationError> {
        if polygon.len() < 3 {
            return Err(AnnotationError::TooFewPoints(polygon.len()));
        }
        let bounding_box = compute_bounds(&polygon, policy.margin)?;
        let capacity = NonZeroUsize::new(policy.cached_levels).unwrap_or(NonZeroUsize::MIN);

        Ok(Self {
            polygon,
            bounding_box,
            seed: policy.seed,
            line_width: policy.line_width,
            rendered: LruCache::new(capacity),
            current_level: None,
        })
    }

    pub fn polygon(&self) -> &[Point] {
        &self.polygon
    }

    /// Level-0 bounding box including the margin.
    pub fn bounding_box(&self) -> BoundingBox {
        self.bounding_box
    }

    /// Level of the most recent render, if any.
    pub fn current_level(&self) -> Option<u32> {
        self.current_level
    }

    /// Whether the bounding box touches the level-0 box at `location` of `size`.
    pub fn overlap(&self, location: Point, size: Size) -> bool {
        self.bounding_box
            .overlaps(&BoundingBox::new(location, size))
    }

    /// Mask of the whole bounding box at `level`, rendered on first use.
    pub fn render(&mut self, level: u32) -> &RgbaImage {
        self.current_level = Some(level);

        let polygon = &self.polygon;
        let bounding_box = &self.bounding_box;
        let (seed, line_width) = (self.seed, self.line_width);
        self.rendered.get_or_insert(level, || {
            rasterize(polygon, bounding_box, seed, line_width, level)
        })
    }

    /// Mask of this annotation inside a region.
    ///
    /// `location` is the region's top-left corner in level-0 pixels and
    /// `size` its extent in `level` pixels. The result is `size` large and
    /// fully transparent where the annotation does not reach.
    pub fn render_region(&mut self, location: Point, level: u32, size: Size) -> RgbaImage {
        let region = BoundingBox::region(location, level, size);
        let crop = relative_overlap(&region, &self.bounding_box).scaled(level);
        let paste = relative_overlap(&self.bounding_box, &region).scaled(level);

        let mut canvas = RgbaImage::new(size.width, size.height);
        if crop.is_empty() {
            return canvas;
        }

        let mask = self.render(level);
        let part = imageops::crop_imm(
            mask,
            crop.x1 as u32,
            crop.y1 as u32,
            crop.width() as u32,
            crop.height() as u32,
        )
        .to_image();
        imageops::overlay(&mut canvas, &part, paste.x1, paste.y1);
        canvas
    }
}

impl std::fmt::Debug for Annotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Annotation")
            .field("points", &self.polygon.len())
            .field("bounding_box", &self.bounding_box)
            .field("current_level", &self.current_level)
            .finish()
    }
}

/// Axis-aligned bounds of `polygon` grown by `margin`, half on each side.
fn compute_bounds(polygon: &[Point], margin: u32) -> Result<BoundingBox, AnnotationError> {
    let (mut min_x, mut min_y) = (i64::MAX, i64::MAX);
    let (mut max_x, mut max_y) = (i64::MIN, i64::MIN);
    for p in polygon {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }

    let margin = margin as i64;
    let width = max_x - min_x + margin;
    let height = max_y - min_y + margin;
    let too_large = || AnnotationError::PolygonTooLarge { width, height };

    Ok(BoundingBox::new(
        Point::new(min_x - margin / 2, min_y - margin / 2),
        Size::new(
            u32::try_from(width).map_err(|_| too_large())?,
            u32::try_from(height).map_err(|_| too_large())?,
        ),
    ))
}

/// Render the polygon's mask for the whole bounding box at `level`.
///
/// Outline, exterior fill from a corner, alpha inversion. The outline
/// itself ends up transparent along with the exterior.
///
/// The margin shrinks with the level and is gone by level 4, so the outline
/// is drawn on a raster padded by `line_width + 1` on every side. The pad
/// ring never holds outline pixels, which keeps the whole exterior one
/// 4-connected region reachable from any corner. The pad is cropped off
/// after inversion.
fn rasterize(
    polygon: &[Point],
    bounding_box: &BoundingBox,
    seed: SeedCorner,
    line_width: u32,
    level: u32,
) -> RgbaImage {
    let size = bounding_box.scaled(level);
    if size.width == 0 || size.height == 0 {
        return RgbaImage::new(size.width, size.height);
    }

    let pad = line_width.max(1) + 1;
    let (padded_width, padded_height) = (size.width + 2 * pad, size.height + 2 * pad);
    let mut padded = RgbaImage::new(padded_width, padded_height);

    let ds = downsample(level);
    let origin = bounding_box.location;
    let points: Vec<(i64, i64)> = polygon
        .iter()
        .map(|p| {
            (
                (p.x - origin.x).div_euclid(ds) + pad as i64,
                (p.y - origin.y).div_euclid(ds) + pad as i64,
            )
        })
        .collect();

    draw_closed_polyline(&mut padded, &points, line_width, BOUNDARY);

    let exterior = seed
        .clockwise_from()
        .into_iter()
        .map(|corner| corner.pixel(padded_width, padded_height))
        .find(|&(x, y)| padded.get_pixel(x, y)[3] == 0);
    match exterior {
        Some(corner) => flood_fill(&mut padded, corner, BOUNDARY),
        None => warn!(
            level,
            width = size.width,
            height = size.height,
            "No transparent corner to seed the exterior fill, mask left unfilled"
        ),
    }

    invert_alpha(&mut padded);
    let mask = imageops::crop_imm(&padded, pad, pad, size.width, size.height).to_image();
    debug!(level, width = size.width, height = size.height, "Rendered annotation mask");
    mask
}
