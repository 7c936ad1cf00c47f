//! Integer geometry shared by the annotation, slide and tile modules.
//!
//! Three coordinate spaces meet in this crate:
//!
//! - **physical**: signed nanometre offsets from the slide centre (annotation files)
//! - **level 0**: pixels of the full-resolution slide, origin top-left
//! - **region**: pixels of a queried region at some level, origin at the region
//!
//! Types here carry no space tag; the functions that consume them document
//! which space they expect.

use serde::Serialize;

/// Highest pyramid level accepted anywhere in the crate.
///
/// `2^30` level-0 pixels per level pixel is far beyond any real slide and
/// keeps `downsample(level)` well inside `i64`.
pub const MAX_LEVEL: u32 = 30;

/// Downsample factor of a pyramid level.
#[inline]
pub const fn downsample(level: u32) -> i64 {
    1i64 << level
}

// =============================================================================
// Point / Size
// =============================================================================

/// An integer point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

impl Point {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

impl From<(i64, i64)> for Point {
    fn from((x, y): (i64, i64)) -> Self {
        Self { x, y }
    }
}

/// A width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A square of side `side`.
    pub const fn square(side: u32) -> Self {
        Self::new(side, side)
    }

    pub const fn is_square(&self) -> bool {
        self.width == self.height
    }

    /// Size of the same extent at level 0, given a size at `level`.
    pub fn to_level0(self, level: u32) -> (i64, i64) {
        let ds = downsample(level);
        (self.width as i64 * ds, self.height as i64 * ds)
    }
}

// =============================================================================
// BoundingBox
// =============================================================================

/// An axis-aligned box: signed origin, unsigned extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BoundingBox {
    pub location: Point,
    pub size: Size,
}

impl BoundingBox {
    pub const fn new(location: Point, size: Size) -> Self {
        Self { location, size }
    }

    /// Level-0 box covered by a region of `size` level pixels at `location`.
    ///
    /// The extent saturates at `u32::MAX`.
    pub fn region(location: Point, level: u32, size: Size) -> Self {
        let (width, height) = size.to_level0(level);
        let clamp = |v: i64| u32::try_from(v).unwrap_or(u32::MAX);
        Self::new(location, Size::new(clamp(width), clamp(height)))
    }

    #[inline]
    pub fn width(&self) -> i64 {
        self.size.width as i64
    }

    #[inline]
    pub fn height(&self) -> i64 {
        self.size.height as i64
    }

    #[inline]
    pub fn x2(&self) -> i64 {
        self.location.x + self.width()
    }

    #[inline]
    pub fn y2(&self) -> i64 {
        self.location.y + self.height()
    }

    /// Intersection test with inclusive bounds: boxes that only touch overlap.
    pub fn overlaps(&self, other: &BoundingBox) -> bool {
        let x_overlap = self.location.x <= other.x2() && other.location.x <= self.x2();
        let y_overlap = self.location.y <= other.y2() && other.location.y <= self.y2();
        x_overlap && y_overlap
    }

    /// Extent divided by `2^level`, flooring. The location is unchanged.
    pub fn scaled(&self, level: u32) -> Size {
        Size::new(self.size.width >> level, self.size.height >> level)
    }
}

// =============================================================================
// Span
// =============================================================================

/// A rectangle given by its corners, `x1..x2` and `y1..y2`.
///
/// Produced by [`relative_overlap`]; may be empty or inverted when the two
/// boxes do not intersect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub x1: i64,
    pub y1: i64,
    pub x2: i64,
    pub y2: i64,
}

impl Span {
    pub fn width(&self) -> i64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i64 {
        self.y2 - self.y1
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    /// Every corner divided by `2^level`, flooring.
    pub fn scaled(&self, level: u32) -> Span {
        let ds = downsample(level);
        Span {
            x1: self.x1.div_euclid(ds),
            y1: self.y1.div_euclid(ds),
            x2: self.x2.div_euclid(ds),
            y2: self.y2.div_euclid(ds),
        }
    }
}

/// Locate box `a` inside box `b`.
///
/// Returns the part of `a` that lies within `b`, in `b`'s local frame:
/// `x1 = max(a.x - b.x, 0)` and `x2 = min(a.x - b.x + a.width, b.width)`,
/// likewise for y. Used both to find the crop inside an annotation's mask
/// (region relative to annotation) and the paste position inside a region
/// (annotation relative to region).
pub fn relative_overlap(a: &BoundingBox, b: &BoundingBox) -> Span {
    let dx = a.location.x - b.location.x;
    let dy = a.location.y - b.location.y;
    Span {
        x1: dx.max(0),
        y1: dy.max(0),
        x2: (dx + a.width()).min(b.width()),
        y2: (dy + a.height()).min(b.height()),
    }
}
