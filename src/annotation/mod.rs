//! Polygon annotations and their masks.
//!
//! An [`Annotation`] is one closed polygon in level-0 pixels. Its mask is
//! rendered by drawing the outline, flood-filling the outside from a corner
//! of the (margin-expanded) bounding box and inverting alpha, so the polygon
//! interior ends up opaque. Direct interior fills are unreliable near thin
//! or concave walls; the complement fill is not.
//!
//! [`AnnotationCollection`] composites every annotation touching a region
//! into one two-channel mask. [`AnnotationParser`] builds a collection from
//! a Hamamatsu NDPA document.

mod collection;
mod parser;
mod polygon;
mod raster;
mod xml;

pub use collection::AnnotationCollection;
pub use parser::{read_ndpa, AnnotationParser};
pub use polygon::Annotation;
pub use raster::{draw_closed_polyline, flood_fill, invert_alpha};
pub use xml::{parse_xml, XmlElement};

// =============================================================================
// Mask policy
// =============================================================================

/// Default margin added to each bounding box dimension.
pub const DEFAULT_MASK_MARGIN: u32 = 16;

/// Default outline width in pixels.
pub const DEFAULT_LINE_WIDTH: u32 = 2;

/// Default number of rendered levels kept per annotation.
pub const DEFAULT_CACHED_LEVELS: usize = 1;

/// Corner of the mask raster where the exterior flood fill starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeedCorner {
    #[default]
    TopLeft,
    TopRight,
    BottomRight,
    BottomLeft,
}

impl SeedCorner {
    /// This corner followed by the other three, clockwise.
    pub fn clockwise_from(self) -> [SeedCorner; 4] {
        use SeedCorner::*;
        match self {
            TopLeft => [TopLeft, TopRight, BottomRight, BottomLeft],
            TopRight => [TopRight, BottomRight, BottomLeft, TopLeft],
            BottomRight => [BottomRight, BottomLeft, TopLeft, TopRight],
            BottomLeft => [BottomLeft, TopLeft, TopRight, BottomRight],
        }
    }

    /// Pixel coordinate of this corner in a `width x height` raster.
    pub fn pixel(self, width: u32, height: u32) -> (u32, u32) {
        let (right, bottom) = (width.saturating_sub(1), height.saturating_sub(1));
        match self {
            SeedCorner::TopLeft => (0, 0),
            SeedCorner::TopRight => (right, 0),
            SeedCorner::BottomRight => (right, bottom),
            SeedCorner::BottomLeft => (0, bottom),
        }
    }
}

impl std::str::FromStr for SeedCorner {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['_', ' '], "-").as_str() {
            "top-left" => Ok(SeedCorner::TopLeft),
            "top-right" => Ok(SeedCorner::TopRight),
            "bottom-right" => Ok(SeedCorner::BottomRight),
            "bottom-left" => Ok(SeedCorner::BottomLeft),
            other => Err(format!(
                "unknown seed corner '{other}' (expected top-left, top-right, bottom-right or bottom-left)"
            )),
        }
    }
}

/// How annotation masks are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskPolicy {
    /// Pixels added to each bounding box dimension, split between both sides
    pub margin: u32,

    /// Corner the exterior flood fill starts from
    pub seed: SeedCorner,

    /// Outline width in level pixels
    pub line_width: u32,

    /// Rendered levels kept per annotation (at least 1)
    pub cached_levels: usize,
}

impl Default for MaskPolicy {
    fn default() -> Self {
        Self {
            margin: DEFAULT_MASK_MARGIN,
            seed: SeedCorner::default(),
            line_width: DEFAULT_LINE_WIDTH,
            cached_levels: DEFAULT_CACHED_LEVELS,
        }
    }
}
