//! Mapping between physical stage coordinates and level-0 pixels.
//!
//! Annotation files record points in nanometres relative to the centre of
//! the whole glass slide. The scanned area is itself offset from that centre
//! by the scanner, so a physical coordinate maps to level 0 as
//!
//! ```text
//! pixel = round((coord - offset) / (mpp * 1000) + dimension / 2)
//! ```
//!
//! with ties rounded to even.

use serde::Serialize;

use crate::geometry::Point;

/// An image axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

/// The slide properties needed to place physical coordinates on level 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SlideCalibration {
    /// Level-0 dimensions in pixels (width, height)
    pub dimensions: (u32, u32),

    /// Level-0 microns per pixel (x, y)
    pub mpp: (f64, f64),

    /// Offset of the scanned area's centre from the slide centre, in nm (x, y)
    pub offset: (i64, i64),
}

impl SlideCalibration {
    pub fn new(dimensions: (u32, u32), mpp: (f64, f64), offset: (i64, i64)) -> Self {
        Self {
            dimensions,
            mpp,
            offset,
        }
    }

    /// Whether both mpp values are finite and positive.
    pub fn is_valid(&self) -> bool {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        valid(self.mpp.0) && valid(self.mpp.1)
    }

    fn axis(&self, axis: Axis) -> (i64, f64, u32) {
        match axis {
            Axis::X => (self.offset.0, self.mpp.0, self.dimensions.0),
            Axis::Y => (self.offset.1, self.mpp.1, self.dimensions.1),
        }
    }

    /// Map one physical coordinate (nm) to a level-0 pixel coordinate.
    pub fn physical_to_level0(&self, coord: i64, axis: Axis) -> i64 {
        let (offset, mpp, dimension) = self.axis(axis);
        physical_to_level0(coord, offset, mpp, dimension)
    }

    /// Map a physical point (nm) to a level-0 pixel point.
    pub fn physical_point_to_level0(&self, point: Point) -> Point {
        Point::new(
            self.physical_to_level0(point.x, Axis::X),
            self.physical_to_level0(point.y, Axis::Y),
        )
    }

    /// Inverse of [`physical_to_level0`](Self::physical_to_level0), rounded to the nearest nm.
    pub fn level0_to_physical(&self, pixel: i64, axis: Axis) -> i64 {
        let (offset, mpp, dimension) = self.axis(axis);
        let nm = (pixel as f64 - dimension as f64 / 2.0) * (mpp * 1000.0) + offset as f64;
        nm.round_ties_even() as i64
    }
}

/// Map one physical coordinate to level 0 given the axis' calibration.
///
/// `offset` is in nanometres, `mpp` in microns per pixel and `dimension` is
/// the slide's level-0 extent on the same axis.
pub fn physical_to_level0(coord: i64, offset: i64, mpp: f64, dimension: u32) -> i64 {
    let pixel = (coord - offset) as f64 / (mpp * 1000.0) + dimension as f64 / 2.0;
    pixel.round_ties_even() as i64
}
