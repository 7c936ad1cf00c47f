use image::{imageops, DynamicImage, GrayAlphaImage, RgbaImage};
use tracing::trace;

use crate::error::AnnotationError;
use crate::geometry::{Point, Size};

use super::polygon::Annotation;

/// The annotations of one slide.
#[derive(Debug, Default)]
pub struct AnnotationCollection {
    annotations: Vec<Annotation>,
}

impl AnnotationCollection {
    pub fn new(annotations: Vec<Annotation>) -> Self {
        Self { annotations }
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Annotation> {
        self.annotations.iter()
    }

    /// Combined mask of every annotation touching a square region.
    ///
    /// `location` is in level-0 pixels, `size` in `level` pixels. Later
    /// annotations are composited over earlier ones. The luminance channel
    /// of the result carries no information; alpha is the mask.
    pub fn render_region(
        &mut self,
        location: Point,
        level: u32,
        size: Size,
    ) -> Result<GrayAlphaImage, AnnotationError> {
        if !size.is_square() {
            return Err(AnnotationError::UnsupportedShape {
                width: size.width,
                height: size.height,
            });
        }

        let (width, height) = size.to_level0(level);
        let level0_size = Size::new(
            u32::try_from(width).unwrap_or(u32::MAX),
            u32::try_from(height).unwrap_or(u32::MAX),
        );

        let mut combined = RgbaImage::new(size.width, size.height);
        for (index, annotation) in self.annotations.iter_mut().enumerate() {
            if !annotation.overlap(location, level0_size) {
                continue;
            }
            trace!(index, x = location.x, y = location.y, level, "Compositing annotation");
            let mask = annotation.render_region(location, level, size);
            imageops::overlay(&mut combined, &mask, 0, 0);
        }

        Ok(DynamicImage::ImageRgba8(combined).into_luma_alpha8())
    }
}

impl<'a> IntoIterator for &'a AnnotationCollection {
    type Item = &'a Annotation;
    type IntoIter = std::slice::Iter<'a, Annotation>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
