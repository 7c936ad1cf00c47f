//! Raster primitives used to turn a polygon into a mask.

use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_line_segment_mut;

/// Draw the closed polyline through `points` with a square brush.
///
/// The last point connects back to the first. Each segment is stamped
/// `width x width` times, with brush offsets `0..width` shifted by
/// `-(width - 1) / 2` on both axes. Pixels outside the image are clipped.
pub fn draw_closed_polyline(image: &mut RgbaImage, points: &[(i64, i64)], width: u32, color: Rgba<u8>) {
    let Some(&last) = points.last() else {
        return;
    };
    let width = width.max(1) as i64;
    let shift = (width - 1) / 2;

    let mut previous = last;
    for &current in points {
        for dy in 0..width {
            for dx in 0..width {
                let (ox, oy) = ((dx - shift) as f32, (dy - shift) as f32);
                draw_line_segment_mut(
                    image,
                    (previous.0 as f32 + ox, previous.1 as f32 + oy),
                    (current.0 as f32 + ox, current.1 as f32 + oy),
                    color,
                );
            }
        }
        previous = current;
    }
}

/// Replace the 4-connected region of the seed's colour with `fill`.
///
/// Uses an explicit stack, so region size is bounded by memory only.
/// Does nothing when the seed is out of bounds or already has the fill colour.
pub fn flood_fill(image: &mut RgbaImage, seed: (u32, u32), fill: Rgba<u8>) {
    let (width, height) = image.dimensions();
    if seed.0 >= width || seed.1 >= height {
        return;
    }
    let target = *image.get_pixel(seed.0, seed.1);
    if target == fill {
        return;
    }

    let mut stack = vec![seed];
    while let Some((x, y)) = stack.pop() {
        if *image.get_pixel(x, y) != target {
            continue;
        }
        image.put_pixel(x, y, fill);

        if x > 0 {
            stack.push((x - 1, y));
        }
        if x + 1 < width {
            stack.push((x + 1, y));
        }
        if y > 0 {
            stack.push((x, y - 1));
        }
        if y + 1 < height {
            stack.push((x, y + 1));
        }
    }
}

/// Invert the alpha channel in place.
pub fn invert_alpha(image: &mut RgbaImage) {
    for pixel in image.pixels_mut() {
        pixel[3] = 255 - pixel[3];
    }
}
