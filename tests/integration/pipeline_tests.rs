//! Annotated slides and tile walks over synthetic TIFF files.

use std::fs;
use std::path::{Path, PathBuf};

use image::Rgb;
use wsi_tiler::{
    AnnotatedSlide, AnnotationError, MaskPolicy, Point, SlideError, Size, Tile, TileError,
};

use super::test_utils::*;

/// Level-0 annotation square used throughout: 128..384 on both axes.
const ANNOTATION: (i64, i64, i64) = (128, 128, 256);

fn annotated(dir: &Path, slide: Vec<u8>) -> AnnotatedSlide {
    let slide_path = write_slide(dir, "case.ndpi", &slide);
    let (x, y, side) = ANNOTATION;
    let annotation_path = write_annotations(&slide_path, &[square(x, y, side)]);
    AnnotatedSlide::open(&slide_path, &annotation_path, MaskPolicy::default()).unwrap()
}

fn positions(tiles: &[Tile]) -> Vec<(i64, i64, u32)> {
    tiles.iter().map(|t| (t.x, t.y, t.rotation)).collect()
}

fn alpha(tile: &Tile, x: u32, y: u32) -> u8 {
    tile.mask.get_pixel(x, y)[1]
}

fn close_to(actual: &Rgb<u8>, expected: Rgb<u8>, tolerance: i32) -> bool {
    actual
        .0
        .iter()
        .zip(expected.0)
        .all(|(&a, e)| (a as i32 - e as i32).abs() <= tolerance)
}

#[test]
fn test_open_annotated_slide() {
    let dir = tempfile::tempdir().unwrap();
    let slide = annotated(dir.path(), ndpi_slide(half_tissue, TileCompression::None));

    assert_eq!(slide.dimensions(), (SLIDE_SIDE, SLIDE_SIDE));
    assert_eq!(slide.annotations().len(), 1);

    // Stage offsets put the polygon back on its level-0 pixels.
    let annotation = slide.annotations().iter().next().unwrap();
    let (x, y, side) = ANNOTATION;
    assert_eq!(annotation.polygon()[0], Point::new(x, y));
    assert_eq!(annotation.polygon()[2], Point::new(x + side, y + side));
}

#[test]
fn test_region_mask_matches_annotation() {
    let dir = tempfile::tempdir().unwrap();
    let mut slide = annotated(dir.path(), ndpi_slide(half_tissue, TileCompression::None));

    let (image, mask) = slide
        .read_region(Point::new(0, 0), 1, Size::square(512))
        .unwrap();
    assert_eq!(image.dimensions(), (512, 512));
    assert_eq!(mask.dimensions(), (512, 512));

    assert_eq!(*image.get_pixel(20, 20), TISSUE);
    assert_eq!(*image.get_pixel(400, 20), GLASS);

    // The square covers level-1 pixels 64..192.
    assert_eq!(mask.get_pixel(128, 128)[1], 255);
    assert_eq!(mask.get_pixel(70, 180)[1], 255);
    assert_eq!(mask.get_pixel(20, 20)[1], 0);
    assert_eq!(mask.get_pixel(300, 300)[1], 0);
    assert_eq!(mask.get_pixel(128, 240)[1], 0);
}

#[test]
fn test_walk_skips_background() {
    let dir = tempfile::tempdir().unwrap();
    let mut slide = annotated(dir.path(), ndpi_slide(half_tissue, TileCompression::Jpeg));

    let tiles: Vec<Tile> = slide
        .build_tiles(0, 256, 0.0, false)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    let expected: Vec<_> = [0, 256]
        .into_iter()
        .flat_map(|x| [0, 256, 512, 768].into_iter().map(move |y| (x, y, 0)))
        .collect();
    assert_eq!(positions(&tiles), expected);

    for tile in &tiles {
        assert_eq!(tile.image.dimensions(), (256, 256));
        assert_eq!(tile.mask.dimensions(), (256, 256));
    }

    // Tile (0, 0) holds the annotation from 128 onwards.
    assert_eq!(alpha(&tiles[0], 200, 200), 255);
    assert_eq!(alpha(&tiles[0], 50, 50), 0);
    // Tile (256, 256) holds it up to 384.
    let inner = tiles.iter().find(|t| (t.x, t.y) == (256, 256)).unwrap();
    assert_eq!(alpha(inner, 10, 10), 255);
    assert_eq!(alpha(inner, 200, 200), 0);
    // Tile (0, 768) is far from it.
    let far = tiles.iter().find(|t| (t.x, t.y) == (0, 768)).unwrap();
    assert!(far.mask.pixels().all(|p| p[1] == 0));
}

#[test]
fn test_walk_with_overlap() {
    let dir = tempfile::tempdir().unwrap();
    let mut slide = annotated(dir.path(), ndpi_slide(all_tissue, TileCompression::None));

    let tiles = slide.build_tiles(1, 128, 0.5, false).unwrap();
    assert_eq!(tiles.grid().stride, 128);
    assert_eq!(tiles.grid().tile_size_level0, 256);

    let tiles: Vec<Tile> = tiles.collect::<Result<_, _>>().unwrap();
    assert_eq!(tiles.len(), 7 * 7);
    assert_eq!(
        positions(&tiles[..3]),
        vec![(0, 0, 0), (0, 128, 0), (0, 256, 0)]
    );
    assert_eq!(positions(&tiles[7..8]), vec![(128, 0, 0)]);
    assert_eq!(tiles[0].image.dimensions(), (128, 128));
}

#[test]
fn test_walk_with_rotations() {
    let dir = tempfile::tempdir().unwrap();
    let mut slide = annotated(dir.path(), ndpi_slide(all_tissue, TileCompression::None));

    let tiles: Vec<Tile> = slide
        .build_tiles(0, 256, 0.0, true)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    // 16 base tiles; only the four inner cells leave a 54 px border.
    assert_eq!(tiles.len(), 16 + 4 * 3);
    let rotated: Vec<_> = tiles.iter().filter(|t| t.rotation != 0).collect();
    assert_eq!(rotated.len(), 12);
    for tile in &rotated {
        assert!([256, 512].contains(&tile.x) && [256, 512].contains(&tile.y));
    }

    // Rotations directly follow their base tile.
    let start = tiles
        .iter()
        .position(|t| (t.x, t.y, t.rotation) == (256, 256, 0))
        .unwrap();
    assert_eq!(
        positions(&tiles[start..start + 4]),
        vec![(256, 256, 0), (256, 256, 15), (256, 256, 30), (256, 256, 45)]
    );

    // No rotation fill makes it into the crop.
    let diagonal = &tiles[start + 3];
    for y in 2..254 {
        for x in 2..254 {
            assert!(
                close_to(diagonal.image.get_pixel(x, y), TISSUE, 2),
                "fill at ({x}, {y})"
            );
        }
    }
}

#[test]
fn test_rotated_mask_follows_image() {
    let dir = tempfile::tempdir().unwrap();
    let mut slide = annotated(dir.path(), ndpi_slide(all_tissue, TileCompression::None));

    let tiles: Vec<Tile> = slide
        .build_tiles(0, 256, 0.0, true)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    let base = tiles
        .iter()
        .find(|t| (t.x, t.y, t.rotation) == (256, 256, 0))
        .unwrap();
    let quarter = tiles
        .iter()
        .find(|t| (t.x, t.y, t.rotation) == (256, 256, 45))
        .unwrap();

    // The annotation fills the top-left quadrant of the base tile, with its
    // corner on the tile centre.
    assert_eq!(alpha(base, 20, 20), 255);
    assert_eq!(alpha(base, 200, 200), 0);
    assert_eq!(alpha(base, 200, 30), 0);

    // Turned 45° counter-clockwise, that quadrant points left.
    assert_eq!(alpha(quarter, 30, 128), 255);
    assert_eq!(alpha(quarter, 128, 30), 0);
    assert_eq!(alpha(quarter, 226, 128), 0);
}

#[test]
fn test_diamond_mask_at_default_level() {
    let dir = tempfile::tempdir().unwrap();
    let slide_path = write_slide(
        dir.path(),
        "case.ndpi",
        &ndpi_slide(all_tissue, TileCompression::None),
    );
    let diamond = vec![(128, 384), (384, 128), (640, 384), (384, 640)];
    let annotation_path = write_annotations(&slide_path, &[diamond]);
    let mut slide =
        AnnotatedSlide::open(&slide_path, &annotation_path, MaskPolicy::default()).unwrap();

    let tiles: Vec<Tile> = slide
        .build_tiles(2, 64, 0.0, false)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(tiles.len(), 16);

    // Level-0 point to its tile and level-2 pixel inside it.
    let alpha_at = |x: i64, y: i64| {
        let tile = tiles
            .iter()
            .find(|t| (t.x, t.y) == (x / 256 * 256, y / 256 * 256))
            .unwrap();
        alpha(tile, ((x % 256) / 4) as u32, ((y % 256) / 4) as u32)
    };

    assert_eq!(alpha_at(384, 384), 255, "centre");
    assert_eq!(alpha_at(300, 400), 255);
    // One point in each corner pocket of the bounding box.
    for (x, y) in [(140, 140), (630, 140), (630, 630), (140, 630)] {
        assert_eq!(alpha_at(x, y), 0, "outside at ({x}, {y})");
    }
    assert!(tiles
        .iter()
        .filter(|t| t.x >= 768 || t.y >= 768)
        .all(|t| t.mask.pixels().all(|p| p[1] == 0)));
}

#[test]
fn test_level_with_wrong_downsample() {
    let dir = tempfile::tempdir().unwrap();
    // Level 2 is 3.5x smaller than level 0 instead of 4x.
    let base = render_level(SLIDE_SIDE, SLIDE_SIDE, 0, all_tissue);
    let half = render_level(SLIDE_SIDE, SLIDE_SIDE, 1, all_tissue);
    let odd = image::RgbImage::from_pixel(293, 293, TISSUE);
    let data = TiffBuilder::new()
        .ifd(
            IfdBuilder::tiled(&base, 256, TileCompression::None)
                .resolution_cm(SLIDE_MPP)
                .ndpi(SLIDE_OFFSET),
        )
        .ifd(IfdBuilder::tiled(&half, 256, TileCompression::None))
        .ifd(IfdBuilder::tiled(&odd, 256, TileCompression::None))
        .build();
    let mut slide = annotated(dir.path(), data);

    assert!(slide.build_tiles(1, 128, 0.0, false).is_ok());
    assert!(matches!(
        slide.build_tiles(2, 64, 0.0, false),
        Err(TileError::Slide(SlideError::CalibrationMismatch {
            level: 2,
            expected: 4,
            ..
        }))
    ));
    assert!(matches!(
        slide.build_tiles(3, 64, 0.0, false),
        Err(TileError::Slide(SlideError::InvalidLevel { level: 3, .. }))
    ));
}

#[test]
fn test_open_requires_calibration() {
    let dir = tempfile::tempdir().unwrap();
    let slide_path = write_slide(dir.path(), "plain.tif", &uncalibrated_slide(512, 512));
    let annotation_path = write_annotations(&slide_path, &[square(10, 10, 50)]);

    assert!(matches!(
        AnnotatedSlide::open(&slide_path, &annotation_path, MaskPolicy::default()),
        Err(SlideError::MissingCalibration(_))
    ));
}

#[test]
fn test_open_rejects_open_polygons() {
    let dir = tempfile::tempdir().unwrap();
    let slide_path = write_slide(
        dir.path(),
        "case.ndpi",
        &ndpi_slide(half_tissue, TileCompression::None),
    );
    let document = ndpa_document(&[square(100, 100, 50), square(300, 300, 50)]);
    // Open the second polygon.
    let position = document.rfind("<closed>1</closed>").unwrap();
    let mut broken = document;
    broken.replace_range(position..position + "<closed>1</closed>".len(), "<closed>0</closed>");

    let annotation_path = PathBuf::from(format!("{}.ndpa", slide_path.display()));
    fs::write(&annotation_path, broken).unwrap();

    assert!(matches!(
        AnnotatedSlide::open(&slide_path, &annotation_path, MaskPolicy::default()),
        Err(SlideError::Annotation(AnnotationError::MalformedAnnotation {
            index: 1,
            ..
        }))
    ));
}

#[test]
fn test_missing_annotation_file() {
    let dir = tempfile::tempdir().unwrap();
    let slide_path = write_slide(
        dir.path(),
        "case.ndpi",
        &ndpi_slide(half_tissue, TileCompression::None),
    );

    assert!(matches!(
        AnnotatedSlide::open(&slide_path, dir.path().join("none.ndpa"), MaskPolicy::default()),
        Err(SlideError::Annotation(AnnotationError::Io(_)))
    ));
}
