//! Folder preprocessing end to end.

use std::fs;
use std::path::Path;

use image::{ColorType, DynamicImage};
use wsi_tiler::{PreprocessOptions, PreprocessSummary, SlidePreprocessor};

use super::test_utils::*;

fn open_jpeg(path: &Path) -> DynamicImage {
    image::open(path).unwrap_or_else(|e| panic!("{}: {e}", path.display()))
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn level1_options() -> PreprocessOptions {
    PreprocessOptions {
        level: 1,
        tile_size: 128,
        ..Default::default()
    }
}

#[test]
fn test_preprocess_folder() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();

    let slide = write_slide(
        input.path(),
        "biopsy.ndpi",
        &ndpi_slide(half_tissue, TileCompression::Jpeg),
    );
    write_annotations(&slide, &[square(128, 128, 256)]);
    write_slide(
        input.path(),
        "lonely.ndpi",
        &ndpi_slide(half_tissue, TileCompression::Jpeg),
    );
    fs::write(input.path().join("notes.txt"), "not a slide").unwrap();

    let summary = SlidePreprocessor::new(level1_options())
        .preprocess(input.path(), output.path())
        .unwrap();
    assert_eq!(
        summary,
        PreprocessSummary {
            slides_found: 2,
            slides_processed: 1,
            slides_skipped: 1,
            slides_failed: 0,
            tiles_written: 8,
        }
    );

    assert_eq!(file_names(output.path()), vec!["biopsy"]);
    let slide_dir = output.path().join("biopsy");
    let names = file_names(&slide_dir);
    assert_eq!(names.len(), 16);
    assert!(names.contains(&"biopsy_0_0_0.jpeg".to_string()));
    assert!(names.contains(&"biopsy_256_768_0_segment.jpeg".to_string()));
    assert!(!names.iter().any(|n| n.starts_with("biopsy_512_")));

    // Grayscale tiles by default.
    let tile = open_jpeg(&slide_dir.join("biopsy_0_0_0.jpeg"));
    assert_eq!(tile.color(), ColorType::L8);
    assert_eq!((tile.width(), tile.height()), (128, 128));
    let luma = tile.to_luma8().get_pixel(64, 64)[0] as i32;
    assert!((luma - 115).abs() <= 10, "luma {luma}");

    // Tile (256, 256) shows the annotation in its top-left level-1 quadrant.
    let mask = open_jpeg(&slide_dir.join("biopsy_256_256_0_segment.jpeg")).to_luma8();
    assert_eq!(mask.dimensions(), (128, 128));
    assert!(mask.get_pixel(20, 20)[0] > 200);
    assert!(mask.get_pixel(100, 100)[0] < 50);
}

#[test]
fn test_preprocess_in_color_with_rotations() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();

    let slide = write_slide(
        input.path(),
        "case.ndpi",
        &ndpi_slide(all_tissue, TileCompression::None),
    );
    write_annotations(&slide, &[square(300, 300, 200)]);

    let options = PreprocessOptions {
        level: 0,
        tile_size: 256,
        rotate: true,
        color: true,
        jpeg_quality: 90,
        ..Default::default()
    };
    let summary = SlidePreprocessor::new(options)
        .preprocess(input.path(), output.path())
        .unwrap();
    assert_eq!(summary.slides_processed, 1);
    assert_eq!(summary.tiles_written, 16 + 4 * 3);

    let slide_dir = output.path().join("case");
    assert_eq!(file_names(&slide_dir).len(), 2 * (16 + 4 * 3));

    let rotated = open_jpeg(&slide_dir.join("case_512_256_30.jpeg"));
    assert_eq!(rotated.color(), ColorType::Rgb8);
    let mask = open_jpeg(&slide_dir.join("case_512_256_30_segment.jpeg"));
    assert_eq!(mask.color(), ColorType::L8);
    assert!(!slide_dir.join("case_0_0_15.jpeg").exists());
}

#[test]
fn test_custom_extension_and_suffix() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();

    let nested = input.path().join("batch");
    fs::create_dir(&nested).unwrap();
    write_slide(&nested, "scan.svs", &svs_slide(half_tissue));
    fs::write(
        nested.join("scan.svs.xml"),
        ndpa_document(&[square(100, 100, 200)]),
    )
    .unwrap();
    // Not picked up: wrong extension.
    let other = write_slide(
        input.path(),
        "other.ndpi",
        &ndpi_slide(half_tissue, TileCompression::Jpeg),
    );
    write_annotations(&other, &[square(100, 100, 200)]);

    let options = PreprocessOptions {
        slide_extensions: vec!["svs".to_string()],
        annotation_suffix: ".xml".to_string(),
        ..level1_options()
    };
    let summary = SlidePreprocessor::new(options)
        .preprocess(input.path(), output.path())
        .unwrap();

    assert_eq!(summary.slides_found, 1);
    assert_eq!(summary.slides_processed, 1);
    assert_eq!(summary.tiles_written, 8);
    assert!(output.path().join("scan").is_dir());
    assert!(!output.path().join("other").exists());
}

#[test]
fn test_unreadable_slide_does_not_stop_the_run() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();

    let good = write_slide(
        input.path(),
        "a_good.ndpi",
        &ndpi_slide(half_tissue, TileCompression::Jpeg),
    );
    write_annotations(&good, &[square(128, 128, 256)]);
    let plain = write_slide(input.path(), "b_plain.ndpi", &uncalibrated_slide(512, 512));
    write_annotations(&plain, &[square(10, 10, 50)]);

    let summary = SlidePreprocessor::new(level1_options())
        .preprocess(input.path(), output.path())
        .unwrap();
    assert_eq!(summary.slides_found, 2);
    assert_eq!(summary.slides_processed, 1);
    assert_eq!(summary.slides_failed, 1);
    assert_eq!(summary.tiles_written, 8);
}

#[test]
fn test_strip_organized_slide_is_counted_as_failed() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();

    let strips = image::RgbImage::from_pixel(256, 128, TISSUE);
    let data = TiffBuilder::new().ifd(IfdBuilder::stripped(&strips)).build();
    let slide = write_slide(input.path(), "scanner.ndpi", &data);
    write_annotations(&slide, &[square(10, 10, 50)]);

    let summary = SlidePreprocessor::new(level1_options())
        .preprocess(input.path(), output.path())
        .unwrap();
    assert_eq!(summary.slides_found, 1);
    assert_eq!(summary.slides_failed, 1);
    assert_eq!(summary.tiles_written, 0);
    assert!(!output.path().join("scanner").exists());
}
