//! Reading synthetic pyramidal TIFF slides.

use image::{Rgb, Rgba, RgbImage};
use wsi_tiler::{
    MemoryRangeReader, Point, SlideError, SlideFormat, SlideReport, SlideSource, Size, TiffError,
    TiffSlide,
};

use super::test_utils::*;

fn memory_slide(data: Vec<u8>, name: &str) -> TiffSlide<MemoryRangeReader> {
    TiffSlide::from_reader(MemoryRangeReader::new(data, name)).unwrap()
}

fn close_to(actual: Rgb<u8>, expected: Rgb<u8>, tolerance: i32) -> bool {
    actual
        .0
        .iter()
        .zip(expected.0)
        .all(|(&a, e)| (a as i32 - e as i32).abs() <= tolerance)
}

fn rgb(pixel: &Rgba<u8>) -> Rgb<u8> {
    Rgb([pixel[0], pixel[1], pixel[2]])
}

#[test]
fn test_open_ndpi_slide_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_slide(dir.path(), "scan.ndpi", &ndpi_slide(half_tissue, TileCompression::Jpeg));

    let slide = TiffSlide::open(&path).unwrap();
    assert_eq!(slide.format(), SlideFormat::HamamatsuNdpi);
    assert_eq!(slide.dimensions(), (SLIDE_SIDE, SLIDE_SIDE));
    assert_eq!(slide.level_count(), 3);
    assert_eq!(slide.level_dimensions(1), Some((512, 512)));
    assert_eq!(slide.level_dimensions(2), Some((256, 256)));
    assert_eq!(slide.level_dimensions(3), None);
    assert_eq!(slide.level_downsample(2), Some(4.0));
    assert_eq!(slide.tile_size(0), Some((256, 256)));

    let calibration = slide.calibration().unwrap();
    assert!((calibration.mpp.0 - SLIDE_MPP).abs() < 1e-9);
    assert!((calibration.mpp.1 - SLIDE_MPP).abs() < 1e-9);
    assert_eq!(calibration.offset, (SLIDE_OFFSET.0 as i64, SLIDE_OFFSET.1 as i64));
    assert_eq!(calibration.dimensions, (SLIDE_SIDE, SLIDE_SIDE));
}

#[test]
fn test_open_svs_with_shared_tables() {
    let mut slide = memory_slide(svs_slide(all_tissue), "memory.svs");

    assert_eq!(slide.format(), SlideFormat::AperioSvs);
    // The label image is not part of the pyramid.
    assert_eq!(slide.level_count(), 3);
    assert_eq!(slide.metadata().mpp, Some(SLIDE_MPP));
    assert_eq!(slide.metadata().magnification, Some(20.0));

    let calibration = slide.calibration().unwrap();
    assert_eq!(calibration.mpp, (SLIDE_MPP, SLIDE_MPP));
    assert_eq!(calibration.offset, (0, 0));

    let region = slide
        .read_region(Point::new(240, 240), 0, Size::square(32))
        .unwrap();
    for (_, _, pixel) in region.enumerate_pixels() {
        assert_eq!(pixel[3], 255);
        assert!(close_to(rgb(pixel), TISSUE, 8), "{pixel:?}");
    }
}

#[test]
fn test_read_region_across_tile_boundaries() {
    let mut slide = memory_slide(uncalibrated_slide(600, 400), "gradient.tif");
    assert_eq!(slide.format(), SlideFormat::GenericTiff);

    let region = slide
        .read_region(Point::new(250, 250), 0, Size::new(20, 12))
        .unwrap();
    assert_eq!(region.dimensions(), (20, 12));
    for (x, y, pixel) in region.enumerate_pixels() {
        let expected = Rgba([(250 + x) as u8, (250 + y) as u8, 7, 255]);
        assert_eq!(*pixel, expected, "at ({x}, {y})");
    }
    // Four tiles were decoded and kept.
    assert_eq!(slide.tile_cache().len(), 4);

    slide
        .read_region(Point::new(250, 250), 0, Size::new(20, 12))
        .unwrap();
    assert_eq!(slide.tile_cache().len(), 4);
}

#[test]
fn test_pixels_outside_slide_are_transparent() {
    let mut slide = memory_slide(uncalibrated_slide(600, 400), "gradient.tif");

    let region = slide
        .read_region(Point::new(590, 390), 0, Size::square(20))
        .unwrap();
    assert_eq!(*region.get_pixel(5, 5), Rgba([(595 % 256) as u8, (395 % 256) as u8, 7, 255]));
    assert_eq!(*region.get_pixel(15, 5), Rgba([0, 0, 0, 0]));
    assert_eq!(*region.get_pixel(5, 15), Rgba([0, 0, 0, 0]));

    let outside = slide
        .read_region(Point::new(-100, -100), 0, Size::square(10))
        .unwrap();
    assert!(outside.pixels().all(|p| *p == Rgba([0, 0, 0, 0])));
}

#[test]
fn test_read_region_at_lower_levels() {
    let mut slide = memory_slide(
        ndpi_slide(half_tissue, TileCompression::None),
        "levels.ndpi",
    );

    let whole = slide
        .read_region(Point::new(0, 0), 2, Size::square(256))
        .unwrap();
    assert_eq!(rgb(whole.get_pixel(10, 10)), TISSUE);
    assert_eq!(rgb(whole.get_pixel(127, 200)), TISSUE);
    assert_eq!(rgb(whole.get_pixel(128, 200)), GLASS);

    // Locations stay in level-0 pixels.
    let right = slide
        .read_region(Point::new(512, 0), 1, Size::square(8))
        .unwrap();
    assert_eq!(rgb(right.get_pixel(0, 0)), GLASS);
    let left = slide
        .read_region(Point::new(496, 0), 1, Size::square(16))
        .unwrap();
    assert_eq!(rgb(left.get_pixel(7, 0)), TISSUE);
    assert_eq!(rgb(left.get_pixel(8, 0)), GLASS);

    assert!(matches!(
        slide.read_region(Point::new(0, 0), 3, Size::square(8)),
        Err(SlideError::InvalidLevel { level: 3, count: 3 })
    ));
}

#[test]
fn test_missing_calibration() {
    let slide = memory_slide(uncalibrated_slide(300, 300), "plain.tif");
    assert!(matches!(
        slide.calibration(),
        Err(SlideError::MissingCalibration(_))
    ));
}

#[test]
fn test_strip_organized_file_is_rejected() {
    let image = RgbImage::from_pixel(64, 32, TISSUE);
    let data = TiffBuilder::new().ifd(IfdBuilder::stripped(&image)).build();

    let result = TiffSlide::from_reader(MemoryRangeReader::new(data, "strips.ndpi"));
    assert!(matches!(
        result,
        Err(SlideError::Tiff(TiffError::StripOrganization))
    ));
}

#[test]
fn test_unsupported_compression_is_rejected() {
    let image = RgbImage::from_pixel(256, 256, TISSUE);
    let ifd = IfdBuilder::tiled(&image, 256, TileCompression::None).tag(259, Value::Short(vec![5]));
    let data = TiffBuilder::new().ifd(ifd).build();

    let result = TiffSlide::from_reader(MemoryRangeReader::new(data, "lzw.tif"));
    assert!(matches!(
        result,
        Err(SlideError::Tiff(TiffError::UnsupportedCompression(_)))
    ));
}

#[test]
fn test_tile_cache_capacity() {
    let mut slide =
        memory_slide(uncalibrated_slide(600, 400), "gradient.tif").with_tile_cache_capacity(0);
    slide
        .read_region(Point::new(0, 0), 0, Size::square(300))
        .unwrap();
    assert!(slide.tile_cache().is_empty());
}

#[test]
fn test_slide_report() {
    let slide = memory_slide(ndpi_slide(half_tissue, TileCompression::Jpeg), "report.ndpi");
    let report = SlideReport::from_tiff("report.ndpi", &slide);

    assert_eq!(report.format, Some(SlideFormat::HamamatsuNdpi));
    assert_eq!(report.dimensions, (SLIDE_SIDE, SLIDE_SIDE));
    assert_eq!(report.levels.len(), 3);
    assert_eq!(report.levels[2].downsample, 4.0);

    let text = report.to_text();
    assert!(text.contains("Format: Hamamatsu NDPI"));
    assert!(text.contains("Levels: 3"));
    assert!(!text.contains("Calibration: missing"));
}
