//! Synthetic slides and annotation files for integration tests.
//!
//! [`TiffBuilder`] writes little-endian classic TIFF files: every tile and
//! out-of-line tag value is appended first, the IFD chain goes at the end.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, Rgb, RgbImage};

// =============================================================================
// Slide content
// =============================================================================

/// Stained tissue, well below the background level on green.
pub const TISSUE: Rgb<u8> = Rgb([180, 90, 170]);

/// Slide glass.
pub const GLASS: Rgb<u8> = Rgb([245, 245, 245]);

/// Level-0 side of the standard test slide.
pub const SLIDE_SIDE: u32 = 1024;

/// Microns per pixel of the standard test slide.
pub const SLIDE_MPP: f64 = 0.5;

/// Stage offset of the standard test slide, in nm.
pub const SLIDE_OFFSET: (i32, i32) = (100_000, -50_000);

/// Tissue on the left half of the slide, glass on the right.
pub fn half_tissue(x: u32, _y: u32) -> Rgb<u8> {
    if x < SLIDE_SIDE / 2 {
        TISSUE
    } else {
        GLASS
    }
}

/// Tissue everywhere.
pub fn all_tissue(_x: u32, _y: u32) -> Rgb<u8> {
    TISSUE
}

/// Render one level of a pattern defined on level-0 coordinates.
pub fn render_level(width: u32, height: u32, level: u32, pattern: fn(u32, u32) -> Rgb<u8>) -> RgbImage {
    let scale = 1u32 << level;
    RgbImage::from_fn(width >> level, height >> level, |x, y| {
        pattern(x * scale, y * scale)
    })
}

// =============================================================================
// TIFF builder
// =============================================================================

/// How tiles of a level are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileCompression {
    None,
    Jpeg,
    /// Abbreviated JPEG tiles sharing one JPEGTables entry, the way SVS files do
    JpegWithTables,
}

/// A tag value.
#[derive(Debug, Clone)]
pub enum Value {
    Short(Vec<u16>),
    Long(Vec<u32>),
    SLong(i32),
    Rational(u32, u32),
    Ascii(String),
    Undefined(Vec<u8>),
}

impl Value {
    fn field_type(&self) -> u16 {
        match self {
            Value::Short(_) => 3,
            Value::Long(_) => 4,
            Value::SLong(_) => 9,
            Value::Rational(..) => 5,
            Value::Ascii(_) => 2,
            Value::Undefined(_) => 7,
        }
    }

    fn count(&self) -> u32 {
        match self {
            Value::Short(v) => v.len() as u32,
            Value::Long(v) => v.len() as u32,
            Value::SLong(_) | Value::Rational(..) => 1,
            Value::Ascii(s) => s.len() as u32 + 1,
            Value::Undefined(v) => v.len() as u32,
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        match self {
            Value::Short(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Value::Long(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Value::SLong(x) => x.to_le_bytes().to_vec(),
            Value::Rational(n, d) => n.to_le_bytes().into_iter().chain(d.to_le_bytes()).collect(),
            Value::Ascii(s) => s.bytes().chain(std::iter::once(0)).collect(),
            Value::Undefined(v) => v.clone(),
        }
    }
}

/// One IFD under construction.
#[derive(Debug, Clone, Default)]
pub struct IfdBuilder {
    entries: Vec<(u16, Value)>,
    blobs: Vec<Vec<u8>>,
    blob_offsets_tag: Option<u16>,
    blob_counts_tag: Option<u16>,
}

impl IfdBuilder {
    /// A tiled RGB image cut into `tile_size` squares; edge tiles are padded.
    pub fn tiled(image: &RgbImage, tile_size: u32, compression: TileCompression) -> Self {
        let tiles_x = image.width().div_ceil(tile_size);
        let tiles_y = image.height().div_ceil(tile_size);

        let mut blobs = Vec::new();
        let mut tables = None;
        for ty in 0..tiles_y {
            for tx in 0..tiles_x {
                let tile = RgbImage::from_fn(tile_size, tile_size, |x, y| {
                    let (sx, sy) = (tx * tile_size + x, ty * tile_size + y);
                    if sx < image.width() && sy < image.height() {
                        *image.get_pixel(sx, sy)
                    } else {
                        Rgb([0, 0, 0])
                    }
                });
                let blob = match compression {
                    TileCompression::None => tile.into_raw(),
                    TileCompression::Jpeg => encode_jpeg(&tile),
                    TileCompression::JpegWithTables => {
                        let (shared, abbreviated) = split_jpeg(&encode_jpeg(&tile));
                        tables.get_or_insert(shared);
                        abbreviated
                    }
                };
                blobs.push(blob);
            }
        }

        let compression_value = match compression {
            TileCompression::None => 1,
            TileCompression::Jpeg | TileCompression::JpegWithTables => 7,
        };

        let mut ifd = Self {
            blobs,
            blob_offsets_tag: Some(324),
            blob_counts_tag: Some(325),
            ..Default::default()
        }
        .tag(256, Value::Long(vec![image.width()]))
        .tag(257, Value::Long(vec![image.height()]))
        .tag(258, Value::Short(vec![8, 8, 8]))
        .tag(259, Value::Short(vec![compression_value]))
        .tag(262, Value::Short(vec![2]))
        .tag(277, Value::Short(vec![3]))
        .tag(284, Value::Short(vec![1]))
        .tag(322, Value::Long(vec![tile_size]))
        .tag(323, Value::Long(vec![tile_size]));
        if let Some(tables) = tables {
            ifd = ifd.tag(347, Value::Undefined(tables));
        }
        ifd
    }

    /// An uncompressed RGB image stored as one strip per row.
    pub fn stripped(image: &RgbImage) -> Self {
        let blobs = image
            .rows()
            .map(|row| row.flat_map(|p| p.0).collect::<Vec<u8>>())
            .collect();
        Self {
            blobs,
            blob_offsets_tag: Some(273),
            blob_counts_tag: Some(279),
            ..Default::default()
        }
        .tag(256, Value::Long(vec![image.width()]))
        .tag(257, Value::Long(vec![image.height()]))
        .tag(258, Value::Short(vec![8, 8, 8]))
        .tag(259, Value::Short(vec![1]))
        .tag(262, Value::Short(vec![2]))
        .tag(277, Value::Short(vec![3]))
        .tag(278, Value::Long(vec![1]))
    }

    /// Add or replace a tag.
    pub fn tag(mut self, tag: u16, value: Value) -> Self {
        self.entries.retain(|(t, _)| *t != tag);
        self.entries.push((tag, value));
        self
    }

    pub fn description(self, text: &str) -> Self {
        self.tag(270, Value::Ascii(text.to_string()))
    }

    /// X/YResolution in pixels per centimetre for `mpp`.
    pub fn resolution_cm(self, mpp: f64) -> Self {
        let per_cm = (10_000.0 / mpp).round() as u32;
        self.tag(282, Value::Rational(per_cm, 1))
            .tag(283, Value::Rational(per_cm, 1))
            .tag(296, Value::Short(vec![3]))
    }

    /// The Hamamatsu marker and stage offset tags.
    pub fn ndpi(self, offset: (i32, i32)) -> Self {
        self.tag(65420, Value::Long(vec![1]))
            .tag(65422, Value::SLong(offset.0))
            .tag(65423, Value::SLong(offset.1))
    }
}

/// Assembles IFDs into a TIFF file.
#[derive(Debug, Default)]
pub struct TiffBuilder {
    ifds: Vec<IfdBuilder>,
}

impl TiffBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ifd(mut self, ifd: IfdBuilder) -> Self {
        self.ifds.push(ifd);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut data = vec![b'I', b'I', 42, 0, 0, 0, 0, 0];

        // Data first: tile blobs, then out-of-line tag values.
        let mut directories = Vec::new();
        for ifd in self.ifds {
            let mut offsets = Vec::new();
            let mut counts = Vec::new();
            for blob in &ifd.blobs {
                align(&mut data);
                offsets.push(data.len() as u32);
                counts.push(blob.len() as u32);
                data.extend_from_slice(blob);
            }

            let mut entries = ifd.entries;
            if let (Some(offsets_tag), Some(counts_tag)) = (ifd.blob_offsets_tag, ifd.blob_counts_tag) {
                entries.push((offsets_tag, Value::Long(offsets)));
                entries.push((counts_tag, Value::Long(counts)));
            }
            entries.sort_by_key(|(tag, _)| *tag);

            let mut raw = Vec::new();
            for (tag, value) in entries {
                let bytes = value.to_bytes();
                let mut field = [0u8; 4];
                if bytes.len() <= 4 {
                    field[..bytes.len()].copy_from_slice(&bytes);
                } else {
                    align(&mut data);
                    field = (data.len() as u32).to_le_bytes();
                    data.extend_from_slice(&bytes);
                }
                raw.push((tag, value.field_type(), value.count(), field));
            }
            directories.push(raw);
        }

        // Then the IFD chain.
        align(&mut data);
        let first = data.len() as u32;
        data[4..8].copy_from_slice(&first.to_le_bytes());
        let count = directories.len();
        for (index, entries) in directories.into_iter().enumerate() {
            let size = 2 + entries.len() * 12 + 4;
            let next = if index + 1 < count {
                (data.len() + size) as u32
            } else {
                0
            };
            data.extend_from_slice(&(entries.len() as u16).to_le_bytes());
            for (tag, field_type, count, field) in entries {
                data.extend_from_slice(&tag.to_le_bytes());
                data.extend_from_slice(&field_type.to_le_bytes());
                data.extend_from_slice(&count.to_le_bytes());
                data.extend_from_slice(&field);
            }
            data.extend_from_slice(&next.to_le_bytes());
        }
        data
    }
}

fn align(data: &mut Vec<u8>) {
    if data.len() % 2 == 1 {
        data.push(0);
    }
}

pub fn encode_jpeg(image: &RgbImage) -> Vec<u8> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, 95)
        .encode(image.as_raw(), image.width(), image.height(), ExtendedColorType::Rgb8)
        .unwrap();
    out
}

/// Split a complete JPEG into shared tables and an abbreviated stream.
fn split_jpeg(full: &[u8]) -> (Vec<u8>, Vec<u8>) {
    const SOI: [u8; 2] = [0xFF, 0xD8];
    let mut tables = SOI.to_vec();
    let mut stream = SOI.to_vec();
    let mut pos = 2;
    while pos + 3 < full.len() {
        let marker = full[pos + 1];
        let len = u16::from_be_bytes([full[pos + 2], full[pos + 3]]) as usize;
        match marker {
            0xDB | 0xC4 => tables.extend_from_slice(&full[pos..pos + 2 + len]),
            0xDA => {
                stream.extend_from_slice(&full[pos..]);
                break;
            }
            _ => stream.extend_from_slice(&full[pos..pos + 2 + len]),
        }
        pos += 2 + len;
    }
    tables.extend_from_slice(&[0xFF, 0xD9]);
    (tables, stream)
}

// =============================================================================
// Standard slides
// =============================================================================

/// A three-level pyramid of `pattern` with `tile_size` tiles.
pub fn pyramid(pattern: fn(u32, u32) -> Rgb<u8>, tile_size: u32, compression: TileCompression) -> Vec<IfdBuilder> {
    (0..3)
        .map(|level| {
            let image = render_level(SLIDE_SIDE, SLIDE_SIDE, level, pattern);
            IfdBuilder::tiled(&image, tile_size, compression)
        })
        .collect()
}

/// A Hamamatsu-flavoured slide: resolution tags and stage offsets.
pub fn ndpi_slide(pattern: fn(u32, u32) -> Rgb<u8>, compression: TileCompression) -> Vec<u8> {
    let mut levels = pyramid(pattern, 256, compression).into_iter();
    let mut builder = TiffBuilder::new();
    if let Some(base) = levels.next() {
        builder = builder.ifd(base.resolution_cm(SLIDE_MPP).ndpi(SLIDE_OFFSET));
    }
    for level in levels {
        builder = builder.ifd(level);
    }
    builder.build()
}

/// An Aperio-flavoured slide: MPP in ImageDescription, shared JPEG tables.
pub fn svs_slide(pattern: fn(u32, u32) -> Rgb<u8>) -> Vec<u8> {
    let description = format!(
        "Aperio Image Library v12.0.5\r\n{SLIDE_SIDE}x{SLIDE_SIDE} (256x256) JPEG/RGB Q=95|AppMag = 20|MPP = {SLIDE_MPP}"
    );
    let mut levels = pyramid(pattern, 256, TileCompression::JpegWithTables).into_iter();
    let mut builder = TiffBuilder::new();
    if let Some(base) = levels.next() {
        builder = builder.ifd(base.description(&description));
    }
    // A label image with a different aspect ratio, which is not a level.
    let label = RgbImage::from_pixel(300, 100, GLASS);
    builder = builder.ifd(IfdBuilder::tiled(&label, 128, TileCompression::None));
    for level in levels {
        builder = builder.ifd(level);
    }
    builder.build()
}

/// A single-level slide without any calibration tags.
pub fn uncalibrated_slide(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 7]));
    TiffBuilder::new()
        .ifd(IfdBuilder::tiled(&image, 256, TileCompression::None))
        .build()
}

pub fn write_slide(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, data).unwrap();
    path
}

// =============================================================================
// Annotations
// =============================================================================

/// Physical coordinate (nm) of a level-0 pixel on the standard test slide.
pub fn to_physical(pixel: i64, offset: i32) -> i64 {
    let nm_per_pixel = SLIDE_MPP * 1000.0;
    ((pixel as f64 - SLIDE_SIDE as f64 / 2.0) * nm_per_pixel) as i64 + offset as i64
}

/// An NDPA document with one closed freehand polygon per entry.
///
/// Polygons are given in level-0 pixels of the standard test slide.
pub fn ndpa_document(polygons: &[Vec<(i64, i64)>]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<annotations>\n");
    for (id, polygon) in polygons.iter().enumerate() {
        xml.push_str(&format!(
            "  <ndpviewstate id=\"{}\">\n    <title>region {}</title>\n    <annotation type=\"freehand\" displayname=\"AnnotateFreehand\" color=\"#000000\">\n      <measuretype>0</measuretype>\n      <closed>1</closed>\n      <pointlist>\n",
            id + 1,
            id + 1
        ));
        for &(x, y) in polygon {
            xml.push_str(&format!(
                "        <point><x>{}</x><y>{}</y></point>\n",
                to_physical(x, SLIDE_OFFSET.0),
                to_physical(y, SLIDE_OFFSET.1)
            ));
        }
        xml.push_str("      </pointlist>\n    </annotation>\n  </ndpviewstate>\n");
    }
    xml.push_str("</annotations>\n");
    xml
}

/// Axis-aligned square polygon in level-0 pixels.
pub fn square(x: i64, y: i64, side: i64) -> Vec<(i64, i64)> {
    vec![(x, y), (x + side, y), (x + side, y + side), (x, y + side)]
}

/// Write `<slide><suffix>` next to a slide.
pub fn write_annotations(slide_path: &Path, polygons: &[Vec<(i64, i64)>]) -> PathBuf {
    let mut name = slide_path.as_os_str().to_owned();
    name.push(".ndpa");
    let path = PathBuf::from(name);
    fs::write(&path, ndpa_document(polygons)).unwrap();
    path
}
