use std::path::PathBuf;

use thiserror::Error;

/// I/O errors that can occur when reading slide and annotation files
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Error reported by the operating system
    #[error("I/O error on {path}: {message}")]
    File { path: String, message: String },

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// File does not exist
    #[error("File not found: {0}")]
    NotFound(String),
}

impl IoError {
    /// Wrap a `std::io::Error` raised while accessing `path`.
    pub fn from_std(path: impl Into<String>, err: std::io::Error) -> Self {
        let path = path.into();
        if err.kind() == std::io::ErrorKind::NotFound {
            IoError::NotFound(path)
        } else {
            IoError::File {
                path,
                message: err.to_string(),
            }
        }
    }
}

/// Errors related to format detection
#[derive(Debug, Clone, Error)]
pub enum FormatError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// TIFF parsing error
    #[error("TIFF error: {0}")]
    Tiff(#[from] TiffError),

    /// File format is not supported
    #[error("Unsupported format: {reason}")]
    UnsupportedFormat { reason: String },
}

/// Errors that can occur when parsing TIFF files and decoding their tiles
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    /// Invalid BigTIFF offset byte size (must be 8)
    #[error("Invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),

    /// File is too small to contain a valid TIFF header
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Invalid IFD offset (points outside file or to invalid location)
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// IFD structure is inconsistent
    #[error("Corrupt IFD at offset {offset}: {message}")]
    CorruptIfd { offset: u64, message: String },

    /// Required tag is missing from IFD
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// Tag has unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// Unsupported compression scheme
    #[error("Unsupported compression: {0} (only JPEG and uncompressed tiles are supported)")]
    UnsupportedCompression(String),

    /// Unsupported pixel layout for uncompressed tiles
    #[error("Unsupported sample layout: {0}")]
    UnsupportedSampleFormat(String),

    /// File uses strips instead of tiles
    #[error("Unsupported organization: file uses strips instead of tiles")]
    StripOrganization,

    /// Unknown field type in IFD entry
    #[error("Unknown field type: {0}")]
    UnknownFieldType(u16),

    /// Tile data could not be decoded
    #[error("Failed to decode tile {tile_index} of level {level}: {message}")]
    TileDecode {
        level: u32,
        tile_index: u32,
        message: String,
    },
}

/// Errors raised by slide sources and annotated slides
#[derive(Debug, Clone, Error)]
pub enum SlideError {
    /// I/O error while reading the slide
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// TIFF structure or tile error
    #[error("TIFF error: {0}")]
    Tiff(#[from] TiffError),

    /// Slide file format is not supported
    #[error("{0}")]
    Format(#[from] FormatError),

    /// Annotation file could not be turned into a collection
    #[error("Annotation error: {0}")]
    Annotation(#[from] AnnotationError),

    /// The slide contains no usable pyramid level
    #[error("No pyramid levels found in {0}")]
    NoLevels(String),

    /// Requested level does not exist
    #[error("Invalid level {level}: slide has {count} level(s)")]
    InvalidLevel { level: u32, count: usize },

    /// Declared level downsample disagrees with the power-of-two assumption
    #[error("Calibration mismatch at level {level}: expected downsample {expected}, slide declares {declared}")]
    CalibrationMismatch {
        level: u32,
        expected: u64,
        declared: f64,
    },

    /// Microns-per-pixel calibration could not be determined
    #[error("Missing calibration: {0}")]
    MissingCalibration(String),
}

/// Errors raised while parsing or rendering annotations
#[derive(Debug, Clone, Error)]
pub enum AnnotationError {
    /// I/O error while reading the annotation file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// The annotation document is not well-formed XML
    #[error("XML error: {0}")]
    Xml(String),

    /// A viewstate record is missing data or describes an unsupported polygon
    #[error("Malformed annotation #{index}: {reason}")]
    MalformedAnnotation { index: usize, reason: String },

    /// A polygon needs at least three vertices
    #[error("Polygon has {0} point(s), at least 3 are required")]
    TooFewPoints(usize),

    /// The polygon's bounding box does not fit a raster
    #[error("Polygon extent {width}x{height} is too large to render")]
    PolygonTooLarge { width: i64, height: i64 },

    /// Only square regions can be rendered
    #[error("Unsupported region shape {width}x{height}: only square regions are supported")]
    UnsupportedShape { width: u32, height: u32 },
}

/// Errors raised while building and encoding tiles
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// Reading from the annotated slide failed
    #[error("{0}")]
    Slide(#[from] SlideError),

    /// Tiling parameters are out of range
    #[error("Invalid tiling parameters: {message}")]
    InvalidParameters { message: String },

    /// JPEG encoding failed
    #[error("Failed to encode tile: {message}")]
    EncodeError { message: String },

    /// Writing an encoded tile failed
    #[error("{0}")]
    Io(#[from] IoError),
}

/// Errors raised by the folder preprocessing driver
#[derive(Debug, Clone, Error)]
pub enum PreprocessError {
    /// Input folder does not exist or is not a directory
    #[error("Input folder does not exist: {}", .0.display())]
    InputFolderMissing(PathBuf),

    /// Output folder does not exist or is not a directory
    #[error("Output folder does not exist: {}", .0.display())]
    OutputFolderMissing(PathBuf),

    /// Filesystem error while scanning or writing
    #[error("{0}")]
    Io(#[from] IoError),

    /// A slide could not be processed
    #[error("Failed to process {}: {source}", path.display())]
    Slide { path: PathBuf, source: TileError },
}
