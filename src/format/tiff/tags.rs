//! TIFF tag and field type vocabulary.
//!
//! Only the tags needed to locate pyramid tiles, decode them and recover the
//! slide calibration are named here. Every other tag is kept as a raw entry
//! in the IFD and never interpreted.

// =============================================================================
// TIFF Field Types
// =============================================================================

/// Encoding of the values stored in an IFD entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum FieldType {
    /// Unsigned 8-bit integer
    Byte = 1,
    /// 8-bit ASCII character, NUL terminated
    Ascii = 2,
    /// Unsigned 16-bit integer
    Short = 3,
    /// Unsigned 32-bit integer
    Long = 4,
    /// Two Longs: numerator and denominator
    Rational = 5,
    /// Signed 8-bit integer
    SByte = 6,
    /// Opaque bytes
    Undefined = 7,
    /// Signed 16-bit integer
    SShort = 8,
    /// Signed 32-bit integer (Hamamatsu slide-centre offsets use this)
    SLong = 9,
    /// Two SLongs: numerator and denominator
    SRational = 10,
    /// IEEE single precision
    Float = 11,
    /// IEEE double precision
    Double = 12,
    /// Unsigned 64-bit integer (BigTIFF)
    Long8 = 16,
    /// Signed 64-bit integer (BigTIFF)
    SLong8 = 17,
    /// 64-bit IFD offset (BigTIFF)
    Ifd8 = 18,
}

impl FieldType {
    /// Size of a single value of this type in bytes.
    #[inline]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            FieldType::Byte | FieldType::Ascii | FieldType::SByte | FieldType::Undefined => 1,
            FieldType::Short | FieldType::SShort => 2,
            FieldType::Long | FieldType::SLong | FieldType::Float => 4,
            FieldType::Rational
            | FieldType::SRational
            | FieldType::Double
            | FieldType::Long8
            | FieldType::SLong8
            | FieldType::Ifd8 => 8,
        }
    }

    /// Create a FieldType from its numeric value.
    ///
    /// Returns `None` for unknown type values.
    pub fn from_u16(value: u16) -> Option<Self> {
        let field_type = match value {
            1 => FieldType::Byte,
            2 => FieldType::Ascii,
            3 => FieldType::Short,
            4 => FieldType::Long,
            5 => FieldType::Rational,
            6 => FieldType::SByte,
            7 => FieldType::Undefined,
            8 => FieldType::SShort,
            9 => FieldType::SLong,
            10 => FieldType::SRational,
            11 => FieldType::Float,
            12 => FieldType::Double,
            16 => FieldType::Long8,
            17 => FieldType::SLong8,
            18 => FieldType::Ifd8,
            _ => return None,
        };
        Some(field_type)
    }

    /// Whether `count` values of this type fit in the entry's value field
    /// (4 bytes in classic TIFF, 8 in BigTIFF).
    #[inline]
    pub fn fits_inline(self, count: u64, is_bigtiff: bool) -> bool {
        let threshold = if is_bigtiff { 8 } else { 4 };
        (self.size_in_bytes() as u64).saturating_mul(count) <= threshold
    }
}

// =============================================================================
// TIFF Tags
// =============================================================================

/// TIFF tag IDs used by the slide reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum TiffTag {
    // -------------------------------------------------------------------------
    // Image structure
    // -------------------------------------------------------------------------
    NewSubfileType = 254,
    ImageWidth = 256,
    ImageLength = 257,
    BitsPerSample = 258,
    Compression = 259,
    PhotometricInterpretation = 262,
    /// Free text; Aperio stores `key = value` metadata here
    ImageDescription = 270,
    SamplesPerPixel = 277,
    PlanarConfiguration = 284,
    Software = 305,

    // -------------------------------------------------------------------------
    // Strip organization (only used to reject such levels)
    // -------------------------------------------------------------------------
    StripOffsets = 273,
    RowsPerStrip = 278,
    StripByteCounts = 279,

    // -------------------------------------------------------------------------
    // Tile organization
    // -------------------------------------------------------------------------
    TileWidth = 322,
    TileLength = 323,
    TileOffsets = 324,
    TileByteCounts = 325,

    // -------------------------------------------------------------------------
    // JPEG
    // -------------------------------------------------------------------------
    /// Shared quantization and Huffman tables for abbreviated tile streams
    JpegTables = 347,
    YCbCrSubSampling = 530,

    // -------------------------------------------------------------------------
    // Resolution
    // -------------------------------------------------------------------------
    XResolution = 282,
    YResolution = 283,
    /// 1 = none, 2 = inch, 3 = centimeter
    ResolutionUnit = 296,

    // -------------------------------------------------------------------------
    // Hamamatsu private tags
    // -------------------------------------------------------------------------
    /// Present in every NDPI file
    NdpiFormatFlag = 65420,
    /// Source lens magnification
    NdpiSourceLens = 65421,
    /// Offset of the image centre from the slide centre along X, in nanometres
    NdpiXOffsetFromSlideCentre = 65422,
    /// Offset of the image centre from the slide centre along Y, in nanometres
    NdpiYOffsetFromSlideCentre = 65423,
}

impl TiffTag {
    /// Create a TiffTag from its numeric value.
    ///
    /// Returns `None` for tags the reader does not interpret.
    pub fn from_u16(value: u16) -> Option<Self> {
        let tag = match value {
            254 => TiffTag::NewSubfileType,
            256 => TiffTag::ImageWidth,
            257 => TiffTag::ImageLength,
            258 => TiffTag::BitsPerSample,
            259 => TiffTag::Compression,
            262 => TiffTag::PhotometricInterpretation,
            270 => TiffTag::ImageDescription,
            273 => TiffTag::StripOffsets,
            277 => TiffTag::SamplesPerPixel,
            278 => TiffTag::RowsPerStrip,
            279 => TiffTag::StripByteCounts,
            282 => TiffTag::XResolution,
            283 => TiffTag::YResolution,
            284 => TiffTag::PlanarConfiguration,
            296 => TiffTag::ResolutionUnit,
            305 => TiffTag::Software,
            322 => TiffTag::TileWidth,
            323 => TiffTag::TileLength,
            324 => TiffTag::TileOffsets,
            325 => TiffTag::TileByteCounts,
            347 => TiffTag::JpegTables,
            530 => TiffTag::YCbCrSubSampling,
            65420 => TiffTag::NdpiFormatFlag,
            65421 => TiffTag::NdpiSourceLens,
            65422 => TiffTag::NdpiXOffsetFromSlideCentre,
            65423 => TiffTag::NdpiYOffsetFromSlideCentre,
            _ => return None,
        };
        Some(tag)
    }

    /// Get the numeric tag ID.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }
}

// =============================================================================
// Compression Values
// =============================================================================

/// TIFF compression scheme identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Compression {
    None = 1,
    Lzw = 5,
    OldJpeg = 6,
    Jpeg = 7,
    Deflate = 8,
    AdobeDeflate = 32946,
    Jpeg2000 = 33003,
}

impl Compression {
    /// Create a Compression from its numeric value.
    pub fn from_u16(value: u16) -> Option<Self> {
        let compression = match value {
            1 => Compression::None,
            5 => Compression::Lzw,
            6 => Compression::OldJpeg,
            7 => Compression::Jpeg,
            8 => Compression::Deflate,
            32946 => Compression::AdobeDeflate,
            33003 => Compression::Jpeg2000,
            _ => return None,
        };
        Some(compression)
    }

    /// Whether tiles using this scheme can be decoded.
    #[inline]
    pub const fn is_supported(self) -> bool {
        matches!(self, Compression::None | Compression::Jpeg)
    }

    /// Human-readable name for error messages.
    pub const fn name(self) -> &'static str {
        match self {
            Compression::None => "None",
            Compression::Lzw => "LZW",
            Compression::OldJpeg => "Old JPEG",
            Compression::Jpeg => "JPEG",
            Compression::Deflate => "Deflate",
            Compression::AdobeDeflate => "Adobe Deflate",
            Compression::Jpeg2000 => "JPEG 2000",
        }
    }

    /// Name for a raw compression value, including unknown ones.
    pub fn describe(value: u16) -> String {
        match Self::from_u16(value) {
            Some(compression) => compression.name().to_string(),
            None => format!("unknown ({value})"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
