//! TIFF parser for Whole Slide Images.
//!
//! Handles classic TIFF and BigTIFF in either byte order, which covers Aperio
//! SVS, Hamamatsu NDPI and generic pyramidal TIFF containers.
//!
//! # Key Concepts
//!
//! - **Byte order**: declared in the header (II = little-endian, MM = big-endian).
//! - **Classic TIFF vs BigTIFF**: 32-bit vs 64-bit offsets, handled transparently.
//! - **IFD (Image File Directory)**: metadata and pointers to image data. Slides
//!   carry one IFD per pyramid level plus label, macro and thumbnail images.
//! - **Inline vs offset values**: small values live in the IFD entry itself,
//!   larger ones at an offset the entry points to.

mod parser;
mod pyramid;
mod tags;
mod values;

pub use parser::{
    ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE, MAX_IFD_ENTRIES, TIFF_HEADER_SIZE,
};
pub use pyramid::{PyramidLevel, TiffPyramid, TileData};
pub use tags::{Compression, FieldType, TiffTag};
pub use values::{decode_u64_values, ValueReader};
