//! Format parsers for Whole Slide Image files.
//!
//! All supported slides are TIFF containers: Aperio SVS, Hamamatsu NDPI and
//! generic pyramidal TIFF. [`tiff`] walks the IFD chain and identifies the
//! pyramid, [`jpeg`] decodes tiles, [`metadata`] recovers calibration hints.

pub mod detect;
pub mod jpeg;
pub mod metadata;
pub mod tiff;

pub use detect::{detect_format_from_ifd, is_tiff_header, SlideFormat};
pub use jpeg::decode_jpeg_tile;
pub use metadata::{mpp_from_resolution, SlideMetadata};
