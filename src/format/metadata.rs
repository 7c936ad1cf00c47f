//! Slide metadata recovered from TIFF tags.
//!
//! Aperio writes its properties into ImageDescription as a pipe-separated
//! list of `key = value` pairs:
//!
//! ```text
//! Aperio Image Library v11.2.1
//! 46000x32914 [0,100 46000x32814] (256x256) JPEG/RGB Q=30|AppMag = 20|MPP = 0.4990
//! ```
//!
//! Other scanners only provide the baseline X/YResolution tags.

use std::collections::BTreeMap;

use serde::Serialize;

/// Micrometres per inch.
const MICRONS_PER_INCH: f64 = 25_400.0;

/// Micrometres per centimetre.
const MICRONS_PER_CENTIMETER: f64 = 10_000.0;

/// Metadata parsed from a slide's ImageDescription.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SlideMetadata {
    /// Scanner vendor name
    pub vendor: Option<String>,

    /// Microns per pixel declared by the vendor
    pub mpp: Option<f64>,

    /// Objective magnification (e.g., 20, 40)
    pub magnification: Option<f64>,

    /// Additional key-value pairs
    pub properties: BTreeMap<String, String>,
}

impl SlideMetadata {
    /// Parse metadata from an ImageDescription string.
    pub fn parse_description(description: &str) -> Self {
        let mut metadata = SlideMetadata::default();

        if description.contains("Aperio") {
            metadata.vendor = Some("Aperio".to_string());
        }

        for part in description.split('|') {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());

            match key {
                "MPP" => metadata.mpp = value.parse().ok().filter(|v: &f64| *v > 0.0),
                "AppMag" => metadata.magnification = value.parse().ok(),
                _ => {}
            }
            metadata
                .properties
                .insert(key.to_string(), value.to_string());
        }

        metadata
    }
}

/// Convert a TIFF resolution (pixels per unit) to microns per pixel.
///
/// `unit` follows the ResolutionUnit tag: 2 = inch, 3 = centimeter. Unit 1
/// (no absolute unit) and non-positive resolutions yield `None`.
pub fn mpp_from_resolution(resolution: f64, unit: u16) -> Option<f64> {
    if !(resolution.is_finite() && resolution > 0.0) {
        return None;
    }
    match unit {
        2 => Some(MICRONS_PER_INCH / resolution),
        3 => Some(MICRONS_PER_CENTIMETER / resolution),
        _ => None,
    }
}
