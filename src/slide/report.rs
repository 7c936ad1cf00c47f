//! Structural summary of a slide, printed by `wsi-tiler check`.

use serde::Serialize;

use crate::coords::SlideCalibration;
use crate::format::{SlideFormat, SlideMetadata};
use crate::io::RangeReader;

use super::{SlideSource, TiffSlide};

/// One pyramid level.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelReport {
    pub level: u32,
    pub width: u32,
    pub height: u32,
    pub downsample: f64,
}

/// What is known about a slide and its annotations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlideReport {
    pub path: String,
    pub format: Option<SlideFormat>,
    pub dimensions: (u32, u32),
    pub levels: Vec<LevelReport>,
    pub calibration: Option<SlideCalibration>,
    pub metadata: Option<SlideMetadata>,
    pub annotation_file: Option<String>,
    pub annotations: Option<usize>,
}

impl SlideReport {
    /// Report the pyramid and calibration of any slide source.
    pub fn from_source<S: SlideSource>(path: impl Into<String>, source: &S) -> Self {
        let levels = (0..source.level_count() as u32)
            .filter_map(|level| {
                let (width, height) = source.level_dimensions(level)?;
                Some(LevelReport {
                    level,
                    width,
                    height,
                    downsample: source.level_downsample(level)?,
                })
            })
            .collect();

        Self {
            path: path.into(),
            format: None,
            dimensions: source.dimensions(),
            levels,
            calibration: source.calibration().ok(),
            metadata: None,
            annotation_file: None,
            annotations: None,
        }
    }

    /// Like [`from_source`](Self::from_source), adding format and vendor metadata.
    pub fn from_tiff<R: RangeReader>(path: impl Into<String>, slide: &TiffSlide<R>) -> Self {
        Self {
            format: Some(slide.format()),
            metadata: Some(slide.metadata().clone()),
            ..Self::from_source(path, slide)
        }
    }

    /// Human-readable multi-line rendering.
    pub fn to_text(&self) -> String {
        let mut lines = vec![format!("Slide: {}", self.path)];
        if let Some(format) = self.format {
            lines.push(format!("Format: {}", format.name()));
        }
        lines.push(format!("Dimensions: {} x {}", self.dimensions.0, self.dimensions.1));

        lines.push(format!("Levels: {}", self.levels.len()));
        for level in &self.levels {
            lines.push(format!(
                "  {}: {} x {} (downsample {:.3})",
                level.level, level.width, level.height, level.downsample
            ));
        }

        match &self.calibration {
            Some(c) => lines.push(format!(
                "Calibration: {:.4} x {:.4} um/px, offset ({}, {}) nm",
                c.mpp.0, c.mpp.1, c.offset.0, c.offset.1
            )),
            None => lines.push("Calibration: missing".to_string()),
        }
        if let Some(metadata) = &self.metadata {
            if let Some(magnification) = metadata.magnification {
                lines.push(format!("Magnification: {magnification}x"));
            }
        }

        if let Some(file) = &self.annotation_file {
            let count = self
                .annotations
                .map_or_else(|| "unreadable".to_string(), |n| n.to_string());
            lines.push(format!("Annotations: {count} ({file})"));
        }
        lines.join("\n")
    }
}
