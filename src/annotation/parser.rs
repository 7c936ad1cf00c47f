//! NDPA annotation parsing.
//!
//! NDP.view stores annotations next to the slide as `<slide>.ndpa`:
//!
//! ```xml
//! <annotations>
//!   <ndpviewstate id="1">
//!     <annotation type="freehand">
//!       <closed>1</closed>
//!       <pointlist>
//!         <point><x>-1226561</x><y>2893470</y></point>
//!         ...
//!       </pointlist>
//!     </annotation>
//!   </ndpviewstate>
//! </annotations>
//! ```
//!
//! Point coordinates are physical nanometres relative to the slide centre.

use std::path::Path;

use tracing::{debug, info};

use crate::coords::SlideCalibration;
use crate::error::{AnnotationError, IoError};
use crate::geometry::Point;

use super::xml::{parse_xml, XmlElement};
use super::{Annotation, AnnotationCollection, MaskPolicy};

/// Builds annotation collections relative to one slide's calibration.
#[derive(Debug, Clone)]
pub struct AnnotationParser {
    calibration: SlideCalibration,
    policy: MaskPolicy,
}

impl AnnotationParser {
    pub fn new(calibration: SlideCalibration, policy: MaskPolicy) -> Self {
        Self {
            calibration,
            policy,
        }
    }

    /// Parse every `ndpviewstate` under `root`.
    ///
    /// Any malformed record fails the whole parse.
    pub fn parse(&self, root: &XmlElement) -> Result<AnnotationCollection, AnnotationError> {
        let annotations = root
            .children_named("ndpviewstate")
            .enumerate()
            .map(|(index, viewstate)| {
                self.parse_viewstate(viewstate)
                    .map_err(|err| malformed(index, err))
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(count = annotations.len(), "Parsed annotations");
        Ok(AnnotationCollection::new(annotations))
    }

    fn parse_viewstate(&self, viewstate: &XmlElement) -> Result<Annotation, AnnotationError> {
        let mut records = viewstate.children_named("annotation");
        let annotation = match (records.next(), records.next()) {
            (Some(annotation), None) => annotation,
            (None, _) => return Err(reason("missing <annotation>")),
            (Some(_), Some(_)) => return Err(reason("more than one <annotation>")),
        };

        let closed = required_child(annotation, "closed")?;
        let closed: i64 = closed
            .text()
            .parse()
            .map_err(|_| reason(format!("<closed> is not an integer: '{}'", closed.text())))?;
        if closed != 1 {
            return Err(reason(format!("expected a closed polygon, <closed> is {closed}")));
        }

        let pointlist = required_child(annotation, "pointlist")?;
        let polygon = pointlist
            .children
            .iter()
            .map(|point| {
                parse_point(point).map(|p| self.calibration.physical_point_to_level0(p))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Annotation::new(polygon, &self.policy)
    }
}

/// Read an NDPA file into a collection relative to `calibration`.
pub fn read_ndpa(
    path: impl AsRef<Path>,
    calibration: SlideCalibration,
    policy: MaskPolicy,
) -> Result<AnnotationCollection, AnnotationError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| IoError::from_std(path.display().to_string(), e))?;
    let text = String::from_utf8(bytes)
        .map_err(|e| AnnotationError::Xml(format!("{} is not UTF-8: {e}", path.display())))?;

    let root = parse_xml(&text)?;
    let collection = AnnotationParser::new(calibration, policy).parse(&root)?;
    info!(path = %path.display(), annotations = collection.len(), "Loaded annotations");
    Ok(collection)
}

fn parse_point(point: &XmlElement) -> Result<Point, AnnotationError> {
    if point.name != "point" {
        return Err(reason(format!("unexpected <{}> in <pointlist>", point.name)));
    }
    Ok(Point::new(
        integer_child(point, "x")?,
        integer_child(point, "y")?,
    ))
}

fn required_child<'a>(element: &'a XmlElement, name: &str) -> Result<&'a XmlElement, AnnotationError> {
    element
        .child(name)
        .ok_or_else(|| reason(format!("<{}> has no <{name}>", element.name)))
}

fn integer_child(element: &XmlElement, name: &str) -> Result<i64, AnnotationError> {
    let child = required_child(element, name)?;
    child
        .text()
        .parse()
        .map_err(|_| reason(format!("<{name}> is not an integer: '{}'", child.text())))
}

/// A reason that is given its record index by `parse`.
fn reason(message: impl Into<String>) -> AnnotationError {
    AnnotationError::MalformedAnnotation {
        index: usize::MAX,
        reason: message.into(),
    }
}

fn malformed(index: usize, err: AnnotationError) -> AnnotationError {
    match err {
        AnnotationError::MalformedAnnotation { reason, .. } => {
            AnnotationError::MalformedAnnotation { index, reason }
        }
        other => AnnotationError::MalformedAnnotation {
            index,
            reason: other.to_string(),
        },
    }
}
