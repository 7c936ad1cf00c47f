//! A small owned XML tree built with quick-xml.
//!
//! Annotation files are a few hundred kilobytes at most, so the whole
//! document is materialized and navigated by child name.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::AnnotationError;

/// An XML element with its attributes, concatenated text and children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// First child named `name`.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All children named `name`, in document order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Trimmed text content.
    pub fn text(&self) -> &str {
        self.text.trim()
    }

    fn from_start(start: &BytesStart<'_>) -> Result<Self, AnnotationError> {
        let mut element = XmlElement::new(String::from_utf8_lossy(start.name().as_ref()));
        for attr in start.attributes() {
            let attr = attr.map_err(|e| AnnotationError::Xml(e.to_string()))?;
            let value = attr
                .unescape_value()
                .map_err(|e| AnnotationError::Xml(e.to_string()))?;
            element.attributes.push((
                String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
                value.into_owned(),
            ));
        }
        Ok(element)
    }
}

/// Parse a document into its root element.
pub fn parse_xml(input: &str) -> Result<XmlElement, AnnotationError> {
    let mut reader = Reader::from_str(input);
    reader.trim_text(true);

    let mut open: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            AnnotationError::Xml(format!("at byte {}: {e}", reader.buffer_position()))
        })?;

        match event {
            Event::Start(start) => open.push(XmlElement::from_start(&start)?),
            Event::Empty(start) => {
                let element = XmlElement::from_start(&start)?;
                close(element, &mut open, &mut root)?;
            }
            Event::End(_) => {
                let element = open.pop().ok_or_else(|| {
                    AnnotationError::Xml("closing tag without an open element".to_string())
                })?;
                close(element, &mut open, &mut root)?;
            }
            Event::Text(text) => {
                if let Some(current) = open.last_mut() {
                    let text = text
                        .unescape()
                        .map_err(|e| AnnotationError::Xml(e.to_string()))?;
                    current.text.push_str(&text);
                }
            }
            Event::CData(data) => {
                if let Some(current) = open.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(unclosed) = open.last() {
        return Err(AnnotationError::Xml(format!(
            "unexpected end of document inside <{}>",
            unclosed.name
        )));
    }
    root.ok_or_else(|| AnnotationError::Xml("document has no root element".to_string()))
}

/// Attach a finished element to its parent, or make it the root.
fn close(
    element: XmlElement,
    open: &mut [XmlElement],
    root: &mut Option<XmlElement>,
) -> Result<(), AnnotationError> {
    match open.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => {
            return Err(AnnotationError::Xml(format!(
                "second root element <{}>",
                element.name
            )))
        }
    }
    Ok(())
}
