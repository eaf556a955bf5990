//! Minimal element tree built from the quick-xml event stream.
//!
//! The parser works on this tree rather than on raw events so that it can
//! look at an element's attributes and all of its children before deciding
//! what node to produce.

use crate::error::{ParseError, ParseResult};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum XmlNode {
    Element(XmlElement),
    Text(String),
    CData(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    fn from_start(start: &BytesStart<'_>, pos: u64) -> ParseResult<Self> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(|e| ParseError::malformed(pos, e.to_string()))?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let value = attribute
                .unescape_value()
                .map_err(|e| ParseError::malformed(pos, e.to_string()))?
                .into_owned();
            attributes.push((key, value));
        }

        Ok(Self {
            name,
            attributes,
            children: Vec::new(),
        })
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn flag(&self, name: &str) -> bool {
        self.attr(name) == Some("true")
    }

    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|child| match child {
            XmlNode::Element(element) => Some(element),
            _ => None,
        })
    }

    /// Concatenated text and CDATA of direct children
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|child| match child {
                XmlNode::Text(text) | XmlNode::CData(text) => Some(text.as_str()),
                XmlNode::Element(_) => None,
            })
            .collect()
    }

    /// Every `id` attribute anywhere in the subtree
    pub fn collect_ids(&self, out: &mut Vec<String>) {
        if let Some(id) = self.attr("id") {
            out.push(id.to_string());
        }
        for child in self.elements() {
            child.collect_ids(out);
        }
    }
}

/// Read a single-rooted element tree. Comments, processing instructions and
/// the XML declaration are dropped.
pub(crate) fn read_tree(source: &str) -> ParseResult<XmlElement> {
    let mut reader = Reader::from_str(source);
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let pos = reader.buffer_position() as u64;
        let event = reader
            .read_event()
            .map_err(|e| ParseError::malformed(reader.buffer_position() as u64, e.to_string()))?;

        match event {
            Event::Start(start) => stack.push(XmlElement::from_start(&start, pos)?),
            Event::Empty(start) => {
                let element = XmlElement::from_start(&start, pos)?;
                attach(&mut stack, &mut root, element, pos)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| ParseError::malformed(pos, "unexpected closing tag"))?;
                attach(&mut stack, &mut root, element, pos)?;
            }
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|e| ParseError::malformed(pos, e.to_string()))?
                    .into_owned();
                match stack.last_mut() {
                    Some(parent) => parent.children.push(XmlNode::Text(text)),
                    None if text.trim().is_empty() => {}
                    None => return Err(ParseError::malformed(pos, "text outside of the root element")),
                }
            }
            Event::CData(data) => {
                let text = String::from_utf8(data.into_inner().into_owned())
                    .map_err(|e| ParseError::malformed(pos, e.to_string()))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(XmlNode::CData(text)),
                    None => return Err(ParseError::malformed(pos, "CDATA outside of the root element")),
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(ParseError::malformed(
            reader.buffer_position() as u64,
            format!("unclosed element <{}>", open.name),
        ));
    }

    root.ok_or_else(|| ParseError::malformed(0, "document has no root element"))
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
    pos: u64,
) -> ParseResult<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(XmlNode::Element(element)),
        None if root.is_none() => *root = Some(element),
        None => return Err(ParseError::malformed(pos, "multiple root elements")),
    }
    Ok(())
}
