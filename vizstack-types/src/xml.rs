//! A minimal DOM over `quick_xml`, shaped like the `domutil` helper the
//! original implementation used to walk `xml.dom.minidom` trees: fetch
//! child elements by name, fetch a node's text value, and build elements
//! back up for serialization. The wire format (§6) is normative XML, so
//! we parse and write through `quick_xml`'s tokenizer rather than the
//! half-measure of matching text with regexes.

use std::fmt::Write as _;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;

use crate::error::{VizError, VizErrorKind};

/// A parsed XML element: a name, child elements, and accumulated text.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub children: Vec<Element>,
    pub text: String,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
            text: String::new(),
        }
    }

    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
            text: text.into(),
        }
    }

    pub fn push(&mut self, child: Element) -> &mut Self {
        self.children.push(child);
        self
    }

    pub fn push_text(&mut self, name: &str, text: impl Into<String>) -> &mut Self {
        self.push(Element::with_text(name, text));
        self
    }

    pub fn push_opt(&mut self, name: &str, value: Option<impl Into<String>>) -> &mut Self {
        if let Some(v) = value {
            self.push_text(name, v);
        }
        self
    }

    pub fn push_bool(&mut self, name: &str, value: bool) -> &mut Self {
        self.push_text(name, if value { "1" } else { "0" });
        self
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn text_trim(&self) -> &str {
        self.text.trim()
    }

    pub fn require_child(&self, name: &str) -> Result<&Element, VizError> {
        self.child(name).ok_or_else(|| {
            VizError::new(
                VizErrorKind::BadProtocol,
                format!("missing <{name}> inside <{}>", self.name),
            )
        })
    }

    pub fn parse_int(&self) -> Result<i64, VizError> {
        self.text_trim()
            .parse::<i64>()
            .map_err(|e| VizError::bad_protocol(format!("expected integer, got '{}': {e}", self.text_trim())))
    }

    pub fn parse_bool(&self) -> Result<bool, VizError> {
        match self.text_trim() {
            "1" => Ok(true),
            "0" => Ok(false),
            other => Err(VizError::bad_protocol(format!(
                "expected boolean 0/1, got '{other}'"
            ))),
        }
    }

    pub fn to_xml_string(&self) -> String {
        let mut buf = String::new();
        self.write(&mut buf);
        buf
    }

    fn write(&self, out: &mut String) {
        let _ = write!(out, "<{}>", self.name);
        out.push_str(&escape(&self.text));
        for child in &self.children {
            child.write(out);
        }
        let _ = write!(out, "</{}>", self.name);
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Parse an XML document into its root `Element`. Whitespace-only text
/// nodes between elements are dropped; text content of leaf elements is
/// preserved verbatim (trimmed on read via `text_trim`).
pub fn parse(bytes: &[u8]) -> Result<Element, VizError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                stack.push(Element::new(local_name(&e)));
            }
            Ok(Event::Empty(e)) => {
                let elem = Element::new(local_name(&e));
                push_child(&mut stack, &mut root, elem);
            }
            Ok(Event::End(_e)) => {
                let elem = stack
                    .pop()
                    .ok_or_else(|| VizError::bad_protocol("unbalanced XML close tag"))?;
                push_child(&mut stack, &mut root, elem);
            }
            Ok(Event::Text(t)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text_of(&t)?);
                }
            }
            Ok(Event::CData(t)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&t.into_inner()));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(VizError::bad_protocol(format!("malformed XML: {e}"))),
        }
    }

    root.ok_or_else(|| VizError::bad_protocol("empty XML document"))
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn text_of(t: &BytesText<'_>) -> Result<String, VizError> {
    t.unescape()
        .map(|c| c.into_owned())
        .map_err(|e| VizError::bad_protocol(format!("malformed XML text: {e}")))
}

fn push_child(stack: &mut Vec<Element>, root: &mut Option<Element>, elem: Element) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(elem);
    } else {
        *root = Some(elem);
    }
}

/// Convenience for writers that want the `quick_xml::Writer` event API
/// directly (not currently needed since `Element::write` round-trips our
/// own tree, but kept for symmetry and used by a couple of unit tests).
#[allow(dead_code)]
pub(crate) fn start_tag(name: &str) -> BytesStart<'static> {
    BytesStart::new(name.to_string())
}

#[allow(dead_code)]
pub(crate) fn end_tag(name: &str) -> BytesEnd<'static> {
    BytesEnd::new(name.to_string())
}

#[allow(dead_code)]
pub(crate) fn new_writer() -> Writer<Vec<u8>> {
    Writer::new(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_simple() {
        let xml = "<gpu><index>1</index><host>node0</host></gpu>";
        let elem = parse(xml.as_bytes()).unwrap();
        assert_eq!(elem.name, "gpu");
        assert_eq!(elem.child("index").unwrap().text_trim(), "1");
        assert_eq!(elem.child("host").unwrap().text_trim(), "node0");
    }

    #[test]
    fn serialize_matches_expected_shape() {
        let mut e = Element::new("gpu");
        e.push_text("index", "0").push_text("host", "n0");
        assert_eq!(e.to_xml_string(), "<gpu><index>0</index><host>n0</host></gpu>");
    }

    #[test]
    fn rejects_unbalanced_tags() {
        let xml = "<gpu><index>1</gpu>";
        assert!(parse(xml.as_bytes()).is_err());
    }
}
