//! # XML
//!
//! Module dedicated to the small amount of XML handling discovery
//! needs: a namespace-agnostic element tree read with [`quick_xml`],
//! and a thin writer wrapper used to build request bodies.

use quick_xml::{
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
    Reader, Writer,
};
use thiserror::Error;

/// The `Result` alias of the module.
pub type Result<T> = std::result::Result<T, Error>;

/// A malformed or unexpected XML document.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot read XML document")]
    ReadXmlError(#[from] quick_xml::Error),
    #[error("cannot write XML document")]
    WriteXmlError(#[from] std::io::Error),
    #[error("cannot parse XML document: empty document")]
    EmptyDocumentError,
    #[error("cannot parse XML document: unbalanced element {0}")]
    UnbalancedElementError(String),
    #[error("unexpected XML root element {0}, expected {1}")]
    UnexpectedRootError(String, &'static str),
    #[error("cannot find XML element {0}")]
    MissingElementError(&'static str),
    #[error("invalid XML value {1} for element {0}")]
    InvalidValueError(&'static str, String),
}

/// An element of a parsed document.
///
/// Names are local names: namespace prefixes are dropped, which is
/// enough for the few fixed schemas Autodiscover uses.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    pub text: String,
}

impl Element {
    /// Parse a whole document and return its root element.
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut root = None;

        loop {
            match reader.read_event()? {
                Event::Start(e) => stack.push(Self::from_start(&e)),
                Event::Empty(e) => {
                    let elem = Self::from_start(&e);
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(elem),
                        None => root = Some(elem),
                    }
                }
                Event::End(e) => {
                    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                    let elem = stack
                        .pop()
                        .filter(|elem| elem.name == name)
                        .ok_or(Error::UnbalancedElementError(name))?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(elem),
                        None => root = Some(elem),
                    }
                }
                Event::Text(e) => {
                    if let Some(elem) = stack.last_mut() {
                        elem.text.push_str(&e.unescape()?);
                    }
                }
                Event::CData(e) => {
                    if let Some(elem) = stack.last_mut() {
                        elem.text.push_str(&String::from_utf8_lossy(&e));
                    }
                }
                Event::Eof => break,
                _ => (),
            }
        }

        if let Some(elem) = stack.pop() {
            return Err(Error::UnbalancedElementError(elem.name));
        }

        root.ok_or(Error::EmptyDocumentError)
    }

    fn from_start(e: &BytesStart) -> Self {
        let attributes = e
            .attributes()
            .flatten()
            .filter_map(|attr| {
                let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
                let val = attr.unescape_value().ok()?.into_owned();
                Some((key, val))
            })
            .collect();

        Self {
            name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
            attributes,
            children: Vec::new(),
            text: String::new(),
        }
    }

    /// Get the first child with the given local name,
    /// case-insensitively.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children
            .iter()
            .find(|child| child.name.eq_ignore_ascii_case(name))
    }

    /// Iterate over the children with the given local name,
    /// case-insensitively.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children
            .iter()
            .filter(move |child| child.name.eq_ignore_ascii_case(name))
    }

    /// Follow a path of child names.
    pub fn path(&self, path: &[&str]) -> Option<&Element> {
        path.iter().try_fold(self, |elem, name| elem.child(name))
    }

    /// Get the trimmed text of the first child with the given name,
    /// if not empty.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name)
            .map(|child| child.text.trim())
            .filter(|text| !text.is_empty())
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, val)| val.as_str())
    }

    /// Return `true` if the element is marked `xsi:nil="true"`.
    pub fn is_nil(&self) -> bool {
        self.attribute("nil") == Some("true")
    }
}

/// Attributes of an element that has none.
pub const NO_ATTRIBUTES: [(&str, &str); 0] = [];

/// A thin wrapper around [`quick_xml::Writer`] writing prefixed
/// elements into a string.
pub struct XmlWriter {
    writer: Writer<Vec<u8>>,
}

impl XmlWriter {
    /// Create a writer and emit the UTF-8 XML declaration.
    pub fn new() -> Result<Self> {
        let mut writer = Writer::new(Vec::new());
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        Ok(Self { writer })
    }

    pub fn start<'a>(
        &mut self,
        name: &str,
        attributes: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<&mut Self> {
        let start = BytesStart::new(name).with_attributes(attributes);
        self.writer.write_event(Event::Start(start))?;
        Ok(self)
    }

    pub fn end(&mut self, name: &str) -> Result<&mut Self> {
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(self)
    }

    /// Write an element containing only escaped text.
    pub fn text_element(&mut self, name: &str, text: &str) -> Result<&mut Self> {
        self.start(name, NO_ATTRIBUTES)?;
        self.writer.write_event(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    pub fn into_string(self) -> String {
        String::from_utf8_lossy(&self.writer.into_inner()).into_owned()
    }
}
