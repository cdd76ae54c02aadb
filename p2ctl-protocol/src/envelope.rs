//! Inbound envelope parsing.
//!
//! Envelopes are parsed into a small element tree. Callers navigate it by
//! element name; repeated elements are kept in document order and lookups
//! return the first match.

use crate::error::ProtocolError;
use crate::ENVELOPE_ROOT;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// A parsed XML element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    pub text: String,
}

impl Element {
    /// Returns the first child element named `name`.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Returns the text of the first child element named `name`.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.as_str())
    }

    /// Returns the value of attribute `name`.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Parses a single XML document into its root element.
    pub fn parse(xml: &str) -> Result<Element, ProtocolError> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event()? {
                Event::Start(start) => stack.push(open_element(&start)?),
                Event::Empty(start) => {
                    let element = open_element(&start)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| ProtocolError::Xml("unbalanced closing tag".into()))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(text) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&text.unescape()?);
                    }
                }
                Event::CData(data) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&String::from_utf8_lossy(&data));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(ProtocolError::Xml(format!(
                "unterminated element <{}>",
                stack[stack.len() - 1].name
            )));
        }
        root.ok_or_else(|| ProtocolError::Xml("empty document".into()))
    }
}

fn open_element(start: &BytesStart<'_>) -> Result<Element, ProtocolError> {
    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(|_| ProtocolError::InvalidUtf8)?
        .to_string();

    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|_| ProtocolError::InvalidUtf8)?
            .to_string();
        let value = attr.unescape_value()?.into_owned();
        attributes.push((key, value));
    }

    Ok(Element {
        name,
        attributes,
        ..Default::default()
    })
}

fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    element: Element,
) -> Result<(), ProtocolError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(ProtocolError::Xml("multiple root elements".into())),
    }
    Ok(())
}

/// An inbound control-channel envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    root: Element,
}

impl Envelope {
    /// Parses an envelope; the root element must be `<P2Control>`.
    pub fn parse(xml: &str) -> Result<Self, ProtocolError> {
        let root = Element::parse(xml)?;
        if root.name != ENVELOPE_ROOT {
            return Err(ProtocolError::Xml(format!(
                "unexpected root element <{}>",
                root.name
            )));
        }
        Ok(Self { root })
    }

    /// Returns the root element.
    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Returns a description of the camera-reported error, if any.
    pub fn error(&self) -> Option<String> {
        let error = self.root.child("Error")?;
        if !error.text.is_empty() {
            return Some(error.text.clone());
        }
        let details: Vec<String> = error
            .attributes
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .chain(
                error
                    .children
                    .iter()
                    .map(|c| format!("{}={}", c.name, c.text)),
            )
            .collect();
        if details.is_empty() {
            Some("unspecified error".to_string())
        } else {
            Some(details.join(", "))
        }
    }

    /// Returns the `<Response>` element, if any.
    pub fn response(&self) -> Option<&Element> {
        self.root.child("Response")
    }

    /// Returns the first `<CamCtl>` element, if any.
    pub fn cam_ctl(&self) -> Option<&Element> {
        self.root.child("CamCtl")
    }

    /// Returns the session id carried by a `<CamCtl SessionID="...">` element.
    pub fn session_id(&self) -> Option<&str> {
        self.cam_ctl()?.attr("SessionID").filter(|id| !id.is_empty())
    }
}
