//! Owned XML element tree built from `quick-xml` events.
//!
//! Feeds are loosely shaped: a channel with one `<item>` and a channel with
//! fifty look different to a mapper that turns lone children into scalars.
//! Here every element keeps its children as a list, and
//! [`XmlElement::children_named`] is the single place callers go through to
//! read repeated nodes, so "one" and "many" are handled the same way.

use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

/// SEC-003: Maximum element nesting depth accepted from remote documents.
const MAX_DEPTH: usize = 64;

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("XML nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),

    #[error("{0}")]
    Syntax(String),

    #[error("document has no root element")]
    NoRoot,

    #[error("unexpected end of document inside <{0}>")]
    Unclosed(String),
}

/// An attribute value read with type coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl AttrValue {
    /// Coerce a raw attribute string when the reading is unambiguous.
    ///
    /// `true`/`false` become booleans, plain decimal numbers become numbers.
    /// Anything else, including numbers with leading zeros (`"007"`), stays text.
    pub fn coerce(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed {
            "true" => return AttrValue::Bool(true),
            "false" => return AttrValue::Bool(false),
            _ => {}
        }

        let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
        let numeric = !digits.is_empty()
            && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
            && digits.chars().filter(|&c| c == '.').count() <= 1
            && !digits.starts_with('.')
            && !digits.ends_with('.');
        let leading_zero = digits.len() > 1 && digits.starts_with('0') && !digits.starts_with("0.");

        if numeric && !leading_zero {
            if let Ok(n) = trimmed.parse::<i64>() {
                return AttrValue::Integer(n);
            }
            if let Ok(f) = trimmed.parse::<f64>() {
                return AttrValue::Float(f);
            }
        }

        AttrValue::Text(raw.to_string())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// One element with its attributes, text content and child elements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    /// Qualified name as written in the document (`item`, `dc:creator`)
    pub name: String,
    pub attributes: Vec<(String, String)>,
    /// Concatenated text and CDATA content directly inside this element
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    /// Parse a complete document and return its root element.
    ///
    /// Declarations, comments, processing instructions and DOCTYPE are
    /// skipped. Custom entities are never expanded (SEC-002): a reference
    /// that does not resolve is kept verbatim while the rest of the text is
    /// still unescaped.
    pub fn parse_document(raw: &str) -> Result<XmlElement, XmlError> {
        let mut reader = Reader::from_str(raw);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;
        let mut buf = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    if stack.len() >= MAX_DEPTH {
                        return Err(XmlError::MaxDepthExceeded(MAX_DEPTH));
                    }
                    stack.push(element_from_start(&e, &reader));
                }
                Ok(Event::Empty(e)) => {
                    let element = element_from_start(&e, &reader);
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::End(_)) => {
                    // quick-xml has already checked that the end tag matches
                    let element = stack
                        .pop()
                        .ok_or_else(|| XmlError::Syntax("unmatched end tag".to_string()))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::Text(t)) => {
                    if let Some(current) = stack.last_mut() {
                        let raw = String::from_utf8_lossy(&t);
                        current.text.push_str(&unescape_lenient(&raw));
                    }
                }
                Ok(Event::CData(c)) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(XmlError::Syntax(e.to_string())),
                _ => {}
            }
            buf.clear();
        }

        if let Some(open) = stack.pop() {
            return Err(XmlError::Unclosed(open.name));
        }
        root.ok_or(XmlError::NoRoot)
    }

    /// All direct children with the given qualified name, in document order.
    ///
    /// Always a list, whether the document holds zero, one or many matches.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// First direct child with the given name
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Trimmed text of the first child with the given name, `None` if absent or blank
    pub fn child_text(&self, name: &str) -> Option<String> {
        self.child(name).and_then(XmlElement::trimmed_text)
    }

    /// Trimmed text content, `None` if blank
    pub fn trimmed_text(&self) -> Option<String> {
        let trimmed = self.text.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    /// Text of this element and every descendant, joined by single spaces.
    ///
    /// Used for inline markup such as Atom `type="xhtml"` content, where the
    /// text lives in child elements. `None` if blank.
    pub fn deep_text(&self) -> Option<String> {
        let mut parts = Vec::new();
        self.collect_text(&mut parts);
        let joined = parts.join(" ");
        (!joined.is_empty()).then_some(joined)
    }

    fn collect_text<'a>(&'a self, parts: &mut Vec<&'a str>) {
        let text = self.text.trim();
        if !text.is_empty() {
            parts.push(text);
        }
        for child in &self.children {
            child.collect_text(parts);
        }
    }

    /// Rename `prefix:name` elements to `name` here and in all descendants
    pub fn strip_prefix(&mut self, prefix: &str) {
        if let Some(local) = self
            .name
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix(':'))
        {
            self.name = local.to_string();
        }
        for child in &mut self.children {
            child.strip_prefix(prefix);
        }
    }

    /// Raw value of an attribute
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Attribute value coerced to a typed value
    pub fn attr_typed(&self, name: &str) -> Option<AttrValue> {
        self.attr(name).map(AttrValue::coerce)
    }

    /// A value that mappers may spell either as an attribute (`term="x"`)
    /// or as a bare child element (`<term>x</term>`). The attribute wins.
    pub fn attr_or_child(&self, name: &str) -> Option<String> {
        self.attr(name)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .or_else(|| self.child_text(name))
    }

    /// True when the element has neither text, attributes nor children
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.attributes.is_empty() && self.children.is_empty()
    }
}

fn element_from_start(e: &BytesStart<'_>, reader: &Reader<&[u8]>) -> XmlElement {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut attributes = Vec::new();

    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(err) => {
                tracing::debug!(element = %name, error = %err, "Skipping malformed attribute");
                continue;
            }
        };
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = match attr.decode_and_unescape_value(reader.decoder()) {
            Ok(v) => v.into_owned(),
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned(),
        };
        attributes.push((key, value));
    }

    XmlElement {
        name,
        attributes,
        ..Default::default()
    }
}

/// Resolve entity and character references one at a time. A reference that
/// cannot be resolved, or a bare `&`, is copied as written.
fn unescape_lenient(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let end = tail[1..]
            .find(|c: char| c == ';' || c == '&' || c.is_whitespace())
            .map(|i| i + 1);

        match end {
            Some(i) if tail.as_bytes()[i] == b';' => {
                let reference = &tail[..=i];
                match unescape(reference) {
                    Ok(resolved) => out.push_str(&resolved),
                    Err(_) => out.push_str(reference),
                }
                rest = &tail[i + 1..];
            }
            _ => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => {
            return Err(XmlError::Syntax(format!(
                "multiple root elements (found <{}>)",
                element.name
            )))
        }
    }
    Ok(())
}
