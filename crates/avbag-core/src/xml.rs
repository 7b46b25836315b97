//! Minimal XML tree for the bag metadata documents.
//!
//! Parsing keeps whitespace and comments so a document that is read and
//! written without edits keeps its original layout. Element names are kept
//! as written (prefix included); lookups match on the local name.

use crate::error::{AvBagError, AvBagResult};
use quick_xml::escape::{escape, partial_escape};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::path::Path;

const DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    CData(String),
    Comment(String),
}

impl XmlNode {
    fn is_whitespace(&self) -> bool {
        matches!(self, XmlNode::Text(t) if t.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Element with a single text child, e.g. `<visibleToRights>ANONYMOUS</visibleToRights>`.
    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        let mut el = Self::new(name);
        el.children.push(XmlNode::Text(text.into()));
        el
    }

    /// Name without namespace prefix.
    pub fn local_name(&self) -> &str {
        local_name(&self.name)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|n| match n {
            XmlNode::Element(e) => Some(e),
            _ => None,
        })
    }

    /// First direct child with the given local name.
    pub fn child(&self, local: &str) -> Option<&XmlElement> {
        self.child_elements().find(|e| e.local_name() == local)
    }

    /// All descendants with the given local name, in document order.
    pub fn descendants(&self, local: &str) -> Vec<&XmlElement> {
        let mut out = Vec::new();
        collect_descendants(self, local, &mut out);
        out
    }

    /// Concatenated text of this element and its descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    /// Remove direct child elements matching `remove`, together with the
    /// indentation preceding each of them. Returns the removed elements.
    pub fn remove_child_elements<F>(&mut self, mut remove: F) -> Vec<XmlElement>
    where
        F: FnMut(&XmlElement) -> bool,
    {
        let mut removed = Vec::new();
        let mut kept: Vec<XmlNode> = Vec::with_capacity(self.children.len());
        for node in std::mem::take(&mut self.children) {
            match node {
                XmlNode::Element(e) if remove(&e) => {
                    if kept.last().is_some_and(XmlNode::is_whitespace) {
                        kept.pop();
                    }
                    removed.push(e);
                }
                other => kept.push(other),
            }
        }
        self.children = kept;
        removed
    }

    /// Append a child element, reusing the indentation of the existing children.
    pub fn append_indented(&mut self, child: XmlElement) {
        let indent = self.child_indent().unwrap_or_else(|| "\n    ".to_string());
        let closing = match self.children.last() {
            Some(n) if n.is_whitespace() => self.children.pop(),
            _ => None,
        };
        self.children.push(XmlNode::Text(indent));
        self.children.push(XmlNode::Element(child));
        self.children
            .push(closing.unwrap_or_else(|| XmlNode::Text("\n".to_string())));
    }

    /// Whitespace preceding the first child element, if any.
    pub fn child_indent(&self) -> Option<String> {
        self.children.windows(2).find_map(|pair| match pair {
            [XmlNode::Text(t), XmlNode::Element(_)] if t.trim().is_empty() => Some(t.clone()),
            _ => None,
        })
    }

    pub fn to_xml_string(&self) -> String {
        let mut out = String::new();
        write_element(self, &mut out);
        out
    }
}

fn local_name(name: &str) -> &str {
    name.rsplit_once(':').map_or(name, |(_, local)| local)
}

fn collect_descendants<'a>(el: &'a XmlElement, local: &str, out: &mut Vec<&'a XmlElement>) {
    for child in el.child_elements() {
        if child.local_name() == local {
            out.push(child);
        }
        collect_descendants(child, local, out);
    }
}

fn collect_text(el: &XmlElement, out: &mut String) {
    for node in &el.children {
        match node {
            XmlNode::Text(t) | XmlNode::CData(t) => out.push_str(t),
            XmlNode::Element(e) => collect_text(e, out),
            XmlNode::Comment(_) => {}
        }
    }
}

/// A parsed document: comments before the root, then the root element.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlDocument {
    pub prolog: Vec<XmlNode>,
    pub root: XmlElement,
}

impl XmlDocument {
    pub fn parse(content: &str, origin: &Path) -> AvBagResult<Self> {
        let mut reader = Reader::from_str(content);
        let mut prolog = Vec::new();
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| AvBagError::xml(origin, format!("at {}: {e}", reader.buffer_position())))?;
            match event {
                Event::Start(start) => stack.push(start_element(&start, origin)?),
                Event::Empty(start) => {
                    let el = start_element(&start, origin)?;
                    attach(&mut stack, &mut root, el, origin)?;
                }
                Event::End(_) => {
                    let el = stack
                        .pop()
                        .ok_or_else(|| AvBagError::xml(origin, "unbalanced end tag"))?;
                    attach(&mut stack, &mut root, el, origin)?;
                }
                Event::Text(text) => {
                    let text = text
                        .unescape()
                        .map_err(|e| AvBagError::xml(origin, e.to_string()))?
                        .into_owned();
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(XmlNode::Text(text)),
                        None if text.trim().is_empty() => {}
                        None => return Err(AvBagError::xml(origin, "text outside root element")),
                    }
                }
                Event::CData(data) => {
                    let data = String::from_utf8_lossy(&data).into_owned();
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(XmlNode::CData(data));
                    }
                }
                Event::Comment(comment) => {
                    let node = XmlNode::Comment(String::from_utf8_lossy(&comment).into_owned());
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(node),
                        None if root.is_none() => prolog.push(node),
                        None => {}
                    }
                }
                Event::DocType(_) => {
                    return Err(AvBagError::xml(origin, "document type declarations are not allowed"))
                }
                Event::Decl(_) | Event::PI(_) => {}
                Event::Eof => break,
            }
        }

        if !stack.is_empty() {
            return Err(AvBagError::xml(origin, "unexpected end of document"));
        }
        let root = root.ok_or_else(|| AvBagError::xml(origin, "no root element"))?;
        Ok(Self { prolog, root })
    }

    pub fn read(path: &Path) -> AvBagResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| AvBagError::io(path, e))?;
        Self::parse(&content, path)
    }

    pub fn write(&self, path: &Path) -> AvBagResult<()> {
        std::fs::write(path, self.to_xml_string()).map_err(|e| AvBagError::io(path, e))
    }

    pub fn to_xml_string(&self) -> String {
        let mut out = String::from(DECLARATION);
        out.push('\n');
        for node in &self.prolog {
            write_node(node, &mut out);
            out.push('\n');
        }
        write_element(&self.root, &mut out);
        out.push('\n');
        out
    }
}

fn start_element(start: &BytesStart<'_>, origin: &Path) -> AvBagResult<XmlElement> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut el = XmlElement::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| AvBagError::xml(origin, e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| AvBagError::xml(origin, e.to_string()))?
            .into_owned();
        el.attributes.push((key, value));
    }
    Ok(el)
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    el: XmlElement,
    origin: &Path,
) -> AvBagResult<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(XmlNode::Element(el)),
        None if root.is_none() => *root = Some(el),
        None => return Err(AvBagError::xml(origin, "more than one root element")),
    }
    Ok(())
}

fn write_node(node: &XmlNode, out: &mut String) {
    match node {
        XmlNode::Element(e) => write_element(e, out),
        XmlNode::Text(t) => out.push_str(&partial_escape(t)),
        XmlNode::CData(d) => {
            out.push_str("<![CDATA[");
            out.push_str(d);
            out.push_str("]]>");
        }
        XmlNode::Comment(c) => {
            out.push_str("<!--");
            out.push_str(c);
            out.push_str("-->");
        }
    }
}

fn write_element(el: &XmlElement, out: &mut String) {
    out.push('<');
    out.push_str(&el.name);
    for (key, value) in &el.attributes {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        out.push_str(&escape(value));
        out.push('"');
    }
    if el.children.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for child in &el.children {
        write_node(child, out);
    }
    out.push_str("</");
    out.push_str(&el.name);
    out.push('>');
}
