//! Owned XML element tree
//!
//! A minimal document model for the solver dialect: elements, text, and
//! comments, with sibling order preserved through a parse/serialise round
//! trip. Insignificant whitespace is dropped on parse and regenerated as
//! tab indentation on write, so serialisation is byte-deterministic.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((key.into(), value.into()));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children = vec![XmlNode::Text(text.into())];
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attrs.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.attrs.push((key.to_string(), value)),
        }
    }

    /// First child element with the given name.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find_map(|node| match node {
            XmlNode::Element(el) if el.name == name => Some(el),
            _ => None,
        })
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut XmlElement> {
        self.children.iter_mut().find_map(|node| match node {
            XmlNode::Element(el) if el.name == name => Some(el),
            _ => None,
        })
    }

    /// Child elements with the given name, in document order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter_map(move |node| match node {
            XmlNode::Element(el) if el.name == name => Some(el),
            _ => None,
        })
    }

    /// All child elements, in document order.
    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|node| match node {
            XmlNode::Element(el) => Some(el),
            _ => None,
        })
    }

    /// Concatenated text content of direct children.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            if let XmlNode::Text(t) = node {
                out.push_str(t);
            }
        }
        out
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.children = vec![XmlNode::Text(text.into())];
    }

    pub fn push(&mut self, element: XmlElement) {
        self.children.push(XmlNode::Element(element));
    }

    /// Depth-first walk over this element and every descendant element.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a XmlElement)) {
        visit(self);
        for child in self.child_elements() {
            child.walk(visit);
        }
    }
}

fn element_from_start(e: &quick_xml::events::BytesStart<'_>) -> CoreResult<XmlElement> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut element = XmlElement::new(name);
    for attr in e.attributes() {
        let attr = attr
            .map_err(|err| CoreError::MalformedTemplate(format!("bad attribute: {err}")))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| CoreError::MalformedTemplate(format!("bad attribute value: {err}")))?
            .into_owned();
        element.attrs.push((key, value));
    }
    Ok(element)
}

/// Parse a document into its root element.
pub fn parse_document(input: &str) -> CoreResult<XmlElement> {
    let mut reader = Reader::from_str(input);
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    fn attach(
        stack: &mut [XmlElement],
        root: &mut Option<XmlElement>,
        node: XmlNode,
    ) -> CoreResult<()> {
        if let Some(top) = stack.last_mut() {
            top.children.push(node);
            return Ok(());
        }
        match node {
            XmlNode::Element(el) => {
                if root.is_some() {
                    return Err(CoreError::MalformedTemplate(
                        "multiple root elements".to_string(),
                    ));
                }
                *root = Some(el);
                Ok(())
            }
            // Comments and stray text outside the root are dropped.
            _ => Ok(()),
        }
    }

    loop {
        match reader.read_event().map_err(CoreError::Xml)? {
            Event::Eof => break,
            Event::Start(e) => stack.push(element_from_start(&e)?),
            Event::Empty(e) => {
                let element = element_from_start(&e)?;
                attach(&mut stack, &mut root, XmlNode::Element(element))?;
            }
            Event::End(_) => {
                let element = stack.pop().ok_or_else(|| {
                    CoreError::MalformedTemplate("unbalanced end tag".to_string())
                })?;
                attach(&mut stack, &mut root, XmlNode::Element(element))?;
            }
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|err| {
                        CoreError::MalformedTemplate(format!("bad text content: {err}"))
                    })?
                    .into_owned();
                if !text.trim().is_empty() {
                    attach(&mut stack, &mut root, XmlNode::Text(text.trim().to_string()))?;
                }
            }
            Event::CData(t) => {
                let text = String::from_utf8_lossy(&t.into_inner()).into_owned();
                attach(&mut stack, &mut root, XmlNode::Text(text))?;
            }
            Event::Comment(t) => {
                let text = String::from_utf8_lossy(&t.into_inner()).into_owned();
                attach(&mut stack, &mut root, XmlNode::Comment(text))?;
            }
            Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
        }
    }

    if !stack.is_empty() {
        return Err(CoreError::MalformedTemplate(
            "unterminated element".to_string(),
        ));
    }
    root.ok_or_else(|| CoreError::MalformedTemplate("empty document".to_string()))
}

fn escape_text(input: &str, out: &mut String) {
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
}

fn escape_attr(input: &str, out: &mut String) {
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}

fn write_element(element: &XmlElement, depth: usize, out: &mut String) {
    for _ in 0..depth {
        out.push('\t');
    }
    out.push('<');
    out.push_str(&element.name);
    for (key, value) in &element.attrs {
        out.push(' ');
        out.push_str(key);
        out.push_str("=\"");
        escape_attr(value, out);
        out.push('"');
    }

    if element.children.is_empty() {
        out.push_str("/>\n");
        return;
    }

    // Text-only elements stay on one line.
    if element.children.len() == 1 {
        if let XmlNode::Text(text) = &element.children[0] {
            out.push('>');
            escape_text(text, out);
            out.push_str("</");
            out.push_str(&element.name);
            out.push_str(">\n");
            return;
        }
    }

    out.push_str(">\n");
    for child in &element.children {
        match child {
            XmlNode::Element(el) => write_element(el, depth + 1, out),
            XmlNode::Text(text) => {
                for _ in 0..=depth {
                    out.push('\t');
                }
                escape_text(text, out);
                out.push('\n');
            }
            XmlNode::Comment(text) => {
                for _ in 0..=depth {
                    out.push('\t');
                }
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->\n");
            }
        }
    }
    for _ in 0..depth {
        out.push('\t');
    }
    out.push_str("</");
    out.push_str(&element.name);
    out.push_str(">\n");
}

/// Serialise a document with an XML declaration and tab indentation.
pub fn write_document(root: &XmlElement) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    write_element(root, 0, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<root version="4.0">
	<!--physics template-->
	<Mesh>
		<Nodes name="Object1">
			<node id="1">0,0,0</node>
			<node id="2">1,0,0</node>
		</Nodes>
		<NodeSet name="FIX">
			<n id="1"/>
		</NodeSet>
	</Mesh>
</root>
"#;

    #[test]
    fn test_parse_structure() {
        let root = parse_document(SAMPLE).unwrap();
        assert_eq!(root.name, "root");
        assert_eq!(root.attr("version"), Some("4.0"));
        let mesh = root.child("Mesh").unwrap();
        let nodes = mesh.child("Nodes").unwrap();
        assert_eq!(nodes.children_named("node").count(), 2);
        assert_eq!(
            nodes.children_named("node").next().unwrap().text(),
            "0,0,0"
        );
    }

    #[test]
    fn test_roundtrip_is_stable() {
        let root = parse_document(SAMPLE).unwrap();
        let once = write_document(&root);
        let twice = write_document(&parse_document(&once).unwrap());
        assert_eq!(once, twice);
        // Comments and sibling order survive.
        assert!(once.contains("<!--physics template-->"));
        let mesh_pos = once.find("<Mesh>").unwrap();
        let comment_pos = once.find("<!--").unwrap();
        assert!(comment_pos < mesh_pos);
    }

    #[test]
    fn test_escaping() {
        let mut el = XmlElement::new("a").with_attr("k", "x<\"y\">");
        el.set_text("1 & 2");
        let out = write_document(&el);
        assert!(out.contains("k=\"x&lt;&quot;y&quot;&gt;\""));
        assert!(out.contains(">1 &amp; 2</a>"));
        let back = parse_document(&out).unwrap();
        assert_eq!(back.attr("k"), Some("x<\"y\">"));
        assert_eq!(back.text(), "1 & 2");
    }

    #[test]
    fn test_unbalanced_fails() {
        assert!(parse_document("<a><b></a>").is_err());
    }

    #[test]
    fn test_walk_visits_descendants() {
        let root = parse_document(SAMPLE).unwrap();
        let mut names = Vec::new();
        root.walk(&mut |el| names.push(el.name.clone()));
        assert!(names.contains(&"NodeSet".to_string()));
        assert_eq!(names[0], "root");
    }
}
