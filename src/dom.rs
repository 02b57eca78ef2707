//! The clone tree: free-standing copies of source nodes and their XHTML
//! serialization.

use crate::style::StyleDeclaration;

pub const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";
pub const SVG_NS: &str = "http://www.w3.org/2000/svg";

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Element variants that need dedicated handling while cloning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Generic,
    /// Live drawing surface (`<canvas>`); cloned as a pixel snapshot
    DrawingSurface,
    /// Multi-line text control (`<textarea>`)
    TextArea,
    /// Single-line input (`<input>`)
    TextInput,
    /// Any element in the SVG namespace
    VectorGraphics,
}

impl ElementKind {
    pub fn classify(local_name: &str, namespace: Option<&str>) -> Self {
        if namespace == Some(SVG_NS) {
            return ElementKind::VectorGraphics;
        }
        match local_name.to_ascii_lowercase().as_str() {
            "canvas" => ElementKind::DrawingSurface,
            "textarea" => ElementKind::TextArea,
            "input" => ElementKind::TextInput,
            "svg" => ElementKind::VectorGraphics,
            _ => ElementKind::Generic,
        }
    }
}

/// A node of the clone tree
#[derive(Debug, Clone, PartialEq)]
pub enum CloneNode {
    Element(CloneElement),
    Text(String),
    Comment(String),
}

impl CloneNode {
    pub fn as_element(&self) -> Option<&CloneElement> {
        match self {
            CloneNode::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut CloneElement> {
        match self {
            CloneNode::Element(el) => Some(el),
            _ => None,
        }
    }

    /// Concatenated text of this node and its descendants
    pub fn text_content(&self) -> String {
        match self {
            CloneNode::Text(t) => t.clone(),
            CloneNode::Comment(_) => String::new(),
            CloneNode::Element(el) => el.text_content(),
        }
    }

    pub fn serialize(&self) -> String {
        let mut out = String::new();
        self.write_xml(&mut out);
        out
    }

    fn write_xml(&self, out: &mut String) {
        match self {
            CloneNode::Text(t) => out.push_str(&escape_text(t)),
            CloneNode::Comment(c) => {
                out.push_str("<!--");
                out.push_str(&escape_comment(c));
                out.push_str("-->");
            }
            CloneNode::Element(el) => el.write_xml(out),
        }
    }
}

/// A cloned element: tag, attributes, inline style and cloned children
#[derive(Debug, Clone, PartialEq)]
pub struct CloneElement {
    pub kind: ElementKind,
    pub tag: String,
    pub namespace: Option<String>,
    attributes: Vec<(String, String)>,
    pub style: StyleDeclaration,
    pub children: Vec<CloneNode>,
}

impl CloneElement {
    pub fn new(tag: impl Into<String>, kind: ElementKind) -> Self {
        Self {
            kind,
            tag: tag.into(),
            namespace: None,
            attributes: Vec::new(),
            style: StyleDeclaration::new(),
            children: Vec::new(),
        }
    }

    /// A `<style>` element holding `css` as its only text child
    pub fn style_element(css: impl Into<String>) -> Self {
        let mut el = Self::new("style", ElementKind::Generic);
        el.children.push(CloneNode::Text(css.into()));
        el
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        if name == "style" {
            return None;
        }
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    /// Set an attribute. `style` is routed into the inline declaration.
    pub fn set_attribute(&mut self, name: &str, value: &str) {
        if name.eq_ignore_ascii_case("style") {
            self.style.set_css_text(value);
            return;
        }
        match self.attributes.iter_mut().find(|(k, _)| k == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.attributes.push((name.to_string(), value.to_string())),
        }
    }

    pub fn remove_attribute(&mut self, name: &str) {
        self.attributes.retain(|(k, _)| k != name);
    }

    pub fn classes(&self) -> Vec<&str> {
        self.attr("class")
            .map(|c| c.split_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().contains(&class)
    }

    pub fn add_class(&mut self, class: &str) {
        if self.has_class(class) {
            return;
        }
        let value = match self.attr("class").map(str::trim) {
            Some(existing) if !existing.is_empty() => format!("{} {}", existing, class),
            _ => class.to_string(),
        };
        self.set_attribute("class", &value);
    }

    pub fn append_child(&mut self, child: CloneNode) {
        self.children.push(child);
    }

    pub fn text_content(&self) -> String {
        self.children.iter().map(CloneNode::text_content).collect()
    }

    /// Replace all children with a single text node
    pub fn set_text_content(&mut self, text: &str) {
        self.children.clear();
        if !text.is_empty() {
            self.children.push(CloneNode::Text(text.to_string()));
        }
    }

    /// Depth-first search for elements with the given tag, self included
    pub fn find_all(&self, tag: &str) -> Vec<&CloneElement> {
        let mut found = Vec::new();
        self.collect(tag, &mut found);
        found
    }

    fn collect<'a>(&'a self, tag: &str, found: &mut Vec<&'a CloneElement>) {
        if self.tag.eq_ignore_ascii_case(tag) {
            found.push(self);
        }
        for child in &self.children {
            if let CloneNode::Element(el) = child {
                el.collect(tag, found);
            }
        }
    }

    pub fn serialize(&self) -> String {
        let mut out = String::new();
        self.write_xml(&mut out);
        out
    }

    fn write_xml(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.tag);
        for (name, value) in &self.attributes {
            push_attr(out, name, value);
        }
        if !self.style.is_empty() {
            push_attr(out, "style", &self.style.css_text());
        }

        if self.children.is_empty() && self.self_closing() {
            out.push_str(" />");
            return;
        }

        out.push('>');
        for child in &self.children {
            child.write_xml(out);
        }
        out.push_str("</");
        out.push_str(&self.tag);
        out.push('>');
    }

    fn self_closing(&self) -> bool {
        match self.namespace.as_deref() {
            None | Some(XHTML_NS) => VOID_ELEMENTS.contains(&self.tag.to_ascii_lowercase().as_str()),
            Some(_) => true,
        }
    }
}

fn push_attr(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    out.push_str(&escape_attr(value));
    out.push('"');
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Comment text may neither contain `--` nor end in `-`
fn escape_comment(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if ch == '-' && out.ends_with('-') {
            out.push(' ');
        }
        out.push(ch);
    }
    if out.ends_with('-') {
        out.push(' ');
    }
    out
}

fn escape_attr(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}
