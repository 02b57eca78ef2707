//! Snapshot cloner: copies a source subtree into a free-standing clone tree
//! carrying everything needed to render it in isolation.

use crate::dom::{CloneElement, CloneNode, ElementKind, SVG_NS};
use crate::host::{Host, PseudoElement, SourceNode, SourceNodeType};
use crate::style::ComputedStyle;
use crate::{Error, Result};
use futures::future::{FutureExt, LocalBoxFuture};
use log::{debug, warn};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::sync::Arc;

/// Inclusion predicate applied to every descendant of the snapshot root
pub type NodeFilter = Arc<dyn Fn(&dyn SourceNode) -> bool + Send + Sync>;

const UID_PREFIX: &str = "rfsnap-u";

/// Recursive, order-preserving cloner
pub struct SnapshotCloner<'a> {
    host: &'a dyn Host,
    filter: Option<&'a NodeFilter>,
    next_uid: Cell<u64>,
    /// Generated-looking class names authored somewhere in the source subtree
    authored: RefCell<HashSet<String>>,
}

impl<'a> SnapshotCloner<'a> {
    pub fn new(host: &'a dyn Host, filter: Option<&'a NodeFilter>) -> Self {
        Self {
            host,
            filter,
            next_uid: Cell::new(0),
            authored: RefCell::new(HashSet::new()),
        }
    }

    /// Clone `root` and its subtree. The filter is never applied to the root.
    pub async fn clone_tree<N: SourceNode>(&self, root: &N) -> Result<CloneNode> {
        collect_authored_classes(root, &mut self.authored.borrow_mut());
        self.clone_node(root, true)
            .await?
            .ok_or_else(|| Error::Other("snapshot root is not an element, text or comment node".into()))
    }

    /// Clone one node. `None` means the node was filtered out (or is of a
    /// type that has no clone) and must simply be skipped by the caller.
    pub fn clone_node<'s, N: SourceNode + 's>(
        &'s self,
        node: &'s N,
        is_root: bool,
    ) -> LocalBoxFuture<'s, Result<Option<CloneNode>>> {
        async move {
            if !is_root {
                if let Some(filter) = self.filter {
                    if !filter(node) {
                        return Ok(None);
                    }
                }
            }

            match node.node_type() {
                SourceNodeType::Text => Ok(Some(CloneNode::Text(node.text().unwrap_or_default()))),
                SourceNodeType::Comment => Ok(Some(CloneNode::Comment(node.text().unwrap_or_default()))),
                SourceNodeType::Element => {
                    let el = self.clone_element(node).await?;
                    Ok(Some(CloneNode::Element(el)))
                }
                SourceNodeType::Other => {
                    debug!("skipping non-element node during snapshot");
                    Ok(None)
                }
            }
        }
        .boxed_local()
    }

    async fn clone_element<N: SourceNode>(&self, node: &N) -> Result<CloneElement> {
        let kind = node.element_kind();
        let (mut clone, with_children) = match kind {
            ElementKind::DrawingSurface => match self.snapshot_surface(node).await? {
                Some(img) => (img, false),
                None => (shallow_copy(node, kind), true),
            },
            _ => (shallow_copy(node, kind), true),
        };

        if with_children {
            // one sibling at a time, in document order
            for child in node.children() {
                if let Some(cloned) = self.clone_node(&child, false).await? {
                    clone.append_child(cloned);
                }
            }
        }

        copy_style(&node.computed_style(None), &mut clone);
        self.clone_pseudo_elements(node, &mut clone);
        copy_user_input(node, &mut clone);
        fix_svg(&mut clone);
        Ok(clone)
    }

    /// Replace a drawing surface by a static image of its current pixels
    async fn snapshot_surface<N: SourceNode>(&self, node: &N) -> Result<Option<CloneElement>> {
        let Some(data_url) = node.surface_data_url() else {
            warn!("drawing surface exposes no pixel snapshot; cloning its markup instead");
            return Ok(None);
        };
        self.host
            .decode_image(&data_url)
            .await
            .map_err(|e| Error::DecodeError(format!("drawing surface snapshot: {}", e)))?;

        let mut img = CloneElement::new("img", ElementKind::Generic);
        img.set_attribute("src", &data_url);
        Ok(Some(img))
    }

    fn clone_pseudo_elements<N: SourceNode>(&self, node: &N, clone: &mut CloneElement) {
        for pseudo in PseudoElement::ALL {
            let style = node.computed_style(Some(pseudo));
            let content = style.get("content").unwrap_or_default();
            let content = content.trim();
            if content.is_empty() || content == "none" {
                continue;
            }

            let class = self.unique_class(clone);
            clone.add_class(&class);
            let body = match style.css_text() {
                Some(text) => format!("{} content: {};", text, content),
                None => format_properties(&style),
            };
            let rule = format!(".{}:{}{{{}}}", class, pseudo.as_str(), body);
            clone.append_child(CloneNode::Element(CloneElement::style_element(rule)));
        }
    }

    fn unique_class(&self, clone: &CloneElement) -> String {
        loop {
            let n = self.next_uid.get();
            self.next_uid.set(n + 1);
            let class = format!("{}{}", UID_PREFIX, n);
            if !clone.has_class(&class) && !self.authored.borrow().contains(&class) {
                return class;
            }
        }
    }
}

fn collect_authored_classes<N: SourceNode>(node: &N, found: &mut HashSet<String>) {
    if let Some(classes) = node.attribute("class") {
        found.extend(
            classes
                .split_whitespace()
                .filter(|c| c.starts_with(UID_PREFIX))
                .map(str::to_string),
        );
    }
    for child in node.children() {
        collect_authored_classes(&child, found);
    }
}

fn shallow_copy<N: SourceNode>(node: &N, kind: ElementKind) -> CloneElement {
    let mut clone = CloneElement::new(node.local_name().unwrap_or_default(), kind);
    clone.namespace = node.namespace();
    for (name, value) in node.attributes() {
        clone.set_attribute(&name, &value);
    }
    clone
}

fn copy_style(source: &ComputedStyle, clone: &mut CloneElement) {
    match source.css_text() {
        Some(text) => {
            clone.style.set_css_text(text);
            // hosts serialize an invalid default for this one
            clone.style.set_property("font-stretch", "normal", false);
        }
        None => {
            for decl in source.properties() {
                clone.style.set_property(&decl.name, &decl.value, decl.important);
            }
        }
    }
}

fn format_properties(style: &ComputedStyle) -> String {
    let props = style
        .properties()
        .iter()
        .map(|d| {
            let priority = if d.important { " !important" } else { "" };
            format!("{}: {}{}", d.name, d.value, priority)
        })
        .collect::<Vec<_>>()
        .join("; ");
    format!("{};", props)
}

fn copy_user_input<N: SourceNode>(node: &N, clone: &mut CloneElement) {
    match clone.kind {
        ElementKind::TextArea => {
            if let Some(value) = node.live_value() {
                clone.set_text_content(&value);
            }
        }
        ElementKind::TextInput => {
            if let Some(value) = node.live_value() {
                clone.set_attribute("value", &value);
            }
        }
        _ => {}
    }
}

fn fix_svg(clone: &mut CloneElement) {
    if clone.kind != ElementKind::VectorGraphics {
        return;
    }
    clone.set_attribute("xmlns", SVG_NS);
    if !clone.tag.eq_ignore_ascii_case("rect") {
        return;
    }
    for attr in ["width", "height"] {
        if let Some(value) = clone.attr(attr).map(str::to_string) {
            if !value.is_empty() {
                clone.style.set_property(attr, &value, false);
            }
        }
    }
}
