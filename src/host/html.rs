//! Static HTML host built on `scraper`.
//!
//! There is no layout engine behind this host: resolved styles come from a
//! small cascade over the document's `<style>` and linked sheets (matching
//! rules in document order, `!important` winning, the `style` attribute
//! last), and sizes are read from the resolved `width`/`height`.

use super::{CssRule, CssRuleKind, Host, PseudoElement, SourceNode, SourceNodeType, StyleSheet, SvgRasterizer};
use crate::dom::XHTML_NS;
use crate::fetch::{FetchRequest, ReqwestTransport, Transport, DEFAULT_TIMEOUT_MS};
use crate::inliner::read_urls;
use crate::css::{parse_declarations, parse_rule, parse_stylesheet};
use crate::style::{ComputedStyle, Declaration, StyleDeclaration};
use crate::util::resolve_url;
use crate::{Error, Result};
use log::{debug, warn};
use scraper::{ElementRef, Html, Node, Selector};
use std::time::Duration;

struct SheetSlot {
    href: Option<String>,
    linked: bool,
    rules: std::result::Result<Vec<CssRule>, String>,
}

struct StyleRule {
    selectors: Vec<(Selector, Option<PseudoElement>)>,
    declarations: Vec<Declaration>,
}

/// A parsed HTML document acting as snapshot host
pub struct HtmlDocument {
    html: Html,
    base_url: Option<String>,
    sheets: Vec<SheetSlot>,
    style_rules: Vec<StyleRule>,
    transport: Box<dyn Transport>,
    rasterizer: Option<Box<dyn SvgRasterizer>>,
}

impl HtmlDocument {
    /// Parse `html`. Inline `<style>` sheets are read right away; linked
    /// sheets stay inaccessible until [`HtmlDocument::fetch_linked_sheets`].
    pub fn parse(html: &str, base_url: Option<&str>) -> Result<Self> {
        let html = Html::parse_document(html);
        let base_url = base_url.map(str::to_string);
        let sheets = collect_sheets(&html, base_url.as_deref());
        let mut doc = Self {
            html,
            base_url,
            sheets,
            style_rules: Vec::new(),
            transport: Box::new(ReqwestTransport::new()?),
            rasterizer: None,
        };
        doc.compile_rules();
        Ok(doc)
    }

    /// Load a page from a URL or a local path, together with its linked sheets
    pub async fn load(location: &str) -> Result<Self> {
        let url = location_url(location)?;
        let transport = ReqwestTransport::new()?;
        let html = fetch_text(&transport, url.as_str()).await?;
        let mut doc = Self::parse(&html, Some(url.as_str()))?.with_transport(transport);
        doc.fetch_linked_sheets().await;
        Ok(doc)
    }

    pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Box::new(transport);
        self
    }

    pub fn with_rasterizer(mut self, rasterizer: impl SvgRasterizer + 'static) -> Self {
        self.rasterizer = Some(Box::new(rasterizer));
        self
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// Fetch every linked sheet not loaded yet. A sheet that fails to load
    /// stays inaccessible and is skipped by the pipeline.
    pub async fn fetch_linked_sheets(&mut self) {
        let mut loaded = Vec::new();
        for (idx, slot) in self.sheets.iter().enumerate() {
            if !slot.linked || slot.rules.is_ok() {
                continue;
            }
            let Some(href) = &slot.href else {
                continue;
            };
            let rules = match fetch_text(self.transport.as_ref(), href).await {
                Ok(text) => Ok(parse_stylesheet(&text)),
                Err(e) => {
                    warn!("Failed to load stylesheet {}: {}", href, e);
                    Err(e.to_string())
                }
            };
            loaded.push((idx, rules));
        }
        for (idx, rules) in loaded {
            self.sheets[idx].rules = rules;
        }
        self.compile_rules();
    }

    pub fn root(&self) -> HtmlNode<'_> {
        HtmlNode::element(self, self.html.root_element())
    }

    /// First element matching `selector`
    pub fn select(&self, selector: &str) -> Result<HtmlNode<'_>> {
        let parsed = Selector::parse(selector)
            .map_err(|e| Error::ConfigError(format!("invalid selector {:?}: {:?}", selector, e)))?;
        self.html
            .select(&parsed)
            .next()
            .map(|el| HtmlNode::element(self, el))
            .ok_or_else(|| Error::Other(format!("no element matches {:?}", selector)))
    }

    fn compile_rules(&mut self) {
        let mut compiled = Vec::new();
        for slot in &self.sheets {
            let Ok(rules) = &slot.rules else {
                continue;
            };
            compiled.extend(
                rules
                    .iter()
                    .filter(|rule| rule.kind == CssRuleKind::Style)
                    .filter_map(|rule| compile_rule(rule, slot.href.as_deref())),
            );
        }
        self.style_rules = compiled;
    }

    fn resolve_style(&self, el: ElementRef<'_>, pseudo: Option<PseudoElement>) -> ComputedStyle {
        let mut merged = StyleDeclaration::new();
        for rule in &self.style_rules {
            let hit = rule
                .selectors
                .iter()
                .any(|(selector, p)| *p == pseudo && selector.matches(&el));
            if hit {
                cascade(&mut merged, &rule.declarations);
            }
        }
        if pseudo.is_none() {
            if let Some(inline) = el.value().attr("style") {
                cascade(&mut merged, &absolutize_declarations(parse_declarations(inline), self.base_url()));
            }
        }

        let mut style = ComputedStyle::new();
        for decl in merged.iter() {
            style = style.with_property(&decl.name, &decl.value, decl.important);
        }
        style.with_css_text(merged.css_text())
    }
}

impl Host for HtmlDocument {
    fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    fn style_sheets(&self) -> Vec<Result<StyleSheet>> {
        self.sheets
            .iter()
            .map(|slot| match &slot.rules {
                Ok(rules) => Ok(StyleSheet {
                    href: slot.href.clone(),
                    rules: rules.clone(),
                }),
                Err(reason) => Err(Error::StyleSheetAccessError(reason.clone())),
            })
            .collect()
    }

    fn rasterizer(&self) -> Option<&dyn SvgRasterizer> {
        self.rasterizer.as_deref()
    }
}

#[derive(Clone)]
enum HtmlNodeKind<'a> {
    Element(ElementRef<'a>),
    Text(String),
    Comment(String),
    Other,
}

/// A node of an [`HtmlDocument`]
#[derive(Clone)]
pub struct HtmlNode<'a> {
    doc: &'a HtmlDocument,
    kind: HtmlNodeKind<'a>,
}

impl<'a> HtmlNode<'a> {
    fn element(doc: &'a HtmlDocument, el: ElementRef<'a>) -> Self {
        Self {
            doc,
            kind: HtmlNodeKind::Element(el),
        }
    }

    fn as_element(&self) -> Option<ElementRef<'a>> {
        match &self.kind {
            HtmlNodeKind::Element(el) => Some(*el),
            _ => None,
        }
    }
}

impl<'a> SourceNode for HtmlNode<'a> {
    fn node_type(&self) -> SourceNodeType {
        match self.kind {
            HtmlNodeKind::Element(_) => SourceNodeType::Element,
            HtmlNodeKind::Text(_) => SourceNodeType::Text,
            HtmlNodeKind::Comment(_) => SourceNodeType::Comment,
            HtmlNodeKind::Other => SourceNodeType::Other,
        }
    }

    fn local_name(&self) -> Option<String> {
        self.as_element().map(|el| el.value().name().to_string())
    }

    fn namespace(&self) -> Option<String> {
        let el = self.as_element()?;
        let ns = el.value().name.ns.to_string();
        if ns.is_empty() || ns == XHTML_NS {
            None
        } else {
            Some(ns)
        }
    }

    /// `src` of images and `href` of SVG images come back resolved against
    /// the document URL
    fn attributes(&self) -> Vec<(String, String)> {
        let Some(el) = self.as_element() else {
            return Vec::new();
        };
        let url_attr = match el.value().name() {
            "img" => Some("src"),
            "image" => Some("href"),
            _ => None,
        };
        el.value()
            .attrs()
            .map(|(k, v)| {
                let value = if Some(k) == url_attr && !v.trim().is_empty() {
                    resolve_url(v.trim(), self.doc.base_url())
                } else {
                    v.to_string()
                };
                (k.to_string(), value)
            })
            .collect()
    }

    fn text(&self) -> Option<String> {
        match &self.kind {
            HtmlNodeKind::Text(t) | HtmlNodeKind::Comment(t) => Some(t.clone()),
            _ => None,
        }
    }

    fn children(&self) -> Vec<Self> {
        let Some(el) = self.as_element() else {
            return Vec::new();
        };
        el.children()
            .map(|child| {
                let kind = match child.value() {
                    Node::Element(_) => ElementRef::wrap(child).map_or(HtmlNodeKind::Other, HtmlNodeKind::Element),
                    Node::Text(t) => HtmlNodeKind::Text(String::from(&*t.text)),
                    Node::Comment(c) => HtmlNodeKind::Comment(String::from(&*c.comment)),
                    _ => HtmlNodeKind::Other,
                };
                HtmlNode { doc: self.doc, kind }
            })
            .collect()
    }

    fn computed_style(&self, pseudo: Option<PseudoElement>) -> ComputedStyle {
        match self.as_element() {
            Some(el) => self.doc.resolve_style(el, pseudo),
            None => ComputedStyle::new(),
        }
    }

    fn live_value(&self) -> Option<String> {
        let el = self.as_element()?;
        match el.value().name() {
            "textarea" => Some(el.text().collect()),
            "input" => el.value().attr("value").map(str::to_string),
            _ => None,
        }
    }

    fn scroll_size(&self) -> (f64, f64) {
        let style = self.computed_style(None);
        (style.px("width"), style.px("height"))
    }
}

fn compile_rule(rule: &CssRule, base_url: Option<&str>) -> Option<StyleRule> {
    let block = parse_rule(&rule.css_text)?;
    let selectors: Vec<_> = block
        .selectors
        .iter()
        .filter_map(|raw| {
            let (base, pseudo) = split_pseudo(raw);
            match Selector::parse(base) {
                Ok(selector) => Some((selector, pseudo)),
                Err(e) => {
                    debug!("ignoring selector {:?}: {:?}", raw, e);
                    None
                }
            }
        })
        .collect();
    if selectors.is_empty() {
        return None;
    }
    Some(StyleRule {
        selectors,
        declarations: absolutize_declarations(block.declarations, base_url),
    })
}

/// Resolve relative `url(...)` references against the sheet they came from
fn absolutize_declarations(declarations: Vec<Declaration>, base_url: Option<&str>) -> Vec<Declaration> {
    if base_url.is_none() {
        return declarations;
    }
    declarations
        .into_iter()
        .map(|mut decl| {
            let refs = read_urls(&decl.value);
            if !refs.is_empty() {
                let mut value = String::with_capacity(decl.value.len());
                let mut cursor = 0;
                for reference in &refs {
                    value.push_str(&decl.value[cursor..reference.span.start]);
                    value.push_str(&resolve_url(&reference.url, base_url));
                    cursor = reference.span.end;
                }
                value.push_str(&decl.value[cursor..]);
                decl.value = value;
            }
            decl
        })
        .collect()
}

fn split_pseudo(selector: &str) -> (&str, Option<PseudoElement>) {
    let lower = selector.to_ascii_lowercase();
    for pseudo in PseudoElement::ALL {
        for marker in [format!("::{}", pseudo.as_str()), format!(":{}", pseudo.as_str())] {
            if lower.ends_with(&marker) {
                let base = selector[..selector.len() - marker.len()].trim_end();
                return (if base.is_empty() { "*" } else { base }, Some(pseudo));
            }
        }
    }
    (selector, None)
}

fn cascade(target: &mut StyleDeclaration, declarations: &[Declaration]) {
    for decl in declarations {
        if target.is_important(&decl.name) && !decl.important {
            continue;
        }
        target.set_property(&decl.name, &decl.value, decl.important);
    }
}

fn collect_sheets(html: &Html, base_url: Option<&str>) -> Vec<SheetSlot> {
    let mut sheets = Vec::new();
    let Ok(selector) = Selector::parse("style, link") else {
        return sheets;
    };
    for el in html.select(&selector) {
        match el.value().name() {
            "style" => sheets.push(SheetSlot {
                href: base_url.map(str::to_string),
                linked: false,
                rules: Ok(parse_stylesheet(&el.text().collect::<String>())),
            }),
            _ => {
                let is_sheet = el
                    .value()
                    .attr("rel")
                    .is_some_and(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("stylesheet")));
                let Some(href) = el.value().attr("href").filter(|_| is_sheet) else {
                    continue;
                };
                let href = resolve_url(href, base_url);
                sheets.push(SheetSlot {
                    rules: Err(format!("stylesheet {} is not loaded", href)),
                    href: Some(href),
                    linked: true,
                });
            }
        }
    }
    sheets
}

fn location_url(location: &str) -> Result<url::Url> {
    if let Ok(url) = url::Url::parse(location) {
        if matches!(url.scheme(), "http" | "https" | "file") {
            return Ok(url);
        }
    }
    let path = std::fs::canonicalize(location)?;
    url::Url::from_file_path(&path).map_err(|_| Error::ConfigError(format!("cannot turn {} into a file URL", path.display())))
}

async fn fetch_text(transport: &dyn Transport, url: &str) -> Result<String> {
    let request = FetchRequest {
        url: url.to_string(),
        with_credentials: false,
    };
    let response = tokio::time::timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS), transport.get(&request))
        .await
        .map_err(|_| Error::fetch(url, format!("timed out after {}ms", DEFAULT_TIMEOUT_MS)))??;
    if !response.is_success() {
        return Err(Error::fetch(url, format!("status {}", response.status)));
    }
    Ok(String::from_utf8_lossy(&response.body).into_owned())
}
