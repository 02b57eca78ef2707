//! In-memory host: every resolved style, live value and network response is
//! supplied up front. Used by the crate's own tests and handy for embedding
//! the pipeline behind a host that already has its own document model.

use super::{
    decode_data_uri, Host, ImageInfo, PseudoElement, RasterRequest, SourceNode, SourceNodeType,
    StyleSheet, SvgRasterizer,
};
use crate::dom::SVG_NS;
use crate::fetch::{FetchRequest, FetchResponse, Transport};
use crate::style::ComputedStyle;
use crate::util::{data_url_mime, is_data_url};
use crate::{Error, Result};
use futures::future::{FutureExt, LocalBoxFuture};
use image::{Rgba, RgbaImage};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
struct MemoryNodeData {
    node_type: Option<SourceNodeType>,
    local_name: Option<String>,
    namespace: Option<String>,
    attributes: Vec<(String, String)>,
    text: Option<String>,
    children: Vec<MemoryNode>,
    style: ComputedStyle,
    pseudo: Vec<(PseudoElement, ComputedStyle)>,
    value: Option<String>,
    surface: Option<String>,
    scroll: (f64, f64),
}

/// A cheaply clonable node of an in-memory document
#[derive(Debug, Clone)]
pub struct MemoryNode(Rc<MemoryNodeData>);

impl MemoryNode {
    fn new(data: MemoryNodeData) -> Self {
        MemoryNode(Rc::new(data))
    }

    pub fn element(tag: &str) -> Self {
        Self::new(MemoryNodeData {
            node_type: Some(SourceNodeType::Element),
            local_name: Some(tag.to_string()),
            ..Default::default()
        })
    }

    /// An element in the SVG namespace
    pub fn svg(tag: &str) -> Self {
        Self::element(tag).edit(|d| d.namespace = Some(SVG_NS.to_string()))
    }

    pub fn text(text: &str) -> Self {
        Self::new(MemoryNodeData {
            node_type: Some(SourceNodeType::Text),
            text: Some(text.to_string()),
            ..Default::default()
        })
    }

    pub fn comment(text: &str) -> Self {
        Self::new(MemoryNodeData {
            node_type: Some(SourceNodeType::Comment),
            text: Some(text.to_string()),
            ..Default::default()
        })
    }

    fn edit(mut self, f: impl FnOnce(&mut MemoryNodeData)) -> Self {
        f(Rc::make_mut(&mut self.0));
        self
    }

    pub fn with_attr(self, name: &str, value: &str) -> Self {
        self.edit(|d| {
            d.attributes.retain(|(k, _)| k != name);
            d.attributes.push((name.to_string(), value.to_string()));
        })
    }

    pub fn with_child(self, child: MemoryNode) -> Self {
        self.edit(|d| d.children.push(child))
    }

    pub fn with_children(self, children: impl IntoIterator<Item = MemoryNode>) -> Self {
        self.edit(|d| d.children.extend(children))
    }

    pub fn with_style(self, style: ComputedStyle) -> Self {
        self.edit(|d| d.style = style)
    }

    pub fn with_pseudo(self, pseudo: PseudoElement, style: ComputedStyle) -> Self {
        self.edit(|d| {
            d.pseudo.retain(|(p, _)| *p != pseudo);
            d.pseudo.push((pseudo, style));
        })
    }

    /// Live value of a form control
    pub fn with_value(self, value: &str) -> Self {
        self.edit(|d| d.value = Some(value.to_string()))
    }

    /// Current pixels of a drawing surface
    pub fn with_surface(self, data_url: &str) -> Self {
        self.edit(|d| d.surface = Some(data_url.to_string()))
    }

    pub fn with_scroll_size(self, width: f64, height: f64) -> Self {
        self.edit(|d| d.scroll = (width, height))
    }
}

impl SourceNode for MemoryNode {
    fn node_type(&self) -> SourceNodeType {
        self.0.node_type.unwrap_or(SourceNodeType::Other)
    }

    fn local_name(&self) -> Option<String> {
        self.0.local_name.clone()
    }

    fn namespace(&self) -> Option<String> {
        self.0.namespace.clone()
    }

    fn attributes(&self) -> Vec<(String, String)> {
        self.0.attributes.clone()
    }

    fn text(&self) -> Option<String> {
        self.0.text.clone()
    }

    fn children(&self) -> Vec<Self> {
        self.0.children.clone()
    }

    fn computed_style(&self, pseudo: Option<PseudoElement>) -> ComputedStyle {
        match pseudo {
            None => self.0.style.clone(),
            Some(p) => self
                .0
                .pseudo
                .iter()
                .find(|(q, _)| *q == p)
                .map(|(_, s)| s.clone())
                .unwrap_or_default(),
        }
    }

    fn live_value(&self) -> Option<String> {
        self.0.value.clone()
    }

    fn surface_data_url(&self) -> Option<String> {
        self.0.surface.clone()
    }

    fn scroll_size(&self) -> (f64, f64) {
        self.0.scroll
    }
}

#[derive(Debug, Clone)]
enum Route {
    Body(Vec<u8>),
    Status(u16),
    Delayed(Vec<u8>, Duration),
    Stalled,
}

/// Transport answering from a fixed routing table and logging every request.
/// Unknown URLs answer 404.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    exact: Vec<(String, Route)>,
    prefix: Vec<(String, Route)>,
    requests: RefCell<Vec<FetchRequest>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(mut self, url: &str, body: Vec<u8>) -> Self {
        self.exact.push((url.to_string(), Route::Body(body)));
        self
    }

    /// Answer every URL starting with `prefix` (cache-busted URLs included)
    pub fn with_prefix_body(mut self, prefix: &str, body: Vec<u8>) -> Self {
        self.prefix.push((prefix.to_string(), Route::Body(body)));
        self
    }

    pub fn with_status(mut self, url: &str, status: u16) -> Self {
        self.exact.push((url.to_string(), Route::Status(status)));
        self
    }

    pub fn with_delayed_body(mut self, url: &str, body: Vec<u8>, delay: Duration) -> Self {
        self.exact.push((url.to_string(), Route::Delayed(body, delay)));
        self
    }

    /// A URL whose response never arrives
    pub fn with_stalled(mut self, url: &str) -> Self {
        self.exact.push((url.to_string(), Route::Stalled));
        self
    }

    /// Requests seen so far, in arrival order
    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.borrow().clone()
    }

    fn route(&self, url: &str) -> Option<Route> {
        self.exact
            .iter()
            .find(|(u, _)| u == url)
            .or_else(|| self.prefix.iter().find(|(p, _)| url.starts_with(p.as_str())))
            .map(|(_, r)| r.clone())
    }
}

impl Transport for MemoryTransport {
    fn get<'a>(&'a self, request: &'a FetchRequest) -> LocalBoxFuture<'a, Result<FetchResponse>> {
        self.requests.borrow_mut().push(request.clone());
        let route = self.route(&request.url);
        async move {
            match route {
                Some(Route::Body(body)) => Ok(FetchResponse::ok(body)),
                Some(Route::Status(status)) => Ok(FetchResponse {
                    status,
                    body: Vec::new(),
                }),
                Some(Route::Delayed(body, delay)) => {
                    tokio::time::sleep(delay).await;
                    Ok(FetchResponse::ok(body))
                }
                Some(Route::Stalled) => futures::future::pending().await,
                None => Ok(FetchResponse {
                    status: 404,
                    body: Vec::new(),
                }),
            }
        }
        .boxed_local()
    }
}

/// Rasterizer producing a solid image and remembering what it was asked for
#[derive(Debug)]
pub struct MemoryRasterizer {
    fill: Rgba<u8>,
    css_size_only: bool,
    failing: bool,
    requests: RefCell<Vec<RasterRequest>>,
}

impl MemoryRasterizer {
    pub fn new(fill: [u8; 4]) -> Self {
        Self {
            fill: Rgba(fill),
            css_size_only: false,
            failing: false,
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Ignore the requested scale and answer at CSS size
    pub fn at_css_size(mut self) -> Self {
        self.css_size_only = true;
        self
    }

    /// Fail every request as an undecodable container
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn requests(&self) -> Vec<RasterRequest> {
        self.requests.borrow().clone()
    }
}

impl SvgRasterizer for MemoryRasterizer {
    fn rasterize<'a>(&'a self, request: &'a RasterRequest) -> LocalBoxFuture<'a, Result<RgbaImage>> {
        self.requests.borrow_mut().push(request.clone());
        async move {
            if self.failing {
                return Err(Error::DecodeError("cannot decode vector container".into()));
            }
            let (w, h) = if self.css_size_only {
                (request.width.round() as u32, request.height.round() as u32)
            } else {
                request.target_size()?
            };
            Ok(RgbaImage::from_pixel(w, h, self.fill))
        }
        .boxed_local()
    }
}

/// Host backed by in-memory stylesheets, transport and rasterizer
#[derive(Debug, Default)]
pub struct MemoryHost {
    transport: MemoryTransport,
    sheets: Vec<std::result::Result<StyleSheet, String>>,
    rasterizer: Option<MemoryRasterizer>,
    undecodable: Vec<String>,
    strict_decoding: bool,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transport(mut self, transport: MemoryTransport) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_style_sheet(mut self, sheet: StyleSheet) -> Self {
        self.sheets.push(Ok(sheet));
        self
    }

    /// A sheet whose rules cannot be enumerated (e.g. cross-origin)
    pub fn with_blocked_style_sheet(mut self, reason: &str) -> Self {
        self.sheets.push(Err(reason.to_string()));
        self
    }

    pub fn with_rasterizer(mut self, rasterizer: MemoryRasterizer) -> Self {
        self.rasterizer = Some(rasterizer);
        self
    }

    /// Data URIs containing `needle` fail to decode
    pub fn with_undecodable(mut self, needle: &str) -> Self {
        self.undecodable.push(needle.to_string());
        self
    }

    /// Decode payloads for real instead of accepting any data URI
    pub fn with_strict_decoding(mut self) -> Self {
        self.strict_decoding = true;
        self
    }

    pub fn memory_transport(&self) -> &MemoryTransport {
        &self.transport
    }

    pub fn memory_rasterizer(&self) -> Option<&MemoryRasterizer> {
        self.rasterizer.as_ref()
    }
}

impl Host for MemoryHost {
    fn transport(&self) -> &dyn Transport {
        &self.transport
    }

    fn style_sheets(&self) -> Vec<Result<StyleSheet>> {
        self.sheets
            .iter()
            .map(|s| s.clone().map_err(Error::StyleSheetAccessError))
            .collect()
    }

    fn decode_image<'a>(&'a self, data_uri: &'a str) -> LocalBoxFuture<'a, Result<ImageInfo>> {
        async move {
            if self.undecodable.iter().any(|n| data_uri.contains(n.as_str())) {
                return Err(Error::DecodeError("image failed to load".into()));
            }
            if self.strict_decoding {
                return decode_data_uri(data_uri);
            }
            if !is_data_url(data_uri) {
                return Err(Error::DecodeError("not a data URI".into()));
            }
            Ok(ImageInfo {
                mime: data_url_mime(data_uri).unwrap_or_default().to_string(),
                width: 0,
                height: 0,
            })
        }
        .boxed_local()
    }

    fn rasterizer(&self) -> Option<&dyn SvgRasterizer> {
        self.rasterizer.as_ref().map(|r| r as &dyn SvgRasterizer)
    }
}
