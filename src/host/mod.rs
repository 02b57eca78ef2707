//! Host environment contracts.
//!
//! The pipeline never resolves styles, lays out, decodes or rasterizes by
//! itself. It reads those results from the host through the traits below.
//! Three adapters ship with the crate: an in-memory host for tests and
//! embedding, a static HTML host (`html` feature) and a headless Chrome
//! rasterizer (`cdp` feature).

pub mod memory;

#[cfg(feature = "html")]
pub mod html;

#[cfg(feature = "cdp")]
pub mod cdp;

use crate::css::parse_rule;
use crate::dom::ElementKind;
use crate::fetch::Transport;
use crate::style::ComputedStyle;
use crate::util::{data_url_mime, decode_data_url, is_data_url};
use crate::{Error, Result};
use futures::future::{FutureExt, LocalBoxFuture};
use image::RgbaImage;

/// Coarse node type of a source node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceNodeType {
    Element,
    Text,
    Comment,
    /// Processing instructions, doctypes and anything else; never cloned
    Other,
}

/// Generated-content pseudo-elements captured by the cloner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PseudoElement {
    Before,
    After,
}

impl PseudoElement {
    pub const ALL: [PseudoElement; 2] = [PseudoElement::Before, PseudoElement::After];

    pub fn as_str(&self) -> &'static str {
        match self {
            PseudoElement::Before => "before",
            PseudoElement::After => "after",
        }
    }
}

/// A node of the live host document. Read-only to the pipeline.
pub trait SourceNode {
    fn node_type(&self) -> SourceNodeType;

    /// Local tag name for elements
    fn local_name(&self) -> Option<String>;

    /// Namespace URI for elements, if the host tracks one
    fn namespace(&self) -> Option<String> {
        None
    }

    /// Authored attributes in document order
    fn attributes(&self) -> Vec<(String, String)>;

    /// Character data of text and comment nodes
    fn text(&self) -> Option<String>;

    fn children(&self) -> Vec<Self>
    where
        Self: Sized;

    /// Resolved style of the node or of one of its pseudo-elements
    fn computed_style(&self, pseudo: Option<PseudoElement>) -> ComputedStyle;

    /// Current value of a form control, as typed by the user
    fn live_value(&self) -> Option<String> {
        None
    }

    /// Current pixels of a drawing surface as a data URI
    fn surface_data_url(&self) -> Option<String> {
        None
    }

    /// Scroll width and height in CSS pixels
    fn scroll_size(&self) -> (f64, f64);

    fn element_kind(&self) -> ElementKind {
        let name = self.local_name().unwrap_or_default();
        ElementKind::classify(&name, self.namespace().as_deref())
    }

    fn attribute(&self, name: &str) -> Option<String> {
        self.attributes()
            .into_iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }
}

/// Kind of a stylesheet rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CssRuleKind {
    FontFace,
    Style,
    Other,
}

/// A rule of a host stylesheet, as serialized text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssRule {
    pub kind: CssRuleKind,
    pub css_text: String,
}

impl CssRule {
    pub fn new(kind: CssRuleKind, css_text: impl Into<String>) -> Self {
        Self {
            kind,
            css_text: css_text.into(),
        }
    }

    pub fn font_face(css_text: impl Into<String>) -> Self {
        Self::new(CssRuleKind::FontFace, css_text)
    }

    /// The `src` descriptor of a font-face rule
    pub fn font_src(&self) -> Option<String> {
        if self.kind != CssRuleKind::FontFace {
            return None;
        }
        parse_rule(&self.css_text)?
            .declarations
            .into_iter()
            .find(|d| d.name == "src")
            .map(|d| d.value)
    }
}

/// A stylesheet whose rules are accessible to the pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleSheet {
    /// Location the sheet was loaded from; base for its relative references
    pub href: Option<String>,
    pub rules: Vec<CssRule>,
}

/// Result of decoding an embedded image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub mime: String,
    pub width: u32,
    pub height: u32,
}

/// What the compositor asks a rasterizer to draw
#[derive(Debug, Clone, PartialEq)]
pub struct RasterRequest {
    /// `data:image/svg+xml` container
    pub svg_data_uri: String,
    /// Container size in CSS pixels
    pub width: f64,
    pub height: f64,
    /// Device pixels per CSS pixel
    pub scale: f64,
}

/// Largest surface side, in device pixels
pub const MAX_SURFACE_SIDE: u32 = 32_767;

/// Largest surface area, in device pixels
pub const MAX_SURFACE_AREA: u64 = 268_435_456;

impl RasterRequest {
    /// Pixel size of the surface the image ends up on. Sizes beyond
    /// [`MAX_SURFACE_SIDE`] or [`MAX_SURFACE_AREA`] are a render error.
    pub fn target_size(&self) -> Result<(u32, u32)> {
        let width = (self.width * self.scale).round().max(0.0);
        let height = (self.height * self.scale).round().max(0.0);
        let side = f64::from(MAX_SURFACE_SIDE);
        let fits = width <= side && height <= side && width * height <= MAX_SURFACE_AREA as f64;
        if !fits {
            return Err(Error::RenderError(format!(
                "surface of {}x{} device pixels exceeds the {}x{} limit",
                width, height, MAX_SURFACE_SIDE, MAX_SURFACE_SIDE
            )));
        }
        Ok((width as u32, height as u32))
    }
}

/// Turns an SVG container into pixels
pub trait SvgRasterizer {
    fn rasterize<'a>(&'a self, request: &'a RasterRequest) -> LocalBoxFuture<'a, Result<RgbaImage>>;
}

/// Everything the pipeline consumes from the host besides the nodes themselves
pub trait Host {
    fn transport(&self) -> &dyn Transport;

    /// Stylesheets of the document; sheets that refuse enumeration are errors
    fn style_sheets(&self) -> Vec<Result<StyleSheet>>;

    /// Load an embedded image and report when it is decoded
    fn decode_image<'a>(&'a self, data_uri: &'a str) -> LocalBoxFuture<'a, Result<ImageInfo>> {
        async move { decode_data_uri(data_uri) }.boxed_local()
    }

    fn rasterizer(&self) -> Option<&dyn SvgRasterizer> {
        None
    }
}

/// Decode a data URI with the `image` crate. SVG payloads are accepted
/// without decoding since they carry no intrinsic pixel size.
pub fn decode_data_uri(data_uri: &str) -> Result<ImageInfo> {
    if !is_data_url(data_uri) {
        return Err(Error::DecodeError(format!("not a data URI: {:.32}", data_uri)));
    }
    let bytes = decode_data_url(data_uri)
        .ok_or_else(|| Error::DecodeError("malformed data URI payload".into()))?;
    let mime = data_url_mime(data_uri).unwrap_or_default().to_string();

    if mime == "image/svg+xml" {
        if String::from_utf8_lossy(&bytes).contains("<svg") {
            return Ok(ImageInfo {
                mime,
                width: 0,
                height: 0,
            });
        }
        return Err(Error::DecodeError("SVG payload has no <svg> root".into()));
    }

    let img = image::load_from_memory(&bytes).map_err(|e| Error::DecodeError(e.to_string()))?;
    Ok(ImageInfo {
        mime,
        width: img.width(),
        height: img.height(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::encode_payload;
    use std::io::Cursor;

    #[test]
    fn font_src_of_font_face() {
        let rule = CssRule::font_face(
            "@font-face { font-family: \"A\"; src: url(a.woff) format(\"woff\"), local(A); }",
        );
        assert_eq!(
            rule.font_src().as_deref(),
            Some("url(a.woff) format(\"woff\"), local(A)")
        );
        let style = CssRule::new(CssRuleKind::Style, "p { src: url(x) }");
        assert_eq!(style.font_src(), None);
    }

    #[test]
    fn target_size_rounds() {
        let req = RasterRequest {
            svg_data_uri: String::new(),
            width: 100.4,
            height: 50.0,
            scale: 1.5,
        };
        assert_eq!(req.target_size().unwrap(), (151, 75));
    }

    #[test]
    fn oversized_target_is_a_render_error() {
        let mut req = RasterRequest {
            svg_data_uri: String::new(),
            width: 200.0,
            height: 100.0,
            scale: 1e9,
        };
        assert!(matches!(req.target_size(), Err(Error::RenderError(_))));

        // each side fits, the area does not
        req.scale = 1.0;
        req.width = 30_000.0;
        req.height = 30_000.0;
        assert!(matches!(req.target_size(), Err(Error::RenderError(_))));

        req.width = f64::INFINITY;
        assert!(req.target_size().is_err());
    }

    #[test]
    fn decodes_png_data_uri() {
        let img = RgbaImage::from_pixel(3, 2, image::Rgba([1, 2, 3, 255]));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        let uri = format!("data:image/png;base64,{}", encode_payload(&buf));
        let info = decode_data_uri(&uri).unwrap();
        assert_eq!((info.width, info.height), (3, 2));

        assert!(decode_data_uri("data:image/png;base64,AAAA").is_err());
        assert!(decode_data_uri("").is_err());
    }
}
