//! Compositor: drives the snapshot pipeline, wraps the result in an SVG
//! container and rasterizes it.

use crate::clone::SnapshotCloner;
use crate::dom::{CloneElement, CloneNode, ElementKind, SVG_NS, XHTML_NS};
use crate::fetch::ResourceFetcher;
use crate::fonts::FontResolver;
use crate::host::{Host, RasterRequest, SourceNode};
use crate::images::ImageEmbedder;
use crate::inliner::CssInliner;
use crate::util::escape_xhtml;
use crate::{Error, RenderOptions, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use log::{debug, warn};
use std::cell::Cell;
use std::io::Cursor;
use std::time::Duration;

/// Wait between decoding the container and reading its pixels
pub const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// JPEG quality used when the options leave it unset
pub const DEFAULT_JPEG_QUALITY: f64 = 0.92;

/// Progress of one conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pending,
    Cloning,
    FontResolving,
    ImageInlining,
    OptionsApplied,
    Serialized,
    RasterizeRequested,
    Rasterized,
    Failed,
}

/// Serialized vector output and the size it was laid out at
#[derive(Debug, Clone, PartialEq)]
pub struct SvgContainer {
    pub data_uri: String,
    pub width: f64,
    pub height: f64,
}

/// One conversion of one node with one set of options
pub struct Pipeline<'a> {
    host: &'a dyn Host,
    options: &'a RenderOptions,
    stage: Cell<Stage>,
}

impl<'a> Pipeline<'a> {
    pub fn new(host: &'a dyn Host, options: &'a RenderOptions) -> Self {
        Self {
            host,
            options,
            stage: Cell::new(Stage::Pending),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage.get()
    }

    fn enter(&self, stage: Stage) {
        debug!("snapshot stage: {:?}", stage);
        self.stage.set(stage);
    }

    fn finish<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            warn!("snapshot failed during {:?}: {}", self.stage(), e);
            self.stage.set(Stage::Failed);
        }
        result
    }

    /// Clone, inline and serialize `node` into an SVG container
    pub async fn to_svg<N: SourceNode>(&self, node: &N) -> Result<SvgContainer> {
        let result = self.build_svg(node).await;
        self.finish(result)
    }

    /// Run the full pipeline and draw the container onto a pixel surface
    pub async fn to_surface<N: SourceNode>(&self, node: &N) -> Result<RgbaImage> {
        let result = self.build_surface(node).await;
        self.finish(result)
    }

    async fn build_svg<N: SourceNode>(&self, node: &N) -> Result<SvgContainer> {
        self.options.validate()?;
        let config = self.options.fetch_config();
        let fetcher = ResourceFetcher::new(self.host.transport(), &config);
        let inliner = CssInliner::new(&fetcher);

        self.enter(Stage::Cloning);
        let mut clone = SnapshotCloner::new(self.host, self.options.filter.as_ref())
            .clone_tree(node)
            .await?;

        self.enter(Stage::FontResolving);
        let fonts = FontResolver::new(self.host, &inliner).resolve_all().await?;
        if let CloneNode::Element(root) = &mut clone {
            root.append_child(CloneNode::Element(CloneElement::style_element(fonts)));
        }

        self.enter(Stage::ImageInlining);
        ImageEmbedder::new(self.host, &fetcher, &inliner)
            .inline_all(&mut clone)
            .await?;

        if let CloneNode::Element(root) = &mut clone {
            apply_options(root, self.options);
        }
        self.enter(Stage::OptionsApplied);

        let (width, height) = container_size(node, self.options);
        let data_uri = make_svg_data_uri(&mut clone, width, height);
        self.enter(Stage::Serialized);
        Ok(SvgContainer {
            data_uri,
            width,
            height,
        })
    }

    async fn build_surface<N: SourceNode>(&self, node: &N) -> Result<RgbaImage> {
        let svg = self.build_svg(node).await?;
        let background = self.options.background_rgba()?;

        self.enter(Stage::RasterizeRequested);
        let rasterizer = self
            .host
            .rasterizer()
            .ok_or_else(|| Error::Unsupported("host provides no SVG rasterizer".into()))?;
        let request = RasterRequest {
            svg_data_uri: svg.data_uri,
            width: svg.width,
            height: svg.height,
            scale: self.options.scale,
        };
        let size = request.target_size()?;
        let image = rasterizer.rasterize(&request).await.map_err(|e| match e {
            Error::DecodeError(_) => e,
            other => Error::DecodeError(other.to_string()),
        })?;

        tokio::time::sleep(SETTLE_DELAY).await;
        let surface = draw(&image, size, background);
        self.enter(Stage::Rasterized);
        Ok(surface)
    }
}

/// Scroll box of `node` plus its resolved border widths
pub fn natural_size<N: SourceNode>(node: &N) -> (f64, f64) {
    let style = node.computed_style(None);
    let (scroll_width, scroll_height) = node.scroll_size();
    (
        scroll_width + style.px("border-left-width") + style.px("border-right-width"),
        scroll_height + style.px("border-top-width") + style.px("border-bottom-width"),
    )
}

/// Container size: the larger of the explicit and the natural size
pub fn container_size<N: SourceNode>(node: &N, options: &RenderOptions) -> (f64, f64) {
    let (width, height) = natural_size(node);
    (
        options.width.map_or(width, |w| w.max(width)),
        options.height.map_or(height, |h| h.max(height)),
    )
}

fn apply_options(root: &mut CloneElement, options: &RenderOptions) {
    if let Some(color) = &options.background_color {
        root.style.set_property("background-color", color, false);
    }
    if let Some(width) = options.width {
        root.style.set_property("width", &format!("{}px", width), false);
    }
    if let Some(height) = options.height {
        root.style.set_property("height", &format!("{}px", height), false);
    }
    // last, so it overrides everything above
    for (property, value) in &options.style {
        root.style.set_property(property, value, false);
    }
}

fn make_svg_data_uri(clone: &mut CloneNode, width: f64, height: f64) -> String {
    if let CloneNode::Element(root) = clone {
        if root.kind != ElementKind::VectorGraphics {
            root.set_attribute("xmlns", XHTML_NS);
        }
    }
    let xhtml = escape_xhtml(&clone.serialize());
    let foreign_object = format!(
        "<foreignObject x=\"0\" y=\"0\" width=\"100%\" height=\"100%\">{}</foreignObject>",
        xhtml
    );
    let svg = format!(
        "<svg xmlns=\"{}\" width=\"{}\" height=\"{}\">{}</svg>",
        SVG_NS, width, height, foreign_object
    );
    format!("data:image/svg+xml;charset=utf-8,{}", svg)
}

/// Draw `image` onto a fresh surface of `size`, pre-filled with `background`
fn draw(image: &RgbaImage, size: (u32, u32), background: Option<Rgba<u8>>) -> RgbaImage {
    let (width, height) = size;
    let mut surface = RgbaImage::from_pixel(width, height, background.unwrap_or(Rgba([0, 0, 0, 0])));
    if width == 0 || height == 0 || image.width() == 0 || image.height() == 0 {
        return surface;
    }
    if image.dimensions() == size {
        imageops::overlay(&mut surface, image, 0, 0);
    } else {
        let scaled = imageops::resize(image, width, height, FilterType::Triangle);
        imageops::overlay(&mut surface, &scaled, 0, 0);
    }
    surface
}

pub fn encode_png(surface: &RgbaImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    surface.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}

/// Encode as JPEG; transparent pixels come out black
pub fn encode_jpeg(surface: &RgbaImage, quality: f64) -> Result<Vec<u8>> {
    let rgb = DynamicImage::ImageRgba8(surface.clone()).to_rgb8();
    let quality = (quality.clamp(0.0, 1.0) * 100.0).round().max(1.0) as u8;
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality).encode_image(&rgb)?;
    Ok(buf)
}
