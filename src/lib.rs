//! rfsnap
//!
//! Snapshot a document node into a self-contained image. The node is deep
//! cloned with its resolved styles, every external font and image is inlined
//! as a data URI, and the result is wrapped into an SVG `foreignObject` that
//! can be rasterized into pixels, PNG or JPEG.
//!
//! # Features
//!
//! - **html** (default): static HTML host built on `scraper`
//! - **cdp**: headless Chrome rasterizer for raster outputs
//!
//! # Example
//!
//! ```no_run
//! use rfsnap::host::html::HtmlDocument;
//! use rfsnap::RenderOptions;
//!
//! # async fn run() -> rfsnap::Result<()> {
//! let doc = HtmlDocument::load("https://example.com").await?;
//! let node = doc.select("body")?;
//! let options = RenderOptions {
//!     background_color: Some("white".into()),
//!     ..Default::default()
//! };
//! let svg = rfsnap::to_svg(&doc, &node, &options).await?;
//! println!("{}", svg.len());
//! # Ok(())
//! # }
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub mod error;
pub use error::{Error, Result};

pub mod clone;
pub mod compositor;
pub mod css;
pub mod dom;
pub mod fetch;
pub mod fonts;
pub mod host;
pub mod images;
pub mod inliner;
pub mod style;
pub mod util;

pub use clone::NodeFilter;
pub use compositor::{Pipeline, Stage, SvgContainer};
pub use fetch::{FetchConfig, ReqwestTransport, Transport};
pub use host::{Host, SourceNode, SvgRasterizer};
pub use image::RgbaImage;

/// Options for one conversion
///
/// Everything except `filter` can be read from JSON with camelCase keys:
///
/// ```
/// let options: rfsnap::RenderOptions =
///     serde_json::from_str(r#"{"backgroundColor": "white", "scale": 2}"#).unwrap();
/// assert_eq!(options.scale, 2.0);
/// assert!(options.validate().is_ok());
/// ```
#[derive(Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RenderOptions {
    /// Descendants for which this returns false are left out with their subtree
    #[serde(skip)]
    pub filter: Option<NodeFilter>,
    /// Background color of the root and the raster surface
    pub background_color: Option<String>,
    /// Explicit width in CSS pixels
    pub width: Option<f64>,
    /// Explicit height in CSS pixels
    pub height: Option<f64>,
    /// Properties patched onto the root's style after everything else
    pub style: BTreeMap<String, String>,
    /// JPEG quality between 0 and 1
    pub quality: Option<f64>,
    /// Raster scale factor
    pub scale: f64,
    /// Data URI substituted for resources that fail to fetch
    pub image_placeholder: Option<String>,
    /// Defeat caches by appending a timestamp to fetched URLs
    pub cache_bust: bool,
    /// Send credentials with fetches
    pub use_credentials: bool,
    /// Timeout for a single fetch in milliseconds
    pub fetch_timeout_ms: u64,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            filter: None,
            background_color: None,
            width: None,
            height: None,
            style: BTreeMap::new(),
            quality: None,
            scale: 1.0,
            image_placeholder: None,
            cache_bust: false,
            use_credentials: false,
            fetch_timeout_ms: fetch::DEFAULT_TIMEOUT_MS,
        }
    }
}

impl fmt::Debug for RenderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderOptions")
            .field("filter", &self.filter.as_ref().map(|_| "<fn>"))
            .field("background_color", &self.background_color)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("style", &self.style)
            .field("quality", &self.quality)
            .field("scale", &self.scale)
            .field("image_placeholder", &self.image_placeholder)
            .field("cache_bust", &self.cache_bust)
            .field("use_credentials", &self.use_credentials)
            .field("fetch_timeout_ms", &self.fetch_timeout_ms)
            .finish()
    }
}

impl RenderOptions {
    /// Set the node filter
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&dyn SourceNode) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Reject option values no conversion could honor
    pub fn validate(&self) -> Result<()> {
        if !self.scale.is_finite() || self.scale < 0.0 {
            return Err(Error::ConfigError(format!("scale must be a non-negative number, got {}", self.scale)));
        }
        if let Some(q) = self.quality {
            if !(0.0..=1.0).contains(&q) {
                return Err(Error::ConfigError(format!("quality must be between 0 and 1, got {}", q)));
            }
        }
        for (name, value) in [("width", self.width), ("height", self.height)] {
            if let Some(v) = value {
                if !v.is_finite() || v < 0.0 {
                    return Err(Error::ConfigError(format!("{} must be a non-negative number, got {}", name, v)));
                }
            }
        }
        self.background_rgba()?;
        if let Some(placeholder) = &self.image_placeholder {
            if !util::is_data_url(placeholder) || !placeholder.contains(',') {
                return Err(Error::ConfigError("image placeholder must be a data URI".into()));
            }
        }
        Ok(())
    }

    /// Fetch policy for one conversion
    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            cache_bust: self.cache_bust,
            use_credentials: self.use_credentials,
            placeholder: self.image_placeholder.clone(),
            timeout: Duration::from_millis(self.fetch_timeout_ms),
        }
    }

    /// Parsed background color, if one is set
    pub fn background_rgba(&self) -> Result<Option<image::Rgba<u8>>> {
        match &self.background_color {
            None => Ok(None),
            Some(color) => csscolorparser::parse(color)
                .map(|c| Some(image::Rgba(c.to_rgba8())))
                .map_err(|e| Error::ConfigError(format!("invalid background color {:?}: {}", color, e))),
        }
    }
}

/// Render `node` into an SVG data URI
pub async fn to_svg<N: SourceNode>(host: &dyn Host, node: &N, options: &RenderOptions) -> Result<String> {
    let svg = Pipeline::new(host, options).to_svg(node).await?;
    Ok(svg.data_uri)
}

/// Render `node` onto an RGBA surface through the host's rasterizer
pub async fn to_surface<N: SourceNode>(host: &dyn Host, node: &N, options: &RenderOptions) -> Result<RgbaImage> {
    Pipeline::new(host, options).to_surface(node).await
}

/// Raw RGBA bytes, row-major, four bytes per pixel
pub async fn to_pixel_data<N: SourceNode>(host: &dyn Host, node: &N, options: &RenderOptions) -> Result<Vec<u8>> {
    Ok(to_surface(host, node, options).await?.into_raw())
}

pub async fn to_png<N: SourceNode>(host: &dyn Host, node: &N, options: &RenderOptions) -> Result<Vec<u8>> {
    let surface = to_surface(host, node, options).await?;
    compositor::encode_png(&surface)
}

/// JPEG bytes; quality defaults to 0.92
pub async fn to_jpeg<N: SourceNode>(host: &dyn Host, node: &N, options: &RenderOptions) -> Result<Vec<u8>> {
    let surface = to_surface(host, node, options).await?;
    compositor::encode_jpeg(&surface, options.quality.unwrap_or(compositor::DEFAULT_JPEG_QUALITY))
}
