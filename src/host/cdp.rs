//! Chrome DevTools Protocol rasterizer (uses the `headless_chrome` crate)

use super::{RasterRequest, SvgRasterizer};
use crate::{Error, Result};
use futures::future::{FutureExt, LocalBoxFuture};
use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::Page;
use headless_chrome::{Browser, LaunchOptions};
use image::{ImageFormat, RgbaImage};
use log::debug;
use std::sync::Arc;

/// Rasterizes SVG containers by loading them into a headless Chrome tab
///
/// The browser is launched once and the tab reused for every request, so
/// requests on the same rasterizer are served one after the other.
pub struct CdpRasterizer {
    _browser: Browser,
    tab: Arc<Tab>,
}

impl CdpRasterizer {
    /// Launch headless Chrome with a 1920x1080 window
    pub fn launch() -> Result<Self> {
        Self::launch_with_window(1920, 1080)
    }

    /// Launch with a window large enough for the biggest container to render
    pub fn launch_with_window(width: u32, height: u32) -> Result<Self> {
        let launch_options = LaunchOptions::default_builder()
            .headless(true)
            .window_size(Some((width, height)))
            .build()
            .map_err(|e| Error::RenderError(format!("Failed to build launch options: {}", e)))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| Error::RenderError(format!("Failed to launch browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| Error::RenderError(format!("Failed to create tab: {}", e)))?;

        Ok(Self { _browser: browser, tab })
    }
}

fn capture(tab: &Tab, request: &RasterRequest) -> Result<Vec<u8>> {
    tab.navigate_to(&request.svg_data_uri)
        .map_err(|e| Error::DecodeError(format!("Navigation to SVG container failed: {}", e)))?;
    tab.wait_until_navigated()
        .map_err(|e| Error::DecodeError(format!("SVG container did not load: {}", e)))?;

    let clip = Page::Viewport {
        x: 0.0,
        y: 0.0,
        width: request.width,
        height: request.height,
        scale: request.scale,
    };
    tab.capture_screenshot(Page::CaptureScreenshotFormatOption::Png, None, Some(clip), true)
        .map_err(|e| Error::RenderError(format!("Screenshot failed: {}", e)))
}

impl SvgRasterizer for CdpRasterizer {
    fn rasterize<'a>(&'a self, request: &'a RasterRequest) -> LocalBoxFuture<'a, Result<RgbaImage>> {
        async move {
            let (width, height) = request.target_size()?;
            if width == 0 || height == 0 {
                return Ok(RgbaImage::new(width, height));
            }

            let tab = Arc::clone(&self.tab);
            let owned = request.clone();
            let png = tokio::task::spawn_blocking(move || capture(&tab, &owned))
                .await
                .map_err(|e| Error::RenderError(format!("Rasterizer task failed: {}", e)))??;
            debug!("captured {} byte screenshot for {}x{} container", png.len(), width, height);

            let image = image::load_from_memory_with_format(&png, ImageFormat::Png)?;
            Ok(image.to_rgba8())
        }
        .boxed_local()
    }
}
