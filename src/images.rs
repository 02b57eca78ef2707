//! Embeds images referenced by the clone tree: background styles, `<img src>`
//! and SVG `<image href>`.

use crate::dom::{CloneElement, CloneNode, ElementKind};
use crate::fetch::ResourceFetcher;
use crate::host::Host;
use crate::inliner::{should_process, CssInliner};
use crate::util::{data_as_url, is_data_url, mime_type};
use crate::Result;
use futures::future::{try_join_all, FutureExt, LocalBoxFuture};
use log::debug;

const BACKGROUND_PROPERTIES: [&str; 2] = ["background", "background-image"];

pub struct ImageEmbedder<'a> {
    host: &'a dyn Host,
    fetcher: &'a ResourceFetcher<'a>,
    inliner: &'a CssInliner<'a>,
}

impl<'a> ImageEmbedder<'a> {
    pub fn new(host: &'a dyn Host, fetcher: &'a ResourceFetcher<'a>, inliner: &'a CssInliner<'a>) -> Self {
        Self {
            host,
            fetcher,
            inliner,
        }
    }

    /// Inline every image below `node`, in place. Work on one element is
    /// sequential; siblings are processed concurrently on the current task.
    pub fn inline_all<'s>(&'s self, node: &'s mut CloneNode) -> LocalBoxFuture<'s, Result<()>> {
        async move {
            let CloneNode::Element(el) = node else {
                return Ok(());
            };
            self.inline_background(el).await?;
            self.inline_source(el).await?;
            try_join_all(el.children.iter_mut().map(|child| self.inline_all(child))).await?;
            Ok(())
        }
        .boxed_local()
    }

    async fn inline_background(&self, el: &mut CloneElement) -> Result<()> {
        for prop in BACKGROUND_PROPERTIES {
            let Some(value) = el.style.get(prop).map(str::to_string) else {
                continue;
            };
            if !should_process(&value) {
                continue;
            }
            let important = el.style.is_important(prop);
            let inlined = self.inliner.inline_all(&value, None).await?;
            el.style.set_property(prop, &inlined, important);
        }
        Ok(())
    }

    async fn inline_source(&self, el: &mut CloneElement) -> Result<()> {
        let Some(attr) = source_attribute(el) else {
            return Ok(());
        };
        let Some(src) = el.attr(attr).map(str::to_string) else {
            return Ok(());
        };
        if src.trim().is_empty() || is_data_url(&src) {
            return Ok(());
        }

        let payload = self.fetcher.fetch(&src).await?;
        let data_url = data_as_url(&payload, mime_type(&src));
        el.set_attribute(attr, &data_url);
        // a srcset candidate would still point at the network
        el.remove_attribute("srcset");

        if let Err(e) = self.host.decode_image(&data_url).await {
            debug!("inlined image {} did not decode: {}", src, e);
        }
        Ok(())
    }
}

fn source_attribute(el: &CloneElement) -> Option<&'static str> {
    let tag = el.tag.to_ascii_lowercase();
    match el.kind {
        ElementKind::VectorGraphics if tag == "image" => {
            if el.attr("href").is_some() {
                Some("href")
            } else if el.attr("xlink:href").is_some() {
                Some("xlink:href")
            } else {
                None
            }
        }
        ElementKind::VectorGraphics => None,
        _ if tag == "img" => Some("src"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchConfig;
    use crate::host::memory::{MemoryHost, MemoryTransport};
    use crate::Error;
    use std::time::Duration;

    fn img(src: &str) -> CloneNode {
        let mut el = CloneElement::new("img", ElementKind::Generic);
        el.set_attribute("src", src);
        CloneNode::Element(el)
    }

    async fn embed(host: &MemoryHost, node: &mut CloneNode, config: &FetchConfig) -> Result<()> {
        let fetcher = ResourceFetcher::new(host.transport(), config);
        let inliner = CssInliner::new(&fetcher);
        ImageEmbedder::new(host, &fetcher, &inliner).inline_all(node).await
    }

    #[tokio::test]
    async fn inlines_backgrounds_keeping_priority() {
        let host = MemoryHost::new().with_transport(MemoryTransport::new().with_body("bg.gif", b"G".to_vec()));
        let mut el = CloneElement::new("div", ElementKind::Generic);
        el.style.set_property("background", "url(bg.gif) no-repeat", true);
        el.style.set_property("color", "red", false);
        let mut node = CloneNode::Element(el);
        embed(&host, &mut node, &FetchConfig::default()).await.unwrap();

        let el = node.as_element().unwrap();
        assert_eq!(
            el.style.get("background"),
            Some("url(data:image/gif;base64,Rw==) no-repeat")
        );
        assert!(el.style.is_important("background"));
    }

    #[tokio::test]
    async fn inlines_nested_images_and_skips_data_uris() {
        let host = MemoryHost::new().with_transport(
            MemoryTransport::new()
                .with_delayed_body("slow.png", b"S".to_vec(), Duration::from_millis(30))
                .with_body("fast.jpg", b"F".to_vec()),
        );
        let mut root = CloneElement::new("div", ElementKind::Generic);
        let mut first = img("slow.png");
        first.as_element_mut().unwrap().set_attribute("srcset", "slow@2x.png 2x");
        root.append_child(first);
        root.append_child(img("fast.jpg"));
        root.append_child(img("data:image/png;base64,AA=="));
        root.append_child(img(""));
        let mut node = CloneNode::Element(root);
        embed(&host, &mut node, &FetchConfig::default()).await.unwrap();

        let srcs: Vec<_> = node
            .as_element()
            .unwrap()
            .find_all("img")
            .iter()
            .map(|i| i.attr("src").unwrap_or_default().to_string())
            .collect();
        assert_eq!(
            srcs,
            vec![
                "data:image/png;base64,Uw==",
                "data:image/jpeg;base64,Rg==",
                "data:image/png;base64,AA==",
                "",
            ]
        );
        assert_eq!(node.as_element().unwrap().find_all("img")[0].attr("srcset"), None);
        assert_eq!(host.memory_transport().requests().len(), 2);
    }

    #[tokio::test]
    async fn svg_image_href() {
        let host = MemoryHost::new().with_transport(MemoryTransport::new().with_body("pic.svg", b"<svg/>".to_vec()));
        let mut el = CloneElement::new("image", ElementKind::VectorGraphics);
        el.set_attribute("xlink:href", "pic.svg");
        let mut node = CloneNode::Element(el);
        embed(&host, &mut node, &FetchConfig::default()).await.unwrap();
        assert!(node
            .as_element()
            .unwrap()
            .attr("xlink:href")
            .unwrap()
            .starts_with("data:image/svg+xml;base64,"));
    }

    #[tokio::test]
    async fn decode_failure_is_tolerated_fetch_failure_is_not() {
        let host = MemoryHost::new()
            .with_transport(MemoryTransport::new().with_body("broken.png", b"BROKEN".to_vec()))
            .with_undecodable("QlJPS0VO");
        let mut node = img("broken.png");
        embed(&host, &mut node, &FetchConfig::default()).await.unwrap();

        let mut node = img("missing.png");
        let err = embed(&host, &mut node, &FetchConfig::default()).await.unwrap_err();
        assert!(matches!(err, Error::FetchError { ref url, .. } if url == "missing.png"));
    }

    #[tokio::test]
    async fn real_payloads_decode_and_junk_is_tolerated() {
        let mut png = Vec::new();
        image::RgbaImage::from_pixel(3, 2, image::Rgba([9, 9, 9, 255]))
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let host = MemoryHost::new()
            .with_transport(
                MemoryTransport::new()
                    .with_body("dot.png", png)
                    .with_body("junk.png", b"not a png".to_vec()),
            )
            .with_strict_decoding();
        let mut root = CloneElement::new("div", ElementKind::Generic);
        root.append_child(img("dot.png"));
        root.append_child(img("junk.png"));
        let mut node = CloneNode::Element(root);
        embed(&host, &mut node, &FetchConfig::default()).await.unwrap();

        let imgs = node.as_element().unwrap().find_all("img");
        let dot = imgs[0].attr("src").unwrap();
        let junk = imgs[1].attr("src").unwrap();
        assert!(junk.starts_with("data:image/png;base64,"));

        let info = host.decode_image(dot).await.unwrap();
        assert_eq!((info.width, info.height), (3, 2));
        assert!(matches!(host.decode_image(junk).await, Err(Error::DecodeError(_))));
    }
}
