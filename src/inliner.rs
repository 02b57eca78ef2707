//! Rewrites `url(...)` references inside style text into embedded data URIs.

use crate::fetch::ResourceFetcher;
use crate::util::{data_as_url, is_data_url, mime_type, resolve_url};
use crate::Result;
use log::debug;
use regex::Regex;
use std::ops::Range;
use std::sync::OnceLock;

static URL_PATTERN: OnceLock<Regex> = OnceLock::new();

fn url_pattern() -> &'static Regex {
    URL_PATTERN.get_or_init(|| Regex::new(r#"url\(['"]?([^'"]+?)['"]?\)"#).expect("valid url() pattern"))
}

/// An external reference found in style text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceReference {
    /// Reference text as written (whitespace trimmed)
    pub url: String,
    /// Byte range of `url` inside the scanned text
    pub span: Range<usize>,
}

/// Whether `text` contains any `url(...)` at all
pub fn should_process(text: &str) -> bool {
    url_pattern().is_match(text)
}

/// Every non-data `url(...)` reference of `text`, in document order
pub fn read_urls(text: &str) -> Vec<ResourceReference> {
    url_pattern()
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| {
            let raw = m.as_str();
            let url = raw.trim();
            if url.is_empty() || is_data_url(url) {
                return None;
            }
            let start = m.start() + (raw.len() - raw.trim_start().len());
            Some(ResourceReference {
                url: url.to_string(),
                span: start..start + url.len(),
            })
        })
        .collect()
}

/// Replace each reference span by the data URI resolved for its URL.
fn apply_edits(text: &str, refs: &[ResourceReference], resolved: &[(String, String)]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for reference in refs {
        let Some((_, data_uri)) = resolved.iter().find(|(url, _)| *url == reference.url) else {
            continue;
        };
        out.push_str(&text[cursor..reference.span.start]);
        out.push_str(data_uri);
        cursor = reference.span.end;
    }
    out.push_str(&text[cursor..]);
    out
}

/// Inlines every external reference of a style text block
pub struct CssInliner<'f> {
    fetcher: &'f ResourceFetcher<'f>,
}

impl<'f> CssInliner<'f> {
    pub fn new(fetcher: &'f ResourceFetcher<'f>) -> Self {
        Self { fetcher }
    }

    /// Rewrite all references of `text`, resolving relative ones against
    /// `base_url`. Distinct references are fetched once each, one after the
    /// other, in discovery order; the first failure aborts the rewrite.
    pub async fn inline_all(&self, text: &str, base_url: Option<&str>) -> Result<String> {
        if !should_process(text) {
            return Ok(text.to_string());
        }

        let refs = read_urls(text);
        let mut resolved: Vec<(String, String)> = Vec::new();
        for reference in &refs {
            if resolved.iter().any(|(url, _)| *url == reference.url) {
                continue;
            }
            let data_uri = self.inline_url(&reference.url, base_url).await?;
            resolved.push((reference.url.clone(), data_uri));
        }

        Ok(apply_edits(text, &refs, &resolved))
    }

    async fn inline_url(&self, url: &str, base_url: Option<&str>) -> Result<String> {
        let absolute = resolve_url(url, base_url);
        debug!("inlining {}", absolute);
        let payload = self.fetcher.fetch(&absolute).await?;
        Ok(data_as_url(&payload, mime_type(&absolute)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchConfig;
    use crate::host::memory::MemoryTransport;
    use crate::Error;

    #[test]
    fn scanner_skips_data_uris() {
        let text = "a{background:url('x.png')} b{src:url(data:font/woff;base64,AA) url( y.woff )}";
        let refs = read_urls(text);
        let urls: Vec<_> = refs.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["x.png", "y.woff"]);
        assert_eq!(&text[refs[1].span.clone()], "y.woff");
        assert!(!should_process("a{color:red}"));
    }

    #[tokio::test]
    async fn identity_without_external_references() {
        let transport = MemoryTransport::new();
        let config = FetchConfig::default();
        let fetcher = ResourceFetcher::new(&transport, &config);
        let inliner = CssInliner::new(&fetcher);

        let plain = "p { color: red }";
        assert_eq!(inliner.inline_all(plain, None).await.unwrap(), plain);
        let embedded = "p { background: url(data:image/png;base64,AAAA) }";
        assert_eq!(inliner.inline_all(embedded, None).await.unwrap(), embedded);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn rewrites_every_occurrence_once() {
        let transport = MemoryTransport::new()
            .with_body("http://cdn/img/a.png", b"A".to_vec())
            .with_body("http://cdn/img/a.png2", b"B".to_vec());
        let config = FetchConfig::default();
        let fetcher = ResourceFetcher::new(&transport, &config);
        let inliner = CssInliner::new(&fetcher);

        let text = "x{background:url(a.png)} y{background:url(\"a.png2\")} z{background:url(a.png)}";
        let out = inliner
            .inline_all(text, Some("http://cdn/img/style.css"))
            .await
            .unwrap();
        assert_eq!(
            out,
            "x{background:url(data:image/png;base64,QQ==)} y{background:url(\"data:;base64,Qg==\")} z{background:url(data:image/png;base64,QQ==)}"
        );
        assert_eq!(transport.requests().len(), 2);
        assert!(read_urls(&out).is_empty());
    }

    #[tokio::test]
    async fn failed_reference_aborts() {
        let transport = MemoryTransport::new().with_status("font.woff", 500);
        let config = FetchConfig::default();
        let fetcher = ResourceFetcher::new(&transport, &config);
        let inliner = CssInliner::new(&fetcher);
        let err = inliner.inline_all("src: url(font.woff)", None).await.unwrap_err();
        assert!(matches!(err, Error::FetchError { ref url, .. } if url == "font.woff"));
    }
}
