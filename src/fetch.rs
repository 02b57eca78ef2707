//! Resource fetching: URL in, base64 payload out.
//!
//! The fetch policy (cache busting, credentials, placeholder, timeout) is an
//! explicit [`FetchConfig`] built once per conversion and passed down by
//! reference, so concurrent conversions never observe each other's settings.

use crate::util::{data_url_payload, encode_payload};
use crate::{Error, Result};
use futures::future::{FutureExt, LocalBoxFuture};
use log::{debug, warn};
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Default fetch timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Per-conversion fetch policy
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Append the current time as a query parameter to every request
    pub cache_bust: bool,
    /// Attach credentials to outgoing requests
    pub use_credentials: bool,
    /// Data URI whose payload substitutes any resource that cannot be fetched
    pub placeholder: Option<String>,
    /// Upper bound for a single fetch
    pub timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            cache_bust: false,
            use_credentials: false,
            placeholder: None,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

/// A binary GET handed to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub with_credentials: bool,
}

/// Raw transport response
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Binary fetch primitive provided by the host
pub trait Transport {
    fn get<'a>(&'a self, request: &'a FetchRequest) -> LocalBoxFuture<'a, Result<FetchResponse>>;
}

/// HTTP(S) transport backed by `reqwest`; `file:` URLs are read from disk.
pub struct ReqwestTransport {
    client: reqwest::Client,
    credential_headers: HashMap<String, String>,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("rfsnap/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::NetworkError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            credential_headers: HashMap::new(),
        }
    }

    /// Headers (cookies, authorization) sent only on credentialed requests
    pub fn with_credential_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.credential_headers = headers;
        self
    }

    async fn read_file(url: &url::Url) -> Result<FetchResponse> {
        let path = url
            .to_file_path()
            .map_err(|_| Error::NetworkError(format!("Invalid file URL: {}", url)))?;
        match tokio::fs::read(&path).await {
            Ok(body) => Ok(FetchResponse::ok(body)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FetchResponse {
                status: 404,
                body: Vec::new(),
            }),
            Err(e) => Err(Error::IoError(e)),
        }
    }
}

impl Transport for ReqwestTransport {
    fn get<'a>(&'a self, request: &'a FetchRequest) -> LocalBoxFuture<'a, Result<FetchResponse>> {
        async move {
            let url = url::Url::parse(&request.url)
                .map_err(|e| Error::NetworkError(format!("Invalid URL {}: {}", request.url, e)))?;
            if url.scheme() == "file" {
                return Self::read_file(&url).await;
            }

            let mut builder = self.client.get(url);
            if request.with_credentials {
                for (name, value) in &self.credential_headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
            }
            let resp = builder
                .send()
                .await
                .map_err(|e| Error::NetworkError(format!("GET {} failed: {}", request.url, e)))?;
            let status = resp.status().as_u16();
            let body = resp
                .bytes()
                .await
                .map_err(|e| Error::NetworkError(format!("Failed to read response body: {}", e)))?;
            Ok(FetchResponse {
                status,
                body: body.to_vec(),
            })
        }
        .boxed_local()
    }
}

/// Fetches resources and encodes them as base64 payloads
pub struct ResourceFetcher<'a> {
    transport: &'a dyn Transport,
    config: &'a FetchConfig,
}

impl<'a> ResourceFetcher<'a> {
    pub fn new(transport: &'a dyn Transport, config: &'a FetchConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &FetchConfig {
        self.config
    }

    /// Fetch `url` and return its body as base64 (no `data:` prefix).
    ///
    /// Non-success statuses, transport errors and timeouts resolve to the
    /// placeholder payload when one is configured and fail otherwise.
    pub async fn fetch(&self, url: &str) -> Result<String> {
        let request = FetchRequest {
            url: if self.config.cache_bust {
                cache_busted(url)
            } else {
                url.to_string()
            },
            with_credentials: self.config.use_credentials,
        };
        debug!("fetching {}", request.url);

        let reason = match tokio::time::timeout(self.config.timeout, self.transport.get(&request)).await {
            Ok(Ok(resp)) if resp.is_success() => return Ok(encode_payload(&resp.body)),
            Ok(Ok(resp)) => format!("status {}", resp.status),
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {}ms", self.config.timeout.as_millis()),
        };

        match self.config.placeholder.as_deref() {
            Some(placeholder) => {
                warn!("cannot fetch resource {} ({}), using placeholder", url, reason);
                Ok(data_url_payload(placeholder).unwrap_or(placeholder).to_string())
            }
            None => Err(Error::fetch(url, reason)),
        }
    }
}

fn cache_busted(url: &str) -> String {
    let sep = if url.contains('?') { '&' } else { '?' };
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("{}{}{}", url, sep, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::memory::MemoryTransport;

    #[tokio::test]
    async fn encodes_successful_body() {
        let transport = MemoryTransport::new().with_body("http://x/a.png", b"ABC".to_vec());
        let config = FetchConfig::default();
        let fetcher = ResourceFetcher::new(&transport, &config);
        assert_eq!(fetcher.fetch("http://x/a.png").await.unwrap(), "QUJD");
    }

    #[tokio::test]
    async fn failure_without_placeholder_names_url() {
        let transport = MemoryTransport::new().with_status("http://x/a.png", 404);
        let config = FetchConfig::default();
        let fetcher = ResourceFetcher::new(&transport, &config);
        match fetcher.fetch("http://x/a.png").await {
            Err(Error::FetchError { url, reason }) => {
                assert_eq!(url, "http://x/a.png");
                assert!(reason.contains("404"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn unknown_url_is_a_failure_too() {
        let transport = MemoryTransport::new();
        let config = FetchConfig {
            placeholder: Some("data:image/png;base64,UExBQ0U=".into()),
            ..Default::default()
        };
        let fetcher = ResourceFetcher::new(&transport, &config);
        assert_eq!(fetcher.fetch("a.png").await.unwrap(), "UExBQ0U=");
    }

    #[tokio::test]
    async fn timeout_behaves_like_failed_status() {
        let transport = MemoryTransport::new().with_stalled("http://x/slow.png");
        let config = FetchConfig {
            timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let fetcher = ResourceFetcher::new(&transport, &config);
        match fetcher.fetch("http://x/slow.png").await {
            Err(Error::FetchError { reason, .. }) => assert!(reason.contains("timed out")),
            other => panic!("unexpected {:?}", other),
        }

        let config = FetchConfig {
            placeholder: Some("data:image/png;base64,UA==".into()),
            ..config
        };
        let fetcher = ResourceFetcher::new(&transport, &config);
        assert_eq!(fetcher.fetch("http://x/slow.png").await.unwrap(), "UA==");
    }

    #[tokio::test]
    async fn cache_bust_and_credentials_reach_transport() {
        let transport = MemoryTransport::new().with_prefix_body("http://x/a.png", b"A".to_vec());
        let config = FetchConfig {
            cache_bust: true,
            use_credentials: true,
            ..Default::default()
        };
        let fetcher = ResourceFetcher::new(&transport, &config);
        fetcher.fetch("http://x/a.png").await.unwrap();
        fetcher.fetch("http://x/a.png?v=1").await.unwrap();

        let log = transport.requests();
        assert!(log[0].url.starts_with("http://x/a.png?"));
        assert!(log[1].url.starts_with("http://x/a.png?v=1&"));
        assert!(log.iter().all(|r| r.with_credentials));
    }
}
