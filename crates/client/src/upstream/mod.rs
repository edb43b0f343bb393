//! Upstream transport for the search engine behind the proxy.
//!
//! ### Forwarding
//! - Target = upstream base path joined with the inbound path, base query first
//! - Hop-by-hop headers are dropped in both directions
//! - `X-Forwarded-For` is extended with the peer address when known
//! - Redirects are relayed, never followed
//! - No transparent decompression: captured bodies are decoded explicitly
//!
//! ### Failure mapping
//! - connect failures: `UPSTREAM_UNREACHABLE`
//! - timeouts and broken exchanges: `UPSTREAM_ERROR`

pub mod capture;
pub mod headers;
pub mod url;

use std::net::IpAddr;
use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Body, Client, Method, Response};

pub use capture::{CapturedResponse, decode_body};
pub use headers::{append_forwarded_for, end_to_end};
pub use self::url::{UrlError, join_target, parse_base, single_joining_slash};

use meiliproxy_core::{AppConfig, Error};

/// Encodings advertised on the capture path; both are decoded locally.
const CAPTURE_ACCEPT_ENCODING: &str = "deflate,gzip";

/// Configuration for the upstream client.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Upstream base URL.
    pub base_url: ::url::Url,
    /// Transport timeout for forwarded requests.
    pub timeout: Duration,
    /// Timeout for the liveness probe.
    pub probe_timeout: Duration,
}

impl UpstreamConfig {
    /// Derive the upstream settings from application configuration.
    pub fn from_app(config: &AppConfig) -> Result<Self, Error> {
        let base_url = parse_base(&config.upstream_url).map_err(|e| Error::InvalidInput(e.to_string()))?;
        Ok(Self { base_url, timeout: config.timeout(), probe_timeout: config.probe_timeout() })
    }
}

/// A request on its way upstream.
#[derive(Debug)]
pub struct UpstreamRequest {
    pub method: Method,
    /// Inbound path, already percent-encoded.
    pub path: String,
    /// Inbound query string without the leading `?`.
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Body,
    /// Peer address of the original caller.
    pub client_ip: Option<IpAddr>,
}

/// HTTP client bound to a single upstream.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: Client,
    config: UpstreamConfig,
}

impl UpstreamClient {
    /// Create a new upstream client with the given configuration.
    pub fn new(config: UpstreamConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .use_rustls_tls()
            .no_gzip()
            .no_deflate()
            .no_brotli()
            .build()
            .map_err(|e| Error::Upstream(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Forward a request and return the live, still-streaming response.
    pub async fn send(&self, request: UpstreamRequest) -> Result<Response, Error> {
        let target = join_target(&self.config.base_url, &request.path, request.query.as_deref());

        let mut headers = end_to_end(&request.headers);
        if let Some(ip) = request.client_ip {
            append_forwarded_for(&mut headers, ip);
        }

        tracing::debug!(method = %request.method, target = %target, "proxying request");

        self.http
            .request(request.method, target)
            .headers(headers)
            .body(request.body)
            .send()
            .await
            .map_err(classify)
    }

    /// Forward a request and buffer the decoded response in memory.
    ///
    /// The outbound `Accept-Encoding` is pinned to encodings this proxy can
    /// decode, so a successful capture always holds plain bytes.
    pub async fn capture(&self, mut request: UpstreamRequest) -> Result<CapturedResponse, Error> {
        request
            .headers
            .insert(header::ACCEPT_ENCODING, HeaderValue::from_static(CAPTURE_ACCEPT_ENCODING));

        let response = self.send(request).await?;
        let status = response.status();
        let headers = end_to_end(response.headers());
        let raw = response
            .bytes()
            .await
            .map_err(|e| Error::Upstream(format!("failed to read upstream body: {e}")))?;

        capture::normalize(status, headers, raw)
    }

    /// Check that the upstream answers at all. Any HTTP status counts as alive.
    pub async fn probe(&self) -> Result<(), Error> {
        self.http
            .get(self.config.base_url.clone())
            .timeout(self.config.probe_timeout)
            .send()
            .await
            .map(|response| {
                tracing::debug!(status = %response.status(), "upstream liveness probe answered");
            })
            .map_err(|e| Error::UpstreamUnreachable(format!("{}: {e}", self.config.base_url)))
    }
}

fn classify(err: reqwest::Error) -> Error {
    if err.is_connect() {
        Error::UpstreamUnreachable(err.to_string())
    } else if err.is_timeout() {
        Error::Upstream(format!("upstream timed out: {err}"))
    } else {
        Error::Upstream(err.to_string())
    }
}
