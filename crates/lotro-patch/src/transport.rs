//! HTTP transport for manifests and file bodies

use bytes::Bytes;
use reqwest::{Client, ClientBuilder, Response};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::PatchConfig;
use crate::error::{FailureReason, PatchError, Result};

/// HTTP client configured from a [`PatchConfig`]
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    manifest_timeout: Duration,
}

impl HttpClient {
    /// Build a client with the connect timeout, user agent and TLS settings
    /// from `config`
    pub fn new(config: &PatchConfig) -> Result<Self> {
        let client = ClientBuilder::new()
            .pool_idle_timeout(Duration::from_secs(30))
            .connect_timeout(config.connect_timeout)
            .tcp_nodelay(true)
            .tcp_keepalive(Duration::from_secs(60))
            .use_rustls_tls()
            .gzip(true)
            .deflate(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self {
            client,
            manifest_timeout: config.manifest_timeout,
        })
    }

    /// Get the underlying reqwest client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Fetch a whole (small) body, such as a manifest.
    ///
    /// The manifest deadline covers connecting, headers and body. Non-2xx
    /// statuses and empty bodies are failures.
    pub async fn fetch_url(&self, url: &Url) -> Result<Bytes> {
        let failed = |reason| PatchError::ManifestUnreachable {
            url: url.to_string(),
            reason,
        };

        let request = async {
            let response = self
                .client
                .get(url.clone())
                .send()
                .await
                .map_err(|e| failed(FailureReason::from_reqwest(&e)))?;

            let status = response.status();
            if !status.is_success() {
                return Err(failed(FailureReason::Status(status.as_u16())));
            }

            response
                .bytes()
                .await
                .map_err(|e| failed(FailureReason::from_reqwest(&e)))
        };

        let body = tokio::time::timeout(self.manifest_timeout, request)
            .await
            .map_err(|_| failed(FailureReason::Timeout))??;

        if body.is_empty() {
            return Err(failed(FailureReason::EmptyBody));
        }

        debug!("fetched {} ({} bytes)", url, body.len());
        Ok(body)
    }

    /// Start a GET and return the response once headers arrive
    pub async fn get(&self, url: &Url) -> reqwest::Result<Response> {
        self.client.get(url.clone()).send().await
    }
}

/// Parse a URL
pub fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url.trim()).map_err(|e| PatchError::InvalidUrl(format!("{url}: {e}")))
}

/// Parse a base download URL, appending a trailing `/` if it is missing so
/// relative fragments resolve beneath it
pub fn parse_base_url(base: &str) -> Result<Url> {
    let mut url = parse_url(base)?;
    if url.cannot_be_a_base() {
        return Err(PatchError::InvalidUrl(format!("{base}: cannot be a base URL")));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Resolve a manifest `From` fragment against the base download URL.
///
/// The result always lies beneath `base`: absolute URLs and fragments with
/// `..` segments are rejected.
pub fn join_url(base: &Url, fragment: &str) -> Result<Url> {
    let fragment = fragment.trim().trim_start_matches(['/', '\\']);
    let invalid = |what: &str| PatchError::InvalidUrl(format!("{base} + {fragment}: {what}"));

    if Url::parse(fragment).is_ok() {
        return Err(invalid("absolute URL"));
    }
    let path = fragment.split(['?', '#']).next().unwrap_or_default();
    if path.split(['/', '\\']).any(is_parent_segment) {
        return Err(invalid("parent directory segment"));
    }

    let joined = base.join(fragment).map_err(|e| invalid(&e.to_string()))?;
    if joined.origin() != base.origin() || !joined.path().starts_with(base.path()) {
        return Err(invalid("escapes the base URL"));
    }
    Ok(joined)
}

fn is_parent_segment(segment: &str) -> bool {
    matches!(
        segment.to_ascii_lowercase().as_str(),
        ".." | "%2e%2e" | ".%2e" | "%2e."
    )
}
