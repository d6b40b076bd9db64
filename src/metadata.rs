//! Token metadata resolution: URI → `{name, image}`.
//!
//! The fetcher handles `http(s)://` URLs, `ipfs://` URIs through a
//! configurable gateway, and inline `data:application/json` documents
//! (base64 or URL-encoded). One fetch per call, no retries at this layer —
//! retry policy, if any, belongs to the caller.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::FetchError;

const METADATA_TARGET: &str = "collection_scanner::metadata";

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_IPFS_GATEWAY: &str = "https://ipfs.io/ipfs/";

/// Required fields extracted from a token's metadata document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
    pub name: String,
    pub image: String,
}

/// Fetches a URI and returns the raw JSON document.
///
/// Seam for testing and for swapping the transport (e.g. a caching proxy)
/// without touching the resolution logic.
#[async_trait]
pub trait MetadataFetcher: Send + Sync + 'static {
    async fn get(&self, uri: &str) -> Result<Value, FetchError>;
}

/// Configuration for [`HttpMetadataFetcher`].
#[derive(Debug, Clone, Deserialize)]
pub struct HttpFetcherConfig {
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Gateway prefix used to rewrite `ipfs://` URIs.
    #[serde(default = "default_ipfs_gateway")]
    pub ipfs_gateway: String,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_ipfs_gateway() -> String {
    DEFAULT_IPFS_GATEWAY.to_string()
}

impl Default for HttpFetcherConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            ipfs_gateway: default_ipfs_gateway(),
        }
    }
}

/// `reqwest`-backed [`MetadataFetcher`].
pub struct HttpMetadataFetcher {
    client: reqwest::Client,
    ipfs_gateway: String,
}

impl HttpMetadataFetcher {
    pub fn new(config: HttpFetcherConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            ipfs_gateway: config.ipfs_gateway,
        })
    }

    async fn get_http(&self, url: &str) -> Result<Value, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(FetchError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(
                target: METADATA_TARGET,
                url = %url,
                status = %status,
                "metadata fetch failed"
            );
            return Err(FetchError::Status { status });
        }

        let body = response.text().await.map_err(FetchError::Transport)?;
        serde_json::from_str(&body).map_err(FetchError::Json)
    }
}

#[async_trait]
impl MetadataFetcher for HttpMetadataFetcher {
    async fn get(&self, uri: &str) -> Result<Value, FetchError> {
        if uri.starts_with("http://") || uri.starts_with("https://") {
            return self.get_http(uri).await;
        }

        if let Some(cid) = uri.strip_prefix("ipfs://") {
            let url = format!("{}{}", self.ipfs_gateway, cid.trim_start_matches('/'));
            return self.get_http(&url).await;
        }

        if uri.starts_with("data:") {
            let raw = decode_data_uri(uri)?;
            return serde_json::from_str(&raw).map_err(FetchError::Json);
        }

        Err(FetchError::UnsupportedScheme {
            uri: uri.to_string(),
        })
    }
}

/// Decode an inline `data:` URI to its textual content.
///
/// Supports `data:application/json;base64,<encoded>` and
/// `data:application/json,<url-encoded>`, plus other data URIs carrying
/// JSON content.
fn decode_data_uri(uri: &str) -> Result<String, FetchError> {
    let comma = uri.find(',').ok_or_else(|| FetchError::DataUri {
        reason: "missing `,` separator".to_string(),
    })?;
    let header = &uri[5..comma]; // skip "data:"
    let body = &uri[comma + 1..];

    if header.contains("base64") {
        use base64::Engine;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(body)
            .map_err(|e| FetchError::DataUri {
                reason: e.to_string(),
            })?;
        String::from_utf8(bytes).map_err(|e| FetchError::DataUri {
            reason: e.to_string(),
        })
    } else {
        Ok(urlencoding::decode(body)
            .map_err(|e| FetchError::DataUri {
                reason: e.to_string(),
            })?
            .into_owned())
    }
}

/// Resolves a token URI into its required metadata fields.
///
/// Thin validation layer over a [`MetadataFetcher`]: absence of `name` or
/// `image` is surfaced as an error rather than defaulted to an empty
/// string, so callers record the token as unresolved instead of rendering a
/// blank card.
#[derive(Clone)]
pub struct MetadataResolver {
    fetcher: Arc<dyn MetadataFetcher>,
}

impl MetadataResolver {
    pub fn new(fetcher: Arc<dyn MetadataFetcher>) -> Self {
        Self { fetcher }
    }

    pub async fn resolve(&self, uri: &str) -> Result<TokenMetadata, FetchError> {
        let doc = self.fetcher.get(uri).await?;
        let name = required_string(&doc, "name")?;
        let image = required_string(&doc, "image")?;

        tracing::debug!(
            target: METADATA_TARGET,
            uri = %uri,
            name = %name,
            "resolved token metadata"
        );

        Ok(TokenMetadata { name, image })
    }
}

fn required_string(doc: &Value, field: &'static str) -> Result<String, FetchError> {
    doc.get(field)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or(FetchError::MissingField(field))
}
