#![forbid(unsafe_code)]

//! Remote catalog client.
//!
//! Talks plain JSON over HTTP to the download server. Every endpoint is a
//! single request/response round-trip; only `200 OK` counts as success.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::ClientSettings;
use crate::model::SourceRequest;

pub const VIDEOS_ENDPOINT: &str = "/videos";
pub const DOWNLOAD_ENDPOINT: &str = "/download";

/// Transport-level failure of a single API call. Components translate it into
/// their own [`SyncError`](crate::SyncError) kind.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to {endpoint} failed: {message}")]
    Transport { endpoint: String, message: String },

    #[error("{endpoint} answered with status {status}")]
    Status { endpoint: String, status: u16 },

    #[error("reading response from {endpoint} failed: {message}")]
    Body { endpoint: String, message: String },
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// The server operations the sync engine depends on. Payloads are returned as
/// raw JSON text; parsing belongs to the caller so it can apply its own error
/// policy.
pub trait CatalogApi: Send + Sync {
    /// `GET /videos`.
    fn list_videos(&self) -> ApiResult<String>;

    /// `POST /download` with `{"url": url}`.
    fn request_download(&self, url: &str) -> ApiResult<String>;

    /// `POST <endpoint>` with `{"url": url}` against a resolution endpoint.
    fn resolve_source(&self, endpoint: &str, url: &str) -> ApiResult<String>;

    /// Absolute URL of a server-relative media path, used for frame
    /// extraction and playback alike.
    fn media_url(&self, path: &str) -> String;
}

/// Blocking `ureq` implementation of [`CatalogApi`].
pub struct HttpCatalogClient {
    agent: ureq::Agent,
    base_url: String,
}

impl HttpCatalogClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self::new(settings.api_url.clone(), settings.request_timeout)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    fn finish(endpoint: &str, outcome: Result<ureq::Response, ureq::Error>) -> ApiResult<String> {
        let response = match outcome {
            Ok(response) => response,
            Err(ureq::Error::Status(status, _)) => {
                return Err(ApiError::Status {
                    endpoint: endpoint.to_string(),
                    status,
                });
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(ApiError::Transport {
                    endpoint: endpoint.to_string(),
                    message: transport.to_string(),
                });
            }
        };
        let status = response.status();
        debug!(endpoint, status, "response received");
        if status != 200 {
            return Err(ApiError::Status {
                endpoint: endpoint.to_string(),
                status,
            });
        }
        response.into_string().map_err(|err| ApiError::Body {
            endpoint: endpoint.to_string(),
            message: err.to_string(),
        })
    }

    fn post_url(&self, endpoint: &str, url: &str) -> ApiResult<String> {
        let outcome = self
            .agent
            .post(&self.endpoint_url(endpoint))
            .send_json(SourceRequest {
                url: url.to_string(),
            });
        Self::finish(endpoint, outcome)
    }
}

impl CatalogApi for HttpCatalogClient {
    #[instrument(skip(self), fields(base = %self.base_url))]
    fn list_videos(&self) -> ApiResult<String> {
        let outcome = self.agent.get(&self.endpoint_url(VIDEOS_ENDPOINT)).call();
        Self::finish(VIDEOS_ENDPOINT, outcome)
    }

    #[instrument(skip(self), fields(base = %self.base_url))]
    fn request_download(&self, url: &str) -> ApiResult<String> {
        self.post_url(DOWNLOAD_ENDPOINT, url)
    }

    #[instrument(skip(self), fields(base = %self.base_url))]
    fn resolve_source(&self, endpoint: &str, url: &str) -> ApiResult<String> {
        self.post_url(endpoint, url)
    }

    fn media_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}
