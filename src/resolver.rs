#![forbid(unsafe_code)]

//! Indirect-source resolution.
//!
//! Some submitted URLs point at third-party pages rather than media files.
//! Those are recognised by host markers and sent to a server endpoint that
//! extracts the direct media URL. New sources are added to the table; the
//! download path does not change.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::client::CatalogApi;
use crate::error::{Result, SyncError};
use crate::model::ResolvedSource;

pub const DAILYMOTION_ENDPOINT: &str = "/get_dailymotion_url";

/// A family of third-party URLs and the endpoint that resolves them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndirectSource {
    pub name: String,
    /// Substrings that identify the source, compared case-insensitively.
    pub markers: Vec<String>,
    pub endpoint: String,
}

impl IndirectSource {
    pub fn new(name: impl Into<String>, markers: &[&str], endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            markers: markers.iter().map(|marker| marker.to_ascii_lowercase()).collect(),
            endpoint: endpoint.into(),
        }
    }

    pub fn dailymotion() -> Self {
        Self::new("Dailymotion", &["dailymotion.com", "dai.ly"], DAILYMOTION_ENDPOINT)
    }

    pub fn matches(&self, url: &str) -> bool {
        let url = url.to_ascii_lowercase();
        self.markers.iter().any(|marker| url.contains(marker.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind<'a> {
    Direct,
    Indirect(&'a IndirectSource),
}

pub struct SourceResolver {
    client: Arc<dyn CatalogApi>,
    sources: Vec<IndirectSource>,
}

impl SourceResolver {
    /// Resolver with the built-in source table.
    pub fn new(client: Arc<dyn CatalogApi>) -> Self {
        Self::with_sources(client, vec![IndirectSource::dailymotion()])
    }

    pub fn with_sources(client: Arc<dyn CatalogApi>, sources: Vec<IndirectSource>) -> Self {
        Self { client, sources }
    }

    pub fn register(mut self, source: IndirectSource) -> Self {
        self.sources.push(source);
        self
    }

    pub fn sources(&self) -> &[IndirectSource] {
        &self.sources
    }

    /// First matching table entry wins.
    pub fn classify(&self, url: &str) -> SourceKind<'_> {
        self.sources
            .iter()
            .find(|source| source.matches(url))
            .map_or(SourceKind::Direct, SourceKind::Indirect)
    }

    /// Passes direct URLs through untouched and resolves indirect ones.
    pub fn maybe_resolve(&self, url: &str) -> Result<String> {
        match self.classify(url) {
            SourceKind::Direct => {
                debug!(url, "direct source");
                Ok(url.to_string())
            }
            SourceKind::Indirect(source) => self.resolve(source, url),
        }
    }

    /// Asks the source's endpoint for the direct media URL.
    #[instrument(skip(self, source), fields(source_name = %source.name))]
    pub fn resolve(&self, source: &IndirectSource, url: &str) -> Result<String> {
        let body = self
            .client
            .resolve_source(&source.endpoint, url)
            .map_err(|err| SyncError::resolution(&source.name, err.to_string()))?;
        let resolved: ResolvedSource = serde_json::from_str(&body).map_err(|err| {
            SyncError::resolution(&source.name, format!("malformed response: {err}"))
        })?;
        let direct = resolved.video_url.trim();
        if direct.is_empty() {
            return Err(SyncError::resolution(&source.name, "empty video_url"));
        }
        info!(direct, "indirect source resolved");
        Ok(direct.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::FakeApi;

    fn setup(api: FakeApi) -> (Arc<FakeApi>, SourceResolver) {
        let api = Arc::new(api);
        (api.clone(), SourceResolver::new(api))
    }

    #[test]
    fn dailymotion_markers_are_recognised() {
        let (_api, resolver) = setup(FakeApi::with_videos("[]"));
        for url in [
            "https://dai.ly/abc123",
            "https://www.dailymotion.com/video/x8abc",
            "HTTPS://WWW.DAILYMOTION.COM/video/x8abc",
        ] {
            assert!(
                matches!(resolver.classify(url), SourceKind::Indirect(source) if source.name == "Dailymotion"),
                "{url}"
            );
        }
        assert_eq!(resolver.classify("https://cdn.example/x.mp4"), SourceKind::Direct);
    }

    #[test]
    fn direct_urls_pass_through_without_a_request() {
        let (api, resolver) = setup(FakeApi::with_videos("[]"));
        let url = resolver.maybe_resolve("https://cdn.example/x.mp4").unwrap();
        assert_eq!(url, "https://cdn.example/x.mp4");
        assert!(api.calls().is_empty());
    }

    #[test]
    fn indirect_url_is_resolved_via_endpoint() {
        let mut api = FakeApi::with_videos("[]");
        api.resolve = Ok(r#"{"video_url":"https://cdn/x.mp4"}"#.to_string());
        let (api, resolver) = setup(api);

        let url = resolver.maybe_resolve("https://dai.ly/abc123").unwrap();

        assert_eq!(url, "https://cdn/x.mp4");
        assert_eq!(
            api.calls(),
            vec!["POST /get_dailymotion_url https://dai.ly/abc123".to_string()]
        );
    }

    #[test]
    fn failures_are_resolution_errors() {
        let (_api, failing) = setup(FakeApi::with_videos("[]"));
        let err = failing.maybe_resolve("https://dai.ly/abc123").unwrap_err();
        assert!(matches!(err, SyncError::Resolution { ref source_name, .. } if source_name == "Dailymotion"));

        let mut api = FakeApi::with_videos("[]");
        api.resolve = Ok(r#"{"error":"not found"}"#.to_string());
        let (_api, malformed) = setup(api);
        assert!(matches!(
            malformed.maybe_resolve("https://dai.ly/abc123"),
            Err(SyncError::Resolution { .. })
        ));

        let mut api = FakeApi::with_videos("[]");
        api.resolve = Ok(r#"{"video_url":"  "}"#.to_string());
        let (_api, empty) = setup(api);
        assert!(matches!(
            empty.maybe_resolve("https://dai.ly/abc123"),
            Err(SyncError::Resolution { ref message, .. }) if message == "empty video_url"
        ));
    }

    #[test]
    fn registered_sources_extend_the_table() {
        let mut api = FakeApi::with_videos("[]");
        api.resolve = Ok(r#"{"video_url":"https://cdn/v.mp4"}"#.to_string());
        let api = Arc::new(api);
        let resolver = SourceResolver::new(api.clone()).register(IndirectSource::new(
            "Vimeo",
            &["vimeo.com"],
            "/get_vimeo_url",
        ));

        assert_eq!(resolver.sources().len(), 2);
        assert_eq!(
            resolver.maybe_resolve("https://vimeo.com/42").unwrap(),
            "https://cdn/v.mp4"
        );
        assert_eq!(api.calls(), vec!["POST /get_vimeo_url https://vimeo.com/42".to_string()]);
    }
}
