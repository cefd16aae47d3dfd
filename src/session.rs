#![forbid(unsafe_code)]

//! User-facing action layer.
//!
//! A `Session` is what a front end talks to. Each action (load the catalog,
//! submit a URL, fetch one thumbnail) runs its blocking pipeline on Tokio's
//! blocking pool so the caller's thread never does network or disk work.
//! Shutting the session down abandons whatever is in flight: the blocking
//! work is left to finish on its own and its result is dropped without
//! touching the published catalog.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::catalog::{Catalog, CatalogStore};
use crate::client::{CatalogApi, HttpCatalogClient};
use crate::config::ClientSettings;
use crate::download::DownloadOrchestrator;
use crate::error::{Result, SyncError};
use crate::model::VideoRecord;
use crate::resolver::{SourceKind, SourceResolver};
use crate::sync::{CatalogSynchronizer, SyncReport};
use crate::thumbnail::ThumbnailCache;

/// Result of a successful submission.
#[derive(Debug)]
pub struct SubmitOutcome {
    /// Video as registered by the server.
    pub record: VideoRecord,
    /// URL the download was requested for (after resolution).
    pub direct_url: String,
    /// Name of the indirect source the URL was resolved through, if any.
    pub resolved_from: Option<String>,
    /// Catalog refresh that ran after the download returned.
    pub refresh: SyncReport,
}

pub struct Session {
    client: Arc<dyn CatalogApi>,
    thumbnails: Arc<ThumbnailCache>,
    synchronizer: Arc<CatalogSynchronizer>,
    orchestrator: Arc<DownloadOrchestrator>,
    resolver: Arc<SourceResolver>,
    store: CatalogStore,
    cancel: CancellationToken,
}

impl Session {
    pub fn new(client: Arc<dyn CatalogApi>, thumbnails: Arc<ThumbnailCache>) -> Self {
        let synchronizer = CatalogSynchronizer::new(client.clone(), thumbnails.clone());
        let resolver = SourceResolver::new(client.clone());
        Self::with_parts(client, thumbnails, synchronizer, resolver)
    }

    /// Wires the HTTP client, ffmpeg-backed cache and worker count from
    /// `settings`.
    pub fn from_settings(settings: &ClientSettings) -> Self {
        let client: Arc<dyn CatalogApi> = Arc::new(HttpCatalogClient::from_settings(settings));
        let thumbnails = Arc::new(ThumbnailCache::from_settings(settings));
        let synchronizer = CatalogSynchronizer::new(client.clone(), thumbnails.clone())
            .with_workers(settings.thumbnail_workers);
        let resolver = SourceResolver::new(client.clone());
        Self::with_parts(client, thumbnails, synchronizer, resolver)
    }

    pub fn with_parts(
        client: Arc<dyn CatalogApi>,
        thumbnails: Arc<ThumbnailCache>,
        synchronizer: CatalogSynchronizer,
        resolver: SourceResolver,
    ) -> Self {
        let orchestrator = DownloadOrchestrator::new(client.clone(), thumbnails.clone());
        Self {
            client,
            thumbnails,
            synchronizer: Arc::new(synchronizer),
            orchestrator: Arc::new(orchestrator),
            resolver: Arc::new(resolver),
            store: CatalogStore::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Current catalog snapshot.
    pub fn catalog(&self) -> Arc<Catalog> {
        self.store.snapshot()
    }

    /// URL to hand to a player for a server-relative video path.
    pub fn media_url(&self, path: &str) -> String {
        self.client.media_url(path)
    }

    /// Child token that fires when the session shuts down.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    /// Abandons every in-flight action. Later actions fail with
    /// [`SyncError::Cancelled`].
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Synchronizes the catalog and publishes the result.
    ///
    /// A failed sync publishes an empty catalog, matching what the user sees
    /// after a failed load. The returned report carries the error.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<SyncReport> {
        let synchronizer = self.synchronizer.clone();
        let report = self.run_blocking(move || synchronizer.sync()).await?;
        if self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        self.store.replace(report.catalog.clone());
        Ok(report)
    }

    /// Resolves (if needed), downloads, then refreshes the catalog.
    ///
    /// The refresh starts only after the download call returned successfully.
    #[instrument(skip(self))]
    pub async fn submit(&self, url: &str) -> Result<SubmitOutcome> {
        let url = url.trim();
        if url.is_empty() {
            return Err(SyncError::invalid_request("empty URL"));
        }

        let resolved_from = match self.resolver.classify(url) {
            SourceKind::Direct => None,
            SourceKind::Indirect(source) => Some(source.name.clone()),
        };
        let resolver = self.resolver.clone();
        let submitted = url.to_string();
        let direct_url = self
            .run_blocking(move || resolver.maybe_resolve(&submitted))
            .await??;

        let orchestrator = self.orchestrator.clone();
        let target = direct_url.clone();
        let record = self
            .run_blocking(move || orchestrator.download_and_register(&target))
            .await??;
        info!(name = record.name(), "download complete");

        let refresh = self.refresh().await?;
        if let Some(err) = &refresh.error {
            warn!(error = %err, "refresh after download failed");
        }
        Ok(SubmitOutcome {
            record,
            direct_url,
            resolved_from,
            refresh,
        })
    }

    /// Fetches (or generates) the thumbnail of a single video.
    pub async fn thumbnail(&self, path: &str) -> Result<PathBuf> {
        let thumbnails = self.thumbnails.clone();
        let video_id = path.to_string();
        let source_url = self.client.media_url(path);
        self.run_blocking(move || thumbnails.try_get_or_create(&video_id, &source_url))
            .await?
    }

    async fn run_blocking<T, F>(&self, job: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        let handle = tokio::task::spawn_blocking(job);
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(SyncError::Cancelled),
            joined = handle => match joined {
                Ok(value) => Ok(value),
                Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                Err(_) => Err(SyncError::Cancelled),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::FakeApi;
    use crate::thumbnail::tests::FakeExtractor;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        api: Arc<FakeApi>,
        session: Arc<Session>,
    }

    fn harness(api: FakeApi, extractor: FakeExtractor) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(api);
        let cache = Arc::new(ThumbnailCache::new(dir.path(), Arc::new(extractor)));
        let session = Arc::new(Session::new(api.clone(), cache));
        Harness {
            _dir: dir,
            api,
            session,
        }
    }

    const TWO_CLIPS: &str =
        r#"[{"url":"/v/1.mp4","name":"Clip A"},{"url":"/v/2.mp4","name":"Clip B"}]"#;

    #[tokio::test]
    async fn refresh_publishes_snapshot() {
        let h = harness(FakeApi::with_videos(TWO_CLIPS), FakeExtractor::default());
        assert!(h.session.catalog().is_empty());

        let report = h.session.refresh().await.unwrap();

        assert!(report.is_ok());
        assert_eq!(h.session.catalog().len(), 2);
        assert_eq!(*h.session.catalog(), report.catalog);
    }

    #[tokio::test]
    async fn failed_refresh_replaces_full_catalog_with_empty() {
        let h = harness(FakeApi::with_videos(TWO_CLIPS), FakeExtractor::default());
        h.session.refresh().await.unwrap();
        assert_eq!(h.session.catalog().len(), 2);

        *h.api.videos.lock() = Err(503);
        let report = h.session.refresh().await.unwrap();

        assert!(matches!(report.error, Some(SyncError::Fetch { .. })));
        assert!(report.catalog.is_empty());
        assert!(h.session.catalog().is_empty());
    }

    #[tokio::test]
    async fn latest_completed_refresh_wins() {
        let h = harness(FakeApi::with_videos(TWO_CLIPS), FakeExtractor::default());
        h.session.refresh().await.unwrap();

        *h.api.videos.lock() = Ok(r#"[{"url":"/v/3.mp4","name":"Clip C"}]"#.to_string());
        let report = h.session.refresh().await.unwrap();

        let catalog = h.session.catalog();
        assert_eq!(*catalog, report.catalog);
        let names: Vec<&str> = catalog.iter().map(|record| record.name()).collect();
        assert_eq!(names, vec!["Clip C"]);
        assert!(catalog.get("/v/1.mp4").is_none());
    }

    #[tokio::test]
    async fn empty_submission_is_rejected_without_requests() {
        let h = harness(FakeApi::with_videos(TWO_CLIPS), FakeExtractor::default());
        let err = h.session.submit("   ").await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidRequest { .. }));
        assert_eq!(err.user_message(), "Please enter a URL");
        assert!(h.api.calls().is_empty());
    }

    #[tokio::test]
    async fn indirect_submission_downloads_resolved_url_then_resyncs() {
        let mut api = FakeApi::with_videos(TWO_CLIPS);
        api.resolve = Ok(r#"{"video_url":"https://cdn/x.mp4"}"#.to_string());
        api.download = Ok(r#"{"url":"/v/2.mp4","name":"Clip B"}"#.to_string());
        let h = harness(api, FakeExtractor::default());

        let outcome = h.session.submit("https://dai.ly/abc123").await.unwrap();

        assert_eq!(outcome.direct_url, "https://cdn/x.mp4");
        assert_eq!(outcome.resolved_from.as_deref(), Some("Dailymotion"));
        assert_eq!(outcome.record.name(), "Clip B");
        assert!(outcome.refresh.is_ok());
        assert!(h.session.catalog().get("/v/2.mp4").is_some());
        assert_eq!(
            h.api.calls(),
            vec![
                "POST /get_dailymotion_url https://dai.ly/abc123".to_string(),
                "POST /download https://cdn/x.mp4".to_string(),
                "GET /videos".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn failed_download_skips_resync() {
        let h = harness(FakeApi::with_videos(TWO_CLIPS), FakeExtractor::default());

        let err = h.session.submit("https://cdn.example/x.mp4").await.unwrap_err();

        assert!(matches!(err, SyncError::Download { .. }));
        assert_eq!(err.user_message(), "Download failed");
        assert_eq!(
            h.api.calls(),
            vec!["POST /download https://cdn.example/x.mp4".to_string()]
        );
        assert!(h.session.catalog().is_empty());
    }

    #[tokio::test]
    async fn failed_resolution_never_reaches_download() {
        let h = harness(FakeApi::with_videos(TWO_CLIPS), FakeExtractor::default());

        let err = h.session.submit("https://www.dailymotion.com/video/x1").await.unwrap_err();

        assert!(matches!(err, SyncError::Resolution { .. }));
        assert_eq!(err.user_message(), "Failed to fetch Dailymotion video URL");
        assert_eq!(h.api.calls().len(), 1);
    }

    #[tokio::test]
    async fn shutdown_rejects_new_actions() {
        let h = harness(FakeApi::with_videos(TWO_CLIPS), FakeExtractor::default());
        h.session.shutdown();

        assert!(matches!(h.session.refresh().await, Err(SyncError::Cancelled)));
        assert!(h.api.calls().is_empty());
        assert!(h.session.is_shut_down());
    }

    #[tokio::test]
    async fn shutdown_abandons_in_flight_refresh() {
        let extractor = FakeExtractor {
            delay: Some(Duration::from_millis(300)),
            ..FakeExtractor::default()
        };
        let h = harness(FakeApi::with_videos(TWO_CLIPS), extractor);
        let token = h.session.cancellation_token();

        let session = h.session.clone();
        let pending = tokio::spawn(async move { session.refresh().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.session.shutdown();

        let outcome = pending.await.unwrap();
        assert!(matches!(outcome, Err(SyncError::Cancelled)));
        assert!(token.is_cancelled());

        // The abandoned sync finishes in the background without publishing.
        tokio::time::sleep(Duration::from_millis(800)).await;
        assert!(h.session.catalog().is_empty());
    }

    #[tokio::test]
    async fn thumbnail_surfaces_generation_errors() {
        let h = harness(FakeApi::with_videos("[]"), FakeExtractor::failing());
        let err = h.session.thumbnail("/v/1.mp4").await.unwrap_err();
        assert!(matches!(err, SyncError::Thumbnail { .. }));
    }

    #[test]
    fn media_url_joins_base_and_path() {
        let h = harness(FakeApi::with_videos("[]"), FakeExtractor::default());
        assert_eq!(h.session.media_url("/v/1.mp4"), "http://fake.test/v/1.mp4");
    }
}
