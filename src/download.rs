#![forbid(unsafe_code)]

//! Server-side download requests.
//!
//! The server fetches the media and registers it in its catalog; the client
//! only has to turn the returned entry into a record with a thumbnail. It
//! never touches the shared catalog: publishing the new entry is the job of
//! the next sync.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::client::CatalogApi;
use crate::error::{Result, SyncError};
use crate::model::{VideoEntry, VideoRecord};
use crate::thumbnail::ThumbnailCache;

pub struct DownloadOrchestrator {
    client: Arc<dyn CatalogApi>,
    thumbnails: Arc<ThumbnailCache>,
}

impl DownloadOrchestrator {
    pub fn new(client: Arc<dyn CatalogApi>, thumbnails: Arc<ThumbnailCache>) -> Self {
        Self { client, thumbnails }
    }

    /// Asks the server to download `url` and returns the registered video.
    ///
    /// Blocks until a thumbnail attempt for the new video has finished. No
    /// retries: any failure ends this call with [`SyncError::Download`].
    #[instrument(skip(self))]
    pub fn download_and_register(&self, url: &str) -> Result<VideoRecord> {
        let body = self
            .client
            .request_download(url)
            .map_err(|err| SyncError::download(err.to_string()))?;
        let entry: VideoEntry = serde_json::from_str(&body)
            .map_err(|err| SyncError::download(format!("malformed response: {err}")))?;
        let source_url = self.client.media_url(&entry.url);
        let thumbnail = self.thumbnails.get_or_create(&entry.url, &source_url);
        info!(video = %entry.url, name = %entry.name, "download registered");
        Ok(VideoRecord::from_entry(entry, thumbnail))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::FakeApi;
    use crate::thumbnail::tests::FakeExtractor;
    use tempfile::TempDir;

    fn setup(api: FakeApi, extractor: FakeExtractor) -> (TempDir, Arc<FakeApi>, DownloadOrchestrator) {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(api);
        let cache = Arc::new(ThumbnailCache::new(dir.path(), Arc::new(extractor)));
        let orchestrator = DownloadOrchestrator::new(api.clone(), cache);
        (dir, api, orchestrator)
    }

    #[test]
    fn success_returns_record_with_thumbnail() {
        let mut api = FakeApi::with_videos("[]");
        api.download = Ok(r#"{"url":"/v/2.mp4","name":"Clip B"}"#.to_string());
        let (_dir, api, orchestrator) = setup(api, FakeExtractor::default());

        let record = orchestrator
            .download_and_register("https://cdn.example/x.mp4")
            .unwrap();

        assert_eq!(record.url(), "/v/2.mp4");
        assert_eq!(record.name(), "Clip B");
        assert!(record.thumbnail().unwrap().is_file());
        assert_eq!(
            api.calls(),
            vec!["POST /download https://cdn.example/x.mp4".to_string()]
        );
    }

    #[test]
    fn thumbnail_failure_does_not_fail_the_download() {
        let mut api = FakeApi::with_videos("[]");
        api.download = Ok(r#"{"url":"/v/2.mp4","name":"Clip B"}"#.to_string());
        let (_dir, _api, orchestrator) = setup(api, FakeExtractor::failing());

        let record = orchestrator.download_and_register("https://cdn.example/x.mp4").unwrap();

        assert!(record.thumbnail().is_none());
    }

    #[test]
    fn bad_status_is_a_download_error() {
        let (_dir, api, orchestrator) =
            setup(FakeApi::with_videos("[]"), FakeExtractor::default());

        let err = orchestrator.download_and_register("https://cdn.example/x.mp4").unwrap_err();

        assert!(matches!(err, SyncError::Download { ref message } if message.contains("500")));
        assert_eq!(api.calls().len(), 1, "no retry after failure");
    }

    #[test]
    fn malformed_response_is_a_download_error() {
        let mut api = FakeApi::with_videos("[]");
        api.download = Ok(r#"{"url":"/v/2.mp4"}"#.to_string());
        let (_dir, _api, orchestrator) = setup(api, FakeExtractor::default());

        let err = orchestrator.download_and_register("https://cdn.example/x.mp4").unwrap_err();

        assert!(matches!(err, SyncError::Download { ref message } if message.starts_with("malformed response")));
    }
}
