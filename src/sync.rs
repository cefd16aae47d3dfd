#![forbid(unsafe_code)]

//! Catalog synchronizer: fetch, parse, attach thumbnails, publish.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use parking_lot::Mutex;
use tracing::{error, info, instrument};

use crate::catalog::Catalog;
use crate::client::CatalogApi;
use crate::config::DEFAULT_THUMBNAIL_WORKERS;
use crate::error::{Result, SyncError};
use crate::model::{VideoEntry, VideoRecord};
use crate::thumbnail::ThumbnailCache;

/// Outcome of a sync. A failed sync still carries a (empty) catalog so the
/// presentation layer always has something to draw.
#[derive(Debug)]
pub struct SyncReport {
    pub catalog: Catalog,
    pub error: Option<SyncError>,
}

impl SyncReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

pub struct CatalogSynchronizer {
    client: Arc<dyn CatalogApi>,
    thumbnails: Arc<ThumbnailCache>,
    workers: usize,
}

impl CatalogSynchronizer {
    pub fn new(client: Arc<dyn CatalogApi>, thumbnails: Arc<ThumbnailCache>) -> Self {
        Self {
            client,
            thumbnails,
            workers: DEFAULT_THUMBNAIL_WORKERS,
        }
    }

    /// Number of threads resolving thumbnails in parallel during a sync.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Builds a fresh catalog. Never fails: errors degrade to an empty
    /// catalog with the error attached to the report.
    pub fn sync(&self) -> SyncReport {
        match self.try_sync() {
            Ok(catalog) => {
                info!(videos = catalog.len(), "catalog synchronized");
                SyncReport {
                    catalog,
                    error: None,
                }
            }
            Err(err) => {
                error!(error = %err, "catalog sync failed");
                SyncReport {
                    catalog: Catalog::empty(),
                    error: Some(err),
                }
            }
        }
    }

    #[instrument(skip(self))]
    pub fn try_sync(&self) -> Result<Catalog> {
        let body = self
            .client
            .list_videos()
            .map_err(|err| SyncError::fetch(err.to_string()))?;
        let entries = parse_catalog(&body)?;
        Ok(Catalog::new(self.attach_thumbnails(entries)))
    }

    /// Resolves every entry's thumbnail, keeping server order. Returns once
    /// each attempt finished, successful or not.
    fn attach_thumbnails(&self, entries: Vec<VideoEntry>) -> Vec<VideoRecord> {
        let slots: Vec<Mutex<Option<PathBuf>>> = entries.iter().map(|_| Mutex::new(None)).collect();
        let next = AtomicUsize::new(0);
        let workers = self.workers.min(entries.len());

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    loop {
                        let index = next.fetch_add(1, Ordering::Relaxed);
                        let Some(entry) = entries.get(index) else {
                            break;
                        };
                        let source_url = self.client.media_url(&entry.url);
                        *slots[index].lock() = self.thumbnails.get_or_create(&entry.url, &source_url);
                    }
                });
            }
        });

        entries
            .into_iter()
            .zip(slots)
            .map(|(entry, slot)| VideoRecord::from_entry(entry, slot.into_inner()))
            .collect()
    }
}

/// Parses a `/videos` body. All-or-nothing: one malformed entry rejects the
/// whole batch.
pub fn parse_catalog(body: &str) -> Result<Vec<VideoEntry>> {
    serde_json::from_str(body).map_err(|err| SyncError::parse(err.to_string()))
}
