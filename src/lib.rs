#![forbid(unsafe_code)]

//! Client-side engine for a remote video catalog.
//!
//! The crate fetches the catalog from the NewTube download server, keeps a
//! cache-forever thumbnail per video on disk, asks the server to download new
//! videos (resolving third-party embed pages first) and exposes the result as
//! immutable catalog snapshots to whatever front end sits on top.

pub mod catalog;
pub mod client;
pub mod config;
pub mod download;
pub mod error;
pub mod model;
pub mod resolver;
pub mod session;
pub mod sync;
pub mod thumbnail;

pub use catalog::{Catalog, CatalogStore};
pub use client::{CatalogApi, HttpCatalogClient};
pub use config::{ClientSettings, SettingsOverrides, resolve_settings};
pub use download::DownloadOrchestrator;
pub use error::{Result, SyncError};
pub use model::VideoRecord;
pub use resolver::{IndirectSource, SourceKind, SourceResolver};
pub use session::{Session, SubmitOutcome};
pub use sync::{CatalogSynchronizer, SyncReport};
pub use thumbnail::{FfmpegFrameExtractor, FrameExtractor, ThumbnailCache};
