#![forbid(unsafe_code)]

//! Value types exchanged with the download server and handed to front ends.
//!
//! Wire structs mirror the JSON bodies of `/videos`, `/download` and the
//! resolution endpoints exactly; `VideoRecord` is the client-side view with
//! the lazily resolved thumbnail attached.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One catalog entry as the server lists it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoEntry {
    /// Server-relative path, unique per catalog entry.
    pub url: String,
    pub name: String,
}

/// A video known to the client. Never mutated after construction; a new
/// sync builds fresh records instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoRecord {
    url: String,
    name: String,
    thumbnail: Option<PathBuf>,
}

impl VideoRecord {
    pub fn new(url: impl Into<String>, name: impl Into<String>, thumbnail: Option<PathBuf>) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
            thumbnail,
        }
    }

    pub(crate) fn from_entry(entry: VideoEntry, thumbnail: Option<PathBuf>) -> Self {
        Self::new(entry.url, entry.name, thumbnail)
    }

    /// Server-relative path identifying the video.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cached JPEG for this video, if one could be produced.
    pub fn thumbnail(&self) -> Option<&Path> {
        self.thumbnail.as_deref()
    }
}

/// Body of `POST /download` and of the resolution endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRequest {
    pub url: String,
}

/// Body returned by a resolution endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ResolvedSource {
    pub video_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_rejects_missing_name() {
        let err = serde_json::from_str::<VideoEntry>(r#"{"url":"/v/1.mp4"}"#).unwrap_err();
        assert!(err.to_string().contains("missing field `name`"));
    }

    #[test]
    fn entry_ignores_unknown_fields() {
        let entry: VideoEntry =
            serde_json::from_str(r#"{"url":"/v/1.mp4","name":"Clip A","size":10}"#).unwrap();
        assert_eq!(entry.name, "Clip A");
    }

    #[test]
    fn record_from_entry_keeps_fields() {
        let record = VideoRecord::from_entry(
            VideoEntry {
                url: "/v/1.mp4".into(),
                name: "Clip A".into(),
            },
            Some(PathBuf::from("/cache/thumbnail_x.jpg")),
        );
        assert_eq!(record.url(), "/v/1.mp4");
        assert_eq!(record.name(), "Clip A");
        assert_eq!(record.thumbnail(), Some(Path::new("/cache/thumbnail_x.jpg")));
    }

    #[test]
    fn source_request_serializes_url_only() {
        let body = serde_json::to_string(&SourceRequest {
            url: "https://dai.ly/x\"y".into(),
        })
        .unwrap();
        assert_eq!(body, r#"{"url":"https://dai.ly/x\"y"}"#);
    }
}
