#![forbid(unsafe_code)]

//! Error taxonomy shared by every component of the sync engine.

use thiserror::Error;

/// Result type alias for catalog, thumbnail, download and resolution calls.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Every failure a user-initiated action can end with.
///
/// `Thumbnail` never leaves the thumbnail cache in practice: the cache logs it
/// and hands back an absent thumbnail instead.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Catalog endpoint unreachable or answered with a non-200 status.
    #[error("catalog fetch failed: {message}")]
    Fetch { message: String },

    /// Catalog payload (or one of its entries) is malformed.
    #[error("catalog parse failed: {message}")]
    Parse { message: String },

    /// Frame extraction, encoding or persisting a thumbnail failed.
    #[error("thumbnail generation failed for {video_id}: {message}")]
    Thumbnail { video_id: String, message: String },

    /// Download endpoint failed or returned something unusable.
    #[error("download failed: {message}")]
    Download { message: String },

    /// An indirect source could not be turned into a direct URL.
    #[error("{source_name} resolution failed: {message}")]
    Resolution {
        source_name: String,
        message: String,
    },

    /// The submitted input cannot start an action at all.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// The owning context was torn down before the action finished.
    #[error("action cancelled")]
    Cancelled,
}

impl SyncError {
    pub fn fetch(message: impl Into<String>) -> Self {
        Self::Fetch {
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub fn thumbnail(video_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Thumbnail {
            video_id: video_id.into(),
            message: message.into(),
        }
    }

    pub fn download(message: impl Into<String>) -> Self {
        Self::Download {
            message: message.into(),
        }
    }

    pub fn resolution(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Resolution {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// The one-line notification shown to the user for a failed action.
    pub fn user_message(&self) -> String {
        match self {
            Self::Fetch { .. } | Self::Parse { .. } => "Failed to load videos".to_string(),
            Self::Thumbnail { .. } => "Failed to generate thumbnail".to_string(),
            Self::Download { .. } => "Download failed".to_string(),
            Self::Resolution { source_name, .. } => {
                format!("Failed to fetch {source_name} video URL")
            }
            Self::InvalidRequest { .. } => "Please enter a URL".to_string(),
            Self::Cancelled => "Cancelled".to_string(),
        }
    }
}
