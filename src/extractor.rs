use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// What the caller wants out of a video page.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Muxed video and audio.
    #[default]
    Video,
    /// Audio track only.
    Audio,
}

impl MediaKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "video" => Some(Self::Video),
            "audio" => Some(Self::Audio),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Video => "video/mp4",
            Self::Audio => "audio/mp3",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Video => "mp4",
            Self::Audio => "mp3",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub title: String,
    pub author: String,
    pub duration_seconds: u64,
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("failed to launch extractor: {0}")]
    Launch(#[source] std::io::Error),

    #[error("{0}")]
    Failed(String),

    #[error("unreadable extractor output: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out")]
    TimedOut,

    #[error("cancelled")]
    Cancelled,
}

/// Lazy, finite, non-restartable sequence of media chunks.
pub type MediaStream = BoxStream<'static, Result<Bytes, ExtractError>>;

/// Resolves a page URL into metadata and a media byte stream.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn fetch_info(&self, url: &str) -> Result<MediaInfo, ExtractError>;

    /// Opens the highest quality stream available for `kind`.
    ///
    /// The stream must stop pulling from its source once `cancel` fires.
    async fn open_stream(
        &self,
        url: &str,
        kind: MediaKind,
        cancel: CancellationToken,
    ) -> Result<MediaStream, ExtractError>;
}
