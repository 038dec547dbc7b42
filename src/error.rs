use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

/// Failure surfaced by the transport once it stops retrying.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The server answered 404; never retried.
    #[error("{url} not found")]
    NotFound { url: Url },

    /// Every attempt failed with a network error or a non-404 status.
    #[error("giving up on {url} after {attempts} attempt(s): {reason}")]
    Transient {
        url: Url,
        attempts: u32,
        reason: String,
    },
}

impl TransportError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, TransportError::NotFound { .. })
    }
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("catalog page {page} could not be decoded: {reason}")]
    CatalogMalformed { page: u32, reason: String },

    #[error("stream descriptor malformed: {0}")]
    DescriptorMalformed(String),

    #[error("cannot build media plan: {0}")]
    PlanUnbuildable(String),

    #[error("filesystem failure at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid url {url}: {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },

    #[error("stream has no segments")]
    EmptyStream,

    #[error("segment {index} came back empty")]
    EmptySegment { index: u32 },

    #[error("episode did not finish within {after:?}")]
    DeadlineExceeded { after: Duration },

    #[error("another download holds {}", path.display())]
    Locked { path: PathBuf },

    #[error("episode task failed: {0}")]
    Task(String),
}

impl DownloadError {
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DownloadError::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Short label reported next to a failed episode.
    pub fn kind(&self) -> &'static str {
        match self {
            DownloadError::Transport(TransportError::NotFound { .. }) => "not-found",
            DownloadError::Transport(TransportError::Transient { .. }) => "transport",
            DownloadError::CatalogMalformed { .. } => "catalog-malformed",
            DownloadError::DescriptorMalformed(_) => "descriptor-malformed",
            DownloadError::PlanUnbuildable(_) => "plan-unbuildable",
            DownloadError::Filesystem { .. } => "filesystem",
            DownloadError::InvalidUrl { .. } => "invalid-url",
            DownloadError::EmptyStream => "empty-stream",
            DownloadError::EmptySegment { .. } => "empty-segment",
            DownloadError::DeadlineExceeded { .. } => "deadline",
            DownloadError::Locked { .. } => "locked",
            DownloadError::Task(_) => "task",
        }
    }
}
