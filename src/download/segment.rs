use std::path::{Path, PathBuf};

use url::Url;

use crate::download::layout::{partial_path, Layout};
use crate::download::plan::{MediaPlan, SegmentTemplate};
use crate::download::Fetch;
use crate::error::DownloadError;

/// Result of resolving one segment index.
#[derive(Debug)]
pub enum Step {
    CacheHit(PathBuf),
    Downloaded(PathBuf),
    /// The server has no segment at this index; the previous one was last.
    EndOfStream,
    Fatal(DownloadError),
}

/// Files fetched for one episode, index-aligned with segments 1..N.
#[derive(Debug)]
pub enum FetchOutcome {
    Complete(Vec<PathBuf>),
    /// Fetching stopped on an error; `segments` holds what was already on
    /// disk before it.
    Partial {
        segments: Vec<PathBuf>,
        error: DownloadError,
    },
}

impl FetchOutcome {
    pub fn segments(&self) -> &[PathBuf] {
        match self {
            FetchOutcome::Complete(segments) => segments,
            FetchOutcome::Partial { segments, .. } => segments,
        }
    }
}

pub struct SegmentFetcher<'a, F: ?Sized> {
    fetcher: &'a F,
    layout: &'a Layout,
}

impl<'a, F: Fetch + ?Sized> SegmentFetcher<'a, F> {
    pub fn new(fetcher: &'a F, layout: &'a Layout) -> Self {
        Self { fetcher, layout }
    }

    pub async fn fetch(&self, id: &str, plan: &MediaPlan) -> FetchOutcome {
        match plan {
            MediaPlan::SingleFile { url } => self.fetch_single(id, url).await,
            MediaPlan::Segmented { template } => self.fetch_segments(id, template).await,
        }
    }

    async fn fetch_single(&self, id: &str, url: &Url) -> FetchOutcome {
        let path = self.layout.single_file_path(id);

        match self.fetch_to(&path, url, 1).await {
            Ok(_) => FetchOutcome::Complete(vec![path]),
            Err(error) => FetchOutcome::Partial {
                segments: Vec::new(),
                error,
            },
        }
    }

    /// Probes ascending indices from 1 until the server answers not-found.
    /// Index `n + 1` is never requested before `n` is on disk.
    async fn fetch_segments(&self, id: &str, template: &SegmentTemplate) -> FetchOutcome {
        let mut segments = Vec::new();

        let folder = self.layout.segment_dir(id);
        if let Err(err) = tokio::fs::create_dir_all(&folder).await {
            return FetchOutcome::Partial {
                segments,
                error: DownloadError::filesystem(&folder, err),
            };
        }

        let mut downloaded = 0;
        let mut index = 1;

        loop {
            match self.step(id, template, index).await {
                Step::CacheHit(path) => {
                    tracing::debug!(id, index, "Segment already on disk");
                    segments.push(path);
                }
                Step::Downloaded(path) => {
                    tracing::debug!(id, index, "Segment downloaded");
                    downloaded += 1;
                    segments.push(path);
                }
                Step::EndOfStream => {
                    tracing::info!(
                        id,
                        total = segments.len(),
                        downloaded,
                        "Reached end of stream"
                    );
                    return FetchOutcome::Complete(segments);
                }
                Step::Fatal(error) => {
                    tracing::warn!(id, index, "Stopping segment download: {}", error);
                    return FetchOutcome::Partial { segments, error };
                }
            }
            index += 1;
        }
    }

    pub async fn step(&self, id: &str, template: &SegmentTemplate, index: u32) -> Step {
        let path = self.layout.segment_path(id, index);
        let url = match template.url(index) {
            Ok(url) => url,
            Err(err) => return Step::Fatal(err),
        };

        match self.fetch_to(&path, &url, index).await {
            Ok(true) => Step::CacheHit(path),
            Ok(false) => Step::Downloaded(path),
            Err(DownloadError::Transport(err)) if err.is_not_found() => Step::EndOfStream,
            Err(err) => Step::Fatal(err),
        }
    }

    /// Downloads `url` to `path` unless a non-empty file is already there.
    /// Returns whether the file was served from disk.
    async fn fetch_to(&self, path: &Path, url: &Url, index: u32) -> Result<bool, DownloadError> {
        if is_cached(path).await {
            return Ok(true);
        }

        let bytes = self.fetcher.fetch(url).await?;
        if bytes.is_empty() {
            return Err(DownloadError::EmptySegment { index });
        }

        store(path, &bytes).await?;
        Ok(false)
    }
}

/// A file counts as cached only when it exists and is non-empty; an empty
/// file is left over from an interrupted write.
pub async fn is_cached(path: &Path) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata.is_file() && metadata.len() > 0,
        Err(_) => false,
    }
}

async fn store(path: &Path, bytes: &[u8]) -> Result<(), DownloadError> {
    let partial = partial_path(path);

    tokio::fs::write(&partial, bytes)
        .await
        .map_err(|err| DownloadError::filesystem(&partial, err))?;
    tokio::fs::rename(&partial, path)
        .await
        .map_err(|err| DownloadError::filesystem(path, err))
}
