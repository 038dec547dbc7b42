use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

use crate::catalog::CatalogEntry;
use crate::download::assemble::assemble;
use crate::download::descriptor::{self, Markers};
use crate::download::layout::Layout;
use crate::download::plan::{self, MediaPlan, PlanRules};
use crate::download::segment::{FetchOutcome, SegmentFetcher};
use crate::download::Fetch;
use crate::error::DownloadError;

/// Everything needed to turn one catalog entry into a video file.
#[derive(Debug, Clone)]
pub struct EpisodeSettings {
    pub origin: Url,
    pub markers: Markers,
    pub rules: PlanRules,
    pub layout: Layout,
    pub deadline: Option<Duration>,
    /// Assemble whatever was fetched when a segmented download fails midway.
    pub allow_partial: bool,
}

/// Exclusive claim on an (episode, destination) pair, released on drop.
struct EpisodeLock {
    path: PathBuf,
}

impl EpisodeLock {
    fn acquire(path: PathBuf) -> Result<Self, DownloadError> {
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Self { path }),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(DownloadError::Locked { path })
            }
            Err(err) => Err(DownloadError::filesystem(path, err)),
        }
    }
}

impl Drop for EpisodeLock {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            tracing::warn!("Error removing lock {}: {}", self.path.display(), err);
        }
    }
}

/// Resolves, fetches and assembles one episode. Returns the artifact path.
pub async fn download_episode<F: Fetch + ?Sized>(
    fetcher: &F,
    entry: &CatalogEntry,
    settings: &EpisodeSettings,
) -> Result<PathBuf, DownloadError> {
    let destination = &settings.layout.destination;
    std::fs::create_dir_all(destination)
        .map_err(|err| DownloadError::filesystem(destination, err))?;

    let _lock = EpisodeLock::acquire(settings.layout.lock_path(entry.id()))?;

    tracing::info!(id = entry.id(), "Downloading {}", entry.title());

    match settings.deadline {
        Some(after) => tokio::time::timeout(after, run(fetcher, entry, settings))
            .await
            .map_err(|_| DownloadError::DeadlineExceeded { after })?,
        None => run(fetcher, entry, settings).await,
    }
}

async fn run<F: Fetch + ?Sized>(
    fetcher: &F,
    entry: &CatalogEntry,
    settings: &EpisodeSettings,
) -> Result<PathBuf, DownloadError> {
    let id = entry.id();
    let page_url = entry.page_url(&settings.origin)?;

    let descriptor = descriptor::resolve(fetcher, &page_url, &settings.markers).await?;
    let plan = plan::build(&descriptor, &settings.rules)?;

    let outcome = SegmentFetcher::new(fetcher, &settings.layout)
        .fetch(id, &plan)
        .await;
    tracing::debug!(id, fetched = outcome.segments().len(), "Fetch finished");

    let segments = match outcome {
        FetchOutcome::Complete(segments) => segments,
        FetchOutcome::Partial { segments, error }
            if settings.allow_partial && !segments.is_empty() =>
        {
            tracing::warn!(
                id,
                kept = segments.len(),
                "Assembling partial download after: {}",
                error
            );
            segments
        }
        FetchOutcome::Partial { error, .. } => return Err(error),
    };

    if segments.is_empty() {
        return Err(DownloadError::EmptyStream);
    }

    let extension = match plan {
        MediaPlan::SingleFile { .. } => &settings.layout.single_file_extension,
        MediaPlan::Segmented { .. } => &settings.layout.artifact_extension,
    };

    assemble(id, &segments, &settings.layout.destination, extension)
}

/// Shortcut for a detail page that is not part of a fetched catalog. The
/// entry has no poster, so its id is derived from the page path.
pub fn entry_for_page(page: &str) -> CatalogEntry {
    let title = Path::new(page.trim_end_matches('/'))
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| page.to_string());
    CatalogEntry::new(title, page, "", "", "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::testing::{Reply, ScriptedFetcher};
    use crate::error::TransportError;
    use async_trait::async_trait;
    use bytes::Bytes;

    const PAGE_URL: &str = "http://www.tv5monde.com/emissions/ep-12";
    const SEGMENTED_PAGE: &str = r#"<html>
<div data-broadcast='{"files":[{"format":"m3u8","url":"http://hls.example.com/ep12/master.m3u8"}]}'></div>
</html>"#;
    const PROGRESSIVE_PAGE: &str = r#"<html>
<div data-broadcast='{"files":[{"format":"mp4","url":"http://v.example.com/ep12.mp4"}]}'></div>
</html>"#;

    fn segment_url(index: u32) -> String {
        format!("http://hls.example.com/ep12/segment{}_3_av.ts?null=0", index)
    }

    fn settings(destination: &Path) -> EpisodeSettings {
        EpisodeSettings {
            origin: Url::parse("http://www.tv5monde.com").unwrap(),
            markers: Markers {
                start: "data-broadcast='".to_string(),
                end: "'".to_string(),
            },
            rules: PlanRules {
                manifest_token: "master.m3u8".to_string(),
                segment_url_template: "segment{index}_3_av.ts?null=0".to_string(),
            },
            layout: Layout {
                destination: destination.to_path_buf(),
                segment_file_template: "{id}_{index}.ts".to_string(),
                segment_index_width: 0,
                single_file_extension: "mp4".to_string(),
                artifact_extension: "ts".to_string(),
            },
            deadline: None,
            allow_partial: false,
        }
    }

    fn entry() -> CatalogEntry {
        CatalogEntry::new("Les accents", "/emissions/ep-12", "/img/ep12.jpg", "", "")
    }

    fn segmented_site() -> ScriptedFetcher {
        ScriptedFetcher::new()
            .reply(PAGE_URL, Reply::Body(SEGMENTED_PAGE.as_bytes()))
            .reply(&segment_url(1), Reply::Body(b"AA"))
            .reply(&segment_url(2), Reply::Body(b"BB"))
            .reply(&segment_url(3), Reply::Body(b"C"))
    }

    #[tokio::test]
    async fn segmented_episode_is_concatenated() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = segmented_site();

        let artifact = download_episode(&fetcher, &entry(), &settings(dir.path()))
            .await
            .unwrap();

        assert_eq!(artifact, dir.path().join("ep12.ts"));
        assert_eq!(std::fs::read(&artifact).unwrap(), b"AABBC");
        assert!(!dir.path().join("ep12.lock").exists());
        assert_eq!(
            std::fs::read(dir.path().join("ep12_segments").join("ep12_3.ts")).unwrap(),
            b"C"
        );
    }

    #[tokio::test]
    async fn artifact_does_not_overwrite_another_episodes_segment() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        let short = CatalogEntry::new("Court", "/emissions/ep-12", "/img/ep.jpg", "", "");
        let long = CatalogEntry::new("Long", "/emissions/ep-12", "/img/ep_1.jpg", "", "");

        download_episode(&segmented_site(), &short, &settings).await.unwrap();
        download_episode(&segmented_site(), &long, &settings).await.unwrap();

        assert_eq!(std::fs::read(dir.path().join("ep_1.ts")).unwrap(), b"AABBC");
        assert_eq!(
            std::fs::read(settings.layout.segment_path("ep", 1)).unwrap(),
            b"AA"
        );
    }

    #[tokio::test]
    async fn second_run_reuses_segments() {
        let dir = tempfile::tempdir().unwrap();
        download_episode(&segmented_site(), &entry(), &settings(dir.path()))
            .await
            .unwrap();

        let fetcher = segmented_site();
        let artifact = download_episode(&fetcher, &entry(), &settings(dir.path()))
            .await
            .unwrap();

        assert_eq!(fetcher.requests(), [PAGE_URL.to_string(), segment_url(4)]);
        assert_eq!(std::fs::read(&artifact).unwrap(), b"AABBC");
    }

    #[tokio::test]
    async fn progressive_episode_is_written_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = ScriptedFetcher::new()
            .reply(PAGE_URL, Reply::Body(PROGRESSIVE_PAGE.as_bytes()))
            .reply("http://v.example.com/ep12.mp4", Reply::Body(b"mp4 bytes"));

        let artifact = download_episode(&fetcher, &entry(), &settings(dir.path()))
            .await
            .unwrap();

        assert_eq!(artifact, dir.path().join("ep12.mp4"));
        assert_eq!(std::fs::read(&artifact).unwrap(), b"mp4 bytes");
    }

    #[tokio::test]
    async fn locked_episode_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ep12.lock"), b"").unwrap();
        let fetcher = segmented_site();

        let err = download_episode(&fetcher, &entry(), &settings(dir.path()))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "locked");
        assert!(fetcher.requests().is_empty());
        assert!(dir.path().join("ep12.lock").exists());
    }

    #[tokio::test]
    async fn stream_without_segments_fails() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher =
            ScriptedFetcher::new().reply(PAGE_URL, Reply::Body(SEGMENTED_PAGE.as_bytes()));

        let err = download_episode(&fetcher, &entry(), &settings(dir.path()))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "empty-stream");
    }

    #[tokio::test]
    async fn partial_download_fails_unless_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let broken_site = || {
            ScriptedFetcher::new()
                .reply(PAGE_URL, Reply::Body(SEGMENTED_PAGE.as_bytes()))
                .reply(&segment_url(1), Reply::Body(b"AA"))
                .reply(&segment_url(2), Reply::Unavailable)
        };

        let err = download_episode(&broken_site(), &entry(), &settings(dir.path()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "transport");
        assert!(!dir.path().join("ep12.ts").exists());

        let mut lenient = settings(dir.path());
        lenient.allow_partial = true;
        let artifact = download_episode(&broken_site(), &entry(), &lenient)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&artifact).unwrap(), b"AA");
    }

    struct StalledFetcher;

    #[async_trait]
    impl Fetch for StalledFetcher {
        async fn fetch(&self, url: &Url) -> Result<Bytes, TransportError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Err(TransportError::NotFound { url: url.clone() })
        }
    }

    #[tokio::test]
    async fn deadline_bounds_the_episode() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(dir.path());
        settings.deadline = Some(Duration::from_millis(20));

        let err = download_episode(&StalledFetcher, &entry(), &settings)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "deadline");
        assert!(!dir.path().join("ep12.lock").exists());
    }

    #[test]
    fn standalone_page_uses_hashed_id() {
        let entry = entry_for_page("/emissions/merci-professeur/ep-12");

        assert_eq!(entry.title(), "ep-12");
        assert_eq!(
            entry.id(),
            crate::catalog::identity::fallback_id("/emissions/merci-professeur/ep-12")
        );
    }
}
