use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::catalog::CatalogEntry;
use crate::download::episode::{download_episode, EpisodeSettings};
use crate::download::Fetch;
use crate::error::DownloadError;

#[derive(Debug)]
pub struct EpisodeReport {
    pub id: String,
    pub title: String,
    pub result: Result<PathBuf, DownloadError>,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub episodes: Vec<EpisodeReport>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.episodes.iter().filter(|e| e.result.is_ok()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&EpisodeReport, &DownloadError)> {
        self.episodes
            .iter()
            .filter_map(|e| e.result.as_ref().err().map(|err| (e, err)))
    }

    pub fn log_summary(&self) {
        tracing::info!(
            succeeded = self.succeeded(),
            failed = self.episodes.len() - self.succeeded(),
            "Finished {} episode(s)",
            self.episodes.len()
        );
        for (episode, err) in self.failures() {
            tracing::error!(id = %episode.id, kind = err.kind(), "{}: {}", episode.title, err);
        }
    }
}

/// Downloads every entry, at most `parallel` at a time. A failing episode
/// never stops its siblings; the report keeps catalog order. Failures are
/// logged once, by `BatchReport::log_summary`.
pub async fn download_all<F: Fetch + 'static>(
    fetcher: Arc<F>,
    entries: Vec<CatalogEntry>,
    settings: Arc<EpisodeSettings>,
    parallel: usize,
) -> BatchReport {
    let semaphore = Arc::new(Semaphore::new(parallel.max(1)));
    let total = entries.len();

    let tasks = entries
        .into_iter()
        .enumerate()
        .map(|(position, entry)| {
            let fetcher = Arc::clone(&fetcher);
            let settings = Arc::clone(&settings);
            let semaphore = Arc::clone(&semaphore);
            let id = entry.id().to_string();
            let title = entry.title().to_string();

            let task = tokio::spawn(async move {
                let _permit = semaphore.acquire().await;
                tracing::info!(id = entry.id(), "[{}/{}] {}", position + 1, total, entry.title());
                download_episode(fetcher.as_ref(), &entry, &settings).await
            });
            (id, title, task)
        })
        .collect::<Vec<_>>();

    let mut report = BatchReport::default();
    for (id, title, task) in tasks {
        let result = match task.await {
            Ok(Ok(artifact)) => {
                tracing::info!(id = %id, "Saved {}", artifact.display());
                Ok(artifact)
            }
            Ok(Err(err)) => Err(err),
            Err(err) => Err(DownloadError::Task(err.to_string())),
        };
        report.episodes.push(EpisodeReport { id, title, result });
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use url::Url;

    use crate::download::descriptor::Markers;
    use crate::download::layout::Layout;
    use crate::download::plan::PlanRules;
    use crate::download::testing::{Reply, ScriptedFetcher};

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

    fn page(video: &str) -> Vec<u8> {
        format!(
            "<div data-broadcast='{{\"files\":[{{\"format\":\"mp4\",\"url\":\"{}\"}}]}}'></div>",
            video
        )
        .into_bytes()
    }

    #[tokio::test]
    async fn failed_episode_does_not_stop_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = ScriptedFetcher::new()
            .reply("http://www.tv5monde.com/ep/1", Reply::Owned(page("http://v.example.com/1.mp4")))
            .reply("http://v.example.com/1.mp4", Reply::Body(b"one"))
            .reply("http://www.tv5monde.com/ep/2", Reply::Unavailable)
            .reply("http://www.tv5monde.com/ep/3", Reply::Owned(page("http://v.example.com/3.mp4")))
            .reply("http://v.example.com/3.mp4", Reply::Body(b"three"));
        let entries = vec![
            CatalogEntry::new("One", "/ep/1", "/img/one.jpg", "", ""),
            CatalogEntry::new("Two", "/ep/2", "/img/two.jpg", "", ""),
            CatalogEntry::new("Three", "/ep/3", "/img/three.jpg", "", ""),
        ];

        let report = download_all(
            Arc::new(fetcher),
            entries,
            Arc::new(settings(dir.path())),
            2,
        )
        .await;

        let ids: Vec<_> = report.episodes.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["one", "two", "three"]);
        assert_eq!(report.succeeded(), 2);

        let failures: Vec<_> = report
            .failures()
            .map(|(episode, err)| (episode.id.as_str(), err.kind()))
            .collect();
        assert_eq!(failures, [("two", "transport")]);
        assert_eq!(std::fs::read(dir.path().join("three.mp4")).unwrap(), b"three");
    }
}
