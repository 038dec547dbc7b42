use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::download::descriptor::Markers;
use crate::download::episode::EpisodeSettings;
use crate::download::layout::Layout;
use crate::download::plan::PlanRules;
use crate::download::{INDEX_PLACEHOLDER, RetryPolicy};

pub const DEFAULT_CONFIG_FILE: &str = "episode_downloader.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Origin that relative detail-page references are joined onto.
    pub origin: String,
    pub user_agent: String,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    /// Per-request timeout in seconds, 0 for none. A timed out request
    /// counts as a failed attempt.
    pub request_timeout_secs: u64,
    pub destination: PathBuf,
    /// Query parameter carrying the catalog page number.
    pub page_param: String,
    pub descriptor_start: String,
    pub descriptor_end: String,
    pub manifest_token: String,
    /// Per-segment file name appended after the manifest's directory.
    pub segment_url_template: String,
    pub segment_file_template: String,
    /// Zero-pad segment indices in file names to this width, 0 for none.
    pub segment_index_width: usize,
    pub single_file_extension: String,
    pub artifact_extension: String,
    /// Maximum number of episodes downloaded at the same time.
    pub parallel: usize,
    pub episode_deadline_secs: u64,
    pub allow_partial: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            origin: "http://www.tv5monde.com".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; rv:78.0) Gecko/20100101 Firefox/78.0"
                .to_string(),
            max_attempts: 3,
            retry_delay_ms: 1000,
            request_timeout_secs: 60,
            destination: PathBuf::from("videos"),
            page_param: "page".to_string(),
            descriptor_start: "data-broadcast='".to_string(),
            descriptor_end: "'".to_string(),
            manifest_token: "master.m3u8".to_string(),
            segment_url_template: format!("segment{INDEX_PLACEHOLDER}_3_av.ts?null=0"),
            segment_file_template: format!("{{id}}_{INDEX_PLACEHOLDER}.ts"),
            segment_index_width: 0,
            single_file_extension: "mp4".to_string(),
            artifact_extension: "ts".to_string(),
            parallel: 4,
            episode_deadline_secs: 7200,
            allow_partial: false,
        }
    }
}

impl Options {
    /// Reads options from `path`, or from the default config file when it
    /// exists, or falls back to the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let options: Options = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        tracing::debug!("Loaded options from {:?}", path);
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            bail!("max_attempts must be at least 1");
        }
        if self.parallel == 0 {
            bail!("parallel must be at least 1");
        }
        if self.descriptor_start.is_empty() || self.descriptor_end.is_empty() {
            bail!("descriptor markers must not be empty");
        }
        if self.manifest_token.is_empty() {
            bail!("manifest_token must not be empty");
        }
        if self.segment_url_template.matches(INDEX_PLACEHOLDER).count() != 1 {
            bail!("segment_url_template needs exactly one {INDEX_PLACEHOLDER}");
        }
        if !self.segment_file_template.contains(INDEX_PLACEHOLDER)
            || !self.segment_file_template.contains("{id}")
        {
            bail!("segment_file_template needs both {{id}} and {INDEX_PLACEHOLDER}");
        }
        if self.segment_file_template.contains(['/', '\\']) {
            bail!("segment_file_template must be a plain file name");
        }
        for extension in [&self.single_file_extension, &self.artifact_extension] {
            if extension.is_empty() || !extension.chars().all(|c| c.is_ascii_alphanumeric()) {
                bail!("Invalid file extension {:?}", extension);
            }
            if matches!(extension.as_str(), "lock" | "part") {
                bail!("File extension {:?} is reserved", extension);
            }
        }
        url::Url::parse(&self.origin).with_context(|| format!("Invalid origin {}", self.origin))?;
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        match self.request_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn markers(&self) -> Markers {
        Markers {
            start: self.descriptor_start.clone(),
            end: self.descriptor_end.clone(),
        }
    }

    pub fn layout(&self) -> Layout {
        Layout {
            destination: self.destination.clone(),
            segment_file_template: self.segment_file_template.clone(),
            segment_index_width: self.segment_index_width,
            single_file_extension: self.single_file_extension.clone(),
            artifact_extension: self.artifact_extension.clone(),
        }
    }

    pub fn plan_rules(&self) -> PlanRules {
        PlanRules {
            manifest_token: self.manifest_token.clone(),
            segment_url_template: self.segment_url_template.clone(),
        }
    }

    pub fn episode_deadline(&self) -> Option<Duration> {
        match self.episode_deadline_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn episode_settings(&self) -> Result<EpisodeSettings> {
        Ok(EpisodeSettings {
            origin: url::Url::parse(&self.origin)
                .with_context(|| format!("Invalid origin {}", self.origin))?,
            markers: self.markers(),
            rules: self.plan_rules(),
            layout: self.layout(),
            deadline: self.episode_deadline(),
            allow_partial: self.allow_partial,
        })
    }
}
