use url::Url;

use crate::download::descriptor::{StreamDescriptor, StreamFormat};
use crate::download::INDEX_PLACEHOLDER;
use crate::error::DownloadError;

/// How an episode's media is fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaPlan {
    /// One progressive file at a direct URL.
    SingleFile { url: Url },
    /// Numbered segments built from a URL template.
    Segmented { template: SegmentTemplate },
}

/// URL template with a single 1-based segment index placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentTemplate {
    template: String,
}

impl SegmentTemplate {
    pub fn as_str(&self) -> &str {
        &self.template
    }

    pub fn url(&self, index: u32) -> Result<Url, DownloadError> {
        let url = self.template.replacen(INDEX_PLACEHOLDER, &index.to_string(), 1);
        Url::parse(&url).map_err(|source| DownloadError::InvalidUrl { url, source })
    }
}

/// Rules for deriving segment URLs from a manifest URL.
#[derive(Debug, Clone)]
pub struct PlanRules {
    pub manifest_token: String,
    pub segment_url_template: String,
}

/// Picks the download mode from the descriptor's first file.
pub fn build(descriptor: &StreamDescriptor, rules: &PlanRules) -> Result<MediaPlan, DownloadError> {
    let file = descriptor
        .primary()
        .ok_or_else(|| DownloadError::PlanUnbuildable("descriptor lists no files".to_string()))?;

    match file.format {
        StreamFormat::Progressive => {
            let url = Url::parse(&file.url).map_err(|source| DownloadError::InvalidUrl {
                url: file.url.clone(),
                source,
            })?;
            Ok(MediaPlan::SingleFile { url })
        }
        StreamFormat::Segmented => {
            if rules.segment_url_template.matches(INDEX_PLACEHOLDER).count() != 1 {
                return Err(DownloadError::PlanUnbuildable(format!(
                    "segment template {:?} needs exactly one {}",
                    rules.segment_url_template, INDEX_PLACEHOLDER
                )));
            }

            let token = file.url.find(&rules.manifest_token).ok_or_else(|| {
                DownloadError::PlanUnbuildable(format!(
                    "manifest token {:?} not found in {}",
                    rules.manifest_token, file.url
                ))
            })?;

            let template = SegmentTemplate {
                template: format!("{}{}", &file.url[..token], rules.segment_url_template),
            };
            template.url(1)?;

            Ok(MediaPlan::Segmented { template })
        }
    }
}
