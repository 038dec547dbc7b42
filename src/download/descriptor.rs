//! Extraction of the stream descriptor embedded in an episode's detail page.

use serde::Deserialize;
use url::Url;

use crate::download::Fetch;
use crate::error::DownloadError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamFormat {
    #[serde(alias = "mp4")]
    Progressive,
    #[serde(alias = "m3u8", alias = "hls")]
    Segmented,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamFile {
    pub format: StreamFormat,
    pub url: String,
}

/// Decoded descriptor. `files` is never empty once returned by [`parse`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamDescriptor {
    pub files: Vec<StreamFile>,
}

impl StreamDescriptor {
    /// The file whose format decides how the whole stream is downloaded.
    pub fn primary(&self) -> Option<&StreamFile> {
        self.files.first()
    }
}

/// Tokens delimiting the descriptor payload inside the page.
#[derive(Debug, Clone)]
pub struct Markers {
    pub start: String,
    pub end: String,
}

/// Fetches the detail page and extracts its descriptor. A page that cannot be
/// fetched surfaces as a transport error, a page without a decodable
/// descriptor as [`DownloadError::DescriptorMalformed`].
pub async fn resolve<F: Fetch + ?Sized>(
    fetcher: &F,
    page_url: &Url,
    markers: &Markers,
) -> Result<StreamDescriptor, DownloadError> {
    let body = fetcher.fetch(page_url).await?;
    let html = String::from_utf8_lossy(&body);

    let descriptor = parse(&html, markers)?;
    tracing::debug!(
        url = %page_url,
        files = descriptor.files.len(),
        "Resolved stream descriptor"
    );
    Ok(descriptor)
}

pub fn parse(html: &str, markers: &Markers) -> Result<StreamDescriptor, DownloadError> {
    let payload = extract_payload(html, markers)?;
    let payload = unescape_html(payload);

    let descriptor: StreamDescriptor = serde_json::from_str(&payload)
        .map_err(|err| DownloadError::DescriptorMalformed(format!("payload: {}", err)))?;

    if descriptor.files.is_empty() {
        return Err(DownloadError::DescriptorMalformed(
            "descriptor lists no files".to_string(),
        ));
    }

    Ok(descriptor)
}

fn extract_payload<'a>(html: &'a str, markers: &Markers) -> Result<&'a str, DownloadError> {
    let line = html
        .lines()
        .find(|line| line.contains(&markers.start))
        .ok_or_else(|| {
            DownloadError::DescriptorMalformed(format!("marker {:?} not found", markers.start))
        })?;

    let start = line.find(&markers.start).unwrap_or_default() + markers.start.len();
    let rest = &line[start..];
    let end = rest.find(&markers.end).ok_or_else(|| {
        DownloadError::DescriptorMalformed(format!("closing marker {:?} not found", markers.end))
    })?;

    Ok(&rest[..end])
}

fn unescape_html(payload: &str) -> String {
    payload
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
