pub mod identity;

use serde::Deserialize;
use url::Url;

use crate::download::Fetch;
use crate::error::DownloadError;

/// One episode as listed by the catalog. Immutable once built; the id is
/// derived up front from the poster and detail-page references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    id: String,
    title: String,
    detail_page_ref: String,
    poster_ref: String,
    broadcast_date: String,
    duration: String,
}

impl CatalogEntry {
    pub fn new(
        title: impl Into<String>,
        detail_page_ref: impl Into<String>,
        poster_ref: impl Into<String>,
        broadcast_date: impl Into<String>,
        duration: impl Into<String>,
    ) -> Self {
        let detail_page_ref = detail_page_ref.into();
        let poster_ref = poster_ref.into();
        let id = identity::entry_id(&poster_ref, &detail_page_ref);

        Self {
            id,
            title: title.into(),
            detail_page_ref,
            poster_ref,
            broadcast_date: broadcast_date.into(),
            duration: duration.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn detail_page_ref(&self) -> &str {
        &self.detail_page_ref
    }

    pub fn poster_ref(&self) -> &str {
        &self.poster_ref
    }

    pub fn broadcast_date(&self) -> &str {
        &self.broadcast_date
    }

    pub fn duration(&self) -> &str {
        &self.duration
    }

    /// Absolute URL of the detail page, resolved against `origin`.
    pub fn page_url(&self, origin: &Url) -> Result<Url, DownloadError> {
        origin
            .join(&self.detail_page_ref)
            .map_err(|source| DownloadError::InvalidUrl {
                url: self.detail_page_ref.clone(),
                source,
            })
    }
}

/// Episode record as it appears in a catalog page.
#[derive(Deserialize, Debug)]
pub struct EntryRecord {
    title: String,
    url: String,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    duration: Option<String>,
}

impl From<EntryRecord> for CatalogEntry {
    fn from(record: EntryRecord) -> Self {
        CatalogEntry::new(
            record.title,
            record.url,
            record.image.unwrap_or_default(),
            record.date.unwrap_or_default(),
            record.duration.unwrap_or_default(),
        )
    }
}

#[derive(Deserialize, Debug)]
pub struct CatalogPage {
    /// Total page count. Required on live pages, absent in saved files.
    #[serde(rename = "numPages", default)]
    pub num_pages: Option<u32>,
    #[serde(default)]
    pub episodes: Vec<EntryRecord>,
}

impl CatalogPage {
    pub fn parse(page: u32, body: &[u8]) -> Result<Self, DownloadError> {
        serde_json::from_slice(body).map_err(|err| DownloadError::CatalogMalformed {
            page,
            reason: err.to_string(),
        })
    }

    pub fn into_entries(self) -> Vec<CatalogEntry> {
        self.episodes.into_iter().map(CatalogEntry::from).collect()
    }
}

/// URL of catalog page `page`: the page parameter is replaced in place when
/// `base` already carries it and appended otherwise.
pub fn page_url(base: &Url, param: &str, page: u32) -> Url {
    let page = page.to_string();
    let mut replaced = false;
    let pairs: Vec<(String, String)> = base
        .query_pairs()
        .map(|(key, value)| {
            if key == param && !replaced {
                replaced = true;
                (key.into_owned(), page.clone())
            } else {
                (key.into_owned(), value.into_owned())
            }
        })
        .collect();

    let mut url = base.clone();
    {
        let mut query = url.query_pairs_mut();
        query.clear();
        for (key, value) in &pairs {
            query.append_pair(key, value);
        }
        if !replaced {
            query.append_pair(param, &page);
        }
    }
    url
}

/// Walks every page of the catalog behind `base` and returns its entries in
/// page order, then position order. Any page failure aborts the walk.
pub async fn enumerate<F: Fetch + ?Sized>(
    fetcher: &F,
    base: &Url,
    page_param: &str,
) -> Result<Vec<CatalogEntry>, DownloadError> {
    let first = fetcher.fetch(&page_url(base, page_param, 1)).await?;
    let first = CatalogPage::parse(1, &first)?;
    let total_pages = first
        .num_pages
        .ok_or_else(|| DownloadError::CatalogMalformed {
            page: 1,
            reason: "missing numPages".to_string(),
        })?
        .max(1);

    tracing::info!(total_pages, "Enumerating catalog {}", base);

    let mut entries = first.into_entries();
    for page in 2..=total_pages {
        let body = fetcher.fetch(&page_url(base, page_param, page)).await?;
        let page_entries = CatalogPage::parse(page, &body)?.into_entries();
        tracing::debug!(page, count = page_entries.len(), "Catalog page decoded");
        entries.extend(page_entries);
    }

    tracing::info!(count = entries.len(), "Catalog enumerated");
    Ok(entries)
}
