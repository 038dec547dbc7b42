use std::path::Path;

use crate::catalog::{CatalogEntry, CatalogPage};
use crate::error::DownloadError;

/// Reads a catalog page saved to disk, e.g. `merci-professeur.json`, and
/// returns its entries. Only the `episodes` array is used.
pub fn load_entries(path: &Path) -> Result<Vec<CatalogEntry>, DownloadError> {
    let content = std::fs::read(path).map_err(|err| DownloadError::filesystem(path, err))?;
    let entries = CatalogPage::parse(1, &content)?.into_entries();

    tracing::info!("Read {} entries from {}", entries.len(), path.display());
    Ok(entries)
}
