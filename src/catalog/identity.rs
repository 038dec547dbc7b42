//! Stable, file-system-safe identifiers for catalog entries.

use sha2::{Digest, Sha256};
use url::Url;

/// Length of the hexadecimal fallback id.
pub const FALLBACK_ID_LEN: usize = 32;

/// Derives the id of an entry from its poster reference, falling back to a
/// hash of the detail-page path when the poster yields nothing usable.
pub fn entry_id(poster_ref: &str, detail_page_ref: &str) -> String {
    poster_stem(poster_ref)
        .map(sanitize)
        .filter(|id| !id.is_empty() && id != "." && id != "..")
        .unwrap_or_else(|| fallback_id(detail_page_ref))
}

/// Basename of the poster reference without its last extension.
fn poster_stem(poster_ref: &str) -> Option<&str> {
    let path = strip_query(poster_ref.trim());
    let name = path.rsplit('/').next().unwrap_or(path);

    let stem = match name.rfind('.') {
        Some(0) | None => name,
        Some(dot) => &name[..dot],
    };

    if stem.is_empty() {
        None
    } else {
        Some(stem)
    }
}

fn strip_query(reference: &str) -> &str {
    match reference.find(['?', '#']) {
        Some(end) => &reference[..end],
        None => reference,
    }
}

/// Percent-encodes the characters a file name cannot hold, and `%` itself,
/// so distinct stems stay distinct.
fn sanitize(stem: &str) -> String {
    let mut id = String::with_capacity(stem.len());
    for c in stem.chars() {
        if is_unsafe(c) {
            let mut buf = [0; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                id.push_str(&format!("%{:02X}", byte));
            }
        } else {
            id.push(c);
        }
    }
    id
}

fn is_unsafe(c: char) -> bool {
    c.is_control() || matches!(c, '%' | '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|')
}

/// Hex digest of the detail-page path with any scheme and host removed, so
/// absolute and origin-relative references to the same page agree.
pub fn fallback_id(detail_page_ref: &str) -> String {
    let path = match Url::parse(detail_page_ref) {
        Ok(url) => match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        },
        Err(_) => detail_page_ref.to_string(),
    };

    let digest = Sha256::digest(path.as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(FALLBACK_ID_LEN);
    id
}
