use std::path::{Path, PathBuf};

use crate::download::INDEX_PLACEHOLDER;

/// Where an episode's files live under the destination directory. Segments
/// go to a per-episode folder so they never share a name with an artifact.
#[derive(Debug, Clone)]
pub struct Layout {
    pub destination: PathBuf,
    pub segment_file_template: String,
    pub segment_index_width: usize,
    pub single_file_extension: String,
    pub artifact_extension: String,
}

impl Layout {
    pub fn segment_dir(&self, id: &str) -> PathBuf {
        self.destination.join(format!("{}_segments", id))
    }

    pub fn segment_path(&self, id: &str, index: u32) -> PathBuf {
        let index = format!("{:0width$}", index, width = self.segment_index_width);
        let name = self
            .segment_file_template
            .replace("{id}", id)
            .replace(INDEX_PLACEHOLDER, &index);
        self.segment_dir(id).join(name)
    }

    pub fn single_file_path(&self, id: &str) -> PathBuf {
        self.destination
            .join(format!("{}.{}", id, self.single_file_extension))
    }

    pub fn lock_path(&self, id: &str) -> PathBuf {
        self.destination.join(format!("{}.lock", id))
    }
}

/// Sibling path a download is written to before being renamed into place.
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}
