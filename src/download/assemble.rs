use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::DownloadError;

/// Concatenates `segments` in order into `<destination>/<id>.<extension>`.
///
/// A lone segment that already sits at that path is returned as is. Any
/// existing artifact is truncated and rewritten, so re-running with the same
/// segments produces the same file.
pub fn assemble(
    id: &str,
    segments: &[PathBuf],
    destination: &Path,
    extension: &str,
) -> Result<PathBuf, DownloadError> {
    let artifact = destination.join(format!("{}.{}", id, extension));

    if let [only] = segments {
        if *only == artifact {
            return Ok(artifact);
        }
    }

    let file = File::create(&artifact).map_err(|err| DownloadError::filesystem(&artifact, err))?;
    let mut writer = BufWriter::new(file);

    for segment in segments {
        let segment_file =
            File::open(segment).map_err(|err| DownloadError::filesystem(segment, err))?;
        let mut content = BufReader::new(segment_file);
        std::io::copy(&mut content, &mut writer)
            .map_err(|err| DownloadError::filesystem(&artifact, err))?;
    }

    writer
        .flush()
        .map_err(|err| DownloadError::filesystem(&artifact, err))?;

    tracing::info!(id, segments = segments.len(), "Assembled {}", artifact.display());
    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_segments(dir: &Path, count: u8) -> Vec<PathBuf> {
        (1..=count)
            .map(|index| {
                let path = dir.join(format!("ep_{}.ts", index));
                std::fs::write(&path, [index]).unwrap();
                path
            })
            .collect()
    }

    #[test]
    fn concatenates_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let segments = write_segments(dir.path(), 5);

        let artifact = assemble("ep", &segments, dir.path(), "ts").unwrap();

        assert_eq!(artifact, dir.path().join("ep.ts"));
        assert_eq!(std::fs::read(&artifact).unwrap(), [1, 2, 3, 4, 5]);
    }

    #[test]
    fn rerun_rewrites_instead_of_appending() {
        let dir = tempfile::tempdir().unwrap();
        let segments = write_segments(dir.path(), 3);

        assemble("ep", &segments, dir.path(), "ts").unwrap();
        let artifact = assemble("ep", &segments, dir.path(), "ts").unwrap();

        assert_eq!(std::fs::read(&artifact).unwrap(), [1, 2, 3]);
    }

    #[test]
    fn single_file_in_place_is_passed_through() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("ep.mp4");
        std::fs::write(&video, b"progressive").unwrap();

        let artifact = assemble("ep", &[video.clone()], dir.path(), "mp4").unwrap();

        assert_eq!(artifact, video);
        assert_eq!(std::fs::read(&artifact).unwrap(), b"progressive");
    }

    #[test]
    fn missing_segment_is_a_filesystem_error() {
        let dir = tempfile::tempdir().unwrap();
        let segments = vec![dir.path().join("absent.ts")];

        let err = assemble("ep", &segments, dir.path(), "ts").unwrap_err();

        assert_eq!(err.kind(), "filesystem");
    }
}
