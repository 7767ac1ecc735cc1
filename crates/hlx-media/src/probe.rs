//! Source clip availability checks.

use std::path::Path;

use tokio::fs;

use crate::error::{MediaError, MediaResult};

/// Check that a source clip exists, is a regular file and can be opened.
pub async fn check_source(path: impl AsRef<Path>) -> MediaResult<()> {
    let path = path.as_ref();

    let meta = fs::metadata(path)
        .await
        .map_err(|e| MediaError::source_unavailable(path, e.to_string()))?;

    if !meta.is_file() {
        return Err(MediaError::source_unavailable(path, "not a regular file"));
    }

    fs::File::open(path)
        .await
        .map_err(|e| MediaError::source_unavailable(path, e.to_string()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_existing_file_is_available() {
        let dir = tempfile::tempdir().unwrap();
        let clip = dir.path().join("clip.mp4");
        fs::write(&clip, b"video").await.unwrap();

        assert!(check_source(&clip).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = check_source(dir.path().join("nope.mp4")).await.unwrap_err();
        assert!(matches!(err, MediaError::SourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_directory_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = check_source(dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("not a regular file"));
    }
}
