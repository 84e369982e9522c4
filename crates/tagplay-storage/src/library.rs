//! Listing of the playable files under `MEDIA_PATH`.

use crate::error::StorageResult;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// The media directory the daemon plays from.
#[derive(Debug, Clone)]
pub struct MediaLibrary {
    root: PathBuf,
}

impl MediaLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Names of the regular files directly inside the media directory, sorted.
    ///
    /// A missing directory (unmounted USB stick, typo in `MEDIA_PATH`) yields
    /// an empty list and a warning.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the directory exists but cannot be read.
    pub async fn list_files(&self) -> StorageResult<Vec<String>> {
        if !tokio::fs::try_exists(&self.root).await.unwrap_or(false) {
            warn!("Media directory not found: {}", self.root.display());
            return Ok(Vec::new());
        }

        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            // Follows symlinks, so a link to a file counts as a file.
            let is_file = tokio::fs::metadata(entry.path())
                .await
                .map(|meta| meta.is_file())
                .unwrap_or(false);
            if is_file {
                files.push(entry.file_name().to_string_lossy().into_owned());
            }
        }

        files.sort();
        debug!("Found {} files in {}", files.len(), self.root.display());
        Ok(files)
    }

    /// Whether a media reference points at an existing file in the library.
    pub async fn contains(&self, media_reference: &str) -> bool {
        let reference = Path::new(media_reference.trim());
        if reference.as_os_str().is_empty() || reference.is_absolute() {
            return false;
        }

        tokio::fs::metadata(self.root.join(reference))
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn library_with(files: &[&str]) -> (TempDir, MediaLibrary) {
        let dir = TempDir::new().unwrap();
        for file in files {
            let path = dir.path().join(file);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, b"ID3").unwrap();
        }
        let library = MediaLibrary::new(dir.path());
        (dir, library)
    }

    #[tokio::test]
    async fn test_list_files_sorted_regular_files_only() {
        let (_dir, library) = library_with(&["owl.mp3", "fox.mp3", "stories/bear.mp3"]);

        let files = library.list_files().await.unwrap();
        assert_eq!(files, ["fox.mp3", "owl.mp3"]);
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        let library = MediaLibrary::new(dir.path().join("usb"));

        assert!(library.list_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_contains() {
        let (_dir, library) = library_with(&["stories/fox.mp3"]);

        assert!(library.contains("stories/fox.mp3").await);
        assert!(!library.contains("stories/owl.mp3").await);
        assert!(!library.contains("stories").await);
        assert!(!library.contains("/etc/passwd").await);
        assert!(!library.contains("").await);
    }
}
