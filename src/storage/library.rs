//! Media library handoff
//!
//! After a recording finalizes, the file is additionally copied into the
//! shared device media library. The save runs as a fire-and-forget
//! continuation: its outcome is logged, never surfaced to the caller, and
//! the output path has already been returned by then.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::utils::error::LibraryError;

/// Injected media library capability
#[async_trait]
pub trait MediaLibrary: Send + Sync {
    /// Persist a finalized video into the library.
    async fn save_video(&self, path: &Path) -> Result<(), LibraryError>;
}

/// Media library backed by a shared directory
pub struct FolderLibrary {
    root: PathBuf,
}

impl FolderLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl MediaLibrary for FolderLibrary {
    async fn save_video(&self, path: &Path) -> Result<(), LibraryError> {
        let file_name = path
            .file_name()
            .ok_or_else(|| LibraryError::InvalidPath(path.display().to_string()))?;

        tokio::fs::create_dir_all(&self.root).await?;
        let destination = self.root.join(file_name);
        let bytes = tokio::fs::copy(path, &destination).await?;

        tracing::info!(
            bytes,
            destination = %destination.display(),
            "Copied recording into media library"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_copies_the_file_into_the_library_root() {
        let source_dir = tempfile::tempdir().unwrap();
        let library_dir = tempfile::tempdir().unwrap();
        let source = source_dir.path().join("clip1.mp4");
        std::fs::write(&source, b"container bytes").unwrap();

        let library = FolderLibrary::new(library_dir.path().join("videos"));
        library.save_video(&source).await.unwrap();

        let copied = library_dir.path().join("videos").join("clip1.mp4");
        assert_eq!(std::fs::read(copied).unwrap(), b"container bytes");
    }

    #[tokio::test]
    async fn save_fails_on_missing_source() {
        let library_dir = tempfile::tempdir().unwrap();
        let library = FolderLibrary::new(library_dir.path());
        let missing = library_dir.path().join("nope.mp4");
        assert!(library.save_video(&missing).await.is_err());
    }
}
