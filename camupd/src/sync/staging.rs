use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tokio::io::AsyncWriteExt;

use super::media::MediaItem;

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("item name cannot be used as a file name: {0}")]
    InvalidName(String),
}

/// Directory holding the one transient copy that is being uploaded.
#[derive(Debug, Clone)]
pub struct WorkingDir {
    root: PathBuf,
}

impl WorkingDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Creates the directory and removes copies left by a run that was killed
    /// mid-item. Returns the number of leftovers removed.
    pub async fn prepare(&self) -> io::Result<usize> {
        tokio::fs::create_dir_all(&self.root).await?;
        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                tokio::fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub async fn stage(&self, item: &MediaItem) -> Result<StagedFile, StagingError> {
        let target = staged_path_for(&self.root, &item.name)?;
        let mut source = item.open().await?;
        tokio::fs::create_dir_all(&self.root).await?;
        // From here on the guard owns the path, so a failed copy still cleans up.
        let staged = StagedFile {
            path: target,
            armed: true,
        };
        let mut file = tokio::fs::File::create(&staged.path).await?;
        tokio::io::copy(&mut source, &mut file).await?;
        file.flush().await?;
        file.sync_all().await?;
        Ok(staged)
    }

    pub async fn is_empty(&self) -> io::Result<bool> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(true),
            Err(err) => return Err(err),
        };
        Ok(entries.next_entry().await?.is_none())
    }
}

/// A staged copy of one media item. Removed by `discard`, or on drop if the
/// upload step bailed out early.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    armed: bool,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn discard(mut self) -> io::Result<()> {
        self.armed = false;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

fn staged_path_for(root: &Path, name: &str) -> Result<PathBuf, StagingError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) => Ok(root.join(part)),
        _ => Err(StagingError::InvalidName(name.to_string())),
    }
}
