use std::io;
use std::path::{Path, PathBuf};

use time::OffsetDateTime;
use tokio::fs::File;
use tracing::warn;
use walkdir::WalkDir;

const MEDIA_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "heic", "heif", "gif", "bmp", "tif", "tiff", "webp", "dng", "mp4", "mov",
];

/// One photo or video in the device library. The agent only ever reads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaItem {
    pub name: String,
    pub captured_at: OffsetDateTime,
    pub source: PathBuf,
}

impl MediaItem {
    pub async fn open(&self) -> io::Result<File> {
        File::open(&self.source).await
    }
}

pub trait MediaLibrary: Send + Sync {
    fn enumerate(&self) -> io::Result<Vec<MediaItem>>;
}

/// Library backed by a directory tree, e.g. a mounted DCIM folder.
///
/// Capture time is taken from the file modification time, which camera apps set
/// when the shot is written.
#[derive(Debug, Clone)]
pub struct DirectoryLibrary {
    root: PathBuf,
}

impl DirectoryLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl MediaLibrary for DirectoryLibrary {
    fn enumerate(&self) -> io::Result<Vec<MediaItem>> {
        let mut items = Vec::new();
        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()));
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                // An unreadable root means there is no library at all.
                Err(err) if err.depth() == 0 => return Err(io::Error::other(err)),
                Err(err) => {
                    warn!(path = ?err.path(), "skipping unreadable library entry: {err}");
                    continue;
                }
            };
            if !entry.file_type().is_file() || !is_media_file(entry.path()) {
                continue;
            }
            let modified = match entry
                .metadata()
                .map_err(io::Error::other)
                .and_then(|meta| meta.modified())
            {
                Ok(modified) => modified,
                Err(err) => {
                    warn!(path = %entry.path().display(), "skipping item without mtime: {err}");
                    continue;
                }
            };
            items.push(MediaItem {
                name: entry.file_name().to_string_lossy().into_owned(),
                captured_at: OffsetDateTime::from(modified),
                source: entry.into_path(),
            });
        }
        Ok(items)
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

fn is_media_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|ext| MEDIA_EXTENSIONS.contains(&ext.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};
    use tempfile::tempdir;
    use tokio::io::AsyncReadExt;

    fn write_with_mtime(path: &Path, bytes: &[u8], mtime: SystemTime) {
        std::fs::write(path, bytes).unwrap();
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(mtime).unwrap();
    }

    #[test]
    fn enumerates_media_files_recursively() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("2024/01");
        std::fs::create_dir_all(&nested).unwrap();
        let at = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        write_with_mtime(&dir.path().join("a.JPG"), b"a", at);
        write_with_mtime(&nested.join("b.heic"), b"b", at);
        write_with_mtime(&dir.path().join("notes.txt"), b"n", at);

        let mut items = DirectoryLibrary::new(dir.path()).enumerate().unwrap();
        items.sort_by(|a, b| a.name.cmp(&b.name));

        let names: Vec<_> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["a.JPG", "b.heic"]);
        assert_eq!(items[0].captured_at.unix_timestamp(), 1_700_000_000);
    }

    #[test]
    fn skips_hidden_files_and_directories() {
        let dir = tempdir().unwrap();
        let hidden = dir.path().join(".thumbnails");
        std::fs::create_dir_all(&hidden).unwrap();
        std::fs::write(hidden.join("t.jpg"), b"t").unwrap();
        std::fs::write(dir.path().join(".pending.jpg"), b"p").unwrap();
        std::fs::write(dir.path().join("shown.png"), b"s").unwrap();

        let items = DirectoryLibrary::new(dir.path()).enumerate().unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "shown.png");
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_subdirectory_is_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let locked = dir.path().join("locked");
        std::fs::create_dir_all(&locked).unwrap();
        std::fs::write(locked.join("hidden-away.jpg"), b"x").unwrap();
        std::fs::write(dir.path().join("visible.jpg"), b"v").unwrap();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();

        let result = DirectoryLibrary::new(dir.path()).enumerate();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();

        let names: Vec<_> = result.unwrap().into_iter().map(|i| i.name).collect();
        assert!(names.contains(&"visible.jpg".to_string()));
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(DirectoryLibrary::new(dir.path().join("absent")).enumerate().is_err());
    }

    #[tokio::test]
    async fn open_reads_source_bytes() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"pixels").unwrap();
        let item = DirectoryLibrary::new(dir.path()).enumerate().unwrap().remove(0);

        let mut buf = Vec::new();
        item.open().await.unwrap().read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"pixels");
    }
}
