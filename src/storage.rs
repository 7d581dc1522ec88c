use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};
use tokio::fs;
use tokio::io::ErrorKind;

/// Sandboxed view of the upload root. All file identifiers resolve to paths
/// strictly inside `root`; traversal and symlink escapes are rejected.
#[derive(Clone, Debug)]
pub struct UploadRoot {
    root: PathBuf,
}

impl UploadRoot {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub async fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// Resolves a request-supplied identifier to an absolute path under the
    /// root. With `allow_missing_leaf` the final component may not exist yet
    /// (upload targets); every existing component must be a non-symlink.
    pub async fn resolve_entry(
        &self,
        relative: &str,
        allow_missing_leaf: bool,
    ) -> Result<PathBuf, StorageError> {
        let target = self.root.join(normalize_relative(relative)?);
        self.reject_symlink_components(&target, allow_missing_leaf)
            .await?;
        Ok(target)
    }

    async fn reject_symlink_components(
        &self,
        target: &Path,
        allow_missing_leaf: bool,
    ) -> Result<(), StorageError> {
        let relative = target
            .strip_prefix(&self.root)
            .map_err(|_| StorageError::InvalidPath)?;
        let mut current = self.root.clone();
        let mut components = relative.components().peekable();

        while let Some(component) = components.next() {
            current.push(component.as_os_str());
            match fs::symlink_metadata(&current).await {
                Ok(metadata) => {
                    if metadata.file_type().is_symlink() {
                        return Err(StorageError::InvalidPath);
                    }
                    if components.peek().is_some() && !metadata.is_dir() {
                        return Err(StorageError::InvalidPath);
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound && allow_missing_leaf => {
                    return Ok(());
                }
                Err(err) => return Err(StorageError::Io(err)),
            }
        }

        Ok(())
    }

    /// Lists a directory under the root, directories first.
    pub async fn list_dir(&self, relative: Option<&str>) -> Result<Vec<DirEntry>, StorageError> {
        let target = match relative {
            Some(path) => self.resolve_entry(path, false).await?,
            None => self.root.clone(),
        };
        let mut dir = fs::read_dir(&target).await?;
        let mut entries = Vec::new();

        while let Some(entry) = dir.next_entry().await? {
            let metadata = entry.metadata().await?;
            let name = entry.file_name().to_string_lossy().to_string();
            let relative_path = entry
                .path()
                .strip_prefix(&self.root)
                .map_err(|_| StorageError::InvalidPath)?
                .to_string_lossy()
                .replace(std::path::MAIN_SEPARATOR, "/");
            let modified = metadata
                .modified()
                .ok()
                .and_then(|ts| ts.duration_since(UNIX_EPOCH).ok())
                .map(format_timestamp);

            entries.push(DirEntry {
                name,
                path: relative_path,
                is_dir: metadata.is_dir(),
                size: metadata.len(),
                modified,
            });
        }

        entries.sort_by(|a, b| match (a.is_dir, b.is_dir) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        });

        Ok(entries)
    }

    /// Deletes every entry directly under the root, leaving the root itself
    /// in place. The first deletion error aborts the walk; entries removed
    /// before the error stay removed.
    pub async fn purge(&self) -> io::Result<()> {
        let mut dir = fs::read_dir(&self.root).await?;
        while let Some(entry) = dir.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                fs::remove_dir_all(entry.path()).await?;
            } else {
                fs::remove_file(entry.path()).await?;
            }
        }
        Ok(())
    }
}

/// Walks the identifier's components, keeping normal segments and refusing
/// anything that could step outside the root.
fn normalize_relative(relative: &str) -> Result<PathBuf, StorageError> {
    let trimmed = relative.trim_start_matches(['/', '\\']);
    let mut normalized = PathBuf::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(segment) => normalized.push(segment),
            Component::CurDir => continue,
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(StorageError::InvalidPath);
            }
        }
    }
    Ok(normalized)
}

fn format_timestamp(duration: Duration) -> String {
    let timestamp = UNIX_EPOCH + duration;
    let datetime: DateTime<Utc> = timestamp.into();
    datetime.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[derive(Debug)]
pub enum StorageError {
    InvalidPath,
    Io(io::Error),
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        StorageError::Io(err)
    }
}

#[derive(Serialize)]
pub struct DirEntry {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::{StorageError, UploadRoot};
    use tempfile::tempdir;

    fn make_root() -> (tempfile::TempDir, UploadRoot) {
        let temp = tempdir().expect("tempdir");
        let root = temp.path().join("upload");
        std::fs::create_dir_all(&root).expect("create upload root");
        (temp, UploadRoot::new(root))
    }

    #[tokio::test]
    async fn resolve_rejects_parent_traversal() {
        let (_temp, root) = make_root();
        let result = root.resolve_entry("../escape.txt", true).await;
        assert!(matches!(result, Err(StorageError::InvalidPath)));
    }

    #[tokio::test]
    async fn resolve_rejects_absolute_identifier() {
        let (_temp, root) = make_root();
        let result = root.resolve_entry("a/../../etc/passwd", true).await;
        assert!(matches!(result, Err(StorageError::InvalidPath)));
    }

    #[tokio::test]
    async fn resolve_accepts_plain_name() {
        let (_temp, root) = make_root();
        let path = root
            .resolve_entry("data.bin", true)
            .await
            .expect("resolve plain name");
        assert_eq!(path, root.root_path().join("data.bin"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn resolve_rejects_symlink() {
        use std::os::unix::fs::symlink;

        let (temp, root) = make_root();
        let outside = temp.path().join("outside.txt");
        std::fs::write(&outside, b"secret").expect("write outside file");
        symlink(&outside, root.root_path().join("link")).expect("symlink");

        let result = root.resolve_entry("link", false).await;
        assert!(matches!(result, Err(StorageError::InvalidPath)));
    }

    #[tokio::test]
    async fn purge_empties_root_and_is_idempotent() {
        let (_temp, root) = make_root();
        std::fs::write(root.root_path().join("a"), b"one").expect("write a");
        std::fs::write(root.root_path().join("b"), b"two").expect("write b");
        std::fs::create_dir(root.root_path().join("sub")).expect("mkdir sub");
        std::fs::write(root.root_path().join("sub").join("c"), b"three").expect("write c");

        root.purge().await.expect("purge");
        let entries = root.list_dir(None).await.expect("list after purge");
        assert!(entries.is_empty());
        assert!(root.root_path().is_dir());

        // Purging an already-empty root succeeds.
        root.purge().await.expect("purge empty");
    }

    #[tokio::test]
    async fn list_dir_orders_directories_first() {
        let (_temp, root) = make_root();
        std::fs::write(root.root_path().join("zz.txt"), b"z").expect("write file");
        std::fs::create_dir(root.root_path().join("aa")).expect("mkdir");
        std::fs::write(root.root_path().join("bb.txt"), b"b").expect("write file");

        let entries = root.list_dir(None).await.expect("list");
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["aa", "bb.txt", "zz.txt"]);
        assert!(entries[0].is_dir);
    }
}
