use std::path::{Path, PathBuf};

use {async_trait::async_trait, serde::Serialize, tracing::debug};

/// A file known to the vault, addressed by its vault-relative path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileHandle {
    /// Path relative to the vault root, always with `/` separators.
    pub path: String,
    /// File name including extension.
    pub name: String,
    pub extension: Option<String>,
    pub size: u64,
}

/// Index of the files stored in the consuming application's vault.
#[async_trait]
pub trait FileIndex: Send + Sync {
    /// Resolve a vault-relative, forward-slash path to a handle.
    ///
    /// Returns `None` when the index does not know the path (yet).
    async fn resolve(&self, path: &str) -> Option<FileHandle>;
}

/// [`FileIndex`] that reads the local filesystem under a root directory.
pub struct LocalFileIndex {
    root: PathBuf,
}

impl LocalFileIndex {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl FileIndex for LocalFileIndex {
    async fn resolve(&self, path: &str) -> Option<FileHandle> {
        let relative = Path::new(path);
        // Refuse anything that would leave the vault.
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            debug!(path, "refusing to resolve path outside the vault");
            return None;
        }

        let metadata = tokio::fs::metadata(self.root.join(relative)).await.ok()?;
        if !metadata.is_file() {
            return None;
        }

        Some(FileHandle {
            path: path.to_string(),
            name: relative.file_name()?.to_string_lossy().into_owned(),
            extension: relative
                .extension()
                .map(|ext| ext.to_string_lossy().into_owned()),
            size: metadata.len(),
        })
    }
}

/// Express `path` relative to `root` with `/` separators.
///
/// Returns `None` when `path` does not live under `root`.
pub fn vault_relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let joined = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    Some(joined.replace('\\', "/"))
}
