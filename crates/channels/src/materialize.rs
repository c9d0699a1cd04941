use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    tracing::{debug, info, warn},
};

use crate::{
    error::{Error, Result},
    store::{FileHandle, FileIndex, vault_relative_path},
};

/// Give up reserving a destination name after this many suffixed attempts.
const MAX_NAME_ATTEMPTS: usize = 1000;

/// A file stored on the messaging provider's side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// Opaque handle used to fetch the file.
    pub id: String,
    /// Provider-side relative path, e.g. `documents/file_12.pdf`.
    pub path: String,
}

/// Fetches remote attachments into local files.
#[async_trait]
pub trait FileTransport: Send + Sync {
    /// Look up the provider-side metadata of a remote file.
    async fn resolve(&self, file_id: &str) -> Result<RemoteFile>;

    /// Download `remote` into `destination`, which already exists and is
    /// empty. Returns the path the content actually ended up at.
    async fn download(&self, remote: &RemoteFile, destination: &Path) -> Result<PathBuf>;
}

/// Copies inbound attachments into `<root>/<subdir>` and resolves them to
/// vault handles.
pub struct Materializer {
    root: PathBuf,
    subdir: String,
    transport: Arc<dyn FileTransport>,
    index: Arc<dyn FileIndex>,
}

impl Materializer {
    pub fn new(
        root: impl Into<PathBuf>,
        subdir: impl Into<String>,
        transport: Arc<dyn FileTransport>,
        index: Arc<dyn FileIndex>,
    ) -> Self {
        Self {
            root: root.into(),
            subdir: subdir.into(),
            transport,
            index,
        }
    }

    /// Directory new files are written to.
    pub fn destination_dir(&self) -> PathBuf {
        self.root.join(&self.subdir)
    }

    /// Download the remote file `file_id` into the vault and resolve it.
    pub async fn materialize(&self, file_id: &str) -> Result<FileHandle> {
        let remote = self.transport.resolve(file_id).await?;

        let dir = self.destination_dir();
        // Idempotent, safe when several file events race on a fresh vault.
        tokio::fs::create_dir_all(&dir).await?;

        let name = local_file_name(Utc::now(), &remote.path);
        let destination = reserve_destination(&dir, &name).await?;

        let realized = match self.transport.download(&remote, &destination).await {
            Ok(path) => path,
            Err(e) => {
                discard_placeholder(&destination).await;
                return Err(e);
            },
        };
        if realized != destination {
            debug!(
                requested = %destination.display(),
                realized = %realized.display(),
                "transport relocated the download"
            );
            discard_placeholder(&destination).await;
        }

        let relative = vault_relative_path(&self.root, &realized)
            .ok_or_else(|| Error::lookup(realized.display().to_string()))?;
        let handle = self
            .index
            .resolve(&relative)
            .await
            .ok_or_else(|| Error::lookup(&relative))?;

        info!(
            file_id,
            remote_path = %remote.path,
            path = %handle.path,
            size = handle.size,
            "materialized attachment"
        );
        Ok(handle)
    }
}

/// `<UTC YYYY-MM-DD-HH-mm-ss>-<remote path with separators as hyphens>`.
pub fn local_file_name(now: DateTime<Utc>, remote_path: &str) -> String {
    let flattened = remote_path.replace(['/', '\\'], "-");
    format!("{}-{flattened}", now.format("%Y-%m-%d-%H-%M-%S"))
}

/// Atomically claim a fresh file named `name` in `dir`.
///
/// When the name is taken, `-1`, `-2`, ... is inserted before the extension
/// until an exclusive create succeeds.
pub async fn reserve_destination(dir: &Path, name: &str) -> Result<PathBuf> {
    let (stem, extension) = split_extension(name);
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let candidate = if attempt == 0 {
            name.to_string()
        } else {
            format!("{stem}-{attempt}{extension}")
        };
        let path = dir.join(&candidate);
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(_) => return Ok(path),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!(candidate, "destination name taken, trying next suffix");
            },
            Err(e) => return Err(e.into()),
        }
    }
    Err(Error::invalid_input(format!(
        "no free destination name for {name} in {}",
        dir.display()
    )))
}

/// Split `name` into stem and extension (with its dot). Leading-dot names
/// have no extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}

async fn discard_placeholder(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "failed to remove reserved file");
    }
}
