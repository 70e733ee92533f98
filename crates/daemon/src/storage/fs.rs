//! Local filesystem backend: one directory per location under a root.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::{StorageBackend, StorageError, RESERVED_PREFIX};

/// Filesystem storage rooted at a single directory.
///
/// Layout: `<root>/<location>/<name>`, each file an exact byte copy of the
/// uploaded content with no sidecar metadata.
#[derive(Debug, Clone)]
pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    /// One-time initialisation of the storage root.
    ///
    /// Creates the root if it does not exist and fails if the path exists
    /// but is not a directory. Returns the ready-to-use backend.
    pub fn bootstrap<P: AsRef<Path>>(root: P) -> Result<Self, StorageError> {
        let root = root.as_ref();

        match std::fs::metadata(root) {
            Ok(meta) if meta.is_dir() => {
                debug!(root = ?root, "Using existing storage root");
            }
            Ok(_) => return Err(StorageError::InvalidRoot(root.to_path_buf())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                std::fs::create_dir_all(root)?;
                info!(root = ?root, "Created storage root");
            }
            Err(e) => return Err(StorageError::Io(e)),
        }

        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// The storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn location_dir(&self, location: &str) -> PathBuf {
        self.root.join(location)
    }

    fn temp_path(dir: &Path) -> PathBuf {
        dir.join(format!(
            "{}upload-{:016x}.tmp",
            RESERVED_PREFIX,
            rand::random::<u64>()
        ))
    }

    async fn write_temp(temp_path: &Path, content: &[u8]) -> std::io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(temp_path)
            .await?;
        file.write_all(content).await?;
        file.sync_all().await?;
        Ok(())
    }
}

fn not_found(location: &str, name: &str) -> impl FnOnce(std::io::Error) -> StorageError {
    let location = location.to_string();
    let name = name.to_string();
    move |e| {
        if e.kind() == ErrorKind::NotFound {
            StorageError::FileNotFound { location, name }
        } else {
            StorageError::Io(e)
        }
    }
}

impl StorageBackend for FsBackend {
    async fn ensure_location(&self, location: &str) -> Result<(), StorageError> {
        let dir = self.location_dir(location);
        match fs::create_dir(&dir).await {
            Ok(()) => {
                info!(location = %location, "Provisioned storage location");
                Ok(())
            }
            // A concurrent establish for the same fingerprint got there first.
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if fs::metadata(&dir).await?.is_dir() {
                    Ok(())
                } else {
                    Err(StorageError::Io(std::io::Error::new(
                        ErrorKind::AlreadyExists,
                        format!("{} exists and is not a directory", dir.display()),
                    )))
                }
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn location_exists(&self, location: &str) -> Result<bool, StorageError> {
        match fs::metadata(self.location_dir(location)).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn put(&self, location: &str, name: &str, content: Bytes) -> Result<(), StorageError> {
        let dir = self.location_dir(location);
        if !self.location_exists(location).await? {
            return Err(StorageError::LocationNotFound(location.to_string()));
        }

        // Write beside the destination and rename over it so readers never
        // see a partially written file.
        let temp_path = Self::temp_path(&dir);
        if let Err(e) = Self::write_temp(&temp_path, &content).await {
            if let Err(cleanup) = fs::remove_file(&temp_path).await {
                if cleanup.kind() != ErrorKind::NotFound {
                    warn!(path = ?temp_path, error = %cleanup, "Failed to cleanup temp file after write error");
                }
            }
            return Err(StorageError::Io(e));
        }

        if let Err(e) = fs::rename(&temp_path, dir.join(name)).await {
            if let Err(cleanup) = fs::remove_file(&temp_path).await {
                warn!(path = ?temp_path, error = %cleanup, "Failed to cleanup temp file after rename error");
            }
            return Err(StorageError::Io(e));
        }

        Ok(())
    }

    async fn get(&self, location: &str, name: &str) -> Result<Bytes, StorageError> {
        let content = fs::read(self.location_dir(location).join(name))
            .await
            .map_err(not_found(location, name))?;
        Ok(Bytes::from(content))
    }

    async fn delete(&self, location: &str, name: &str) -> Result<(), StorageError> {
        fs::remove_file(self.location_dir(location).join(name))
            .await
            .map_err(not_found(location, name))
    }

    async fn exists(&self, location: &str, name: &str) -> Result<bool, StorageError> {
        match fs::metadata(self.location_dir(location).join(name)).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn list(&self, location: &str) -> Result<Vec<String>, StorageError> {
        let mut entries = match fs::read_dir(self.location_dir(location)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::LocationNotFound(location.to_string()))
            }
            Err(e) => return Err(StorageError::Io(e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            // Non-UTF-8 names cannot have been written through this service.
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with(RESERVED_PREFIX) {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }
}
