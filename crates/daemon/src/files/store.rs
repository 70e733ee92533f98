//! Put, get, delete and list within an identity's own location.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, error, info};

use super::name::{FileName, NameError};
use crate::identity::Identity;
use crate::storage::{StorageBackend, StorageError};

/// Errors from scoped file operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The name failed validation. No storage was touched.
    #[error("invalid file name: {0}")]
    InvalidName(#[from] NameError),

    /// No such file in the caller's location.
    #[error("file not found: {0}")]
    NotFound(String),

    /// Upload larger than the configured limit.
    #[error("file too large: {size} bytes exceeds limit of {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    /// Backend failure.
    #[error("storage error: {0}")]
    StorageIo(#[source] StorageError),
}

impl StoreError {
    fn from_storage(e: StorageError) -> Self {
        match e {
            StorageError::FileNotFound { name, .. } => Self::NotFound(name),
            other => Self::StorageIo(other),
        }
    }
}

/// Result of a successful put.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutReceipt {
    /// Stored name.
    pub name: FileName,
    /// Content length in bytes.
    pub size: u64,
    /// Hex SHA-256 of the stored content.
    pub sha256: String,
}

/// File operations confined to the caller's location.
pub struct ScopedFileStore<B: StorageBackend> {
    backend: Arc<B>,
    max_file_size: u64,
}

impl<B: StorageBackend> ScopedFileStore<B> {
    /// Create a store over `backend` accepting uploads up to `max_file_size` bytes.
    pub fn new(backend: Arc<B>, max_file_size: u64) -> Self {
        Self {
            backend,
            max_file_size,
        }
    }

    fn validate(identity: &Identity, raw: &str) -> Result<FileName, StoreError> {
        FileName::parse(Path::new(identity.location()), raw).map_err(|e| {
            debug!(fingerprint = %identity.fingerprint(), error = %e, "Rejected file name");
            StoreError::InvalidName(e)
        })
    }

    fn storage_failure(identity: &Identity, op: &'static str, e: StorageError) -> StoreError {
        let mapped = StoreError::from_storage(e);
        if let StoreError::StorageIo(inner) = &mapped {
            error!(fingerprint = %identity.fingerprint(), op, error = %inner, "Storage operation failed");
        }
        mapped
    }

    /// Store `content` as `name`, replacing any previous file of that name.
    pub async fn put(
        &self,
        identity: &Identity,
        name: &str,
        content: Bytes,
    ) -> Result<PutReceipt, StoreError> {
        let name = Self::validate(identity, name)?;

        let size = content.len() as u64;
        if size > self.max_file_size {
            return Err(StoreError::TooLarge {
                size,
                limit: self.max_file_size,
            });
        }

        let sha256 = hex::encode(Sha256::digest(&content));
        self.backend
            .put(identity.location(), name.as_str(), content)
            .await
            .map_err(|e| Self::storage_failure(identity, "put", e))?;

        info!(fingerprint = %identity.fingerprint(), name = %name, size, "Stored file");
        Ok(PutReceipt { name, size, sha256 })
    }

    /// Read the full content of `name`.
    pub async fn get(&self, identity: &Identity, name: &str) -> Result<Bytes, StoreError> {
        let name = Self::validate(identity, name)?;
        self.backend
            .get(identity.location(), name.as_str())
            .await
            .map_err(|e| Self::storage_failure(identity, "get", e))
    }

    /// Remove `name`. A second delete of the same name is `NotFound`.
    pub async fn delete(&self, identity: &Identity, name: &str) -> Result<(), StoreError> {
        let name = Self::validate(identity, name)?;
        self.backend
            .delete(identity.location(), name.as_str())
            .await
            .map_err(|e| Self::storage_failure(identity, "delete", e))?;

        info!(fingerprint = %identity.fingerprint(), name = %name, "Deleted file");
        Ok(())
    }

    /// Names stored for the identity, sorted.
    pub async fn list(&self, identity: &Identity) -> Result<Vec<String>, StoreError> {
        self.backend
            .list(identity.location())
            .await
            .map_err(|e| Self::storage_failure(identity, "list", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Fingerprint;
    use crate::storage::MemoryBackend;

    async fn setup(limit: u64) -> (ScopedFileStore<MemoryBackend>, Identity, Identity) {
        let backend = Arc::new(MemoryBackend::new());
        backend.ensure_location("alice").await.unwrap();
        backend.ensure_location("bob").await.unwrap();
        let alice = Identity::new(Fingerprint::parse("alice").unwrap());
        let bob = Identity::new(Fingerprint::parse("bob").unwrap());
        (ScopedFileStore::new(backend, limit), alice, bob)
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let (store, alice, _) = setup(1024).await;

        let receipt = store
            .put(&alice, "a.txt", Bytes::from_static(b"hello"))
            .await
            .unwrap();
        assert_eq!(receipt.size, 5);
        assert_eq!(
            receipt.sha256,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(
            store.get(&alice, "a.txt").await.unwrap(),
            Bytes::from_static(b"hello")
        );
    }

    #[tokio::test]
    async fn test_empty_content() {
        let (store, alice, _) = setup(1024).await;
        store.put(&alice, "empty", Bytes::new()).await.unwrap();
        assert!(store.get(&alice, "empty").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_identities_are_isolated() {
        let (store, alice, bob) = setup(1024).await;
        store
            .put(&alice, "secret.txt", Bytes::from_static(b"alice only"))
            .await
            .unwrap();

        assert!(matches!(
            store.get(&bob, "secret.txt").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.get(&bob, "../alice/secret.txt").await,
            Err(StoreError::InvalidName(_))
        ));
        assert!(store.list(&bob).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_name_touches_nothing() {
        let (store, alice, _) = setup(1024).await;
        for raw in ["", "..", "../bob/x", "a/b", "/etc/passwd"] {
            assert!(matches!(
                store.put(&alice, raw, Bytes::from_static(b"x")).await,
                Err(StoreError::InvalidName(_))
            ));
        }
        assert!(store.list(&alice).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_size_limit() {
        let (store, alice, _) = setup(4).await;

        assert!(store
            .put(&alice, "ok", Bytes::from_static(b"1234"))
            .await
            .is_ok());
        assert!(matches!(
            store.put(&alice, "big", Bytes::from_static(b"12345")).await,
            Err(StoreError::TooLarge { size: 5, limit: 4 })
        ));
        assert_eq!(store.list(&alice).await.unwrap(), vec!["ok"]);
    }

    #[tokio::test]
    async fn test_delete_then_delete_again() {
        let (store, alice, _) = setup(1024).await;
        store
            .put(&alice, "a.txt", Bytes::from_static(b"x"))
            .await
            .unwrap();

        store.delete(&alice, "a.txt").await.unwrap();
        assert!(matches!(
            store.delete(&alice, "a.txt").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.get(&alice, "a.txt").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unprovisioned_location_is_storage_error() {
        let store = ScopedFileStore::new(Arc::new(MemoryBackend::new()), 1024);
        let ghost = Identity::new(Fingerprint::parse("ghost").unwrap());

        assert!(matches!(
            store.put(&ghost, "a", Bytes::new()).await,
            Err(StoreError::StorageIo(StorageError::LocationNotFound(_)))
        ));
    }
}
