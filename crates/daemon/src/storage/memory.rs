//! In-memory backend for tests and ephemeral deployments.

use std::collections::BTreeMap;

use bytes::Bytes;
use dashmap::DashMap;

use super::{StorageBackend, StorageError};

/// Volatile storage keeping every location in a concurrent map.
///
/// Each location is a sorted map of name to content; replacing an entry
/// swaps the whole `Bytes` handle, so readers never see partial content.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    locations: DashMap<String, BTreeMap<String, Bytes>>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of provisioned locations.
    pub fn location_count(&self) -> usize {
        self.locations.len()
    }
}

impl StorageBackend for MemoryBackend {
    async fn ensure_location(&self, location: &str) -> Result<(), StorageError> {
        self.locations.entry(location.to_string()).or_default();
        Ok(())
    }

    async fn location_exists(&self, location: &str) -> Result<bool, StorageError> {
        Ok(self.locations.contains_key(location))
    }

    async fn put(&self, location: &str, name: &str, content: Bytes) -> Result<(), StorageError> {
        let mut files = self
            .locations
            .get_mut(location)
            .ok_or_else(|| StorageError::LocationNotFound(location.to_string()))?;
        files.insert(name.to_string(), content);
        Ok(())
    }

    async fn get(&self, location: &str, name: &str) -> Result<Bytes, StorageError> {
        self.locations
            .get(location)
            .and_then(|files| files.get(name).cloned())
            .ok_or_else(|| StorageError::FileNotFound {
                location: location.to_string(),
                name: name.to_string(),
            })
    }

    async fn delete(&self, location: &str, name: &str) -> Result<(), StorageError> {
        self.locations
            .get_mut(location)
            .and_then(|mut files| files.remove(name))
            .map(|_| ())
            .ok_or_else(|| StorageError::FileNotFound {
                location: location.to_string(),
                name: name.to_string(),
            })
    }

    async fn exists(&self, location: &str, name: &str) -> Result<bool, StorageError> {
        Ok(self
            .locations
            .get(location)
            .map(|files| files.contains_key(name))
            .unwrap_or(false))
    }

    async fn list(&self, location: &str) -> Result<Vec<String>, StorageError> {
        self.locations
            .get(location)
            .map(|files| files.keys().cloned().collect())
            .ok_or_else(|| StorageError::LocationNotFound(location.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_locations_are_disjoint() {
        let backend = MemoryBackend::new();
        backend.ensure_location("alice").await.unwrap();
        backend.ensure_location("bob").await.unwrap();

        backend
            .put("alice", "a.txt", Bytes::from_static(b"alice data"))
            .await
            .unwrap();

        assert!(backend.exists("alice", "a.txt").await.unwrap());
        assert!(!backend.exists("bob", "a.txt").await.unwrap());
        assert!(matches!(
            backend.get("bob", "a.txt").await,
            Err(StorageError::FileNotFound { .. })
        ));
        assert_eq!(backend.location_count(), 2);
    }

    #[tokio::test]
    async fn test_ensure_location_keeps_content() {
        let backend = MemoryBackend::new();
        backend.ensure_location("alice").await.unwrap();
        backend
            .put("alice", "a.txt", Bytes::from_static(b"x"))
            .await
            .unwrap();

        backend.ensure_location("alice").await.unwrap();
        assert_eq!(backend.list("alice").await.unwrap(), vec!["a.txt"]);
    }

    #[tokio::test]
    async fn test_put_requires_location() {
        let backend = MemoryBackend::new();
        assert!(matches!(
            backend.put("ghost", "a", Bytes::new()).await,
            Err(StorageError::LocationNotFound(_))
        ));
        assert!(!backend.location_exists("ghost").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_twice() {
        let backend = MemoryBackend::new();
        backend.ensure_location("alice").await.unwrap();
        backend
            .put("alice", "a.txt", Bytes::from_static(b"x"))
            .await
            .unwrap();

        backend.delete("alice", "a.txt").await.unwrap();
        assert!(matches!(
            backend.delete("alice", "a.txt").await,
            Err(StorageError::FileNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_is_sorted() {
        let backend = MemoryBackend::new();
        backend.ensure_location("alice").await.unwrap();
        for name in ["zeta", "alpha", "mid"] {
            backend
                .put("alice", name, Bytes::from_static(b""))
                .await
                .unwrap();
        }
        assert_eq!(
            backend.list("alice").await.unwrap(),
            vec!["alpha", "mid", "zeta"]
        );
    }
}
