//! Storage backends for identity-scoped file content.
//!
//! A backend is a key-addressed blob store: every file lives in exactly one
//! *location* (keyed by the owning fingerprint) under a *name*. Backends do
//! no name validation of their own; callers hand them names that have
//! already been checked by [`crate::files::FileName`], which keeps the
//! isolation rules identical across backends.

use std::future::Future;
use std::path::PathBuf;

use bytes::Bytes;
use thiserror::Error;

pub mod fs;
pub mod memory;

pub use fs::FsBackend;
pub use memory::MemoryBackend;

/// Prefix reserved for backend bookkeeping (in-flight uploads).
///
/// File names starting with it are rejected before they reach a backend,
/// so temporary files can never collide with stored ones.
pub const RESERVED_PREFIX: &str = ".lockbox-";

/// Errors raised by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The location has not been provisioned.
    #[error("storage location not found: {0}")]
    LocationNotFound(String),

    /// No file of that name in the location.
    #[error("file not found: {name} in {location}")]
    FileNotFound {
        /// Location key.
        location: String,
        /// File name.
        name: String,
    },

    /// The configured root exists but is not a directory.
    #[error("storage root is not a directory: {0}")]
    InvalidRoot(PathBuf),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A key-addressed store of named files grouped by location.
///
/// Implementations must be safe to call from many tasks at once. A `put`
/// replaces the whole object: concurrent readers observe either the old
/// content or the new content, never a mix.
pub trait StorageBackend: Send + Sync + 'static {
    /// Create the location if absent. An existing location is success.
    fn ensure_location(&self, location: &str)
        -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Whether the location has been provisioned.
    fn location_exists(&self, location: &str)
        -> impl Future<Output = Result<bool, StorageError>> + Send;

    /// Store `content` under `name`, replacing any previous content.
    fn put(
        &self,
        location: &str,
        name: &str,
        content: Bytes,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Read the full content of `name`.
    fn get(&self, location: &str, name: &str)
        -> impl Future<Output = Result<Bytes, StorageError>> + Send;

    /// Remove `name`.
    fn delete(&self, location: &str, name: &str)
        -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Whether `name` exists in the location.
    fn exists(&self, location: &str, name: &str)
        -> impl Future<Output = Result<bool, StorageError>> + Send;

    /// Names stored in the location, sorted.
    fn list(&self, location: &str)
        -> impl Future<Output = Result<Vec<String>, StorageError>> + Send;
}
