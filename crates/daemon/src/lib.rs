//! # Lockbox Daemon Library
//!
//! Per-identity file storage. A client establishes an identity, receives a
//! session token, and can then put, get, delete and list files that live
//! only in that identity's own storage location.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Socket Server (ipc)                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                         Router                                  │
//! ├───────────────────────────────┬─────────────────────────────────┤
//! │      Identity Manager         │       Scoped File Store         │
//! │  fingerprints, session table  │   name validation, size limit   │
//! ├───────────────────────────────┴─────────────────────────────────┤
//! │          Storage Backend (filesystem or memory)                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use daemon::Config;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = Config::load_default()?;
//!     config.apply_env_overrides();
//!     config.validate()?;
//!
//!     daemon::service::run(config, CancellationToken::new()).await
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`storage`]: Storage backends
//! - [`identity`]: Fingerprints, session tokens and authentication
//! - [`files`]: Name validation and scoped file operations
//! - [`router`]: Request dispatch and error mapping
//! - [`ipc`]: Unix socket server and client
//! - [`service`]: Wiring from configuration to a running server

pub mod config;
pub mod files;
pub mod identity;
pub mod ipc;
pub mod router;
pub mod service;
pub mod storage;

// Re-export protocol for convenience
pub use protocol;

pub use config::Config;
pub use files::{FileName, ScopedFileStore, StoreError};
pub use identity::{Fingerprint, Identity, IdentityError, IdentityManager, SessionTable};
pub use router::{Router, RouterError};
pub use service::Service;
pub use storage::{FsBackend, MemoryBackend, StorageBackend, StorageError};
