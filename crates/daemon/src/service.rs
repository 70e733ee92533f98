//! Service wiring: builds the storage, identity and routing stack from a
//! [`Config`] and serves it on the configured socket.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::{BackendKind, Config};
use crate::files::ScopedFileStore;
use crate::identity::{IdentityManager, SessionTable};
use crate::ipc::Server;
use crate::router::Router;
use crate::storage::{FsBackend, MemoryBackend, StorageBackend};

/// A fully wired daemon over one storage backend.
pub struct Service<B: StorageBackend> {
    config: Config,
    router: Arc<Router<B>>,
}

impl<B: StorageBackend> Service<B> {
    /// Wire a service over `backend`, loading the persisted session table.
    pub fn new(config: Config, backend: B) -> Result<Self> {
        let backend = Arc::new(backend);

        let sessions = Arc::new(SessionTable::new(&config.session.store_path));
        sessions.load().context("Failed to load session table")?;

        let router = Arc::new(Router::new(
            IdentityManager::new(Arc::clone(&backend), sessions),
            ScopedFileStore::new(backend, config.storage.max_file_size),
            config.session.cookie_name.clone(),
        ));

        Ok(Self { config, router })
    }

    /// The request router.
    pub fn router(&self) -> &Arc<Router<B>> {
        &self.router
    }

    /// Serve on the configured socket until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let socket_path = &self.config.server.socket_path;
        let server = Server::bind(socket_path)
            .await
            .with_context(|| format!("Failed to bind socket: {}", socket_path.display()))?;

        server
            .run(self.router, shutdown)
            .await
            .context("Server loop failed")
    }
}

/// Build the backend named in `config` and serve until `shutdown`.
///
/// A storage root that cannot be prepared aborts startup.
pub async fn run(config: Config, shutdown: CancellationToken) -> Result<()> {
    match config.storage.backend {
        BackendKind::Filesystem => {
            let backend = FsBackend::bootstrap(&config.storage.root).with_context(|| {
                format!(
                    "Failed to prepare storage root: {}",
                    config.storage.root.display()
                )
            })?;
            info!(root = ?backend.root(), "Using filesystem storage");
            Service::new(config, backend)?.run(shutdown).await
        }
        BackendKind::Memory => {
            info!("Using in-memory storage; content is lost on exit");
            Service::new(config, MemoryBackend::new())?.run(shutdown).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config(temp_dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.storage.root = temp_dir.path().join("data");
        config.session.store_path = temp_dir.path().join("sessions.json");
        config.server.socket_path = temp_dir.path().join("lockbox.sock");
        config
    }

    #[test]
    fn test_new_loads_session_table() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir);
        std::fs::write(&config.session.store_path, "not json").unwrap();

        let result = Service::new(config, MemoryBackend::new());
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_run_rejects_file_storage_root() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir);
        std::fs::write(&config.storage.root, "not a dir").unwrap();

        let err = run(config, CancellationToken::new()).await.unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to prepare storage root"));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir);
        let socket_path = config.server.socket_path.clone();

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run(config, shutdown.clone()));

        for _ in 0..100 {
            if socket_path.exists() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(socket_path.exists());
        assert!(temp_dir.path().join("data").is_dir());

        shutdown.cancel();
        handle.await.unwrap().unwrap();
        assert!(!socket_path.exists());
    }
}
