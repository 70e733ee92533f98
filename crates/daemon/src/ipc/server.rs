//! Socket server feeding client requests to the router.
//!
//! The server listens on a Unix socket and spawns one task per accepted
//! connection. Requests on a connection are handled in order; separate
//! connections run concurrently.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use protocol::{Envelope, ProtocolError, Request};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::connection::{Connection, IpcError};
use crate::router::Router;
use crate::storage::StorageBackend;

/// A server that listens for client connections on a Unix Domain Socket.
pub struct Server {
    listener: UnixListener,
    path: PathBuf,
}

impl Server {
    /// Bind the server to the specified socket path.
    ///
    /// This will create the socket file and any necessary parent directories.
    /// If a socket file already exists at the path, it will be removed first.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The parent directories cannot be created
    /// - The existing socket cannot be removed
    /// - The socket cannot be bound
    pub async fn bind(path: &Path) -> Result<Self, io::Error> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // Remove a socket left behind by a previous run
        if path.exists() {
            std::fs::remove_file(path)?;
        }

        let listener = UnixListener::bind(path)?;
        info!(path = ?path, "Listening");

        Ok(Self {
            listener,
            path: path.to_path_buf(),
        })
    }

    /// Path of the bound socket.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept connections until `shutdown` is cancelled.
    ///
    /// On shutdown, stops accepting, lets in-flight requests finish, then
    /// removes the socket file.
    pub async fn run<B: StorageBackend>(
        self,
        router: Arc<Router<B>>,
        shutdown: CancellationToken,
    ) -> Result<(), io::Error> {
        let tracker = TaskTracker::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        let router = Arc::clone(&router);
                        let shutdown = shutdown.clone();
                        tracker.spawn(async move {
                            match serve_connection(stream, router, shutdown).await {
                                Ok(()) => debug!("Client disconnected"),
                                Err(IpcError::Protocol(ProtocolError::ConnectionClosed(_))) => {
                                    debug!("Client disconnected mid-frame")
                                }
                                Err(e) => warn!(error = %e, "Connection failed"),
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "Failed to accept connection"),
                },
            }
        }

        tracker.close();
        info!(active = tracker.len(), "Shutting down, draining connections");
        tracker.wait().await;

        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = ?self.path, error = %e, "Failed to remove socket file");
            }
        }
        info!("Server stopped");
        Ok(())
    }
}

async fn serve_connection<B: StorageBackend>(
    stream: UnixStream,
    router: Arc<Router<B>>,
    shutdown: CancellationToken,
) -> Result<(), IpcError> {
    let mut conn = Connection::new(stream);

    loop {
        let envelope = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            read = conn.read_message::<Request>() => match read? {
                Some(envelope) => envelope,
                None => return Ok(()),
            },
        };

        let response = router.handle(envelope.payload).await;
        conn.write_message(&Envelope::new(envelope.sequence, response))
            .await?;
    }
}
