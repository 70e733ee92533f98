//! Client for talking to the daemon over its Unix socket.

use std::path::Path;
use std::time::Duration;

use protocol::{Envelope, Request, Response};
use tokio::net::UnixStream;

use super::connection::{Connection, IpcError};

/// Default timeout for client operations in seconds.
///
/// Generous because a single call may carry a whole upload.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// A client for sending requests to the daemon.
pub struct Client {
    conn: Connection,
    next_sequence: u64,
    timeout: Duration,
}

impl Client {
    /// Connect to the daemon at the specified socket path.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    /// This typically indicates that the daemon is not running.
    pub async fn connect(path: &Path) -> Result<Self, IpcError> {
        let stream = UnixStream::connect(path).await?;
        Ok(Self::from_stream(
            stream,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        ))
    }

    /// Connect to the daemon with a custom timeout applied to the connect
    /// and to every later call.
    pub async fn connect_with_timeout(path: &Path, timeout: Duration) -> Result<Self, IpcError> {
        let stream = tokio::time::timeout(timeout, UnixStream::connect(path))
            .await
            .map_err(|_| IpcError::Timeout)??;
        Ok(Self::from_stream(stream, timeout))
    }

    fn from_stream(stream: UnixStream, timeout: Duration) -> Self {
        Self {
            conn: Connection::new(stream),
            next_sequence: 1,
            timeout,
        }
    }

    /// Send a request and wait for its response.
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange fails at the transport or framing
    /// level, the daemon hangs up, or the operation times out. Application
    /// failures come back as a [`Response`] with an error status.
    pub async fn call(&mut self, request: Request) -> Result<Response, IpcError> {
        tokio::time::timeout(self.timeout, self.call_internal(request))
            .await
            .map_err(|_| IpcError::Timeout)?
    }

    async fn call_internal(&mut self, request: Request) -> Result<Response, IpcError> {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        self.conn
            .write_message(&Envelope::new(sequence, request))
            .await?;

        let reply = self
            .conn
            .read_message::<Response>()
            .await?
            .ok_or(IpcError::Closed)?;
        if reply.sequence != sequence {
            return Err(IpcError::SequenceMismatch {
                sent: sequence,
                received: reply.sequence,
            });
        }
        Ok(reply.payload)
    }
}
