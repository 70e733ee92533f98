//! Framed message stream over a Unix socket.

use std::io;

use protocol::{Envelope, FrameCodec, ProtocolError, FRAME_HEADER_SIZE};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

/// Errors that can occur during IPC communication.
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A frame or envelope could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The peer closed the connection before replying.
    #[error("connection closed by peer")]
    Closed,

    /// A reply did not answer the request that was sent.
    #[error("sequence mismatch: sent {sent}, received {received}")]
    SequenceMismatch { sent: u64, received: u64 },

    /// The operation did not complete in time.
    #[error("operation timed out")]
    Timeout,
}

/// A Unix stream carrying framed MessagePack envelopes.
pub struct Connection {
    stream: UnixStream,
    codec: FrameCodec,
}

impl Connection {
    /// Wrap a connected stream.
    pub fn new(stream: UnixStream) -> Self {
        Self {
            stream,
            codec: FrameCodec::new(),
        }
    }

    /// Read the next envelope.
    ///
    /// Returns `None` when the peer closed the connection cleanly between
    /// messages. A close in the middle of a frame is an error.
    pub async fn read_message<T: DeserializeOwned>(
        &mut self,
    ) -> Result<Option<Envelope<T>>, IpcError> {
        let mut header = [0u8; FRAME_HEADER_SIZE];
        let first = self.stream.read(&mut header).await?;
        if first == 0 {
            return Ok(None);
        }
        self.stream
            .read_exact(&mut header[first..])
            .await
            .map_err(ProtocolError::from)?;

        let header = self.codec.decode_header(&header)?;
        let mut payload = vec![0u8; header.payload_len];
        self.stream
            .read_exact(&mut payload)
            .await
            .map_err(ProtocolError::from)?;

        let payload = self.codec.decode_payload(header, payload)?;
        Ok(Some(Envelope::from_msgpack(&payload)?))
    }

    /// Write one envelope.
    pub async fn write_message<T: Serialize>(
        &mut self,
        envelope: &Envelope<T>,
    ) -> Result<(), IpcError> {
        let frame = self.codec.encode(&envelope.to_msgpack()?)?;
        self.stream.write_all(&frame).await?;
        self.stream.flush().await?;
        Ok(())
    }
}
