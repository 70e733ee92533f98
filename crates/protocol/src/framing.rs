//! Length-prefixed framing with optional LZ4 compression.
//!
//! # Frame Format
//!
//! - 4 bytes: magic bytes "LBOX"
//! - 4 bytes: content length (big-endian, flags byte plus payload)
//! - 1 byte: flags (bit 0 = compressed)
//! - N bytes: payload (possibly LZ4 compressed)
//!
//! Stream readers read [`FRAME_HEADER_SIZE`] bytes, call
//! [`FrameCodec::decode_header`] to learn how much payload follows, then
//! hand the payload to [`FrameCodec::decode_payload`].

use crate::error::{ProtocolError, Result};

/// Magic bytes identifying a Lockbox frame.
pub const FRAME_MAGIC: [u8; 4] = *b"LBOX";

/// Payloads larger than this are compressed when compression is enabled.
pub const COMPRESSION_THRESHOLD: usize = 1024;

/// Largest file body a single request may carry (512 MiB).
pub const MAX_BODY_SIZE: usize = 512 * 1024 * 1024;

/// Maximum frame size: one maximal body plus room for the envelope.
pub const MAX_FRAME_SIZE: usize = MAX_BODY_SIZE + 64 * 1024;

/// Frame header size: 4 (magic) + 4 (length) + 1 (flags) = 9 bytes.
pub const FRAME_HEADER_SIZE: usize = 9;

/// Flags indicating frame properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameFlags(u8);

impl FrameFlags {
    /// Flag indicating the payload is LZ4 compressed.
    pub const COMPRESSED: u8 = 0b0000_0001;

    /// Create flags from a raw byte value.
    #[inline]
    pub fn from_byte(byte: u8) -> Self {
        Self(byte)
    }

    /// Get the raw byte value of the flags.
    #[inline]
    pub fn as_byte(self) -> u8 {
        self.0
    }

    /// Check if the compressed flag is set.
    #[inline]
    pub fn is_compressed(self) -> bool {
        self.0 & Self::COMPRESSED != 0
    }

    /// Return a copy with the compressed flag set or cleared.
    #[inline]
    pub fn with_compressed(self, compressed: bool) -> Self {
        if compressed {
            Self(self.0 | Self::COMPRESSED)
        } else {
            Self(self.0 & !Self::COMPRESSED)
        }
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Frame flags.
    pub flags: FrameFlags,
    /// Number of payload bytes following the header.
    pub payload_len: usize,
}

/// Encoder and decoder for frames.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    compression_enabled: bool,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    /// Create a new frame codec with compression enabled.
    pub fn new() -> Self {
        Self {
            compression_enabled: true,
        }
    }

    /// Create a new frame codec with compression disabled.
    pub fn without_compression() -> Self {
        Self {
            compression_enabled: false,
        }
    }

    /// Encode a payload into a complete frame.
    pub fn encode(&self, payload: &[u8]) -> Result<Vec<u8>> {
        if payload.len() > MAX_FRAME_SIZE - FRAME_HEADER_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: payload.len() + FRAME_HEADER_SIZE,
                max: MAX_FRAME_SIZE,
            });
        }

        let mut flags = FrameFlags::default();
        let compressed = if self.compression_enabled && payload.len() > COMPRESSION_THRESHOLD {
            let compressed = lz4_flex::compress_prepend_size(payload);
            // Incompressible payloads are sent as-is.
            if compressed.len() < payload.len() {
                flags = flags.with_compressed(true);
                Some(compressed)
            } else {
                None
            }
        } else {
            None
        };
        let body = compressed.as_deref().unwrap_or(payload);

        let content_len = 1 + body.len();
        let mut output = Vec::with_capacity(FRAME_HEADER_SIZE - 1 + content_len);
        output.extend_from_slice(&FRAME_MAGIC);
        output.extend_from_slice(&(content_len as u32).to_be_bytes());
        output.push(flags.as_byte());
        output.extend_from_slice(body);

        Ok(output)
    }

    /// Validate a frame header and report how many payload bytes follow.
    pub fn decode_header(&self, header: &[u8; FRAME_HEADER_SIZE]) -> Result<FrameHeader> {
        if header[0..4] != FRAME_MAGIC {
            return Err(ProtocolError::InvalidFrameMagic {
                expected: u32::from_be_bytes(FRAME_MAGIC),
                got: u32::from_be_bytes([header[0], header[1], header[2], header[3]]),
            });
        }

        let content_len =
            u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
        if content_len < 1 {
            return Err(ProtocolError::Deserialization(
                "invalid frame: content length must be at least 1 for flags byte".to_string(),
            ));
        }
        if 8 + content_len > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: 8 + content_len,
                max: MAX_FRAME_SIZE,
            });
        }

        Ok(FrameHeader {
            flags: FrameFlags::from_byte(header[8]),
            payload_len: content_len - 1,
        })
    }

    /// Turn raw payload bytes into the original payload.
    pub fn decode_payload(&self, header: FrameHeader, payload: Vec<u8>) -> Result<Vec<u8>> {
        if payload.len() != header.payload_len {
            return Err(ProtocolError::Deserialization(format!(
                "frame payload length mismatch: header says {}, got {}",
                header.payload_len,
                payload.len()
            )));
        }
        if !header.flags.is_compressed() {
            return Ok(payload);
        }
        // The size prefix is peer-controlled; bound it before lz4 allocates.
        if let Some(prefix) = payload.first_chunk::<4>() {
            let claimed = u32::from_le_bytes(*prefix) as usize;
            if claimed > MAX_FRAME_SIZE {
                return Err(ProtocolError::FrameTooLarge {
                    size: claimed,
                    max: MAX_FRAME_SIZE,
                });
            }
        }
        lz4_flex::decompress_size_prepended(&payload).map_err(|e| {
            ProtocolError::Deserialization(format!("failed to decompress payload: {}", e))
        })
    }

    /// Decode one frame from the front of `data`.
    ///
    /// Returns `Ok(None)` if `data` does not yet hold a complete frame, or
    /// the payload and the number of bytes consumed.
    pub fn try_decode(&self, data: &[u8]) -> Result<Option<(Vec<u8>, usize)>> {
        let Some(header_bytes) = data.first_chunk::<FRAME_HEADER_SIZE>() else {
            return Ok(None);
        };
        let header = self.decode_header(header_bytes)?;

        let total = FRAME_HEADER_SIZE + header.payload_len;
        if data.len() < total {
            return Ok(None);
        }

        let payload = self.decode_payload(header, data[FRAME_HEADER_SIZE..total].to_vec())?;
        Ok(Some((payload, total)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_flags() {
        let flags = FrameFlags::default();
        assert!(!flags.is_compressed());
        assert!(flags.with_compressed(true).is_compressed());
        assert!(!flags.with_compressed(true).with_compressed(false).is_compressed());
    }

    #[test]
    fn test_small_payload_is_not_compressed() {
        let codec = FrameCodec::new();
        let encoded = codec.encode(b"hello").unwrap();

        assert_eq!(&encoded[0..4], b"LBOX");
        assert_eq!(encoded[8], 0);
        assert_eq!(encoded.len(), FRAME_HEADER_SIZE + 5);

        let (payload, consumed) = codec.try_decode(&encoded).unwrap().unwrap();
        assert_eq!(payload, b"hello");
        assert_eq!(consumed, encoded.len());
    }

    #[test]
    fn test_large_repetitive_payload_is_compressed() {
        let codec = FrameCodec::new();
        let payload = vec![b'a'; 64 * 1024];
        let encoded = codec.encode(&payload).unwrap();

        assert!(FrameFlags::from_byte(encoded[8]).is_compressed());
        assert!(encoded.len() < payload.len());

        let (decoded, _) = codec.try_decode(&encoded).unwrap().unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_incompressible_payload_is_sent_raw() {
        let codec = FrameCodec::new();
        let mut state: u32 = 0x9e37_79b9;
        let payload: Vec<u8> = (0..8 * 1024)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            })
            .collect();
        let encoded = codec.encode(&payload).unwrap();

        assert!(!FrameFlags::from_byte(encoded[8]).is_compressed());
        assert_eq!(encoded.len(), FRAME_HEADER_SIZE + payload.len());

        let (decoded, _) = codec.try_decode(&encoded).unwrap().unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_compression_disabled() {
        let codec = FrameCodec::without_compression();
        let payload = vec![0u8; 8 * 1024];
        let encoded = codec.encode(&payload).unwrap();
        assert!(!FrameFlags::from_byte(encoded[8]).is_compressed());
        assert_eq!(encoded.len(), FRAME_HEADER_SIZE + payload.len());
    }

    #[test]
    fn test_partial_frame_returns_none() {
        let codec = FrameCodec::new();
        let encoded = codec.encode(b"partial frame").unwrap();

        assert!(codec.try_decode(&encoded[..4]).unwrap().is_none());
        assert!(codec.try_decode(&encoded[..encoded.len() - 1]).unwrap().is_none());
    }

    #[test]
    fn test_two_frames_back_to_back() {
        let codec = FrameCodec::new();
        let mut stream = codec.encode(b"first").unwrap();
        stream.extend(codec.encode(b"second").unwrap());

        let (first, used) = codec.try_decode(&stream).unwrap().unwrap();
        assert_eq!(first, b"first");
        let (second, _) = codec.try_decode(&stream[used..]).unwrap().unwrap();
        assert_eq!(second, b"second");
    }

    #[test]
    fn test_bad_magic() {
        let codec = FrameCodec::new();
        let mut encoded = codec.encode(b"data").unwrap();
        encoded[0] = b'X';
        assert!(matches!(
            codec.try_decode(&encoded),
            Err(ProtocolError::InvalidFrameMagic { .. })
        ));
    }

    #[test]
    fn test_oversized_header_rejected() {
        let codec = FrameCodec::new();
        let mut header = [0u8; FRAME_HEADER_SIZE];
        header[0..4].copy_from_slice(&FRAME_MAGIC);
        header[4..8].copy_from_slice(&u32::MAX.to_be_bytes());
        assert!(matches!(
            codec.decode_header(&header),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_zero_content_length_rejected() {
        let codec = FrameCodec::new();
        let mut header = [0u8; FRAME_HEADER_SIZE];
        header[0..4].copy_from_slice(&FRAME_MAGIC);
        assert!(matches!(
            codec.decode_header(&header),
            Err(ProtocolError::Deserialization(_))
        ));
    }

    #[test]
    fn test_payload_length_mismatch() {
        let codec = FrameCodec::new();
        let header = FrameHeader {
            flags: FrameFlags::default(),
            payload_len: 10,
        };
        assert!(codec.decode_payload(header, vec![0; 3]).is_err());
    }

    #[test]
    fn test_corrupt_compressed_payload() {
        let codec = FrameCodec::new();
        let header = FrameHeader {
            flags: FrameFlags::default().with_compressed(true),
            payload_len: 6,
        };
        let result = codec.decode_payload(header, vec![4, 0, 0, 0, 0xff, 0xff]);
        assert!(matches!(result, Err(ProtocolError::Deserialization(_))));
    }
}
