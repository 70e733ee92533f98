//! # Lockbox Protocol Library
//!
//! Wire types shared by the Lockbox daemon and the front ends that talk to
//! it (HTTP gateways, the CLI).
//!
//! The daemon never sees HTTP. A front end parses its own transport into a
//! [`Request`] (the presented session cookie plus one [`Operation`]) and
//! maps the returned [`Response`] (status, redirect, cookie directive,
//! body) back onto its transport.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        Request / Response               │  MessagePack-encoded
//! ├─────────────────────────────────────────┤
//! │              Framing                    │  Length-prefixed, LZ4
//! ├─────────────────────────────────────────┤
//! │          Unix domain socket             │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use protocol::{Envelope, FrameCodec, Operation, Request};
//!
//! let request = Request::with_session("3f2a...", Operation::Download {
//!     name: "notes.txt".to_string(),
//! });
//! let bytes = Envelope::new(1, request).to_msgpack().unwrap();
//! let frame = FrameCodec::new().encode(&bytes).unwrap();
//! assert!(frame.starts_with(b"LBOX"));
//! ```

pub mod error;
pub mod framing;
pub mod messages;

pub use error::{ProtocolError, Result};
pub use framing::{
    FrameCodec, FrameFlags, FrameHeader, COMPRESSION_THRESHOLD, FRAME_HEADER_SIZE, FRAME_MAGIC,
    MAX_BODY_SIZE, MAX_FRAME_SIZE,
};
pub use messages::{
    Body, CookieDirective, Envelope, ErrorCode, Operation, Request, Response, SameSite,
    SessionCookie, Status, DEFAULT_COOKIE_NAME, PROTOCOL_VERSION,
};
