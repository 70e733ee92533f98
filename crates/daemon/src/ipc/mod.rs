//! Unix Domain Socket transport between clients and the daemon.
//!
//! ## Overview
//!
//! Each message is a MessagePack-encoded [`protocol::Envelope`] carried in
//! one length-prefixed frame (see [`protocol::FrameCodec`]). A client sends
//! `Envelope<Request>` and receives an `Envelope<Response>` with the same
//! sequence number. A connection may carry any number of requests, handled
//! one at a time in order.
//!
//! ## Socket Path
//!
//! The socket path follows the XDG Base Directory Specification:
//! - Primary: `$XDG_RUNTIME_DIR/lockbox/lockbox.sock`
//! - Fallback: `/tmp/lockbox-$UID/lockbox.sock`
//!
//! ## Example
//!
//! ```rust,no_run
//! use daemon::ipc::{default_socket_path, Client};
//! use protocol::{Operation, Request};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::connect(&default_socket_path()).await?;
//!     let response = client.call(Request::anonymous(Operation::Ping)).await?;
//!     println!("{:?}", response.status);
//!     Ok(())
//! }
//! ```

mod client;
mod connection;
mod server;

pub use client::Client;
pub use connection::{Connection, IpcError};
pub use server::Server;

use std::path::PathBuf;

/// Get the default socket path.
///
/// 1. If `$XDG_RUNTIME_DIR` is set: `$XDG_RUNTIME_DIR/lockbox/lockbox.sock`
/// 2. Otherwise: `/tmp/lockbox-$UID/lockbox.sock`
pub fn default_socket_path() -> PathBuf {
    use std::os::unix::fs::MetadataExt;

    match std::env::var("XDG_RUNTIME_DIR") {
        Ok(runtime_dir) if !runtime_dir.is_empty() => {
            PathBuf::from(runtime_dir).join("lockbox").join("lockbox.sock")
        }
        _ => {
            // Get UID by checking metadata of a file we own
            let uid = std::fs::metadata("/proc/self")
                .map(|m| m.uid())
                .unwrap_or(0);

            PathBuf::from(format!("/tmp/lockbox-{}", uid)).join("lockbox.sock")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn with_runtime_dir<F: FnOnce()>(value: Option<&str>, f: F) {
        let original = std::env::var("XDG_RUNTIME_DIR").ok();
        match value {
            Some(v) => std::env::set_var("XDG_RUNTIME_DIR", v),
            None => std::env::remove_var("XDG_RUNTIME_DIR"),
        }

        f();

        match original {
            Some(v) => std::env::set_var("XDG_RUNTIME_DIR", v),
            None => std::env::remove_var("XDG_RUNTIME_DIR"),
        }
    }

    #[test]
    #[serial]
    fn test_socket_path_with_xdg_runtime_dir() {
        with_runtime_dir(Some("/run/user/1000"), || {
            assert_eq!(
                default_socket_path(),
                PathBuf::from("/run/user/1000/lockbox/lockbox.sock")
            );
        });
    }

    #[test]
    #[serial]
    fn test_socket_path_without_xdg_runtime_dir() {
        with_runtime_dir(None, || {
            let path = default_socket_path();
            let path = path.to_str().unwrap();
            assert!(path.starts_with("/tmp/lockbox-"));
            assert!(path.ends_with("/lockbox.sock"));
        });
    }

    #[test]
    #[serial]
    fn test_socket_path_empty_xdg_runtime_dir() {
        with_runtime_dir(Some(""), || {
            assert!(default_socket_path().is_absolute());
        });
    }
}
