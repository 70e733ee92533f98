//! Identity management: fingerprints, sessions and authentication.
//!
//! A *fingerprint* names an identity and doubles as the key of its storage
//! location. Clients never present the fingerprint as a credential; they
//! present a separate *session token* issued when the identity is
//! established, which the [`SessionTable`] maps back to a fingerprint.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::storage::StorageError;

pub mod manager;
pub mod session;

pub use manager::{Established, IdentityManager, SessionAction};
pub use session::{SessionTable, SessionToken};

/// Longest accepted fingerprint, in bytes.
pub const MAX_FINGERPRINT_LEN: usize = 128;

/// Errors raised while establishing or authenticating an identity.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// No session token, or one that does not map to a provisioned identity.
    #[error("not logged in")]
    Unauthenticated,

    /// The session belongs to a different identity than the one requested.
    #[error("session does not match the requested identity")]
    Mismatch,

    /// A supplied fingerprint cannot serve as a storage key.
    #[error("invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    /// The identity's storage location could not be created or checked.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[source] StorageError),

    /// The session table could not be persisted.
    #[error("session store error: {0}")]
    SessionStore(String),
}

/// Opaque identity token and storage key.
///
/// Restricted to ASCII alphanumerics, `-` and `_` so that it always names
/// exactly one storage location directly under the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Generate a fresh, globally unique fingerprint (UUID v4).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Accept a client-supplied fingerprint.
    pub fn parse(raw: &str) -> Result<Self, IdentityError> {
        if raw.is_empty() {
            return Err(IdentityError::InvalidFingerprint(
                "fingerprint is empty".to_string(),
            ));
        }
        if raw.len() > MAX_FINGERPRINT_LEN {
            return Err(IdentityError::InvalidFingerprint(format!(
                "fingerprint is {} bytes, limit is {}",
                raw.len(),
                MAX_FINGERPRINT_LEN
            )));
        }
        if let Some(bad) = raw
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(IdentityError::InvalidFingerprint(format!(
                "fingerprint contains disallowed character {:?}",
                bad
            )));
        }
        Ok(Self(raw.to_string()))
    }

    /// The fingerprint string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Fingerprint> for String {
    fn from(value: Fingerprint) -> Self {
        value.0
    }
}

/// An authenticated identity.
///
/// Only [`IdentityManager`] hands these out, so holding one proves the
/// caller went through establishment or authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    fingerprint: Fingerprint,
}

impl Identity {
    pub(crate) fn new(fingerprint: Fingerprint) -> Self {
        Self { fingerprint }
    }

    /// The identity's fingerprint.
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Key of the identity's storage location.
    ///
    /// A pure function of the fingerprint; there is no lookup table.
    pub fn location(&self) -> &str {
        self.fingerprint.as_str()
    }
}
