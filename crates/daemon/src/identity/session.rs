//! Persistent session table mapping session tokens to fingerprints.
//!
//! Tokens are 256-bit random values. Only their SHA-256 digests are kept,
//! in memory and on disk, so a leaked `sessions.json` does not hand out
//! working credentials. The table persists to versioned JSON with an
//! atomic temp-file rename.
//!
//! Each fingerprint holds at most [`MAX_SESSIONS_PER_IDENTITY`] live
//! sessions. Issuing past the limit evicts that fingerprint's oldest
//! sessions, so repeated logins cannot grow the table without bound.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use anyhow::{Context, Result};
use dashmap::DashMap;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::Fingerprint;

/// Number of random bytes in a session token.
pub const TOKEN_BYTES: usize = 32;

/// Live sessions kept per fingerprint before the oldest are evicted.
pub const MAX_SESSIONS_PER_IDENTITY: usize = 32;

/// Bearer credential issued to a client when an identity is established.
///
/// `Debug` is redacted so tokens never end up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    /// Generate a fresh random token.
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// The token as sent to the client.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the raw string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(..)")
    }
}

fn token_digest(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

/// A live session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Identity the session authenticates as.
    pub fingerprint: Fingerprint,
    /// When the token was issued.
    pub issued_at: SystemTime,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredSession {
    digest: String,
    #[serde(flatten)]
    record: SessionRecord,
}

/// On-disk format.
#[derive(Debug, Serialize, Deserialize)]
struct SessionTableData {
    version: u32,
    sessions: Vec<StoredSession>,
}

/// Thread-safe session table.
pub struct SessionTable {
    /// Backing file; `None` keeps the table in memory only.
    path: Option<PathBuf>,
    /// Sessions keyed by token digest.
    sessions: DashMap<String, SessionRecord>,
    /// Serializes writers of the backing file.
    save_lock: Mutex<()>,
    /// Serializes issuers so eviction sees a consistent per-identity count.
    issue_lock: Mutex<()>,
}

impl SessionTable {
    /// Create a table that persists to `path`.
    ///
    /// This does not read the file; call [`SessionTable::load`].
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
            sessions: DashMap::new(),
            save_lock: Mutex::new(()),
            issue_lock: Mutex::new(()),
        }
    }

    /// Create a table that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            sessions: DashMap::new(),
            save_lock: Mutex::new(()),
            issue_lock: Mutex::new(()),
        }
    }

    /// Backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Load sessions from the backing file. A missing file yields an empty table.
    pub fn load(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if !path.exists() {
            tracing::debug!("Session table not found at {:?}, starting empty", path);
            return Ok(());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read session table: {}", path.display()))?;
        let data: SessionTableData = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse session table: {}", path.display()))?;
        if data.version != 1 {
            anyhow::bail!(
                "Unsupported session table version {} in {}",
                data.version,
                path.display()
            );
        }

        self.sessions.clear();
        for stored in data.sessions {
            self.sessions.insert(stored.digest, stored.record);
        }

        tracing::info!("Loaded {} sessions from {:?}", self.sessions.len(), path);
        Ok(())
    }

    /// Write the table to the backing file. No-op for in-memory tables.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let _guard = self
            .save_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("Failed to acquire session table save lock"))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create session table directory: {}", parent.display())
            })?;
        }

        let data = SessionTableData {
            version: 1,
            sessions: self
                .sessions
                .iter()
                .map(|entry| StoredSession {
                    digest: entry.key().clone(),
                    record: entry.value().clone(),
                })
                .collect(),
        };
        let contents =
            serde_json::to_string_pretty(&data).context("Failed to serialize session table")?;

        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, &contents).with_context(|| {
            format!("Failed to write temp session table: {}", temp_path.display())
        })?;
        fs::rename(&temp_path, path).with_context(|| {
            format!(
                "Failed to rename temp session table {} to {}",
                temp_path.display(),
                path.display()
            )
        })?;

        tracing::debug!("Saved {} sessions to {:?}", data.sessions.len(), path);
        Ok(())
    }

    /// Issue a new token for `fingerprint`, evicting its oldest sessions
    /// beyond [`MAX_SESSIONS_PER_IDENTITY`].
    pub fn issue(&self, fingerprint: Fingerprint) -> SessionToken {
        // A poisoned lock only means another issuer panicked; the map is intact.
        let _guard = self
            .issue_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let token = SessionToken::generate();
        let digest = token_digest(token.as_str());
        self.sessions.insert(
            digest.clone(),
            SessionRecord {
                fingerprint: fingerprint.clone(),
                issued_at: SystemTime::now(),
            },
        );

        let evicted = self.evict_oldest(&fingerprint, &digest);
        if evicted > 0 {
            tracing::debug!(%fingerprint, evicted, "Evicted oldest sessions");
        }
        token
    }

    /// Drop the oldest sessions of `fingerprint` until at most
    /// [`MAX_SESSIONS_PER_IDENTITY`] remain. `keep` is never evicted.
    fn evict_oldest(&self, fingerprint: &Fingerprint, keep: &str) -> usize {
        let mut owned: Vec<(SystemTime, String)> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().fingerprint == *fingerprint && entry.key() != keep)
            .map(|entry| (entry.value().issued_at, entry.key().clone()))
            .collect();

        let excess = (owned.len() + 1).saturating_sub(MAX_SESSIONS_PER_IDENTITY);
        if excess == 0 {
            return 0;
        }

        owned.sort();
        for (_, digest) in owned.iter().take(excess) {
            self.sessions.remove(digest);
        }
        excess
    }

    /// Fingerprint the presented token authenticates as, if any.
    pub fn resolve(&self, raw_token: &str) -> Option<Fingerprint> {
        self.sessions
            .get(&token_digest(raw_token))
            .map(|record| record.fingerprint.clone())
    }

    /// Forget a token. Returns whether it was known.
    pub fn revoke(&self, raw_token: &str) -> bool {
        self.sessions.remove(&token_digest(raw_token)).is_some()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
