//! Establishes identities and authenticates requests against them.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::{Fingerprint, Identity, IdentityError, SessionTable, SessionToken};
use crate::storage::StorageBackend;

/// Outcome of a successful establish.
#[derive(Debug)]
pub struct Established {
    /// The identity now bound to the session.
    pub identity: Identity,
    /// Token the client must present on later requests.
    pub token: SessionToken,
}

impl Established {
    /// What the transport must do with the client's session slot.
    pub fn session_action(&self) -> SessionAction {
        SessionAction::Issue(self.token.clone())
    }
}

/// Instruction to the transport about the client-held session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Store this token on the client.
    Issue(SessionToken),
    /// Discard whatever token the client holds.
    Clear,
}

/// Binds session tokens to fingerprints and fingerprints to storage.
pub struct IdentityManager<B: StorageBackend> {
    backend: Arc<B>,
    sessions: Arc<SessionTable>,
}

impl<B: StorageBackend> IdentityManager<B> {
    /// Create a manager over a backend and session table.
    pub fn new(backend: Arc<B>, sessions: Arc<SessionTable>) -> Self {
        Self { backend, sessions }
    }

    /// The session table.
    pub fn sessions(&self) -> &Arc<SessionTable> {
        &self.sessions
    }

    /// Bind a new session to an identity, provisioning its location.
    ///
    /// A supplied fingerprint is reused as-is (after validation), which lets
    /// a client re-attach to an existing location. Without one a fresh
    /// fingerprint is generated. Provisioning is idempotent, so concurrent
    /// establishes for the same fingerprint all succeed against one location.
    pub async fn establish(&self, supplied: Option<&str>) -> Result<Established, IdentityError> {
        let reused = supplied.is_some_and(|raw| !raw.is_empty());
        let fingerprint = match supplied.filter(|raw| !raw.is_empty()) {
            Some(raw) => Fingerprint::parse(raw).inspect_err(|e| {
                debug!(error = %e, "Rejected supplied fingerprint");
            })?,
            None => Fingerprint::generate(),
        };

        self.backend
            .ensure_location(fingerprint.as_str())
            .await
            .map_err(|e| {
                error!(fingerprint = %fingerprint, error = %e, "Failed to provision storage location");
                IdentityError::StorageUnavailable(e)
            })?;

        let token = self.sessions.issue(fingerprint.clone());
        if let Err(e) = self.persist_sessions().await {
            self.sessions.revoke(token.as_str());
            return Err(e);
        }

        info!(fingerprint = %fingerprint, reused, "Established identity");
        Ok(Established {
            identity: Identity::new(fingerprint),
            token,
        })
    }

    /// Resolve the presented session token to a provisioned identity.
    pub async fn authenticate(&self, token: Option<&str>) -> Result<Identity, IdentityError> {
        let raw = token
            .filter(|raw| !raw.is_empty())
            .ok_or(IdentityError::Unauthenticated)?;

        let Some(fingerprint) = self.sessions.resolve(raw) else {
            debug!("Rejected unknown session token");
            return Err(IdentityError::Unauthenticated);
        };

        let provisioned = self
            .backend
            .location_exists(fingerprint.as_str())
            .await
            .map_err(|e| {
                error!(fingerprint = %fingerprint, error = %e, "Failed to check storage location");
                IdentityError::StorageUnavailable(e)
            })?;
        if !provisioned {
            warn!(fingerprint = %fingerprint, "Session refers to an unprovisioned location");
            return Err(IdentityError::Unauthenticated);
        }

        Ok(Identity::new(fingerprint))
    }

    /// Authenticate and additionally require the session to belong to
    /// `route_fingerprint`.
    pub async fn authenticate_for_route(
        &self,
        token: Option<&str>,
        route_fingerprint: &str,
    ) -> Result<Identity, IdentityError> {
        let identity = self.authenticate(token).await?;
        if identity.fingerprint().as_str() != route_fingerprint {
            warn!(
                fingerprint = %identity.fingerprint(),
                "Session presented for another identity's route"
            );
            return Err(IdentityError::Mismatch);
        }
        Ok(identity)
    }

    /// Client-side logout.
    ///
    /// Only tells the transport to drop the client's token. The session
    /// stays valid server-side, so a client that kept a copy can still use
    /// it; call [`IdentityManager::revoke`] to invalidate it.
    pub fn logout(&self) -> SessionAction {
        SessionAction::Clear
    }

    /// Invalidate a session token server-side. Returns whether it was known.
    pub async fn revoke(&self, token: &str) -> Result<bool, IdentityError> {
        let removed = self.sessions.revoke(token);
        if removed {
            self.persist_sessions().await?;
            info!("Revoked session");
        }
        Ok(removed)
    }

    async fn persist_sessions(&self) -> Result<(), IdentityError> {
        let sessions = Arc::clone(&self.sessions);
        tokio::task::spawn_blocking(move || sessions.save())
            .await
            .map_err(|e| IdentityError::SessionStore(e.to_string()))?
            .map_err(|e| {
                error!(error = %format!("{:#}", e), "Failed to persist session table");
                IdentityError::SessionStore(format!("{:#}", e))
            })
    }
}
