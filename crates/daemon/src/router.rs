//! Request router for dispatching client operations to the identity manager
//! and the scoped file store.
//!
//! The router is transport-agnostic: it maps a [`Request`] to a
//! [`Response`] and never fails. Every subsystem error is translated into a
//! status and an [`ErrorCode`] here, in one place, so transports only have
//! to render what they are given.

use bytes::Bytes;
use protocol::{
    Body, CookieDirective, ErrorCode, Operation, Request, Response, SessionCookie, Status,
};
use tracing::{debug, error, info};

use crate::files::{ScopedFileStore, StoreError};
use crate::identity::{IdentityError, IdentityManager, SessionAction};
use crate::storage::StorageBackend;

/// Path of the anonymous landing page.
pub const LANDING_PATH: &str = "/";

/// Path of an identity's file page.
pub fn files_path(fingerprint: &str) -> String {
    format!("/files/{}", fingerprint)
}

/// Errors that can occur while handling a request.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// Identity establishment or authentication failed.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// A file operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RouterError {
    /// Status and code for this error.
    pub fn classify(&self) -> (Status, ErrorCode) {
        match self {
            RouterError::Identity(e) => match e {
                IdentityError::Unauthenticated => (Status::Unauthorized, ErrorCode::Unauthenticated),
                IdentityError::Mismatch => (Status::Unauthorized, ErrorCode::Mismatch),
                IdentityError::InvalidFingerprint(_) => {
                    (Status::BadRequest, ErrorCode::InvalidFingerprint)
                }
                IdentityError::StorageUnavailable(_) | IdentityError::SessionStore(_) => {
                    (Status::InternalError, ErrorCode::StorageFailure)
                }
            },
            RouterError::Store(e) => match e {
                StoreError::InvalidName(_) => (Status::BadRequest, ErrorCode::InvalidName),
                StoreError::NotFound(_) => (Status::NotFound, ErrorCode::NotFound),
                StoreError::TooLarge { .. } => (Status::PayloadTooLarge, ErrorCode::TooLarge),
                StoreError::StorageIo(_) => (Status::InternalError, ErrorCode::StorageFailure),
            },
        }
    }

    /// Convert the error to a protocol response.
    ///
    /// Internal failures get a generic message; details stay in the logs.
    pub fn to_response(&self) -> Response {
        let (status, code) = self.classify();
        let message = if status == Status::InternalError {
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        Response::error(status, code, message)
    }
}

/// Dispatches requests to the identity manager and file store.
pub struct Router<B: StorageBackend> {
    identities: IdentityManager<B>,
    files: ScopedFileStore<B>,
    cookie_name: String,
}

impl<B: StorageBackend> Router<B> {
    /// Create a router. `cookie_name` names the session cookie in responses.
    pub fn new(
        identities: IdentityManager<B>,
        files: ScopedFileStore<B>,
        cookie_name: impl Into<String>,
    ) -> Self {
        Self {
            identities,
            files,
            cookie_name: cookie_name.into(),
        }
    }

    /// The identity manager.
    pub fn identities(&self) -> &IdentityManager<B> {
        &self.identities
    }

    /// Handle one request.
    pub async fn handle(&self, request: Request) -> Response {
        let operation = request.operation.kind();
        let response = match self.dispatch(request).await {
            Ok(response) => response,
            Err(e) => {
                let response = e.to_response();
                if response.status == Status::InternalError {
                    error!(operation, error = %e, "Request failed");
                } else {
                    debug!(operation, error = %e, "Request rejected");
                }
                response
            }
        };

        info!(operation, status = response.status.code(), "Handled request");
        response
    }

    async fn dispatch(&self, request: Request) -> Result<Response, RouterError> {
        let session = request.session.as_deref();

        match request.operation {
            Operation::Login { fingerprint } => self.handle_login(fingerprint.as_deref()).await,
            Operation::ViewPage { fingerprint } => self.handle_view_page(session, &fingerprint).await,
            Operation::Logout => Ok(self.handle_logout()),
            Operation::Upload { name, body } => self.handle_upload(session, &name, body).await,
            Operation::Download { name } => self.handle_download(session, &name).await,
            Operation::Delete { name } => self.handle_delete(session, &name).await,
            Operation::List => self.handle_list(session).await,
            Operation::Ping => Ok(Response::ok(Body::Pong)),
        }
    }

    fn cookie_for(&self, action: SessionAction) -> CookieDirective {
        match action {
            SessionAction::Issue(token) => {
                CookieDirective::Set(SessionCookie::strict(&self.cookie_name, token.into_string()))
            }
            SessionAction::Clear => CookieDirective::Clear {
                name: self.cookie_name.clone(),
            },
        }
    }

    // =========================================================================
    // Identity Handlers
    // =========================================================================

    async fn handle_login(&self, fingerprint: Option<&str>) -> Result<Response, RouterError> {
        let established = self.identities.establish(fingerprint).await?;
        let location = files_path(established.identity.fingerprint().as_str());
        let cookie = self.cookie_for(established.session_action());
        Ok(Response::redirect(location).with_cookie(cookie))
    }

    async fn handle_view_page(
        &self,
        session: Option<&str>,
        fingerprint: &str,
    ) -> Result<Response, RouterError> {
        match self
            .identities
            .authenticate_for_route(session, fingerprint)
            .await
        {
            Ok(_) => Ok(Response::ok(Body::Page { logged_in: true })),
            // Anonymous visitors are sent to the landing page rather than refused.
            Err(IdentityError::Unauthenticated) => Ok(Response::redirect(LANDING_PATH)),
            Err(e) => Err(e.into()),
        }
    }

    fn handle_logout(&self) -> Response {
        let cookie = self.cookie_for(self.identities.logout());
        Response::redirect(LANDING_PATH).with_cookie(cookie)
    }

    // =========================================================================
    // File Handlers
    // =========================================================================

    async fn handle_upload(
        &self,
        session: Option<&str>,
        name: &str,
        body: Vec<u8>,
    ) -> Result<Response, RouterError> {
        let identity = self.identities.authenticate(session).await?;
        let receipt = self.files.put(&identity, name, Bytes::from(body)).await?;
        Ok(Response::ok(Body::Ack {
            ok: true,
            sha256: Some(receipt.sha256),
        }))
    }

    async fn handle_download(
        &self,
        session: Option<&str>,
        name: &str,
    ) -> Result<Response, RouterError> {
        let identity = self.identities.authenticate(session).await?;
        let content = self.files.get(&identity, name).await?;
        Ok(Response::ok(Body::Content(content.to_vec())))
    }

    async fn handle_delete(
        &self,
        session: Option<&str>,
        name: &str,
    ) -> Result<Response, RouterError> {
        let identity = self.identities.authenticate(session).await?;
        self.files.delete(&identity, name).await?;
        Ok(Response::ok(Body::Ack {
            ok: true,
            sha256: None,
        }))
    }

    async fn handle_list(&self, session: Option<&str>) -> Result<Response, RouterError> {
        let identity = self.identities.authenticate(session).await?;
        let names = self.files.list(&identity).await?;
        Ok(Response::ok(Body::Names(names)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::identity::SessionTable;
    use crate::storage::MemoryBackend;

    fn create_test_router(max_file_size: u64) -> Router<MemoryBackend> {
        let backend = Arc::new(MemoryBackend::new());
        let sessions = Arc::new(SessionTable::in_memory());
        Router::new(
            IdentityManager::new(Arc::clone(&backend), sessions),
            ScopedFileStore::new(backend, max_file_size),
            "fingerprint",
        )
    }

    async fn login(router: &Router<MemoryBackend>, fingerprint: Option<&str>) -> (String, String) {
        let response = router
            .handle(Request::anonymous(Operation::Login {
                fingerprint: fingerprint.map(str::to_string),
            }))
            .await;
        assert_eq!(response.status, Status::SeeOther);

        let location = response.redirect.unwrap();
        let fingerprint = location.strip_prefix("/files/").unwrap().to_string();
        let token = match response.cookie.unwrap() {
            CookieDirective::Set(cookie) => cookie.value,
            other => panic!("expected Set cookie, got {:?}", other),
        };
        (fingerprint, token)
    }

    #[tokio::test]
    async fn test_login_sets_strict_cookie() {
        let router = create_test_router(1024);
        let response = router
            .handle(Request::anonymous(Operation::Login { fingerprint: None }))
            .await;

        assert_eq!(response.status, Status::SeeOther);
        assert!(response.redirect.as_deref().unwrap().starts_with("/files/"));
        match response.cookie {
            Some(CookieDirective::Set(cookie)) => {
                assert_eq!(cookie.name, "fingerprint");
                assert!(cookie.http_only);
                assert!(cookie.secure);
                assert_eq!(cookie.same_site, protocol::SameSite::Strict);
                assert_eq!(cookie.value.len(), 64);
            }
            other => panic!("expected Set cookie, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_login_with_invalid_fingerprint() {
        let router = create_test_router(1024);
        let response = router
            .handle(Request::anonymous(Operation::Login {
                fingerprint: Some("../etc".to_string()),
            }))
            .await;

        assert_eq!(response.status, Status::BadRequest);
        assert_eq!(response.error_code(), Some(ErrorCode::InvalidFingerprint));
        assert!(response.cookie.is_none());
    }

    #[tokio::test]
    async fn test_cookie_value_is_not_fingerprint() {
        let router = create_test_router(1024);
        let (fingerprint, token) = login(&router, None).await;
        assert_ne!(fingerprint, token);

        // Presenting the fingerprint itself is not a credential.
        let response = router
            .handle(Request::with_session(fingerprint, Operation::List))
            .await;
        assert_eq!(response.status, Status::Unauthorized);
    }

    #[tokio::test]
    async fn test_view_page() {
        let router = create_test_router(1024);
        let (alice, alice_token) = login(&router, Some("alice")).await;
        let (bob, _) = login(&router, Some("bob")).await;

        let own = router
            .handle(Request::with_session(
                alice_token.clone(),
                Operation::ViewPage { fingerprint: alice },
            ))
            .await;
        assert_eq!(own.status, Status::Ok);
        assert_eq!(own.body, Body::Page { logged_in: true });

        let other = router
            .handle(Request::with_session(
                alice_token,
                Operation::ViewPage {
                    fingerprint: bob.clone(),
                },
            ))
            .await;
        assert_eq!(other.status, Status::Unauthorized);
        assert_eq!(other.error_code(), Some(ErrorCode::Mismatch));

        let anonymous = router
            .handle(Request::anonymous(Operation::ViewPage { fingerprint: bob }))
            .await;
        assert_eq!(anonymous.status, Status::SeeOther);
        assert_eq!(anonymous.redirect.as_deref(), Some("/"));
    }

    #[tokio::test]
    async fn test_logout_clears_cookie() {
        let router = create_test_router(1024);
        let response = router.handle(Request::anonymous(Operation::Logout)).await;

        assert_eq!(response.status, Status::SeeOther);
        assert_eq!(response.redirect.as_deref(), Some("/"));
        assert_eq!(
            response.cookie,
            Some(CookieDirective::Clear {
                name: "fingerprint".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_file_operations_require_session() {
        let router = create_test_router(1024);
        for operation in [
            Operation::Upload {
                name: "a".to_string(),
                body: vec![1],
            },
            Operation::Download {
                name: "a".to_string(),
            },
            Operation::Delete {
                name: "a".to_string(),
            },
            Operation::List,
        ] {
            let response = router.handle(Request::anonymous(operation)).await;
            assert_eq!(response.status, Status::Unauthorized);
            assert_eq!(response.error_code(), Some(ErrorCode::Unauthenticated));
        }
    }

    #[tokio::test]
    async fn test_upload_download_delete() {
        let router = create_test_router(1024);
        let (_, token) = login(&router, None).await;

        let upload = router
            .handle(Request::with_session(
                token.clone(),
                Operation::Upload {
                    name: "hello.txt".to_string(),
                    body: b"hello".to_vec(),
                },
            ))
            .await;
        assert_eq!(upload.status, Status::Ok);
        assert!(matches!(upload.body, Body::Ack { ok: true, sha256: Some(_) }));

        let download = router
            .handle(Request::with_session(
                token.clone(),
                Operation::Download {
                    name: "hello.txt".to_string(),
                },
            ))
            .await;
        assert_eq!(download.body, Body::Content(b"hello".to_vec()));

        let list = router
            .handle(Request::with_session(token.clone(), Operation::List))
            .await;
        assert_eq!(list.body, Body::Names(vec!["hello.txt".to_string()]));

        let delete = router
            .handle(Request::with_session(
                token.clone(),
                Operation::Delete {
                    name: "hello.txt".to_string(),
                },
            ))
            .await;
        assert_eq!(delete.status, Status::Ok);

        let again = router
            .handle(Request::with_session(
                token,
                Operation::Delete {
                    name: "hello.txt".to_string(),
                },
            ))
            .await;
        assert_eq!(again.status, Status::NotFound);
        assert_eq!(again.error_code(), Some(ErrorCode::NotFound));
    }

    #[tokio::test]
    async fn test_invalid_names_are_bad_requests() {
        let router = create_test_router(1024);
        let (_, token) = login(&router, None).await;

        for name in ["", "..", "../secret", "a/b"] {
            let response = router
                .handle(Request::with_session(
                    token.clone(),
                    Operation::Download {
                        name: name.to_string(),
                    },
                ))
                .await;
            assert_eq!(response.status, Status::BadRequest, "name {:?}", name);
            assert_eq!(response.error_code(), Some(ErrorCode::InvalidName));
        }
    }

    #[tokio::test]
    async fn test_upload_too_large() {
        let router = create_test_router(4);
        let (_, token) = login(&router, None).await;

        let response = router
            .handle(Request::with_session(
                token,
                Operation::Upload {
                    name: "big".to_string(),
                    body: vec![0; 5],
                },
            ))
            .await;
        assert_eq!(response.status, Status::PayloadTooLarge);
        assert_eq!(response.error_code(), Some(ErrorCode::TooLarge));
    }

    #[tokio::test]
    async fn test_ping() {
        let router = create_test_router(1024);
        let response = router.handle(Request::anonymous(Operation::Ping)).await;
        assert_eq!(response, Response::ok(Body::Pong));
    }

    #[test]
    fn test_internal_errors_hide_details() {
        let err = RouterError::Store(StoreError::StorageIo(
            crate::storage::StorageError::LocationNotFound("secret-location".to_string()),
        ));
        let response = err.to_response();

        assert_eq!(response.status, Status::InternalError);
        assert_eq!(response.error_code(), Some(ErrorCode::StorageFailure));
        match response.body {
            Body::Error { error, .. } => assert!(!error.contains("secret-location")),
            other => panic!("expected error body, got {:?}", other),
        }
    }

    #[test]
    fn test_files_path() {
        assert_eq!(files_path("abc"), "/files/abc");
    }
}
