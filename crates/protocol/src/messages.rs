//! Request and response types exchanged between a front end and the daemon.
//!
//! The front end (an HTTP gateway, the CLI) parses whatever its own transport
//! carries into a [`Request`]: the presented session cookie and one
//! [`Operation`]. The daemon answers with a [`Response`] describing the
//! status, an optional redirect, an optional cookie change and a body. All
//! messages travel inside an [`Envelope`] serialized with MessagePack.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};

/// Current protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Default name of the session cookie.
pub const DEFAULT_COOKIE_NAME: &str = "fingerprint";

/// Envelope wrapper for requests and responses.
///
/// Responses reuse the sequence number of the request they answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// Protocol version for compatibility checking.
    pub version: u8,
    /// Sequence number pairing a response with its request.
    pub sequence: u64,
    /// The wrapped message.
    pub payload: T,
}

impl<T> Envelope<T> {
    /// Create a new envelope with the current protocol version.
    pub fn new(sequence: u64, payload: T) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            sequence,
            payload,
        }
    }
}

impl<T: Serialize> Envelope<T> {
    /// Serialize the envelope to MessagePack bytes.
    ///
    /// Structs are written as maps so the tagged `Operation` and `Body`
    /// enums decode for every variant shape.
    pub fn to_msgpack(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(self)?)
    }
}

impl<T: DeserializeOwned> Envelope<T> {
    /// Deserialize an envelope from MessagePack bytes, rejecting foreign versions.
    pub fn from_msgpack(bytes: &[u8]) -> Result<Self> {
        let envelope: Self = rmp_serde::from_slice(bytes)?;
        if envelope.version != PROTOCOL_VERSION {
            return Err(ProtocolError::VersionMismatch {
                expected: PROTOCOL_VERSION,
                got: envelope.version,
            });
        }
        Ok(envelope)
    }
}

// ============================================================================
// Requests
// ============================================================================

/// A parsed request delivered by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Value of the session cookie, if the client presented one.
    pub session: Option<String>,
    /// The requested operation.
    pub operation: Operation,
}

impl Request {
    /// Build a request that carries no session cookie.
    pub fn anonymous(operation: Operation) -> Self {
        Self {
            session: None,
            operation,
        }
    }

    /// Build a request presenting the given session cookie.
    pub fn with_session(session: impl Into<String>, operation: Operation) -> Self {
        Self {
            session: Some(session.into()),
            operation,
        }
    }
}

/// Operations understood by the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Operation {
    /// Establish an identity, optionally reusing a known fingerprint.
    Login {
        /// Fingerprint to reuse. `None` or empty asks for a fresh one.
        fingerprint: Option<String>,
    },
    /// Authorize rendering of an identity's file page.
    ViewPage {
        /// Fingerprint named in the page path.
        fingerprint: String,
    },
    /// Clear the session cookie.
    Logout,
    /// Store a file, replacing any previous content.
    Upload {
        /// File name within the identity's storage.
        name: String,
        /// Raw file content.
        #[serde(with = "serde_bytes")]
        body: Vec<u8>,
    },
    /// Fetch a file's content.
    Download {
        /// File name within the identity's storage.
        name: String,
    },
    /// Remove a file.
    Delete {
        /// File name within the identity's storage.
        name: String,
    },
    /// List stored file names.
    List,
    /// Liveness check.
    Ping,
}

impl Operation {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Login { .. } => "login",
            Operation::ViewPage { .. } => "view_page",
            Operation::Logout => "logout",
            Operation::Upload { .. } => "upload",
            Operation::Download { .. } => "download",
            Operation::Delete { .. } => "delete",
            Operation::List => "list",
            Operation::Ping => "ping",
        }
    }
}

// ============================================================================
// Responses
// ============================================================================

/// Externally visible outcome of a request, numbered like HTTP statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// 200
    Ok,
    /// 303, see [`Response::redirect`].
    SeeOther,
    /// 400
    BadRequest,
    /// 401
    Unauthorized,
    /// 404
    NotFound,
    /// 413
    PayloadTooLarge,
    /// 500
    InternalError,
}

impl Status {
    /// Numeric HTTP status code.
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::SeeOther => 303,
            Status::BadRequest => 400,
            Status::Unauthorized => 401,
            Status::NotFound => 404,
            Status::PayloadTooLarge => 413,
            Status::InternalError => 500,
        }
    }

    /// Whether the status reports success (including redirects).
    pub fn is_success(self) -> bool {
        matches!(self, Status::Ok | Status::SeeOther)
    }
}

/// Machine-readable failure kinds, so clients can tell "bad request" from
/// "server broke" without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// No session, or the session does not map to a provisioned identity.
    Unauthenticated,
    /// Session identity differs from the identity named in the request path.
    Mismatch,
    /// File name is empty or escapes the identity's storage.
    InvalidName,
    /// Supplied fingerprint cannot be used as a storage key.
    InvalidFingerprint,
    /// File does not exist.
    NotFound,
    /// Upload exceeds the configured size limit.
    TooLarge,
    /// Storage backend failure.
    StorageFailure,
}

/// SameSite policy of a cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    /// Sent only on same-site requests.
    Strict,
    /// Sent on top-level cross-site navigations.
    Lax,
    /// Sent on all requests.
    None,
}

impl SameSite {
    fn as_str(self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// A session cookie the transport must set on the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value (the session token).
    pub value: String,
    /// Hide the cookie from scripts.
    pub http_only: bool,
    /// Only send over TLS.
    pub secure: bool,
    /// Cross-site policy.
    pub same_site: SameSite,
}

impl SessionCookie {
    /// A cookie with the attributes the daemon always uses: HTTP-only,
    /// secure and strict same-site.
    pub fn strict(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            http_only: true,
            secure: true,
            same_site: SameSite::Strict,
        }
    }

    /// Render as a `Set-Cookie` header value.
    pub fn to_header_value(&self) -> String {
        let mut header = format!("{}={}; Path=/", self.name, self.value);
        if self.http_only {
            header.push_str("; HttpOnly");
        }
        if self.secure {
            header.push_str("; Secure");
        }
        header.push_str("; SameSite=");
        header.push_str(self.same_site.as_str());
        header
    }
}

/// Change to the client's session cookie requested by a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CookieDirective {
    /// Set the cookie.
    Set(SessionCookie),
    /// Expire the named cookie.
    Clear {
        /// Cookie name.
        name: String,
    },
}

impl CookieDirective {
    /// Render as a `Set-Cookie` header value.
    pub fn to_header_value(&self) -> String {
        match self {
            CookieDirective::Set(cookie) => cookie.to_header_value(),
            CookieDirective::Clear { name } => format!("{}=; Path=/; Max-Age=0", name),
        }
    }
}

/// Response payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Body {
    /// Nothing to return (redirects, logout).
    Empty,
    /// Flags for rendering an identity's page.
    Page {
        /// Whether the viewer is logged in as the page's identity.
        logged_in: bool,
    },
    /// Success acknowledgement for mutations.
    Ack {
        /// Always `true`.
        ok: bool,
        /// Hex SHA-256 of stored content, for uploads.
        sha256: Option<String>,
    },
    /// Raw file content.
    Content(#[serde(with = "serde_bytes")] Vec<u8>),
    /// Stored file names.
    Names(Vec<String>),
    /// Reply to a ping.
    Pong,
    /// Failure description.
    Error {
        /// Failure kind.
        code: ErrorCode,
        /// Human-readable message.
        error: String,
    },
}

/// A response produced by the daemon for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Outcome.
    pub status: Status,
    /// Location to redirect to, for [`Status::SeeOther`].
    pub redirect: Option<String>,
    /// Cookie change to apply on the client.
    pub cookie: Option<CookieDirective>,
    /// Payload.
    pub body: Body,
}

impl Response {
    /// A 200 response with the given body.
    pub fn ok(body: Body) -> Self {
        Self {
            status: Status::Ok,
            redirect: None,
            cookie: None,
            body,
        }
    }

    /// A 303 redirect.
    pub fn redirect(location: impl Into<String>) -> Self {
        Self {
            status: Status::SeeOther,
            redirect: Some(location.into()),
            cookie: None,
            body: Body::Empty,
        }
    }

    /// A failure response.
    pub fn error(status: Status, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status,
            redirect: None,
            cookie: None,
            body: Body::Error {
                code,
                error: message.into(),
            },
        }
    }

    /// Attach a cookie directive.
    pub fn with_cookie(mut self, cookie: CookieDirective) -> Self {
        self.cookie = Some(cookie);
        self
    }

    /// The error code carried in the body, if this is a failure.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match &self.body {
            Body::Error { code, .. } => Some(*code),
            _ => None,
        }
    }
}
