//! Error types for the RPC layer and their mapping to POSIX error codes.
//!
//! Every failure a verb can produce is one of four kinds:
//!
//! - [`ConfigError`]: the call could not be built (no token, no endpoint).
//! - [`TransportError`]: the HTTP exchange itself failed.
//! - [`ProtocolError`]: the reply did not have the expected shape.
//! - [`RemoteError`]: the remote answered with a non-zero status byte.
//!
//! [`RpcError::to_errno`] gives the code the filesystem adapter replies with.

use crate::status::RemoteError;
use crate::wire::WireError;
use thiserror::Error;

/// The request could not be constructed from the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("no access token configured")]
    MissingToken,

    #[error("no endpoint configured")]
    MissingEndpoint,

    #[error("empty operation name")]
    EmptyMethod,

    #[error("invalid operation name: {0:?}")]
    InvalidMethod(String),

    #[error("invalid header name: {0:?}")]
    InvalidHeader(String),

    #[error("invalid endpoint {endpoint:?}: {detail}")]
    InvalidEndpoint { endpoint: String, detail: String },
}

/// Category of a failed HTTP exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The server answered 403.
    AuthRejected,
    /// The server answered with another non-success status.
    Remote { status: u16 },
    /// DNS, connect, TLS, reset or timeout.
    Local,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportErrorKind::AuthRejected => f.write_str("authentication rejected"),
            TransportErrorKind::Remote { status } => write!(f, "HTTP status {status}"),
            TransportErrorKind::Local => f.write_str("connection failed"),
        }
    }
}

/// A failed HTTP exchange. The detail string is for logging only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {detail}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub detail: String,
}

impl TransportError {
    pub fn auth_rejected() -> Self {
        Self {
            kind: TransportErrorKind::AuthRejected,
            detail: "Invalid access token".to_string(),
        }
    }

    pub fn remote(status: u16, detail: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Remote { status },
            detail: detail.into(),
        }
    }

    pub fn local(detail: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::Local,
            detail: detail.into(),
        }
    }
}

/// The reply did not match the layout expected for the operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Fewer bytes than the operation's minimum response size.
    #[error("{operation} response too short: expected at least {expected} bytes, got {actual}")]
    ShortResponse {
        operation: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The server sent more bytes than the response ceiling.
    #[error("response exceeds the {limit} byte limit")]
    Overflow { limit: usize },

    /// A fixed-layout record failed to decode.
    #[error("malformed record: {0}")]
    Malformed(#[from] WireError),
}

/// Errors returned by every RPC verb.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl RpcError {
    /// Converts this error to a libc error code for the filesystem reply.
    pub fn to_errno(&self) -> i32 {
        match self {
            RpcError::Config(_) => libc::EIO,
            RpcError::Transport(e) => match e.kind {
                TransportErrorKind::AuthRejected => libc::EACCES,
                TransportErrorKind::Remote { .. } | TransportErrorKind::Local => libc::EIO,
            },
            RpcError::Protocol(_) => libc::ECONNRESET,
            RpcError::Remote(e) => e.to_errno(),
        }
    }

    /// True when the remote answered with the given status category.
    pub fn is_remote(&self, kind: crate::status::RemoteErrorKind) -> bool {
        matches!(self, RpcError::Remote(e) if e.kind == kind)
    }
}

impl From<WireError> for RpcError {
    fn from(e: WireError) -> Self {
        RpcError::Protocol(ProtocolError::Malformed(e))
    }
}

/// Result type for RPC operations.
pub type RpcResult<T> = Result<T, RpcError>;

/// Extension trait to convert errors to errno.
pub trait ToErrno {
    /// Converts this error to a libc error code.
    fn to_errno(&self) -> i32;
}

impl ToErrno for RpcError {
    fn to_errno(&self) -> i32 {
        RpcError::to_errno(self)
    }
}

impl ToErrno for RemoteError {
    fn to_errno(&self) -> i32 {
        RemoteError::to_errno(self)
    }
}

impl ToErrno for std::io::Error {
    fn to_errno(&self) -> i32 {
        self.raw_os_error().unwrap_or(libc::EIO)
    }
}
