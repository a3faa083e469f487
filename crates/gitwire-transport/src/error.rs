//! Transport error types.

use gitwire_protocol::{Endpoint, ProtocolError};
use thiserror::Error;

/// Errors returned by transports and sessions.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The endpoint could not be parsed.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// No transport handles this scheme.
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    /// The auth method does not apply to this transport.
    #[error("invalid auth method")]
    InvalidAuthMethod,

    /// The remote repository does not exist or is not exported.
    #[error("repository not found")]
    RepositoryNotFound,

    /// The remote repository exists but advertises no references.
    #[error("remote repository is empty")]
    EmptyRemoteRepository,

    /// The server asked for credentials.
    #[error("authentication required")]
    AuthenticationRequired,

    /// The credentials were refused.
    #[error("authorization failed")]
    AuthorizationFailed,

    /// A fetch was requested without any wanted object.
    #[error("empty upload-pack request")]
    EmptyUploadPackRequest,

    /// The request is malformed for this session.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The operation is not implemented by this transport or server.
    #[error("{0}")]
    NotSupported(String),

    /// `start` was called on a command that is already running.
    #[error("already connected")]
    AlreadyConnected,

    /// The session or command was closed.
    #[error("session closed")]
    SessionClosed,

    /// The operation is not valid in the session's current state.
    #[error("invalid session state: {0}")]
    InvalidState(String),

    /// The HTTP server answered with an unexpected status.
    #[error("unexpected HTTP status {status} from {url}")]
    Http {
        /// Status code.
        status: u16,
        /// Request URL, without credentials.
        url: String,
    },

    /// The HTTP client failed before a status was received.
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// The server sent an error message.
    #[error("remote error: {0}")]
    Remote(String),

    /// The byte stream violated the protocol.
    #[error("protocol error: {0}")]
    Protocol(#[source] ProtocolError),

    /// I/O failure while talking to the remote.
    #[error("I/O error during {phase} on {endpoint}: {source}")]
    Io {
        /// What the transport was doing.
        phase: &'static str,
        /// Redacted endpoint.
        endpoint: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration could not be loaded.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl TransportError {
    /// Wraps an I/O error with the phase and endpoint it happened on.
    pub fn io(phase: &'static str, endpoint: &Endpoint, source: std::io::Error) -> Self {
        Self::Io {
            phase,
            endpoint: endpoint.redacted(),
            source,
        }
    }

    /// Converts a protocol error raised during `phase`, attaching the
    /// endpoint to I/O failures.
    pub fn from_protocol(err: ProtocolError, phase: &'static str, endpoint: &Endpoint) -> Self {
        match err {
            ProtocolError::Io(source) => Self::io(phase, endpoint, source),
            other => other.into(),
        }
    }
}

impl From<ProtocolError> for TransportError {
    fn from(err: ProtocolError) -> Self {
        if err.is_repository_not_found() {
            return Self::RepositoryNotFound;
        }
        match err {
            ProtocolError::InvalidEndpoint(msg) => Self::InvalidEndpoint(msg),
            ProtocolError::Remote(msg) => Self::Remote(msg),
            other => Self::Protocol(other),
        }
    }
}
