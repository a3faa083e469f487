//! Git protocol error types.

use thiserror::Error;

/// Errors that can occur while encoding or decoding protocol messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The endpoint string could not be turned into an absolute address.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Invalid pkt-line framing.
    #[error("invalid pkt-line: {0}")]
    InvalidPktLine(String),

    /// A payload does not fit in a single pkt-line.
    #[error("pkt-line payload too long: {0} bytes (max {max})", max = crate::pktline::MAX_PAYLOAD_LEN)]
    PayloadTooLong(usize),

    /// Invalid object id.
    #[error("invalid object id: {0}")]
    InvalidObjectId(String),

    /// The stream ended before the server sent anything.
    #[error("empty input: the remote closed the stream without a response")]
    EmptyInput,

    /// The server sent no references and no capabilities.
    #[error("empty advertised-references message")]
    EmptyAdvRefs,

    /// The server answered with an `ERR` line.
    #[error("remote error: {0}")]
    Remote(String),

    /// The byte sequence did not match what the protocol expects at this point.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Invalid pack stream header.
    #[error("invalid pack: {0}")]
    InvalidPack(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Returns true when the remote reported that the repository does not exist
    /// or is not exported.
    pub fn is_repository_not_found(&self) -> bool {
        match self {
            Self::Remote(msg) => is_repository_not_found_message(msg),
            _ => false,
        }
    }
}

/// Messages servers use to say a repository is missing.
///
/// git-daemon, GitHub, GitLab and plain `git-upload-pack` all phrase it
/// differently, and some send it as an `ERR` pkt-line while others write to
/// stderr.
const NOT_FOUND_MARKERS: &[&str] = &[
    "access denied or repository not exported",
    "repository not found",
    "does not appear to be a git repository",
    "no such repository",
    "not a git repository",
];

/// Returns true if `msg` is one of the known "repository not found" phrasings.
pub fn is_repository_not_found_message(msg: &str) -> bool {
    let lower = msg.to_ascii_lowercase();
    NOT_FOUND_MARKERS.iter().any(|m| lower.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_messages() {
        assert!(is_repository_not_found_message(
            "access denied or repository not exported: /foo.git"
        ));
        assert!(is_repository_not_found_message("Repository not found."));
        assert!(is_repository_not_found_message(
            "fatal: '/tmp/x' does not appear to be a git repository"
        ));
        assert!(!is_repository_not_found_message("upload-pack: not our ref"));
    }

    #[test]
    fn remote_error_classification() {
        let err = ProtocolError::Remote("repository not found".into());
        assert!(err.is_repository_not_found());
        let err = ProtocolError::Protocol("repository not found".into());
        assert!(!err.is_repository_not_found());
    }
}
