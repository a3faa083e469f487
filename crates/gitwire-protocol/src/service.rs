//! The two git services a client can talk to.

use std::fmt;

/// A git smart-protocol service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    /// `git-upload-pack`, the server side of fetch and clone.
    UploadPack,
    /// `git-receive-pack`, the server side of push.
    ReceivePack,
}

impl Service {
    /// Returns the service name as used on the wire and as the binary name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UploadPack => "git-upload-pack",
            Self::ReceivePack => "git-receive-pack",
        }
    }

    /// Parses a service name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "git-upload-pack" => Some(Self::UploadPack),
            "git-receive-pack" => Some(Self::ReceivePack),
            _ => None,
        }
    }

    /// Content type of the `info/refs` response.
    pub fn advertisement_content_type(&self) -> String {
        format!("application/x-{}-advertisement", self.as_str())
    }

    /// Content type of the negotiation request body.
    pub fn request_content_type(&self) -> String {
        format!("application/x-{}-request", self.as_str())
    }

    /// Content type of the negotiation response body.
    pub fn result_content_type(&self) -> String {
        format!("application/x-{}-result", self.as_str())
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
