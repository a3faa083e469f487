//! Transport selection by endpoint scheme.

use crate::session::{FetchPackSession, SendPackSession};
use crate::transport::file::FileCommander;
use crate::transport::http::HttpTransport;
use crate::transport::tcp::TcpCommander;
use crate::transport::{CommandTransport, Transport};
use crate::{AuthMethod, Result, TransportConfig, TransportError};
use gitwire_protocol::{Endpoint, Scheme};

/// Opens sessions with any supported remote.
///
/// `file` endpoints run the local service binaries, `git` endpoints talk to
/// a git daemon, `http` and `https` use smart HTTP. `ssh` is not supported.
pub struct Client {
    file: CommandTransport<FileCommander>,
    git: CommandTransport<TcpCommander>,
    http: HttpTransport,
}

impl Client {
    /// Builds the transports described by `config`.
    pub fn new(config: &TransportConfig) -> Result<Self> {
        Ok(Self {
            file: CommandTransport::new(FileCommander::new(config)),
            git: CommandTransport::new(TcpCommander::new(config)),
            http: HttpTransport::from_config(config)?,
        })
    }

    /// Returns the transport for the endpoint's scheme.
    pub fn transport(&self, endpoint: &Endpoint) -> Result<&dyn Transport> {
        let transport: &dyn Transport = match endpoint.scheme() {
            Scheme::File => &self.file,
            Scheme::Git => &self.git,
            Scheme::Http | Scheme::Https => &self.http,
            Scheme::Ssh => {
                return Err(TransportError::UnsupportedScheme(
                    endpoint.scheme().to_string(),
                ))
            }
        };
        Ok(transport)
    }

    /// Opens a fetch session.
    pub fn new_fetch_pack_session(
        &self,
        endpoint: &Endpoint,
        auth: Option<AuthMethod>,
    ) -> Result<Box<dyn FetchPackSession>> {
        tracing::info!(endpoint = %endpoint.redacted(), "opening fetch session");
        self.transport(endpoint)?
            .new_fetch_pack_session(endpoint, auth)
    }

    /// Opens a push session.
    pub fn new_send_pack_session(
        &self,
        endpoint: &Endpoint,
        auth: Option<AuthMethod>,
    ) -> Result<Box<dyn SendPackSession>> {
        tracing::info!(endpoint = %endpoint.redacted(), "opening push session");
        self.transport(endpoint)?
            .new_send_pack_session(endpoint, auth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssh_unsupported() {
        let client = Client::new(&TransportConfig::default()).unwrap();
        let ep = Endpoint::parse("git@example.com:org/repo.git").unwrap();
        assert_eq!(ep.scheme(), Scheme::Ssh);
        assert!(matches!(
            client.new_fetch_pack_session(&ep, None),
            Err(TransportError::UnsupportedScheme(s)) if s == "ssh"
        ));
    }

    #[test]
    fn test_file_rejects_auth() {
        let client = Client::new(&TransportConfig::default()).unwrap();
        let ep = Endpoint::parse("file:///srv/git/repo.git").unwrap();
        let auth = AuthMethod::basic("u", "p");
        assert!(matches!(
            client.new_fetch_pack_session(&ep, Some(auth)),
            Err(TransportError::InvalidAuthMethod)
        ));
    }

    #[test]
    fn test_git_rejects_auth() {
        let client = Client::new(&TransportConfig::default()).unwrap();
        let ep = Endpoint::parse("git://127.0.0.1:1/repo.git").unwrap();
        assert!(matches!(
            client.new_send_pack_session(&ep, Some(AuthMethod::token("t"))),
            Err(TransportError::InvalidAuthMethod)
        ));
    }
}
