//! Concrete transports.

pub mod file;
pub mod http;
pub mod tcp;

use crate::command::Commander;
use crate::session::{CommandSession, FetchPackSession, SendPackSession};
use crate::{AuthMethod, Result};
use gitwire_protocol::{Endpoint, Service};

/// Opens sessions with remote git services.
pub trait Transport {
    /// Opens a session with the endpoint's upload-pack service.
    fn new_fetch_pack_session(
        &self,
        endpoint: &Endpoint,
        auth: Option<AuthMethod>,
    ) -> Result<Box<dyn FetchPackSession>>;

    /// Opens a session with the endpoint's receive-pack service.
    fn new_send_pack_session(
        &self,
        endpoint: &Endpoint,
        auth: Option<AuthMethod>,
    ) -> Result<Box<dyn SendPackSession>>;
}

/// A [`Transport`] whose sessions run over [`Command`](crate::Command) streams.
#[derive(Debug, Clone)]
pub struct CommandTransport<C> {
    commander: C,
}

impl<C: Commander> CommandTransport<C> {
    /// Wraps a commander.
    pub fn new(commander: C) -> Self {
        Self { commander }
    }

    fn open(
        &self,
        service: Service,
        endpoint: &Endpoint,
        auth: Option<&AuthMethod>,
    ) -> Result<CommandSession<C::Command>> {
        let command = self.commander.command(service, endpoint)?;
        CommandSession::start(command, service, endpoint, auth)
    }
}

impl<C: Commander> Transport for CommandTransport<C> {
    fn new_fetch_pack_session(
        &self,
        endpoint: &Endpoint,
        auth: Option<AuthMethod>,
    ) -> Result<Box<dyn FetchPackSession>> {
        Ok(Box::new(self.open(
            Service::UploadPack,
            endpoint,
            auth.as_ref(),
        )?))
    }

    fn new_send_pack_session(
        &self,
        endpoint: &Endpoint,
        auth: Option<AuthMethod>,
    ) -> Result<Box<dyn SendPackSession>> {
        Ok(Box::new(self.open(
            Service::ReceivePack,
            endpoint,
            auth.as_ref(),
        )?))
    }
}
