//! Protocol sessions on top of a transport.
//!
//! A session owns one conversation with one remote service. It reads the
//! reference advertisement at most once, then performs a single fetch or
//! push exchange.

use crate::command::Command;
use crate::{AuthMethod, Result, TransportError};
use gitwire_protocol::{
    capability, Acknowledgement, AdvRefs, Endpoint, PktLineReader, PktLineWriter, ProtocolError,
    ReferenceUpdateRequest, ReportStatus, Service, ShallowUpdate, SidebandReader,
    UploadPackRequest,
};
use std::fmt;
use std::io::{self, Read, Write};

/// Operations common to fetch and push sessions.
pub trait Session {
    /// Returns the server's reference advertisement, requesting it on first
    /// use and caching it afterwards.
    fn advertised_references(&mut self) -> Result<&AdvRefs>;

    /// Ends the session. Idempotent.
    fn close(&mut self) -> Result<()>;
}

/// A session with an upload-pack service.
pub trait FetchPackSession: Session {
    /// Sends the request and returns the response, whose reader yields the
    /// raw pack bytes.
    fn fetch_pack(&mut self, request: &UploadPackRequest) -> Result<UploadPackResponse<'_>>;
}

/// A session with a receive-pack service.
pub trait SendPackSession: Session {
    /// Sends the commands and pack and returns the server's report.
    fn send_pack(&mut self, request: ReferenceUpdateRequest) -> Result<ReportStatus>;
}

/// The server's answer to an upload-pack request.
///
/// Reading from the response yields the pack stream, already demultiplexed
/// when side-band was negotiated.
pub struct UploadPackResponse<'a> {
    /// Shallow boundary changes; empty unless a depth was requested.
    pub shallow_update: ShallowUpdate,
    /// The server's ACK or NAK.
    pub acknowledgement: Acknowledgement,
    pack: Box<dyn Read + 'a>,
}

impl Read for UploadPackResponse<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.pack.read(buf)
    }
}

impl fmt::Debug for UploadPackResponse<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadPackResponse")
            .field("shallow_update", &self.shallow_update)
            .field("acknowledgement", &self.acknowledgement)
            .finish_non_exhaustive()
    }
}

/// Reads the shallow-update section, the acknowledgement and sets up the
/// pack reader.
pub(crate) fn read_upload_pack_response<'a, R: Read + 'a>(
    reader: &'a mut PktLineReader<R>,
    request: &UploadPackRequest,
) -> gitwire_protocol::Result<UploadPackResponse<'a>> {
    let shallow_update = if request.depth.is_some() {
        ShallowUpdate::decode(reader)?
    } else {
        ShallowUpdate::default()
    };
    let acknowledgement = Acknowledgement::decode(reader)?;
    tracing::debug!(?acknowledgement, shallows = shallow_update.shallows.len(), "upload-pack response");

    let pack: Box<dyn Read + 'a> = if request.uses_side_band() {
        Box::new(SidebandReader::new(PktLineReader::new(reader.inner_mut())))
    } else {
        Box::new(reader.inner_mut())
    };
    Ok(UploadPackResponse {
        shallow_update,
        acknowledgement,
        pack,
    })
}

/// Decodes an advertisement and applies the per-service empty-repository
/// rules and capability filtering.
pub(crate) fn decode_advertisement<R: Read>(
    reader: &mut PktLineReader<R>,
    service: Service,
    endpoint: &Endpoint,
) -> Result<AdvRefs> {
    let mut adv = match AdvRefs::decode(reader) {
        Ok(adv) => adv,
        Err(ProtocolError::EmptyAdvRefs) if service == Service::UploadPack => {
            return Err(TransportError::EmptyRemoteRepository)
        }
        Err(e) => return Err(TransportError::from_protocol(e, "read advertisement", endpoint)),
    };
    if service == Service::UploadPack && adv.is_empty() {
        return Err(TransportError::EmptyRemoteRepository);
    }
    adv.capabilities.filter_unsupported();
    tracing::debug!(
        endpoint = %endpoint.redacted(),
        refs = adv.references.len(),
        capabilities = %adv.capabilities,
        "received reference advertisement"
    );
    Ok(adv)
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    Unadvertised,
    Advertised,
    Exchanging,
    Closed,
}

/// A session over a [`Command`] stream (local exec or `git://`).
///
/// Stream sessions are stateful: once a fetch or push ran, the remote
/// service has finished and the session only accepts `close`.
pub struct CommandSession<C: Command> {
    command: C,
    service: Service,
    endpoint: Endpoint,
    stdin: Option<Box<dyn Write + Send>>,
    stdout: PktLineReader<Box<dyn Read + Send>>,
    adv_refs: Option<AdvRefs>,
    state: State,
}

impl<C: Command> CommandSession<C> {
    /// Installs `auth`, starts the command and takes its pipes.
    pub fn start(
        mut command: C,
        service: Service,
        endpoint: &Endpoint,
        auth: Option<&AuthMethod>,
    ) -> Result<Self> {
        command.set_auth(auth)?;
        command.start()?;
        let stdin = command.take_stdin()?;
        let stdout = command.take_stdout()?;
        tracing::info!(endpoint = %endpoint.redacted(), %service, "session started");
        Ok(Self {
            command,
            service,
            endpoint: endpoint.clone(),
            stdin: Some(stdin),
            stdout: PktLineReader::new(stdout),
            adv_refs: None,
            state: State::Unadvertised,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == State::Closed {
            return Err(TransportError::SessionClosed);
        }
        Ok(())
    }

    /// Moves the session into the exchange, which may happen only once.
    fn begin_exchange(&mut self) -> Result<()> {
        if self.state == State::Exchanging {
            return Err(TransportError::InvalidState(format!(
                "{} exchange already performed on this session",
                self.service
            )));
        }
        self.state = State::Exchanging;
        Ok(())
    }

    /// Maps a protocol error, consulting the service's stderr when it exited
    /// without writing anything.
    fn protocol_error(&mut self, err: ProtocolError, phase: &'static str) -> TransportError {
        if matches!(err, ProtocolError::EmptyInput) {
            // Reap the process so its stderr is fully collected.
            if let Err(e) = self.command.close() {
                tracing::debug!(error = %e, "failed to stop command after empty input");
            }
            if let Some(stderr) = self.command.stderr() {
                if gitwire_protocol::is_repository_not_found_message(&stderr) {
                    return TransportError::RepositoryNotFound;
                }
                if !stderr.trim().is_empty() {
                    return TransportError::Remote(stderr.trim().to_string());
                }
            }
        }
        TransportError::from_protocol(err, phase, &self.endpoint)
    }

    fn stdin(&mut self) -> Result<&mut Box<dyn Write + Send>> {
        self.stdin
            .as_mut()
            .ok_or_else(|| TransportError::InvalidState("input stream already closed".to_string()))
    }
}

impl<C: Command> Session for CommandSession<C> {
    fn advertised_references(&mut self) -> Result<&AdvRefs> {
        self.ensure_open()?;
        if self.adv_refs.is_none() {
            let adv = match decode_advertisement(&mut self.stdout, self.service, &self.endpoint) {
                Ok(adv) => adv,
                Err(TransportError::Protocol(e)) => return Err(self.protocol_error(e, "read advertisement")),
                Err(e) => return Err(e),
            };
            self.adv_refs = Some(adv);
            self.state = State::Advertised;
        }
        self.adv_refs
            .as_ref()
            .ok_or_else(|| TransportError::InvalidState("advertisement missing".to_string()))
    }

    fn close(&mut self) -> Result<()> {
        if self.state == State::Closed {
            return Ok(());
        }
        if self.state != State::Exchanging {
            // Tell the service no request follows.
            if let Some(stdin) = self.stdin.as_mut() {
                let mut writer = PktLineWriter::new(stdin);
                if let Err(e) = writer.flush_pkt().and_then(|()| writer.flush()) {
                    tracing::debug!(error = %e, "failed to send final flush");
                }
            }
        }
        self.stdin = None;
        self.state = State::Closed;
        tracing::info!(endpoint = %self.endpoint.redacted(), service = %self.service, "session closed");
        self.command.close()
    }
}

impl<C: Command> FetchPackSession for CommandSession<C> {
    fn fetch_pack(&mut self, request: &UploadPackRequest) -> Result<UploadPackResponse<'_>> {
        self.ensure_open()?;
        if request.is_empty() {
            return Err(TransportError::EmptyUploadPackRequest);
        }
        let adv = self.advertised_references()?;
        request.validate(&adv.capabilities)?;
        self.begin_exchange()?;

        tracing::debug!(
            wants = request.wants.len(),
            haves = request.haves.len(),
            depth = ?request.depth,
            "sending upload-pack request"
        );
        let endpoint = self.endpoint.clone();
        let stdin = self.stdin()?;
        request
            .encode(stdin)
            .map_err(|e| TransportError::from_protocol(e, "send upload-pack request", &endpoint))?;

        read_upload_pack_response(&mut self.stdout, request)
            .map_err(|e| TransportError::from_protocol(e, "read upload-pack response", &endpoint))
    }
}

impl<C: Command> SendPackSession for CommandSession<C> {
    fn send_pack(&mut self, mut request: ReferenceUpdateRequest) -> Result<ReportStatus> {
        self.ensure_open()?;
        let adv = self.advertised_references()?;
        if !adv.capabilities.supports(capability::REPORT_STATUS) {
            return Err(TransportError::NotSupported(
                "server does not support report-status".to_string(),
            ));
        }
        request.validate(&adv.capabilities)?;
        if !request.is_delete_only() && !request.has_pack() {
            return Err(TransportError::InvalidRequest(
                "reference updates other than deletes need a pack".to_string(),
            ));
        }
        self.begin_exchange()?;

        tracing::debug!(commands = request.commands.len(), "sending receive-pack request");
        let endpoint = self.endpoint.clone();
        let mut stdin = self
            .stdin
            .take()
            .ok_or_else(|| TransportError::InvalidState("input stream already closed".to_string()))?;
        request
            .encode_commands(&mut stdin)
            .map_err(|e| TransportError::from_protocol(e, "send update commands", &endpoint))?;
        if !request.is_delete_only() {
            if let Some(mut pack) = request.take_pack() {
                let sent = io::copy(&mut pack, &mut stdin)
                    .map_err(|e| TransportError::io("send pack", &endpoint, e))?;
                tracing::debug!(bytes = sent, "pack sent");
            }
        }
        stdin
            .flush()
            .map_err(|e| TransportError::io("send pack", &endpoint, e))?;
        drop(stdin);

        let report = match ReportStatus::decode(&mut self.stdout) {
            Ok(report) => report,
            Err(e) => return Err(self.protocol_error(e, "read report-status")),
        };
        tracing::info!(ok = report.is_ok(), unpack = %report.unpack_status, "push reported");
        Ok(report)
    }
}

impl<C: Command> Drop for CommandSession<C> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "failed to close session");
        }
    }
}

impl<C: Command> fmt::Debug for CommandSession<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSession")
            .field("service", &self.service)
            .field("endpoint", &self.endpoint)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
