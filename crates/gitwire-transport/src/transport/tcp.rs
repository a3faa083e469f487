//! `git://` transport: the git daemon protocol over plain TCP.

use crate::command::{Command, Commander};
use crate::{AuthMethod, Result, TransportConfig, TransportError};
use gitwire_protocol::{Endpoint, PktLineWriter, Service};
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Port the git daemon listens on.
pub const DEFAULT_PORT: u16 = 9418;

/// Builds [`TcpCommand`]s with the configured timeouts.
#[derive(Debug, Clone, Default)]
pub struct TcpCommander {
    connect_timeout: Option<Duration>,
    io_timeout: Option<Duration>,
}

impl TcpCommander {
    /// Creates a commander with the timeouts in `config`.
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            io_timeout: config.io_timeout(),
        }
    }
}

impl Commander for TcpCommander {
    type Command = TcpCommand;

    fn command(&self, service: Service, endpoint: &Endpoint) -> Result<TcpCommand> {
        let mut cmd = TcpCommand::new(service, endpoint.clone());
        cmd.connect_timeout = self.connect_timeout;
        cmd.io_timeout = self.io_timeout;
        Ok(cmd)
    }
}

/// A connection to a git daemon.
#[derive(Debug)]
pub struct TcpCommand {
    service: Service,
    endpoint: Endpoint,
    connect_timeout: Option<Duration>,
    io_timeout: Option<Duration>,
    stream: Option<TcpStream>,
    closed: bool,
}

impl TcpCommand {
    /// Prepares a command; nothing connects until [`Command::start`].
    pub fn new(service: Service, endpoint: Endpoint) -> Self {
        Self {
            service,
            endpoint,
            connect_timeout: None,
            io_timeout: None,
            stream: None,
            closed: false,
        }
    }

    /// The request line the daemon expects before it runs the service.
    pub fn handshake(&self) -> String {
        format!(
            "{} {}\0host={}\0",
            self.service,
            self.endpoint.path(),
            self.endpoint.host_with_port()
        )
    }

    /// Returns true while a connection is open.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn connect(&self) -> io::Result<TcpStream> {
        let port = self.endpoint.effective_port().unwrap_or(DEFAULT_PORT);
        let host = self.endpoint.host().trim_start_matches('[').trim_end_matches(']');
        let Some(timeout) = self.connect_timeout else {
            return TcpStream::connect((host, port));
        };

        let mut last_err = None;
        for addr in (host, port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no addresses for {host}"))
        }))
    }

    fn stream(&self) -> Result<&TcpStream> {
        self.stream
            .as_ref()
            .ok_or_else(|| TransportError::InvalidState("not connected".to_string()))
    }
}

impl Command for TcpCommand {
    fn set_auth(&mut self, auth: Option<&AuthMethod>) -> Result<()> {
        match auth {
            None => Ok(()),
            Some(_) => Err(TransportError::InvalidAuthMethod),
        }
    }

    fn start(&mut self) -> Result<()> {
        if self.closed {
            return Err(TransportError::SessionClosed);
        }
        if self.stream.is_some() {
            return Err(TransportError::AlreadyConnected);
        }

        tracing::debug!(endpoint = %self.endpoint.redacted(), "connecting to git daemon");
        let stream = self
            .connect()
            .map_err(|e| TransportError::io("connect", &self.endpoint, e))?;
        stream
            .set_read_timeout(self.io_timeout)
            .and_then(|()| stream.set_write_timeout(self.io_timeout))
            .map_err(|e| TransportError::io("connect", &self.endpoint, e))?;

        let mut writer = PktLineWriter::new(&stream);
        writer
            .write_data(self.handshake().as_bytes())
            .and_then(|()| writer.flush())
            .map_err(|e| TransportError::from_protocol(e, "handshake", &self.endpoint))?;

        self.stream = Some(stream);
        Ok(())
    }

    fn take_stdin(&mut self) -> Result<Box<dyn Write + Send>> {
        let stream = self
            .stream()?
            .try_clone()
            .map_err(|e| TransportError::io("clone socket", &self.endpoint, e))?;
        Ok(Box::new(stream))
    }

    fn take_stdout(&mut self) -> Result<Box<dyn Read + Send>> {
        let stream = self
            .stream()?
            .try_clone()
            .map_err(|e| TransportError::io("clone socket", &self.endpoint, e))?;
        Ok(Box::new(stream))
    }

    fn stderr(&self) -> Option<String> {
        None
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        let Some(stream) = self.stream.take() else {
            return Ok(());
        };
        match stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(TransportError::io("close", &self.endpoint, e)),
        }
    }
}

impl Drop for TcpCommand {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::debug!(error = %e, "failed to close git daemon connection");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitwire_protocol::{PktLine, PktLineReader};
    use pretty_assertions::assert_eq;
    use std::net::TcpListener;

    #[test]
    fn test_handshake_line() {
        let ep = Endpoint::parse("git://example.com/project.git").unwrap();
        let cmd = TcpCommand::new(Service::UploadPack, ep);
        assert_eq!(
            cmd.handshake(),
            "git-upload-pack /project.git\0host=example.com\0"
        );

        let ep = Endpoint::parse("git://example.com:9419/project.git").unwrap();
        let cmd = TcpCommand::new(Service::ReceivePack, ep);
        assert_eq!(
            cmd.handshake(),
            "git-receive-pack /project.git\0host=example.com:9419\0"
        );
    }

    #[test]
    fn test_set_auth_rejected_without_state_change() {
        let ep = Endpoint::parse("git://example.com/project.git").unwrap();
        let mut cmd = TcpCommand::new(Service::UploadPack, ep);
        assert!(matches!(
            cmd.set_auth(Some(&AuthMethod::token("t"))),
            Err(TransportError::InvalidAuthMethod)
        ));
        assert!(!cmd.is_connected());
    }

    #[test]
    fn test_close_never_connected() {
        let ep = Endpoint::parse("git://example.com/project.git").unwrap();
        let mut cmd = TcpCommand::new(Service::UploadPack, ep);
        cmd.close().unwrap();
        cmd.close().unwrap();
    }

    #[test]
    fn test_start_sends_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = PktLineReader::new(stream);
            reader.read_packet().unwrap()
        });

        let ep = Endpoint::parse(&format!("git://127.0.0.1:{port}/repo.git")).unwrap();
        let mut cmd = TcpCommand::new(Service::UploadPack, ep);
        cmd.start().unwrap();
        assert!(matches!(cmd.start(), Err(TransportError::AlreadyConnected)));

        let pkt = server.join().unwrap();
        let expected = format!("git-upload-pack /repo.git\0host=127.0.0.1:{port}\0");
        assert_eq!(pkt, PktLine::from_string(&expected));

        cmd.close().unwrap();
        cmd.close().unwrap();
        assert!(!cmd.is_connected());
    }
}
