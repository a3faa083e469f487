//! Stream transports: a running remote service exposed as a byte pipe.

use crate::{AuthMethod, Result};
use gitwire_protocol::{Endpoint, Service};
use std::io::{Read, Write};

/// A remote git service reached over a bidirectional stream.
///
/// Implemented by the local-exec and `git://` transports. The lifecycle is
/// `set_auth` → `start` → take the pipes → `close`.
pub trait Command {
    /// Installs credentials before `start`. Stream transports accept only
    /// `None`; any method is rejected without touching the command's state.
    fn set_auth(&mut self, auth: Option<&AuthMethod>) -> Result<()>;

    /// Launches the process or opens the connection.
    fn start(&mut self) -> Result<()>;

    /// Takes the writer connected to the service's input.
    fn take_stdin(&mut self) -> Result<Box<dyn Write + Send>>;

    /// Takes the reader connected to the service's output.
    fn take_stdout(&mut self) -> Result<Box<dyn Read + Send>>;

    /// Diagnostic output collected so far; `None` for transports without a
    /// separate error channel.
    fn stderr(&self) -> Option<String>;

    /// Stops the service and releases its resources. Idempotent.
    fn close(&mut self) -> Result<()>;
}

/// Builds [`Command`]s for a service and endpoint.
pub trait Commander {
    /// The command type produced.
    type Command: Command + 'static;

    /// Prepares, but does not start, a command.
    fn command(&self, service: Service, endpoint: &Endpoint) -> Result<Self::Command>;
}
