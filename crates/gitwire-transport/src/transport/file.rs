//! Local transport: runs the git service binary against a repository path.

use crate::command::{Command, Commander};
use crate::{AuthMethod, Result, TransportConfig, TransportError};
use gitwire_protocol::{Endpoint, Service};
use parking_lot::Mutex;
use std::io::{Read, Write};
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Stdio};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Builds [`FileCommand`]s using the configured service binaries.
#[derive(Debug, Clone)]
pub struct FileCommander {
    upload_pack_bin: String,
    receive_pack_bin: String,
}

impl FileCommander {
    /// Creates a commander with the binaries named in `config`.
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            upload_pack_bin: config.upload_pack_bin.clone(),
            receive_pack_bin: config.receive_pack_bin.clone(),
        }
    }
}

impl Default for FileCommander {
    fn default() -> Self {
        Self::new(&TransportConfig::default())
    }
}

impl Commander for FileCommander {
    type Command = FileCommand;

    fn command(&self, service: Service, endpoint: &Endpoint) -> Result<FileCommand> {
        let program = match service {
            Service::UploadPack => &self.upload_pack_bin,
            Service::ReceivePack => &self.receive_pack_bin,
        };
        Ok(FileCommand::new(program.clone(), endpoint.clone()))
    }
}

/// A git service child process.
///
/// The process is launched directly, without a shell, with the repository
/// path as its only argument. Stderr is drained on a background thread.
/// Dropping the command closes it.
#[derive(Debug)]
pub struct FileCommand {
    program: String,
    endpoint: Endpoint,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    stderr: Arc<Mutex<Vec<u8>>>,
    stderr_reader: Option<JoinHandle<()>>,
    closed: bool,
}

impl FileCommand {
    /// Prepares a command; nothing runs until [`Command::start`].
    pub fn new(program: impl Into<String>, endpoint: Endpoint) -> Self {
        Self {
            program: program.into(),
            endpoint,
            child: None,
            stdin: None,
            stdout: None,
            stderr: Arc::new(Mutex::new(Vec::new())),
            stderr_reader: None,
            closed: false,
        }
    }

    /// Returns true once the process was spawned and until it is closed.
    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    fn drain_stderr(&mut self, mut stderr: ChildStderr) -> Result<()> {
        let sink = Arc::clone(&self.stderr);
        let handle = std::thread::Builder::new()
            .name("gitwire-stderr".to_string())
            .spawn(move || {
                let mut buf = [0u8; 4096];
                loop {
                    match stderr.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => sink.lock().extend_from_slice(&buf[..n]),
                    }
                }
            })
            .map_err(|e| TransportError::io("spawn stderr reader", &self.endpoint, e))?;
        self.stderr_reader = Some(handle);
        Ok(())
    }

    /// Reaps a child whose start did not complete and hands back `err`.
    fn abort_start(&mut self, err: TransportError) -> TransportError {
        if let Err(e) = self.reap() {
            tracing::warn!(error = %e, "failed to reap git service after start error");
        }
        err
    }

    /// Kills the child if it is still running, waits for it and joins the
    /// stderr reader.
    fn reap(&mut self) -> Result<()> {
        self.stdin = None;
        self.stdout = None;
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        let running = child
            .try_wait()
            .map_err(|e| TransportError::io("close", &self.endpoint, e))?
            .is_none();
        if running {
            tracing::debug!(pid = child.id(), "killing git service");
            if let Err(e) = child.kill() {
                // The process may exit between try_wait and kill.
                tracing::debug!(error = %e, "kill failed");
            }
        }
        let status = child
            .wait()
            .map_err(|e| TransportError::io("close", &self.endpoint, e))?;
        tracing::debug!(%status, program = %self.program, "git service exited");

        if let Some(handle) = self.stderr_reader.take() {
            if handle.join().is_err() {
                tracing::warn!("stderr reader panicked");
            }
        }
        Ok(())
    }
}

impl Command for FileCommand {
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
        if self.child.is_some() {
            return Err(TransportError::AlreadyConnected);
        }

        tracing::debug!(program = %self.program, path = %self.endpoint.path(), "spawning git service");
        let mut child = std::process::Command::new(&self.program)
            .arg(self.endpoint.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| TransportError::io("spawn", &self.endpoint, e))?;

        let stderr = child.stderr.take();
        self.stdin = child.stdin.take();
        self.stdout = child.stdout.take();
        self.child = Some(child);

        if let Some(stderr) = stderr {
            if let Err(e) = self.drain_stderr(stderr) {
                return Err(self.abort_start(e));
            }
        }
        Ok(())
    }

    fn take_stdin(&mut self) -> Result<Box<dyn Write + Send>> {
        self.stdin
            .take()
            .map(|s| Box::new(s) as Box<dyn Write + Send>)
            .ok_or_else(|| TransportError::InvalidState("stdin not available".to_string()))
    }

    fn take_stdout(&mut self) -> Result<Box<dyn Read + Send>> {
        self.stdout
            .take()
            .map(|s| Box::new(s) as Box<dyn Read + Send>)
            .ok_or_else(|| TransportError::InvalidState("stdout not available".to_string()))
    }

    fn stderr(&self) -> Option<String> {
        Some(String::from_utf8_lossy(&self.stderr.lock()).into_owned())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.reap()
    }
}

impl Drop for FileCommand {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "failed to close git service");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> Endpoint {
        Endpoint::parse("file:///tmp/does-not-matter.git").unwrap()
    }

    #[test]
    fn test_set_auth_rejected_without_state_change() {
        let mut cmd = FileCommand::new("git-upload-pack", endpoint());
        let auth = AuthMethod::basic("user", "pass");
        assert!(matches!(
            cmd.set_auth(Some(&auth)),
            Err(TransportError::InvalidAuthMethod)
        ));
        assert!(!cmd.is_running());
        cmd.set_auth(None).unwrap();
    }

    #[test]
    fn test_close_never_started() {
        let mut cmd = FileCommand::new("git-upload-pack", endpoint());
        cmd.close().unwrap();
        cmd.close().unwrap();
        assert!(matches!(cmd.start(), Err(TransportError::SessionClosed)));
    }

    #[test]
    fn test_missing_binary() {
        let mut cmd = FileCommand::new("gitwire-no-such-binary", endpoint());
        let err = cmd.start().unwrap_err();
        assert!(matches!(err, TransportError::Io { phase: "spawn", .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_double_close_kills_running_child() {
        // `cat` echoes stdin and never exits on its own.
        let mut cmd = FileCommand::new("cat", endpoint());
        cmd.start().unwrap();
        assert!(cmd.is_running());
        assert!(matches!(cmd.start(), Err(TransportError::AlreadyConnected)));
        cmd.close().unwrap();
        cmd.close().unwrap();
        assert!(!cmd.is_running());
    }

    #[cfg(unix)]
    #[test]
    fn test_abort_start_reaps_child() {
        let mut cmd = FileCommand::new("cat", endpoint());
        cmd.start().unwrap();

        let err = cmd.abort_start(TransportError::InvalidState("reader".into()));
        assert!(matches!(err, TransportError::InvalidState(_)));
        assert!(!cmd.is_running());
        assert!(cmd.stderr_reader.is_none());
        // The failed start does not close the command.
        assert!(!cmd.closed);
    }

    #[cfg(unix)]
    #[test]
    fn test_stderr_collected() {
        let mut cmd = FileCommand::new("ls", Endpoint::parse("file:///gitwire/no/such/dir").unwrap());
        cmd.start().unwrap();
        let mut out = Vec::new();
        cmd.take_stdout().unwrap().read_to_end(&mut out).unwrap();
        cmd.close().unwrap();
        assert!(!cmd.stderr().unwrap_or_default().is_empty());
    }

    #[test]
    fn test_commander_picks_binary() {
        let config = TransportConfig {
            upload_pack_bin: "/opt/up".into(),
            receive_pack_bin: "/opt/recv".into(),
            ..TransportConfig::default()
        };
        let commander = FileCommander::new(&config);
        let cmd = commander.command(Service::ReceivePack, &endpoint()).unwrap();
        assert_eq!(cmd.program, "/opt/recv");
    }
}
