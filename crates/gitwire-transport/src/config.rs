//! Transport configuration.

use crate::{Result, TransportError};
use gitwire_protocol::capability::DEFAULT_AGENT;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Settings shared by every transport a [`Client`](crate::Client) builds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Executable run for `git-upload-pack` on local repositories.
    pub upload_pack_bin: String,
    /// Executable run for `git-receive-pack` on local repositories.
    pub receive_pack_bin: String,
    /// User-Agent header sent by the HTTP transport.
    pub user_agent: String,
    /// Connect timeout in seconds for TCP and HTTP. Unset means no limit.
    pub connect_timeout_secs: Option<u64>,
    /// Read/write timeout in seconds for TCP sockets and HTTP requests.
    pub io_timeout_secs: Option<u64>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            upload_pack_bin: "git-upload-pack".to_string(),
            receive_pack_bin: "git-receive-pack".to_string(),
            user_agent: DEFAULT_AGENT.to_string(),
            connect_timeout_secs: Some(30),
            io_timeout_secs: None,
        }
    }
}

impl TransportConfig {
    /// Parses a TOML document; missing keys keep their defaults.
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| TransportError::Config(e.to_string()))
    }

    /// Loads a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            TransportError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml(&contents)
    }

    /// Connect timeout, if any.
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_secs.map(Duration::from_secs)
    }

    /// I/O timeout, if any.
    pub fn io_timeout(&self) -> Option<Duration> {
        self.io_timeout_secs.map(Duration::from_secs)
    }
}
