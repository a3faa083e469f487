//! Receive-pack (push) messages: reference update commands and the status
//! report.

use crate::capability::{self, Capabilities};
use crate::pktline::{PktLineReader, PktLineWriter};
use crate::{ObjectId, ProtocolError, Result};
use std::fmt;
use std::io::{Read, Write};

/// A single reference update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefUpdateCommand {
    /// Old object ID (zeros for create).
    pub old_id: ObjectId,
    /// New object ID (zeros for delete).
    pub new_id: ObjectId,
    /// Reference name.
    pub ref_name: String,
}

impl RefUpdateCommand {
    /// Creates a command.
    pub fn new(old_id: ObjectId, new_id: ObjectId, ref_name: impl Into<String>) -> Self {
        Self {
            old_id,
            new_id,
            ref_name: ref_name.into(),
        }
    }

    /// Checks if this is a create command.
    pub fn is_create(&self) -> bool {
        self.old_id.is_zero()
    }

    /// Checks if this is a delete command.
    pub fn is_delete(&self) -> bool {
        self.new_id.is_zero()
    }
}

/// A push request: ordered commands plus the pack carrying the new objects.
pub struct ReferenceUpdateRequest {
    /// Commands, applied by the server in order.
    pub commands: Vec<RefUpdateCommand>,
    /// Capabilities requested on the first command line.
    pub capabilities: Capabilities,
    pack: Option<Box<dyn Read + Send>>,
}

impl ReferenceUpdateRequest {
    /// Creates an empty request.
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
            capabilities: Capabilities::new(),
            pack: None,
        }
    }

    /// Creates a request with the capabilities this client uses against a
    /// server advertising `server`.
    pub fn for_server(server: &Capabilities) -> Self {
        let mut req = Self::new();
        if server.supports(capability::REPORT_STATUS) {
            req.capabilities.add(capability::REPORT_STATUS, None);
        }
        if server.supports(capability::OFS_DELTA) {
            req.capabilities.add(capability::OFS_DELTA, None);
        }
        req.capabilities
            .add(capability::AGENT, Some(capability::DEFAULT_AGENT));
        req
    }

    /// Appends a command. Requests `delete-refs` for deletions.
    pub fn command(mut self, cmd: RefUpdateCommand) -> Self {
        if cmd.is_delete() {
            self.capabilities.add(capability::DELETE_REFS, None);
        }
        self.commands.push(cmd);
        self
    }

    /// Sets the pack stream to upload after the commands.
    pub fn with_pack(mut self, pack: impl Read + Send + 'static) -> Self {
        self.pack = Some(Box::new(pack));
        self
    }

    /// Returns true if a pack stream was attached.
    pub fn has_pack(&self) -> bool {
        self.pack.is_some()
    }

    /// Removes and returns the pack stream.
    pub fn take_pack(&mut self) -> Option<Box<dyn Read + Send>> {
        self.pack.take()
    }

    /// Returns true if every command deletes a reference; no pack is sent then.
    pub fn is_delete_only(&self) -> bool {
        !self.commands.is_empty() && self.commands.iter().all(RefUpdateCommand::is_delete)
    }

    /// Checks the request against what the server advertised.
    pub fn validate(&self, server: &Capabilities) -> Result<()> {
        if self.commands.is_empty() {
            return Err(ProtocolError::Protocol(
                "reference update request has no commands".to_string(),
            ));
        }
        if self.commands.iter().any(RefUpdateCommand::is_delete)
            && !server.supports(capability::DELETE_REFS)
        {
            return Err(ProtocolError::Protocol(
                "server does not support deleting references".to_string(),
            ));
        }
        for (name, _) in self.capabilities.iter() {
            if name != capability::AGENT && !server.supports(name) {
                return Err(ProtocolError::Protocol(format!(
                    "server does not support capability {name}"
                )));
            }
        }
        Ok(())
    }

    /// Writes the command list and its terminating flush. The pack, if any,
    /// follows separately.
    pub fn encode_commands<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut pkt_writer = PktLineWriter::new(writer);
        let caps = self.capabilities.to_string();
        for (i, cmd) in self.commands.iter().enumerate() {
            let line = format!("{} {} {}", cmd.old_id, cmd.new_id, cmd.ref_name);
            if i == 0 {
                pkt_writer.write_data(format!("{line}\0{caps}\n").as_bytes())?;
            } else {
                pkt_writer.write_line(&line)?;
            }
        }
        pkt_writer.flush_pkt()?;
        pkt_writer.flush()?;
        Ok(())
    }

    /// Parses a command list up to its flush; used by fake servers in tests.
    pub fn decode_commands<R: Read>(reader: &mut PktLineReader<R>) -> Result<Self> {
        let mut req = Self::new();
        loop {
            let pkt = reader.read_packet()?;
            if pkt.is_flush() {
                return Ok(req);
            }
            let data = pkt.data().unwrap_or_default();
            let data = data.strip_suffix(b"\n").unwrap_or(data);
            let (line, caps) = match data.iter().position(|&b| b == 0) {
                Some(nul) => (&data[..nul], Some(&data[nul + 1..])),
                None => (data, None),
            };
            if let Some(caps) = caps {
                req.capabilities = Capabilities::parse(&String::from_utf8_lossy(caps));
            }
            let line = String::from_utf8_lossy(line);
            let parts: Vec<&str> = line.splitn(3, ' ').collect();
            if parts.len() != 3 {
                return Err(ProtocolError::Protocol(format!(
                    "malformed update command: {line:?}"
                )));
            }
            req.commands.push(RefUpdateCommand::new(
                ObjectId::from_hex(parts[0])?,
                ObjectId::from_hex(parts[1])?,
                parts[2],
            ));
        }
    }
}

impl Default for ReferenceUpdateRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReferenceUpdateRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceUpdateRequest")
            .field("commands", &self.commands)
            .field("capabilities", &self.capabilities)
            .field("has_pack", &self.pack.is_some())
            .finish()
    }
}

/// Outcome of one reference update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandStatus {
    /// Reference name.
    pub ref_name: String,
    /// `ok`, or the server's rejection reason.
    pub status: String,
}

impl CommandStatus {
    /// Returns true if the update was applied.
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// The `report-status` answer to a push.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportStatus {
    /// `ok`, or the reason unpacking failed.
    pub unpack_status: String,
    /// Per-reference results, in the server's order.
    pub command_statuses: Vec<CommandStatus>,
}

impl ReportStatus {
    /// Returns true if the pack was unpacked and every update applied.
    pub fn is_ok(&self) -> bool {
        self.unpack_status == "ok" && self.command_statuses.iter().all(CommandStatus::is_ok)
    }

    /// Converts a failed report into an error naming the first failure.
    pub fn error(&self) -> Result<()> {
        if self.unpack_status != "ok" {
            return Err(ProtocolError::Remote(format!(
                "unpack error: {}",
                self.unpack_status
            )));
        }
        if let Some(failed) = self.command_statuses.iter().find(|s| !s.is_ok()) {
            return Err(ProtocolError::Remote(format!(
                "failed to update ref {}: {}",
                failed.ref_name, failed.status
            )));
        }
        Ok(())
    }

    /// Reads `unpack <status>` and the `ok`/`ng` lines up to the flush.
    ///
    /// A stream that ends before the first line is [`ProtocolError::EmptyInput`].
    pub fn decode<R: Read>(reader: &mut PktLineReader<R>) -> Result<Self> {
        let first = reader.read()?.ok_or(ProtocolError::EmptyInput)?;
        if let Some(msg) = first.err_message() {
            return Err(ProtocolError::Remote(msg.to_string()));
        }
        let unpack_status = first
            .as_str()
            .and_then(|l| l.strip_prefix("unpack "))
            .ok_or_else(|| {
                ProtocolError::Protocol(format!("expected unpack status, got {first:?}"))
            })?
            .to_string();

        let mut report = Self {
            unpack_status,
            command_statuses: Vec::new(),
        };
        loop {
            let pkt = reader.read_packet()?;
            if pkt.is_flush() {
                return Ok(report);
            }
            let line = pkt.as_str().unwrap_or_default();
            let status = if let Some(ref_name) = line.strip_prefix("ok ") {
                CommandStatus {
                    ref_name: ref_name.to_string(),
                    status: "ok".to_string(),
                }
            } else if let Some(rest) = line.strip_prefix("ng ") {
                let (ref_name, reason) = rest.split_once(' ').unwrap_or((rest, "rejected"));
                CommandStatus {
                    ref_name: ref_name.to_string(),
                    status: reason.to_string(),
                }
            } else {
                return Err(ProtocolError::Protocol(format!(
                    "malformed command status: {line:?}"
                )));
            };
            report.command_statuses.push(status);
        }
    }

    /// Writes the report; used by fake servers in tests.
    pub fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut pkt_writer = PktLineWriter::new(writer);
        pkt_writer.write_line(&format!("unpack {}", self.unpack_status))?;
        for status in &self.command_statuses {
            if status.is_ok() {
                pkt_writer.write_line(&format!("ok {}", status.ref_name))?;
            } else {
                pkt_writer.write_line(&format!("ng {} {}", status.ref_name, status.status))?;
            }
        }
        pkt_writer.flush_pkt()?;
        pkt_writer.flush()?;
        Ok(())
    }
}
