//! Upload-pack (fetch) negotiation messages.

use crate::capability::{self, Capabilities};
use crate::pktline::{PktLineReader, PktLineWriter};
use crate::{ObjectId, ProtocolError, Result};
use std::io::{Read, Write};

/// What the client asks an upload-pack server for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadPackRequest {
    /// Objects the client wants.
    pub wants: Vec<ObjectId>,
    /// Objects the client already has.
    pub haves: Vec<ObjectId>,
    /// Shallow commits of the client's repository.
    pub shallows: Vec<ObjectId>,
    /// History depth limit (`deepen N`).
    pub depth: Option<u32>,
    /// Capabilities requested on the first want line.
    pub capabilities: Capabilities,
}

impl UploadPackRequest {
    /// Creates a request with no capabilities.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a request whose capabilities are the best this client can use
    /// against a server advertising `server`.
    pub fn for_server(server: &Capabilities) -> Self {
        let mut caps = Capabilities::new();
        if server.supports(capability::OFS_DELTA) {
            caps.add(capability::OFS_DELTA, None);
        }
        if server.supports(capability::SIDE_BAND_64K) {
            caps.add(capability::SIDE_BAND_64K, None);
        } else if server.supports(capability::SIDE_BAND) {
            caps.add(capability::SIDE_BAND, None);
        }
        if server.supports(capability::INCLUDE_TAG) {
            caps.add(capability::INCLUDE_TAG, None);
        }
        caps.add(capability::AGENT, Some(capability::DEFAULT_AGENT));
        caps.filter_unsupported();
        Self {
            capabilities: caps,
            ..Self::default()
        }
    }

    /// Adds a wanted object.
    pub fn want(mut self, id: ObjectId) -> Self {
        self.wants.push(id);
        self
    }

    /// Adds an object the client has.
    pub fn have(mut self, id: ObjectId) -> Self {
        self.haves.push(id);
        self
    }

    /// Limits history depth; requests the `shallow` capability.
    pub fn depth(mut self, depth: u32) -> Self {
        self.depth = Some(depth);
        self.capabilities.add(capability::SHALLOW, None);
        self
    }

    /// Asks the server not to send progress messages.
    pub fn no_progress(mut self) -> Self {
        self.capabilities.add(capability::NO_PROGRESS, None);
        self
    }

    /// Returns true when nothing is wanted.
    pub fn is_empty(&self) -> bool {
        self.wants.is_empty()
    }

    /// Returns true if a side-band variant was requested.
    pub fn uses_side_band(&self) -> bool {
        self.capabilities.supports(capability::SIDE_BAND_64K)
            || self.capabilities.supports(capability::SIDE_BAND)
    }

    /// Checks the request against what the server advertised.
    pub fn validate(&self, server: &Capabilities) -> Result<()> {
        for (name, _) in self.capabilities.iter() {
            if capability::UNSUPPORTED.contains(&name) {
                return Err(ProtocolError::Protocol(format!(
                    "capability {name} is not supported by this client"
                )));
            }
            if name != capability::AGENT && !server.supports(name) {
                return Err(ProtocolError::Protocol(format!(
                    "server does not support capability {name}"
                )));
            }
        }
        if self.capabilities.supports(capability::SIDE_BAND)
            && self.capabilities.supports(capability::SIDE_BAND_64K)
        {
            return Err(ProtocolError::Protocol(
                "side-band and side-band-64k are mutually exclusive".to_string(),
            ));
        }
        if self.depth.is_some() && !self.capabilities.supports(capability::SHALLOW) {
            return Err(ProtocolError::Protocol(
                "depth requires the shallow capability".to_string(),
            ));
        }
        Ok(())
    }

    /// Writes the request: wants (the first carrying capabilities), shallows,
    /// depth, flush, haves, `done`.
    pub fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut pkt_writer = PktLineWriter::new(writer);

        let caps = self.capabilities.to_string();
        for (i, want) in self.wants.iter().enumerate() {
            if i == 0 && !caps.is_empty() {
                pkt_writer.write_line(&format!("want {want} {caps}"))?;
            } else {
                pkt_writer.write_line(&format!("want {want}"))?;
            }
        }
        for shallow in &self.shallows {
            pkt_writer.write_line(&format!("shallow {shallow}"))?;
        }
        if let Some(depth) = self.depth {
            pkt_writer.write_line(&format!("deepen {depth}"))?;
        }
        pkt_writer.flush_pkt()?;

        for have in &self.haves {
            pkt_writer.write_line(&format!("have {have}"))?;
        }
        pkt_writer.write_line("done")?;
        pkt_writer.flush()?;
        Ok(())
    }
}

/// Shallow boundary changes sent by the server when a depth was requested.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShallowUpdate {
    /// Commits that are now shallow.
    pub shallows: Vec<ObjectId>,
    /// Commits that are no longer shallow.
    pub unshallows: Vec<ObjectId>,
}

impl ShallowUpdate {
    /// Reads `shallow`/`unshallow` lines up to the terminating flush.
    pub fn decode<R: Read>(reader: &mut PktLineReader<R>) -> Result<Self> {
        let mut update = Self::default();
        loop {
            let pkt = reader.read_packet()?;
            if pkt.is_flush() {
                return Ok(update);
            }
            if let Some(msg) = pkt.err_message() {
                return Err(ProtocolError::Remote(msg.to_string()));
            }
            let line = pkt.as_str().unwrap_or_default();
            if let Some(id) = line.strip_prefix("shallow ") {
                update.shallows.push(ObjectId::from_hex(id)?);
            } else if let Some(id) = line.strip_prefix("unshallow ") {
                update.unshallows.push(ObjectId::from_hex(id)?);
            } else {
                return Err(ProtocolError::Protocol(format!(
                    "unexpected line in shallow-update: {line:?}"
                )));
            }
        }
    }
}

/// The server's answer to the have lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledgement {
    /// No common object was found.
    Nak,
    /// The server has this object in common with the client.
    Ack(ObjectId),
}

impl Acknowledgement {
    /// Reads a single `ACK <id>` or `NAK` line.
    pub fn decode<R: Read>(reader: &mut PktLineReader<R>) -> Result<Self> {
        let pkt = reader.read_packet()?;
        if let Some(msg) = pkt.err_message() {
            return Err(ProtocolError::Remote(msg.to_string()));
        }
        match pkt.as_str() {
            Some("NAK") => Ok(Self::Nak),
            Some(line) if line.starts_with("ACK ") => {
                let id = line[4..].split(' ').next().unwrap_or_default();
                Ok(Self::Ack(ObjectId::from_hex(id)?))
            }
            _ => Err(ProtocolError::Protocol(format!(
                "expected ACK or NAK, got {pkt:?}"
            ))),
        }
    }

    /// Writes the line; used by fake servers in tests.
    pub fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut pkt_writer = PktLineWriter::new(writer);
        match self {
            Self::Nak => pkt_writer.write_line("NAK"),
            Self::Ack(id) => pkt_writer.write_line(&format!("ACK {id}")),
        }
    }
}

/// Magic bytes at the start of a pack file.
pub const PACK_SIGNATURE: &[u8; 4] = b"PACK";

/// The fixed 12-byte header at the start of a pack stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackHeader {
    /// Pack format version (2 or 3).
    pub version: u32,
    /// Number of objects in the pack.
    pub object_count: u32,
}

impl PackHeader {
    /// Size of the header in bytes.
    pub const LEN: usize = 12;

    /// Parses the header at the start of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::LEN {
            return Err(ProtocolError::InvalidPack("pack too small".to_string()));
        }
        if &data[0..4] != PACK_SIGNATURE {
            return Err(ProtocolError::InvalidPack("invalid signature".to_string()));
        }
        let version = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        if version != 2 && version != 3 {
            return Err(ProtocolError::InvalidPack(format!(
                "unsupported version: {version}"
            )));
        }
        let object_count = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);
        Ok(Self {
            version,
            object_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pktline::PktLine;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    const A: &str = "3f786850e387550fdab836ed7e6dc881de23001b";
    const B: &str = "89e6c98d92887913cadf06b2adb97f26cde4849b";

    fn id(hex: &str) -> ObjectId {
        hex.parse().unwrap()
    }

    fn server_caps() -> Capabilities {
        Capabilities::parse("multi_ack thin-pack side-band side-band-64k ofs-delta shallow no-progress agent=git/2.43")
    }

    #[test]
    fn test_for_server_picks_supported() {
        let req = UploadPackRequest::for_server(&server_caps());
        assert!(req.capabilities.supports(capability::OFS_DELTA));
        assert!(req.capabilities.supports(capability::SIDE_BAND_64K));
        assert!(!req.capabilities.supports(capability::SIDE_BAND));
        assert!(!req.capabilities.supports(capability::MULTI_ACK));
        assert!(!req.capabilities.supports(capability::THIN_PACK));
        assert!(req.uses_side_band());
    }

    #[test]
    fn test_for_server_plain() {
        let req = UploadPackRequest::for_server(&Capabilities::new());
        assert!(!req.uses_side_band());
        assert_eq!(req.capabilities.get(capability::AGENT), Some(capability::DEFAULT_AGENT));
    }

    #[test]
    fn test_encode() {
        let mut req = UploadPackRequest::new().want(id(A)).want(id(B)).have(id(B));
        req.capabilities = Capabilities::parse("ofs-delta");

        let mut out = Vec::new();
        req.encode(&mut out).unwrap();

        let expected = format!(
            "003cwant {A} ofs-delta\n0032want {B}\n00000032have {B}\n0009done\n"
        );
        assert_eq!(String::from_utf8(out).unwrap(), expected);
    }

    #[test]
    fn test_encode_depth() {
        let req = UploadPackRequest::new().want(id(A)).depth(1);
        let mut out = Vec::new();
        req.encode(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains(&format!("want {A} shallow\n")));
        assert!(text.contains("000ddeepen 1\n0000"));
    }

    #[test]
    fn test_validate() {
        let server = server_caps();
        let req = UploadPackRequest::for_server(&server).want(id(A));
        req.validate(&server).unwrap();

        let mut bad = req.clone();
        bad.capabilities.add(capability::THIN_PACK, None);
        assert!(bad.validate(&server).is_err());

        let depth = UploadPackRequest::for_server(&server).want(id(A)).depth(3);
        depth.validate(&server).unwrap();
        assert!(depth.validate(&Capabilities::parse("ofs-delta side-band-64k")).is_err());

        let mut both = req.clone();
        both.capabilities.add(capability::SIDE_BAND, None);
        assert!(both.validate(&server).is_err());
    }

    #[test]
    fn test_acknowledgement() {
        let mut buf = Vec::new();
        Acknowledgement::Nak.encode(&mut buf).unwrap();
        Acknowledgement::Ack(id(A)).encode(&mut buf).unwrap();
        let mut reader = PktLineReader::new(Cursor::new(buf));
        assert_eq!(Acknowledgement::decode(&mut reader).unwrap(), Acknowledgement::Nak);
        assert_eq!(
            Acknowledgement::decode(&mut reader).unwrap(),
            Acknowledgement::Ack(id(A))
        );
    }

    #[test]
    fn test_acknowledgement_errors() {
        let buf = PktLine::from_string("ERR upload-pack: not our ref\n")
            .encode()
            .unwrap();
        let mut reader = PktLineReader::new(Cursor::new(buf.to_vec()));
        assert!(matches!(
            Acknowledgement::decode(&mut reader),
            Err(ProtocolError::Remote(msg)) if msg.contains("not our ref")
        ));

        let mut reader = PktLineReader::new(Cursor::new(b"PACK".to_vec()));
        assert!(Acknowledgement::decode(&mut reader).is_err());
    }

    #[test]
    fn test_shallow_update() {
        let mut buf = Vec::new();
        {
            let mut w = PktLineWriter::new(&mut buf);
            w.write_line(&format!("shallow {A}")).unwrap();
            w.write_line(&format!("unshallow {B}")).unwrap();
            w.flush_pkt().unwrap();
        }
        let update = ShallowUpdate::decode(&mut PktLineReader::new(Cursor::new(buf))).unwrap();
        assert_eq!(update.shallows, vec![id(A)]);
        assert_eq!(update.unshallows, vec![id(B)]);
    }

    #[test]
    fn test_pack_header() {
        let mut data = b"PACK".to_vec();
        data.extend(2u32.to_be_bytes());
        data.extend(3u32.to_be_bytes());
        assert_eq!(
            PackHeader::parse(&data).unwrap(),
            PackHeader {
                version: 2,
                object_count: 3
            }
        );
        assert!(PackHeader::parse(b"PACK").is_err());
        assert!(PackHeader::parse(b"KCAP\0\0\0\x02\0\0\0\0").is_err());
    }
}
