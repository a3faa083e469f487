//! Reference advertisement.
//!
//! The first message of every v0/v1 session: one line per ref, the first of
//! which also carries the server's capability list after a NUL byte. Over
//! smart HTTP the advertisement is preceded by a `# service=<name>` line and a
//! flush.

use crate::capability::{self, Capabilities};
use crate::pktline::{PktLine, PktLineReader, PktLineWriter};
use crate::{ObjectId, ProtocolError, Result, Service};
use std::collections::BTreeMap;
use std::io::{Read, Write};

/// Placeholder ref name used when a server has capabilities but no refs.
const NO_REFS_NAME: &str = "capabilities^{}";
/// Suffix marking a peeled tag entry.
const PEELED_SUFFIX: &str = "^{}";

/// The references and capabilities a server advertised.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvRefs {
    /// Object `HEAD` resolves to, if advertised.
    pub head: Option<ObjectId>,
    /// Advertised references, excluding `HEAD`.
    pub references: BTreeMap<String, ObjectId>,
    /// Peeled targets of annotated tags, keyed by tag ref name.
    pub peeled: BTreeMap<String, ObjectId>,
    /// Shallow commits of the server's repository.
    pub shallows: Vec<ObjectId>,
    /// Capabilities from the first line.
    pub capabilities: Capabilities,
}

impl AdvRefs {
    /// Creates an empty advertisement.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when no reference (not even `HEAD`) was advertised.
    pub fn is_empty(&self) -> bool {
        self.head.is_none() && self.references.is_empty() && self.peeled.is_empty()
    }

    /// Returns the `symref=<from>:<to>` capability pairs.
    pub fn symrefs(&self) -> BTreeMap<String, String> {
        self.capabilities
            .get_all(capability::SYMREF)
            .filter_map(|v| v.split_once(':'))
            .map(|(from, to)| (from.to_string(), to.to_string()))
            .collect()
    }

    /// Returns true if `id` is the target of any advertised ref.
    pub fn contains_id(&self, id: &ObjectId) -> bool {
        self.head.as_ref() == Some(id) || self.references.values().any(|r| r == id)
    }

    /// Decodes an advertisement.
    ///
    /// Accepts an optional smart-HTTP `# service=` prefix and an optional
    /// `version 1` line. A message consisting of just a flush yields
    /// [`ProtocolError::EmptyAdvRefs`]; a stream that ends before any packet
    /// yields [`ProtocolError::EmptyInput`].
    pub fn decode<R: Read>(reader: &mut PktLineReader<R>) -> Result<Self> {
        let mut pkt = reader.read()?.ok_or(ProtocolError::EmptyInput)?;

        let has_service_prefix = pkt
            .as_str()
            .is_some_and(|line| line.starts_with("# service="));
        if has_service_prefix {
            tracing::trace!(line = ?pkt.as_str(), "smart http advertisement prefix");
            match reader.read_packet()? {
                PktLine::Flush => {}
                other => {
                    return Err(ProtocolError::Protocol(format!(
                        "expected flush after service line, got {other:?}"
                    )))
                }
            }
            pkt = reader.read_packet()?;
        }

        if pkt.as_str() == Some("version 1") {
            pkt = reader.read_packet()?;
        }

        let mut adv = Self::new();
        let first = match pkt {
            PktLine::Flush => return Err(ProtocolError::EmptyAdvRefs),
            PktLine::Data(data) => data,
            other => {
                return Err(ProtocolError::Protocol(format!(
                    "unexpected packet in ref advertisement: {other:?}"
                )))
            }
        };
        check_err_line(&first)?;

        let first = trim_newline(&first);
        let (ref_part, caps_part) = match first.iter().position(|&b| b == 0) {
            Some(nul) => (&first[..nul], &first[nul + 1..]),
            None => (first, &[][..]),
        };
        adv.capabilities = Capabilities::parse(&String::from_utf8_lossy(caps_part));

        let (id, name) = parse_ref_line(ref_part)?;
        if name != NO_REFS_NAME {
            adv.add_ref(id, name);
        }

        loop {
            let data = match reader.read()? {
                Some(PktLine::Flush) => break,
                Some(PktLine::Data(data)) => data,
                Some(other) => {
                    return Err(ProtocolError::Protocol(format!(
                        "unexpected packet in ref advertisement: {other:?}"
                    )))
                }
                None => {
                    return Err(ProtocolError::Protocol(
                        "ref advertisement ended without flush".to_string(),
                    ))
                }
            };
            check_err_line(&data)?;
            let line = trim_newline(&data);
            if let Some(rest) = line.strip_prefix(b"shallow ") {
                adv.shallows.push(ObjectId::from_hex_prefix(rest)?);
                continue;
            }
            let (id, name) = parse_ref_line(line)?;
            adv.add_ref(id, name);
        }

        Ok(adv)
    }

    /// Encodes the advertisement, optionally with the smart-HTTP service
    /// prefix.
    pub fn encode<W: Write>(&self, writer: &mut W, service: Option<Service>) -> Result<()> {
        let mut pkt_writer = PktLineWriter::new(writer);

        if let Some(service) = service {
            pkt_writer.write_line(&format!("# service={service}"))?;
            pkt_writer.flush_pkt()?;
        }

        let mut lines: Vec<(String, ObjectId)> = Vec::new();
        if let Some(head) = self.head {
            lines.push(("HEAD".to_string(), head));
        }
        for (name, id) in &self.references {
            lines.push((name.clone(), *id));
            if let Some(peeled) = self.peeled.get(name) {
                lines.push((format!("{name}{PEELED_SUFFIX}"), *peeled));
            }
        }

        let caps = self.capabilities.to_string();
        let mut lines = lines.into_iter();
        let first = match lines.next() {
            Some((name, id)) => format!("{id} {name}\0{caps}\n"),
            None => format!("{} {NO_REFS_NAME}\0{caps}\n", ObjectId::zero()),
        };
        pkt_writer.write_data(first.as_bytes())?;

        for (name, id) in lines {
            pkt_writer.write_line(&format!("{id} {name}"))?;
        }
        for id in &self.shallows {
            pkt_writer.write_line(&format!("shallow {id}"))?;
        }

        pkt_writer.flush_pkt()?;
        pkt_writer.flush()?;
        Ok(())
    }

    fn add_ref(&mut self, id: ObjectId, name: &str) {
        if name == "HEAD" {
            self.head = Some(id);
        } else if let Some(tag) = name.strip_suffix(PEELED_SUFFIX) {
            self.peeled.insert(tag.to_string(), id);
        } else {
            self.references.insert(name.to_string(), id);
        }
    }
}

fn check_err_line(data: &[u8]) -> Result<()> {
    if let Some(msg) = data.strip_prefix(b"ERR ") {
        let msg = String::from_utf8_lossy(trim_newline(msg)).into_owned();
        return Err(ProtocolError::Remote(msg));
    }
    Ok(())
}

fn trim_newline(data: &[u8]) -> &[u8] {
    data.strip_suffix(b"\n").unwrap_or(data)
}

/// Parses `<id> <name>`.
fn parse_ref_line(line: &[u8]) -> Result<(ObjectId, &str)> {
    let id = ObjectId::from_hex_prefix(line).map_err(|_| {
        ProtocolError::Protocol(format!(
            "malformed ref line: {:?}",
            String::from_utf8_lossy(line)
        ))
    })?;
    let name = line
        .get(ObjectId::HEX_LEN..)
        .and_then(|rest| rest.strip_prefix(b" "))
        .and_then(|name| std::str::from_utf8(name).ok())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| {
            ProtocolError::Protocol(format!(
                "malformed ref line: {:?}",
                String::from_utf8_lossy(line)
            ))
        })?;
    Ok((id, name))
}
