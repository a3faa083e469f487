//! Git pkt-line format implementation.
//!
//! Every git wire message is framed as a pkt-line: a 4-character hex length
//! (covering the length field itself) followed by the payload. `0000` is a
//! flush packet, which terminates a section; `0001` and `0002` are the
//! delimiter and response-end markers of protocol v2.

use crate::{ProtocolError, Result};
use bytes::{BufMut, Bytes, BytesMut};
use std::io::{ErrorKind, Read, Write};

/// Largest value the length field may carry.
pub const MAX_PKT_LEN: usize = 65520;
/// Largest payload a single data packet may carry.
pub const MAX_PAYLOAD_LEN: usize = MAX_PKT_LEN - 4;

/// A pkt-line packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PktLine {
    /// Data line with content. May be empty (`0004`).
    Data(Bytes),
    /// Flush packet (0000).
    Flush,
    /// Delimiter packet (0001).
    Delimiter,
    /// Response-end packet (0002).
    ResponseEnd,
}

impl PktLine {
    /// Creates a data packet from a string slice.
    pub fn from_string(s: &str) -> Self {
        Self::Data(Bytes::copy_from_slice(s.as_bytes()))
    }

    /// Creates a data packet from bytes.
    pub fn from_bytes(b: impl Into<Bytes>) -> Self {
        Self::Data(b.into())
    }

    /// Encodes the packet to bytes.
    ///
    /// Fails if a data payload exceeds [`MAX_PAYLOAD_LEN`].
    pub fn encode(&self) -> Result<Bytes> {
        match self {
            Self::Data(data) => {
                if data.len() > MAX_PAYLOAD_LEN {
                    return Err(ProtocolError::PayloadTooLong(data.len()));
                }
                let mut buf = BytesMut::with_capacity(data.len() + 4);
                buf.put_slice(format!("{:04x}", data.len() + 4).as_bytes());
                buf.put_slice(data);
                Ok(buf.freeze())
            }
            Self::Flush => Ok(Bytes::from_static(b"0000")),
            Self::Delimiter => Ok(Bytes::from_static(b"0001")),
            Self::ResponseEnd => Ok(Bytes::from_static(b"0002")),
        }
    }

    /// Returns true if this is a flush packet.
    pub fn is_flush(&self) -> bool {
        matches!(self, Self::Flush)
    }

    /// Returns the data content, or None for special packets.
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            Self::Data(data) => Some(data),
            _ => None,
        }
    }

    /// Returns the data as a string, trimming any trailing newline.
    pub fn as_str(&self) -> Option<&str> {
        self.data()
            .and_then(|d| std::str::from_utf8(d).ok())
            .map(|s| s.trim_end_matches('\n'))
    }

    /// Returns the message of an `ERR <message>` line.
    pub fn err_message(&self) -> Option<&str> {
        self.as_str().and_then(|s| s.strip_prefix("ERR "))
    }
}

/// Reader for pkt-line format.
pub struct PktLineReader<R> {
    reader: R,
}

impl<R: Read> PktLineReader<R> {
    /// Creates a new pkt-line reader.
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Reads the next packet.
    ///
    /// Returns `Ok(None)` when the stream ends exactly at a packet boundary.
    pub fn read(&mut self) -> Result<Option<PktLine>> {
        let mut len_buf = [0u8; 4];
        if !self.read_header(&mut len_buf)? {
            return Ok(None);
        }

        let len_str = std::str::from_utf8(&len_buf)
            .map_err(|_| ProtocolError::InvalidPktLine("invalid length prefix".to_string()))?;

        match len_str {
            "0000" => Ok(Some(PktLine::Flush)),
            "0001" => Ok(Some(PktLine::Delimiter)),
            "0002" => Ok(Some(PktLine::ResponseEnd)),
            _ => {
                if !len_str.bytes().all(|b| b.is_ascii_hexdigit()) {
                    return Err(ProtocolError::InvalidPktLine(format!(
                        "invalid length {:?}",
                        String::from_utf8_lossy(&len_buf)
                    )));
                }
                let len = usize::from_str_radix(len_str, 16)
                    .map_err(|_| ProtocolError::InvalidPktLine("invalid length".to_string()))?;

                if len < 4 {
                    return Err(ProtocolError::InvalidPktLine("length too small".to_string()));
                }
                if len > MAX_PKT_LEN {
                    return Err(ProtocolError::InvalidPktLine(format!(
                        "length {len} exceeds {MAX_PKT_LEN}"
                    )));
                }

                let mut data = vec![0u8; len - 4];
                self.reader.read_exact(&mut data).map_err(|e| {
                    if e.kind() == ErrorKind::UnexpectedEof {
                        ProtocolError::InvalidPktLine("truncated packet".to_string())
                    } else {
                        e.into()
                    }
                })?;

                Ok(Some(PktLine::Data(data.into())))
            }
        }
    }

    /// Reads the next packet, treating end of stream as an error.
    pub fn read_packet(&mut self) -> Result<PktLine> {
        self.read()?
            .ok_or_else(|| ProtocolError::Protocol("unexpected end of stream".to_string()))
    }

    /// Reads all packets until a flush packet.
    pub fn read_until_flush(&mut self) -> Result<Vec<PktLine>> {
        let mut packets = Vec::new();
        loop {
            match self.read()? {
                Some(PktLine::Flush) | None => break,
                Some(pkt) => packets.push(pkt),
            }
        }
        Ok(packets)
    }

    /// Returns a mutable reference to the inner reader.
    pub fn inner_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    /// Consumes the reader and returns the inner reader.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Fills the length header. Returns false on a clean EOF before any byte.
    fn read_header(&mut self, buf: &mut [u8; 4]) -> Result<bool> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) if filled == 0 => return Ok(false),
                Ok(0) => {
                    return Err(ProtocolError::InvalidPktLine(
                        "truncated length prefix".to_string(),
                    ))
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(true)
    }
}

/// Writer for pkt-line format.
pub struct PktLineWriter<W> {
    writer: W,
}

impl<W: Write> PktLineWriter<W> {
    /// Creates a new pkt-line writer.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes a packet.
    pub fn write(&mut self, pkt: &PktLine) -> Result<()> {
        self.writer.write_all(&pkt.encode()?)?;
        Ok(())
    }

    /// Writes a data line.
    pub fn write_data(&mut self, data: &[u8]) -> Result<()> {
        self.write(&PktLine::Data(Bytes::copy_from_slice(data)))
    }

    /// Writes a string line (with newline).
    pub fn write_line(&mut self, s: &str) -> Result<()> {
        let mut data = BytesMut::with_capacity(s.len() + 1);
        data.put_slice(s.as_bytes());
        if !s.ends_with('\n') {
            data.put_u8(b'\n');
        }
        self.write(&PktLine::Data(data.freeze()))
    }

    /// Writes a flush packet.
    pub fn flush_pkt(&mut self) -> Result<()> {
        self.write(&PktLine::Flush)
    }

    /// Flushes the underlying writer.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Returns a mutable reference to the inner writer.
    pub fn inner_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Returns the inner writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}
