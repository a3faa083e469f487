//! Side-band multiplexing of the pack stream.
//!
//! When `side-band` or `side-band-64k` is negotiated, the server wraps the
//! pack in pkt-lines whose first payload byte names a channel: 1 carries
//! pack data, 2 progress text and 3 a fatal error message. A flush packet
//! ends the stream.

use crate::pktline::{PktLine, PktLineReader, PktLineWriter, MAX_PAYLOAD_LEN};
use crate::{ProtocolError, Result};
use bytes::Bytes;
use std::io::{self, Read, Write};

/// Channel carrying pack data.
pub const CHANNEL_DATA: u8 = 1;
/// Channel carrying progress messages.
pub const CHANNEL_PROGRESS: u8 = 2;
/// Channel carrying a fatal error message.
pub const CHANNEL_ERROR: u8 = 3;

/// Negotiated side-band variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sideband {
    /// `side-band`: packets of at most 1000 bytes.
    SideBand,
    /// `side-band-64k`: packets of at most 65520 bytes.
    SideBand64k,
}

impl Sideband {
    /// Largest data chunk a single packet may carry, excluding the channel byte.
    pub fn max_chunk(self) -> usize {
        match self {
            Self::SideBand => 1000 - 4 - 1,
            Self::SideBand64k => MAX_PAYLOAD_LEN - 1,
        }
    }
}

/// Demultiplexes a side-band stream into the plain pack bytes.
///
/// Progress lines are logged; an error-channel packet turns into an
/// [`io::Error`] carrying the server's message.
pub struct SidebandReader<R> {
    reader: PktLineReader<R>,
    buf: Bytes,
    done: bool,
}

impl<R: Read> SidebandReader<R> {
    /// Wraps a pkt-line reader positioned at the start of the multiplexed pack.
    pub fn new(reader: PktLineReader<R>) -> Self {
        Self {
            reader,
            buf: Bytes::new(),
            done: false,
        }
    }

    /// Returns the underlying reader.
    pub fn into_inner(self) -> PktLineReader<R> {
        self.reader
    }

    /// Reads packets until one carries pack data or the stream ends.
    fn fill(&mut self) -> io::Result<()> {
        while self.buf.is_empty() && !self.done {
            let pkt = match self.reader.read().map_err(into_io)? {
                Some(PktLine::Data(data)) => data,
                Some(PktLine::Flush) | None => {
                    self.done = true;
                    return Ok(());
                }
                Some(other) => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("unexpected packet in side-band stream: {other:?}"),
                    ))
                }
            };
            let Some(&channel) = pkt.first() else {
                continue;
            };
            let payload = pkt.slice(1..);
            match channel {
                CHANNEL_DATA => self.buf = payload,
                CHANNEL_PROGRESS => {
                    let text = String::from_utf8_lossy(&payload);
                    let text = text.trim_end_matches(['\n', '\r']);
                    if !text.is_empty() {
                        tracing::info!(target: "gitwire::progress", "{}", text);
                    }
                }
                CHANNEL_ERROR => {
                    let msg = String::from_utf8_lossy(&payload).trim_end().to_string();
                    self.done = true;
                    return Err(io::Error::other(ProtocolError::Remote(msg)));
                }
                other => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("unknown side-band channel {other}"),
                    ))
                }
            }
        }
        Ok(())
    }
}

impl<R: Read> Read for SidebandReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        self.fill()?;
        let n = out.len().min(self.buf.len());
        out[..n].copy_from_slice(&self.buf[..n]);
        let _ = self.buf.split_to(n);
        Ok(n)
    }
}

fn into_io(err: ProtocolError) -> io::Error {
    match err {
        ProtocolError::Io(e) => e,
        other => io::Error::new(io::ErrorKind::InvalidData, other),
    }
}

/// Multiplexes pack data onto side-band channels; the server half of
/// [`SidebandReader`].
pub struct SidebandWriter<W> {
    writer: PktLineWriter<W>,
    kind: Sideband,
}

impl<W: Write> SidebandWriter<W> {
    /// Creates a writer for the given variant.
    pub fn new(writer: W, kind: Sideband) -> Self {
        Self {
            writer: PktLineWriter::new(writer),
            kind,
        }
    }

    /// Sends `data` on `channel`, split into packets that fit the variant.
    pub fn write_channel(&mut self, channel: u8, data: &[u8]) -> Result<()> {
        for chunk in data.chunks(self.kind.max_chunk()) {
            let mut payload = Vec::with_capacity(chunk.len() + 1);
            payload.push(channel);
            payload.extend_from_slice(chunk);
            self.writer.write_data(&payload)?;
        }
        Ok(())
    }

    /// Sends pack data.
    pub fn write_data(&mut self, data: &[u8]) -> Result<()> {
        self.write_channel(CHANNEL_DATA, data)
    }

    /// Sends a progress message.
    pub fn write_progress(&mut self, msg: &str) -> Result<()> {
        self.write_channel(CHANNEL_PROGRESS, msg.as_bytes())
    }

    /// Sends a fatal error message.
    pub fn write_error(&mut self, msg: &str) -> Result<()> {
        self.write_channel(CHANNEL_ERROR, msg.as_bytes())
    }

    /// Ends the stream with a flush packet.
    pub fn finish(mut self) -> Result<W> {
        self.writer.flush_pkt()?;
        self.writer.flush()?;
        Ok(self.writer.into_inner())
    }
}
