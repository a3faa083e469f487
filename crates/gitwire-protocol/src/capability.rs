//! Capability lists exchanged during reference advertisement.

use std::fmt;

/// Multi-ack negotiation. Not supported by this client.
pub const MULTI_ACK: &str = "multi_ack";
/// Detailed multi-ack negotiation. Not supported by this client.
pub const MULTI_ACK_DETAILED: &str = "multi_ack_detailed";
/// Thin packs referencing objects outside the pack. Not supported.
pub const THIN_PACK: &str = "thin-pack";
/// Side-band multiplexing with 1000-byte packets.
pub const SIDE_BAND: &str = "side-band";
/// Side-band multiplexing with 65520-byte packets.
pub const SIDE_BAND_64K: &str = "side-band-64k";
/// Offset deltas in the pack.
pub const OFS_DELTA: &str = "ofs-delta";
/// Client or server identification.
pub const AGENT: &str = "agent";
/// Shallow clone support.
pub const SHALLOW: &str = "shallow";
/// Suppress progress on side-band channel 2.
pub const NO_PROGRESS: &str = "no-progress";
/// Send annotated tags pointing at fetched objects.
pub const INCLUDE_TAG: &str = "include-tag";
/// Per-ref status report after a push.
pub const REPORT_STATUS: &str = "report-status";
/// Allow reference deletion on push.
pub const DELETE_REFS: &str = "delete-refs";
/// Symbolic ref target, e.g. `symref=HEAD:refs/heads/main`.
pub const SYMREF: &str = "symref";

/// Capabilities this client cannot honor. They are removed from every server
/// advertisement and never requested.
pub const UNSUPPORTED: &[&str] = &[MULTI_ACK, MULTI_ACK_DETAILED, THIN_PACK];

/// Agent string sent to servers.
pub const DEFAULT_AGENT: &str = concat!("gitwire/", env!("CARGO_PKG_VERSION"));

/// An ordered capability list. Keys may repeat (`symref` does).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    entries: Vec<(String, Option<String>)>,
}

impl Capabilities {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the space-separated wire form.
    pub fn parse(s: &str) -> Self {
        let mut caps = Self::new();
        for token in s.split_whitespace() {
            match token.split_once('=') {
                Some((name, value)) => caps.add(name, Some(value)),
                None => caps.add(token, None),
            }
        }
        caps
    }

    /// Adds a capability. Identical entries are kept once.
    pub fn add(&mut self, name: &str, value: Option<&str>) {
        let entry = (name.to_string(), value.map(str::to_string));
        if !self.entries.contains(&entry) {
            self.entries.push(entry);
        }
    }

    /// Replaces every value of `name` with `value`.
    pub fn set(&mut self, name: &str, value: Option<&str>) {
        self.remove(name);
        self.add(name, value);
    }

    /// Removes every entry named `name`.
    pub fn remove(&mut self, name: &str) {
        self.entries.retain(|(n, _)| n != name);
    }

    /// Returns true if `name` is present.
    pub fn supports(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    /// Returns the first value of `name`.
    pub fn get<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        self.get_all(name).next()
    }

    /// Returns all values of `name`.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(n, _)| n == name)
            .filter_map(|(_, v)| v.as_deref())
    }

    /// Iterates over `(name, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_deref()))
    }

    /// Returns true if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Removes every capability in [`UNSUPPORTED`].
    pub fn filter_unsupported(&mut self) {
        self.entries
            .retain(|(name, _)| !UNSUPPORTED.contains(&name.as_str()));
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            match value {
                Some(v) => write!(f, "{name}={v}")?,
                None => f.write_str(name)?,
            }
        }
        Ok(())
    }
}
