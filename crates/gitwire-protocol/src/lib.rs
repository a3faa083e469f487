//! Git smart protocol primitives for Gitwire.
//!
//! This crate holds the wire-level pieces shared by every transport:
//! endpoint parsing, pkt-line framing, reference advertisements, capability
//! negotiation and the upload-pack / receive-pack request and response
//! messages. It performs no I/O of its own beyond reading and writing the
//! streams it is handed.

mod advrefs;
pub mod capability;
mod endpoint;
mod error;
mod oid;
mod pktline;
pub mod sideband;
mod service;
mod update;
mod upload;

pub use advrefs::AdvRefs;
pub use capability::Capabilities;
pub use endpoint::{Endpoint, Scheme};
pub use error::{is_repository_not_found_message, ProtocolError};
pub use oid::ObjectId;
pub use pktline::{PktLine, PktLineReader, PktLineWriter, MAX_PAYLOAD_LEN, MAX_PKT_LEN};
pub use service::Service;
pub use sideband::{Sideband, SidebandReader, SidebandWriter};
pub use update::{CommandStatus, RefUpdateCommand, ReferenceUpdateRequest, ReportStatus};
pub use upload::{Acknowledgement, PackHeader, ShallowUpdate, UploadPackRequest, PACK_SIGNATURE};

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
