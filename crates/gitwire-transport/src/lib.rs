//! Git transports and protocol sessions for Gitwire.
//!
//! A [`Client`] picks a transport from the endpoint scheme and opens a
//! session. Sessions read the reference advertisement once, then run a
//! single fetch (yielding the raw pack stream) or push (consuming one).
//!
//! ```no_run
//! use gitwire_transport::{Client, TransportConfig};
//! use gitwire_protocol::{Endpoint, UploadPackRequest};
//! use std::io::Read;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::new(&TransportConfig::default())?;
//! let endpoint = Endpoint::parse("https://example.com/project.git")?;
//! let mut session = client.new_fetch_pack_session(&endpoint, None)?;
//! let adv = session.advertised_references()?;
//! let head = adv.head.ok_or("no HEAD")?;
//! let request = UploadPackRequest::for_server(&adv.capabilities).want(head);
//! let mut pack = Vec::new();
//! session.fetch_pack(&request)?.read_to_end(&mut pack)?;
//! session.close()?;
//! # Ok(())
//! # }
//! ```

mod auth;
mod client;
mod command;
mod config;
mod error;
pub mod session;
pub mod transport;

pub use auth::AuthMethod;
pub use client::Client;
pub use command::{Command, Commander};
pub use config::TransportConfig;
pub use error::TransportError;
pub use session::{
    CommandSession, FetchPackSession, SendPackSession, Session, UploadPackResponse,
};
pub use transport::Transport;

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
