//! Transport layer abstraction.
//!
//! This module provides the `Transport` trait that the transfer client is
//! written against, plus the concrete ZMTP [`Session`].
//!
//! # Implementations
//!
//! - `Session`: DEALER socket over TCP, Unix domain or vsock streams
//! - test doubles that record envelopes instead of writing them
//!
//! # Endpoints
//!
//! ```text
//! tcp://localhost:5556
//! ipc:///tmp/usd-middleware.sock
//! vsock://3:1234
//! ```

mod session;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;

use crate::core::Envelope;
use crate::error::{Error, Result};

pub use session::{Session, SessionState};

/// Request/reply transport carrying envelopes.
///
/// One request is in flight at a time: callers send an envelope, then wait
/// for its reply before sending the next.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Returns true while the transport can carry envelopes.
    fn is_connected(&self) -> bool;

    /// Sends all frames of `envelope` as one multipart message.
    async fn send(&mut self, envelope: &Envelope) -> Result<()>;

    /// Waits for one reply frame.
    ///
    /// Returns `Ok(None)` when the receive timeout expires first.
    async fn recv_reply(&mut self) -> Result<Option<Bytes>>;
}

/// Address of the peer socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `host:port`, resolved at connect time.
    Tcp(String),
    Ipc(PathBuf),
    Vsock { cid: u32, port: u32 },
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidEndpoint(s.to_string());
        let (scheme, addr) = s.split_once("://").ok_or_else(invalid)?;
        match scheme {
            "tcp" => {
                let (host, port) = addr.rsplit_once(':').ok_or_else(invalid)?;
                if host.is_empty() || host == "*" || port.parse::<u16>().is_err() {
                    return Err(invalid());
                }
                Ok(Endpoint::Tcp(addr.to_string()))
            }
            "ipc" if !addr.is_empty() => Ok(Endpoint::Ipc(PathBuf::from(addr))),
            "vsock" => {
                let (cid, port) = addr.split_once(':').ok_or_else(invalid)?;
                Ok(Endpoint::Vsock {
                    cid: cid.parse().map_err(|_| invalid())?,
                    port: port.parse().map_err(|_| invalid())?,
                })
            }
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "tcp://{addr}"),
            Endpoint::Ipc(path) => write!(f, "ipc://{}", path.display()),
            Endpoint::Vsock { cid, port } => write!(f, "vsock://{cid}:{port}"),
        }
    }
}

/// Name this client announces to the peer's routing layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    /// Maximum identity length allowed on the wire.
    pub const MAX_LEN: usize = 255;

    /// Builds `client_<pid>_<unixtime>`.
    ///
    /// Only meant to avoid collisions between concurrent processes.
    pub fn generate() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Identity(format!("client_{}_{}", std::process::id(), now))
    }

    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() || name.len() > Self::MAX_LEN || name.as_bytes()[0] == 0 {
            return Err(Error::Handshake(format!("invalid identity {name:?}")));
        }
        Ok(Identity(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
