//! # usdwire - File and Message Transfer over ZMTP
//!
//! usdwire is the DEALER side of a request/reply link to a ROUTER peer
//! (for example a USD ingest middleware). It provides:
//!
//! - **File transfer**: a file goes out as one `[filename, content, digest]` message
//! - **Text and JSON messages**: a single UTF-8 frame
//! - **SHA-256 digests**: integrity signalling computed over the content frame
//! - **Bounded waits**: every send and reply wait is capped by a timeout
//! - **Native ZMTP 3.0**: talks to stock ZeroMQ ROUTER sockets over TCP, IPC or vsock
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    Transfer Client                       │
//! │     send_file · send_message · send_json · reports       │
//! ├─────────────────────────────────────────────────────────┤
//! │                    Core Layer                            │
//! │  ┌─────────────────────┐ ┌──────────────────────────┐   │
//! │  │  Envelope Codec     │ │  Digest (SHA-256)        │   │
//! │  └─────────────────────┘ └──────────────────────────┘   │
//! ├─────────────────────────────────────────────────────────┤
//! │                    Transport Layer                       │
//! │  ┌─────────────────────────────────────────────────┐   │
//! │  │   Session (ZMTP greeting, READY, frames)         │   │
//! │  │   over TCP / Unix socket / vsock                 │   │
//! │  └─────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use usdwire::{SessionConfig, TransferClient};
//!
//! let endpoint = "tcp://localhost:5556".parse()?;
//! let mut client = TransferClient::connect(endpoint, SessionConfig::default()).await?;
//!
//! let report = client.send_file("model.usd").await;
//! println!("{:?}", report.outcome);
//!
//! client.disconnect().await;
//! ```

#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod transport;

pub use client::{Outcome, TransferClient, TransferReport, TransferState};
pub use config::SessionConfig;
pub use crate::core::{Envelope, EnvelopeKind, FileEnvelope};
pub use error::{Error, ErrorKind, Result};
pub use transport::{Endpoint, Identity, Session, SessionState, Transport};

/// Endpoint used when none is given.
pub const DEFAULT_ENDPOINT: &str = "tcp://localhost:5556";

/// Default linger period in milliseconds.
pub const DEFAULT_LINGER_MS: u64 = 1000;

/// Default receive timeout in milliseconds.
pub const DEFAULT_RECV_TIMEOUT_MS: u64 = 5000;

/// Default send timeout in milliseconds.
pub const DEFAULT_SEND_TIMEOUT_MS: u64 = 5000;

/// Default ceiling on file content size (256 MiB).
pub const DEFAULT_MAX_CONTENT_SIZE: u64 = 256 * 1024 * 1024;
