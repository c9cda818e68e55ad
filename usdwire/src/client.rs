//! Transfer client: the public operations built on top of a [`Transport`].
//!
//! Every operation runs the same state machine:
//!
//! ```text
//! Idle -> Validating -> Sending -> AwaitingReply -> { Succeeded | TimedOut | Failed }
//!             |                                            ^
//!             +--------------------------------------------+  (bad path, bad JSON)
//! ```
//!
//! Failures never escape as `Err`: each operation returns a [`TransferReport`]
//! whose [`Outcome`] tells success, timeout and every error kind apart.

use std::io;
use std::path::Path;

use log::{debug, error, info, warn};
use serde::Serialize;

use crate::config::SessionConfig;
use crate::core::{decode_reply, encode_file, encode_text, Envelope};
use crate::error::{Error, Result};
use crate::transport::{Endpoint, Session, Transport};
use crate::DEFAULT_MAX_CONTENT_SIZE;

/// Where an operation currently is, or how the last one ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    Validating,
    Sending,
    AwaitingReply,
    Succeeded,
    TimedOut,
    Failed,
}

impl TransferState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransferState::Succeeded | TransferState::TimedOut | TransferState::Failed
        )
    }
}

/// How an operation ended.
#[derive(Debug)]
pub enum Outcome {
    Succeeded { reply: String },
    /// No reply within the receive timeout.
    TimedOut,
    Failed(Error),
}

/// Result of one transfer operation.
#[derive(Debug)]
pub struct TransferReport {
    /// Content digest, set for file transfers that got past validation.
    pub digest: Option<String>,
    pub outcome: Outcome,
}

impl TransferReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Succeeded { .. })
    }

    pub fn state(&self) -> TransferState {
        match self.outcome {
            Outcome::Succeeded { .. } => TransferState::Succeeded,
            Outcome::TimedOut => TransferState::TimedOut,
            Outcome::Failed(_) => TransferState::Failed,
        }
    }

    pub fn reply(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Succeeded { reply } => Some(reply),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&Error> {
        match &self.outcome {
            Outcome::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// Process exit code: 0 on success, 2 on timeout, 1 on any failure.
    pub fn exit_code(&self) -> i32 {
        match self.outcome {
            Outcome::Succeeded { .. } => 0,
            Outcome::TimedOut => 2,
            Outcome::Failed(_) => 1,
        }
    }
}

/// Sends files and messages over a transport, one exchange at a time.
pub struct TransferClient<T = Session> {
    transport: T,
    max_content_size: u64,
    state: TransferState,
}

impl TransferClient<Session> {
    /// Connects a new session to `endpoint`.
    pub async fn connect(endpoint: Endpoint, config: SessionConfig) -> Result<Self> {
        let session = Session::connect(endpoint, config).await?;
        Ok(Self::new(session).with_max_content_size(config.max_content_size))
    }

    /// Tears the session down. Safe to call more than once.
    pub async fn disconnect(&mut self) {
        self.transport.disconnect().await;
    }
}

impl<T: Transport> TransferClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            max_content_size: DEFAULT_MAX_CONTENT_SIZE,
            state: TransferState::Idle,
        }
    }

    pub fn with_max_content_size(mut self, size: u64) -> Self {
        self.max_content_size = size;
        self
    }

    /// State of the current or last operation.
    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Sends a file as `[filename, content, digest]` and waits for the reply.
    ///
    /// A missing or unreadable file fails before anything is sent.
    pub async fn send_file(&mut self, path: impl AsRef<Path>) -> TransferReport {
        let path = path.as_ref();
        self.enter(TransferState::Validating);
        let envelope = match self.load_file(path).await {
            Ok(envelope) => envelope,
            Err(e) => return self.finish(None, Err(e)),
        };
        let digest = envelope.digest().map(str::to_string);
        if let Some(hash) = &digest {
            info!(
                "Sending file {} ({} bytes), digest {}...",
                path.display(),
                envelope.frames()[1].len(),
                &hash[..16]
            );
        }
        let result = self.exchange(envelope).await;
        self.finish(digest, result)
    }

    /// Sends a single text frame and waits for the reply.
    pub async fn send_message(&mut self, text: &str) -> TransferReport {
        self.enter(TransferState::Validating);
        let result = match self.ensure_connected() {
            Ok(()) => {
                info!("Sending message: {}", text);
                self.exchange(encode_text(text)).await
            }
            Err(e) => Err(e),
        };
        self.finish(None, result)
    }

    /// Serializes `value` as pretty-printed JSON and sends it as text.
    pub async fn send_json<V: Serialize + ?Sized>(&mut self, value: &V) -> TransferReport {
        self.enter(TransferState::Validating);
        match serde_json::to_string_pretty(value) {
            Ok(text) => self.send_message(&text).await,
            Err(e) => self.finish(None, Err(e.into())),
        }
    }

    /// Parses `text` as JSON and sends its canonical form.
    pub async fn send_json_str(&mut self, text: &str) -> TransferReport {
        self.enter(TransferState::Validating);
        match serde_json::from_str::<serde_json::Value>(text) {
            Ok(value) => self.send_json(&value).await,
            Err(e) => self.finish(None, Err(e.into())),
        }
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.transport.is_connected() {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    async fn load_file(&self, path: &Path) -> Result<Envelope> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| file_error(path, e))?;
        if !metadata.is_file() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        if metadata.len() > self.max_content_size {
            return Err(Error::PayloadTooLarge {
                size: metadata.len(),
                limit: self.max_content_size,
            });
        }
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidFilename(path.display().to_string()))?;

        self.ensure_connected()?;
        let content = tokio::fs::read(path)
            .await
            .map_err(|e| file_error(path, e))?;
        encode_file(filename, content)
    }

    async fn exchange(&mut self, envelope: Envelope) -> Result<Option<String>> {
        self.enter(TransferState::Sending);
        self.transport.send(&envelope).await?;

        self.enter(TransferState::AwaitingReply);
        match self.transport.recv_reply().await? {
            Some(frame) => Ok(Some(decode_reply(&frame)?)),
            None => Ok(None),
        }
    }

    fn finish(&mut self, digest: Option<String>, result: Result<Option<String>>) -> TransferReport {
        let outcome = match result {
            Ok(Some(reply)) => {
                info!("Server reply: {}", reply);
                Outcome::Succeeded { reply }
            }
            Ok(None) => {
                warn!("No reply received (timeout)");
                Outcome::TimedOut
            }
            Err(e) => {
                error!("Transfer failed: {}", e);
                Outcome::Failed(e)
            }
        };
        let report = TransferReport { digest, outcome };
        self.enter(report.state());
        report
    }

    fn enter(&mut self, state: TransferState) {
        debug!("Transfer state {:?} -> {:?}", self.state, state);
        self.state = state;
    }
}

fn file_error(path: &Path, source: io::Error) -> Error {
    match source.kind() {
        io::ErrorKind::NotFound => Error::FileNotFound(path.to_path_buf()),
        _ => Error::FileRead {
            path: path.to_path_buf(),
            source,
        },
    }
}
