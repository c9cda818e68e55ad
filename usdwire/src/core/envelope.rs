//! Envelope construction and reply decoding.
//!
//! An envelope is the ordered list of frames that make up one logical
//! request. Framing itself is left to the wire protocol: frames are kept as
//! independent buffers rather than concatenated with length prefixes.
//!
//! # Envelope shapes
//!
//! ```text
//! File envelope (3 frames)          Text envelope (1 frame)
//! +--------------------+            +--------------------+
//! | filename (UTF-8)   |            | text (UTF-8)       |
//! +--------------------+            +--------------------+
//! | content (bytes)    |
//! +--------------------+
//! | digest (hex, 64)   |
//! +--------------------+
//! ```

use bytes::Bytes;

use super::digest::{self, is_valid_digest};
use crate::error::{Error, Result};

/// Number of frames in a file envelope.
pub const FILE_ENVELOPE_FRAMES: usize = 3;

/// Shape of an envelope, judged from its frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    File,
    Text,
    Other,
}

/// Ordered frames of one logical request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    frames: Vec<Bytes>,
}

impl Envelope {
    /// Wraps frames received off the wire.
    pub fn from_frames(frames: Vec<Bytes>) -> Self {
        Self { frames }
    }

    pub fn frames(&self) -> &[Bytes] {
        &self.frames
    }

    pub fn into_frames(self) -> Vec<Bytes> {
        self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Sum of all frame lengths.
    pub fn total_size(&self) -> usize {
        self.frames.iter().map(Bytes::len).sum()
    }

    /// Digest frame of a file envelope.
    pub fn digest(&self) -> Option<&str> {
        match self.kind() {
            EnvelopeKind::File => std::str::from_utf8(&self.frames[2]).ok(),
            _ => None,
        }
    }

    pub fn kind(&self) -> EnvelopeKind {
        match self.frames.as_slice() {
            [_] => EnvelopeKind::Text,
            [name, _, hash]
                if !name.is_empty()
                    && std::str::from_utf8(hash).is_ok_and(is_valid_digest) =>
            {
                EnvelopeKind::File
            }
            _ => EnvelopeKind::Other,
        }
    }
}

/// A file envelope split back into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEnvelope {
    pub filename: String,
    pub content: Bytes,
    pub digest: String,
}

impl FileEnvelope {
    /// Parses a received 3-frame file envelope.
    pub fn parse(envelope: &Envelope) -> Result<Self> {
        let [name, content, hash] = envelope.frames() else {
            return Err(Error::protocol(format!(
                "file envelope needs {} frames, got {}",
                FILE_ENVELOPE_FRAMES,
                envelope.len()
            )));
        };
        let filename = decode_reply(name)?;
        validate_filename(&filename)?;
        let digest = decode_reply(hash)?;
        if !is_valid_digest(&digest) {
            return Err(Error::protocol(format!("malformed digest {digest:?}")));
        }
        Ok(Self {
            filename,
            content: content.clone(),
            digest,
        })
    }

    /// Checks the carried digest against the carried content.
    pub fn verify(&self) -> bool {
        digest::verify(&self.content, &self.digest)
    }
}

/// Builds the `[filename, content, digest]` envelope.
///
/// `filename` must be a bare file name; directory components are rejected.
pub fn encode_file(filename: &str, content: impl Into<Bytes>) -> Result<Envelope> {
    validate_filename(filename)?;
    let content = content.into();
    let hash = digest::digest(&content);
    log::debug!(
        "Encoded file envelope: name={}, size={}, digest={}",
        filename,
        content.len(),
        hash
    );
    Ok(Envelope {
        frames: vec![
            Bytes::copy_from_slice(filename.as_bytes()),
            content,
            Bytes::from(hash),
        ],
    })
}

/// Builds a single-frame text envelope.
pub fn encode_text(text: &str) -> Envelope {
    Envelope {
        frames: vec![Bytes::copy_from_slice(text.as_bytes())],
    }
}

/// Interprets a reply frame as UTF-8 text.
pub fn decode_reply(frame: &[u8]) -> Result<String> {
    Ok(String::from_utf8(frame.to_vec())?)
}

/// A bare name: not empty, not `.` or `..`, no NUL, no path separator of
/// the host platform. `/` is always a separator.
fn validate_filename(filename: &str) -> Result<()> {
    if filename.is_empty()
        || filename == "."
        || filename == ".."
        || filename.contains(|c: char| c == '\0' || std::path::is_separator(c))
    {
        return Err(Error::InvalidFilename(filename.to_string()));
    }
    Ok(())
}
