//! Core data structures for the transfer protocol.
//!
//! - Digest: SHA-256 over file content
//! - Envelope: ordered frames of one logical request

pub mod digest;
mod envelope;

pub use envelope::{
    decode_reply, encode_file, encode_text, Envelope, EnvelopeKind, FileEnvelope,
    FILE_ENVELOPE_FRAMES,
};
