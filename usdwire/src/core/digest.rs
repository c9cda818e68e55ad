//! SHA-256 content digests for transfer integrity.
//!
//! The digest covers the content frame only. Filename and framing are never
//! part of the hash input.
//!
//! # Example
//!
//! ```rust
//! use usdwire::core::digest;
//!
//! let hex = digest::digest(b"hello");
//! assert_eq!(hex.len(), 64);
//! assert!(digest::verify(b"hello", &hex));
//! ```

use sha2::{Digest, Sha256};

/// Length of a rendered digest in hex characters.
pub const DIGEST_HEX_LEN: usize = 64;

/// Computes the SHA-256 of `data` as lowercase hex.
pub fn digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Returns true if `text` looks like a rendered digest (64 hex chars, any case).
pub fn is_valid_digest(text: &str) -> bool {
    text.len() == DIGEST_HEX_LEN && text.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Recomputes the digest of `data` and compares it with `expected`.
///
/// Comparison ignores case. A malformed `expected` never verifies.
pub fn verify(data: &[u8], expected: &str) -> bool {
    if !is_valid_digest(expected) {
        log::debug!("Rejecting malformed digest of {} chars", expected.len());
        return false;
    }
    digest(data).eq_ignore_ascii_case(expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_values() {
        assert_eq!(
            digest(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(
            digest(&[]),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_deterministic() {
        let data = vec![0xAB; 100 * 1024];
        assert_eq!(digest(&data), digest(&data));
    }

    #[test]
    fn test_distinct_payloads() {
        let samples: Vec<Vec<u8>> = (0u8..64).map(|i| vec![i; i as usize + 1]).collect();
        let mut seen: Vec<String> = samples.iter().map(|s| digest(s)).collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), samples.len());

        assert_ne!(digest(b"hello"), digest(b"hellp"));
    }

    #[test]
    fn test_lowercase_hex() {
        let hex = digest(b"USD stage");
        assert_eq!(hex.len(), DIGEST_HEX_LEN);
        assert!(hex.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)));
    }

    #[test]
    fn test_verify() {
        let data = b"scene.usda contents";
        let hex = digest(data);
        assert!(verify(data, &hex));
        assert!(verify(data, &hex.to_uppercase()));
        assert!(!verify(b"other contents", &hex));
        assert!(!verify(data, "abc"));
        assert!(!verify(data, &"z".repeat(DIGEST_HEX_LEN)));
    }
}
