//! Content-addressed cache key generation.
//!
//! A fingerprint is a two-stage SHA-256 digest: the request target is hashed
//! first, and when the request carries a body the body is hashed appended to
//! that first digest. No per-process salt is mixed in, so keys survive
//! restarts and are shared between proxy instances on the same redis.

use std::fmt;

use sha2::{Digest, Sha256};

/// Deterministic identity of a cacheable request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Fingerprint a request target and optional body.
    ///
    /// `digest(target)` when `body` is `None`, otherwise
    /// `digest(digest(target) ‖ body)`.
    pub fn of(target: &str, body: Option<&[u8]>) -> Self {
        let target_digest = Sha256::digest(target.as_bytes());

        let digest = match body {
            Some(body) => {
                let mut hasher = Sha256::new();
                hasher.update(target_digest);
                hasher.update(body);
                hasher.finalize()
            }
            None => target_digest,
        };

        Self(digest.into())
    }

    /// Lowercase hex rendering used as the store key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Compute the store key for a request target and optional body.
pub fn compute_cache_key(target: &str, body: Option<&[u8]>) -> String {
    Fingerprint::of(target, body).to_hex()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_stability() {
        let hash1 = compute_cache_key("/indexes/products/search", Some(br#"{"q":"shoe"}"#));
        let hash2 = compute_cache_key("/indexes/products/search", Some(br#"{"q":"shoe"}"#));
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_hash_known_vector() {
        // sha256("abc")
        assert_eq!(
            compute_cache_key("abc", None),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_hash_two_stage() {
        let target = "/indexes/products/search";
        let body = br#"{"q":"shoe"}"#;

        let mut hasher = Sha256::new();
        hasher.update(Sha256::digest(target.as_bytes()));
        hasher.update(body);
        let expected = hex::encode(hasher.finalize());

        assert_eq!(compute_cache_key(target, Some(body)), expected);
    }

    #[test]
    fn test_hash_different_body() {
        let hash1 = compute_cache_key("/indexes/products/search", Some(br#"{"q":"shoe"}"#));
        let hash2 = compute_cache_key("/indexes/products/search", Some(br#"{"q":"shoes"}"#));
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_hash_different_target() {
        let hash1 = compute_cache_key("/indexes/products/search", Some(b"{}"));
        let hash2 = compute_cache_key("/indexes/articles/search", Some(b"{}"));
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_empty_body_differs_from_no_body() {
        let without = compute_cache_key("/indexes/products/search", None);
        let empty = compute_cache_key("/indexes/products/search", Some(b""));
        assert_ne!(without, empty);
    }

    #[test]
    fn test_hash_format() {
        let fingerprint = Fingerprint::of("/indexes/products/search", None);
        let hash = fingerprint.to_hex();
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(fingerprint.to_string(), hash);
    }
}
