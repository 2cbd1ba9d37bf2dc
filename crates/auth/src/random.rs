//! Secure random source shared by the hasher and the token generator.
//!
//! Randomness is drawn from the operating system only. When the OS source
//! fails the caller gets a [`CryptoError`]; there is no fallback generator.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use rand::rngs::OsRng;
use thiserror::Error;

/// Failure of a cryptographic primitive.
///
/// Fatal to the current operation and never retried silently.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("secure random source unavailable: {0}")]
    RandomUnavailable(String),

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),
}

impl CryptoError {
    /// `true` when the platform RNG could not be read.
    ///
    /// Transports should surface this as "service unavailable".
    pub fn is_unavailable(&self) -> bool {
        matches!(self, CryptoError::RandomUnavailable(_))
    }
}

/// Source of cryptographically secure random bytes.
pub trait SecureRandom: Send + Sync {
    /// Fill `dest` entirely or fail.
    fn fill(&self, dest: &mut [u8]) -> Result<(), CryptoError>;
}

/// The operating system's CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRandom;

impl SecureRandom for OsRandom {
    fn fill(&self, dest: &mut [u8]) -> Result<(), CryptoError> {
        OsRng
            .try_fill_bytes(dest)
            .map_err(|e| CryptoError::RandomUnavailable(e.to_string()))
    }
}

/// Draw `len` random bytes.
pub fn random_bytes<R: SecureRandom + ?Sized>(rng: &R, len: usize) -> Result<Vec<u8>, CryptoError> {
    let mut buf = vec![0u8; len];
    rng.fill(&mut buf)?;
    Ok(buf)
}

/// URL-safe base64 string of exactly `len` characters.
///
/// Draws `len` random bytes, encodes them without padding and keeps the
/// first `len` characters of the encoding.
pub fn random_url_safe_string<R: SecureRandom + ?Sized>(
    rng: &R,
    len: usize,
) -> Result<String, CryptoError> {
    let bytes = random_bytes(rng, len)?;
    let mut encoded = URL_SAFE_NO_PAD.encode(bytes);
    encoded.truncate(len);
    Ok(encoded)
}


#[cfg(test)]
mod tests {
    use super::testing::FlakyRandom;
    use super::*;

    #[test]
    fn url_safe_string_has_requested_length_and_alphabet() {
        for len in [1, 16, 32, 43, 64] {
            let s = random_url_safe_string(&OsRandom, len).unwrap();
            assert_eq!(s.len(), len);
            assert!(s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        }
    }

    #[test]
    fn successive_strings_differ() {
        let a = random_url_safe_string(&OsRandom, 32).unwrap();
        let b = random_url_safe_string(&OsRandom, 32).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn draws_exactly_one_fill_per_string() {
        let rng = FlakyRandom::failing_after(usize::MAX);
        random_url_safe_string(&rng, 32).unwrap();
        assert_eq!(rng.draws(), 1);
    }

    #[test]
    fn rng_failure_is_surfaced_not_degraded() {
        let rng = FlakyRandom::failing_after(0);
        let err = random_url_safe_string(&rng, 32).unwrap_err();
        assert!(err.is_unavailable());
    }
}
