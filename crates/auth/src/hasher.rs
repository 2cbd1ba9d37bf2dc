//! Argon2id password hashing with a self-describing encoded format.
//!
//! Encoded hashes look like
//! `$argon2id$v=19$m=65536,t=3,p=2$<salt>$<hash>` with unpadded base64
//! fields. Verification always recomputes with the cost parameters stored in
//! the encoded string, so hashes produced under older configurations stay
//! verifiable after the configuration changes.
//!
//! Derivation is deliberately expensive. Callers serving concurrent requests
//! should run `hash`/`verify` on a bounded worker pool.

use core::fmt;
use core::str::FromStr;

use argon2::{Algorithm, Argon2, Params, Version};
use base64::{
    Engine as _,
    engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD},
};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::random::{CryptoError, OsRandom, SecureRandom, random_bytes};

/// Algorithm tag written into every encoded hash.
pub const ALGORITHM: &str = "argon2id";

/// Argon2 version number written by [`Argon2Hasher::hash`] (0x13).
pub const ARGON2_VERSION: u32 = 0x13;

/// Largest memory cost accepted from a stored hash (1 GiB).
///
/// Stored hashes are untrusted input; tampered cost fields must not be able
/// to force an arbitrarily large allocation or runtime during verification.
pub const MAX_MEMORY_KIB: u32 = 1024 * 1024;

/// Largest pass count accepted from a stored hash.
pub const MAX_ITERATIONS: u32 = 32;

/// Largest lane count accepted from a stored hash.
pub const MAX_PARALLELISM: u32 = 16;

/// Cost parameters and sizes used when producing new hashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HasherConfig {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Number of passes.
    pub iterations: u32,
    /// Degree of parallelism (lanes).
    pub parallelism: u32,
    /// Salt length in bytes.
    pub salt_length: usize,
    /// Derived key length in bytes.
    pub key_length: usize,
}

impl Default for HasherConfig {
    fn default() -> Self {
        Self {
            memory_kib: 64 * 1024,
            iterations: 3,
            parallelism: 2,
            salt_length: 16,
            key_length: 32,
        }
    }
}

impl HasherConfig {
    pub fn with_memory_kib(mut self, memory_kib: u32) -> Self {
        self.memory_kib = memory_kib;
        self
    }

    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_parallelism(mut self, parallelism: u32) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn with_salt_length(mut self, salt_length: usize) -> Self {
        self.salt_length = salt_length;
        self
    }

    pub fn with_key_length(mut self, key_length: usize) -> Self {
        self.key_length = key_length;
        self
    }
}

/// Why an encoded hash string could not be understood.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HashFormatError {
    #[error("expected 6 '$'-delimited fields, found {0}")]
    FieldCount(usize),

    #[error("encoded hash must start with '$'")]
    MissingLeadingDelimiter,

    #[error("unsupported algorithm '{0}'")]
    Algorithm(String),

    #[error("malformed version field '{0}'")]
    Version(String),

    #[error("malformed parameter field '{0}'")]
    Params(String),

    #[error("salt is not valid unpadded base64")]
    Salt,

    #[error("hash is not valid unpadded base64")]
    Hash,

    #[error("parameters rejected by argon2: {0}")]
    Argon2(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HashError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("malformed password hash: {0}")]
    Format(#[from] HashFormatError),
}

/// Hashing capability injected into value objects and services.
pub trait PasswordHasher: Send + Sync {
    /// Hash `plaintext` into the encoded format.
    fn hash(&self, plaintext: &str) -> Result<String, HashError>;

    /// Check `plaintext` against an encoded hash.
    ///
    /// A mismatch is `Ok(false)`; only an unreadable `encoded_hash` is an error.
    fn verify(&self, plaintext: &str, encoded_hash: &str) -> Result<bool, HashError>;
}

/// Decoded form of `$argon2id$v=..$m=..,t=..,p=..$salt$hash`.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedHash {
    pub version: u32,
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
    pub salt: Vec<u8>,
    pub hash: Vec<u8>,
}

impl fmt::Debug for EncodedHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedHash")
            .field("version", &self.version)
            .field("memory_kib", &self.memory_kib)
            .field("iterations", &self.iterations)
            .field("parallelism", &self.parallelism)
            .field("salt_len", &self.salt.len())
            .field("hash_len", &self.hash.len())
            .finish()
    }
}

impl EncodedHash {
    /// Parse by splitting on `$` into exactly six fields.
    pub fn parse(encoded: &str) -> Result<Self, HashFormatError> {
        let fields: Vec<&str> = encoded.split('$').collect();
        if fields.len() != 6 {
            return Err(HashFormatError::FieldCount(fields.len()));
        }
        if !fields[0].is_empty() {
            return Err(HashFormatError::MissingLeadingDelimiter);
        }
        if fields[1] != ALGORITHM {
            return Err(HashFormatError::Algorithm(fields[1].to_string()));
        }

        let version = fields[2]
            .strip_prefix("v=")
            .and_then(|v| v.parse::<u32>().ok())
            .ok_or_else(|| HashFormatError::Version(fields[2].to_string()))?;

        let (memory_kib, iterations, parallelism) = parse_params(fields[3])?;

        let salt = decode_b64(fields[4]).ok_or(HashFormatError::Salt)?;
        let hash = decode_b64(fields[5]).ok_or(HashFormatError::Hash)?;

        Ok(Self {
            version,
            memory_kib,
            iterations,
            parallelism,
            salt,
            hash,
        })
    }
}

impl fmt::Display for EncodedHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "${}$v={}$m={},t={},p={}${}${}",
            ALGORITHM,
            self.version,
            self.memory_kib,
            self.iterations,
            self.parallelism,
            STANDARD_NO_PAD.encode(&self.salt),
            STANDARD_NO_PAD.encode(&self.hash),
        )
    }
}

impl FromStr for EncodedHash {
    type Err = HashFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn parse_params(field: &str) -> Result<(u32, u32, u32), HashFormatError> {
    let malformed = || HashFormatError::Params(field.to_string());
    let mut parts = field.split(',');

    let mut next = |key: &str| -> Result<u32, HashFormatError> {
        parts
            .next()
            .and_then(|part| part.strip_prefix(key))
            .and_then(|part| part.strip_prefix('='))
            .and_then(|value| value.parse::<u32>().ok())
            .ok_or_else(malformed)
    };

    let memory = next("m")?;
    let iterations = next("t")?;
    let parallelism = next("p")?;

    if parts.next().is_some()
        || memory > MAX_MEMORY_KIB
        || iterations > MAX_ITERATIONS
        || parallelism > MAX_PARALLELISM
    {
        return Err(malformed());
    }
    Ok((memory, iterations, parallelism))
}

// Writes use the standard alphabet; reads also accept the URL-safe one.
fn decode_b64(field: &str) -> Option<Vec<u8>> {
    if field.is_empty() {
        return None;
    }
    STANDARD_NO_PAD
        .decode(field)
        .or_else(|_| URL_SAFE_NO_PAD.decode(field))
        .ok()
}

fn derive_key(
    plaintext: &[u8],
    salt: &[u8],
    version: u32,
    memory_kib: u32,
    iterations: u32,
    parallelism: u32,
    key_length: usize,
) -> Result<Vec<u8>, argon2::Error> {
    let version = Version::try_from(version)?;
    let params = Params::new(memory_kib, iterations, parallelism, Some(key_length))?;
    let mut out = vec![0u8; key_length];
    Argon2::new(Algorithm::Argon2id, version, params).hash_password_into(plaintext, salt, &mut out)?;
    Ok(out)
}

/// Argon2id implementation of [`PasswordHasher`].
#[derive(Debug, Clone)]
pub struct Argon2Hasher<R = OsRandom> {
    config: HasherConfig,
    rng: R,
}

impl Argon2Hasher {
    pub fn new(config: HasherConfig) -> Self {
        Self {
            config,
            rng: OsRandom,
        }
    }
}

impl Default for Argon2Hasher {
    fn default() -> Self {
        Self::new(HasherConfig::default())
    }
}

impl<R: SecureRandom> Argon2Hasher<R> {
    /// Use a specific random source for salts.
    pub fn with_random(config: HasherConfig, rng: R) -> Self {
        Self { config, rng }
    }

    pub fn config(&self) -> &HasherConfig {
        &self.config
    }
}

impl<R: SecureRandom> PasswordHasher for Argon2Hasher<R> {
    fn hash(&self, plaintext: &str) -> Result<String, HashError> {
        let cfg = &self.config;
        debug!(
            memory_kib = cfg.memory_kib,
            iterations = cfg.iterations,
            parallelism = cfg.parallelism,
            "hashing password"
        );

        let salt = random_bytes(&self.rng, cfg.salt_length).inspect_err(|e| {
            error!(error = %e, "failed to generate salt");
        })?;

        let hash = derive_key(
            plaintext.as_bytes(),
            &salt,
            ARGON2_VERSION,
            cfg.memory_kib,
            cfg.iterations,
            cfg.parallelism,
            cfg.key_length,
        )
        .map_err(|e| {
            error!(error = %e, "argon2 derivation failed");
            CryptoError::KeyDerivation(e.to_string())
        })?;

        let encoded = EncodedHash {
            version: ARGON2_VERSION,
            memory_kib: cfg.memory_kib,
            iterations: cfg.iterations,
            parallelism: cfg.parallelism,
            salt,
            hash,
        };
        Ok(encoded.to_string())
    }

    fn verify(&self, plaintext: &str, encoded_hash: &str) -> Result<bool, HashError> {
        let stored = EncodedHash::parse(encoded_hash).inspect_err(|e| {
            warn!(error = %e, "rejecting malformed password hash");
        })?;
        debug!(
            version = stored.version,
            memory_kib = stored.memory_kib,
            iterations = stored.iterations,
            parallelism = stored.parallelism,
            "verifying password"
        );

        let computed = derive_key(
            plaintext.as_bytes(),
            &stored.salt,
            stored.version,
            stored.memory_kib,
            stored.iterations,
            stored.parallelism,
            stored.hash.len(),
        )
        .map_err(|e| HashFormatError::Argon2(e.to_string()))?;

        let matched: bool = computed.as_slice().ct_eq(stored.hash.as_slice()).into();
        debug!(matched, "password verification completed");
        Ok(matched)
    }
}

#[cfg(test)]
pub(crate) fn fast_config() -> HasherConfig {
    HasherConfig::default()
        .with_memory_kib(1024)
        .with_iterations(1)
        .with_parallelism(1)
}
