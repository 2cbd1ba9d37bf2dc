//! Proof Key for Code Exchange (RFC 7636).

use core::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use warden_core::DomainError;

pub const MIN_CHALLENGE_LEN: usize = 43;
pub const MAX_CHALLENGE_LEN: usize = 128;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CodeChallengeMethod {
    #[default]
    #[serde(rename = "plain")]
    Plain,
    #[serde(rename = "S256")]
    S256,
}

impl CodeChallengeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeChallengeMethod::Plain => "plain",
            CodeChallengeMethod::S256 => "S256",
        }
    }
}

impl core::fmt::Display for CodeChallengeMethod {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodeChallengeMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(CodeChallengeMethod::Plain),
            "S256" => Ok(CodeChallengeMethod::S256),
            other => Err(DomainError::validation(format!(
                "unsupported code challenge method '{other}'"
            ))),
        }
    }
}

/// `BASE64URL-NOPAD(SHA256(verifier))`.
pub fn s256_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Recompute the challenge from `verifier` and compare in constant time.
pub fn verify_challenge(challenge: &str, method: CodeChallengeMethod, verifier: &str) -> bool {
    let computed = match method {
        CodeChallengeMethod::Plain => verifier.to_string(),
        CodeChallengeMethod::S256 => s256_challenge(verifier),
    };
    bool::from(computed.as_bytes().ct_eq(challenge.as_bytes()))
}

/// Challenges and verifiers share the same shape: 43..=128 unreserved characters.
pub fn is_well_formed(value: &str) -> bool {
    (MIN_CHALLENGE_LEN..=MAX_CHALLENGE_LEN).contains(&value.len())
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~'))
}
