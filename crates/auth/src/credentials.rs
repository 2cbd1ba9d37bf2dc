//! Credentials value object: an email identity plus a hashed password.
//!
//! Plaintext passwords only ever pass through constructors and `verify`
//! calls; nothing here stores them. Hashing is a capability handed in by the
//! caller ([`PasswordHasher`]), never constructed internally.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use warden_core::ValueObject;

use crate::email::{Email, EmailError};
use crate::hasher::{HashError, PasswordHasher};
use crate::policy::{PasswordPolicy, PolicyError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialsError {
    #[error("invalid email: {0}")]
    Email(#[from] EmailError),

    #[error("invalid password: {0}")]
    Policy(#[from] PolicyError),

    #[error("failed to hash password: {0}")]
    Hash(#[from] HashError),
}

/// Hashed password plus the policy it was validated against.
#[derive(Clone, PartialEq, Eq)]
pub struct Password {
    hash: String,
    policy: PasswordPolicy,
}

impl ValueObject for Password {}

impl core::fmt::Debug for Password {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Password").field("hash", &"<redacted>").finish()
    }
}

impl Password {
    /// Validate `plaintext` against `policy`, then hash it.
    pub fn new<H>(plaintext: &str, policy: PasswordPolicy, hasher: &H) -> Result<Self, CredentialsError>
    where
        H: PasswordHasher + ?Sized,
    {
        policy.validate(plaintext)?;
        let hash = hasher.hash(plaintext)?;
        Ok(Self { hash, policy })
    }

    /// Rebuild from a persisted hash; the default policy is attached.
    pub fn from_hash(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            policy: PasswordPolicy::default(),
        }
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn policy(&self) -> &PasswordPolicy {
        &self.policy
    }

    /// Verification that surfaces a malformed stored hash to the caller.
    pub fn try_verify<H>(&self, candidate: &str, hasher: &H) -> Result<bool, HashError>
    where
        H: PasswordHasher + ?Sized,
    {
        hasher.verify(candidate, &self.hash)
    }

    /// `false` on mismatch and on an unreadable stored hash.
    pub fn verify<H>(&self, candidate: &str, hasher: &H) -> bool
    where
        H: PasswordHasher + ?Sized,
    {
        match self.try_verify(candidate, hasher) {
            Ok(matched) => matched,
            Err(e) => {
                warn!(error = %e, "stored password hash unreadable; treating as mismatch");
                false
            }
        }
    }
}

/// Email + hashed password.
///
/// Serializes as `{"email": .., "password_hash": ..}` only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "CredentialsRecord", try_from = "CredentialsRecord")]
pub struct Credentials {
    email: Email,
    password: Password,
}

impl ValueObject for Credentials {}

#[derive(Serialize, Deserialize)]
struct CredentialsRecord {
    email: String,
    password_hash: String,
}

impl From<Credentials> for CredentialsRecord {
    fn from(value: Credentials) -> Self {
        Self {
            email: value.email.into(),
            password_hash: value.password.hash,
        }
    }
}

impl TryFrom<CredentialsRecord> for Credentials {
    type Error = EmailError;

    fn try_from(value: CredentialsRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            email: Email::parse(value.email)?,
            password: Password::from_hash(value.password_hash),
        })
    }
}

impl Credentials {
    /// Build credentials under the default password policy.
    pub fn new<H>(email: &str, plaintext: &str, hasher: &H) -> Result<Self, CredentialsError>
    where
        H: PasswordHasher + ?Sized,
    {
        Self::with_policy(email, plaintext, PasswordPolicy::default(), hasher)
    }

    pub fn with_policy<H>(
        email: &str,
        plaintext: &str,
        policy: PasswordPolicy,
        hasher: &H,
    ) -> Result<Self, CredentialsError>
    where
        H: PasswordHasher + ?Sized,
    {
        let email = Email::parse(email).inspect_err(|e| {
            debug!(error = %e, "credentials rejected: email");
        })?;
        let password = Password::new(plaintext, policy, hasher).inspect_err(|e| {
            debug!(email = %email, error = %e, "credentials rejected: password");
        })?;
        debug!(email = %email, "credentials created");
        Ok(Self { email, password })
    }

    pub fn from_parts(email: Email, password: Password) -> Self {
        Self { email, password }
    }

    pub fn email(&self) -> &Email {
        &self.email
    }

    pub fn password(&self) -> &Password {
        &self.password
    }

    pub fn verify<H>(&self, candidate: &str, hasher: &H) -> bool
    where
        H: PasswordHasher + ?Sized,
    {
        let matched = self.password.verify(candidate, hasher);
        debug!(email = %self.email, matched, "credentials verified");
        matched
    }

    pub fn try_verify<H>(&self, candidate: &str, hasher: &H) -> Result<bool, HashError>
    where
        H: PasswordHasher + ?Sized,
    {
        self.password.try_verify(candidate, hasher)
    }
}
