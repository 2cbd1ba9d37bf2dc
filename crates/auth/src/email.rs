//! Email address value object.

use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::ValidateEmail;

use warden_core::ValueObject;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EmailError {
    #[error("email address cannot be empty")]
    Empty,

    #[error("invalid email format: '{0}'")]
    Invalid(String),
}

/// A syntactically valid, trimmed email address.
///
/// Deserialization re-validates, so a malformed address can never enter the
/// domain through a persisted record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl ValueObject for Email {}

impl Email {
    pub fn parse(address: impl AsRef<str>) -> Result<Self, EmailError> {
        let address = address.as_ref().trim().to_string();
        if address.is_empty() {
            return Err(EmailError::Empty);
        }
        if !address.validate_email() {
            return Err(EmailError::Invalid(address));
        }
        Ok(Self(address))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Addresses compare case-insensitively for identity purposes.
    pub fn matches(&self, other: &Email) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl core::fmt::Display for Email {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Email {
    type Err = EmailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Email {
    type Error = EmailError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Email> for String {
    fn from(value: Email) -> Self {
        value.0
    }
}
