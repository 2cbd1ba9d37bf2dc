//! Password policy: pure rule checks over a candidate plaintext.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Password policy configuration.
///
/// Lengths are measured in bytes of the UTF-8 encoding; the default maximum
/// of 72 keeps passwords within what every common hash backend accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub max_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_digit: bool,
    pub require_special: bool,
    pub min_special_chars: usize,
    pub disallowed_chars: Vec<char>,
    /// Matched case-insensitively.
    pub disallowed_substrings: Vec<String>,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            max_length: 72,
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
            require_special: true,
            min_special_chars: 1,
            disallowed_chars: vec![' '],
            disallowed_substrings: vec!["password".into(), "123456".into(), "qwerty".into()],
        }
    }
}

/// A single broken policy rule.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("password must be at least {min} characters long")]
    TooShort { min: usize },

    #[error("password must not exceed {max} characters")]
    TooLong { max: usize },

    #[error("password contains disallowed character {0:?}")]
    DisallowedChar(char),

    #[error("password must contain at least one uppercase letter")]
    MissingUppercase,

    #[error("password must contain at least one lowercase letter")]
    MissingLowercase,

    #[error("password must contain at least one digit")]
    MissingDigit,

    #[error("password must contain at least {required} special characters")]
    MissingSpecial { required: usize },

    #[error("password contains disallowed sequence '{0}'")]
    DisallowedSubstring(String),
}

#[derive(Debug, Default)]
struct CharClasses {
    upper: bool,
    lower: bool,
    digit: bool,
    special: usize,
    disallowed: Option<char>,
}

fn is_special(c: char) -> bool {
    c.is_ascii_punctuation() || (!c.is_ascii() && !c.is_alphanumeric() && !c.is_whitespace() && !c.is_control())
}

impl PasswordPolicy {
    pub fn with_length(mut self, min: usize, max: usize) -> Self {
        self.min_length = min;
        self.max_length = max;
        self
    }

    pub fn with_disallowed_chars(mut self, chars: impl IntoIterator<Item = char>) -> Self {
        self.disallowed_chars = chars.into_iter().collect();
        self
    }

    pub fn with_disallowed_substrings<S: Into<String>>(mut self, subs: impl IntoIterator<Item = S>) -> Self {
        self.disallowed_substrings = subs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_min_special_chars(mut self, n: usize) -> Self {
        self.min_special_chars = n;
        self
    }

    /// Check `password`, reporting the first broken rule.
    ///
    /// Length is checked before any character scan.
    pub fn validate(&self, password: &str) -> Result<(), PolicyError> {
        if let Some(err) = self.length_violation(password) {
            debug!(length = password.len(), "password rejected by length rule");
            return Err(err);
        }
        match self.content_violations(password).into_iter().next() {
            Some(err) => {
                debug!(rule = %err, "password rejected by policy");
                Err(err)
            }
            None => Ok(()),
        }
    }

    /// Every rule `password` breaks, length rules first.
    pub fn violations(&self, password: &str) -> Vec<PolicyError> {
        let mut out: Vec<PolicyError> = self.length_violation(password).into_iter().collect();
        out.extend(self.content_violations(password));
        out
    }

    fn length_violation(&self, password: &str) -> Option<PolicyError> {
        if password.len() < self.min_length {
            Some(PolicyError::TooShort { min: self.min_length })
        } else if password.len() > self.max_length {
            Some(PolicyError::TooLong { max: self.max_length })
        } else {
            None
        }
    }

    fn classify(&self, password: &str) -> CharClasses {
        let mut classes = CharClasses::default();
        for c in password.chars() {
            if c.is_uppercase() {
                classes.upper = true;
            } else if c.is_lowercase() {
                classes.lower = true;
            } else if c.is_numeric() {
                classes.digit = true;
            } else if is_special(c) {
                classes.special += 1;
            }
            if classes.disallowed.is_none() && self.disallowed_chars.contains(&c) {
                classes.disallowed = Some(c);
            }
        }
        classes
    }

    fn content_violations(&self, password: &str) -> Vec<PolicyError> {
        let classes = self.classify(password);
        let mut out = Vec::new();

        if let Some(c) = classes.disallowed {
            out.push(PolicyError::DisallowedChar(c));
        }
        if self.require_uppercase && !classes.upper {
            out.push(PolicyError::MissingUppercase);
        }
        if self.require_lowercase && !classes.lower {
            out.push(PolicyError::MissingLowercase);
        }
        if self.require_digit && !classes.digit {
            out.push(PolicyError::MissingDigit);
        }
        if self.require_special && classes.special < self.min_special_chars {
            out.push(PolicyError::MissingSpecial {
                required: self.min_special_chars,
            });
        }

        let lowered = password.to_lowercase();
        out.extend(
            self.disallowed_substrings
                .iter()
                .filter(|s| !s.is_empty() && lowered.contains(&s.to_lowercase()))
                .map(|s| PolicyError::DisallowedSubstring(s.clone())),
        );
        out
    }
}
