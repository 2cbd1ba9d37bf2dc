//! Access and refresh tokens.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use warden_core::{ClientId, DomainError, DomainResult, Entity, TokenId, UserId};

use crate::audit::{AuditEvent, AuditSink};
use crate::scope::{first_missing, validate_scopes};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenType {
    #[serde(rename = "access_token")]
    Access,
    #[serde(rename = "refresh_token")]
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access_token",
            TokenType::Refresh => "refresh_token",
        }
    }
}

impl core::fmt::Display for TokenType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque bearer token bound to a user, a client and a scope set.
///
/// Revocation is terminal: once `is_revoked` is set it is never cleared, and
/// the first revocation timestamp is kept.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub id: TokenId,
    pub user_id: UserId,
    pub client_id: ClientId,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub value: String,
    pub scopes: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_revoked: bool,
}

impl core::fmt::Debug for Token {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Token")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("client_id", &self.client_id)
            .field("token_type", &self.token_type)
            .field("value", &"<redacted>")
            .field("scopes", &self.scopes)
            .field("expires_at", &self.expires_at)
            .field("created_at", &self.created_at)
            .field("revoked_at", &self.revoked_at)
            .field("is_revoked", &self.is_revoked)
            .finish()
    }
}

impl Token {
    /// Build a fresh token valid for `ttl` from `now`.
    pub fn issue(
        token_type: TokenType,
        value: String,
        user_id: UserId,
        client_id: ClientId,
        scopes: Vec<String>,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TokenId::new(),
            user_id,
            client_id,
            token_type,
            value,
            scopes,
            expires_at: now + ttl,
            created_at: now,
            revoked_at: None,
            is_revoked: false,
        }
    }

    /// Expired strictly after `expires_at`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked && !self.is_expired(now)
    }

    /// Returns `false` if the token was already revoked.
    pub fn revoke(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_revoked {
            return false;
        }
        self.is_revoked = true;
        self.revoked_at = Some(now);
        true
    }

    /// [`revoke`](Self::revoke) that reports a `token_revoked` event the
    /// first time only.
    pub fn revoke_audited<A>(&mut self, audit: &A, now: DateTime<Utc>) -> bool
    where
        A: AuditSink + ?Sized,
    {
        if !self.revoke(now) {
            return false;
        }
        audit.record(
            &AuditEvent::token_revoked(self.user_id, self.client_id, now)
                .with_metadata("token_id", self.id.to_string())
                .with_metadata("token_type", self.token_type.as_str()),
        );
        true
    }

    pub fn has_scopes<S: AsRef<str>>(&self, required: &[S]) -> bool {
        first_missing(&self.scopes, required).is_none()
    }
}

impl Entity for Token {
    type Id = TokenId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn validate(&self) -> DomainResult<()> {
        if self.value.is_empty() {
            return Err(DomainError::validation("token value cannot be empty"));
        }
        if self.expires_at <= self.created_at {
            return Err(DomainError::invariant("token expires_at must be after created_at"));
        }
        if self.is_revoked != self.revoked_at.is_some() {
            return Err(DomainError::invariant(
                "token revoked_at must be set exactly when is_revoked",
            ));
        }
        validate_scopes(&self.scopes)
    }
}
