//! Single-use authorization codes.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use validator::ValidateUrl;

use warden_core::{AuthCodeId, ClientId, DomainError, DomainResult, Entity, UserId};

use crate::pkce::{self, CodeChallengeMethod};
use crate::scope::validate_scopes;

/// Lifetime of every authorization code, in minutes.
pub const AUTH_CODE_TTL_MINUTES: i64 = 10;

pub fn auth_code_ttl() -> Duration {
    Duration::minutes(AUTH_CODE_TTL_MINUTES)
}

/// Authorization code issued on an authorization request and redeemed once
/// at the token endpoint.
///
/// `used` is only a snapshot. The store holding codes must flip it with an
/// atomic compare-and-set so two redemptions cannot both succeed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthCode {
    pub id: AuthCodeId,
    pub code: String,
    pub user_id: UserId,
    pub client_id: ClientId,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge_method: Option<CodeChallengeMethod>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub used: bool,
}

impl core::fmt::Debug for AuthCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AuthCode")
            .field("id", &self.id)
            .field("code", &"<redacted>")
            .field("user_id", &self.user_id)
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("code_challenge_method", &self.code_challenge_method)
            .field("expires_at", &self.expires_at)
            .field("used", &self.used)
            .finish_non_exhaustive()
    }
}

impl AuthCode {
    #[allow(clippy::too_many_arguments)]
    pub fn issue(
        code: String,
        user_id: UserId,
        client_id: ClientId,
        redirect_uri: impl Into<String>,
        scopes: Vec<String>,
        code_challenge: Option<String>,
        code_challenge_method: Option<CodeChallengeMethod>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AuthCodeId::new(),
            code,
            user_id,
            client_id,
            redirect_uri: redirect_uri.into(),
            scopes,
            code_challenge,
            code_challenge_method,
            expires_at: now + auth_code_ttl(),
            created_at: now,
            used: false,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.used && !self.is_expired(now)
    }

    /// Returns `false` if the code had already been used.
    pub fn mark_used(&mut self) -> bool {
        !core::mem::replace(&mut self.used, true)
    }

    /// Method in effect for the stored challenge; `plain` when unspecified.
    pub fn challenge_method(&self) -> CodeChallengeMethod {
        self.code_challenge_method.unwrap_or_default()
    }
}

impl Entity for AuthCode {
    type Id = AuthCodeId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn validate(&self) -> DomainResult<()> {
        if self.code.is_empty() {
            return Err(DomainError::validation("authorization code cannot be empty"));
        }
        if !self.redirect_uri.validate_url() {
            return Err(DomainError::validation(format!(
                "invalid redirect URI '{}'",
                self.redirect_uri
            )));
        }
        if self.expires_at <= self.created_at {
            return Err(DomainError::invariant(
                "authorization code expires_at must be after created_at",
            ));
        }
        match (&self.code_challenge, self.code_challenge_method) {
            (Some(challenge), _) if !pkce::is_well_formed(challenge) => {
                return Err(DomainError::validation(format!(
                    "code challenge must be {}-{} unreserved characters",
                    pkce::MIN_CHALLENGE_LEN,
                    pkce::MAX_CHALLENGE_LEN
                )));
            }
            (None, Some(_)) => {
                return Err(DomainError::invariant(
                    "code challenge method set without a challenge",
                ));
            }
            _ => {}
        }
        validate_scopes(&self.scopes)
    }
}
