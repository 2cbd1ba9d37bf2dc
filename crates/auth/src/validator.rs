//! Stateless validation of token, code, client and session snapshots.
//!
//! Every check works on a snapshot handed in by the caller and never mutates
//! it. Persisting consequences ("mark code used", "revoke token") is up to the
//! caller, which must re-validate right before an atomic compare-and-set in
//! its store.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use warden_core::ClientId;

use crate::auth_code::AuthCode;
use crate::client::{Client, GrantType};
use crate::pkce;
use crate::scope::first_missing;
use crate::session::{Session, SessionStatus};
use crate::token::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Token,
    AuthCode,
    Client,
    Session,
}

impl core::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            EntityKind::Token => "token",
            EntityKind::AuthCode => "authorization code",
            EntityKind::Client => "client",
            EntityKind::Session => "session",
        })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is missing")]
    NilEntity(EntityKind),

    #[error("token has been revoked")]
    Revoked,

    #[error("{0} has expired")]
    Expired(EntityKind),

    #[error("authorization code has already been used")]
    Used,

    #[error("authorization code was issued to a different client")]
    ClientMismatch,

    #[error("redirect URI does not match the authorization request")]
    RedirectMismatch,

    #[error("PKCE code verifier does not match the challenge")]
    PkceMismatch,

    #[error("missing required scope '{0}'")]
    MissingScope(String),

    #[error("client is inactive")]
    InactiveClient,

    #[error("grant type '{0}' is not allowed for this client")]
    GrantTypeNotAllowed(GrantType),

    #[error("session is not active")]
    InactiveSession,

    #[error("session timed out after inactivity")]
    InactivityTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Sliding window measured from `last_used_at`.
    pub inactivity_timeout: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            inactivity_timeout: Duration::minutes(30),
        }
    }
}

impl SessionPolicy {
    pub fn with_inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.inactivity_timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct Validator {
    session_policy: SessionPolicy,
}

impl Validator {
    pub fn new(session_policy: SessionPolicy) -> Self {
        Self { session_policy }
    }

    pub fn session_policy(&self) -> &SessionPolicy {
        &self.session_policy
    }

    pub fn validate_token(
        &self,
        token: Option<&Token>,
        now: DateTime<Utc>,
    ) -> Result<(), ValidationError> {
        let token = token.ok_or(ValidationError::NilEntity(EntityKind::Token))?;
        if token.is_revoked {
            warn!(token_id = %token.id, "revoked token presented");
            return Err(ValidationError::Revoked);
        }
        if token.is_expired(now) {
            debug!(token_id = %token.id, expires_at = %token.expires_at, "expired token presented");
            return Err(ValidationError::Expired(EntityKind::Token));
        }
        Ok(())
    }

    /// Every required scope must be granted; order is irrelevant.
    pub fn validate_scopes<S: AsRef<str>>(
        &self,
        token: Option<&Token>,
        required: &[S],
    ) -> Result<(), ValidationError> {
        let token = token.ok_or(ValidationError::NilEntity(EntityKind::Token))?;
        if let Some(missing) = first_missing(&token.scopes, required) {
            debug!(token_id = %token.id, scope = missing, "required scope not granted");
            return Err(ValidationError::MissingScope(missing.to_string()));
        }
        Ok(())
    }

    /// Checks, in order: used, expiry, client binding, redirect URI
    /// (case-insensitive, Unicode-aware), then PKCE when the code carries a
    /// challenge.
    ///
    /// A code with a challenge and no supplied verifier is a PKCE mismatch.
    /// A verifier supplied for a code without a challenge is ignored.
    pub fn validate_auth_code(
        &self,
        code: Option<&AuthCode>,
        client_id: ClientId,
        redirect_uri: &str,
        code_verifier: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), ValidationError> {
        let code = code.ok_or(ValidationError::NilEntity(EntityKind::AuthCode))?;
        if code.used {
            warn!(code_id = %code.id, client_id = %code.client_id, "authorization code replayed");
            return Err(ValidationError::Used);
        }
        if code.is_expired(now) {
            debug!(code_id = %code.id, expires_at = %code.expires_at, "expired authorization code");
            return Err(ValidationError::Expired(EntityKind::AuthCode));
        }
        if code.client_id != client_id {
            warn!(code_id = %code.id, expected = %code.client_id, presented = %client_id, "client mismatch");
            return Err(ValidationError::ClientMismatch);
        }
        if !redirect_matches(&code.redirect_uri, redirect_uri) {
            warn!(code_id = %code.id, "redirect URI mismatch");
            return Err(ValidationError::RedirectMismatch);
        }
        if let Some(challenge) = code.code_challenge.as_deref() {
            let method = code.challenge_method();
            let verified = code_verifier
                .is_some_and(|verifier| pkce::verify_challenge(challenge, method, verifier));
            if !verified {
                warn!(
                    code_id = %code.id,
                    %method,
                    verifier_supplied = code_verifier.is_some(),
                    "PKCE verification failed"
                );
                return Err(ValidationError::PkceMismatch);
            }
        }
        Ok(())
    }

    pub fn validate_client(
        &self,
        client: Option<&Client>,
        grant_type: GrantType,
    ) -> Result<(), ValidationError> {
        let client = client.ok_or(ValidationError::NilEntity(EntityKind::Client))?;
        if !client.active {
            warn!(client_id = %client.id, "inactive client");
            return Err(ValidationError::InactiveClient);
        }
        if !client.is_grant_type_allowed(grant_type) {
            warn!(client_id = %client.id, %grant_type, "grant type not allowed");
            return Err(ValidationError::GrantTypeNotAllowed(grant_type));
        }
        Ok(())
    }

    pub fn validate_session(
        &self,
        session: Option<&Session>,
        now: DateTime<Utc>,
    ) -> Result<(), ValidationError> {
        let session = session.ok_or(ValidationError::NilEntity(EntityKind::Session))?;
        if session.status != SessionStatus::Active {
            debug!(session_id = %session.id, status = %session.status, "session not active");
            return Err(ValidationError::InactiveSession);
        }
        if session.is_expired(now) {
            debug!(session_id = %session.id, expires_at = %session.expires_at, "session expired");
            return Err(ValidationError::Expired(EntityKind::Session));
        }
        let idle = now - session.last_used_at;
        if idle >= self.session_policy.inactivity_timeout {
            debug!(
                session_id = %session.id,
                idle_secs = idle.num_seconds(),
                "session inactivity timeout"
            );
            return Err(ValidationError::InactivityTimeout);
        }
        Ok(())
    }
}

/// Full-string comparison under Unicode lowercase folding.
fn redirect_matches(stored: &str, presented: &str) -> bool {
    stored == presented || stored.to_lowercase() == presented.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::{TokenConfig, TokenGenerator};
    use crate::pkce::CodeChallengeMethod;
    use crate::token::TokenType;
    use warden_core::UserId;

    const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";
    const REDIRECT: &str = "https://app.example.com/callback";

    fn token(now: DateTime<Utc>) -> Token {
        Token::issue(
            TokenType::Access,
            "value".into(),
            UserId::new(),
            ClientId::new(),
            vec!["read".into(), "write".into()],
            Duration::hours(1),
            now,
        )
    }

    fn code(
        client_id: ClientId,
        challenge: Option<&str>,
        method: Option<CodeChallengeMethod>,
        now: DateTime<Utc>,
    ) -> AuthCode {
        TokenGenerator::new(TokenConfig::default())
            .generate_auth_code(UserId::new(), client_id, REDIRECT, &["read"], challenge, method, now)
            .unwrap()
    }

    fn session(now: DateTime<Utc>) -> Session {
        Session::new(
            UserId::new(),
            "refresh",
            "agent",
            "127.0.0.1".parse().unwrap(),
            Duration::days(1),
            now,
        )
    }

    #[test]
    fn token_lifecycle() {
        let v = Validator::default();
        let now = Utc::now();
        let mut t = token(now);

        assert_eq!(v.validate_token(Some(&t), now), Ok(()));
        assert_eq!(
            v.validate_token(Some(&t), t.expires_at + Duration::nanoseconds(1)),
            Err(ValidationError::Expired(EntityKind::Token))
        );

        t.revoke(now);
        assert_eq!(v.validate_token(Some(&t), now), Err(ValidationError::Revoked));
        assert_eq!(
            v.validate_token(None, now),
            Err(ValidationError::NilEntity(EntityKind::Token))
        );
    }

    #[test]
    fn revoked_wins_over_expired() {
        let v = Validator::default();
        let now = Utc::now();
        let mut t = token(now);
        t.revoke(now);
        assert_eq!(
            v.validate_token(Some(&t), now + Duration::days(1)),
            Err(ValidationError::Revoked)
        );
    }

    #[test]
    fn scope_subset() {
        let v = Validator::default();
        let t = token(Utc::now());
        assert_eq!(v.validate_scopes(Some(&t), &["read"]), Ok(()));
        assert_eq!(
            v.validate_scopes(Some(&t), &["read", "admin"]),
            Err(ValidationError::MissingScope("admin".into()))
        );
        assert_eq!(
            v.validate_scopes::<&str>(None, &[]),
            Err(ValidationError::NilEntity(EntityKind::Token))
        );
    }

    #[test]
    fn auth_code_is_single_use() {
        let v = Validator::default();
        let now = Utc::now();
        let client = ClientId::new();
        let mut c = code(client, None, None, now);

        assert_eq!(v.validate_auth_code(Some(&c), client, REDIRECT, None, now), Ok(()));
        c.mark_used();
        assert_eq!(
            v.validate_auth_code(Some(&c), client, REDIRECT, None, now),
            Err(ValidationError::Used)
        );
    }

    #[test]
    fn auth_code_binding_checks() {
        let v = Validator::default();
        let now = Utc::now();
        let client = ClientId::new();
        let c = code(client, None, None, now);

        assert_eq!(
            v.validate_auth_code(Some(&c), ClientId::new(), REDIRECT, None, now),
            Err(ValidationError::ClientMismatch)
        );
        assert_eq!(
            v.validate_auth_code(Some(&c), client, "https://evil.example.com/callback", None, now),
            Err(ValidationError::RedirectMismatch)
        );
        assert_eq!(
            v.validate_auth_code(Some(&c), client, "HTTPS://APP.EXAMPLE.COM/CALLBACK", None, now),
            Ok(())
        );
        assert_eq!(
            v.validate_auth_code(Some(&c), client, REDIRECT, None, now + Duration::minutes(11)),
            Err(ValidationError::Expired(EntityKind::AuthCode))
        );
        assert_eq!(
            v.validate_auth_code(None, client, REDIRECT, None, now),
            Err(ValidationError::NilEntity(EntityKind::AuthCode))
        );
    }

    #[test]
    fn redirect_comparison_folds_non_ascii_case() {
        let v = Validator::default();
        let now = Utc::now();
        let client = ClientId::new();
        let c = TokenGenerator::new(TokenConfig::default())
            .generate_auth_code(
                UserId::new(),
                client,
                "https://app.example.com/Ä",
                &["read"],
                None,
                None,
                now,
            )
            .unwrap();

        assert_eq!(
            v.validate_auth_code(Some(&c), client, "https://APP.example.com/ä", None, now),
            Ok(())
        );
        assert_eq!(
            v.validate_auth_code(Some(&c), client, "https://app.example.com/a", None, now),
            Err(ValidationError::RedirectMismatch)
        );
    }

    #[test]
    fn pkce_s256() {
        let v = Validator::default();
        let now = Utc::now();
        let client = ClientId::new();
        let c = code(client, Some(CHALLENGE), Some(CodeChallengeMethod::S256), now);

        assert_eq!(
            v.validate_auth_code(Some(&c), client, REDIRECT, Some(VERIFIER), now),
            Ok(())
        );

        let mut altered = VERIFIER.to_string();
        altered.replace_range(0..1, "e");
        assert_eq!(
            v.validate_auth_code(Some(&c), client, REDIRECT, Some(&altered), now),
            Err(ValidationError::PkceMismatch)
        );
        assert_eq!(
            v.validate_auth_code(Some(&c), client, REDIRECT, None, now),
            Err(ValidationError::PkceMismatch)
        );
    }

    #[test]
    fn pkce_plain_and_unspecified_method() {
        let v = Validator::default();
        let now = Utc::now();
        let client = ClientId::new();

        for method in [Some(CodeChallengeMethod::Plain), None] {
            let c = code(client, Some(VERIFIER), method, now);
            assert_eq!(
                v.validate_auth_code(Some(&c), client, REDIRECT, Some(VERIFIER), now),
                Ok(())
            );
            assert_eq!(
                v.validate_auth_code(Some(&c), client, REDIRECT, Some(CHALLENGE), now),
                Err(ValidationError::PkceMismatch)
            );
        }
    }

    #[test]
    fn verifier_without_challenge_is_ignored() {
        let v = Validator::default();
        let now = Utc::now();
        let client = ClientId::new();
        let c = code(client, None, None, now);
        assert_eq!(
            v.validate_auth_code(Some(&c), client, REDIRECT, Some(VERIFIER), now),
            Ok(())
        );
    }

    #[test]
    fn client_checks() {
        let v = Validator::default();
        let now = Utc::now();
        let mut client = Client::new(
            "cli",
            "secret",
            vec![REDIRECT.into()],
            vec![GrantType::AuthorizationCode],
            vec!["read".into()],
            now,
        );

        assert_eq!(v.validate_client(Some(&client), GrantType::AuthorizationCode), Ok(()));
        assert_eq!(
            v.validate_client(Some(&client), GrantType::Password),
            Err(ValidationError::GrantTypeNotAllowed(GrantType::Password))
        );
        client.deactivate(now);
        assert_eq!(
            v.validate_client(Some(&client), GrantType::AuthorizationCode),
            Err(ValidationError::InactiveClient)
        );
        assert_eq!(
            v.validate_client(None, GrantType::AuthorizationCode),
            Err(ValidationError::NilEntity(EntityKind::Client))
        );
    }

    #[test]
    fn session_inactivity() {
        let v = Validator::default();
        let now = Utc::now();
        let mut s = session(now - Duration::hours(1));
        s.last_used_at = now - Duration::minutes(31);
        assert_eq!(v.validate_session(Some(&s), now), Err(ValidationError::InactivityTimeout));

        s.last_used_at = now - Duration::minutes(29);
        assert_eq!(v.validate_session(Some(&s), now), Ok(()));

        s.last_used_at = now - Duration::minutes(30);
        assert_eq!(v.validate_session(Some(&s), now), Err(ValidationError::InactivityTimeout));
    }

    #[test]
    fn session_status_and_expiry() {
        let v = Validator::default();
        let now = Utc::now();

        let mut revoked = session(now);
        revoked.revoke();
        assert_eq!(v.validate_session(Some(&revoked), now), Err(ValidationError::InactiveSession));

        let s = session(now);
        assert_eq!(
            v.validate_session(Some(&s), s.expires_at),
            Err(ValidationError::Expired(EntityKind::Session))
        );
        assert_eq!(
            v.validate_session(None, now),
            Err(ValidationError::NilEntity(EntityKind::Session))
        );
    }

    #[test]
    fn custom_inactivity_window() {
        let v = Validator::new(SessionPolicy::default().with_inactivity_timeout(Duration::minutes(5)));
        let now = Utc::now();
        let mut s = session(now - Duration::minutes(10));
        s.last_used_at = now - Duration::minutes(6);
        assert_eq!(v.validate_session(Some(&s), now), Err(ValidationError::InactivityTimeout));
    }

    #[test]
    fn validation_never_mutates_the_snapshot() {
        let v = Validator::default();
        let now = Utc::now();
        let client = ClientId::new();
        let c = code(client, None, None, now);
        let before = c.clone();
        v.validate_auth_code(Some(&c), client, REDIRECT, None, now).unwrap();
        assert_eq!(c, before);
    }
}
