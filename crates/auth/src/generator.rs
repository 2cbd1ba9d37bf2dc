//! Random token, authorization-code and client-secret issuance.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error};

use warden_core::{ClientId, UserId};

use crate::audit::{AuditEvent, AuditSink, NoopAuditSink};
use crate::auth_code::AuthCode;
use crate::pkce::CodeChallengeMethod;
use crate::random::{CryptoError, OsRandom, SecureRandom, random_url_safe_string};
use crate::scope::to_owned_scopes;
use crate::token::{Token, TokenType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenConfig {
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    /// Length in characters of every generated value.
    pub token_length: usize,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_token_ttl: Duration::hours(1),
            refresh_token_ttl: Duration::days(7),
            token_length: 32,
        }
    }
}

impl TokenConfig {
    pub fn with_access_token_ttl(mut self, ttl: Duration) -> Self {
        self.access_token_ttl = ttl;
        self
    }

    pub fn with_refresh_token_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_token_ttl = ttl;
        self
    }

    pub fn with_token_length(mut self, len: usize) -> Self {
        self.token_length = len;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access: Token,
    pub refresh: Token,
}

/// Issues opaque values drawn from a [`SecureRandom`] source.
///
/// Stateless beyond its configuration; share it freely across threads.
pub struct TokenGenerator<R = OsRandom> {
    config: TokenConfig,
    rng: R,
    audit: Arc<dyn AuditSink>,
}

impl<R> core::fmt::Debug for TokenGenerator<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenGenerator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TokenGenerator<OsRandom> {
    pub fn new(config: TokenConfig) -> Self {
        Self::with_random(config, OsRandom)
    }
}

impl Default for TokenGenerator<OsRandom> {
    fn default() -> Self {
        Self::new(TokenConfig::default())
    }
}

impl<R: SecureRandom> TokenGenerator<R> {
    pub fn with_random(config: TokenConfig, rng: R) -> Self {
        Self {
            config,
            rng,
            audit: Arc::new(NoopAuditSink),
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Access and refresh token from two independent draws.
    ///
    /// Both values are drawn before either token is built, so a failing
    /// random source yields an error and no tokens at all.
    pub fn generate_token_pair<S: AsRef<str>>(
        &self,
        user_id: UserId,
        client_id: ClientId,
        scopes: &[S],
        now: DateTime<Utc>,
    ) -> Result<TokenPair, CryptoError> {
        let scopes = to_owned_scopes(scopes);
        debug!(%user_id, %client_id, ?scopes, "generating token pair");

        let (access_value, refresh_value) = self
            .draw()
            .and_then(|access| Ok((access, self.draw()?)))
            .inspect_err(|e| {
                error!(%user_id, %client_id, error = %e, "token pair generation failed");
            })?;

        let access = Token::issue(
            TokenType::Access,
            access_value,
            user_id,
            client_id,
            scopes.clone(),
            self.config.access_token_ttl,
            now,
        );
        let refresh = Token::issue(
            TokenType::Refresh,
            refresh_value,
            user_id,
            client_id,
            scopes,
            self.config.refresh_token_ttl,
            now,
        );

        debug!(
            access_token_id = %access.id,
            refresh_token_id = %refresh.id,
            "token pair generated"
        );
        self.audit.record(
            &AuditEvent::token_issued(user_id, client_id, now)
                .with_metadata("access_token_id", access.id.to_string())
                .with_metadata("refresh_token_id", refresh.id.to_string()),
        );

        Ok(TokenPair { access, refresh })
    }

    /// Fresh, unused authorization code valid for ten minutes.
    #[allow(clippy::too_many_arguments)]
    pub fn generate_auth_code<S: AsRef<str>>(
        &self,
        user_id: UserId,
        client_id: ClientId,
        redirect_uri: &str,
        scopes: &[S],
        code_challenge: Option<&str>,
        code_challenge_method: Option<CodeChallengeMethod>,
        now: DateTime<Utc>,
    ) -> Result<AuthCode, CryptoError> {
        debug!(
            %user_id,
            %client_id,
            redirect_uri,
            method = ?code_challenge_method,
            "generating authorization code"
        );

        let code = self.draw().inspect_err(|e| {
            error!(%user_id, %client_id, error = %e, "authorization code generation failed");
        })?;

        let auth_code = AuthCode::issue(
            code,
            user_id,
            client_id,
            redirect_uri,
            to_owned_scopes(scopes),
            code_challenge.map(str::to_string),
            code_challenge_method,
            now,
        );
        debug!(code_id = %auth_code.id, expires_at = %auth_code.expires_at, "authorization code generated");
        Ok(auth_code)
    }

    pub fn generate_client_secret(&self) -> Result<String, CryptoError> {
        self.draw().inspect_err(|e| {
            error!(error = %e, "client secret generation failed");
        })
    }

    fn draw(&self) -> Result<String, CryptoError> {
        random_url_safe_string(&self.rng, self.config.token_length)
    }
}
