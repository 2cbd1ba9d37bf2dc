//! Browser and device sessions.

use std::net::IpAddr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use warden_core::{DomainError, DomainResult, Entity, SessionId, UserId};

use crate::audit::{AuditEvent, AuditSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Expired,
    Revoked,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Expired => "expired",
            SessionStatus::Revoked => "revoked",
        }
    }
}

impl core::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Login session. `Expired` and `Revoked` are terminal states.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub refresh_token: String,
    pub user_agent: String,
    pub client_ip: IpAddr,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl core::fmt::Debug for Session {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("refresh_token", &"<redacted>")
            .field("user_agent", &self.user_agent)
            .field("client_ip", &self.client_ip)
            .field("status", &self.status)
            .field("created_at", &self.created_at)
            .field("last_used_at", &self.last_used_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl Session {
    pub fn new(
        user_id: UserId,
        refresh_token: impl Into<String>,
        user_agent: impl Into<String>,
        client_ip: IpAddr,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SessionId::new(),
            user_id,
            refresh_token: refresh_token.into(),
            user_agent: user_agent.into(),
            client_ip,
            status: SessionStatus::Active,
            created_at: now,
            last_used_at: now,
            expires_at: now + ttl,
        }
    }

    /// Valid only while `now < expires_at`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::Active && !self.is_expired(now)
    }

    /// Slide the inactivity window. No-op outside `Active`.
    pub fn touch(&mut self, now: DateTime<Utc>) -> bool {
        if self.status != SessionStatus::Active {
            return false;
        }
        self.last_used_at = now;
        true
    }

    pub fn revoke(&mut self) -> bool {
        self.transition(SessionStatus::Revoked)
    }

    pub fn expire(&mut self) -> bool {
        self.transition(SessionStatus::Expired)
    }

    /// Revoke the session and report a `logout` event carrying its origin.
    ///
    /// Nothing is reported for a session that was no longer active.
    pub fn logout<A>(&mut self, audit: &A, now: DateTime<Utc>) -> bool
    where
        A: AuditSink + ?Sized,
    {
        if !self.revoke() {
            return false;
        }
        audit.record(
            &AuditEvent::logout(self.user_id, now)
                .with_origin(self.client_ip, self.user_agent.clone())
                .with_metadata("session_id", self.id.to_string()),
        );
        true
    }

    fn transition(&mut self, to: SessionStatus) -> bool {
        if self.status != SessionStatus::Active {
            return false;
        }
        self.status = to;
        true
    }
}

impl Entity for Session {
    type Id = SessionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn validate(&self) -> DomainResult<()> {
        if self.refresh_token.is_empty() {
            return Err(DomainError::validation("session refresh token reference is required"));
        }
        if self.expires_at <= self.created_at {
            return Err(DomainError::invariant("session expires_at must be after created_at"));
        }
        if self.last_used_at < self.created_at {
            return Err(DomainError::invariant("session last_used_at precedes created_at"));
        }
        Ok(())
    }
}
