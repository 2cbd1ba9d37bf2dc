//! Audit events and the port they are reported through.
//!
//! The core only builds events; where they end up (log stream, database,
//! SIEM) is decided by whoever supplies the [`AuditSink`].

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use warden_core::{AuditEventId, ClientId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    Login,
    Logout,
    TokenIssued,
    TokenRevoked,
    PasswordChange,
    RoleChange,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::Login => "login",
            AuditEventType::Logout => "logout",
            AuditEventType::TokenIssued => "token_issued",
            AuditEventType::TokenRevoked => "token_revoked",
            AuditEventType::PasswordChange => "password_change",
            AuditEventType::RoleChange => "role_change",
        }
    }
}

impl core::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Security-relevant occurrence. Never carries secrets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: AuditEventId,
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<ClientId>,
    pub event_type: AuditEventType,
    pub description: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<IpAddr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub success: bool,
}

impl AuditEvent {
    pub fn new(
        user_id: UserId,
        event_type: AuditEventType,
        description: impl Into<String>,
        success: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AuditEventId::new(),
            user_id,
            client_id: None,
            event_type,
            description: description.into(),
            metadata: Map::new(),
            ip_address: None,
            user_agent: None,
            occurred_at: now,
            success,
        }
    }

    pub fn login(user_id: UserId, success: bool, now: DateTime<Utc>) -> Self {
        let description = if success { "login succeeded" } else { "login failed" };
        Self::new(user_id, AuditEventType::Login, description, success, now)
    }

    pub fn logout(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self::new(user_id, AuditEventType::Logout, "logout", true, now)
    }

    pub fn token_issued(user_id: UserId, client_id: ClientId, now: DateTime<Utc>) -> Self {
        Self::new(user_id, AuditEventType::TokenIssued, "token pair issued", true, now)
            .with_client(client_id)
    }

    pub fn token_revoked(user_id: UserId, client_id: ClientId, now: DateTime<Utc>) -> Self {
        Self::new(user_id, AuditEventType::TokenRevoked, "token revoked", true, now)
            .with_client(client_id)
    }

    pub fn password_changed(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self::new(user_id, AuditEventType::PasswordChange, "password changed", true, now)
    }

    pub fn role_changed(user_id: UserId, role: &str, granted: bool, now: DateTime<Utc>) -> Self {
        let verb = if granted { "granted" } else { "revoked" };
        Self::new(user_id, AuditEventType::RoleChange, format!("role '{role}' {verb}"), true, now)
            .with_metadata("role", role)
    }

    pub fn with_client(mut self, client_id: ClientId) -> Self {
        self.client_id = Some(client_id);
        self
    }

    pub fn with_origin(mut self, ip_address: IpAddr, user_agent: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address);
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Destination for audit events.
///
/// Implementations must not block for long; they are called inline on the
/// issuing path.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _event: &AuditEvent) {}
}
