//! User entity for identity management.
//!
//! Users carry full role snapshots so that permission resolution can run on
//! the entity alone.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warden_core::{DomainError, DomainResult, Entity, RoleId, UserId};

use tracing::{debug, warn};

use crate::audit::{AuditEvent, AuditSink};
use crate::credentials::{Credentials, Password};
use crate::email::Email;
use crate::hasher::PasswordHasher;
use crate::roles::Role;

/// User account.
///
/// # Invariants
/// - The email is syntactically valid (uniqueness is enforced by the store).
/// - Roles are unique by id.
/// - The password hash is never serialized.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: Email,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub active: bool,
    pub roles: Vec<Role>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<DateTime<Utc>>,
}

impl core::fmt::Debug for User {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("active", &self.active)
            .field("roles", &self.roles)
            .field("last_login_at", &self.last_login_at)
            .finish_non_exhaustive()
    }
}

impl User {
    /// New active user without roles.
    pub fn new(
        credentials: &Credentials,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: UserId::new(),
            email: credentials.email().clone(),
            password_hash: credentials.password().hash().to_string(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            active: true,
            roles: Vec::new(),
            created_at: now,
            updated_at: now,
            last_login_at: None,
        }
    }

    /// The login credentials stored for this user.
    pub fn credentials(&self) -> Credentials {
        Credentials::from_parts(self.email.clone(), Password::from_hash(self.password_hash.clone()))
    }

    /// Check a login attempt and report it as a `login` audit event.
    ///
    /// Inactive accounts always fail. A successful attempt stamps
    /// `last_login_at`.
    pub fn authenticate<H, A>(
        &mut self,
        candidate: &str,
        hasher: &H,
        audit: &A,
        now: DateTime<Utc>,
    ) -> bool
    where
        H: PasswordHasher + ?Sized,
        A: AuditSink + ?Sized,
    {
        let success = self.active && self.credentials().verify(candidate, hasher);
        let mut event = AuditEvent::login(self.id, success, now);
        if success {
            self.update_last_login(now);
            debug!(user_id = %self.id, "login succeeded");
        } else {
            let reason = if self.active { "invalid credentials" } else { "account inactive" };
            warn!(user_id = %self.id, reason, "login failed");
            event = event.with_metadata("reason", reason);
        }
        audit.record(&event);
        success
    }

    pub fn change_password<A>(&mut self, password: &Password, audit: &A, now: DateTime<Utc>)
    where
        A: AuditSink + ?Sized,
    {
        self.password_hash = password.hash().to_string();
        self.updated_at = now;
        audit.record(&AuditEvent::password_changed(self.id, now));
    }

    /// [`add_role`](Self::add_role) that reports a `role_change` when the
    /// user actually changed.
    pub fn grant_role<A>(&mut self, role: Role, audit: &A, now: DateTime<Utc>) -> bool
    where
        A: AuditSink + ?Sized,
    {
        let name = role.name.clone();
        let granted = self.add_role(role, now);
        if granted {
            audit.record(&AuditEvent::role_changed(self.id, &name, true, now));
        }
        granted
    }

    /// [`remove_role`](Self::remove_role) that reports a `role_change` when
    /// a role was removed.
    pub fn revoke_role<A>(&mut self, role_id: RoleId, audit: &A, now: DateTime<Utc>) -> bool
    where
        A: AuditSink + ?Sized,
    {
        let Some(name) = self.roles.iter().find(|r| r.id == role_id).map(|r| r.name.clone()) else {
            return false;
        };
        let revoked = self.remove_role(role_id, now);
        if revoked {
            audit.record(&AuditEvent::role_changed(self.id, &name, false, now));
        }
        revoked
    }

    /// Attach a role; a role whose id is already present is ignored.
    ///
    /// Returns `true` if the user changed.
    pub fn add_role(&mut self, role: Role, now: DateTime<Utc>) -> bool {
        if self.has_role(role.id) {
            return false;
        }
        self.roles.push(role);
        self.updated_at = now;
        true
    }

    /// Returns `true` if a role was removed.
    pub fn remove_role(&mut self, role_id: RoleId, now: DateTime<Utc>) -> bool {
        let before = self.roles.len();
        self.roles.retain(|r| r.id != role_id);
        let removed = self.roles.len() != before;
        if removed {
            self.updated_at = now;
        }
        removed
    }

    pub fn has_role(&self, role_id: RoleId) -> bool {
        self.roles.iter().any(|r| r.id == role_id)
    }

    pub fn update_last_login(&mut self, now: DateTime<Utc>) {
        self.last_login_at = Some(now);
        self.updated_at = now;
    }

    pub fn activate(&mut self, now: DateTime<Utc>) {
        self.active = true;
        self.updated_at = now;
    }

    pub fn deactivate(&mut self, now: DateTime<Utc>) {
        self.active = false;
        self.updated_at = now;
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl Entity for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn validate(&self) -> DomainResult<()> {
        if self.password_hash.is_empty() {
            return Err(DomainError::validation("password hash is required"));
        }
        if self.first_name.trim().is_empty() || self.last_name.trim().is_empty() {
            return Err(DomainError::validation("first and last name are required"));
        }
        let mut seen = HashSet::new();
        for role in &self.roles {
            role.validate()?;
            if !seen.insert(role.id) {
                return Err(DomainError::invariant(format!("user {} holds role {} twice", self.id, role.id)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditEventType;
    use crate::audit::testing::RecordingSink;
    use crate::hasher::{Argon2Hasher, fast_config};

    fn user() -> User {
        let creds = Credentials::new("alice@example.com", "Tr0ub4dor&3", &Argon2Hasher::new(fast_config())).unwrap();
        User::new(&creds, "Alice", "Smith", Utc::now())
    }

    #[test]
    fn new_user_is_active_without_roles() {
        let u = user();
        assert!(u.active);
        assert!(u.roles.is_empty());
        assert!(u.last_login_at.is_none());
        assert_eq!(u.full_name(), "Alice Smith");
        assert!(u.validate().is_ok());
    }

    #[test]
    fn roles_are_unique_by_id() {
        let mut u = user();
        let role = Role::new("admin", "", Utc::now());

        assert!(u.add_role(role.clone(), Utc::now()));
        assert!(!u.add_role(role.clone(), Utc::now()));
        assert_eq!(u.roles.len(), 1);

        assert!(u.remove_role(role.id, Utc::now()));
        assert!(!u.has_role(role.id));
    }

    #[test]
    fn stored_credentials_verify() {
        let hasher = Argon2Hasher::new(fast_config());
        let u = user();
        assert!(u.credentials().verify("Tr0ub4dor&3", &hasher));
        assert!(!u.credentials().verify("Tr0ub4dor&4", &hasher));
    }

    #[test]
    fn change_password_replaces_hash() {
        let hasher = Argon2Hasher::new(fast_config());
        let mut u = user();
        let next = Password::new("N3w-Secret!", Default::default(), &hasher).unwrap();

        let sink = RecordingSink::default();
        u.change_password(&next, &sink, Utc::now());
        assert!(u.credentials().verify("N3w-Secret!", &hasher));
        assert!(!u.credentials().verify("Tr0ub4dor&3", &hasher));

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, AuditEventType::PasswordChange);
        assert_eq!(events[0].user_id, u.id);
    }

    #[test]
    fn authenticate_reports_success_and_failure() {
        let hasher = Argon2Hasher::new(fast_config());
        let sink = RecordingSink::default();
        let mut u = user();
        let now = Utc::now();

        assert!(!u.authenticate("Tr0ub4dor&4", &hasher, &sink, now));
        assert!(u.last_login_at.is_none());
        assert!(u.authenticate("Tr0ub4dor&3", &hasher, &sink, now));
        assert_eq!(u.last_login_at, Some(now));

        u.deactivate(now);
        assert!(!u.authenticate("Tr0ub4dor&3", &hasher, &sink, now));

        let events = sink.events();
        let outcomes: Vec<(AuditEventType, bool)> =
            events.iter().map(|e| (e.event_type, e.success)).collect();
        assert_eq!(
            outcomes,
            vec![
                (AuditEventType::Login, false),
                (AuditEventType::Login, true),
                (AuditEventType::Login, false),
            ]
        );
        assert_eq!(events[0].metadata["reason"], "invalid credentials");
        assert_eq!(events[2].metadata["reason"], "account inactive");
        assert!(!serde_json::to_string(&events).unwrap().contains("Tr0ub4dor"));
    }

    #[test]
    fn role_changes_are_audited_only_when_effective() {
        let sink = RecordingSink::default();
        let mut u = user();
        let role = Role::new("auditor", "", Utc::now());

        assert!(u.grant_role(role.clone(), &sink, Utc::now()));
        assert!(!u.grant_role(role.clone(), &sink, Utc::now()));
        assert!(u.revoke_role(role.id, &sink, Utc::now()));
        assert!(!u.revoke_role(role.id, &sink, Utc::now()));

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.event_type == AuditEventType::RoleChange));
        assert_eq!(events[0].description, "role 'auditor' granted");
        assert_eq!(events[1].description, "role 'auditor' revoked");
    }

    #[test]
    fn lifecycle_helpers_touch_updated_at() {
        let mut u = user();
        let later = u.created_at + chrono::Duration::minutes(1);

        u.deactivate(later);
        assert!(!u.active);
        assert_eq!(u.updated_at, later);

        u.activate(later);
        u.update_last_login(later);
        assert!(u.active);
        assert_eq!(u.last_login_at, Some(later));
    }

    #[test]
    fn password_hash_is_not_serialized() {
        let u = user();
        let json = serde_json::to_value(&u).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["email"], "alice@example.com");
        assert!(!format!("{u:?}").contains(&u.password_hash));
    }
}
