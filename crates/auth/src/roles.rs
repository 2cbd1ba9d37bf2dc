//! Roles: named bundles of permissions used for RBAC.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warden_core::{DomainError, DomainResult, Entity, PermissionId, RoleId};

use crate::permissions::{Action, Permission, ResourceType};

/// Role with its granted permissions.
///
/// # Invariants
/// - No two permissions share an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub permissions: Vec<Permission>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    pub fn new(name: impl Into<String>, description: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: RoleId::new(),
            name: name.into(),
            description: description.into(),
            permissions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach a permission; a permission whose id is already present is ignored.
    ///
    /// Returns `true` if the role changed.
    pub fn add_permission(&mut self, permission: Permission, now: DateTime<Utc>) -> bool {
        if self.has_permission(permission.id) {
            return false;
        }
        self.permissions.push(permission);
        self.updated_at = now;
        true
    }

    /// Returns `true` if a permission was removed.
    pub fn remove_permission(&mut self, permission_id: PermissionId, now: DateTime<Utc>) -> bool {
        let before = self.permissions.len();
        self.permissions.retain(|p| p.id != permission_id);
        let removed = self.permissions.len() != before;
        if removed {
            self.updated_at = now;
        }
        removed
    }

    pub fn has_permission(&self, permission_id: PermissionId) -> bool {
        self.permissions.iter().any(|p| p.id == permission_id)
    }

    /// Whether any attached permission allows `action` on `resource`.
    pub fn grants(&self, resource: ResourceType, action: Action) -> bool {
        self.permissions.iter().any(|p| p.allows(resource, action))
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.name)
    }
}

impl Entity for Role {
    type Id = RoleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("role name cannot be empty"));
        }
        let mut seen = HashSet::new();
        for p in &self.permissions {
            p.validate()?;
            if !seen.insert(p.id) {
                return Err(DomainError::invariant(format!(
                    "role '{}' lists permission {} twice",
                    self.name, p.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perm(resource: ResourceType, action: Action) -> Permission {
        Permission::new(format!("{resource}:{action}"), resource, action, "", Utc::now())
    }

    #[test]
    fn add_permission_dedups_by_id() {
        let mut role = Role::new("auditor", "read-only access", Utc::now());
        let read = perm(ResourceType::User, Action::Read);

        assert!(role.add_permission(read.clone(), Utc::now()));
        assert!(!role.add_permission(read.clone(), Utc::now()));
        assert_eq!(role.permissions.len(), 1);
        assert!(role.has_permission(read.id));
    }

    #[test]
    fn remove_permission_updates_timestamp() {
        let created = Utc::now();
        let mut role = Role::new("auditor", "", created);
        let read = perm(ResourceType::User, Action::Read);
        role.add_permission(read.clone(), created);

        let later = created + chrono::Duration::seconds(5);
        assert!(role.remove_permission(read.id, later));
        assert_eq!(role.updated_at, later);
        assert!(!role.remove_permission(read.id, later));
        assert!(role.permissions.is_empty());
    }

    #[test]
    fn grants_matches_exact_pair() {
        let mut role = Role::new("ops", "", Utc::now());
        role.add_permission(perm(ResourceType::Client, Action::Create), Utc::now());

        assert!(role.grants(ResourceType::Client, Action::Create));
        assert!(!role.grants(ResourceType::Client, Action::Delete));
        assert!(!role.grants(ResourceType::User, Action::Create));
    }

    #[test]
    fn duplicate_ids_fail_validation() {
        let mut role = Role::new("ops", "", Utc::now());
        let p = perm(ResourceType::Role, Action::Update);
        role.permissions = vec![p.clone(), p];

        let err = role.validate().unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }
}
