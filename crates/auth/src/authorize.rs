use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use warden_core::UserId;

use crate::permissions::{Action, Permission, PermissionKey, ResourceType};
use crate::user::User;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("access denied: missing permission '{resource}:{action}'")]
pub struct AccessDenied {
    pub resource: ResourceType,
    pub action: Action,
}

/// Resolves a user's role/permission graph into access decisions.
///
/// - No IO
/// - No panics
/// - A missing user is denied, never an error
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissionResolver;

impl PermissionResolver {
    pub fn new() -> Self {
        Self
    }

    /// True iff any role of the user grants exactly `(resource, action)`.
    pub fn has_permission(&self, user: Option<&User>, resource: ResourceType, action: Action) -> bool {
        user.is_some_and(|u| u.roles.iter().any(|r| r.grants(resource, action)))
    }

    pub fn has_any_permission<'a, I>(&self, user: Option<&User>, keys: I) -> bool
    where
        I: IntoIterator<Item = &'a PermissionKey>,
    {
        keys.into_iter()
            .any(|k| self.has_permission(user, k.resource, k.action))
    }

    /// Union of all role permissions, one per `resource:action` key.
    ///
    /// The first permission seen for a key is kept; the result is ordered by key.
    pub fn effective_permissions(&self, user: Option<&User>) -> Vec<Permission> {
        let Some(user) = user else {
            return Vec::new();
        };
        let mut by_key: BTreeMap<PermissionKey, &Permission> = BTreeMap::new();
        for permission in user.roles.iter().flat_map(|r| &r.permissions) {
            by_key.entry(permission.key()).or_insert(permission);
        }
        by_key.into_values().cloned().collect()
    }

    pub fn assert_access(
        &self,
        user: Option<&User>,
        resource: ResourceType,
        action: Action,
    ) -> Result<(), AccessDenied> {
        if self.has_permission(user, resource, action) {
            return Ok(());
        }
        debug!(
            user_id = ?user.map(|u| u.id),
            %resource,
            %action,
            "access denied"
        );
        Err(AccessDenied { resource, action })
    }

    /// Role membership by exact name.
    pub fn has_role(&self, user: Option<&User>, role_name: &str) -> bool {
        user.is_some_and(|u| u.roles.iter().any(|r| r.name == role_name))
    }

    /// Explain why an access decision is (or would be) made.
    pub fn explain_access(
        &self,
        user: Option<&User>,
        resource: ResourceType,
        action: Action,
    ) -> AccessExplanation {
        let required = PermissionKey::new(resource, action);
        let Some(user) = user else {
            return AccessExplanation {
                required,
                granted: false,
                reason: "no user supplied".to_string(),
                user_id: None,
                roles: Vec::new(),
                granting_roles: Vec::new(),
                effective_permissions: Vec::new(),
            };
        };

        let granting_roles: Vec<String> = user
            .roles
            .iter()
            .filter(|r| r.grants(resource, action))
            .map(|r| r.name.clone())
            .collect();
        let effective_permissions = self
            .effective_permissions(Some(user))
            .iter()
            .map(Permission::key)
            .collect::<Vec<_>>();
        let granted = !granting_roles.is_empty();
        let reason = if granted {
            format!("'{required}' granted by role(s) {}", granting_roles.join(", "))
        } else if user.roles.is_empty() {
            format!("'{required}' denied: user has no roles")
        } else {
            format!("'{required}' denied: no assigned role grants it")
        };

        AccessExplanation {
            required,
            granted,
            reason,
            user_id: Some(user.id),
            roles: user.roles.iter().map(|r| r.name.clone()).collect(),
            granting_roles,
            effective_permissions,
        }
    }
}

/// Auditable breakdown of an access decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessExplanation {
    pub required: PermissionKey,
    pub granted: bool,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    pub roles: Vec<String>,
    pub granting_roles: Vec<String>,
    pub effective_permissions: Vec<PermissionKey>,
}
