//! Permission model: a (resource, action) pair with a canonical
//! `"<resource>:<action>"` key.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warden_core::{DomainError, DomainResult, Entity, PermissionId};

/// Resource kinds guarded by permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    User,
    Role,
    Permission,
    Client,
}

impl ResourceType {
    pub const ALL: [ResourceType; 4] = [
        ResourceType::User,
        ResourceType::Role,
        ResourceType::Permission,
        ResourceType::Client,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::User => "user",
            ResourceType::Role => "role",
            ResourceType::Permission => "permission",
            ResourceType::Client => "client",
        }
    }
}

/// Operations a permission may allow on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    List,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::Create,
        Action::Read,
        Action::Update,
        Action::Delete,
        Action::List,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::List => "list",
        }
    }
}

impl core::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown resource type '{s}'")))
    }
}

impl FromStr for Action {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown action '{s}'")))
    }
}

/// Identity of a permission for access decisions.
///
/// Two permissions with the same key grant the same thing, whatever their
/// record ids or descriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PermissionKey {
    pub resource: ResourceType,
    pub action: Action,
}

impl PermissionKey {
    pub fn new(resource: ResourceType, action: Action) -> Self {
        Self { resource, action }
    }
}

impl core::fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.resource, self.action)
    }
}

impl FromStr for PermissionKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (resource, action) = s
            .split_once(':')
            .ok_or_else(|| DomainError::validation(format!("permission key '{s}' is not 'resource:action'")))?;
        Ok(Self::new(resource.parse()?, action.parse()?))
    }
}

impl TryFrom<String> for PermissionKey {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PermissionKey> for String {
    fn from(value: PermissionKey) -> Self {
        value.to_string()
    }
}

/// Permission record as stored by the persistence collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    pub name: String,
    pub resource: ResourceType,
    pub action: Action,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Permission {
    pub fn new(
        name: impl Into<String>,
        resource: ResourceType,
        action: Action,
        description: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PermissionId::new(),
            name: name.into(),
            resource,
            action,
            description: description.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> PermissionKey {
        PermissionKey::new(self.resource, self.action)
    }

    pub fn allows(&self, resource: ResourceType, action: Action) -> bool {
        self.resource == resource && self.action == action
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.key(), f)
    }
}

impl Entity for Permission {
    type Id = PermissionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("permission name cannot be empty"));
        }
        Ok(())
    }
}
