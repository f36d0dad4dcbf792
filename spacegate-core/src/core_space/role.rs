//! Organization roles and the capabilities they grant

use super::errors::SpaceError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Organization-level roles.
///
/// Variant order is privilege order: `Viewer < Member < Admin < Owner`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrganizationRole {
    /// Read-only access to content
    Viewer,
    /// Default role, can create and edit content
    Member,
    /// Can manage members and organization settings
    Admin,
    /// Full control, can delete the organization
    Owner,
}

impl OrganizationRole {
    pub const ALL: [OrganizationRole; 4] = [
        OrganizationRole::Viewer,
        OrganizationRole::Member,
        OrganizationRole::Admin,
        OrganizationRole::Owner,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrganizationRole::Viewer => "viewer",
            OrganizationRole::Member => "member",
            OrganizationRole::Admin => "admin",
            OrganizationRole::Owner => "owner",
        }
    }

    /// Capabilities granted by this role
    pub fn permissions(self) -> PermissionSet {
        use Capability::*;
        match self {
            OrganizationRole::Owner => {
                PermissionSet::from_capabilities(&[Read, Write, Create, Update, Delete, Admin])
            }
            OrganizationRole::Admin => {
                PermissionSet::from_capabilities(&[Read, Write, Create, Update, Delete])
            }
            OrganizationRole::Member => PermissionSet::from_capabilities(&[Read, Write, Create, Update]),
            OrganizationRole::Viewer => PermissionSet::read_only(),
        }
    }

    /// Owner or Admin
    pub fn can_manage_members(self) -> bool {
        self >= OrganizationRole::Admin
    }
}

impl fmt::Display for OrganizationRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrganizationRole {
    type Err = SpaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "owner" => Ok(OrganizationRole::Owner),
            "admin" => Ok(OrganizationRole::Admin),
            "member" => Ok(OrganizationRole::Member),
            "viewer" => Ok(OrganizationRole::Viewer),
            other => Err(SpaceError::BadRequest(format!("unknown organization role '{other}'"))),
        }
    }
}

/// A single action a space context may authorize
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Read,
    Write,
    Create,
    Update,
    Delete,
    Admin,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Read => "read",
            Capability::Write => "write",
            Capability::Create => "create",
            Capability::Update => "update",
            Capability::Delete => "delete",
            Capability::Admin => "admin",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered, duplicate-free set of capabilities
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(Vec<Capability>);

impl PermissionSet {
    /// Build a set, keeping first occurrence order and dropping duplicates
    pub fn from_capabilities(capabilities: &[Capability]) -> Self {
        let mut set = Vec::with_capacity(capabilities.len());
        for cap in capabilities {
            if !set.contains(cap) {
                set.push(*cap);
            }
        }
        PermissionSet(set)
    }

    /// The fail-safe minimum
    pub fn read_only() -> Self {
        PermissionSet(vec![Capability::Read])
    }

    /// Capabilities of a personal space owner
    pub fn personal() -> Self {
        use Capability::*;
        PermissionSet::from_capabilities(&[Read, Write, Create, Update, Delete])
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Capability> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Capability] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.0.iter().map(Capability::as_str).collect()
    }
}

impl<'a> IntoIterator for &'a PermissionSet {
    type Item = &'a Capability;
    type IntoIter = std::slice::Iter<'a, Capability>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Map a raw role name to its capabilities.
///
/// Total: unknown or empty role names get `{read}`, never more.
pub fn permissions_for(role: &str) -> PermissionSet {
    role.parse::<OrganizationRole>()
        .map(OrganizationRole::permissions)
        .unwrap_or_else(|_| PermissionSet::read_only())
}
