//! Organization and membership records

use super::errors::{SpaceError, SpaceResult};
use super::role::OrganizationRole;
use super::types::{OrganizationId, TenantBinding, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An organization as returned by the organization store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Organization {
    /// Unique identifier
    pub id: OrganizationId,

    /// Globally unique, URL-safe handle
    pub slug: String,

    /// Human-readable name
    pub name: String,

    /// Present only once a tenant has been provisioned for content
    pub tenant: Option<TenantBinding>,

    pub visibility: OrganizationVisibility,

    pub created_at: Timestamp,

    pub updated_at: Timestamp,
}

impl Organization {
    /// Create a new, unprovisioned organization
    pub fn new(slug: String, name: String, visibility: OrganizationVisibility) -> Self {
        let now = Timestamp::now();
        Organization {
            id: OrganizationId::generate(),
            slug,
            name,
            tenant: None,
            visibility,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_tenant(mut self, binding: TenantBinding) -> Self {
        self.tenant = Some(binding);
        self
    }
}

/// Organization visibility modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrganizationVisibility {
    /// Listed in the directory
    Public,
    /// Invite-only
    Private,
}

impl OrganizationVisibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrganizationVisibility::Public => "public",
            OrganizationVisibility::Private => "private",
        }
    }
}

impl fmt::Display for OrganizationVisibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrganizationVisibility {
    type Err = SpaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(OrganizationVisibility::Public),
            "private" => Ok(OrganizationVisibility::Private),
            other => Err(SpaceError::BadRequest(format!("unknown visibility '{other}'"))),
        }
    }
}

/// Membership edge between one user and one organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationMembership {
    pub organization_id: OrganizationId,

    pub user_id: UserId,

    pub role: OrganizationRole,

    pub joined_at: Timestamp,

    /// Who invited this member (None for the creator)
    pub invited_by: Option<UserId>,

    pub title: Option<String>,

    pub department: Option<String>,
}

impl OrganizationMembership {
    pub fn new(organization_id: OrganizationId, user_id: UserId, role: OrganizationRole) -> Self {
        Self {
            organization_id,
            user_id,
            role,
            joined_at: Timestamp::now(),
            invited_by: None,
            title: None,
            department: None,
        }
    }

    pub fn invited_by(mut self, inviter: UserId) -> Self {
        self.invited_by = Some(inviter);
        self
    }
}

/// Partial update of organization metadata
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrganizationUpdate {
    pub name: Option<String>,
    pub visibility: Option<OrganizationVisibility>,
}

/// Validate an organization slug: 1..=64 chars of `[a-z0-9-]`, no edge dashes
pub fn validate_slug(slug: &str) -> SpaceResult<()> {
    let valid_chars = slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if slug.is_empty() || slug.len() > 64 || !valid_chars {
        return Err(SpaceError::BadRequest(format!("invalid organization slug '{slug}'")));
    }
    if slug.starts_with('-') || slug.ends_with('-') {
        return Err(SpaceError::BadRequest(format!("invalid organization slug '{slug}'")));
    }
    Ok(())
}

/// Validate an organization display name
pub fn validate_name(name: &str) -> SpaceResult<()> {
    if name.trim().is_empty() {
        return Err(SpaceError::BadRequest("organization name must not be empty".to_string()));
    }
    if name.len() > 100 {
        return Err(SpaceError::BadRequest(
            "organization name must be at most 100 bytes".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_organization_is_unprovisioned() {
        let org = Organization::new(
            "acme".to_string(),
            "Acme".to_string(),
            OrganizationVisibility::Private,
        );
        assert!(org.tenant.is_none());
        assert!(org.id.as_str().starts_with("org_"));
        assert_eq!(org.created_at, org.updated_at);
    }

    #[test]
    fn test_slug_validation() {
        assert!(validate_slug("acme-research").is_ok());
        assert!(validate_slug("a1").is_ok());
        assert!(validate_slug("").is_err());
        assert!(validate_slug("Acme").is_err());
        assert!(validate_slug("acme_research").is_err());
        assert!(validate_slug("-acme").is_err());
        assert!(validate_slug(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_name_validation() {
        assert!(validate_name("Acme Research").is_ok());
        assert!(matches!(validate_name("  "), Err(SpaceError::BadRequest(_))));
        assert!(validate_name(&"x".repeat(101)).is_err());
    }

    #[test]
    fn test_visibility_parse() {
        assert_eq!("Public".parse::<OrganizationVisibility>().unwrap(), OrganizationVisibility::Public);
        assert!("hidden".parse::<OrganizationVisibility>().is_err());
    }
}
