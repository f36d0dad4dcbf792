//! Space selectors, resolved contexts and listing entries

use super::errors::{SpaceError, SpaceResult};
use super::organization::Organization;
use super::role::{Capability, OrganizationRole, PermissionSet};
use super::types::{ApiKey, SpaceId, TenantBinding, TenantId, Timestamp, UserId};
use super::user::User;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The two kinds of space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpaceType {
    /// One per user, owned outright
    Personal,
    /// Shared and role-gated
    Organization,
}

impl SpaceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpaceType::Personal => "personal",
            SpaceType::Organization => "organization",
        }
    }
}

impl fmt::Display for SpaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpaceType {
    type Err = SpaceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "personal" => Ok(SpaceType::Personal),
            "organization" => Ok(SpaceType::Organization),
            other => Err(SpaceError::BadRequest(format!("invalid space type '{other}'"))),
        }
    }
}

/// The (type, id) pair an inbound request uses to pick a space
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceSelector {
    pub space_type: SpaceType,
    pub space_id: SpaceId,
}

impl SpaceSelector {
    pub fn personal(space_id: SpaceId) -> Self {
        Self { space_type: SpaceType::Personal, space_id }
    }

    pub fn organization(space_id: SpaceId) -> Self {
        Self { space_type: SpaceType::Organization, space_id }
    }

    /// Parse a raw selector; unknown types and empty ids are `BadRequest`
    pub fn parse(space_type: &str, space_id: &str) -> SpaceResult<Self> {
        let space_type = space_type.parse::<SpaceType>()?;
        let space_id = space_id.trim();
        if space_id.is_empty() {
            return Err(SpaceError::BadRequest("space id must not be empty".to_string()));
        }
        Ok(Self { space_type, space_id: SpaceId::new(space_id) })
    }
}

/// Request-scoped authorization snapshot produced by the resolver.
///
/// Fields are private so a context can only come out of resolution; it
/// holds no references back into the stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpaceContext {
    space_type: SpaceType,
    space_id: SpaceId,
    tenant_id: TenantId,
    #[serde(skip_serializing)]
    api_key: ApiKey,
    user_id: UserId,
    user_role: OrganizationRole,
    space_name: String,
    permissions: PermissionSet,
    resolved_at: Timestamp,
}

impl SpaceContext {
    pub(crate) fn new(
        selector: SpaceSelector,
        binding: TenantBinding,
        user_id: UserId,
        user_role: OrganizationRole,
        space_name: String,
        permissions: PermissionSet,
    ) -> Self {
        Self {
            space_type: selector.space_type,
            space_id: selector.space_id,
            tenant_id: binding.tenant_id,
            api_key: binding.api_key,
            user_id,
            user_role,
            space_name,
            permissions,
            resolved_at: Timestamp::now(),
        }
    }

    pub fn space_type(&self) -> SpaceType {
        self.space_type
    }

    pub fn space_id(&self) -> &SpaceId {
        &self.space_id
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    pub fn api_key(&self) -> &ApiKey {
        &self.api_key
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn user_role(&self) -> OrganizationRole {
        self.user_role
    }

    pub fn space_name(&self) -> &str {
        &self.space_name
    }

    pub fn permissions(&self) -> &PermissionSet {
        &self.permissions
    }

    pub fn resolved_at(&self) -> Timestamp {
        self.resolved_at
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.permissions.contains(capability)
    }

    /// Gate a content operation on a capability
    pub fn require(&self, capability: Capability) -> SpaceResult<()> {
        if self.can(capability) {
            Ok(())
        } else {
            Err(SpaceError::Forbidden(format!(
                "role '{}' lacks '{}' in space {}",
                self.user_role, capability, self.space_id
            )))
        }
    }
}

/// List-friendly projection of a space a user can see
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceInfo {
    pub space_type: SpaceType,
    pub space_id: SpaceId,
    pub name: String,
    pub tenant_id: TenantId,
    pub role: OrganizationRole,
    pub permissions: PermissionSet,

    /// Organization slug, organization spaces only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
}

impl SpaceInfo {
    /// Personal entry for `user`; `None` if the tenant id is not a personal one
    pub fn personal(user: &User, binding: &TenantBinding) -> Option<Self> {
        let space_id = binding.tenant_id.personal_space_id()?;
        Some(SpaceInfo {
            space_type: SpaceType::Personal,
            space_id,
            name: personal_space_name(user),
            tenant_id: binding.tenant_id.clone(),
            role: OrganizationRole::Owner,
            permissions: PermissionSet::personal(),
            slug: None,
        })
    }

    pub fn organization(org: &Organization, binding: &TenantBinding, role: OrganizationRole) -> Self {
        SpaceInfo {
            space_type: SpaceType::Organization,
            space_id: SpaceId::from_organization(&org.id),
            name: org.name.clone(),
            tenant_id: binding.tenant_id.clone(),
            role,
            permissions: role.permissions(),
            slug: Some(org.slug.clone()),
        }
    }
}

/// Display name of a user's personal space
pub fn personal_space_name(user: &User) -> String {
    format!("{}'s Space", user.display_name())
}

/// Everything `list_spaces` returns for one user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceListing {
    pub personal: Option<SpaceInfo>,
    pub organizations: Vec<SpaceInfo>,
}

impl SpaceListing {
    /// Personal space first, then organizations in store order
    pub fn iter(&self) -> impl Iterator<Item = &SpaceInfo> {
        self.personal.iter().chain(self.organizations.iter())
    }

    pub fn len(&self) -> usize {
        self.organizations.len() + usize::from(self.personal.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_vec(self) -> Vec<SpaceInfo> {
        self.personal.into_iter().chain(self.organizations).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_space::organization::OrganizationVisibility;

    fn binding(tenant: &str) -> TenantBinding {
        TenantBinding::new(TenantId::new(tenant), ApiKey::new("sk_test"))
    }

    #[test]
    fn test_selector_parse() {
        let sel = SpaceSelector::parse("personal", "space_abc").unwrap();
        assert_eq!(sel.space_type, SpaceType::Personal);
        assert_eq!(sel.space_id.as_str(), "space_abc");

        assert!(matches!(SpaceSelector::parse("team", "x"), Err(SpaceError::BadRequest(_))));
        assert!(matches!(SpaceSelector::parse("Personal", "x"), Err(SpaceError::BadRequest(_))));
        assert!(matches!(SpaceSelector::parse("organization", " "), Err(SpaceError::BadRequest(_))));
    }

    #[test]
    fn test_context_require() {
        let ctx = SpaceContext::new(
            SpaceSelector::organization(SpaceId::new("org_1")),
            binding("tenant_org1"),
            UserId::new("u1"),
            OrganizationRole::Viewer,
            "Acme".to_string(),
            OrganizationRole::Viewer.permissions(),
        );
        assert!(ctx.require(Capability::Read).is_ok());
        assert!(matches!(ctx.require(Capability::Write), Err(SpaceError::Forbidden(_))));
    }

    #[test]
    fn test_context_serialization_omits_api_key() {
        let ctx = SpaceContext::new(
            SpaceSelector::personal(SpaceId::new("space_1")),
            TenantBinding::new(TenantId::new("tenant_1"), ApiKey::new("sk_do_not_leak")),
            UserId::new("u1"),
            OrganizationRole::Owner,
            "Alice's Space".to_string(),
            PermissionSet::personal(),
        );
        let json = serde_json::to_string(&ctx).unwrap();
        assert!(!json.contains("sk_do_not_leak"));
        assert!(json.contains("\"tenant_id\":\"tenant_1\""));
    }

    #[test]
    fn test_personal_info_rejects_malformed_tenant() {
        let user = User::new(UserId::new("u1"), "a@example.com", "Alice", "alice");
        assert!(SpaceInfo::personal(&user, &binding("abc")).is_none());

        let info = SpaceInfo::personal(&user, &binding("tenant_abc")).unwrap();
        assert_eq!(info.space_id.as_str(), "space_abc");
        assert_eq!(info.role, OrganizationRole::Owner);
        assert_eq!(info.name, "Alice's Space");
    }

    #[test]
    fn test_listing_order_is_personal_first() {
        let user = User::new(UserId::new("u1"), "a@example.com", "Alice", "alice");
        let org = Organization::new("acme".into(), "Acme".into(), OrganizationVisibility::Public);
        let listing = SpaceListing {
            personal: SpaceInfo::personal(&user, &binding("tenant_a")),
            organizations: vec![SpaceInfo::organization(&org, &binding("tenant_o"), OrganizationRole::Member)],
        };
        let types: Vec<_> = listing.iter().map(|s| s.space_type).collect();
        assert_eq!(types, vec![SpaceType::Personal, SpaceType::Organization]);
        assert_eq!(listing.len(), 2);
        assert_eq!(listing.into_vec().len(), 2);
    }
}
