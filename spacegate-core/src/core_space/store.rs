//! Collaborator traits the resolver, enumerator and manager depend on
//!
//! Implementations live in [`super::storage`] (SQLite and in-memory) and
//! [`super::provisioning`] (local provisioner). Any graph-store or HTTP
//! client can stand in as long as it honours these contracts.

use super::errors::SpaceResult;
use super::organization::{Organization, OrganizationMembership};
use super::provisioning::TenantSpec;
use super::role::OrganizationRole;
use super::types::{OrganizationId, TenantBinding, UserId};
use super::user::User;
use async_trait::async_trait;

/// Result of a conditional "bind only if currently unbound" write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
    /// The supplied binding was stored
    Bound,
    /// A binding was already present; it is returned unchanged
    AlreadyBound(TenantBinding),
}

/// Identity store
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Fetch a user. `SpaceError::NotFound` if missing.
    async fn get_user_by_id(&self, user_id: &UserId) -> SpaceResult<User>;

    /// Unconditionally overwrite the user's personal tenant binding.
    async fn update_personal_tenant_info(
        &self,
        user_id: &UserId,
        binding: &TenantBinding,
    ) -> SpaceResult<()>;

    /// Store `binding` only if the user has no personal tenant yet.
    ///
    /// Must be atomic with respect to concurrent callers: of two racing
    /// calls exactly one observes `Bound`.
    async fn bind_personal_tenant_if_absent(
        &self,
        user_id: &UserId,
        binding: &TenantBinding,
    ) -> SpaceResult<BindOutcome>;
}

/// Organization store
#[async_trait]
pub trait OrganizationStore: Send + Sync {
    /// Fetch an organization. `SpaceError::NotFound` if missing.
    async fn get_organization(
        &self,
        org_id: &OrganizationId,
        caller_id: &UserId,
    ) -> SpaceResult<Organization>;

    /// All memberships of an organization, in join order.
    ///
    /// `SpaceError::Forbidden` if `caller_id` is not a member.
    async fn get_organization_members(
        &self,
        org_id: &OrganizationId,
        caller_id: &UserId,
    ) -> SpaceResult<Vec<OrganizationMembership>>;

    /// Role of `user_id` in the organization, if any
    async fn membership_role(
        &self,
        org_id: &OrganizationId,
        user_id: &UserId,
    ) -> SpaceResult<Option<OrganizationRole>>;

    /// Organizations `user_id` belongs to, in store order
    async fn list_user_organizations(&self, user_id: &UserId) -> SpaceResult<Vec<Organization>>;

    /// Insert an organization together with its owner membership, atomically.
    ///
    /// `SpaceError::Conflict` if the slug is taken.
    async fn create_organization(
        &self,
        org: &Organization,
        owner: &OrganizationMembership,
    ) -> SpaceResult<()>;

    /// Persist name / visibility / updated_at
    async fn update_organization(&self, org: &Organization) -> SpaceResult<()>;

    /// Delete an organization and all of its memberships
    async fn delete_organization(&self, org_id: &OrganizationId) -> SpaceResult<()>;

    /// Insert a membership. `SpaceError::Conflict` if the edge exists.
    async fn add_member(&self, membership: &OrganizationMembership) -> SpaceResult<()>;

    /// Change a member's role unless that would leave the organization
    /// without an owner.
    ///
    /// The owner count and the write must be atomic with respect to other
    /// membership writes. `SpaceError::NotFound` if not a member,
    /// `SpaceError::Conflict` if the member is the last owner.
    async fn set_member_role_keeping_owner(
        &self,
        org_id: &OrganizationId,
        user_id: &UserId,
        role: OrganizationRole,
    ) -> SpaceResult<()>;

    /// Delete a membership unless it is the last owner. Same errors as
    /// [`Self::set_member_role_keeping_owner`].
    async fn remove_member_keeping_owner(
        &self,
        org_id: &OrganizationId,
        user_id: &UserId,
    ) -> SpaceResult<()>;

    /// Store `binding` only if the organization has no tenant yet
    async fn bind_organization_tenant_if_absent(
        &self,
        org_id: &OrganizationId,
        binding: &TenantBinding,
    ) -> SpaceResult<BindOutcome>;
}

/// Tenant provisioner. Not idempotent: every successful call is a new tenant.
#[async_trait]
pub trait TenantProvisioner: Send + Sync {
    /// Create a tenant, returning its id and api key.
    /// Failures are `SpaceError::ExternalService`.
    async fn create_tenant(&self, spec: &TenantSpec) -> SpaceResult<TenantBinding>;
}
