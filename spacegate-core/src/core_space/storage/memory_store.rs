//! In-memory identity and organization directory
//!
//! Keeps organizations and memberships in insertion order so listings are
//! deterministic. Fault switches let tests simulate an unavailable store.

use crate::core_space::errors::{SpaceError, SpaceResult};
use crate::core_space::organization::{Organization, OrganizationMembership};
use crate::core_space::role::OrganizationRole;
use crate::core_space::store::{BindOutcome, IdentityStore, OrganizationStore};
use crate::core_space::types::{OrganizationId, TenantBinding, Timestamp, UserId};
use crate::core_space::user::User;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct DirectoryState {
    users: HashMap<UserId, User>,
    organizations: Vec<Organization>,
    memberships: Vec<OrganizationMembership>,
}

impl DirectoryState {
    fn organization(&self, org_id: &OrganizationId) -> Option<&Organization> {
        self.organizations.iter().find(|o| &o.id == org_id)
    }

    fn organization_mut(&mut self, org_id: &OrganizationId) -> Option<&mut Organization> {
        self.organizations.iter_mut().find(|o| &o.id == org_id)
    }

    fn membership_mut(
        &mut self,
        org_id: &OrganizationId,
        user_id: &UserId,
    ) -> Option<&mut OrganizationMembership> {
        self.memberships
            .iter_mut()
            .find(|m| &m.organization_id == org_id && &m.user_id == user_id)
    }

    fn owner_count(&self, org_id: &OrganizationId) -> usize {
        self.memberships
            .iter()
            .filter(|m| &m.organization_id == org_id && m.role == OrganizationRole::Owner)
            .count()
    }

    /// Role of the member about to lose `Owner`, refusing if nobody else holds it
    fn releasable_role(&self, org_id: &OrganizationId, user_id: &UserId) -> SpaceResult<OrganizationRole> {
        let role = self
            .role(org_id, user_id)
            .ok_or_else(|| SpaceError::NotFound(format!("user {user_id} is not a member of {org_id}")))?;
        if role == OrganizationRole::Owner && self.owner_count(org_id) <= 1 {
            return Err(SpaceError::Conflict(format!("organization {org_id} must keep an owner")));
        }
        Ok(role)
    }

    fn role(&self, org_id: &OrganizationId, user_id: &UserId) -> Option<OrganizationRole> {
        self.memberships
            .iter()
            .find(|m| &m.organization_id == org_id && &m.user_id == user_id)
            .map(|m| m.role)
    }
}

/// Identity and organization store backed by process memory
#[derive(Default)]
pub struct MemoryDirectory {
    state: RwLock<DirectoryState>,
    unavailable: AtomicBool,
    fail_binds: AtomicBool,
    fail_org_listing: AtomicBool,
    bind_calls: AtomicUsize,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a user
    pub async fn insert_user(&self, user: User) {
        self.state.write().await.users.insert(user.id.clone(), user);
    }

    /// Insert an organization without any membership
    pub async fn insert_organization(&self, org: Organization) {
        let mut state = self.state.write().await;
        state.organizations.retain(|o| o.id != org.id);
        state.organizations.push(org);
    }

    /// Insert or replace a membership edge
    pub async fn insert_membership(&self, membership: OrganizationMembership) {
        let mut state = self.state.write().await;
        state
            .memberships
            .retain(|m| !(m.organization_id == membership.organization_id && m.user_id == membership.user_id));
        state.memberships.push(membership);
    }

    /// Make every call fail with `Unavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make tenant binding writes fail with `Database`
    pub fn set_fail_binds(&self, fail: bool) {
        self.fail_binds.store(fail, Ordering::SeqCst);
    }

    /// Make `list_user_organizations` fail with `Unavailable`
    pub fn set_fail_org_listing(&self, fail: bool) {
        self.fail_org_listing.store(fail, Ordering::SeqCst);
    }

    /// Number of personal tenant bind attempts seen so far
    pub fn bind_calls(&self) -> usize {
        self.bind_calls.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> SpaceResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SpaceError::Unavailable("directory offline".to_string()));
        }
        Ok(())
    }

    fn check_bind(&self) -> SpaceResult<()> {
        self.check_available()?;
        if self.fail_binds.load(Ordering::SeqCst) {
            return Err(SpaceError::Database("tenant binding write rejected".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for MemoryDirectory {
    async fn get_user_by_id(&self, user_id: &UserId) -> SpaceResult<User> {
        self.check_available()?;
        self.state
            .read()
            .await
            .users
            .get(user_id)
            .cloned()
            .ok_or_else(|| SpaceError::NotFound(format!("user {user_id}")))
    }

    async fn update_personal_tenant_info(
        &self,
        user_id: &UserId,
        binding: &TenantBinding,
    ) -> SpaceResult<()> {
        self.check_bind()?;
        self.bind_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.write().await;
        let user = state
            .users
            .get_mut(user_id)
            .ok_or_else(|| SpaceError::NotFound(format!("user {user_id}")))?;
        user.personal_tenant = Some(binding.clone());
        Ok(())
    }

    async fn bind_personal_tenant_if_absent(
        &self,
        user_id: &UserId,
        binding: &TenantBinding,
    ) -> SpaceResult<BindOutcome> {
        self.check_bind()?;
        self.bind_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.write().await;
        let user = state
            .users
            .get_mut(user_id)
            .ok_or_else(|| SpaceError::NotFound(format!("user {user_id}")))?;
        match &user.personal_tenant {
            Some(existing) => Ok(BindOutcome::AlreadyBound(existing.clone())),
            None => {
                user.personal_tenant = Some(binding.clone());
                Ok(BindOutcome::Bound)
            }
        }
    }
}

#[async_trait]
impl OrganizationStore for MemoryDirectory {
    async fn get_organization(
        &self,
        org_id: &OrganizationId,
        _caller_id: &UserId,
    ) -> SpaceResult<Organization> {
        self.check_available()?;
        self.state
            .read()
            .await
            .organization(org_id)
            .cloned()
            .ok_or_else(|| SpaceError::NotFound(format!("organization {org_id}")))
    }

    async fn get_organization_members(
        &self,
        org_id: &OrganizationId,
        caller_id: &UserId,
    ) -> SpaceResult<Vec<OrganizationMembership>> {
        self.check_available()?;
        let state = self.state.read().await;
        if state.organization(org_id).is_none() {
            return Err(SpaceError::NotFound(format!("organization {org_id}")));
        }
        if state.role(org_id, caller_id).is_none() {
            return Err(SpaceError::Forbidden(format!("user {caller_id} is not a member of {org_id}")));
        }
        Ok(state
            .memberships
            .iter()
            .filter(|m| &m.organization_id == org_id)
            .cloned()
            .collect())
    }

    async fn membership_role(
        &self,
        org_id: &OrganizationId,
        user_id: &UserId,
    ) -> SpaceResult<Option<OrganizationRole>> {
        self.check_available()?;
        Ok(self.state.read().await.role(org_id, user_id))
    }

    async fn list_user_organizations(&self, user_id: &UserId) -> SpaceResult<Vec<Organization>> {
        self.check_available()?;
        if self.fail_org_listing.load(Ordering::SeqCst) {
            return Err(SpaceError::Unavailable("organization listing failed".to_string()));
        }
        let state = self.state.read().await;
        Ok(state
            .organizations
            .iter()
            .filter(|o| state.role(&o.id, user_id).is_some())
            .cloned()
            .collect())
    }

    async fn create_organization(
        &self,
        org: &Organization,
        owner: &OrganizationMembership,
    ) -> SpaceResult<()> {
        self.check_available()?;
        let mut state = self.state.write().await;
        if state.organizations.iter().any(|o| o.slug == org.slug) {
            return Err(SpaceError::Conflict(format!("slug '{}' is taken", org.slug)));
        }
        if state.organization(&org.id).is_some() {
            return Err(SpaceError::Conflict(format!("organization {} exists", org.id)));
        }
        state.organizations.push(org.clone());
        state.memberships.push(owner.clone());
        Ok(())
    }

    async fn update_organization(&self, org: &Organization) -> SpaceResult<()> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let stored = state
            .organization_mut(&org.id)
            .ok_or_else(|| SpaceError::NotFound(format!("organization {}", org.id)))?;
        stored.name = org.name.clone();
        stored.visibility = org.visibility;
        stored.updated_at = org.updated_at;
        Ok(())
    }

    async fn delete_organization(&self, org_id: &OrganizationId) -> SpaceResult<()> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let before = state.organizations.len();
        state.organizations.retain(|o| &o.id != org_id);
        if state.organizations.len() == before {
            return Err(SpaceError::NotFound(format!("organization {org_id}")));
        }
        state.memberships.retain(|m| &m.organization_id != org_id);
        Ok(())
    }

    async fn add_member(&self, membership: &OrganizationMembership) -> SpaceResult<()> {
        self.check_available()?;
        let mut state = self.state.write().await;
        if state.organization(&membership.organization_id).is_none() {
            return Err(SpaceError::NotFound(format!("organization {}", membership.organization_id)));
        }
        if state.role(&membership.organization_id, &membership.user_id).is_some() {
            return Err(SpaceError::Conflict(format!(
                "user {} is already a member of {}",
                membership.user_id, membership.organization_id
            )));
        }
        state.memberships.push(membership.clone());
        Ok(())
    }

    async fn set_member_role_keeping_owner(
        &self,
        org_id: &OrganizationId,
        user_id: &UserId,
        role: OrganizationRole,
    ) -> SpaceResult<()> {
        self.check_available()?;
        let mut state = self.state.write().await;
        if role != OrganizationRole::Owner {
            state.releasable_role(org_id, user_id)?;
        }
        let membership = state
            .membership_mut(org_id, user_id)
            .ok_or_else(|| SpaceError::NotFound(format!("user {user_id} is not a member of {org_id}")))?;
        membership.role = role;
        Ok(())
    }

    async fn remove_member_keeping_owner(
        &self,
        org_id: &OrganizationId,
        user_id: &UserId,
    ) -> SpaceResult<()> {
        self.check_available()?;
        let mut state = self.state.write().await;
        state.releasable_role(org_id, user_id)?;
        state
            .memberships
            .retain(|m| !(&m.organization_id == org_id && &m.user_id == user_id));
        Ok(())
    }

    async fn bind_organization_tenant_if_absent(
        &self,
        org_id: &OrganizationId,
        binding: &TenantBinding,
    ) -> SpaceResult<BindOutcome> {
        self.check_bind()?;
        let mut state = self.state.write().await;
        let org = state
            .organization_mut(org_id)
            .ok_or_else(|| SpaceError::NotFound(format!("organization {org_id}")))?;
        match &org.tenant {
            Some(existing) => Ok(BindOutcome::AlreadyBound(existing.clone())),
            None => {
                org.tenant = Some(binding.clone());
                org.updated_at = Timestamp::now();
                Ok(BindOutcome::Bound)
            }
        }
    }
}
