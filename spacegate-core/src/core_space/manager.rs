//! Organization management gated by role policy
//!
//! Every mutation looks up the actor's role, runs [`policy::authorize`] and
//! only then touches the store. An organization always keeps at least one
//! owner.

use super::errors::{SpaceError, SpaceResult};
use super::organization::{
    validate_name, validate_slug, Organization, OrganizationMembership, OrganizationUpdate,
    OrganizationVisibility,
};
use super::policy::{self, OrganizationAction};
use super::provisioning::TenantSpec;
use super::role::OrganizationRole;
use super::store::{BindOutcome, IdentityStore, OrganizationStore, TenantProvisioner};
use super::types::{OrganizationId, TenantBinding, Timestamp, UserId};
use crate::config::ProvisioningConfig;
use crate::metrics as space_metrics;
use crate::telemetry;
use std::sync::Arc;
use tracing::Instrument;

/// Organization lifecycle and membership operations
pub struct OrganizationManager {
    identity: Arc<dyn IdentityStore>,
    organizations: Arc<dyn OrganizationStore>,
    provisioner: Arc<dyn TenantProvisioner>,
    config: ProvisioningConfig,
}

impl OrganizationManager {
    pub fn new(
        identity: Arc<dyn IdentityStore>,
        organizations: Arc<dyn OrganizationStore>,
        provisioner: Arc<dyn TenantProvisioner>,
        config: ProvisioningConfig,
    ) -> Self {
        Self { identity, organizations, provisioner, config }
    }

    /// Create an organization with `actor` as its sole owner
    pub async fn create_organization(
        &self,
        actor: &UserId,
        slug: &str,
        name: &str,
        visibility: OrganizationVisibility,
    ) -> SpaceResult<Organization> {
        validate_slug(slug)?;
        validate_name(name)?;
        self.identity.get_user_by_id(actor).await?;
        self.authorize(None, OrganizationAction::CreateOrganization, actor)?;

        let org = Organization::new(slug.to_string(), name.trim().to_string(), visibility);
        let owner = OrganizationMembership::new(org.id.clone(), actor.clone(), OrganizationRole::Owner);
        self.organizations.create_organization(&org, &owner).await?;

        self.applied("create_organization", &org.id, actor);
        Ok(org)
    }

    /// Rename or change visibility. Owner or admin.
    pub async fn update_organization(
        &self,
        actor: &UserId,
        org_id: &OrganizationId,
        update: OrganizationUpdate,
    ) -> SpaceResult<Organization> {
        let mut org = self.organizations.get_organization(org_id, actor).await?;
        let actor_role = self.organizations.membership_role(org_id, actor).await?;
        self.authorize(actor_role, OrganizationAction::UpdateOrganization, actor)?;

        if let Some(name) = update.name {
            validate_name(&name)?;
            org.name = name.trim().to_string();
        }
        if let Some(visibility) = update.visibility {
            org.visibility = visibility;
        }
        org.updated_at = Timestamp::now();
        self.organizations.update_organization(&org).await?;

        self.applied("update_organization", org_id, actor);
        Ok(org)
    }

    /// Delete the organization and its memberships. Owner only.
    pub async fn delete_organization(&self, actor: &UserId, org_id: &OrganizationId) -> SpaceResult<()> {
        self.organizations.get_organization(org_id, actor).await?;
        let actor_role = self.organizations.membership_role(org_id, actor).await?;
        self.authorize(actor_role, OrganizationAction::DeleteOrganization, actor)?;

        self.organizations.delete_organization(org_id).await?;
        self.applied("delete_organization", org_id, actor);
        Ok(())
    }

    /// Add `target` with `role`. Inviting an owner takes an owner.
    pub async fn invite_member(
        &self,
        actor: &UserId,
        org_id: &OrganizationId,
        target: &UserId,
        role: OrganizationRole,
    ) -> SpaceResult<OrganizationMembership> {
        self.organizations.get_organization(org_id, actor).await?;
        let actor_role = self.organizations.membership_role(org_id, actor).await?;
        let existing_role = self.organizations.membership_role(org_id, target).await?;
        self.authorize(
            actor_role,
            OrganizationAction::InviteMember { existing_role, requested: role },
            actor,
        )?;
        self.identity.get_user_by_id(target).await?;

        let membership =
            OrganizationMembership::new(org_id.clone(), target.clone(), role).invited_by(actor.clone());
        self.organizations.add_member(&membership).await?;

        self.applied("invite_member", org_id, actor);
        Ok(membership)
    }

    /// Change `target`'s role. Touching an owner role takes an owner.
    pub async fn update_member_role(
        &self,
        actor: &UserId,
        org_id: &OrganizationId,
        target: &UserId,
        role: OrganizationRole,
    ) -> SpaceResult<()> {
        self.organizations.get_organization(org_id, actor).await?;
        let actor_role = self.organizations.membership_role(org_id, actor).await?;
        let current = self.target_role(org_id, target, actor_role).await?;
        self.authorize(
            actor_role,
            OrganizationAction::UpdateMemberRole { current, requested: role },
            actor,
        )?;

        if current == role {
            return Ok(());
        }

        self.organizations.set_member_role_keeping_owner(org_id, target, role).await?;
        tracing::info!(
            org_id = %org_id,
            actor_id = %actor,
            target_id = %target,
            from = %current,
            to = %role,
            "Member role changed"
        );
        self.applied("update_member_role", org_id, actor);
        Ok(())
    }

    /// Remove `target`. Removing an owner takes an owner.
    pub async fn remove_member(
        &self,
        actor: &UserId,
        org_id: &OrganizationId,
        target: &UserId,
    ) -> SpaceResult<()> {
        self.organizations.get_organization(org_id, actor).await?;
        let actor_role = self.organizations.membership_role(org_id, actor).await?;
        let target_role = self.target_role(org_id, target, actor_role).await?;
        self.authorize(actor_role, OrganizationAction::RemoveMember { target_role }, actor)?;

        self.organizations.remove_member_keeping_owner(org_id, target).await?;
        self.applied("remove_member", org_id, actor);
        Ok(())
    }

    /// Members of the organization, visible to members only
    pub async fn list_members(
        &self,
        actor: &UserId,
        org_id: &OrganizationId,
    ) -> SpaceResult<Vec<OrganizationMembership>> {
        self.organizations.get_organization_members(org_id, actor).await
    }

    /// Provision and bind a tenant so the organization can hold content.
    ///
    /// Owner only. `Conflict` if the organization already has a tenant.
    pub async fn provision_organization_tenant(
        &self,
        actor: &UserId,
        org_id: &OrganizationId,
    ) -> SpaceResult<TenantBinding> {
        let org = self.organizations.get_organization(org_id, actor).await?;
        let actor_role = self.organizations.membership_role(org_id, actor).await?;
        self.authorize(actor_role, OrganizationAction::ProvisionTenant, actor)?;

        if org.tenant.is_some() {
            return Err(SpaceError::Conflict(format!("organization {org_id} already has a tenant")));
        }

        let owner = self.identity.get_user_by_id(actor).await?;
        let op = telemetry::organization::trace_mutation("provision_tenant", org_id.as_str(), actor.as_str());
        let spec = TenantSpec::organization(&org, &owner.email, &self.config);
        let binding = match self.provisioner.create_tenant(&spec).instrument(op.span().clone()).await {
            Ok(binding) => {
                op.record_event("tenant created");
                binding
            }
            Err(e) => {
                op.record_error(&e);
                return Err(e);
            }
        };

        let outcome = match self.organizations.bind_organization_tenant_if_absent(org_id, &binding).await {
            Ok(outcome) => outcome,
            Err(e) => {
                space_metrics::record_counter(space_metrics::ORG_PROVISION_ORPHANED, 1);
                tracing::warn!(
                    org_id = %org_id,
                    orphaned_tenant_id = %binding.tenant_id,
                    error = %e,
                    "Failed to persist organization tenant binding"
                );
                op.record_error(&e);
                return Err(e);
            }
        };

        match outcome {
            BindOutcome::Bound => {
                tracing::info!(org_id = %org_id, tenant_id = %binding.tenant_id, "Provisioned organization tenant");
                op.complete();
                self.applied("provision_tenant", org_id, actor);
                Ok(binding)
            }
            BindOutcome::AlreadyBound(existing) => {
                space_metrics::record_counter(space_metrics::ORG_PROVISION_ORPHANED, 1);
                tracing::warn!(
                    org_id = %org_id,
                    orphaned_tenant_id = %binding.tenant_id,
                    bound_tenant_id = %existing.tenant_id,
                    "Organization tenant bound concurrently, tenant orphaned"
                );
                let err = SpaceError::Conflict(format!("organization {org_id} already has a tenant"));
                op.record_error(&err);
                Err(err)
            }
        }
    }

    /// Role of the member being acted on. A missing target is `NotFound`,
    /// but only once the actor is known to be allowed to manage members.
    async fn target_role(
        &self,
        org_id: &OrganizationId,
        target: &UserId,
        actor_role: Option<OrganizationRole>,
    ) -> SpaceResult<OrganizationRole> {
        match self.organizations.membership_role(org_id, target).await? {
            Some(role) => Ok(role),
            None => {
                policy::require_member_manager(actor_role)?;
                Err(SpaceError::NotFound(format!("user {target} is not a member of {org_id}")))
            }
        }
    }

    fn authorize(
        &self,
        actor_role: Option<OrganizationRole>,
        action: OrganizationAction,
        actor: &UserId,
    ) -> SpaceResult<()> {
        policy::authorize(actor_role, &action).inspect_err(|e| {
            if matches!(e, SpaceError::Forbidden(_)) {
                space_metrics::record_counter(space_metrics::ORG_DENIED, 1);
            }
            tracing::warn!(actor_id = %actor, action = action.name(), error = %e, "Organization action refused");
        })
    }

    fn applied(&self, action: &'static str, org_id: &OrganizationId, actor: &UserId) {
        space_metrics::record_counter(space_metrics::ORG_MUTATIONS, 1);
        tracing::info!(action = action, org_id = %org_id, actor_id = %actor, "Organization updated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_space::provisioning::LocalTenantProvisioner;
    use crate::core_space::storage::MemoryDirectory;
    use crate::core_space::user::User;

    async fn setup() -> (Arc<MemoryDirectory>, OrganizationManager) {
        let dir = Arc::new(MemoryDirectory::new());
        for id in ["u1", "u2", "u3"] {
            dir.insert_user(User::new(UserId::new(id), format!("{id}@example.com"), "", id)).await;
        }
        let manager = OrganizationManager::new(
            dir.clone(),
            dir.clone(),
            Arc::new(LocalTenantProvisioner::new()),
            ProvisioningConfig::default(),
        );
        (dir, manager)
    }

    #[tokio::test]
    async fn test_creator_becomes_owner() {
        let (dir, manager) = setup().await;
        let u1 = UserId::new("u1");
        let org = manager
            .create_organization(&u1, "acme", "Acme", OrganizationVisibility::Private)
            .await
            .unwrap();
        assert_eq!(dir.membership_role(&org.id, &u1).await.unwrap(), Some(OrganizationRole::Owner));
    }

    #[tokio::test]
    async fn test_create_rejects_bad_input_and_unknown_actor() {
        let (_dir, manager) = setup().await;
        let u1 = UserId::new("u1");
        assert!(matches!(
            manager.create_organization(&u1, "Bad Slug", "Acme", OrganizationVisibility::Public).await,
            Err(SpaceError::BadRequest(_))
        ));
        assert!(matches!(
            manager
                .create_organization(&UserId::new("ghost"), "acme", "Acme", OrganizationVisibility::Public)
                .await,
            Err(SpaceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_last_owner_cannot_step_down() {
        let (_dir, manager) = setup().await;
        let u1 = UserId::new("u1");
        let org = manager
            .create_organization(&u1, "acme", "Acme", OrganizationVisibility::Public)
            .await
            .unwrap();

        let result = manager.update_member_role(&u1, &org.id, &u1, OrganizationRole::Admin).await;
        assert!(matches!(result, Err(SpaceError::Conflict(_))));
        let result = manager.remove_member(&u1, &org.id, &u1).await;
        assert!(matches!(result, Err(SpaceError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_denied_mutation_leaves_store_untouched() {
        let (dir, manager) = setup().await;
        let (u1, u2, u3) = (UserId::new("u1"), UserId::new("u2"), UserId::new("u3"));
        let org = manager
            .create_organization(&u1, "acme", "Acme", OrganizationVisibility::Public)
            .await
            .unwrap();
        manager.invite_member(&u1, &org.id, &u2, OrganizationRole::Member).await.unwrap();

        let result = manager.invite_member(&u2, &org.id, &u3, OrganizationRole::Viewer).await;
        assert!(matches!(result, Err(SpaceError::Forbidden(_))));
        assert_eq!(dir.membership_role(&org.id, &u3).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_target_is_not_found_for_managers_only() {
        let (_dir, manager) = setup().await;
        let (u1, u2) = (UserId::new("u1"), UserId::new("u2"));
        let org = manager
            .create_organization(&u1, "acme", "Acme", OrganizationVisibility::Public)
            .await
            .unwrap();

        let as_owner = manager.remove_member(&u1, &org.id, &UserId::new("u3")).await;
        assert!(matches!(as_owner, Err(SpaceError::NotFound(_))));

        let as_outsider = manager.remove_member(&u2, &org.id, &UserId::new("u3")).await;
        assert!(matches!(as_outsider, Err(SpaceError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_provision_tenant_bind_failure_leaves_org_unbound() {
        let (dir, manager) = setup().await;
        let u1 = UserId::new("u1");
        let org = manager
            .create_organization(&u1, "acme", "Acme", OrganizationVisibility::Public)
            .await
            .unwrap();

        dir.set_fail_binds(true);
        let result = manager.provision_organization_tenant(&u1, &org.id).await;
        assert!(matches!(result, Err(SpaceError::Database(_))));

        dir.set_fail_binds(false);
        assert!(dir.get_organization(&org.id, &u1).await.unwrap().tenant.is_none());
        assert!(manager.provision_organization_tenant(&u1, &org.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_provision_tenant_once() {
        let (_dir, manager) = setup().await;
        let u1 = UserId::new("u1");
        let org = manager
            .create_organization(&u1, "acme", "Acme", OrganizationVisibility::Public)
            .await
            .unwrap();

        let binding = manager.provision_organization_tenant(&u1, &org.id).await.unwrap();
        assert!(binding.tenant_id.as_str().starts_with("tenant_"));

        let again = manager.provision_organization_tenant(&u1, &org.id).await;
        assert!(matches!(again, Err(SpaceError::Conflict(_))));
    }
}
