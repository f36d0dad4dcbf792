//! Space listing with lazy personal tenant provisioning
//!
//! Listing is best-effort: a user whose personal tenant cannot be set up
//! still gets their organization spaces, and an organization store outage
//! yields an empty organization list rather than an error.
//!
//! Provisioning for one user is serialized twice over. A per-user lock keeps
//! concurrent listings in this process from provisioning in parallel, and
//! the conditional bind in the identity store settles races between
//! processes. A tenant that loses the bind is logged as orphaned.

use super::errors::{SpaceError, SpaceResult};
use super::provisioning::TenantSpec;
use super::role::OrganizationRole;
use super::space::{SpaceInfo, SpaceListing};
use super::store::{BindOutcome, IdentityStore, OrganizationStore, TenantProvisioner};
use super::types::{OrganizationId, TenantBinding, UserId};
use super::user::User;
use crate::config::ProvisioningConfig;
use crate::metrics::{self as space_metrics, Timer};
use crate::telemetry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::Mutex;
use tracing::Instrument;

type PersonalLocks = StdMutex<HashMap<UserId, Arc<Mutex<()>>>>;

/// Holds a user's provisioning lock and drops the map entry once no other
/// caller is waiting on it, including when the owning future is cancelled
struct PersonalLockLease<'a> {
    locks: &'a PersonalLocks,
    user_id: UserId,
    lock: Arc<Mutex<()>>,
}

impl<'a> PersonalLockLease<'a> {
    fn acquire(locks: &'a PersonalLocks, user_id: &UserId) -> Self {
        let lock = locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(user_id.clone())
            .or_default()
            .clone();
        Self { locks, user_id: user_id.clone(), lock }
    }
}

impl Drop for PersonalLockLease<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the map and this lease still hold it
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.user_id);
        }
    }
}

/// Lists the spaces visible to a user
pub struct SpaceEnumerator {
    identity: Arc<dyn IdentityStore>,
    organizations: Arc<dyn OrganizationStore>,
    provisioner: Arc<dyn TenantProvisioner>,
    config: ProvisioningConfig,
    personal_locks: PersonalLocks,
}

impl SpaceEnumerator {
    pub fn new(
        identity: Arc<dyn IdentityStore>,
        organizations: Arc<dyn OrganizationStore>,
        provisioner: Arc<dyn TenantProvisioner>,
        config: ProvisioningConfig,
    ) -> Self {
        Self { identity, organizations, provisioner, config, personal_locks: StdMutex::new(HashMap::new()) }
    }

    /// Personal space first (if any), then organization spaces in store order.
    ///
    /// Fails only if the user cannot be fetched.
    pub async fn list_spaces(&self, user_id: &UserId) -> SpaceResult<SpaceListing> {
        let timer = Timer::new(space_metrics::LIST_DURATION);
        let op = telemetry::space::trace_list(user_id.as_str());

        let result = self.list_spaces_inner(user_id).instrument(op.span().clone()).await;
        timer.stop();

        match &result {
            Ok(listing) => {
                tracing::debug!(user_id = %user_id, spaces = listing.len(), "Listed spaces");
                op.complete();
            }
            Err(e) => op.record_error(e),
        }
        result
    }

    async fn list_spaces_inner(&self, user_id: &UserId) -> SpaceResult<SpaceListing> {
        let user = self.identity.get_user_by_id(user_id).await?;
        let personal = self.personal_space(&user).await;
        let organizations = self.organization_spaces(user_id).await;
        Ok(SpaceListing { personal, organizations })
    }

    async fn personal_space(&self, user: &User) -> Option<SpaceInfo> {
        let binding = match &user.personal_tenant {
            Some(binding) => binding.clone(),
            None if self.config.lazy_personal_tenants => match self.ensure_personal_tenant(user).await {
                Ok(binding) => binding,
                Err(e) => {
                    space_metrics::record_counter(space_metrics::PROVISION_FAILED, 1);
                    tracing::warn!(
                        user_id = %user.id,
                        error = %e,
                        "Personal tenant provisioning failed, omitting personal space"
                    );
                    return None;
                }
            },
            None => return None,
        };

        let info = SpaceInfo::personal(user, &binding);
        if info.is_none() {
            tracing::warn!(
                user_id = %user.id,
                tenant_id = %binding.tenant_id,
                "Personal tenant id is malformed, omitting personal space"
            );
        }
        info
    }

    /// Return the user's personal tenant, provisioning and binding one if absent.
    ///
    /// Provisioner and store errors propagate; callers that list spaces
    /// swallow them.
    pub async fn ensure_personal_tenant(&self, user: &User) -> SpaceResult<TenantBinding> {
        if let Some(binding) = &user.personal_tenant {
            return Ok(binding.clone());
        }

        let lease = PersonalLockLease::acquire(&self.personal_locks, &user.id);
        let _guard = lease.lock.lock().await;
        self.provision_locked(&user.id).await
    }

    #[cfg(test)]
    fn personal_lock_count(&self) -> usize {
        self.personal_locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    async fn provision_locked(&self, user_id: &UserId) -> SpaceResult<TenantBinding> {
        // Someone may have bound a tenant while we waited for the lock
        let user = self.identity.get_user_by_id(user_id).await?;
        if let Some(binding) = user.personal_tenant {
            return Ok(binding);
        }

        let op = telemetry::space::trace_provision(user_id.as_str());
        let spec = TenantSpec::personal(&user, &self.config);
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

        if binding.tenant_id.personal_space_id().is_none() {
            let err = SpaceError::ExternalService(format!(
                "provisioner returned malformed personal tenant id '{}'",
                binding.tenant_id
            ));
            op.record_error(&err);
            return Err(err);
        }

        let outcome = match self.identity.bind_personal_tenant_if_absent(user_id, &binding).await {
            Ok(outcome) => outcome,
            Err(e) => {
                // Provisioned but never bound
                space_metrics::record_counter(space_metrics::PROVISION_ORPHANED, 1);
                tracing::warn!(
                    user_id = %user_id,
                    orphaned_tenant_id = %binding.tenant_id,
                    error = %e,
                    "Failed to persist personal tenant binding"
                );
                op.record_error(&e);
                return Err(e);
            }
        };

        match outcome {
            BindOutcome::Bound => {
                space_metrics::record_counter(space_metrics::PROVISION_SUCCESS, 1);
                tracing::info!(
                    user_id = %user_id,
                    tenant_id = %binding.tenant_id,
                    "Provisioned personal tenant"
                );
                op.complete();
                Ok(binding)
            }
            BindOutcome::AlreadyBound(existing) => {
                space_metrics::record_counter(space_metrics::PROVISION_ORPHANED, 1);
                tracing::warn!(
                    user_id = %user_id,
                    orphaned_tenant_id = %binding.tenant_id,
                    bound_tenant_id = %existing.tenant_id,
                    "Lost personal tenant bind race, tenant orphaned"
                );
                op.complete();
                Ok(existing)
            }
        }
    }

    /// Organization spaces for `user_id`. Never fails.
    pub async fn organization_spaces(&self, user_id: &UserId) -> Vec<SpaceInfo> {
        let organizations = match self.organizations.list_user_organizations(user_id).await {
            Ok(orgs) => orgs,
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Failed to list organizations");
                return Vec::new();
            }
        };

        let mut spaces = Vec::with_capacity(organizations.len());
        for org in organizations {
            let Some(binding) = &org.tenant else {
                continue;
            };
            match self.caller_role(&org.id, user_id).await {
                Some(role) => spaces.push(SpaceInfo::organization(&org, binding, role)),
                None => {
                    tracing::debug!(user_id = %user_id, org_id = %org.id, "No resolvable role, skipping");
                }
            }
        }
        spaces
    }

    async fn caller_role(&self, org_id: &OrganizationId, user_id: &UserId) -> Option<OrganizationRole> {
        match self.organizations.get_organization_members(org_id, user_id).await {
            Ok(members) => members.into_iter().find(|m| &m.user_id == user_id).map(|m| m.role),
            Err(e) => {
                tracing::debug!(org_id = %org_id, error = %e, "Member lookup failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ScriptedProvisioner, TestUserBuilder, TestWorld};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_provisioning_releases_lock_entry() {
        let world = TestWorld::with_provisioner(ScriptedProvisioner::new().with_delay(Duration::from_secs(60)));
        let user = world.add_user(TestUserBuilder::new("u1")).await;
        let enumerator = world.enumerator();

        let timed_out =
            tokio::time::timeout(Duration::from_millis(50), enumerator.ensure_personal_tenant(&user)).await;
        assert!(timed_out.is_err());
        assert_eq!(world.provisioner.calls(), 1);
        assert_eq!(enumerator.personal_lock_count(), 0);
    }

    #[tokio::test]
    async fn test_lock_entry_released_after_provisioning() {
        let world = TestWorld::new();
        let user = world.add_user(TestUserBuilder::new("u1")).await;
        let enumerator = world.enumerator();

        let binding = enumerator.ensure_personal_tenant(&user).await.unwrap();
        assert!(binding.tenant_id.as_str().starts_with("tenant_"));
        assert_eq!(enumerator.personal_lock_count(), 0);
    }
}
