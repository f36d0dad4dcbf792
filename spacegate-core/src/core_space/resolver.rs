//! Per-request space resolution
//!
//! [`SpaceResolver::resolve`] turns a user id and a space selector into a
//! [`SpaceContext`]: the tenant binding to use, the caller's role and the
//! capabilities that role grants. Lookups are read-only and never retried.

use super::errors::{SpaceError, SpaceResult};
use super::role::{OrganizationRole, PermissionSet};
use super::space::{personal_space_name, SpaceContext, SpaceSelector, SpaceType};
use super::store::{IdentityStore, OrganizationStore};
use super::types::UserId;
use crate::metrics::{self as space_metrics, Timer};
use crate::telemetry;
use std::sync::Arc;
use tracing::Instrument;

/// Resolves space selectors against the identity and organization stores
#[derive(Clone)]
pub struct SpaceResolver {
    identity: Arc<dyn IdentityStore>,
    organizations: Arc<dyn OrganizationStore>,
}

impl SpaceResolver {
    pub fn new(identity: Arc<dyn IdentityStore>, organizations: Arc<dyn OrganizationStore>) -> Self {
        Self { identity, organizations }
    }

    /// Resolve a raw `(type, id)` pair; an unknown type is `BadRequest`
    pub async fn resolve_raw(
        &self,
        user_id: &UserId,
        space_type: &str,
        space_id: &str,
    ) -> SpaceResult<SpaceContext> {
        let selector = SpaceSelector::parse(space_type, space_id)?;
        self.resolve(user_id, &selector).await
    }

    /// Resolve `selector` for `user_id`.
    ///
    /// Personal spaces only resolve for the exact space id derived from the
    /// user's own tenant; anything else is `Forbidden`. Organization spaces
    /// need a provisioned tenant (`NotFound` otherwise) and a membership
    /// (`Forbidden` otherwise).
    pub async fn resolve(&self, user_id: &UserId, selector: &SpaceSelector) -> SpaceResult<SpaceContext> {
        space_metrics::record_counter(space_metrics::RESOLVE_TOTAL, 1);
        let timer = Timer::new(space_metrics::RESOLVE_DURATION);
        let op = telemetry::space::trace_resolve(
            user_id.as_str(),
            selector.space_type.as_str(),
            selector.space_id.as_str(),
        );

        let result = match selector.space_type {
            SpaceType::Personal => self.resolve_personal(user_id, selector).instrument(op.span().clone()).await,
            SpaceType::Organization => {
                self.resolve_organization(user_id, selector).instrument(op.span().clone()).await
            }
        };
        timer.stop();

        match &result {
            Ok(ctx) => {
                tracing::debug!(
                    user_id = %user_id,
                    space_id = %ctx.space_id(),
                    tenant_id = %ctx.tenant_id(),
                    role = %ctx.user_role(),
                    "Resolved space"
                );
                op.complete();
            }
            Err(e) => {
                if e.is_denial() {
                    space_metrics::record_counter(space_metrics::RESOLVE_DENIED, 1);
                }
                op.record_error(e);
            }
        }
        result
    }

    async fn resolve_personal(&self, user_id: &UserId, selector: &SpaceSelector) -> SpaceResult<SpaceContext> {
        let user = self.identity.get_user_by_id(user_id).await?;

        let Some(binding) = user.personal_tenant.clone() else {
            return Err(SpaceError::NotFound(format!("user {user_id} has no personal space")));
        };

        let expected = binding.tenant_id.personal_space_id().ok_or_else(|| {
            SpaceError::Database(format!(
                "user {user_id} is bound to malformed personal tenant id '{}'",
                binding.tenant_id
            ))
        })?;

        if expected != selector.space_id {
            tracing::warn!(
                user_id = %user_id,
                requested = %selector.space_id,
                "Personal space id does not belong to caller"
            );
            return Err(SpaceError::Forbidden(format!(
                "space {} is not the personal space of {user_id}",
                selector.space_id
            )));
        }

        Ok(SpaceContext::new(
            selector.clone(),
            binding,
            user_id.clone(),
            OrganizationRole::Owner,
            personal_space_name(&user),
            PermissionSet::personal(),
        ))
    }

    async fn resolve_organization(
        &self,
        user_id: &UserId,
        selector: &SpaceSelector,
    ) -> SpaceResult<SpaceContext> {
        let org_id = selector.space_id.to_organization_id();
        let org = self.organizations.get_organization(&org_id, user_id).await?;

        // Unprovisioned organizations are NotFound even for members
        let Some(binding) = org.tenant.clone() else {
            return Err(SpaceError::NotFound(format!("organization {org_id} has no tenant")));
        };

        let members = self.organizations.get_organization_members(&org_id, user_id).await?;
        let role = members
            .iter()
            .find(|m| &m.user_id == user_id)
            .map(|m| m.role)
            .ok_or_else(|| {
                SpaceError::Forbidden(format!("user {user_id} is not a member of {org_id}"))
            })?;

        Ok(SpaceContext::new(
            selector.clone(),
            binding,
            user_id.clone(),
            role,
            org.name,
            role.permissions(),
        ))
    }
}
