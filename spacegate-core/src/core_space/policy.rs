//! Role policy for organization management
//!
//! Pure functions: they look only at the actor's role and the roles involved
//! in the change, never at the store.

use super::errors::{SpaceError, SpaceResult};
use super::role::OrganizationRole;

/// A management action gated on the actor's organization role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrganizationAction {
    CreateOrganization,
    UpdateOrganization,
    DeleteOrganization,
    InviteMember {
        existing_role: Option<OrganizationRole>,
        requested: OrganizationRole,
    },
    UpdateMemberRole {
        current: OrganizationRole,
        requested: OrganizationRole,
    },
    RemoveMember {
        target_role: OrganizationRole,
    },
    ProvisionTenant,
}

impl OrganizationAction {
    pub fn name(&self) -> &'static str {
        match self {
            OrganizationAction::CreateOrganization => "create_organization",
            OrganizationAction::UpdateOrganization => "update_organization",
            OrganizationAction::DeleteOrganization => "delete_organization",
            OrganizationAction::InviteMember { .. } => "invite_member",
            OrganizationAction::UpdateMemberRole { .. } => "update_member_role",
            OrganizationAction::RemoveMember { .. } => "remove_member",
            OrganizationAction::ProvisionTenant => "provision_tenant",
        }
    }
}

/// Check that `actor_role` may perform `action`.
///
/// `None` means the actor is not a member. Role checks come before the
/// duplicate-membership `Conflict`, so outsiders learn nothing about who
/// is already a member.
pub fn authorize(actor_role: Option<OrganizationRole>, action: &OrganizationAction) -> SpaceResult<()> {
    use OrganizationRole::Owner;

    match *action {
        OrganizationAction::CreateOrganization => Ok(()),
        OrganizationAction::UpdateOrganization => require_member_manager(actor_role),
        OrganizationAction::DeleteOrganization | OrganizationAction::ProvisionTenant => {
            require_owner(actor_role, action)
        }
        OrganizationAction::InviteMember { existing_role, requested } => {
            require_member_manager(actor_role)?;
            if requested == Owner {
                require_owner(actor_role, action)?;
            }
            match existing_role {
                Some(role) => Err(SpaceError::Conflict(format!("user is already a {role}"))),
                None => Ok(()),
            }
        }
        OrganizationAction::UpdateMemberRole { current, requested } => {
            require_member_manager(actor_role)?;
            if current == Owner || requested == Owner {
                require_owner(actor_role, action)?;
            }
            Ok(())
        }
        OrganizationAction::RemoveMember { target_role } => {
            require_member_manager(actor_role)?;
            if target_role == Owner {
                require_owner(actor_role, action)?;
            }
            Ok(())
        }
    }
}

/// Owner or admin
pub fn require_member_manager(actor_role: Option<OrganizationRole>) -> SpaceResult<()> {
    match actor_role {
        Some(role) if role.can_manage_members() => Ok(()),
        Some(role) => Err(SpaceError::Forbidden(format!("role '{role}' cannot manage the organization"))),
        None => Err(SpaceError::Forbidden("not a member of the organization".to_string())),
    }
}

fn require_owner(actor_role: Option<OrganizationRole>, action: &OrganizationAction) -> SpaceResult<()> {
    if actor_role == Some(OrganizationRole::Owner) {
        Ok(())
    } else {
        Err(SpaceError::Forbidden(format!("{} requires owner", action.name())))
    }
}
