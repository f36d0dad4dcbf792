//! Builders for users, organizations and wired-up components
//!
//! [`TestWorld`] bundles an in-memory directory, a scripted provisioner and
//! the resolver, enumerator and manager built on top of them.

use super::doubles::ScriptedProvisioner;
use crate::config::ProvisioningConfig;
use crate::core_space::enumerator::SpaceEnumerator;
use crate::core_space::manager::OrganizationManager;
use crate::core_space::organization::{Organization, OrganizationMembership, OrganizationVisibility};
use crate::core_space::resolver::SpaceResolver;
use crate::core_space::role::OrganizationRole;
use crate::core_space::storage::MemoryDirectory;
use crate::core_space::types::{ApiKey, OrganizationId, TenantBinding, TenantId, UserId};
use crate::core_space::user::User;
use std::sync::Arc;

/// Binding with a deterministic api key derived from the tenant id
pub fn test_binding(tenant_id: &str) -> TenantBinding {
    TenantBinding::new(TenantId::new(tenant_id), ApiKey::new(format!("sk_test_{tenant_id}")))
}

/// Builder for test users
pub struct TestUserBuilder {
    user: User,
}

impl TestUserBuilder {
    pub fn new(id: &str) -> Self {
        Self { user: User::new(UserId::new(id), format!("{id}@example.com"), "", id) }
    }

    pub fn full_name(mut self, name: &str) -> Self {
        self.user.full_name = name.to_string();
        self
    }

    pub fn username(mut self, username: &str) -> Self {
        self.user.username = username.to_string();
        self
    }

    pub fn personal_tenant(mut self, tenant_id: &str) -> Self {
        self.user.personal_tenant = Some(test_binding(tenant_id));
        self
    }

    pub fn build(self) -> User {
        self.user
    }
}

/// Builder for test organizations and their members
pub struct TestOrganizationBuilder {
    org: Organization,
    members: Vec<(UserId, OrganizationRole)>,
}

impl TestOrganizationBuilder {
    /// Organization whose id is exactly `id`; slug and name derive from it
    pub fn new(id: &str) -> Self {
        let slug: String = id
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        let mut org = Organization::new(slug, format!("Org {id}"), OrganizationVisibility::Private);
        org.id = OrganizationId::new(id);
        Self { org, members: Vec::new() }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.org.name = name.to_string();
        self
    }

    pub fn tenant(mut self, tenant_id: &str) -> Self {
        self.org.tenant = Some(test_binding(tenant_id));
        self
    }

    pub fn member(mut self, user_id: &str, role: OrganizationRole) -> Self {
        self.members.push((UserId::new(user_id), role));
        self
    }

    pub fn build(self) -> Organization {
        self.org
    }

    /// Insert the organization and its memberships into `directory`
    pub async fn seed(self, directory: &MemoryDirectory) -> Organization {
        directory.insert_organization(self.org.clone()).await;
        for (user_id, role) in self.members {
            directory
                .insert_membership(OrganizationMembership::new(self.org.id.clone(), user_id, role))
                .await;
        }
        self.org
    }
}

/// In-memory directory plus components wired to it
pub struct TestWorld {
    pub directory: Arc<MemoryDirectory>,
    pub provisioner: Arc<ScriptedProvisioner>,
    pub config: ProvisioningConfig,
}

impl TestWorld {
    pub fn new() -> Self {
        Self::with_provisioner(ScriptedProvisioner::new())
    }

    pub fn with_provisioner(provisioner: ScriptedProvisioner) -> Self {
        Self {
            directory: Arc::new(MemoryDirectory::new()),
            provisioner: Arc::new(provisioner),
            config: ProvisioningConfig::default(),
        }
    }

    pub async fn add_user(&self, builder: TestUserBuilder) -> User {
        let user = builder.build();
        self.directory.insert_user(user.clone()).await;
        user
    }

    pub async fn add_organization(&self, builder: TestOrganizationBuilder) -> Organization {
        builder.seed(&self.directory).await
    }

    pub fn resolver(&self) -> SpaceResolver {
        SpaceResolver::new(self.directory.clone(), self.directory.clone())
    }

    pub fn enumerator(&self) -> SpaceEnumerator {
        SpaceEnumerator::new(
            self.directory.clone(),
            self.directory.clone(),
            self.provisioner.clone(),
            self.config.clone(),
        )
    }

    pub fn manager(&self) -> OrganizationManager {
        OrganizationManager::new(
            self.directory.clone(),
            self.directory.clone(),
            self.provisioner.clone(),
            self.config.clone(),
        )
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_space::store::OrganizationStore;

    #[tokio::test]
    async fn test_world_seeding() {
        let world = TestWorld::new();
        world.add_user(TestUserBuilder::new("u1").full_name("Una")).await;
        let org = world
            .add_organization(
                TestOrganizationBuilder::new("o1").tenant("tenant_o1").member("u1", OrganizationRole::Admin),
            )
            .await;

        assert_eq!(org.id.as_str(), "o1");
        let role = world.directory.membership_role(&org.id, &UserId::new("u1")).await.unwrap();
        assert_eq!(role, Some(OrganizationRole::Admin));
    }
}
