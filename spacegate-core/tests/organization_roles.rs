//! Organization role management integration tests
//!
//! Covers:
//! - owner/admin/member/viewer gates on membership changes
//! - last-owner protection, including concurrent demotions
//! - resolution reflecting role changes and removal
//! - organization tenant provisioning

use async_trait::async_trait;
use spacegate_core::core_space::{
    BindOutcome, Capability, MemoryDirectory, Organization, OrganizationId, OrganizationManager,
    OrganizationMembership, OrganizationRole, OrganizationStore, OrganizationUpdate, OrganizationVisibility,
    SpaceResult, TenantBinding, UserId,
};
use spacegate_core::test_utils::{
    assert_ok, assert_space_error, ScriptedProvisioner, TestOrganizationBuilder, TestUserBuilder, TestWorld,
};
use std::sync::Arc;

/// o1 with tenant, u1 owner, u2 member, u3 admin, u4 viewer, u5 not a member
async fn setup_world() -> TestWorld {
    let world = TestWorld::new();
    for id in ["u1", "u2", "u3", "u4", "u5"] {
        world.add_user(TestUserBuilder::new(id)).await;
    }
    world
        .add_organization(
            TestOrganizationBuilder::new("o1")
                .tenant("tenant_o1")
                .member("u1", OrganizationRole::Owner)
                .member("u2", OrganizationRole::Member)
                .member("u3", OrganizationRole::Admin)
                .member("u4", OrganizationRole::Viewer),
        )
        .await;
    world
}

fn uid(id: &str) -> UserId {
    UserId::new(id)
}

fn o1() -> OrganizationId {
    OrganizationId::new("o1")
}

#[tokio::test]
async fn test_owner_promotes_member_to_admin() {
    let world = setup_world().await;
    let manager = world.manager();
    let resolver = world.resolver();

    let before = assert_ok(resolver.resolve_raw(&uid("u2"), "organization", "o1").await);
    assert!(!before.can(Capability::Admin));

    assert_ok(manager.update_member_role(&uid("u1"), &o1(), &uid("u2"), OrganizationRole::Admin).await);

    let after = assert_ok(resolver.resolve_raw(&uid("u2"), "organization", "o1").await);
    assert_eq!(after.user_role(), OrganizationRole::Admin);
    assert_eq!(after.permissions().names(), vec!["read", "write", "create", "update", "delete"]);
    println!("✓ Promotion visible on next resolve");
}

#[tokio::test]
async fn test_removed_member_loses_access() {
    let world = setup_world().await;
    let manager = world.manager();

    assert_ok(manager.remove_member(&uid("u1"), &o1(), &uid("u2")).await);

    let result = world.resolver().resolve_raw(&uid("u2"), "organization", "o1").await;
    assert_space_error(result, "forbidden");

    let listing = assert_ok(world.enumerator().list_spaces(&uid("u2")).await);
    assert!(listing.organizations.is_empty());
}

#[tokio::test]
async fn test_admin_manages_non_owners_only() {
    let world = setup_world().await;
    let manager = world.manager();

    assert_ok(manager.update_member_role(&uid("u3"), &o1(), &uid("u4"), OrganizationRole::Member).await);
    assert_ok(manager.invite_member(&uid("u3"), &o1(), &uid("u5"), OrganizationRole::Admin).await);

    let result = manager.update_member_role(&uid("u3"), &o1(), &uid("u2"), OrganizationRole::Owner).await;
    assert_space_error(result, "forbidden");

    let result = manager.update_member_role(&uid("u3"), &o1(), &uid("u1"), OrganizationRole::Member).await;
    assert_space_error(result, "forbidden");

    let result = manager.remove_member(&uid("u3"), &o1(), &uid("u1")).await;
    assert_space_error(result, "forbidden");
}

#[tokio::test]
async fn test_members_and_viewers_cannot_manage() {
    let world = setup_world().await;
    let manager = world.manager();

    for actor in ["u2", "u4", "u5"] {
        let result = manager.update_member_role(&uid(actor), &o1(), &uid("u4"), OrganizationRole::Admin).await;
        assert_space_error(result, "forbidden");

        let result = manager.remove_member(&uid(actor), &o1(), &uid("u2")).await;
        assert_space_error(result, "forbidden");

        // Forbidden wins over the target not being a member
        let result = manager.remove_member(&uid(actor), &o1(), &uid("ghost")).await;
        assert_space_error(result, "forbidden");
    }
}

#[tokio::test]
async fn test_inviting_existing_member_conflicts() {
    let world = setup_world().await;
    let result = world.manager().invite_member(&uid("u1"), &o1(), &uid("u2"), OrganizationRole::Viewer).await;
    assert_space_error(result, "conflict");
}

#[tokio::test]
async fn test_inviting_unknown_user_is_not_found() {
    let world = setup_world().await;
    let result = world.manager().invite_member(&uid("u1"), &o1(), &uid("ghost"), OrganizationRole::Member).await;
    assert_space_error(result, "not_found");
}

#[tokio::test]
async fn test_invited_member_resolves_with_invited_role() {
    let world = setup_world().await;
    let membership =
        assert_ok(world.manager().invite_member(&uid("u1"), &o1(), &uid("u5"), OrganizationRole::Viewer).await);
    assert_eq!(membership.invited_by, Some(uid("u1")));

    let ctx = assert_ok(world.resolver().resolve_raw(&uid("u5"), "organization", "o1").await);
    assert_eq!(ctx.user_role(), OrganizationRole::Viewer);
}

#[tokio::test]
async fn test_last_owner_is_protected() {
    let world = setup_world().await;
    let manager = world.manager();

    let result = manager.update_member_role(&uid("u1"), &o1(), &uid("u1"), OrganizationRole::Admin).await;
    assert_space_error(result, "conflict");
    let result = manager.remove_member(&uid("u1"), &o1(), &uid("u1")).await;
    assert_space_error(result, "conflict");

    // With a second owner the first may step down
    assert_ok(manager.update_member_role(&uid("u1"), &o1(), &uid("u2"), OrganizationRole::Owner).await);
    assert_ok(manager.update_member_role(&uid("u1"), &o1(), &uid("u1"), OrganizationRole::Admin).await);

    let members = assert_ok(manager.list_members(&uid("u2"), &o1()).await);
    let owners: Vec<_> = members.iter().filter(|m| m.role == OrganizationRole::Owner).collect();
    assert_eq!(owners.len(), 1);
    assert_eq!(owners[0].user_id, uid("u2"));
}

/// Directory that yields to the scheduler before every call, so two
/// mutations driven together interleave between their reads and writes
struct InterleavingDirectory {
    inner: Arc<MemoryDirectory>,
}

#[async_trait]
impl OrganizationStore for InterleavingDirectory {
    async fn get_organization(&self, org_id: &OrganizationId, caller_id: &UserId) -> SpaceResult<Organization> {
        tokio::task::yield_now().await;
        self.inner.get_organization(org_id, caller_id).await
    }

    async fn get_organization_members(
        &self,
        org_id: &OrganizationId,
        caller_id: &UserId,
    ) -> SpaceResult<Vec<OrganizationMembership>> {
        tokio::task::yield_now().await;
        self.inner.get_organization_members(org_id, caller_id).await
    }

    async fn membership_role(
        &self,
        org_id: &OrganizationId,
        user_id: &UserId,
    ) -> SpaceResult<Option<OrganizationRole>> {
        tokio::task::yield_now().await;
        self.inner.membership_role(org_id, user_id).await
    }

    async fn list_user_organizations(&self, user_id: &UserId) -> SpaceResult<Vec<Organization>> {
        tokio::task::yield_now().await;
        self.inner.list_user_organizations(user_id).await
    }

    async fn create_organization(&self, org: &Organization, owner: &OrganizationMembership) -> SpaceResult<()> {
        tokio::task::yield_now().await;
        self.inner.create_organization(org, owner).await
    }

    async fn update_organization(&self, org: &Organization) -> SpaceResult<()> {
        tokio::task::yield_now().await;
        self.inner.update_organization(org).await
    }

    async fn delete_organization(&self, org_id: &OrganizationId) -> SpaceResult<()> {
        tokio::task::yield_now().await;
        self.inner.delete_organization(org_id).await
    }

    async fn add_member(&self, membership: &OrganizationMembership) -> SpaceResult<()> {
        tokio::task::yield_now().await;
        self.inner.add_member(membership).await
    }

    async fn set_member_role_keeping_owner(
        &self,
        org_id: &OrganizationId,
        user_id: &UserId,
        role: OrganizationRole,
    ) -> SpaceResult<()> {
        tokio::task::yield_now().await;
        self.inner.set_member_role_keeping_owner(org_id, user_id, role).await
    }

    async fn remove_member_keeping_owner(&self, org_id: &OrganizationId, user_id: &UserId) -> SpaceResult<()> {
        tokio::task::yield_now().await;
        self.inner.remove_member_keeping_owner(org_id, user_id).await
    }

    async fn bind_organization_tenant_if_absent(
        &self,
        org_id: &OrganizationId,
        binding: &TenantBinding,
    ) -> SpaceResult<BindOutcome> {
        tokio::task::yield_now().await;
        self.inner.bind_organization_tenant_if_absent(org_id, binding).await
    }
}

fn interleaving_manager(world: &TestWorld) -> OrganizationManager {
    OrganizationManager::new(
        world.directory.clone(),
        Arc::new(InterleavingDirectory { inner: world.directory.clone() }),
        world.provisioner.clone(),
        world.config.clone(),
    )
}

async fn owners_of_o1(world: &TestWorld) -> Vec<UserId> {
    let mut owners = Vec::new();
    for id in ["u1", "u2", "u3", "u4"] {
        if world.directory.membership_role(&o1(), &uid(id)).await.unwrap() == Some(OrganizationRole::Owner) {
            owners.push(uid(id));
        }
    }
    owners
}

#[tokio::test]
async fn test_concurrent_owner_demotions_keep_an_owner() {
    let world = setup_world().await;
    let manager = interleaving_manager(&world);
    assert_ok(manager.update_member_role(&uid("u1"), &o1(), &uid("u2"), OrganizationRole::Owner).await);

    let (u1, u2, org) = (uid("u1"), uid("u2"), o1());
    let (first, second) = tokio::join!(
        manager.update_member_role(&u1, &org, &u2, OrganizationRole::Admin),
        manager.update_member_role(&u2, &org, &u1, OrganizationRole::Admin),
    );

    assert_eq!(owners_of_o1(&world).await.len(), 1);
    assert!(first.is_ok() != second.is_ok(), "exactly one demotion should land");
    assert_space_error(first.and(second), "conflict");
}

#[tokio::test]
async fn test_concurrent_owner_removals_keep_an_owner() {
    let world = setup_world().await;
    let manager = interleaving_manager(&world);
    assert_ok(manager.update_member_role(&uid("u1"), &o1(), &uid("u2"), OrganizationRole::Owner).await);

    let (u1, u2, org) = (uid("u1"), uid("u2"), o1());
    let (first, second) = tokio::join!(
        manager.remove_member(&u1, &org, &u2),
        manager.remove_member(&u2, &org, &u1),
    );

    assert_eq!(owners_of_o1(&world).await.len(), 1);
    assert!(first.is_ok() != second.is_ok(), "exactly one removal should land");
    assert_space_error(first.and(second), "conflict");
}

#[tokio::test]
async fn test_member_list_is_members_only() {
    let world = setup_world().await;
    let members = assert_ok(world.manager().list_members(&uid("u4"), &o1()).await);
    assert_eq!(members.len(), 4);

    let result = world.manager().list_members(&uid("u5"), &o1()).await;
    assert_space_error(result, "forbidden");
}

#[tokio::test]
async fn test_create_update_delete_lifecycle() {
    let world = TestWorld::new();
    world.add_user(TestUserBuilder::new("u1")).await;
    world.add_user(TestUserBuilder::new("u2")).await;
    let manager = world.manager();

    let org = assert_ok(
        manager.create_organization(&uid("u1"), "acme-labs", "Acme Labs", OrganizationVisibility::Private).await,
    );
    assert_ok(manager.invite_member(&uid("u1"), &org.id, &uid("u2"), OrganizationRole::Member).await);

    let result = manager
        .create_organization(&uid("u2"), "acme-labs", "Another", OrganizationVisibility::Public)
        .await;
    assert_space_error(result, "conflict");

    let update = OrganizationUpdate { name: Some("Acme Laboratories".to_string()), visibility: None };
    let result = manager.update_organization(&uid("u2"), &org.id, update.clone()).await;
    assert_space_error(result, "forbidden");
    let updated = assert_ok(manager.update_organization(&uid("u1"), &org.id, update).await);
    assert_eq!(updated.name, "Acme Laboratories");

    let result = manager.delete_organization(&uid("u2"), &org.id).await;
    assert_space_error(result, "forbidden");
    assert_ok(manager.delete_organization(&uid("u1"), &org.id).await);

    let listing = assert_ok(world.enumerator().list_spaces(&uid("u2")).await);
    assert!(listing.organizations.is_empty());
}

#[tokio::test]
async fn test_invalid_organization_input_is_bad_request() {
    let world = TestWorld::new();
    world.add_user(TestUserBuilder::new("u1")).await;
    let manager = world.manager();

    let result = manager.create_organization(&uid("u1"), "Bad Slug", "Name", OrganizationVisibility::Public).await;
    assert_space_error(result, "bad_request");
    let result = manager.create_organization(&uid("u1"), "ok-slug", "   ", OrganizationVisibility::Public).await;
    assert_space_error(result, "bad_request");
}

#[tokio::test]
async fn test_provisioned_organization_becomes_resolvable() {
    let world = TestWorld::with_provisioner(ScriptedProvisioner::with_tenant_ids(["tenant_org1"]));
    world.add_user(TestUserBuilder::new("u1")).await;
    world.add_user(TestUserBuilder::new("u2")).await;
    let manager = world.manager();
    let resolver = world.resolver();

    let org = assert_ok(
        manager.create_organization(&uid("u1"), "acme", "Acme", OrganizationVisibility::Private).await,
    );
    assert_ok(manager.invite_member(&uid("u1"), &org.id, &uid("u2"), OrganizationRole::Admin).await);

    let result = resolver.resolve_raw(&uid("u1"), "organization", org.id.as_str()).await;
    assert_space_error(result, "not_found");

    // Admins cannot provision
    let result = manager.provision_organization_tenant(&uid("u2"), &org.id).await;
    assert_space_error(result, "forbidden");

    let binding = assert_ok(manager.provision_organization_tenant(&uid("u1"), &org.id).await);
    assert_eq!(binding.tenant_id.as_str(), "tenant_org1");

    let requests = world.provisioner.requests().await;
    assert_eq!(requests.last().map(|spec| spec.name.as_str()), Some("org-acme"));

    let ctx = assert_ok(resolver.resolve_raw(&uid("u2"), "organization", org.id.as_str()).await);
    assert_eq!(ctx.tenant_id().as_str(), "tenant_org1");
    assert_eq!(ctx.user_role(), OrganizationRole::Admin);

    let result = manager.provision_organization_tenant(&uid("u1"), &org.id).await;
    assert_space_error(result, "conflict");
}

#[tokio::test]
async fn test_member_cannot_promote_self_but_owner_can() {
    let world = TestWorld::new();
    world.add_user(TestUserBuilder::new("u1")).await;
    world.add_user(TestUserBuilder::new("u2")).await;
    world
        .add_organization(
            TestOrganizationBuilder::new("o1")
                .member("u1", OrganizationRole::Owner)
                .member("u2", OrganizationRole::Member),
        )
        .await;
    let manager = world.manager();

    let result = manager.update_member_role(&uid("u2"), &o1(), &uid("u2"), OrganizationRole::Admin).await;
    assert_space_error(result, "forbidden");
    assert_eq!(
        assert_ok(world.directory.membership_role(&o1(), &uid("u2")).await),
        Some(OrganizationRole::Member)
    );

    assert_ok(manager.update_member_role(&uid("u1"), &o1(), &uid("u2"), OrganizationRole::Admin).await);
    assert_eq!(
        assert_ok(world.directory.membership_role(&o1(), &uid("u2")).await),
        Some(OrganizationRole::Admin)
    );
}

#[tokio::test]
async fn test_failed_organization_provisioning_leaves_org_unbound() {
    let world = TestWorld::with_provisioner(ScriptedProvisioner::failing());
    world.add_user(TestUserBuilder::new("u1")).await;
    let manager = world.manager();
    let org = assert_ok(
        manager.create_organization(&uid("u1"), "acme", "Acme", OrganizationVisibility::Public).await,
    );

    let result = manager.provision_organization_tenant(&uid("u1"), &org.id).await;
    assert_space_error(result, "external_service");
    assert_eq!(world.provisioner.calls(), 1);

    // Provisioned, then the bind write fails: the tenant is orphaned
    world.provisioner.set_failing(false);
    world.directory.set_fail_binds(true);
    let result = manager.provision_organization_tenant(&uid("u1"), &org.id).await;
    assert_space_error(result, "database");
    assert_eq!(world.provisioner.calls(), 2);

    world.directory.set_fail_binds(false);
    let stored = assert_ok(world.directory.get_organization(&org.id, &uid("u1")).await);
    assert!(stored.tenant.is_none());
}
