//! Space enumeration and lazy personal tenant provisioning
//!
//! Covers:
//! - the first listing provisions and binds a personal tenant
//! - later listings reuse the binding
//! - provisioning and persistence failures omit the personal space only
//! - concurrent listings for one user end up with a single bound tenant

use futures::future::join_all;
use spacegate_core::core_space::{
    OrganizationRole, SpaceEnumerator, SpaceId, SpaceSelector, SpaceType, UserId,
};
use spacegate_core::test_utils::{
    assert_err, assert_ok, assert_some, within, ScriptedProvisioner, TestOrganizationBuilder, TestUserBuilder, TestWorld,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_first_listing_provisions_personal_space() {
    let world = TestWorld::with_provisioner(ScriptedProvisioner::with_tenant_ids(["tenant_abc123"]));
    world.add_user(TestUserBuilder::new("u1").username("una").full_name("Una")).await;

    let listing = assert_ok(world.enumerator().list_spaces(&UserId::new("u1")).await);
    let personal = assert_some(listing.personal);
    assert_eq!(personal.space_id.as_str(), "space_abc123");
    assert_eq!(personal.tenant_id.as_str(), "tenant_abc123");
    assert_eq!(personal.role, OrganizationRole::Owner);
    assert_eq!(personal.name, "Una's Space");

    let requests = world.provisioner.requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].name, "personal-una");
    assert_eq!(requests[0].contact_email, "u1@example.com");
    assert_eq!(requests[0].billing_plan, world.config.personal_billing_plan);

    // The fresh binding is usable for direct resolution
    let ctx = assert_ok(
        world
            .resolver()
            .resolve(&UserId::new("u1"), &SpaceSelector::personal(SpaceId::new("space_abc123")))
            .await,
    );
    assert_eq!(ctx.permissions().names(), vec!["read", "write", "create", "update", "delete"]);
}

#[tokio::test]
async fn test_repeated_listing_is_idempotent() {
    let world = TestWorld::new();
    world.add_user(TestUserBuilder::new("u1")).await;
    let enumerator = world.enumerator();

    let first = assert_ok(enumerator.list_spaces(&UserId::new("u1")).await);
    let tenant = assert_some(first.personal).tenant_id;

    for _ in 0..5 {
        let again = assert_ok(enumerator.list_spaces(&UserId::new("u1")).await);
        assert_eq!(assert_some(again.personal).tenant_id, tenant);
    }
    assert_eq!(world.provisioner.calls(), 1);
}

#[tokio::test]
async fn test_bound_user_is_not_provisioned() {
    let world = TestWorld::new();
    world.add_user(TestUserBuilder::new("u1").personal_tenant("tenant_existing")).await;

    let listing = assert_ok(world.enumerator().list_spaces(&UserId::new("u1")).await);
    assert_eq!(assert_some(listing.personal).space_id.as_str(), "space_existing");
    assert_eq!(world.provisioner.calls(), 0);
    assert_eq!(world.directory.bind_calls(), 0);
}

#[tokio::test]
async fn test_provisioner_failure_omits_personal_space() {
    let world = TestWorld::with_provisioner(ScriptedProvisioner::failing());
    world.add_user(TestUserBuilder::new("u1")).await;
    world
        .add_organization(
            TestOrganizationBuilder::new("o1").tenant("tenant_o1").member("u1", OrganizationRole::Member),
        )
        .await;

    let listing = assert_ok(world.enumerator().list_spaces(&UserId::new("u1")).await);
    assert!(listing.personal.is_none());
    assert_eq!(listing.organizations.len(), 1);

    // A later listing retries once the provisioner recovers
    world.provisioner.set_failing(false);
    let listing = assert_ok(world.enumerator().list_spaces(&UserId::new("u1")).await);
    assert!(listing.personal.is_some());
}

#[tokio::test]
async fn test_persist_failure_omits_personal_space() {
    let world = TestWorld::new();
    world.add_user(TestUserBuilder::new("u1")).await;
    world.directory.set_fail_binds(true);

    let listing = assert_ok(world.enumerator().list_spaces(&UserId::new("u1")).await);
    assert!(listing.personal.is_none());
    assert_eq!(world.provisioner.calls(), 1);
}

#[tokio::test]
async fn test_malformed_provisioned_tenant_is_not_bound() {
    let world = TestWorld::with_provisioner(ScriptedProvisioner::with_tenant_ids(["acct-77"]));
    world.add_user(TestUserBuilder::new("u1")).await;

    let listing = assert_ok(world.enumerator().list_spaces(&UserId::new("u1")).await);
    assert!(listing.personal.is_none());
    assert_eq!(world.directory.bind_calls(), 0);
}

#[tokio::test]
async fn test_lazy_provisioning_can_be_disabled() {
    let mut world = TestWorld::new();
    world.config.lazy_personal_tenants = false;
    world.add_user(TestUserBuilder::new("u1")).await;

    let listing = assert_ok(world.enumerator().list_spaces(&UserId::new("u1")).await);
    assert!(listing.personal.is_none());
    assert_eq!(world.provisioner.calls(), 0);
}

#[tokio::test]
async fn test_unknown_user_fails_listing() {
    let world = TestWorld::new();
    let err = assert_err(world.enumerator().list_spaces(&UserId::new("ghost")).await);
    assert_eq!(err.kind(), "not_found");
    assert_eq!(world.provisioner.calls(), 0);
}

#[tokio::test]
async fn test_organization_spaces_in_store_order() {
    let world = TestWorld::new();
    world.add_user(TestUserBuilder::new("u1").personal_tenant("tenant_me")).await;
    for (id, tenant) in [("o3", Some("tenant_o3")), ("o1", None), ("o2", Some("tenant_o2"))] {
        let mut builder = TestOrganizationBuilder::new(id).member("u1", OrganizationRole::Member);
        if let Some(tenant) = tenant {
            builder = builder.tenant(tenant);
        }
        world.add_organization(builder).await;
    }

    let listing = assert_ok(world.enumerator().list_spaces(&UserId::new("u1")).await);
    let ids: Vec<_> = listing.iter().map(|s| s.space_id.as_str().to_string()).collect();
    assert_eq!(ids, vec!["space_me", "o3", "o2"]);
    assert_eq!(listing.iter().next().map(|s| s.space_type), Some(SpaceType::Personal));
}

#[tokio::test]
async fn test_organization_listing_failure_degrades() {
    let world = TestWorld::new();
    world.add_user(TestUserBuilder::new("u1").personal_tenant("tenant_me")).await;
    world
        .add_organization(
            TestOrganizationBuilder::new("o1").tenant("tenant_o1").member("u1", OrganizationRole::Owner),
        )
        .await;
    world.directory.set_fail_org_listing(true);

    let listing = assert_ok(world.enumerator().list_spaces(&UserId::new("u1")).await);
    assert!(listing.personal.is_some());
    assert!(listing.organizations.is_empty());
}

#[tokio::test]
async fn test_concurrent_listings_share_one_tenant() {
    let world = TestWorld::with_provisioner(ScriptedProvisioner::new().with_delay(Duration::from_millis(20)));
    world.add_user(TestUserBuilder::new("u1")).await;
    let enumerator = Arc::new(world.enumerator());

    let handles = (0..8).map(|_| {
        let enumerator = enumerator.clone();
        tokio::spawn(async move {
            let user_id = UserId::new("u1");
            enumerator.list_spaces(&user_id).await
        })
    });
    let results = within(Duration::from_secs(5), join_all(handles)).await;

    let tenants: Vec<_> = results
        .into_iter()
        .map(|joined| assert_some(assert_ok(assert_ok(joined)).personal).tenant_id)
        .collect();
    assert!(tenants.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(world.provisioner.calls(), 1);
}

#[tokio::test]
async fn test_enumerators_racing_across_instances_keep_first_binding() {
    // Two enumerators do not share a lock map, so only the conditional bind
    // stands between them.
    let world = TestWorld::with_provisioner(ScriptedProvisioner::new().with_delay(Duration::from_millis(20)));
    world.add_user(TestUserBuilder::new("u1")).await;
    let a: SpaceEnumerator = world.enumerator();
    let b: SpaceEnumerator = world.enumerator();

    let u1 = UserId::new("u1");
    let (ra, rb) = tokio::join!(a.list_spaces(&u1), b.list_spaces(&u1));
    let ta = assert_some(assert_ok(ra).personal).tenant_id;
    let tb = assert_some(assert_ok(rb).personal).tenant_id;
    assert_eq!(ta, tb);

    let stored = world.directory.clone();
    let user = assert_ok(spacegate_core::core_space::IdentityStore::get_user_by_id(&*stored, &UserId::new("u1")).await);
    assert_eq!(assert_some(user.personal_tenant).tenant_id, ta);
    assert_eq!(world.provisioner.calls(), 2);
}
