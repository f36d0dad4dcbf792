//! Space resolution and organization role authorization
//!
//! A *space* is the working context a request runs in: either a user's
//! personal space or an organization space. Each space is backed by exactly
//! one provisioned tenant.
//!
//! ## Components
//!
//! - [`role`]: role to capability mapping (`permissions_for`)
//! - [`resolver`]: selector to [`SpaceContext`] for one request
//! - [`enumerator`]: every space a user can see, provisioning a missing
//!   personal tenant on the way
//! - [`policy`] and [`manager`]: role-gated organization mutations
//! - [`store`]: the identity store, organization store and tenant
//!   provisioner contracts, with [`storage`] and [`provisioning`]
//!   implementations
//!
//! ## Identifiers
//!
//! A personal space id is its tenant id with `tenant_` replaced by `space_`.
//! An organization space id is the organization id.

pub mod enumerator;
pub mod errors;
pub mod manager;
pub mod organization;
pub mod policy;
pub mod provisioning;
pub mod resolver;
pub mod role;
pub mod space;
pub mod storage;
pub mod store;
pub mod types;
pub mod user;

pub use enumerator::SpaceEnumerator;
pub use errors::{SpaceError, SpaceResult};
pub use manager::OrganizationManager;
pub use organization::{Organization, OrganizationMembership, OrganizationUpdate, OrganizationVisibility};
pub use policy::{authorize, OrganizationAction};
pub use provisioning::{LocalTenantProvisioner, TenantSpec};
pub use resolver::SpaceResolver;
pub use role::{permissions_for, Capability, OrganizationRole, PermissionSet};
pub use space::{SpaceContext, SpaceInfo, SpaceListing, SpaceSelector, SpaceType};
pub use storage::{MemoryDirectory, SqlDirectory};
pub use store::{BindOutcome, IdentityStore, OrganizationStore, TenantProvisioner};
pub use types::{ApiKey, OrganizationId, SpaceId, TenantBinding, TenantId, Timestamp, UserId};
pub use user::User;
