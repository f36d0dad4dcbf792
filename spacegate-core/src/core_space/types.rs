//! Identifier and binding types shared by the space subsystem

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Prefix carried by every personal tenant id
pub const TENANT_PREFIX: &str = "tenant_";

/// Prefix carried by every personal space id
pub const SPACE_PREFIX: &str = "space_";

/// Unix timestamp in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Create a timestamp representing the current time
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Timestamp(millis)
    }

    /// Create a timestamp from milliseconds since epoch
    pub fn from_millis(millis: u64) -> Self {
        Timestamp(millis)
    }

    /// Get milliseconds since epoch
    pub fn as_millis(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity-store user identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        UserId(id.into())
    }

    pub fn generate() -> Self {
        UserId(format!("user_{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Organization-store organization identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrganizationId(pub String);

impl OrganizationId {
    pub fn new(id: impl Into<String>) -> Self {
        OrganizationId(id.into())
    }

    pub fn generate() -> Self {
        OrganizationId(format!("org_{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Backend tenant identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        TenantId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Space id of the personal space backed by this tenant.
    ///
    /// Returns `None` when this is not a well-formed personal tenant id
    /// (missing `tenant_` prefix or nothing after it).
    pub fn personal_space_id(&self) -> Option<SpaceId> {
        self.0
            .strip_prefix(TENANT_PREFIX)
            .filter(|suffix| !suffix.is_empty())
            .map(|suffix| SpaceId(format!("{SPACE_PREFIX}{suffix}")))
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// User-facing space identifier
///
/// Personal spaces use `space_<suffix>` where `tenant_<suffix>` is the
/// backing tenant. Organization spaces reuse the organization id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpaceId(pub String);

impl SpaceId {
    pub fn new(id: impl Into<String>) -> Self {
        SpaceId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Inverse of [`TenantId::personal_space_id`]
    pub fn personal_tenant_id(&self) -> Option<TenantId> {
        self.0
            .strip_prefix(SPACE_PREFIX)
            .filter(|suffix| !suffix.is_empty())
            .map(|suffix| TenantId(format!("{TENANT_PREFIX}{suffix}")))
    }

    pub fn from_organization(org_id: &OrganizationId) -> Self {
        SpaceId(org_id.0.clone())
    }

    pub fn to_organization_id(&self) -> OrganizationId {
        OrganizationId(self.0.clone())
    }
}

impl fmt::Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tenant api key. Never printed, never serialized.
#[derive(Clone)]
pub struct ApiKey(SecretString);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        ApiKey(SecretString::new(key.into()))
    }

    /// Mint a fresh random key
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        ApiKey::new(format!("sk_{}", hex::encode(bytes)))
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret().as_str()
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

impl PartialEq for ApiKey {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl Eq for ApiKey {}

/// A provisioned (tenant id, api key) pair attached to a user or organization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantBinding {
    pub tenant_id: TenantId,
    pub api_key: ApiKey,
}

impl TenantBinding {
    pub fn new(tenant_id: TenantId, api_key: ApiKey) -> Self {
        Self { tenant_id, api_key }
    }
}
