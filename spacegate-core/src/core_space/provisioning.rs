//! Tenant specifications and the in-process provisioner

use super::errors::SpaceResult;
use super::organization::Organization;
use super::store::TenantProvisioner;
use super::types::{ApiKey, TenantBinding, TenantId, TENANT_PREFIX};
use super::user::User;
use crate::config::ProvisioningConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

/// Everything a provisioner needs to create a tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantSpec {
    pub name: String,
    pub display_name: String,
    pub billing_plan: String,
    pub contact_email: String,
    pub quotas: TenantQuotas,
    pub compliance: ComplianceSettings,
    pub settings: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantQuotas {
    pub max_storage_bytes: u64,
    pub max_documents: u64,
    pub max_api_calls_per_day: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceSettings {
    pub data_residency: String,
    pub retention_days: u32,
    pub encryption_at_rest: bool,
}

impl TenantSpec {
    /// Spec for a user's personal tenant
    pub fn personal(user: &User, config: &ProvisioningConfig) -> Self {
        let mut settings = config.settings.clone();
        settings.insert("space_type".to_string(), "personal".to_string());
        settings.insert("owner_user_id".to_string(), user.id.to_string());

        Self {
            name: format!("{}-{}", config.personal_name_prefix, tenant_name_component(&user.username)),
            display_name: format!("{} (Personal)", user.display_name()),
            billing_plan: config.personal_billing_plan.clone(),
            contact_email: user.email.clone(),
            quotas: TenantQuotas::from_config(config),
            compliance: ComplianceSettings::from_config(config),
            settings,
        }
    }

    /// Spec for an organization tenant; `contact_email` is the provisioning owner's
    pub fn organization(org: &Organization, contact_email: &str, config: &ProvisioningConfig) -> Self {
        let mut settings = config.settings.clone();
        settings.insert("space_type".to_string(), "organization".to_string());
        settings.insert("organization_id".to_string(), org.id.to_string());

        Self {
            name: format!("org-{}", org.slug),
            display_name: org.name.clone(),
            billing_plan: config.organization_billing_plan.clone(),
            contact_email: contact_email.to_string(),
            quotas: TenantQuotas::from_config(config),
            compliance: ComplianceSettings::from_config(config),
            settings,
        }
    }
}

impl TenantQuotas {
    fn from_config(config: &ProvisioningConfig) -> Self {
        Self {
            max_storage_bytes: config.quotas.max_storage_bytes,
            max_documents: config.quotas.max_documents,
            max_api_calls_per_day: config.quotas.max_api_calls_per_day,
        }
    }
}

impl ComplianceSettings {
    fn from_config(config: &ProvisioningConfig) -> Self {
        Self {
            data_residency: config.compliance.data_residency.clone(),
            retention_days: config.compliance.retention_days,
            encryption_at_rest: config.compliance.encryption_at_rest,
        }
    }
}

/// Lowercase, `[a-z0-9-]` only; empty input becomes "user"
fn tenant_name_component(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let cleaned = cleaned.trim_matches('-');
    if cleaned.is_empty() {
        "user".to_string()
    } else {
        cleaned.to_string()
    }
}

/// In-process provisioner that mints `tenant_<uuid>` ids and random api keys.
///
/// Keeps the spec of every tenant it created so orphans can be reconciled.
pub struct LocalTenantProvisioner {
    tenants: RwLock<HashMap<TenantId, TenantSpec>>,
}

impl LocalTenantProvisioner {
    pub fn new() -> Self {
        Self { tenants: RwLock::new(HashMap::new()) }
    }

    pub async fn tenant_count(&self) -> usize {
        self.tenants.read().await.len()
    }

    pub async fn get_tenant(&self, tenant_id: &TenantId) -> Option<TenantSpec> {
        self.tenants.read().await.get(tenant_id).cloned()
    }
}

impl Default for LocalTenantProvisioner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TenantProvisioner for LocalTenantProvisioner {
    async fn create_tenant(&self, spec: &TenantSpec) -> SpaceResult<TenantBinding> {
        let tenant_id = TenantId(format!("{TENANT_PREFIX}{}", uuid::Uuid::new_v4().simple()));
        let binding = TenantBinding::new(tenant_id.clone(), ApiKey::generate());

        self.tenants.write().await.insert(tenant_id, spec.clone());

        tracing::info!(
            tenant_id = %binding.tenant_id,
            name = %spec.name,
            billing_plan = %spec.billing_plan,
            "Provisioned tenant"
        );
        Ok(binding)
    }
}
