//! Tenant provisioner doubles

use crate::core_space::errors::{SpaceError, SpaceResult};
use crate::core_space::provisioning::TenantSpec;
use crate::core_space::store::TenantProvisioner;
use crate::core_space::types::{ApiKey, TenantBinding, TenantId};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// Provisioner that hands out preset tenant ids and records every request.
///
/// Once the script runs out it mints `tenant_auto<n>`. Can be switched to
/// fail, and can sleep before answering to widen race windows.
#[derive(Default)]
pub struct ScriptedProvisioner {
    script: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<TenantSpec>>,
    calls: AtomicUsize,
    failing: AtomicBool,
    delay: Option<Duration>,
}

impl ScriptedProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer with these tenant ids, in order
    pub fn with_tenant_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { script: Mutex::new(ids.into_iter().map(Into::into).collect()), ..Self::default() }
    }

    /// Every call fails with `ExternalService`
    pub fn failing() -> Self {
        let provisioner = Self::default();
        provisioner.failing.store(true, Ordering::SeqCst);
        provisioner
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of `create_tenant` calls, failed ones included
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Specs of every `create_tenant` call so far
    pub async fn requests(&self) -> Vec<TenantSpec> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl TenantProvisioner for ScriptedProvisioner {
    async fn create_tenant(&self, spec: &TenantSpec) -> SpaceResult<TenantBinding> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().await.push(spec.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(SpaceError::ExternalService("tenant service returned 503".to_string()));
        }

        let tenant_id = self
            .script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| format!("tenant_auto{call}"));
        Ok(TenantBinding::new(TenantId(tenant_id), ApiKey::new(format!("sk_scripted_{call}"))))
    }
}
