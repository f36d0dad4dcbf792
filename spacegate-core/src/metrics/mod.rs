//! Metrics for space resolution and provisioning
//!
//! Uses the `metrics` facade; with no recorder installed every call is a no-op.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Instant;

pub const RESOLVE_TOTAL: &str = "space.resolve.total";
pub const RESOLVE_DENIED: &str = "space.resolve.denied";
pub const RESOLVE_DURATION: &str = "space.resolve.duration_ms";
pub const LIST_DURATION: &str = "space.list.duration_ms";
pub const PROVISION_SUCCESS: &str = "space.provision.personal.success";
pub const PROVISION_FAILED: &str = "space.provision.personal.failed";
pub const PROVISION_ORPHANED: &str = "space.provision.personal.orphaned";
pub const ORG_PROVISION_ORPHANED: &str = "space.provision.organization.orphaned";
pub const ORG_MUTATIONS: &str = "space.organization.mutations";
pub const ORG_DENIED: &str = "space.organization.denied";

/// Register metric descriptions with the installed recorder
pub fn init_metrics() {
    describe_counter!(RESOLVE_TOTAL, "Space resolutions attempted");
    describe_counter!(RESOLVE_DENIED, "Space resolutions refused with Forbidden or NotFound");
    describe_histogram!(RESOLVE_DURATION, "Space resolution duration in milliseconds");
    describe_histogram!(LIST_DURATION, "Space enumeration duration in milliseconds");
    describe_counter!(PROVISION_SUCCESS, "Personal tenants provisioned and bound");
    describe_counter!(PROVISION_FAILED, "Personal tenant provisioning or bind failures");
    describe_counter!(PROVISION_ORPHANED, "Personal tenants provisioned but lost a bind race");
    describe_counter!(ORG_PROVISION_ORPHANED, "Organization tenants provisioned but never bound");
    describe_counter!(ORG_MUTATIONS, "Organization mutations applied");
    describe_counter!(ORG_DENIED, "Organization mutations refused by role policy");
}

pub fn record_counter(name: &'static str, value: u64) {
    counter!(name).increment(value);
}

pub fn record_histogram(name: &'static str, value: f64) {
    histogram!(name).record(value);
}

/// Records elapsed milliseconds into a histogram when stopped
pub struct Timer {
    name: &'static str,
    start: Instant,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self { name, start: Instant::now() }
    }

    pub fn stop(self) {
        record_histogram(self.name, self.start.elapsed().as_secs_f64() * 1000.0);
    }
}
