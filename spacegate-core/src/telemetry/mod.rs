//! Spans around space operations
//!
//! A [`TracedOperation`] owns an `info` span for one resolve, list or
//! provisioning call and logs its duration when completed. The CLI roots
//! each command in a [`TraceContext`] so nested operation spans share its
//! trace id.

use std::time::Instant;
use tracing::{span, Level, Span};

/// Correlation ids for one inbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    pub trace_id: String,
    pub span_id: String,
}

impl TraceContext {
    /// Fresh trace rooted at this request
    pub fn new() -> Self {
        use uuid::Uuid;

        Self {
            trace_id: Uuid::new_v4().to_string(),
            span_id: Uuid::new_v4().to_string(),
        }
    }
}

impl Default for TraceContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Traced operation wrapper
pub struct TracedOperation {
    span: Span,
    start: Instant,
}

impl TracedOperation {
    pub fn new(operation_name: &'static str) -> Self {
        let span = span!(Level::INFO, "operation", name = operation_name);
        Self { span, start: Instant::now() }
    }

    pub fn with_context(operation_name: &'static str, ctx: &TraceContext) -> Self {
        let span = span!(
            Level::INFO,
            "operation",
            name = operation_name,
            trace_id = %ctx.trace_id,
            span_id = %ctx.span_id
        );
        Self { span, start: Instant::now() }
    }

    /// Span to instrument the operation's future with
    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn record_event(&self, event: &str) {
        tracing::debug!(parent: &self.span, event = event);
    }

    pub fn record_error(&self, error: &dyn std::fmt::Display) {
        tracing::warn!(parent: &self.span, error = %error, "operation failed");
    }

    /// Log completion with elapsed time
    pub fn complete(self) {
        let duration = self.start.elapsed();
        tracing::debug!(
            parent: &self.span,
            duration_ms = duration.as_millis() as u64,
            "operation completed"
        );
    }
}

/// Space resolution and enumeration
pub mod space {
    use super::*;

    pub fn trace_resolve(user_id: &str, space_type: &str, space_id: &str) -> TracedOperation {
        let op = TracedOperation::new("space_resolve");
        tracing::trace!(parent: &op.span, user_id = user_id, space_type = space_type, space_id = space_id);
        op
    }

    pub fn trace_list(user_id: &str) -> TracedOperation {
        let op = TracedOperation::new("space_list");
        tracing::trace!(parent: &op.span, user_id = user_id);
        op
    }

    pub fn trace_provision(user_id: &str) -> TracedOperation {
        let op = TracedOperation::new("personal_tenant_provision");
        tracing::trace!(parent: &op.span, user_id = user_id);
        op
    }
}

/// Organization management
pub mod organization {
    use super::*;

    pub fn trace_mutation(action: &'static str, org_id: &str, actor_id: &str) -> TracedOperation {
        let op = TracedOperation::new("organization_mutation");
        tracing::trace!(parent: &op.span, action = action, org_id = org_id, actor_id = actor_id);
        op
    }
}
