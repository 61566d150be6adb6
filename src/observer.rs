//! Reconciliation observer trait

use crate::{OperationContext, ProviderError, WriteScope};
use std::time::Duration;

/// Observer trait for external observability
pub trait ReconcileObserver: Send + Sync {
    fn on_fetch(&self, context: &OperationContext, policy_id: &str, found: bool);
    fn on_write(&self, context: &OperationContext, policy_id: &str, scope: &WriteScope);
    fn on_retry(&self, context: &OperationContext, attempt: u32, delay: Duration, error: &ProviderError);
    fn on_drift(&self, context: &OperationContext, external_id: &str);
    fn on_conflict(&self, context: &OperationContext, external_id: &str);
    fn on_guard_rejected(&self, context: &OperationContext, policy_id: &str, reason: &str);
}

/// No-op observer
pub struct NoOpObserver;

impl ReconcileObserver for NoOpObserver {
    fn on_fetch(&self, _context: &OperationContext, _policy_id: &str, _found: bool) {}
    fn on_write(&self, _context: &OperationContext, _policy_id: &str, _scope: &WriteScope) {}
    fn on_retry(&self, _context: &OperationContext, _attempt: u32, _delay: Duration, _error: &ProviderError) {}
    fn on_drift(&self, _context: &OperationContext, _external_id: &str) {}
    fn on_conflict(&self, _context: &OperationContext, _external_id: &str) {}
    fn on_guard_rejected(&self, _context: &OperationContext, _policy_id: &str, _reason: &str) {}
}

/// Tracing-based observer
pub struct TracingObserver;

impl ReconcileObserver for TracingObserver {
    fn on_fetch(&self, context: &OperationContext, policy_id: &str, found: bool) {
        tracing::debug!(operation = %context.operation, correlation_id = context.correlation_id, policy_id = %policy_id, found, "Policy fetched");
    }

    fn on_write(&self, context: &OperationContext, policy_id: &str, scope: &WriteScope) {
        tracing::info!(operation = %context.operation, correlation_id = context.correlation_id, policy_id = %policy_id, scope = %scope, "Policy written");
    }

    fn on_retry(&self, context: &OperationContext, attempt: u32, delay: Duration, error: &ProviderError) {
        tracing::warn!(operation = %context.operation, correlation_id = context.correlation_id, attempt, delay_ms = delay.as_millis() as u64, error = %error, "Retrying after transient failure");
    }

    fn on_drift(&self, context: &OperationContext, external_id: &str) {
        tracing::warn!(operation = %context.operation, correlation_id = context.correlation_id, external_id = %external_id, "Remote entity no longer exists");
    }

    fn on_conflict(&self, context: &OperationContext, external_id: &str) {
        tracing::warn!(operation = %context.operation, correlation_id = context.correlation_id, external_id = %external_id, "Entity already exists");
    }

    fn on_guard_rejected(&self, context: &OperationContext, policy_id: &str, reason: &str) {
        tracing::error!(operation = %context.operation, correlation_id = context.correlation_id, policy_id = %policy_id, reason = %reason, "Write rejected by guard");
    }
}
