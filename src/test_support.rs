//! Helpers for tests of crates built on this one

use crate::backend::InMemoryBackend;
use crate::{AggregateTransport, Reconciler, RetryPolicy, TracingObserver};
use std::sync::Arc;

/// Install a fmt subscriber filtered by `RUST_LOG`; later calls are no-ops
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("policy_reconciler=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// A reconciler over a fresh in-memory backend with tracing observation and
/// no retries
pub fn in_memory_reconciler() -> (Arc<InMemoryBackend>, Reconciler) {
    let backend = Arc::new(InMemoryBackend::new());
    let transport = AggregateTransport::new(backend.clone(), RetryPolicy::none())
        .with_observer(Arc::new(TracingObserver));
    (backend, Reconciler::new(transport))
}
