//! Read-modify-write reconciliation for access policies
//!
//! The policy API exposes each policy only as a whole object (GET/PUT). This
//! crate lets several independently managed resources share one policy: the
//! policy's own metadata, individual principal assignments and individual
//! database target assignments. Each operation fetches the live policy,
//! changes exactly the element it owns and writes the whole object back.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! let config = ClientConfig::from_env()?;
//! let backend = HttpBackend::new(&config, Arc::new(StaticToken::new(token)))?;
//! let transport = AggregateTransport::new(Arc::new(backend), config.retry.clone())
//!     .with_observer(Arc::new(TracingObserver));
//! let reconciler = Reconciler::new(transport);
//!
//! let ctx = OperationContext::new("principal.create");
//! let (external_id, _) = reconciler
//!     .principals()
//!     .create(&ctx, "pol-1", Principal::new("admins", PrincipalType::Role))
//!     .await?;
//! // external_id == "pol-1:admins:ROLE"
//! ```

// === Core Types ===
mod context;
mod errors;
pub mod ids;
pub mod model;

// === Retry ===
mod retry;

// === Transport ===
pub mod backend;
mod config;
mod http;
mod transport;

// === Reconciliation ===
pub mod diagnostics;
mod guard;
pub mod lifecycle;
pub mod locator;
mod reconcile;

// === Observability ===
mod observer;
mod stats;

#[cfg(feature = "test-harness")]
pub mod test_support;

// === Re-exports ===

// Types
pub use context::OperationContext;
pub use ids::{DatabaseRef, ExternalId, IdError, PrincipalRef};
pub use model::{
    AuthProfile, Policy, PolicyStatus, Principal, PrincipalType, TargetGroup, TargetInstance,
    DATABASE_CATEGORY,
};

// Errors
pub use diagnostics::{diagnose, Action, Diagnostic, Severity};
pub use errors::{
    classify, classify_message, status_category, ErrorCategory, ProviderError, ProviderResult,
    TransportFailure, MESSAGE_PATTERNS,
};

// Retry
pub use retry::{execute_with_retry, RetryPolicy};

// Transport
pub use backend::{InMemoryBackend, PolicyBackend};
pub use config::{ClientConfig, ENV_API_URL, ENV_MAX_RETRIES, ENV_TIMEOUT_SECS};
pub use http::{HttpBackend, StaticToken, TokenProvider};
pub use transport::AggregateTransport;

// Reconciliation
pub use guard::{prepare_write, GuardedWrite, WriteScope};
pub use lifecycle::Lifecycle;
pub use locator::{MutationLog, PolicyMutator};
pub use reconcile::{
    DatabaseAssignments, PolicyReconciler, PolicySpec, PrincipalAssignments, PrincipalAttrs,
    Reconciler,
};

// Observability
pub use observer::{NoOpObserver, ReconcileObserver, TracingObserver};
pub use stats::{ReconcileStats, ReconcileStatsSnapshot};
