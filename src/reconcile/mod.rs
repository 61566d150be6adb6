//! Reconciliation orchestrators
//!
//! One orchestrator per resource type, all sharing the same
//! fetch → locate → mutate → guard → write cycle against the live policy.
//! There is no concurrency token: two cycles against the same policy that
//! both fetch before either writes will lose the first write.

mod database;
mod policy;
mod principal;

pub use database::DatabaseAssignments;
pub use policy::{PolicyReconciler, PolicySpec};
pub use principal::{PrincipalAssignments, PrincipalAttrs};

use crate::guard::prepare_write;
use crate::locator::PolicyMutator;
use crate::model::Policy;
use crate::{AggregateTransport, OperationContext, ProviderError, ProviderResult, ReconcileStats};
use std::sync::Arc;

/// Entry point handing out the per-resource orchestrators
#[derive(Clone)]
pub struct Reconciler {
    transport: Arc<AggregateTransport>,
}

impl Reconciler {
    pub fn new(transport: AggregateTransport) -> Self {
        Self {
            transport: Arc::new(transport),
        }
    }

    pub fn transport(&self) -> &AggregateTransport {
        &self.transport
    }

    pub fn policies(&self) -> PolicyReconciler {
        PolicyReconciler::new(self.transport.clone())
    }

    pub fn principals(&self) -> PrincipalAssignments {
        PrincipalAssignments::new(self.transport.clone())
    }

    pub fn databases(&self) -> DatabaseAssignments {
        DatabaseAssignments::new(self.transport.clone())
    }
}

/// Outcome of one read-modify-write cycle
pub(crate) enum Cycle<R> {
    /// The policy itself is gone
    ParentMissing,
    /// The mutation touched nothing; no write was sent
    Unchanged(R),
    /// The write went through; carries the server's response
    Written(Policy, R),
}

/// Fetch `policy_id`, apply `mutate`, pass the result through the write guard
/// and write it back. Nothing is written when `mutate` fails or leaves the
/// policy untouched.
pub(crate) async fn read_modify_write<R>(
    transport: &AggregateTransport,
    ctx: &OperationContext,
    policy_id: &str,
    mutate: impl FnOnce(&mut PolicyMutator<'_>) -> ProviderResult<R>,
) -> ProviderResult<Cycle<R>> {
    let Some(mut policy) = transport.fetch(ctx, policy_id).await? else {
        return Ok(Cycle::ParentMissing);
    };

    let mut mutator = PolicyMutator::new(&mut policy);
    let outcome = mutate(&mut mutator)?;
    let log = mutator.into_log();
    if log.is_empty() {
        tracing::debug!(operation = %ctx.operation, policy_id = %policy_id, "Nothing to write");
        return Ok(Cycle::Unchanged(outcome));
    }

    let payload = prepare_write(policy, &log).inspect_err(|e| {
        ReconcileStats::bump(&transport.stats().guard_rejections);
        transport
            .observer()
            .on_guard_rejected(ctx, policy_id, &e.to_string());
    })?;
    let written = transport.write_whole(ctx, &payload).await?;
    Ok(Cycle::Written(written, outcome))
}

pub(crate) fn record_drift(transport: &AggregateTransport, ctx: &OperationContext, external_id: &str) {
    ReconcileStats::bump(&transport.stats().drift_detected);
    transport.observer().on_drift(ctx, external_id);
}

/// Count and report a conflict; passes the error through
pub(crate) fn record_conflict(
    transport: &AggregateTransport,
    ctx: &OperationContext,
    external_id: &str,
    err: ProviderError,
) -> ProviderError {
    ReconcileStats::bump(&transport.stats().conflicts);
    transport.observer().on_conflict(ctx, external_id);
    err
}
