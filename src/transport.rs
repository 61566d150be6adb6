//! Aggregate transport
//!
//! Whole-object fetch/create/write/delete against a [`PolicyBackend`], each
//! wrapped in [`execute_with_retry`]. A missing policy is a normal outcome
//! here: `fetch` reports it as `None` and `delete` treats it as done.

use crate::backend::PolicyBackend;
use crate::model::Policy;
use crate::{
    execute_with_retry, GuardedWrite, NoOpObserver, OperationContext, ProviderError,
    ProviderResult, ReconcileObserver, ReconcileStats, RetryPolicy, WriteScope,
};
use std::sync::Arc;
use std::time::Duration;

/// Retrying whole-object access to policies
pub struct AggregateTransport {
    backend: Arc<dyn PolicyBackend>,
    retry: RetryPolicy,
    observer: Arc<dyn ReconcileObserver>,
    stats: Arc<ReconcileStats>,
}

impl AggregateTransport {
    pub fn new(backend: Arc<dyn PolicyBackend>, retry: RetryPolicy) -> Self {
        Self {
            backend,
            retry,
            observer: Arc::new(NoOpObserver),
            stats: Arc::new(ReconcileStats::new()),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ReconcileObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_stats(mut self, stats: Arc<ReconcileStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn observer(&self) -> &dyn ReconcileObserver {
        self.observer.as_ref()
    }

    pub fn stats(&self) -> &Arc<ReconcileStats> {
        &self.stats
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Fetch a policy; `None` when the backend reports it absent
    pub async fn fetch(&self, ctx: &OperationContext, id: &str) -> ProviderResult<Option<Policy>> {
        ReconcileStats::bump(&self.stats.fetches);
        let result = execute_with_retry(ctx, &self.retry, &self.counting(), || {
            self.backend.get(id)
        })
        .await;

        match result {
            Ok(policy) => {
                self.observer.on_fetch(ctx, id, true);
                Ok(Some(policy))
            }
            Err(e) if e.is_not_found() => {
                ReconcileStats::bump(&self.stats.fetch_misses);
                self.observer.on_fetch(ctx, id, false);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Create a policy; the returned value carries the server-assigned ID
    pub async fn create(&self, ctx: &OperationContext, initial: &Policy) -> ProviderResult<Policy> {
        ReconcileStats::bump(&self.stats.creates);
        let created = execute_with_retry(ctx, &self.retry, &self.counting(), || {
            self.backend.post(initial)
        })
        .await?;

        if created.id.is_empty() {
            return Err(ProviderError::Internal(
                "create response carried no policy id".into(),
            ));
        }
        self.observer
            .on_write(ctx, &created.id, &WriteScope::Metadata);
        Ok(created)
    }

    /// Replace the whole policy with a payload that has passed the write guard
    pub async fn write_whole(
        &self,
        ctx: &OperationContext,
        payload: &GuardedWrite,
    ) -> ProviderResult<Policy> {
        ReconcileStats::bump(&self.stats.writes);
        let policy = payload.policy();
        let written = execute_with_retry(ctx, &self.retry, &self.counting(), || {
            self.backend.put(&policy.id, policy)
        })
        .await?;

        self.observer.on_write(ctx, &policy.id, payload.scope());
        Ok(written)
    }

    /// Delete a policy; already absent counts as success
    pub async fn delete(&self, ctx: &OperationContext, id: &str) -> ProviderResult<()> {
        ReconcileStats::bump(&self.stats.deletes);
        let result = execute_with_retry(ctx, &self.retry, &self.counting(), || {
            self.backend.delete(id)
        })
        .await;

        match result {
            Err(e) if e.is_not_found() => {
                tracing::debug!(policy_id = %id, "Policy already absent");
                Ok(())
            }
            other => other,
        }
    }

    fn counting(&self) -> CountingObserver<'_> {
        CountingObserver {
            inner: self.observer.as_ref(),
            stats: &self.stats,
        }
    }
}

/// Forwards to the configured observer and counts retries
struct CountingObserver<'a> {
    inner: &'a dyn ReconcileObserver,
    stats: &'a ReconcileStats,
}

impl ReconcileObserver for CountingObserver<'_> {
    fn on_fetch(&self, context: &OperationContext, policy_id: &str, found: bool) {
        self.inner.on_fetch(context, policy_id, found);
    }

    fn on_write(&self, context: &OperationContext, policy_id: &str, scope: &WriteScope) {
        self.inner.on_write(context, policy_id, scope);
    }

    fn on_retry(&self, context: &OperationContext, attempt: u32, delay: Duration, error: &ProviderError) {
        ReconcileStats::bump(&self.stats.retries);
        self.inner.on_retry(context, attempt, delay, error);
    }

    fn on_drift(&self, context: &OperationContext, external_id: &str) {
        self.inner.on_drift(context, external_id);
    }

    fn on_conflict(&self, context: &OperationContext, external_id: &str) {
        self.inner.on_conflict(context, external_id);
    }

    fn on_guard_rejected(&self, context: &OperationContext, policy_id: &str, reason: &str) {
        self.inner.on_guard_rejected(context, policy_id, reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendCall, InMemoryBackend};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Answers every POST with a policy that has no id
    struct IdlessCreate {
        posts: AtomicU32,
    }

    #[async_trait]
    impl PolicyBackend for IdlessCreate {
        async fn get(&self, id: &str) -> ProviderResult<Policy> {
            Err(ProviderError::api(404, format!("policy {id} not found")))
        }

        async fn post(&self, policy: &Policy) -> ProviderResult<Policy> {
            self.posts.fetch_add(1, Ordering::SeqCst);
            Ok(policy.clone())
        }

        async fn put(&self, _id: &str, policy: &Policy) -> ProviderResult<Policy> {
            Ok(policy.clone())
        }

        async fn delete(&self, _id: &str) -> ProviderResult<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_without_id_fails_closed() {
        let backend = Arc::new(IdlessCreate {
            posts: AtomicU32::new(0),
        });
        let transport = AggregateTransport::new(backend.clone(), RetryPolicy::default());
        let ctx = OperationContext::new("policy.create");

        let err = transport.create(&ctx, &Policy::new("p")).await.unwrap_err();
        assert!(matches!(err, ProviderError::Internal(_)));
        assert!(!err.category().is_retryable());
        assert_eq!(backend.posts.load(Ordering::SeqCst), 1);

        let diag = crate::diagnose(&err, crate::Action::Create);
        assert!(diag.summary.starts_with("Unexpected error"));
    }

    #[tokio::test]
    async fn test_fetch_miss_and_delete_miss() {
        let backend = Arc::new(InMemoryBackend::new());
        let transport = AggregateTransport::new(backend.clone(), RetryPolicy::default());
        let ctx = OperationContext::new("policy.read");

        assert!(transport.fetch(&ctx, "pol-9").await.unwrap().is_none());
        transport.delete(&ctx, "pol-9").await.unwrap();

        let stats = transport.stats().snapshot();
        assert_eq!(stats.fetch_misses, 1);
        assert_eq!(backend.call_count(BackendCall::Delete), 1);
    }

    #[tokio::test]
    async fn test_bad_request_is_not_a_miss() {
        let backend = Arc::new(InMemoryBackend::new());
        backend.seed(serde_json::json!({ "id": "pol-1", "name": "p" }));
        backend.fail_next(BackendCall::Get, 400, "Bad Request: source directory not found");
        let transport = AggregateTransport::new(backend, RetryPolicy::default());
        let ctx = OperationContext::new("policy.read");

        let err = transport.fetch(&ctx, "pol-1").await.unwrap_err();
        assert_eq!(err.category(), crate::ErrorCategory::Validation);
    }
}
