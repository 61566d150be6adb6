//! Per-operation context and correlation

use tokio_util::sync::CancellationToken;

/// Correlation context carried through one reconciliation operation.
///
/// Every transport call and every backoff sleep observes `cancel`, so a host
/// that drops interest in an operation can stop it mid-flight.
#[derive(Clone)]
pub struct OperationContext {
    /// Label of the operation (e.g. "principal.create")
    pub operation: Box<str>,
    /// Correlation ID shared by every log line of this operation
    pub correlation_id: u64,
    /// Cancellation signal supplied by the caller
    pub cancel: CancellationToken,
    /// When the operation started (millis since UNIX epoch)
    pub started_at_millis: u64,
}

impl OperationContext {
    /// Create a context with a fresh correlation ID and its own cancellation token
    pub fn new(operation: impl Into<Box<str>>) -> Self {
        Self::with_cancel(operation, CancellationToken::new())
    }

    /// Create a context bound to a caller-owned cancellation token
    pub fn with_cancel(operation: impl Into<Box<str>>, cancel: CancellationToken) -> Self {
        Self {
            operation: operation.into(),
            correlation_id: Self::next_correlation_id(),
            cancel,
            started_at_millis: Self::now_millis(),
        }
    }

    /// Derive a context for a nested step; shares cancellation and correlation
    pub fn child(&self, operation: impl Into<Box<str>>) -> Self {
        Self {
            operation: operation.into(),
            ..self.clone()
        }
    }

    /// Get current time in milliseconds since UNIX epoch
    pub fn now_millis() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    /// Calculate elapsed time since the operation started
    pub fn elapsed_millis(&self) -> u64 {
        Self::now_millis().saturating_sub(self.started_at_millis)
    }

    /// Whether the caller has cancelled this operation
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn next_correlation_id() -> u64 {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        COUNTER.fetch_add(1, Ordering::Relaxed)
    }
}

impl std::fmt::Debug for OperationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationContext")
            .field("operation", &self.operation)
            .field("correlation_id", &self.correlation_id)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
