use super::{read_modify_write, record_conflict, record_drift, Cycle};
use crate::model::{Policy, PolicyStatus};
use crate::{AggregateTransport, OperationContext, ProviderError, ProviderResult};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// Locally managed attributes of a policy
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PolicySpec {
    pub name: String,
    pub status: PolicyStatus,
    pub description: Option<String>,
    pub conditions: Option<Value>,
}

impl PolicySpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> ProviderResult<()> {
        if self.name.trim().is_empty() {
            return Err(ProviderError::validation("name", "must not be empty"));
        }
        if let Some(conditions) = &self.conditions {
            if !conditions.is_object() {
                return Err(ProviderError::validation("conditions", "must be an object"));
            }
        }
        Ok(())
    }

    fn apply(&self, policy: &mut Policy) {
        policy.name = self.name.clone();
        policy.status = self.status.clone();
        policy.description = self.description.clone();
        policy.conditions = self.conditions.clone();
    }
}

/// CRUD for the policy itself; principals and targets are never touched here
pub struct PolicyReconciler {
    transport: Arc<AggregateTransport>,
}

impl PolicyReconciler {
    pub fn new(transport: Arc<AggregateTransport>) -> Self {
        Self { transport }
    }

    /// Create a policy with empty principal and target collections
    pub async fn create(&self, ctx: &OperationContext, spec: &PolicySpec) -> ProviderResult<Policy> {
        spec.validate()?;
        let mut initial = Policy::new(spec.name.clone());
        spec.apply(&mut initial);

        let created = self
            .transport
            .create(ctx, &initial)
            .await
            .map_err(|e| match e.category() {
                crate::ErrorCategory::Conflict => record_conflict(&self.transport, ctx, &spec.name, e),
                _ => e,
            })?;
        info!(operation = %ctx.operation, policy_id = %created.id, "Policy created");
        Ok(created)
    }

    /// `None` when the policy was deleted out-of-band
    pub async fn read(&self, ctx: &OperationContext, id: &str) -> ProviderResult<Option<Policy>> {
        let policy = self.transport.fetch(ctx, id).await?;
        if policy.is_none() {
            record_drift(&self.transport, ctx, id);
        }
        Ok(policy)
    }

    /// Replace the managed attributes; everything else goes back as fetched
    pub async fn update(
        &self,
        ctx: &OperationContext,
        id: &str,
        spec: &PolicySpec,
    ) -> ProviderResult<Policy> {
        spec.validate()?;
        let cycle = read_modify_write(&self.transport, ctx, id, |m| {
            m.update_metadata(|policy| spec.apply(policy));
            Ok(())
        })
        .await?;

        match cycle {
            Cycle::Written(policy, ()) => Ok(policy),
            Cycle::Unchanged(()) => Err(ProviderError::Internal(
                "metadata update produced no write".into(),
            )),
            Cycle::ParentMissing => {
                record_drift(&self.transport, ctx, id);
                Err(ProviderError::PolicyMissing { policy_id: id.into() })
            }
        }
    }

    /// Delete the policy; the server removes its principals and targets
    pub async fn delete(&self, ctx: &OperationContext, id: &str) -> ProviderResult<()> {
        self.transport.delete(ctx, id).await?;
        info!(operation = %ctx.operation, policy_id = %id, "Policy deleted");
        Ok(())
    }

    /// Adopt an existing policy by ID
    pub async fn import(&self, ctx: &OperationContext, id: &str) -> ProviderResult<Policy> {
        self.transport
            .fetch(ctx, id)
            .await?
            .ok_or_else(|| ProviderError::PolicyMissing { policy_id: id.into() })
    }
}
