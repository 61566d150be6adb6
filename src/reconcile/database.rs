use super::{read_modify_write, record_conflict, record_drift, Cycle};
use crate::ids::DatabaseRef;
use crate::locator::locate_target_instance;
use crate::model::{AuthProfile, Policy, TargetInstance, DATABASE_CATEGORY};
use crate::{AggregateTransport, OperationContext, ProviderError, ProviderResult};
use std::sync::Arc;
use tracing::{debug, info};

/// Assignment of database targets to a policy, under the `databases` group
pub struct DatabaseAssignments {
    transport: Arc<AggregateTransport>,
}

fn find(policy: &Policy, r: &DatabaseRef) -> Option<TargetInstance> {
    let index = locate_target_instance(policy, DATABASE_CATEGORY, r.instance_id)?;
    Some(policy.targets[DATABASE_CATEGORY].instances[index].clone())
}

impl DatabaseAssignments {
    pub fn new(transport: Arc<AggregateTransport>) -> Self {
        Self { transport }
    }

    pub async fn create(
        &self,
        ctx: &OperationContext,
        policy_id: &str,
        instance: TargetInstance,
    ) -> ProviderResult<(String, TargetInstance)> {
        instance.auth.validate()?;
        let r = DatabaseRef::new(policy_id, instance.instance_id);
        let external_id = r.encode();

        let cycle = read_modify_write(&self.transport, ctx, policy_id, |m| {
            m.create_target(DATABASE_CATEGORY, instance.clone())
        })
        .await
        .map_err(|e| match e {
            ProviderError::ElementExists { .. } => {
                record_conflict(&self.transport, ctx, &external_id, e)
            }
            e => e,
        })?;

        match cycle {
            Cycle::Written(written, ()) => {
                info!(
                    operation = %ctx.operation,
                    external_id = %external_id,
                    auth_method = instance.auth.method(),
                    "Database assigned"
                );
                let stored = find(&written, &r).unwrap_or(instance);
                Ok((external_id, stored))
            }
            Cycle::Unchanged(()) => Ok((external_id, instance)),
            Cycle::ParentMissing => Err(ProviderError::PolicyMissing {
                policy_id: policy_id.into(),
            }),
        }
    }

    pub async fn read(
        &self,
        ctx: &OperationContext,
        external_id: &str,
    ) -> ProviderResult<Option<TargetInstance>> {
        let r = DatabaseRef::parse(external_id)?;
        let found = self
            .transport
            .fetch(ctx, &r.policy_id)
            .await?
            .and_then(|policy| find(&policy, &r));
        if found.is_none() {
            record_drift(&self.transport, ctx, external_id);
        }
        Ok(found)
    }

    /// Switch the authentication method or profile of an assigned database
    pub async fn update(
        &self,
        ctx: &OperationContext,
        external_id: &str,
        auth: AuthProfile,
    ) -> ProviderResult<TargetInstance> {
        let r = DatabaseRef::parse(external_id)?;
        auth.validate()?;
        let instance = TargetInstance::new(r.instance_id, auth);

        let cycle = read_modify_write(&self.transport, ctx, &r.policy_id, |m| {
            m.update_target(DATABASE_CATEGORY, instance.clone())
        })
        .await
        .inspect_err(|e| {
            if e.is_not_found() {
                record_drift(&self.transport, ctx, external_id);
            }
        })?;

        match cycle {
            Cycle::Written(written, ()) => Ok(find(&written, &r).unwrap_or(instance)),
            Cycle::Unchanged(()) => Ok(instance),
            Cycle::ParentMissing => {
                record_drift(&self.transport, ctx, external_id);
                Err(ProviderError::PolicyMissing {
                    policy_id: r.policy_id.clone(),
                })
            }
        }
    }

    /// Remove the database; the group itself stays, possibly empty
    pub async fn delete(&self, ctx: &OperationContext, external_id: &str) -> ProviderResult<()> {
        let r = DatabaseRef::parse(external_id)?;
        let cycle = read_modify_write(&self.transport, ctx, &r.policy_id, |m| {
            Ok(m.delete_target(DATABASE_CATEGORY, r.instance_id))
        })
        .await?;

        if let Cycle::Written(..) = cycle {
            info!(operation = %ctx.operation, external_id = %external_id, "Database removed");
        } else {
            debug!(operation = %ctx.operation, external_id = %external_id, "Database already absent");
        }
        Ok(())
    }

    pub async fn import(
        &self,
        ctx: &OperationContext,
        external_id: &str,
    ) -> ProviderResult<TargetInstance> {
        let r = DatabaseRef::parse(external_id)?;
        let policy = self
            .transport
            .fetch(ctx, &r.policy_id)
            .await?
            .ok_or_else(|| ProviderError::PolicyMissing {
                policy_id: r.policy_id.clone(),
            })?;
        find(&policy, &r).ok_or_else(|| ProviderError::ElementMissing {
            kind: "target instance",
            key: r.instance_id.to_string().into(),
            policy_id: r.policy_id.clone(),
        })
    }
}
