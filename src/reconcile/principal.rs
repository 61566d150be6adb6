use super::{read_modify_write, record_conflict, record_drift, Cycle};
use crate::ids::PrincipalRef;
use crate::locator::{locate_principal, PrincipalKey};
use crate::model::{Policy, Principal};
use crate::{AggregateTransport, OperationContext, ProviderError, ProviderResult};
use std::sync::Arc;
use tracing::{debug, info};

/// Mutable attributes of an assigned principal
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PrincipalAttrs {
    pub display_name: Option<String>,
    pub source_directory_id: Option<String>,
}

/// Assignment of individual principals to a policy
pub struct PrincipalAssignments {
    transport: Arc<AggregateTransport>,
}

fn find(policy: &Policy, r: &PrincipalRef) -> Option<Principal> {
    locate_principal(policy, &r.principal_id, r.principal_type).map(|i| policy.principals[i].clone())
}

impl PrincipalAssignments {
    pub fn new(transport: Arc<AggregateTransport>) -> Self {
        Self { transport }
    }

    /// Append `principal` to the policy; returns its external ID and the
    /// element as stored
    pub async fn create(
        &self,
        ctx: &OperationContext,
        policy_id: &str,
        principal: Principal,
    ) -> ProviderResult<(String, Principal)> {
        principal.validate()?;
        let r = PrincipalRef::new(
            policy_id,
            principal.principal_id.as_str(),
            principal.principal_type,
        );
        let external_id = r.encode();

        let cycle = read_modify_write(&self.transport, ctx, policy_id, |m| {
            m.create_principal(principal.clone())
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
                info!(operation = %ctx.operation, external_id = %external_id, "Principal assigned");
                let stored = find(&written, &r).unwrap_or(principal);
                Ok((external_id, stored))
            }
            Cycle::Unchanged(()) => Ok((external_id, principal)),
            Cycle::ParentMissing => Err(ProviderError::PolicyMissing {
                policy_id: policy_id.into(),
            }),
        }
    }

    /// `None` when the principal or its policy is gone
    pub async fn read(
        &self,
        ctx: &OperationContext,
        external_id: &str,
    ) -> ProviderResult<Option<Principal>> {
        let r = PrincipalRef::parse(external_id)?;
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

    /// Replace the principal's attributes in place
    pub async fn update(
        &self,
        ctx: &OperationContext,
        external_id: &str,
        attrs: &PrincipalAttrs,
    ) -> ProviderResult<Principal> {
        let r = PrincipalRef::parse(external_id)?;
        let mut principal = Principal::new(&*r.principal_id, r.principal_type);
        principal.display_name = attrs.display_name.clone();
        principal.source_directory_id = attrs.source_directory_id.clone();
        principal.validate()?;

        let cycle = read_modify_write(&self.transport, ctx, &r.policy_id, |m| {
            m.update_principal(principal.clone())
        })
        .await
        .inspect_err(|e| {
            if e.is_not_found() {
                record_drift(&self.transport, ctx, external_id);
            }
        })?;

        match cycle {
            Cycle::Written(written, ()) => Ok(find(&written, &r).unwrap_or(principal)),
            Cycle::Unchanged(()) => Ok(principal),
            Cycle::ParentMissing => {
                record_drift(&self.transport, ctx, external_id);
                Err(ProviderError::PolicyMissing {
                    policy_id: r.policy_id.clone(),
                })
            }
        }
    }

    /// Remove the principal; already absent, or policy gone, is success
    pub async fn delete(&self, ctx: &OperationContext, external_id: &str) -> ProviderResult<()> {
        let r = PrincipalRef::parse(external_id)?;
        let key = PrincipalKey::new(&*r.principal_id, r.principal_type);

        let cycle = read_modify_write(&self.transport, ctx, &r.policy_id, |m| {
            Ok(m.delete_principal(&key))
        })
        .await?;

        match cycle {
            Cycle::Written(_, _) => {
                info!(operation = %ctx.operation, external_id = %external_id, "Principal removed");
            }
            Cycle::Unchanged(_) | Cycle::ParentMissing => {
                debug!(operation = %ctx.operation, external_id = %external_id, "Principal already absent");
            }
        }
        Ok(())
    }

    /// Adopt an existing assignment by external ID
    pub async fn import(&self, ctx: &OperationContext, external_id: &str) -> ProviderResult<Principal> {
        let r = PrincipalRef::parse(external_id)?;
        let policy = self
            .transport
            .fetch(ctx, &r.policy_id)
            .await?
            .ok_or_else(|| ProviderError::PolicyMissing {
                policy_id: r.policy_id.clone(),
            })?;
        find(&policy, &r).ok_or_else(|| ProviderError::ElementMissing {
            kind: "principal",
            key: PrincipalKey::new(&*r.principal_id, r.principal_type)
                .to_string()
                .into(),
            policy_id: r.policy_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::setup;
    use super::*;
    use crate::backend::BackendCall;
    use crate::model::PrincipalType;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_preserves_existing_principals() {
        let (backend, reconciler, _) = setup();
        let before = backend.document("pol-1").unwrap()["principals"][0].clone();
        let ctx = OperationContext::new("principal.create");

        let (id, bob) = reconciler
            .principals()
            .create(&ctx, "pol-1", Principal::new("bob", PrincipalType::Role))
            .await
            .unwrap();
        assert_eq!(id, "pol-1:bob:ROLE");
        assert_eq!(bob.principal_id, "bob");

        let doc = backend.document("pol-1").unwrap();
        let principals = doc["principals"].as_array().unwrap();
        assert_eq!(principals.len(), 2);
        assert_eq!(principals[0], before);
        assert_eq!(principals[1]["principalId"], json!("bob"));
        assert_eq!(principals[1]["principalType"], json!("ROLE"));
        assert_eq!(doc["targets"]["databases"]["instances"][0]["sessionLimit"], json!(5));
        assert_eq!(doc["approvalWorkflow"], json!({ "required": true }));
    }

    #[tokio::test]
    async fn test_create_duplicate_is_conflict_without_write() {
        let (backend, reconciler, stats) = setup();
        let ctx = OperationContext::new("principal.create");
        let err = reconciler
            .principals()
            .create(
                &ctx,
                "pol-1",
                Principal::new("alice", PrincipalType::User).with_source_directory("dir-1"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.category(), crate::ErrorCategory::Conflict);
        assert_eq!(backend.call_count(BackendCall::Put), 0);
        assert_eq!(stats.snapshot().conflicts, 1);
    }

    #[tokio::test]
    async fn test_create_under_missing_policy() {
        let (_, reconciler, _) = setup();
        let ctx = OperationContext::new("principal.create");
        let err = reconciler
            .principals()
            .create(&ctx, "pol-9", Principal::new("bob", PrincipalType::Role))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::PolicyMissing { .. }));
    }

    #[tokio::test]
    async fn test_create_on_policy_with_two_categories_sends_nothing() {
        let (backend, reconciler, stats) = setup();
        backend.seed(json!({
            "id": "pol-3",
            "name": "mixed",
            "status": "ACTIVE",
            "principals": [],
            "targets": {
                "databases": { "instances": [] },
                "servers": { "instances": [] }
            }
        }));
        let ctx = OperationContext::new("principal.create");

        let err = reconciler
            .principals()
            .create(&ctx, "pol-3", Principal::new("bob", PrincipalType::Role))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::WriteGuard(_)));
        assert_eq!(backend.call_count(BackendCall::Put), 0);
        assert_eq!(stats.snapshot().guard_rejections, 1);
        assert_eq!(backend.document("pol-3").unwrap()["principals"], json!([]));
    }

    #[tokio::test]
    async fn test_validation_happens_before_any_call() {
        let (backend, reconciler, _) = setup();
        let ctx = OperationContext::new("principal.create");
        let err = reconciler
            .principals()
            .create(&ctx, "pol-1", Principal::new("carol", PrincipalType::User))
            .await
            .unwrap_err();
        assert_eq!(err.category(), crate::ErrorCategory::Validation);
        assert_eq!(backend.call_count(BackendCall::Get), 0);
    }

    #[tokio::test]
    async fn test_read_and_drift() {
        let (backend, reconciler, stats) = setup();
        let ctx = OperationContext::new("principal.read");

        let alice = reconciler
            .principals()
            .read(&ctx, "pol-1:alice:USER")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(alice.display_name.as_deref(), Some("Alice"));

        assert!(reconciler
            .principals()
            .read(&ctx, "pol-1:alice:GROUP")
            .await
            .unwrap()
            .is_none());

        backend.remove("pol-1");
        assert!(reconciler
            .principals()
            .read(&ctx, "pol-1:alice:USER")
            .await
            .unwrap()
            .is_none());
        assert_eq!(stats.snapshot().drift_detected, 2);
    }

    #[tokio::test]
    async fn test_read_rejects_bad_id() {
        let (backend, reconciler, _) = setup();
        let ctx = OperationContext::new("principal.read");
        for bad in ["pol-1:alice", "pol-1:alice:ADMIN", "pol-1::USER", "a:b:c:d"] {
            let err = reconciler.principals().read(&ctx, bad).await.unwrap_err();
            assert!(matches!(err, ProviderError::InvalidId(_)), "{bad}");
        }
        assert_eq!(backend.call_count(BackendCall::Get), 0);
    }

    #[tokio::test]
    async fn test_update_keeps_unmodelled_fields() {
        let (backend, reconciler, _) = setup();
        let ctx = OperationContext::new("principal.update");
        let attrs = PrincipalAttrs {
            display_name: Some("Alice Liddell".into()),
            source_directory_id: Some("dir-2".into()),
        };

        let updated = reconciler
            .principals()
            .update(&ctx, "pol-1:alice:USER", &attrs)
            .await
            .unwrap();
        assert_eq!(updated.source_directory_id.as_deref(), Some("dir-2"));

        let doc = backend.document("pol-1").unwrap();
        assert_eq!(doc["principals"][0]["displayName"], json!("Alice Liddell"));
        assert_eq!(doc["principals"][0]["assignedBy"], json!("scim-sync"));
    }

    #[tokio::test]
    async fn test_update_missing_principal_is_drift() {
        let (backend, reconciler, stats) = setup();
        let ctx = OperationContext::new("principal.update");
        let err = reconciler
            .principals()
            .update(&ctx, "pol-1:ops:ROLE", &PrincipalAttrs::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(backend.call_count(BackendCall::Put), 0);
        assert_eq!(stats.snapshot().drift_detected, 1);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (backend, reconciler, _) = setup();
        let ctx = OperationContext::new("principal.delete");
        let principals = reconciler.principals();

        principals.delete(&ctx, "pol-1:alice:USER").await.unwrap();
        assert_eq!(backend.call_count(BackendCall::Put), 1);
        assert_eq!(backend.document("pol-1").unwrap()["principals"], json!([]));

        principals.delete(&ctx, "pol-1:alice:USER").await.unwrap();
        assert_eq!(backend.call_count(BackendCall::Put), 1);

        backend.remove("pol-1");
        principals.delete(&ctx, "pol-1:alice:USER").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_write_failure_is_retried() {
        let (backend, reconciler, stats) = setup();
        backend.fail_next(BackendCall::Put, 503, "Service Unavailable");
        let ctx = OperationContext::new("principal.create");

        reconciler
            .principals()
            .create(&ctx, "pol-1", Principal::new("bob", PrincipalType::Role))
            .await
            .unwrap();
        assert_eq!(backend.call_count(BackendCall::Put), 2);
        assert_eq!(stats.snapshot().retries, 1);
    }

    #[tokio::test]
    async fn test_import() {
        let (_, reconciler, _) = setup();
        let ctx = OperationContext::new("principal.import");
        let alice = reconciler
            .principals()
            .import(&ctx, "pol-1:alice:USER")
            .await
            .unwrap();
        assert_eq!(alice.source_directory_id.as_deref(), Some("dir-1"));

        let err = reconciler
            .principals()
            .import(&ctx, "pol-1:zed:ROLE")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::ElementMissing { .. }));
    }
}
