//! Element locator and mutator
//!
//! Finds one principal or one target instance inside a fetched [`Policy`] by
//! its compound key and applies a create, update or delete to that element
//! only. Everything else in every collection stays exactly as fetched and in
//! its original order; that is what lets independently managed resources
//! share one policy object.

use crate::model::{Policy, Principal, PrincipalType, TargetInstance};
use crate::{ProviderError, ProviderResult};
use std::collections::BTreeSet;

/// An element of a policy collection with a compound key
pub trait Keyed {
    type Key: PartialEq + std::fmt::Display;

    /// Name used in error messages
    const KIND: &'static str;

    fn key(&self) -> Self::Key;

    /// Copy server-owned fields the local model does not track from the
    /// element being replaced
    fn carry_unmodelled(&mut self, previous: &Self);
}

/// (`principal_id`, `principal_type`)
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PrincipalKey {
    pub principal_id: String,
    pub principal_type: PrincipalType,
}

impl PrincipalKey {
    pub fn new(principal_id: impl Into<String>, principal_type: PrincipalType) -> Self {
        Self {
            principal_id: principal_id.into(),
            principal_type,
        }
    }
}

impl std::fmt::Display for PrincipalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.principal_id, self.principal_type)
    }
}

impl Keyed for Principal {
    type Key = PrincipalKey;
    const KIND: &'static str = "principal";

    fn key(&self) -> PrincipalKey {
        PrincipalKey::new(self.principal_id.clone(), self.principal_type)
    }

    fn carry_unmodelled(&mut self, previous: &Self) {
        for (k, v) in &previous.extra {
            self.extra.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }
}

impl Keyed for TargetInstance {
    type Key = u64;
    const KIND: &'static str = "target instance";

    fn key(&self) -> u64 {
        self.instance_id
    }

    fn carry_unmodelled(&mut self, previous: &Self) {
        for (k, v) in &previous.extra {
            self.extra.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }
}

/// Position of the element with `key`
pub fn locate<E: Keyed>(items: &[E], key: &E::Key) -> Option<usize> {
    items.iter().position(|item| &item.key() == key)
}

pub fn locate_principal(
    policy: &Policy,
    principal_id: &str,
    principal_type: PrincipalType,
) -> Option<usize> {
    policy
        .principals
        .iter()
        .position(|p| p.principal_id == principal_id && p.principal_type == principal_type)
}

pub fn locate_target_instance(policy: &Policy, category: &str, instance_id: u64) -> Option<usize> {
    policy
        .targets
        .get(category)
        .and_then(|group| locate(&group.instances, &instance_id))
}

/// Append `element`; a duplicate key is a Conflict
pub fn apply_create<E: Keyed>(items: &mut Vec<E>, element: E, policy_id: &str) -> ProviderResult<()> {
    let key = element.key();
    if locate(items, &key).is_some() {
        return Err(ProviderError::ElementExists {
            kind: E::KIND,
            key: key.to_string().into(),
            policy_id: policy_id.into(),
        });
    }
    items.push(element);
    Ok(())
}

/// Replace the element with the same key in place; absent is NotFound (drift)
pub fn apply_update<E: Keyed>(items: &mut [E], mut element: E, policy_id: &str) -> ProviderResult<()> {
    let key = element.key();
    let Some(index) = locate(items, &key) else {
        return Err(ProviderError::ElementMissing {
            kind: E::KIND,
            key: key.to_string().into(),
            policy_id: policy_id.into(),
        });
    };
    element.carry_unmodelled(&items[index]);
    items[index] = element;
    Ok(())
}

/// Remove the element with `key`; returns `false` if it was already absent
pub fn apply_delete<E: Keyed>(items: &mut Vec<E>, key: &E::Key) -> bool {
    match locate(items, key) {
        Some(index) => {
            items.remove(index);
            true
        }
        None => false,
    }
}

/// Which sub-collections a mutation touched
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MutationLog {
    pub metadata: bool,
    pub principals: bool,
    pub categories: BTreeSet<String>,
}

impl MutationLog {
    pub fn is_empty(&self) -> bool {
        !self.metadata && !self.principals && self.categories.is_empty()
    }
}

/// Mutations of one fetched policy, recording what they touch
pub struct PolicyMutator<'p> {
    policy: &'p mut Policy,
    log: MutationLog,
}

impl<'p> PolicyMutator<'p> {
    pub fn new(policy: &'p mut Policy) -> Self {
        Self {
            policy,
            log: MutationLog::default(),
        }
    }

    pub fn policy(&self) -> &Policy {
        &*self.policy
    }

    /// Change top-level fields; collections are untouched
    pub fn update_metadata(&mut self, apply: impl FnOnce(&mut Policy)) {
        let principals = std::mem::take(&mut self.policy.principals);
        let targets = std::mem::take(&mut self.policy.targets);
        apply(&mut *self.policy);
        self.policy.principals = principals;
        self.policy.targets = targets;
        self.log.metadata = true;
    }

    pub fn create_principal(&mut self, principal: Principal) -> ProviderResult<()> {
        let policy = &mut *self.policy;
        apply_create(&mut policy.principals, principal, &policy.id)?;
        self.log.principals = true;
        Ok(())
    }

    pub fn update_principal(&mut self, principal: Principal) -> ProviderResult<()> {
        let policy = &mut *self.policy;
        apply_update(&mut policy.principals, principal, &policy.id)?;
        self.log.principals = true;
        Ok(())
    }

    pub fn delete_principal(&mut self, key: &PrincipalKey) -> bool {
        let removed = apply_delete(&mut self.policy.principals, key);
        self.log.principals |= removed;
        removed
    }

    pub fn create_target(&mut self, category: &str, instance: TargetInstance) -> ProviderResult<()> {
        let policy = &mut *self.policy;
        let group = policy.targets.entry(category.to_owned()).or_default();
        apply_create(&mut group.instances, instance, &policy.id)?;
        self.log.categories.insert(category.to_owned());
        Ok(())
    }

    pub fn update_target(&mut self, category: &str, instance: TargetInstance) -> ProviderResult<()> {
        let policy = &mut *self.policy;
        let Some(group) = policy.targets.get_mut(category) else {
            return Err(ProviderError::ElementMissing {
                kind: TargetInstance::KIND,
                key: instance.instance_id.to_string().into(),
                policy_id: policy.id.as_str().into(),
            });
        };
        apply_update(&mut group.instances, instance, &policy.id)?;
        self.log.categories.insert(category.to_owned());
        Ok(())
    }

    pub fn delete_target(&mut self, category: &str, instance_id: u64) -> bool {
        let removed = self
            .policy
            .targets
            .get_mut(category)
            .is_some_and(|group| apply_delete(&mut group.instances, &instance_id));
        if removed {
            self.log.categories.insert(category.to_owned());
        }
        removed
    }

    pub fn into_log(self) -> MutationLog {
        self.log
    }
}
