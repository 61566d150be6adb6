//! Write guard
//!
//! The backend accepts at most one target category per PUT. [`prepare_write`]
//! is the only way to build a [`GuardedWrite`], so a payload that reaches
//! [`crate::AggregateTransport::write_whole`] has always been checked and,
//! for a target write, trimmed to the one category the operation touched.

use crate::locator::MutationLog;
use crate::model::Policy;
use crate::{ProviderError, ProviderResult};

/// Which slice of the policy a write carries
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteScope {
    /// Top-level fields only
    Metadata,
    /// The principal collection
    Principals,
    /// One target category
    Targets(String),
}

impl std::fmt::Display for WriteScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Metadata => f.write_str("metadata"),
            Self::Principals => f.write_str("principals"),
            Self::Targets(category) => write!(f, "targets[{category}]"),
        }
    }
}

/// A policy payload that satisfies the one-category-per-write constraint
#[derive(Debug)]
pub struct GuardedWrite {
    policy: Policy,
    scope: WriteScope,
}

impl GuardedWrite {
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn scope(&self) -> &WriteScope {
        &self.scope
    }

    pub fn into_policy(self) -> Policy {
        self.policy
    }
}

/// Check what a mutation touched and shape the outgoing payload.
///
/// - principals or metadata: the policy goes out as fetched, targets included,
///   as long as it holds at most one target category
/// - one target category `K`: every other category is dropped from the payload
/// - more than one category, or principals together with a category: rejected
pub fn prepare_write(mut policy: Policy, log: &MutationLog) -> ProviderResult<GuardedWrite> {
    if log.principals && !log.categories.is_empty() {
        return Err(ProviderError::WriteGuard(
            format!(
                "principals and target categories {:?} cannot be written together",
                log.categories
            )
            .into(),
        ));
    }
    if log.categories.len() > 1 {
        return Err(ProviderError::WriteGuard(
            format!(
                "a write may carry one target category, this one touched {:?}",
                log.categories
            )
            .into(),
        ));
    }

    let scope = match log.categories.iter().next() {
        Some(category) => {
            policy.targets.retain(|key, _| key == category);
            if policy.targets.len() != 1 {
                return Err(ProviderError::WriteGuard(
                    format!("target category {category} is missing from the payload").into(),
                ));
            }
            WriteScope::Targets(category.clone())
        }
        None if log.principals => WriteScope::Principals,
        None => WriteScope::Metadata,
    };

    // these scopes send the fetched target map back as-is
    if !matches!(scope, WriteScope::Targets(_)) && policy.targets.len() > 1 {
        return Err(ProviderError::WriteGuard(
            format!(
                "{scope} write would carry target categories {:?}; the backend accepts one",
                policy.targets.keys().collect::<Vec<_>>()
            )
            .into(),
        ));
    }

    Ok(GuardedWrite { policy, scope })
}
