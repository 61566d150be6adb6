//! Existence state of a managed entity
//!
//! The same two-state machine applies to a policy and to each principal or
//! target instance addressed inside one.

use crate::diagnostics::Action;
use crate::{ProviderError, ProviderResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    NotExists,
    Exists,
}

impl Lifecycle {
    /// State after `action` succeeds from `self`.
    ///
    /// Read and Import do not change existence; use [`Lifecycle::observe`].
    pub fn after(self, action: Action) -> ProviderResult<Self> {
        match (self, action) {
            (Self::NotExists, Action::Create) => Ok(Self::Exists),
            (Self::Exists, Action::Update) => Ok(Self::Exists),
            (Self::Exists, Action::Delete) => Ok(Self::NotExists),
            (state, action) => Err(ProviderError::validation(
                "lifecycle",
                format!("{action} is not valid while the entity is {state:?}"),
            )),
        }
    }

    /// Reconcile with what a fetch found; the flag is set on drift
    pub fn observe(self, found: bool) -> (Self, bool) {
        match (self, found) {
            (Self::Exists, false) => (Self::NotExists, true),
            (_, true) => (Self::Exists, false),
            (Self::NotExists, false) => (Self::NotExists, false),
        }
    }
}
