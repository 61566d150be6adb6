//! User-facing diagnostics
//!
//! Turns a [`ProviderError`] into the summary/detail pair a host shows to the
//! person running the operation. The text depends on the error category and,
//! for conflicts, on whether the failing action was a create.

use crate::{classify, ErrorCategory, ProviderError};

/// Entry point the error surfaced from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    Import,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Import => "import",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub category: ErrorCategory,
    pub summary: String,
    pub detail: String,
}

/// Diagnostic for `err` raised while performing `action`
pub fn diagnose(err: &ProviderError, action: Action) -> Diagnostic {
    diagnose_entity(err, action, None)
}

/// Like [`diagnose`], naming the external ID to import on a create conflict
pub fn diagnose_entity(err: &ProviderError, action: Action, external_id: Option<&str>) -> Diagnostic {
    let category = classify(err);
    let raw = err.to_string();

    let (severity, summary, detail) = match category {
        ErrorCategory::Auth => (
            Severity::Error,
            format!("Authentication failed during {action}"),
            format!("Check the configured API credentials. {raw}"),
        ),
        ErrorCategory::Permission => (
            Severity::Error,
            format!("Permission denied during {action}"),
            format!("The credentials lack the grants needed for this call. {raw}"),
        ),
        ErrorCategory::Conflict if action == Action::Create => {
            let hint = match external_id {
                Some(id) => format!("Import the existing object with ID {id:?} instead of creating it."),
                None => "Import the existing object instead of creating it.".to_owned(),
            };
            (
                Severity::Error,
                "Object already exists".to_owned(),
                format!("{hint} {raw}"),
            )
        }
        ErrorCategory::Conflict => (
            Severity::Error,
            format!("Conflict during {action}"),
            raw,
        ),
        ErrorCategory::NotFound => (
            Severity::Warning,
            "Entity no longer exists".to_owned(),
            format!("It was removed outside of this tool and will be recreated on the next apply. {raw}"),
        ),
        ErrorCategory::Validation => (
            Severity::Error,
            format!("Invalid configuration for {action}"),
            raw,
        ),
        ErrorCategory::Network
        | ErrorCategory::Timeout
        | ErrorCategory::RateLimit
        | ErrorCategory::Server => {
            let summary = match err {
                ProviderError::RetriesExhausted { attempts, .. } => {
                    format!("Max retries exceeded during {action} after {attempts} attempts")
                }
                ProviderError::Cancelled | ProviderError::Interrupted { .. } => {
                    format!("Operation {action} was cancelled")
                }
                _ => format!("Transient {category} failure during {action}"),
            };
            (Severity::Error, summary, err.root().to_string())
        }
        ErrorCategory::Unknown => (
            Severity::Error,
            format!("Unexpected error during {action}"),
            raw,
        ),
    };

    Diagnostic {
        severity,
        category,
        summary,
        detail,
    }
}
