//! Error types and the error classifier
//!
//! Every failure in the crate is a [`ProviderError`]. [`classify`] maps an
//! error onto the fixed [`ErrorCategory`] taxonomy, which drives both retry
//! eligibility and the diagnostic shown to the user.
//!
//! Classification checks structured signals first (HTTP status, deadline,
//! cancellation, locally-raised variants) and then falls back to
//! case-insensitive substring matching over the rendered message using
//! [`MESSAGE_PATTERNS`]. The table is
//! evaluated top to bottom and the first row with a matching marker wins, so
//! row order is part of the contract: "invalid credentials" is Auth, not
//! Validation.

use crate::ids::IdError;

/// Result alias used throughout the crate
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Fixed failure taxonomy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Auth,
    Permission,
    NotFound,
    Conflict,
    Validation,
    Network,
    Timeout,
    RateLimit,
    Server,
    Unknown,
}

impl ErrorCategory {
    /// Whether an operation failing with this category may be retried
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Network | Self::Timeout | Self::RateLimit | Self::Server
        )
    }

    /// Stable lowercase label for logs
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Permission => "permission",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Validation => "validation",
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::RateLimit => "rate_limit",
            Self::Server => "server",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message markers in priority order. Reordering rows changes classification.
pub const MESSAGE_PATTERNS: &[(ErrorCategory, &[&str])] = &[
    (
        ErrorCategory::Auth,
        &[
            "unauthorized",
            "unauthenticated",
            "invalid credentials",
            "authentication failed",
            "invalid token",
            "token expired",
            "401",
        ],
    ),
    (
        ErrorCategory::Permission,
        &["forbidden", "permission denied", "access denied", "403"],
    ),
    (
        ErrorCategory::RateLimit,
        &["rate limit", "too many requests", "throttl", "429"],
    ),
    (
        ErrorCategory::NotFound,
        &["not found", "does not exist", "404"],
    ),
    (
        ErrorCategory::Conflict,
        &["already exists", "conflict", "in use", "409"],
    ),
    (
        ErrorCategory::Validation,
        &["invalid", "validation", "bad request", "400", "422"],
    ),
    (
        ErrorCategory::Server,
        &[
            "internal error",
            "internal server error",
            "bad gateway",
            "service unavailable",
            "500",
            "502",
            "503",
            "504",
        ],
    ),
    (ErrorCategory::Timeout, &["deadline exceeded"]),
    (
        ErrorCategory::Network,
        &[
            "timeout",
            "timed out",
            "connection refused",
            "connection reset",
            "broken pipe",
            "no such host",
            "dial",
        ],
    ),
];

/// How a transport-level failure happened
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportFailure {
    /// The request deadline elapsed
    Timeout,
    /// The connection could not be established
    Connect,
    /// Anything else below HTTP (TLS, body read, decode of a partial body)
    Other,
}

/// Errors surfaced by the reconciliation engine
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The backend answered with a non-success HTTP status
    #[error("HTTP {status}: {message}")]
    Api { status: u16, message: Box<str> },

    /// The request never produced an HTTP response
    #[error("request failed: {message}")]
    Transport {
        kind: TransportFailure,
        message: Box<str>,
    },

    /// A response body could not be decoded
    #[error("malformed response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// The caller cancelled the operation while a call was in flight
    #[error("operation cancelled")]
    Cancelled,

    /// The caller cancelled the operation during a backoff sleep
    #[error("operation cancelled while waiting to retry: {source}")]
    Interrupted {
        #[source]
        source: Box<ProviderError>,
    },

    /// A non-retryable failure; never retried
    #[error("non-retryable {category} error: {source}")]
    NonRetryable {
        category: ErrorCategory,
        #[source]
        source: Box<ProviderError>,
    },

    /// Retryable failures used up the retry budget
    #[error("max retries exceeded after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<ProviderError>,
    },

    /// An external ID could not be decoded
    #[error(transparent)]
    InvalidId(#[from] IdError),

    /// The outgoing write would violate the one-category-per-write constraint
    #[error("write rejected before sending: {0}")]
    WriteGuard(Box<str>),

    /// The parent policy of a sub-element is gone
    #[error("policy {policy_id} not found")]
    PolicyMissing { policy_id: Box<str> },

    /// A sub-element with the same key is already present
    #[error("{kind} {key} already exists in policy {policy_id}")]
    ElementExists {
        kind: &'static str,
        key: Box<str>,
        policy_id: Box<str>,
    },

    /// A sub-element expected to be present is missing
    #[error("{kind} {key} not found in policy {policy_id}")]
    ElementMissing {
        kind: &'static str,
        key: Box<str>,
        policy_id: Box<str>,
    },

    /// Local attribute validation failed
    #[error("invalid {field}: {reason}")]
    Validation { field: Box<str>, reason: Box<str> },

    /// Client configuration is unusable
    #[error("invalid configuration: {0}")]
    Config(Box<str>),

    /// A local invariant did not hold, or the backend answered with something
    /// the protocol does not allow; never retried
    #[error("internal error: {0}")]
    Internal(Box<str>),
}

impl ProviderError {
    pub fn api(status: u16, message: impl Into<Box<str>>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn transport(kind: TransportFailure, message: impl Into<Box<str>>) -> Self {
        Self::Transport {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(field: impl Into<Box<str>>, reason: impl Into<Box<str>>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for `classify(self)`
    pub fn category(&self) -> ErrorCategory {
        classify(self)
    }

    pub fn is_not_found(&self) -> bool {
        self.category() == ErrorCategory::NotFound
    }

    /// Innermost error beneath retry and cancellation wrappers
    pub fn root(&self) -> &ProviderError {
        match self {
            Self::Interrupted { source }
            | Self::NonRetryable { source, .. }
            | Self::RetriesExhausted { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Categorise an error.
pub fn classify(err: &ProviderError) -> ErrorCategory {
    if let Some(category) = structured_category(err) {
        return category;
    }
    classify_message(&err.to_string())
}

/// Match a free-form message against [`MESSAGE_PATTERNS`], case-insensitively.
pub fn classify_message(message: &str) -> ErrorCategory {
    let lowered = message.to_lowercase();
    MESSAGE_PATTERNS
        .iter()
        .find(|(_, markers)| markers.iter().any(|m| lowered.contains(m)))
        .map(|(category, _)| *category)
        .unwrap_or(ErrorCategory::Unknown)
}

/// Category implied by an HTTP status; `None` leaves it to message matching
pub fn status_category(status: u16) -> Option<ErrorCategory> {
    match status {
        400 | 422 => Some(ErrorCategory::Validation),
        401 => Some(ErrorCategory::Auth),
        403 => Some(ErrorCategory::Permission),
        404 => Some(ErrorCategory::NotFound),
        409 => Some(ErrorCategory::Conflict),
        429 => Some(ErrorCategory::RateLimit),
        500..=599 => Some(ErrorCategory::Server),
        _ => None,
    }
}

fn structured_category(err: &ProviderError) -> Option<ErrorCategory> {
    match err {
        ProviderError::Api { status, .. } => status_category(*status),
        ProviderError::Transport {
            kind: TransportFailure::Timeout,
            ..
        } => Some(ErrorCategory::Timeout),
        ProviderError::Transport {
            kind: TransportFailure::Connect,
            ..
        } => Some(ErrorCategory::Network),
        // cancellation is an interruption, not something a retry can fix
        ProviderError::Cancelled | ProviderError::Interrupted { .. } => {
            Some(ErrorCategory::Network)
        }
        ProviderError::NonRetryable { category, .. } => Some(*category),
        ProviderError::RetriesExhausted { source, .. } => Some(classify(source)),
        ProviderError::InvalidId(_)
        | ProviderError::WriteGuard(_)
        | ProviderError::Validation { .. }
        | ProviderError::Config(_) => Some(ErrorCategory::Validation),
        ProviderError::ElementExists { .. } => Some(ErrorCategory::Conflict),
        ProviderError::Internal(_) => Some(ErrorCategory::Unknown),
        ProviderError::ElementMissing { .. } | ProviderError::PolicyMissing { .. } => {
            Some(ErrorCategory::NotFound)
        }
        _ => None,
    }
}
