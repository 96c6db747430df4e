//! Failure taxonomy for remote content operations.
//!
//! The engine branches on [`FailureKind`], never on raw message text.
//! Implementations backed by collaborators that only report legacy text
//! messages can derive the kind with [`FailureKind::classify`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rate-limit markers used by the legacy message classifier.
const RATE_LIMIT_PATTERNS: &[&str] = &["rate limit", "too many requests", "frequency abnormal"];

/// Markers for items that are gone or hidden (non-retryable at item level).
const UNAVAILABLE_PATTERNS: &[&str] = &["unavailable", "not found", "no longer exists"];

/// Markers for an invalidated platform credential (aborts the whole batch).
const AUTH_PATTERNS: &[&str] = &[
    "not logged in",
    "login expired",
    "login required",
    "401",
    "403",
    "unauthorized",
    "10062",
];

/// Markers for a stale item-level access token (refresh once, then retry).
const TOKEN_PATTERNS: &[&str] = &["token", "signature", "invalid parameter", "xsec"];

/// Classified failure category for a remote fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Platform throttled the request; retryable after backoff.
    RateLimited,
    /// The item is gone or hidden; skip it, do not retry.
    Unavailable,
    /// The platform credential is no longer valid; abort remaining work.
    AuthInvalid,
    /// The item-level access token is stale; refresh it and retry once.
    TokenInvalid,
    /// Anything else; retryable up to the attempt cap.
    Other,
}

impl FailureKind {
    /// Classify a legacy text message by the documented substring contract.
    ///
    /// Match order mirrors the severity of the outcome: rate-limit first,
    /// then item unavailability, then credential problems, then item-token
    /// problems. Matching is case-insensitive. Unmatched messages are
    /// [`FailureKind::Other`].
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        let matches = |patterns: &[&str]| patterns.iter().any(|p| lower.contains(p));

        if matches(RATE_LIMIT_PATTERNS) {
            FailureKind::RateLimited
        } else if matches(UNAVAILABLE_PATTERNS) {
            FailureKind::Unavailable
        } else if matches(AUTH_PATTERNS) {
            FailureKind::AuthInvalid
        } else if matches(TOKEN_PATTERNS) {
            FailureKind::TokenInvalid
        } else {
            FailureKind::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::RateLimited => "rate_limited",
            FailureKind::Unavailable => "unavailable",
            FailureKind::AuthInvalid => "auth_invalid",
            FailureKind::TokenInvalid => "token_invalid",
            FailureKind::Other => "other",
        }
    }
}

/// Error returned by every remote operation on the source traits.
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Build an error from a legacy text message, classifying it by
    /// substring.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: FailureKind::classify(&message),
            message,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(FailureKind::RateLimited, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Unavailable, message)
    }

    pub fn auth_invalid(message: impl Into<String>) -> Self {
        Self::new(FailureKind::AuthInvalid, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Other, message)
    }
}

pub type Result<T> = std::result::Result<T, FetchError>;
