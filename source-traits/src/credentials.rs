//! Platform credential storage abstraction.
//!
//! The engine reads the active credential before each account and asks for
//! invalidation when the platform rejects it. Storage, encryption and
//! rotation live behind this trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Diagnostic view of the active credential. Never contains the secret
/// itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialInfo {
    /// When the credential was first seen working.
    pub active_since: Option<DateTime<Utc>>,
    /// Whether the store currently considers it usable.
    pub is_valid: bool,
}

/// Access to the active platform credential (cookie/session).
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// The credential to attach to remote calls, or `None` when no usable
    /// credential is configured.
    async fn get_active_credential(&self) -> Result<Option<String>>;

    /// Mark the active credential invalid after the platform rejected it.
    /// Subsequent [`get_active_credential`](Self::get_active_credential)
    /// calls return `None` until a new credential is configured.
    async fn invalidate_active(&self) -> Result<()>;

    /// Diagnostic info for logs and status surfaces.
    async fn info(&self) -> Result<CredentialInfo>;
}
