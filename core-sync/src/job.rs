//! # Account Sync Job State Machine
//!
//! Manages the lifecycle of per-account sync jobs with validated state
//! transitions.
//!
//! ## Overview
//!
//! One job exists per tracked account; submitting an account to a new batch
//! resets its job row to `Pending`. Jobs persist across restarts via the
//! database; the heartbeat monitor guarantees no job outlives a crash in
//! `Processing`.
//!
//! ## State Machine
//!
//! ```text
//! Pending → Processing → Completed
//!     ↓         ↓
//!     └──────→ Failed
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_sync::{AccountSyncJob, JobStatus, SyncMode};
//!
//! let job = AccountSyncJob::new("acct-1", SyncMode::Deep);
//! let mut job = job.start().unwrap();
//!
//! job.update_progress(5, 10).unwrap();
//! assert_eq!(job.progress_percent, 50);
//!
//! let job = job.complete(None).unwrap();
//! assert_eq!(job.status, JobStatus::Completed);
//! ```

use crate::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

// ============================================================================
// Status Types
// ============================================================================

/// The current status of an account sync job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Job has been submitted but not yet claimed by an orchestrator
    Pending,
    /// Job is being worked; requires a live heartbeat
    Processing,
    /// Job finished its intended work (possibly with advisory issues)
    Completed,
    /// Job did not finish its intended work
    Failed,
}

impl JobStatus {
    /// Check if this status represents a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Check if this status represents an active state
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Processing)
    }

    /// Get the string representation for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl FromStr for JobStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(SyncError::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The fetch strategy for a sync batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// List-page data only; never blocked by per-item rate limits
    Fast,
    /// Per-item detail fetches to fill fields the list page lacks
    Deep,
}

impl SyncMode {
    /// Get the string representation for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::Fast => "fast",
            SyncMode::Deep => "deep",
        }
    }
}

impl FromStr for SyncMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "fast" => Ok(SyncMode::Fast),
            "deep" => Ok(SyncMode::Deep),
            _ => Err(SyncError::InvalidMode(s.to_string())),
        }
    }
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Sync Job Entity
// ============================================================================

/// A per-account sync job with state machine semantics
///
/// Jobs can only be created in `Pending` state and must move through valid
/// transitions; anything else is an `InvalidStateTransition` error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSyncJob {
    /// The account this job belongs to
    pub account_id: String,
    /// Fetch strategy for this run
    pub mode: SyncMode,
    /// Current status
    pub status: JobStatus,
    /// Total items in the account's listing
    pub total_items: u32,
    /// Items persisted so far
    pub loaded_items: u32,
    /// Progress percentage (0-100)
    pub progress_percent: u8,
    /// Failure or advisory message
    pub error_message: Option<String>,
    /// Liveness proof while `Processing` (Unix epoch seconds)
    pub heartbeat_at: Option<i64>,
    /// When the job was claimed (Unix epoch seconds)
    pub started_at: Option<i64>,
    /// When the account last completed a sync (Unix epoch seconds)
    pub last_sync_at: Option<i64>,
}

impl AccountSyncJob {
    /// Create a new job in pending state
    pub fn new(account_id: impl Into<String>, mode: SyncMode) -> Self {
        Self {
            account_id: account_id.into(),
            mode,
            status: JobStatus::Pending,
            total_items: 0,
            loaded_items: 0,
            progress_percent: 0,
            error_message: None,
            heartbeat_at: None,
            started_at: None,
            last_sync_at: None,
        }
    }

    /// Claim the job: resets counters, clears any previous error, stamps
    /// the initial heartbeat.
    ///
    /// # Errors
    ///
    /// Returns an error if the job is not in `Pending` state
    pub fn start(mut self) -> Result<Self> {
        self.validate_transition(JobStatus::Processing)?;
        let now = current_timestamp();
        self.status = JobStatus::Processing;
        self.loaded_items = 0;
        self.progress_percent = 0;
        self.error_message = None;
        self.started_at = Some(now);
        self.heartbeat_at = Some(now);
        Ok(self)
    }

    /// Update progress counters and refresh the heartbeat.
    ///
    /// # Errors
    ///
    /// Returns an error if the job is not in `Processing` state
    pub fn update_progress(&mut self, loaded: u32, total: u32) -> Result<()> {
        if self.status != JobStatus::Processing {
            return Err(SyncError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: "update_progress".to_string(),
                reason: "Job must be processing to update progress".to_string(),
            });
        }

        self.loaded_items = loaded;
        self.total_items = total;
        self.progress_percent = percent(loaded, total);
        self.heartbeat_at = Some(current_timestamp());
        Ok(())
    }

    /// Mark the job as completed.
    ///
    /// `advisory` carries the non-fatal "completed with N issues" text when
    /// the run had unresolved issues; `None` means a clean run.
    ///
    /// # Errors
    ///
    /// Returns an error if the job is not in `Processing` state
    pub fn complete(mut self, advisory: Option<String>) -> Result<Self> {
        self.validate_transition(JobStatus::Completed)?;
        self.status = JobStatus::Completed;
        self.progress_percent = 100;
        self.error_message = advisory;
        self.last_sync_at = Some(current_timestamp());
        self.heartbeat_at = None;
        Ok(self)
    }

    /// Mark the job as failed with an error message.
    ///
    /// # Errors
    ///
    /// Returns an error if the job is already terminal
    pub fn fail(mut self, error_message: impl Into<String>) -> Result<Self> {
        self.validate_transition(JobStatus::Failed)?;
        self.status = JobStatus::Failed;
        self.error_message = Some(error_message.into());
        self.heartbeat_at = None;
        Ok(self)
    }

    /// Validate a state transition
    fn validate_transition(&self, to: JobStatus) -> Result<()> {
        let valid = match (self.status, to) {
            (JobStatus::Pending, JobStatus::Processing) => true,
            (JobStatus::Pending, JobStatus::Failed) => true,

            (JobStatus::Processing, JobStatus::Completed) => true,
            (JobStatus::Processing, JobStatus::Failed) => true,

            // Terminal states cannot transition
            (JobStatus::Completed, _) => false,
            (JobStatus::Failed, _) => false,

            _ => false,
        };

        if !valid {
            return Err(SyncError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: to.as_str().to_string(),
                reason: format!(
                    "Cannot transition from {} to {}",
                    self.status.as_str(),
                    to.as_str()
                ),
            });
        }

        Ok(())
    }
}

/// Progress percentage, capped at 100.
pub(crate) fn percent(loaded: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    ((loaded as f64 / total as f64) * 100.0).min(100.0) as u8
}

/// Get current Unix timestamp
pub(crate) fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

// ============================================================================
// Tests
// ============================================================================
