//! # Issue Collector
//!
//! Per-job structured issue log and summary.
//!
//! ## Overview
//!
//! One collector instance accompanies one account sync job. The item loop
//! records issues as they happen; on completion the collector is finalized
//! into a [`JobSummary`] plus the retained records, which the orchestrator
//! persists as the job's summary blob.
//!
//! Stored records are capped at [`MAX_RECORDS`]; summary counters keep
//! counting past the cap, so `finalize()` totals are always accurate to the
//! true call count.

use crate::job::current_timestamp;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Maximum number of issue records retained per job.
pub const MAX_RECORDS: usize = 500;

/// Maximum retained message length per record.
pub const MAX_MESSAGE_LEN: usize = 500;

/// Category of a recorded issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// A detail fetch hit the platform rate limiter
    RateLimited,
    /// The item is gone or hidden remotely
    Unavailable,
    /// Fields left stale after detail-fetch retries were exhausted
    MissingField,
    /// A fetch failed for an unclassified reason
    FetchFailed,
    /// An account-level access token had to be refreshed
    TokenRefresh,
    /// A media download failed
    MediaFailed,
    /// The platform credential was rejected
    AuthError,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::RateLimited => "rate_limited",
            IssueKind::Unavailable => "unavailable",
            IssueKind::MissingField => "missing_field",
            IssueKind::FetchFailed => "fetch_failed",
            IssueKind::TokenRefresh => "token_refresh",
            IssueKind::MediaFailed => "media_failed",
            IssueKind::AuthError => "auth_error",
        }
    }
}

/// One immutable issue entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueRecord {
    pub kind: IssueKind,
    pub item_id: Option<String>,
    /// Truncated to [`MAX_MESSAGE_LEN`] characters.
    pub message: String,
    /// Field names involved, for `missing_field` issues.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
    /// Free-form structured payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
    /// Unix epoch seconds.
    pub timestamp: i64,
}

/// Derived counters for a finished job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub total: u32,
    pub success: u32,
    pub skipped: u32,
    pub rate_limited: u32,
    pub unavailable: u32,
    pub missing_field: u32,
    pub fetch_failed: u32,
    pub token_refresh: u32,
    pub media_failed: u32,
    pub auth_error: u32,
    pub started_at: i64,
    pub ended_at: Option<i64>,
}

impl JobSummary {
    /// Count of issues that should surface in the advisory completion
    /// message.
    pub fn problem_count(&self) -> u32 {
        self.rate_limited + self.missing_field + self.fetch_failed + self.unavailable
    }
}

#[derive(Debug)]
struct CollectorState {
    summary: JobSummary,
    records: Vec<IssueRecord>,
}

/// Thread-safe per-job issue accumulator.
#[derive(Debug)]
pub struct IssueCollector {
    state: Mutex<CollectorState>,
}

impl IssueCollector {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CollectorState {
                summary: JobSummary {
                    started_at: current_timestamp(),
                    ..JobSummary::default()
                },
                records: Vec::new(),
            }),
        }
    }

    /// Record how many items the job intends to process.
    pub fn set_total(&self, total: u32) {
        self.lock().summary.total = total;
    }

    /// Append an issue. Past [`MAX_RECORDS`] the record is dropped but the
    /// matching summary counter still increments.
    pub fn add_issue(
        &self,
        kind: IssueKind,
        item_id: Option<String>,
        message: impl Into<String>,
        fields: Vec<String>,
        extra: Option<serde_json::Value>,
    ) {
        let mut message: String = message.into();
        if message.chars().count() > MAX_MESSAGE_LEN {
            message = message.chars().take(MAX_MESSAGE_LEN).collect();
        }

        let mut state = self.lock();
        match kind {
            IssueKind::RateLimited => state.summary.rate_limited += 1,
            IssueKind::Unavailable => state.summary.unavailable += 1,
            IssueKind::MissingField => state.summary.missing_field += 1,
            IssueKind::FetchFailed => state.summary.fetch_failed += 1,
            IssueKind::TokenRefresh => state.summary.token_refresh += 1,
            IssueKind::MediaFailed => state.summary.media_failed += 1,
            IssueKind::AuthError => state.summary.auth_error += 1,
        }

        if state.records.len() < MAX_RECORDS {
            state.records.push(IssueRecord {
                kind,
                item_id,
                message,
                fields,
                extra,
                timestamp: current_timestamp(),
            });
        }
    }

    /// Count one item persisted successfully.
    pub fn record_success(&self) {
        self.lock().summary.success += 1;
    }

    /// Count one item skipped (already complete, nothing to do).
    pub fn record_skipped(&self) {
        self.lock().summary.skipped += 1;
    }

    /// True iff the job ran into issues worth surfacing: any of
    /// rate_limited / missing_field / fetch_failed / unavailable.
    pub fn has_problems(&self) -> bool {
        self.lock().summary.problem_count() > 0
    }

    /// Snapshot the summary and retained records, stamping `ended_at` on
    /// first call. Idempotent: later calls return the same end time.
    pub fn finalize(&self) -> (JobSummary, Vec<IssueRecord>) {
        let mut state = self.lock();
        if state.summary.ended_at.is_none() {
            state.summary.ended_at = Some(current_timestamp());
        }
        (state.summary.clone(), state.records.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CollectorState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for IssueCollector {
    fn default() -> Self {
        Self::new()
    }
}
