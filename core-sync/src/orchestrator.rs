//! # Sync Orchestrator
//!
//! Drives the per-account sync state machine over a hostile, rate-limiting
//! content platform.
//!
//! ## Overview
//!
//! `StartSync` schedules one background batch task that processes accounts
//! strictly sequentially. Per account:
//! - claim the job row (`pending` -> `processing`, heartbeat stamped)
//! - obtain a platform credential; refresh the account profile best-effort
//! - fetch the item listing, retrying once with a refreshed access token
//!   when the platform returns an empty page
//! - fast mode persists list data in bulk batches; deep mode runs the
//!   field-completeness check and detail-fetches incomplete items with
//!   bounded retries, pacing every attempt through the [`DelayController`]
//! - media downloads are handed to the [`DownloadQueue`] and never block
//!   item processing
//! - progress and heartbeat are persisted in one batched write every
//!   [`PROGRESS_BATCH`] items
//!
//! Item-level failures are recorded to the per-job [`IssueCollector`] and
//! never escape the item loop. Auth failures invalidate the credential and
//! abort the whole batch. A top-level guard converts anything else into
//! `failed` job rows, so no job is ever left in `processing`.
//!
//! ## Usage
//!
//! ```ignore
//! use core_sync::{SyncConfig, SyncMode, SyncOrchestrator};
//!
//! let orchestrator = SyncOrchestrator::new(
//!     SyncConfig::default(),
//!     source, credentials, content, jobs, downloads, event_bus,
//! );
//! orchestrator.start_sync(vec!["user-1".into()], SyncMode::Deep).await?;
//! // ... later
//! orchestrator.stop_sync();
//! ```

use crate::delay::{DelayConfig, DelayController, DelaySnapshot};
use crate::download::DownloadQueue;
use crate::issues::{IssueCollector, IssueKind};
use crate::job::{current_timestamp, AccountSyncJob};
use crate::merge::{missing_required_fields, RecordPatch};
use crate::model::ContentRecord;
use crate::repository::{ContentStore, JobStore};
use crate::{JobStatus, Result, SyncError, SyncMode};
use core_runtime::logging::redact_if_sensitive;
use core_runtime::{CoreEvent, EventBus, EventSeverity, SyncEvent};
use source_traits::{
    AccountRef, ContentSource, CredentialStore, FailureKind, ItemRef, ItemSummary,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Progress and heartbeat are persisted every this many items.
pub const PROGRESS_BATCH: u32 = 5;

/// Fast mode buffers this many records per bulk upsert.
pub const FAST_BATCH: usize = 20;

/// Maximum attempts for one item's detail fetch.
pub const MAX_DETAIL_ATTEMPTS: u32 = 3;

/// Error messages persisted to job rows are truncated to this length.
const MAX_ERROR_MESSAGE_LEN: usize = 200;

/// Failure message written on operator cancellation.
const STOPPED_MESSAGE: &str = "stopped by operator";

// ============================================================================
// Configuration
// ============================================================================

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Items between batched progress/heartbeat writes
    pub progress_batch: u32,
    /// Fast-mode bulk upsert size
    pub fast_batch: usize,
    /// Detail fetch attempts per item
    pub max_detail_attempts: u32,
    /// Root directory of downloaded media, for the completeness check.
    /// Must match the download queue's media root.
    pub media_root: PathBuf,
    /// Hard kill switch for a runaway batch (seconds)
    pub batch_timeout_secs: u64,
    /// Backoff tuning for the internal delay controller
    pub delay: DelayConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            progress_batch: PROGRESS_BATCH,
            fast_batch: FAST_BATCH,
            max_detail_attempts: MAX_DETAIL_ATTEMPTS,
            media_root: PathBuf::from("media"),
            batch_timeout_secs: 3600,
            delay: DelayConfig::default(),
        }
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Outcome of one deep-mode item.
enum ItemOutcome {
    /// Already complete, nothing fetched
    Skipped,
    /// Detail fetched and merged
    Fetched,
    /// Detail attempts exhausted or item unavailable; list data persisted
    Fallback,
}

/// Top-level sync coordinator. Cheap to clone for the spawned batch task;
/// all collaborators sit behind `Arc`s.
pub struct SyncOrchestrator {
    config: SyncConfig,
    source: Arc<dyn ContentSource>,
    credentials: Arc<dyn CredentialStore>,
    content: Arc<dyn ContentStore>,
    jobs: Arc<dyn JobStore>,
    downloads: Arc<DownloadQueue>,
    delay: Arc<DelayController>,
    event_bus: EventBus,
    cancel: Arc<Mutex<CancellationToken>>,
}

impl SyncOrchestrator {
    pub fn new(
        config: SyncConfig,
        source: Arc<dyn ContentSource>,
        credentials: Arc<dyn CredentialStore>,
        content: Arc<dyn ContentStore>,
        jobs: Arc<dyn JobStore>,
        downloads: Arc<DownloadQueue>,
        event_bus: EventBus,
    ) -> Self {
        let delay = Arc::new(DelayController::new(config.delay.clone()));
        Self {
            config,
            source,
            credentials,
            content,
            jobs,
            downloads,
            delay,
            event_bus,
            cancel: Arc::new(Mutex::new(CancellationToken::new())),
        }
    }

    /// Schedule a sync batch and return once it is claimed in the store.
    ///
    /// Every account's job row is reset to `pending`; the batch itself
    /// runs on a spawned task. Returns [`SyncError::EmptyBatch`] for an
    /// empty id list.
    ///
    /// Re-entry is tolerated: a new batch resets the delay controller and
    /// replaces the cancellation flag.
    #[instrument(skip(self, account_ids), fields(accounts = account_ids.len(), mode = %mode))]
    pub async fn start_sync(&self, account_ids: Vec<String>, mode: SyncMode) -> Result<()> {
        if account_ids.is_empty() {
            return Err(SyncError::EmptyBatch);
        }

        self.delay.reset();
        let token = CancellationToken::new();
        *self.lock_cancel() = token.clone();

        for account_id in &account_ids {
            self.jobs.reset_pending(account_id, mode).await?;
        }

        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::BatchStarted {
                account_ids: account_ids.clone(),
                mode: mode.as_str().to_string(),
            }))
            .ok();
        info!(accounts = account_ids.len(), "Sync batch scheduled");

        let orchestrator = Arc::new(self.clone_for_task());
        tokio::spawn(async move {
            orchestrator.run_batch(account_ids, mode, token).await;
        });

        Ok(())
    }

    /// Trip the cooperative cancellation flag. In-flight fetches finish;
    /// nothing new is issued.
    pub fn stop_sync(&self) {
        info!("Sync cancellation requested");
        self.lock_cancel().cancel();
    }

    /// Diagnostic snapshot of the adaptive delay state.
    pub fn delay_snapshot(&self) -> DelaySnapshot {
        self.delay.snapshot()
    }

    fn clone_for_task(&self) -> Self {
        Self {
            config: self.config.clone(),
            source: Arc::clone(&self.source),
            credentials: Arc::clone(&self.credentials),
            content: Arc::clone(&self.content),
            jobs: Arc::clone(&self.jobs),
            downloads: Arc::clone(&self.downloads),
            delay: Arc::clone(&self.delay),
            event_bus: self.event_bus.clone(),
            cancel: Arc::clone(&self.cancel),
        }
    }

    fn lock_cancel(&self) -> std::sync::MutexGuard<'_, CancellationToken> {
        match self.cancel.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    // ========================================================================
    // Batch Execution
    // ========================================================================

    /// Batch worker entry point. The guard here is the last line of
    /// defense: whatever escapes `execute_batch`, every non-terminal job
    /// in the batch ends up `failed` with a truncated diagnostic.
    #[instrument(skip(self, account_ids, token), fields(accounts = account_ids.len(), mode = %mode))]
    async fn run_batch(&self, account_ids: Vec<String>, mode: SyncMode, token: CancellationToken) {
        let timeout = Duration::from_secs(self.config.batch_timeout_secs);
        let outcome = tokio::time::timeout(
            timeout,
            self.execute_batch(&account_ids, mode, &token),
        )
        .await;

        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(truncate_message(&e.to_string())),
            Err(_) => Some(
                SyncError::Timeout(self.config.batch_timeout_secs).to_string(),
            ),
        };

        let Some(message) = failure else {
            info!("Sync batch finished");
            return;
        };

        error!(message = %message, "Sync batch aborted");
        let mut remaining = Vec::new();
        for account_id in &account_ids {
            match self.jobs.get(account_id).await {
                Ok(Some(job)) if !job.status.is_terminal() => {
                    if let Err(e) = self
                        .jobs
                        .set_status(account_id, JobStatus::Failed, Some(&message))
                        .await
                    {
                        error!(account_id, error = %e, "Failed to mark job failed");
                    }
                    remaining.push(account_id.clone());
                }
                Ok(_) => {}
                Err(e) => error!(account_id, error = %e, "Failed to inspect job"),
            }
        }

        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::Failed {
                message,
                remaining_account_ids: remaining,
            }))
            .ok();
    }

    async fn execute_batch(
        &self,
        account_ids: &[String],
        mode: SyncMode,
        token: &CancellationToken,
    ) -> Result<()> {
        for account_id in account_ids {
            if token.is_cancelled() {
                // Accounts never started stay pending.
                info!(account_id, "Batch cancelled before account started");
                break;
            }

            match self.sync_account(account_id, mode, token).await {
                Ok(()) => {}
                Err(SyncError::AuthInvalid(message)) => {
                    warn!(account_id, message = %message, "Credential rejected, aborting batch");
                    if let Err(e) = self.credentials.invalidate_active().await {
                        error!(error = %e, "Failed to invalidate credential");
                    }
                    self.event_bus
                        .emit(CoreEvent::Credential(
                            core_runtime::CredentialEvent::Invalidated {
                                message: message.clone(),
                            },
                        ))
                        .ok();
                    // The guard in run_batch fails this account and every
                    // remaining one with the same message.
                    return Err(SyncError::AuthInvalid(message));
                }
                Err(SyncError::Cancelled) => {
                    self.fail_account(account_id, STOPPED_MESSAGE).await;
                    break;
                }
                Err(e) => {
                    warn!(account_id, error = %e, "Account sync failed");
                    self.fail_account(account_id, &truncate_message(&e.to_string()))
                        .await;
                }
            }
        }
        Ok(())
    }

    async fn fail_account(&self, account_id: &str, message: &str) {
        if let Err(e) = self
            .jobs
            .set_status(account_id, JobStatus::Failed, Some(message))
            .await
        {
            error!(account_id, error = %e, "Failed to mark job failed");
        }
        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::Completed {
                account_id: account_id.to_string(),
                status: JobStatus::Failed.as_str().to_string(),
                summary: None,
            }))
            .ok();
    }

    // ========================================================================
    // Per-Account Sync
    // ========================================================================

    #[instrument(skip(self, token), fields(account_id = %account_id, mode = %mode))]
    async fn sync_account(
        &self,
        account_id: &str,
        mode: SyncMode,
        token: &CancellationToken,
    ) -> Result<()> {
        let job = self
            .jobs
            .get(account_id)
            .await?
            .ok_or_else(|| SyncError::JobNotFound {
                account_id: account_id.to_string(),
            })?;
        let mut job = job.start()?;
        self.jobs.save(&job).await?;
        self.emit_progress(&job);
        info!("Account sync started");

        let collector = IssueCollector::new();

        let credential = self
            .credentials
            .get_active_credential()
            .await
            .map_err(|e| SyncError::Source(e.to_string()))?
            .ok_or(SyncError::NoCredential)?;

        self.refresh_account_profile(account_id, &credential, &collector)
            .await;

        let items = self
            .fetch_listing(account_id, &credential, &collector)
            .await?;
        let total = items.len() as u32;
        collector.set_total(total);
        job.update_progress(0, total)?;
        self.jobs
            .update_progress(account_id, 0, total, current_timestamp())
            .await?;
        self.emit_log(
            EventSeverity::Info,
            format!("Listing fetched: {} items", total),
            Some(account_id),
            None,
        );

        let problem_items = match mode {
            SyncMode::Fast => {
                self.run_fast_pass(&mut job, &items, &collector, token)
                    .await?
            }
            SyncMode::Deep => {
                self.run_deep_pass(&mut job, &items, &credential, &collector, token)
                    .await?
            }
        };

        let (summary, records) = collector.finalize();
        let advisory = if summary.problem_count() > 0 {
            Some(advisory_message(problem_items.max(1)))
        } else {
            None
        };

        let completed = job.complete(advisory)?;
        self.jobs.save(&completed).await?;

        let summary_json = serde_json::json!({
            "summary": summary,
            "issues": records,
        });
        self.jobs
            .save_summary(account_id, &summary_json.to_string())
            .await?;

        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::Completed {
                account_id: account_id.to_string(),
                status: JobStatus::Completed.as_str().to_string(),
                summary: Some(summary_json),
            }))
            .ok();
        info!(
            loaded = completed.loaded_items,
            problems = summary.problem_count(),
            "Account sync completed"
        );

        Ok(())
    }

    /// Best-effort account profile refresh at job start. Never fatal.
    async fn refresh_account_profile(
        &self,
        account_id: &str,
        credential: &str,
        collector: &IssueCollector,
    ) {
        match self.source.fetch_account_info(account_id, credential).await {
            Ok(info) => {
                debug!(account_id, "Account profile refreshed");
                self.event_bus
                    .emit(CoreEvent::Sync(SyncEvent::Log {
                        severity: EventSeverity::Debug,
                        message: "Account profile refreshed".to_string(),
                        account_id: Some(account_id.to_string()),
                        item_id: None,
                        extra: serde_json::to_value(info).ok(),
                    }))
                    .ok();
            }
            Err(e) => {
                warn!(account_id, error = %e, "Account profile refresh failed");
                collector.add_issue(
                    IssueKind::FetchFailed,
                    None,
                    format!("account profile refresh failed: {}", e.message),
                    Vec::new(),
                    None,
                );
            }
        }
    }

    /// Fetch the account's item listing. An empty page on success is
    /// treated as a retryable anomaly: refresh the access token once and
    /// retry before giving up.
    async fn fetch_listing(
        &self,
        account_id: &str,
        credential: &str,
        collector: &IssueCollector,
    ) -> Result<Vec<ItemSummary>> {
        let account = AccountRef::new(account_id);
        let items = self
            .source
            .list_items(&account, credential)
            .await
            .map_err(map_listing_error)?;
        if !items.is_empty() {
            return Ok(items);
        }

        warn!(account_id, "Empty listing, refreshing access token and retrying");
        let (account, note) = match self.source.refresh_access_token(account_id, credential).await {
            Ok(Some(fresh)) => {
                debug!(
                    account_id,
                    token = %redact_if_sensitive("access_token", &fresh),
                    "Account access token refreshed"
                );
                (
                    AccountRef::new(account_id).with_token(fresh),
                    "empty listing; refreshed account access token and retried".to_string(),
                )
            }
            Ok(None) => (
                account,
                "empty listing; token refresh returned no token, retried with stored token"
                    .to_string(),
            ),
            Err(e) => {
                warn!(account_id, error = %e, "Access token refresh failed");
                (
                    account,
                    format!(
                        "empty listing; token refresh failed ({}), retried with stored token",
                        e.message
                    ),
                )
            }
        };
        collector.add_issue(IssueKind::TokenRefresh, None, note, Vec::new(), None);

        let retry = self
            .source
            .list_items(&account, credential)
            .await
            .map_err(map_listing_error)?;
        if retry.is_empty() {
            return Err(SyncError::EmptyListing {
                account_id: account_id.to_string(),
            });
        }
        Ok(retry)
    }

    // ========================================================================
    // Fast Mode
    // ========================================================================

    /// Persist list-page data only, in bulk batches. Never sleeps.
    async fn run_fast_pass(
        &self,
        job: &mut AccountSyncJob,
        items: &[ItemSummary],
        collector: &IssueCollector,
        token: &CancellationToken,
    ) -> Result<u32> {
        let mut buffer: Vec<RecordPatch> = Vec::with_capacity(self.config.fast_batch);
        let mut problem_items = 0u32;
        let mut batch_start = 0usize;
        let total = items.len();

        for (idx, summary) in items.iter().enumerate() {
            if token.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            buffer.push(RecordPatch::from(summary.clone()));
            collector.record_success();

            if buffer.len() >= self.config.fast_batch || idx + 1 == total {
                let batch = std::mem::take(&mut buffer);
                let batch_len = batch.len() as u32;
                match self.content.bulk_upsert(batch).await {
                    Ok(_) => {
                        // Covers go out only after the rows exist, so the
                        // queue's path write-back always finds its record.
                        for persisted in &items[batch_start..=idx] {
                            self.submit_cover(persisted, collector).await;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Bulk upsert failed, items skipped");
                        collector.add_issue(
                            IssueKind::FetchFailed,
                            None,
                            format!("bulk persist failed for {} items: {}", batch_len, e),
                            Vec::new(),
                            None,
                        );
                        problem_items += batch_len;
                    }
                }
                batch_start = idx + 1;
            }

            self.advance_progress(job, idx + 1 == total).await?;
        }

        Ok(problem_items)
    }

    // ========================================================================
    // Deep Mode
    // ========================================================================

    /// Completeness-checked per-item pass with bounded detail fetches.
    async fn run_deep_pass(
        &self,
        job: &mut AccountSyncJob,
        items: &[ItemSummary],
        credential: &str,
        collector: &IssueCollector,
        token: &CancellationToken,
    ) -> Result<u32> {
        let mut problem_items = 0u32;
        let total = items.len();

        for (idx, summary) in items.iter().enumerate() {
            if token.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            match self.sync_item_deep(summary, credential, collector).await? {
                ItemOutcome::Skipped | ItemOutcome::Fetched => {}
                ItemOutcome::Fallback => problem_items += 1,
            }

            self.advance_progress(job, idx + 1 == total).await?;
        }

        Ok(problem_items)
    }

    /// One deep-mode item. Only auth failures and store errors propagate;
    /// everything else resolves to an [`ItemOutcome`].
    async fn sync_item_deep(
        &self,
        summary: &ItemSummary,
        credential: &str,
        collector: &IssueCollector,
    ) -> Result<ItemOutcome> {
        let item_id = summary.item_id.as_str();

        let existing = self.content.find_by_id(item_id).await?;
        let needs_detail = match &existing {
            None => true,
            Some(record) => {
                !missing_required_fields(record, &self.config.media_root).is_empty()
            }
        };
        if !needs_detail {
            // Complete items still take the freshly listed like count, so
            // counters do not go stale between full detail fetches.
            if let Some(record) = &existing {
                if summary.like_count.is_some() && summary.like_count != record.like_count {
                    let patch = RecordPatch {
                        item_id: item_id.to_string(),
                        like_count: summary.like_count,
                        ..RecordPatch::default()
                    };
                    self.persist_item(patch, collector).await?;
                }
            }
            debug!(item_id, "Item already complete, skipping");
            collector.record_skipped();
            return Ok(ItemOutcome::Skipped);
        }

        let mut item_token = summary.access_token.clone();
        let mut token_refreshed = false;
        let mut unavailable = false;

        for attempt in 1..=self.config.max_detail_attempts {
            tokio::time::sleep(self.delay.delay()).await;

            let item_ref = ItemRef {
                item_id: item_id.to_string(),
                access_token: item_token.clone(),
            };
            let failure = match self.source.fetch_item_detail(&item_ref, credential).await {
                Ok(detail) => {
                    self.delay.record_success();
                    let merged = self.persist_item(RecordPatch::from(detail), collector).await?;
                    if let Some(record) = merged {
                        self.submit_full_media(record, collector).await;
                        collector.record_success();
                        debug!(item_id, attempt, "Item detail merged");
                        return Ok(ItemOutcome::Fetched);
                    }
                    // Persist failed; fall through to the list fallback.
                    break;
                }
                Err(e) => e,
            };

            match failure.kind {
                FailureKind::RateLimited => {
                    self.delay.record_rate_limit();
                    collector.add_issue(
                        IssueKind::RateLimited,
                        Some(item_id.to_string()),
                        &failure.message,
                        Vec::new(),
                        None,
                    );
                    let wait = self.delay.rate_limit_wait();
                    warn!(
                        item_id,
                        attempt,
                        wait_secs = wait.as_secs(),
                        "Rate limited, backing off"
                    );
                    self.emit_log(
                        EventSeverity::Warning,
                        format!("Rate limited, waiting {}s", wait.as_secs()),
                        Some(&summary.owner_id),
                        Some(item_id),
                    );
                    tokio::time::sleep(wait).await;
                }
                FailureKind::Unavailable => {
                    warn!(item_id, "Item unavailable, using list data");
                    collector.add_issue(
                        IssueKind::Unavailable,
                        Some(item_id.to_string()),
                        &failure.message,
                        Vec::new(),
                        None,
                    );
                    unavailable = true;
                    break;
                }
                FailureKind::AuthInvalid => {
                    return Err(SyncError::AuthInvalid(failure.message));
                }
                FailureKind::TokenInvalid if !token_refreshed => {
                    token_refreshed = true;
                    match self
                        .source
                        .refresh_access_token(&summary.owner_id, credential)
                        .await
                    {
                        Ok(Some(fresh)) => {
                            debug!(
                                item_id,
                                token = %redact_if_sensitive("access_token", &fresh),
                                "Item access token refreshed"
                            );
                            collector.add_issue(
                                IssueKind::TokenRefresh,
                                Some(item_id.to_string()),
                                "item access token refreshed after token error",
                                Vec::new(),
                                None,
                            );
                            item_token = Some(fresh);
                        }
                        Ok(None) => {
                            warn!(item_id, "Token refresh yielded no token");
                        }
                        Err(e) => {
                            warn!(item_id, error = %e, "Token refresh failed");
                        }
                    }
                }
                FailureKind::TokenInvalid | FailureKind::Other => {
                    warn!(item_id, attempt, error = %failure, "Detail fetch failed");
                }
            }
        }

        // Attempts exhausted or the item is gone: persist the list-page
        // fallback so the item is never left entirely unwritten.
        let merged = self
            .persist_item(RecordPatch::from(summary.clone()), collector)
            .await?;
        if let Some(record) = merged {
            if !unavailable {
                let stale: Vec<String> = missing_required_fields(&record, &self.config.media_root)
                    .into_iter()
                    .map(String::from)
                    .collect();
                collector.add_issue(
                    IssueKind::MissingField,
                    Some(item_id.to_string()),
                    "detail fetch exhausted; persisted list data",
                    stale,
                    None,
                );
            }
            self.submit_cover(summary, collector).await;
        }
        Ok(ItemOutcome::Fallback)
    }

    /// Merge one patch into the store. A persistence failure is recorded
    /// and skipped; it never aborts the account.
    async fn persist_item(
        &self,
        patch: RecordPatch,
        collector: &IssueCollector,
    ) -> Result<Option<ContentRecord>> {
        let item_id = patch.item_id.clone();
        match self.content.upsert(patch).await {
            Ok(record) => Ok(Some(record)),
            Err(SyncError::Database(message)) => {
                warn!(item_id = %item_id, message = %message, "Item persist failed, skipping");
                collector.add_issue(
                    IssueKind::FetchFailed,
                    Some(item_id),
                    format!("persist failed: {}", message),
                    Vec::new(),
                    None,
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    // ========================================================================
    // Progress & Media
    // ========================================================================

    /// Count one processed item; every [`PROGRESS_BATCH`] items (or on the
    /// last one) persist progress and the heartbeat in one write.
    async fn advance_progress(&self, job: &mut AccountSyncJob, last: bool) -> Result<()> {
        job.update_progress(job.loaded_items + 1, job.total_items)?;
        if job.loaded_items % self.config.progress_batch == 0 || last {
            self.jobs
                .update_progress(
                    &job.account_id,
                    job.loaded_items,
                    job.total_items,
                    current_timestamp(),
                )
                .await?;
            self.emit_progress(job);
        }
        Ok(())
    }

    async fn submit_cover(&self, summary: &ItemSummary, collector: &IssueCollector) {
        let Some(url) = summary.cover_url.as_deref() else {
            return;
        };
        if let Err(e) = self.downloads.submit_cover(&summary.item_id, url).await {
            warn!(item_id = %summary.item_id, error = %e, "Cover download submission failed");
            collector.add_issue(
                IssueKind::MediaFailed,
                Some(summary.item_id.clone()),
                e.to_string(),
                Vec::new(),
                None,
            );
        }
    }

    async fn submit_full_media(&self, record: ContentRecord, collector: &IssueCollector) {
        if record.cover_remote_url.is_none() && record.image_urls.is_empty() {
            return;
        }
        let item_id = record.item_id.clone();
        if let Err(e) = self.downloads.submit_full_media(record).await {
            warn!(item_id = %item_id, error = %e, "Media download submission failed");
            collector.add_issue(
                IssueKind::MediaFailed,
                Some(item_id),
                e.to_string(),
                Vec::new(),
                None,
            );
        }
    }

    fn emit_progress(&self, job: &AccountSyncJob) {
        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::Progress {
                account_id: job.account_id.clone(),
                status: job.status.as_str().to_string(),
                percent: job.progress_percent,
                loaded: job.loaded_items,
                total: job.total_items,
            }))
            .ok();
    }

    fn emit_log(
        &self,
        severity: EventSeverity,
        message: String,
        account_id: Option<&str>,
        item_id: Option<&str>,
    ) {
        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::Log {
                severity,
                message,
                account_id: account_id.map(String::from),
                item_id: item_id.map(String::from),
                extra: None,
            }))
            .ok();
    }
}

fn map_listing_error(e: source_traits::FetchError) -> SyncError {
    match e.kind {
        FailureKind::AuthInvalid => SyncError::AuthInvalid(e.message),
        _ => SyncError::Source(e.message),
    }
}

fn truncate_message(message: &str) -> String {
    if message.chars().count() <= MAX_ERROR_MESSAGE_LEN {
        message.to_string()
    } else {
        message.chars().take(MAX_ERROR_MESSAGE_LEN).collect()
    }
}

fn advisory_message(problem_items: u32) -> String {
    if problem_items == 1 {
        "completed with 1 issue".to_string()
    } else {
        format!("completed with {} issues", problem_items)
    }
}

// ============================================================================
// Tests
// ============================================================================
