//! # Record & Job Repositories
//!
//! SQLite persistence for content records and account sync jobs.
//!
//! ## Overview
//!
//! Two repositories share one pool:
//! - [`ContentStore`]: upserts fetched items through the non-regression
//!   merge policy; the cover-path column has its own single-column update
//!   so download callbacks never conflict with the batch worker
//! - [`JobStore`]: per-account job rows, batched progress + heartbeat
//!   writes, and the stale-job queries the heartbeat monitor runs

use crate::job::percent;
use crate::merge::{merge_record, RecordPatch};
use crate::model::ContentRecord;
use crate::{AccountSyncJob, JobStatus, Result, SyncError, SyncMode};
use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};

// ============================================================================
// Repository Traits
// ============================================================================

/// Persistence for content records.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Merge one patch into the store under the non-regression rules.
    /// Returns the record as stored after the merge.
    async fn upsert(&self, patch: RecordPatch) -> Result<ContentRecord>;

    /// Merge a batch of patches in one transaction. Used by fast mode.
    async fn bulk_upsert(&self, patches: Vec<RecordPatch>) -> Result<u32>;

    /// Find a record by item id.
    async fn find_by_id(&self, item_id: &str) -> Result<Option<ContentRecord>>;

    /// All records owned by one account.
    async fn find_by_owner(&self, owner_id: &str) -> Result<Vec<ContentRecord>>;

    /// Write only the cover-local-path column. Called from download
    /// workers after the originating batch may already have moved on.
    async fn update_cover_path(&self, item_id: &str, local_path: &str) -> Result<()>;
}

/// Persistence for account sync jobs.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create or reset the account's job row to `pending` for a new batch.
    /// `last_sync_at` survives the reset.
    async fn reset_pending(&self, account_id: &str, mode: SyncMode) -> Result<()>;

    /// Fetch the account's job row.
    async fn get(&self, account_id: &str) -> Result<Option<AccountSyncJob>>;

    /// Write the full job row.
    async fn save(&self, job: &AccountSyncJob) -> Result<()>;

    /// Batched progress write: loaded/total/percent and the heartbeat in
    /// one statement.
    async fn update_progress(
        &self,
        account_id: &str,
        loaded: u32,
        total: u32,
        heartbeat_at: i64,
    ) -> Result<()>;

    /// Set the job status and error message.
    async fn set_status(
        &self,
        account_id: &str,
        status: JobStatus,
        error_message: Option<&str>,
    ) -> Result<()>;

    /// Persist the finalized issue summary blob (JSON).
    async fn save_summary(&self, account_id: &str, summary: &str) -> Result<()>;

    /// Jobs in `processing` whose heartbeat is null or older than `cutoff`
    /// (Unix epoch seconds).
    async fn find_stale(&self, cutoff: i64) -> Result<Vec<AccountSyncJob>>;

    /// Fail every stale `processing` job in one statement, clearing its
    /// heartbeat. Returns the number of reaped jobs.
    async fn reap_stale(&self, cutoff: i64, message: &str) -> Result<u64>;

    /// All jobs currently in `processing`.
    async fn find_processing(&self) -> Result<Vec<AccountSyncJob>>;
}

// ============================================================================
// SQLite Implementations
// ============================================================================

/// SQLite implementation of [`ContentStore`].
pub struct SqliteContentStore {
    pool: SqlitePool,
}

impl SqliteContentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the records table and indexes if they do not exist.
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS content_records (
                item_id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                owner_name TEXT,
                owner_avatar_url TEXT,
                title TEXT,
                description TEXT,
                kind TEXT,
                like_count INTEGER,
                save_count INTEGER,
                comment_count INTEGER,
                share_count INTEGER,
                published_at TEXT,
                video_url TEXT,
                image_urls TEXT NOT NULL DEFAULT '[]',
                tags TEXT NOT NULL DEFAULT '[]',
                ip_location TEXT,
                cover_remote_url TEXT,
                cover_local_path TEXT,
                access_token TEXT,
                last_updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_content_records_owner
             ON content_records(owner_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Database row representation of a content record
#[derive(Debug, FromRow)]
struct ContentRecordRow {
    item_id: String,
    owner_id: String,
    owner_name: Option<String>,
    owner_avatar_url: Option<String>,
    title: Option<String>,
    description: Option<String>,
    kind: Option<String>,
    like_count: Option<i64>,
    save_count: Option<i64>,
    comment_count: Option<i64>,
    share_count: Option<i64>,
    published_at: Option<String>,
    video_url: Option<String>,
    image_urls: String,
    tags: String,
    ip_location: Option<String>,
    cover_remote_url: Option<String>,
    cover_local_path: Option<String>,
    access_token: Option<String>,
    last_updated_at: i64,
}

impl TryFrom<ContentRecordRow> for ContentRecord {
    type Error = SyncError;

    fn try_from(row: ContentRecordRow) -> Result<Self> {
        let image_urls: Vec<String> = serde_json::from_str(&row.image_urls)
            .map_err(|e| SyncError::Database(format!("Invalid image_urls JSON: {}", e)))?;
        let tags: Vec<String> = serde_json::from_str(&row.tags)
            .map_err(|e| SyncError::Database(format!("Invalid tags JSON: {}", e)))?;

        Ok(ContentRecord {
            item_id: row.item_id,
            owner_id: row.owner_id,
            owner_name: row.owner_name,
            owner_avatar_url: row.owner_avatar_url,
            title: row.title,
            description: row.description,
            kind: row.kind,
            like_count: row.like_count,
            save_count: row.save_count,
            comment_count: row.comment_count,
            share_count: row.share_count,
            published_at: row.published_at,
            video_url: row.video_url,
            image_urls,
            tags,
            ip_location: row.ip_location,
            cover_remote_url: row.cover_remote_url,
            cover_local_path: row.cover_local_path,
            access_token: row.access_token,
            last_updated_at: row.last_updated_at,
        })
    }
}

const SELECT_RECORD: &str = r#"
    SELECT item_id, owner_id, owner_name, owner_avatar_url, title,
           description, kind, like_count, save_count, comment_count,
           share_count, published_at, video_url, image_urls, tags,
           ip_location, cover_remote_url, cover_local_path, access_token,
           last_updated_at
    FROM content_records
"#;

async fn write_record<'e, E>(executor: E, record: &ContentRecord) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let image_urls = serde_json::to_string(&record.image_urls)
        .map_err(|e| SyncError::Database(e.to_string()))?;
    let tags =
        serde_json::to_string(&record.tags).map_err(|e| SyncError::Database(e.to_string()))?;

    sqlx::query(
        r#"
        INSERT OR REPLACE INTO content_records (
            item_id, owner_id, owner_name, owner_avatar_url, title,
            description, kind, like_count, save_count, comment_count,
            share_count, published_at, video_url, image_urls, tags,
            ip_location, cover_remote_url, cover_local_path, access_token,
            last_updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.item_id)
    .bind(&record.owner_id)
    .bind(&record.owner_name)
    .bind(&record.owner_avatar_url)
    .bind(&record.title)
    .bind(&record.description)
    .bind(&record.kind)
    .bind(record.like_count)
    .bind(record.save_count)
    .bind(record.comment_count)
    .bind(record.share_count)
    .bind(&record.published_at)
    .bind(&record.video_url)
    .bind(image_urls)
    .bind(tags)
    .bind(&record.ip_location)
    .bind(&record.cover_remote_url)
    .bind(&record.cover_local_path)
    .bind(&record.access_token)
    .bind(record.last_updated_at)
    .execute(executor)
    .await?;

    Ok(())
}

#[async_trait]
impl ContentStore for SqliteContentStore {
    async fn upsert(&self, patch: RecordPatch) -> Result<ContentRecord> {
        let existing = self.find_by_id(&patch.item_id).await?;
        let merged = merge_record(existing, patch);
        write_record(&self.pool, &merged).await?;
        Ok(merged)
    }

    async fn bulk_upsert(&self, patches: Vec<RecordPatch>) -> Result<u32> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0u32;

        for patch in patches {
            let row = sqlx::query_as::<_, ContentRecordRow>(
                &format!("{} WHERE item_id = ?", SELECT_RECORD),
            )
            .bind(&patch.item_id)
            .fetch_optional(&mut *tx)
            .await?;

            let existing = row.map(ContentRecord::try_from).transpose()?;
            let merged = merge_record(existing, patch);
            write_record(&mut *tx, &merged).await?;
            written += 1;
        }

        tx.commit().await?;
        Ok(written)
    }

    async fn find_by_id(&self, item_id: &str) -> Result<Option<ContentRecord>> {
        let row =
            sqlx::query_as::<_, ContentRecordRow>(&format!("{} WHERE item_id = ?", SELECT_RECORD))
                .bind(item_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(ContentRecord::try_from).transpose()
    }

    async fn find_by_owner(&self, owner_id: &str) -> Result<Vec<ContentRecord>> {
        let rows = sqlx::query_as::<_, ContentRecordRow>(&format!(
            "{} WHERE owner_id = ? ORDER BY item_id",
            SELECT_RECORD
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ContentRecord::try_from).collect()
    }

    async fn update_cover_path(&self, item_id: &str, local_path: &str) -> Result<()> {
        sqlx::query("UPDATE content_records SET cover_local_path = ? WHERE item_id = ?")
            .bind(local_path)
            .bind(item_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

/// SQLite implementation of [`JobStore`].
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the jobs table if it does not exist.
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sync_jobs (
                account_id TEXT PRIMARY KEY,
                mode TEXT NOT NULL,
                status TEXT NOT NULL,
                total_items INTEGER NOT NULL DEFAULT 0,
                loaded_items INTEGER NOT NULL DEFAULT 0,
                progress_percent INTEGER NOT NULL DEFAULT 0,
                error_message TEXT,
                summary TEXT,
                heartbeat_at INTEGER,
                started_at INTEGER,
                last_sync_at INTEGER
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sync_jobs_status ON sync_jobs(status)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Database row representation of an account sync job
#[derive(Debug, FromRow)]
struct SyncJobRow {
    account_id: String,
    mode: String,
    status: String,
    total_items: i64,
    loaded_items: i64,
    progress_percent: i64,
    error_message: Option<String>,
    heartbeat_at: Option<i64>,
    started_at: Option<i64>,
    last_sync_at: Option<i64>,
}

impl TryFrom<SyncJobRow> for AccountSyncJob {
    type Error = SyncError;

    fn try_from(row: SyncJobRow) -> Result<Self> {
        Ok(AccountSyncJob {
            account_id: row.account_id,
            mode: row.mode.parse()?,
            status: row.status.parse()?,
            total_items: row.total_items as u32,
            loaded_items: row.loaded_items as u32,
            progress_percent: row.progress_percent as u8,
            error_message: row.error_message,
            heartbeat_at: row.heartbeat_at,
            started_at: row.started_at,
            last_sync_at: row.last_sync_at,
        })
    }
}

const SELECT_JOB: &str = r#"
    SELECT account_id, mode, status, total_items, loaded_items,
           progress_percent, error_message, heartbeat_at, started_at,
           last_sync_at
    FROM sync_jobs
"#;

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn reset_pending(&self, account_id: &str, mode: SyncMode) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_jobs (account_id, mode, status)
            VALUES (?, ?, 'pending')
            ON CONFLICT(account_id) DO UPDATE SET
                mode = excluded.mode,
                status = 'pending',
                total_items = 0,
                loaded_items = 0,
                progress_percent = 0,
                error_message = NULL,
                summary = NULL,
                heartbeat_at = NULL,
                started_at = NULL
            "#,
        )
        .bind(account_id)
        .bind(mode.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, account_id: &str) -> Result<Option<AccountSyncJob>> {
        let row = sqlx::query_as::<_, SyncJobRow>(&format!("{} WHERE account_id = ?", SELECT_JOB))
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(AccountSyncJob::try_from).transpose()
    }

    async fn save(&self, job: &AccountSyncJob) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE sync_jobs SET
                mode = ?,
                status = ?,
                total_items = ?,
                loaded_items = ?,
                progress_percent = ?,
                error_message = ?,
                heartbeat_at = ?,
                started_at = ?,
                last_sync_at = ?
            WHERE account_id = ?
            "#,
        )
        .bind(job.mode.as_str())
        .bind(job.status.as_str())
        .bind(job.total_items as i64)
        .bind(job.loaded_items as i64)
        .bind(job.progress_percent as i64)
        .bind(&job.error_message)
        .bind(job.heartbeat_at)
        .bind(job.started_at)
        .bind(job.last_sync_at)
        .bind(&job.account_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SyncError::JobNotFound {
                account_id: job.account_id.clone(),
            });
        }

        Ok(())
    }

    async fn update_progress(
        &self,
        account_id: &str,
        loaded: u32,
        total: u32,
        heartbeat_at: i64,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE sync_jobs SET
                loaded_items = ?,
                total_items = ?,
                progress_percent = ?,
                heartbeat_at = ?
            WHERE account_id = ?
            "#,
        )
        .bind(loaded as i64)
        .bind(total as i64)
        .bind(percent(loaded, total) as i64)
        .bind(heartbeat_at)
        .bind(account_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SyncError::JobNotFound {
                account_id: account_id.to_string(),
            });
        }

        Ok(())
    }

    async fn set_status(
        &self,
        account_id: &str,
        status: JobStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE sync_jobs SET
                status = ?,
                error_message = ?,
                heartbeat_at = CASE WHEN ? IN ('completed', 'failed')
                                    THEN NULL ELSE heartbeat_at END
            WHERE account_id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(error_message)
        .bind(status.as_str())
        .bind(account_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SyncError::JobNotFound {
                account_id: account_id.to_string(),
            });
        }

        Ok(())
    }

    async fn save_summary(&self, account_id: &str, summary: &str) -> Result<()> {
        sqlx::query("UPDATE sync_jobs SET summary = ? WHERE account_id = ?")
            .bind(summary)
            .bind(account_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn find_stale(&self, cutoff: i64) -> Result<Vec<AccountSyncJob>> {
        let rows = sqlx::query_as::<_, SyncJobRow>(&format!(
            "{} WHERE status = 'processing'
               AND (heartbeat_at IS NULL OR heartbeat_at < ?)",
            SELECT_JOB
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AccountSyncJob::try_from).collect()
    }

    async fn reap_stale(&self, cutoff: i64, message: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE sync_jobs SET
                status = 'failed',
                error_message = ?,
                heartbeat_at = NULL
            WHERE status = 'processing'
              AND (heartbeat_at IS NULL OR heartbeat_at < ?)
            "#,
        )
        .bind(message)
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn find_processing(&self) -> Result<Vec<AccountSyncJob>> {
        let rows = sqlx::query_as::<_, SyncJobRow>(&format!(
            "{} WHERE status = 'processing'",
            SELECT_JOB
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AccountSyncJob::try_from).collect()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::current_timestamp;
    use sqlx::sqlite::SqlitePoolOptions;

    pub(crate) async fn create_test_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .expect("in-memory pool")
    }

    async fn content_store() -> SqliteContentStore {
        let store = SqliteContentStore::new(create_test_pool().await);
        store.initialize().await.unwrap();
        store
    }

    async fn job_store() -> SqliteJobStore {
        let store = SqliteJobStore::new(create_test_pool().await);
        store.initialize().await.unwrap();
        store
    }

    fn detail_patch(item_id: &str) -> RecordPatch {
        RecordPatch {
            item_id: item_id.to_string(),
            owner_id: "owner-1".to_string(),
            title: Some("title".to_string()),
            description: Some("description".to_string()),
            kind: Some("normal".to_string()),
            like_count: Some(7),
            save_count: Some(3),
            comment_count: Some(1),
            share_count: Some(0),
            published_at: Some("2024-05-01".to_string()),
            image_urls: vec!["u0".to_string(), "u1".to_string(), "u2".to_string()],
            cover_remote_url: Some("https://cdn/cover".to_string()),
            ..Default::default()
        }
    }

    fn summary_patch(item_id: &str) -> RecordPatch {
        RecordPatch {
            item_id: item_id.to_string(),
            owner_id: "owner-1".to_string(),
            title: Some("title".to_string()),
            kind: Some("normal".to_string()),
            like_count: Some(9),
            image_urls: vec!["u0".to_string()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_upsert_insert_and_fetch() {
        let store = content_store().await;

        let stored = store.upsert(detail_patch("item-1")).await.unwrap();
        assert_eq!(stored.save_count, Some(3));

        let fetched = store.find_by_id("item-1").await.unwrap().unwrap();
        assert_eq!(fetched.item_id, "item-1");
        assert_eq!(fetched.image_urls.len(), 3);
        assert_eq!(fetched.published_at, Some("2024-05-01".to_string()));
    }

    #[tokio::test]
    async fn test_upsert_applies_non_regression_merge() {
        let store = content_store().await;

        store.upsert(detail_patch("item-1")).await.unwrap();
        let merged = store.upsert(summary_patch("item-1")).await.unwrap();

        assert_eq!(merged.like_count, Some(9));
        assert_eq!(merged.save_count, Some(3));
        assert_eq!(merged.image_urls.len(), 3);
        assert_eq!(merged.description, Some("description".to_string()));
    }

    #[tokio::test]
    async fn test_bulk_upsert() {
        let store = content_store().await;

        let written = store
            .bulk_upsert(vec![
                summary_patch("item-1"),
                summary_patch("item-2"),
                summary_patch("item-3"),
            ])
            .await
            .unwrap();
        assert_eq!(written, 3);

        let records = store.find_by_owner("owner-1").await.unwrap();
        assert_eq!(records.len(), 3);
    }

    #[tokio::test]
    async fn test_update_cover_path_touches_only_that_column() {
        let store = content_store().await;
        store.upsert(detail_patch("item-1")).await.unwrap();

        store
            .update_cover_path("item-1", "item-1/cover.jpg")
            .await
            .unwrap();

        let record = store.find_by_id("item-1").await.unwrap().unwrap();
        assert_eq!(record.cover_local_path, Some("item-1/cover.jpg".to_string()));
        assert_eq!(record.save_count, Some(3));
    }

    #[tokio::test]
    async fn test_cover_path_survives_later_merges() {
        let store = content_store().await;
        store.upsert(detail_patch("item-1")).await.unwrap();
        store
            .update_cover_path("item-1", "item-1/cover.jpg")
            .await
            .unwrap();

        store.upsert(summary_patch("item-1")).await.unwrap();

        let record = store.find_by_id("item-1").await.unwrap().unwrap();
        assert_eq!(record.cover_local_path, Some("item-1/cover.jpg".to_string()));
    }

    #[tokio::test]
    async fn test_reset_pending_creates_and_resets() {
        let store = job_store().await;

        store.reset_pending("acct-1", SyncMode::Deep).await.unwrap();
        let job = store.get("acct-1").await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.mode, SyncMode::Deep);

        // Move to a terminal state, then resubmit.
        let started = job.start().unwrap();
        store.save(&started).await.unwrap();
        let failed = started.fail("boom").unwrap();
        store.save(&failed).await.unwrap();

        store.reset_pending("acct-1", SyncMode::Fast).await.unwrap();
        let job = store.get("acct-1").await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.mode, SyncMode::Fast);
        assert!(job.error_message.is_none());
        assert!(job.heartbeat_at.is_none());
    }

    #[tokio::test]
    async fn test_reset_pending_preserves_last_sync_at() {
        let store = job_store().await;
        store.reset_pending("acct-1", SyncMode::Fast).await.unwrap();

        let job = store.get("acct-1").await.unwrap().unwrap();
        let completed = job.start().unwrap().complete(None).unwrap();
        store.save(&completed).await.unwrap();
        let last_sync = completed.last_sync_at;
        assert!(last_sync.is_some());

        store.reset_pending("acct-1", SyncMode::Deep).await.unwrap();
        let job = store.get("acct-1").await.unwrap().unwrap();
        assert_eq!(job.last_sync_at, last_sync);
    }

    #[tokio::test]
    async fn test_save_unknown_account_is_not_found() {
        let store = job_store().await;
        let job = AccountSyncJob::new("ghost", SyncMode::Fast);
        let result = store.save(&job).await;
        assert!(matches!(result, Err(SyncError::JobNotFound { .. })));
    }

    #[tokio::test]
    async fn test_update_progress_batched_write() {
        let store = job_store().await;
        store.reset_pending("acct-1", SyncMode::Deep).await.unwrap();
        let job = store.get("acct-1").await.unwrap().unwrap();
        store.save(&job.start().unwrap()).await.unwrap();

        let now = current_timestamp();
        store.update_progress("acct-1", 5, 20, now).await.unwrap();

        let job = store.get("acct-1").await.unwrap().unwrap();
        assert_eq!(job.loaded_items, 5);
        assert_eq!(job.total_items, 20);
        assert_eq!(job.progress_percent, 25);
        assert_eq!(job.heartbeat_at, Some(now));
    }

    #[tokio::test]
    async fn test_set_status_terminal_clears_heartbeat() {
        let store = job_store().await;
        store.reset_pending("acct-1", SyncMode::Deep).await.unwrap();
        let job = store.get("acct-1").await.unwrap().unwrap();
        store.save(&job.start().unwrap()).await.unwrap();

        store
            .set_status("acct-1", JobStatus::Failed, Some("stopped by operator"))
            .await
            .unwrap();

        let job = store.get("acct-1").await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message, Some("stopped by operator".to_string()));
        assert!(job.heartbeat_at.is_none());
    }

    #[tokio::test]
    async fn test_find_and_reap_stale() {
        let store = job_store().await;
        let now = current_timestamp();

        // Stale: heartbeat far in the past.
        store.reset_pending("stale", SyncMode::Deep).await.unwrap();
        let mut job = store.get("stale").await.unwrap().unwrap().start().unwrap();
        job.heartbeat_at = Some(now - 600);
        store.save(&job).await.unwrap();

        // Stale: null heartbeat while processing.
        store.reset_pending("null-hb", SyncMode::Deep).await.unwrap();
        let mut job = store.get("null-hb").await.unwrap().unwrap().start().unwrap();
        job.heartbeat_at = None;
        store.save(&job).await.unwrap();

        // Fresh: recent heartbeat.
        store.reset_pending("fresh", SyncMode::Deep).await.unwrap();
        let job = store.get("fresh").await.unwrap().unwrap().start().unwrap();
        store.save(&job).await.unwrap();

        let cutoff = now - 300;
        let stale = store.find_stale(cutoff).await.unwrap();
        let mut ids: Vec<_> = stale.iter().map(|j| j.account_id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["null-hb", "stale"]);

        let reaped = store.reap_stale(cutoff, "heartbeat timeout").await.unwrap();
        assert_eq!(reaped, 2);

        let job = store.get("stale").await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message, Some("heartbeat timeout".to_string()));
        assert!(job.heartbeat_at.is_none());

        let fresh = store.get("fresh").await.unwrap().unwrap();
        assert_eq!(fresh.status, JobStatus::Processing);
    }

    #[tokio::test]
    async fn test_save_summary() {
        let store = job_store().await;
        store.reset_pending("acct-1", SyncMode::Deep).await.unwrap();

        store
            .save_summary("acct-1", r#"{"total":3,"success":3}"#)
            .await
            .unwrap();

        let row: (Option<String>,) =
            sqlx::query_as("SELECT summary FROM sync_jobs WHERE account_id = ?")
                .bind("acct-1")
                .fetch_one(&store.pool)
                .await
                .unwrap();
        assert_eq!(row.0, Some(r#"{"total":3,"success":3}"#.to_string()));
    }
}
