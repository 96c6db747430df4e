//! # Media Download Queue
//!
//! Bounded worker pool that downloads cover and gallery images alongside
//! the sync pass.
//!
//! ## Overview
//!
//! Tasks are queued over a bounded channel and drained by a fixed set of
//! workers. Downloads are decoupled from the sync loop: a slow CDN never
//! stalls item processing, and a failed image never fails the job. Videos
//! are never downloaded; only their cover frame is.
//!
//! Every write is guarded by an on-disk check, so resubmitting the same
//! item touches the network zero times once its files are in place.
//!
//! ## Usage
//!
//! ```ignore
//! use core_sync::{DownloadConfig, DownloadQueue, ReqwestFetcher};
//!
//! let queue = DownloadQueue::new(config, Arc::new(fetcher), sink);
//! queue.submit_cover("item-1", "https://cdn/cover.jpg").await?;
//! queue.wait_for_completion(Duration::from_secs(60)).await;
//! ```

use crate::error::{Result, SyncError};
use crate::merge::MIN_VALID_FILE_BYTES;
use crate::model::ContentRecord;
use async_trait::async_trait;
use bytes::Bytes;
use source_traits::MediaFetcher;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, Notify};
use tracing::{debug, warn};

/// Default number of download workers
pub const DEFAULT_WORKERS: usize = 4;

/// Default task channel capacity
const DEFAULT_QUEUE_CAPACITY: usize = 256;

// ============================================================================
// Configuration
// ============================================================================

/// Download queue configuration.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Number of concurrent workers
    pub workers: usize,
    /// Bounded channel capacity; submission backpressures when full
    pub queue_capacity: usize,
    /// Root directory for downloaded media, one subdirectory per item
    pub media_root: PathBuf,
    /// Alternate cover URL templates tried when the primary URL fails.
    /// `{id}` expands to the item id.
    pub fallback_templates: Vec<String>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            media_root: PathBuf::from("media"),
            fallback_templates: Vec::new(),
        }
    }
}

// ============================================================================
// Cover Sink
// ============================================================================

/// Receiver for the local cover path once a cover lands on disk.
///
/// Workers call this after the originating batch may have finished; the
/// implementation must tolerate late invocation.
#[async_trait]
pub trait CoverSink: Send + Sync {
    async fn set_cover_path(&self, item_id: &str, local_path: &str) -> Result<()>;
}

#[async_trait]
impl CoverSink for crate::repository::SqliteContentStore {
    async fn set_cover_path(&self, item_id: &str, local_path: &str) -> Result<()> {
        use crate::repository::ContentStore;
        self.update_cover_path(item_id, local_path).await
    }
}

// ============================================================================
// Tasks & Stats
// ============================================================================

/// One unit of download work.
#[derive(Debug, Clone)]
enum DownloadTask {
    /// Fetch the cover image for one item
    Cover { item_id: String, url: String },
    /// Fetch the cover plus every gallery image for one item. The record
    /// is a snapshot; workers never read the store.
    FullMedia { record: Box<ContentRecord> },
}

/// Counters for a queue's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DownloadStats {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub pending: u64,
}

#[derive(Default)]
struct StatsInner {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    pending: AtomicU64,
}

// ============================================================================
// Download Queue
// ============================================================================

/// Bounded media download worker pool.
pub struct DownloadQueue {
    tx: mpsc::Sender<DownloadTask>,
    stats: Arc<StatsInner>,
    drained: Arc<Notify>,
}

impl DownloadQueue {
    /// Spawn `config.workers` workers draining a shared bounded channel.
    pub fn new(
        config: DownloadConfig,
        fetcher: Arc<dyn MediaFetcher>,
        sink: Arc<dyn CoverSink>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let stats = Arc::new(StatsInner::default());
        let drained = Arc::new(Notify::new());
        let config = Arc::new(config);

        for worker_id in 0..config.workers.max(1) {
            let rx = Arc::clone(&rx);
            let stats = Arc::clone(&stats);
            let drained = Arc::clone(&drained);
            let fetcher = Arc::clone(&fetcher);
            let sink = Arc::clone(&sink);
            let config = Arc::clone(&config);

            tokio::spawn(async move {
                loop {
                    let task = {
                        let mut rx = rx.lock().await;
                        rx.recv().await
                    };
                    let Some(task) = task else {
                        debug!(worker_id, "Download worker shutting down");
                        break;
                    };

                    let ok = process_task(&config, fetcher.as_ref(), sink.as_ref(), task).await;
                    if ok {
                        stats.completed.fetch_add(1, Ordering::Relaxed);
                    } else {
                        stats.failed.fetch_add(1, Ordering::Relaxed);
                    }
                    stats.pending.fetch_sub(1, Ordering::Relaxed);
                    drained.notify_waiters();
                }
            });
        }

        Self { tx, stats, drained }
    }

    /// Queue a cover download. Backpressures when the channel is full.
    pub async fn submit_cover(&self, item_id: &str, url: &str) -> Result<()> {
        self.submit(DownloadTask::Cover {
            item_id: item_id.to_string(),
            url: url.to_string(),
        })
        .await
    }

    /// Queue the cover plus gallery images for one item.
    pub async fn submit_full_media(&self, record: ContentRecord) -> Result<()> {
        self.submit(DownloadTask::FullMedia {
            record: Box::new(record),
        })
        .await
    }

    async fn submit(&self, task: DownloadTask) -> Result<()> {
        self.stats.submitted.fetch_add(1, Ordering::Relaxed);
        self.stats.pending.fetch_add(1, Ordering::Relaxed);

        if self.tx.send(task).await.is_err() {
            self.stats.submitted.fetch_sub(1, Ordering::Relaxed);
            self.stats.pending.fetch_sub(1, Ordering::Relaxed);
            return Err(SyncError::QueueClosed(
                "download workers have shut down".to_string(),
            ));
        }

        Ok(())
    }

    /// Wait until every queued task has been processed, or `timeout`
    /// elapses. Returns `true` when the queue drained in time.
    pub async fn wait_for_completion(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if self.stats.pending.load(Ordering::Relaxed) == 0 {
                return true;
            }
            let notified = self.drained.notified();
            if self.stats.pending.load(Ordering::Relaxed) == 0 {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.stats.pending.load(Ordering::Relaxed) == 0;
            }
        }
    }

    /// Snapshot of the queue counters.
    pub fn stats(&self) -> DownloadStats {
        DownloadStats {
            submitted: self.stats.submitted.load(Ordering::Relaxed),
            completed: self.stats.completed.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            pending: self.stats.pending.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// Worker Logic
// ============================================================================

async fn process_task(
    config: &DownloadConfig,
    fetcher: &dyn MediaFetcher,
    sink: &dyn CoverSink,
    task: DownloadTask,
) -> bool {
    match task {
        DownloadTask::Cover { item_id, url } => {
            download_cover(config, fetcher, sink, &item_id, &url).await
        }
        DownloadTask::FullMedia { record } => {
            let mut ok = true;
            if let Some(cover_url) = record.cover_remote_url.as_deref() {
                ok &= download_cover(config, fetcher, sink, &record.item_id, cover_url).await;
            }
            // Galleries only; single-image covers and video frames are
            // already covered above.
            if !record.is_video() && record.image_urls.len() > 1 {
                for (idx, image_url) in record.image_urls.iter().enumerate() {
                    let filename = format!("image_{}.jpg", idx);
                    ok &= download_to(
                        config,
                        fetcher,
                        &record.item_id,
                        &filename,
                        std::slice::from_ref(image_url),
                    )
                    .await
                    .is_some();
                }
            }
            ok
        }
    }
}

async fn download_cover(
    config: &DownloadConfig,
    fetcher: &dyn MediaFetcher,
    sink: &dyn CoverSink,
    item_id: &str,
    url: &str,
) -> bool {
    let mut candidates = vec![url.to_string()];
    for template in &config.fallback_templates {
        let candidate = template.replace("{id}", item_id);
        if candidate != url {
            candidates.push(candidate);
        }
    }

    let Some(relative) = download_to(config, fetcher, item_id, "cover.jpg", &candidates).await
    else {
        return false;
    };

    if let Err(e) = sink.set_cover_path(item_id, &relative).await {
        warn!(item_id, error = %e, "Failed to record cover path");
        return false;
    }
    true
}

/// Download the first candidate URL that yields a valid payload into
/// `<media_root>/<item_id>/<filename>`. Skips the network entirely when a
/// valid file already exists. Returns the store-relative path on success.
async fn download_to(
    config: &DownloadConfig,
    fetcher: &dyn MediaFetcher,
    item_id: &str,
    filename: &str,
    candidates: &[String],
) -> Option<String> {
    let relative = format!("{}/{}", item_id, filename);
    let path = config.media_root.join(item_id).join(filename);

    if file_is_valid(&path).await {
        debug!(item_id, filename, "Media already on disk, skipping download");
        return Some(relative);
    }

    let bytes = fetch_with_fallback(fetcher, item_id, candidates).await?;
    if (bytes.len() as u64) < MIN_VALID_FILE_BYTES {
        warn!(
            item_id,
            filename,
            size = bytes.len(),
            "Downloaded payload too small, discarding"
        );
        return None;
    }

    if let Err(e) = write_media(&path, &bytes).await {
        warn!(item_id, filename, error = %e, "Failed to write media file");
        return None;
    }

    debug!(item_id, filename, size = bytes.len(), "Media downloaded");
    Some(relative)
}

async fn fetch_with_fallback(
    fetcher: &dyn MediaFetcher,
    item_id: &str,
    candidates: &[String],
) -> Option<Bytes> {
    for url in candidates {
        match fetcher.fetch_bytes(url).await {
            Ok(bytes) => return Some(bytes),
            Err(e) => {
                warn!(item_id, url = %url, error = %e, "Media fetch failed");
            }
        }
    }
    None
}

async fn write_media(path: &Path, bytes: &Bytes) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await
}

async fn file_is_valid(path: &Path) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(meta) => meta.is_file() && meta.len() > MIN_VALID_FILE_BYTES,
        Err(_) => false,
    }
}

// ============================================================================
// HTTP Fetcher
// ============================================================================

/// [`MediaFetcher`] backed by a shared `reqwest` client.
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    /// Build a fetcher with the given per-request timeout.
    pub fn new(timeout: Duration) -> source_traits::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| source_traits::FetchError::other(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl MediaFetcher for ReqwestFetcher {
    async fn fetch_bytes(&self, url: &str) -> source_traits::Result<Bytes> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| source_traits::FetchError::from_message(e.to_string()))?;

        let response = response
            .error_for_status()
            .map_err(|e| source_traits::FetchError::from_message(e.to_string()))?;

        response
            .bytes()
            .await
            .map_err(|e| source_traits::FetchError::from_message(e.to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use source_traits::FetchError;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicU32;

    struct ScriptedFetcher {
        /// URLs that fail; everything else yields a valid payload.
        failing: HashSet<String>,
        payload_len: usize,
        calls: AtomicU32,
    }

    impl ScriptedFetcher {
        fn new() -> Self {
            Self {
                failing: HashSet::new(),
                payload_len: 2048,
                calls: AtomicU32::new(0),
            }
        }

        fn failing(mut self, url: &str) -> Self {
            self.failing.insert(url.to_string());
            self
        }

        fn with_payload_len(mut self, len: usize) -> Self {
            self.payload_len = len;
            self
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::Relaxed)
        }
    }

    #[async_trait]
    impl MediaFetcher for ScriptedFetcher {
        async fn fetch_bytes(&self, url: &str) -> source_traits::Result<Bytes> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if self.failing.contains(url) {
                return Err(FetchError::other(format!("unreachable: {}", url)));
            }
            Ok(Bytes::from(vec![0u8; self.payload_len]))
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        paths: std::sync::Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl CoverSink for RecordingSink {
        async fn set_cover_path(&self, item_id: &str, local_path: &str) -> Result<()> {
            self.paths
                .lock()
                .unwrap()
                .push((item_id.to_string(), local_path.to_string()));
            Ok(())
        }
    }

    fn temp_media_root() -> PathBuf {
        std::env::temp_dir().join(format!("dlq-test-{}", uuid::Uuid::new_v4()))
    }

    fn queue_with(
        media_root: PathBuf,
        fetcher: Arc<ScriptedFetcher>,
        sink: Arc<RecordingSink>,
        fallback_templates: Vec<String>,
    ) -> DownloadQueue {
        DownloadQueue::new(
            DownloadConfig {
                workers: 2,
                media_root,
                fallback_templates,
                ..Default::default()
            },
            fetcher,
            sink,
        )
    }

    fn gallery_record(item_id: &str, image_urls: Vec<&str>) -> ContentRecord {
        ContentRecord {
            item_id: item_id.to_string(),
            owner_id: "owner-1".to_string(),
            kind: Some("normal".to_string()),
            cover_remote_url: Some(format!("https://cdn/{}/cover", item_id)),
            image_urls: image_urls.into_iter().map(String::from).collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_cover_download_writes_file_and_notifies_sink() {
        let root = temp_media_root();
        let fetcher = Arc::new(ScriptedFetcher::new());
        let sink = Arc::new(RecordingSink::default());
        let queue = queue_with(root.clone(), Arc::clone(&fetcher), Arc::clone(&sink), vec![]);

        queue
            .submit_cover("item-1", "https://cdn/item-1/cover")
            .await
            .unwrap();
        assert!(queue.wait_for_completion(Duration::from_secs(5)).await);

        let data = tokio::fs::read(root.join("item-1").join("cover.jpg"))
            .await
            .unwrap();
        assert_eq!(data.len(), 2048);
        assert_eq!(
            sink.paths.lock().unwrap().as_slice(),
            &[("item-1".to_string(), "item-1/cover.jpg".to_string())]
        );
        assert_eq!(queue.stats().completed, 1);

        tokio::fs::remove_dir_all(&root).await.ok();
    }

    #[tokio::test]
    async fn test_existing_valid_file_skips_network() {
        let root = temp_media_root();
        tokio::fs::create_dir_all(root.join("item-1")).await.unwrap();
        tokio::fs::write(root.join("item-1").join("cover.jpg"), vec![0u8; 4096])
            .await
            .unwrap();

        let fetcher = Arc::new(ScriptedFetcher::new());
        let sink = Arc::new(RecordingSink::default());
        let queue = queue_with(root.clone(), Arc::clone(&fetcher), Arc::clone(&sink), vec![]);

        queue
            .submit_cover("item-1", "https://cdn/item-1/cover")
            .await
            .unwrap();
        assert!(queue.wait_for_completion(Duration::from_secs(5)).await);

        assert_eq!(fetcher.call_count(), 0);
        // Sink still learns the path, so resubmitted items heal a missing
        // database column.
        assert_eq!(sink.paths.lock().unwrap().len(), 1);

        tokio::fs::remove_dir_all(&root).await.ok();
    }

    #[tokio::test]
    async fn test_undersized_existing_file_is_redownloaded() {
        let root = temp_media_root();
        tokio::fs::create_dir_all(root.join("item-1")).await.unwrap();
        tokio::fs::write(root.join("item-1").join("cover.jpg"), vec![0u8; 100])
            .await
            .unwrap();

        let fetcher = Arc::new(ScriptedFetcher::new());
        let sink = Arc::new(RecordingSink::default());
        let queue = queue_with(root.clone(), Arc::clone(&fetcher), Arc::clone(&sink), vec![]);

        queue
            .submit_cover("item-1", "https://cdn/item-1/cover")
            .await
            .unwrap();
        assert!(queue.wait_for_completion(Duration::from_secs(5)).await);

        assert_eq!(fetcher.call_count(), 1);
        let data = tokio::fs::read(root.join("item-1").join("cover.jpg"))
            .await
            .unwrap();
        assert_eq!(data.len(), 2048);

        tokio::fs::remove_dir_all(&root).await.ok();
    }

    #[tokio::test]
    async fn test_fallback_template_used_when_primary_fails() {
        let root = temp_media_root();
        let fetcher = Arc::new(ScriptedFetcher::new().failing("https://cdn/item-1/cover"));
        let sink = Arc::new(RecordingSink::default());
        let queue = queue_with(
            root.clone(),
            Arc::clone(&fetcher),
            Arc::clone(&sink),
            vec!["https://mirror/{id}/cover".to_string()],
        );

        queue
            .submit_cover("item-1", "https://cdn/item-1/cover")
            .await
            .unwrap();
        assert!(queue.wait_for_completion(Duration::from_secs(5)).await);

        assert_eq!(fetcher.call_count(), 2);
        assert_eq!(queue.stats().completed, 1);
        assert!(root.join("item-1").join("cover.jpg").exists());

        tokio::fs::remove_dir_all(&root).await.ok();
    }

    #[tokio::test]
    async fn test_all_candidates_failing_counts_as_failed() {
        let root = temp_media_root();
        let fetcher = Arc::new(ScriptedFetcher::new().failing("https://cdn/item-1/cover"));
        let sink = Arc::new(RecordingSink::default());
        let queue = queue_with(root.clone(), Arc::clone(&fetcher), Arc::clone(&sink), vec![]);

        queue
            .submit_cover("item-1", "https://cdn/item-1/cover")
            .await
            .unwrap();
        assert!(queue.wait_for_completion(Duration::from_secs(5)).await);

        let stats = queue.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.completed, 0);
        assert!(sink.paths.lock().unwrap().is_empty());

        tokio::fs::remove_dir_all(&root).await.ok();
    }

    #[tokio::test]
    async fn test_undersized_payload_is_discarded() {
        let root = temp_media_root();
        let fetcher = Arc::new(ScriptedFetcher::new().with_payload_len(10));
        let sink = Arc::new(RecordingSink::default());
        let queue = queue_with(root.clone(), Arc::clone(&fetcher), Arc::clone(&sink), vec![]);

        queue
            .submit_cover("item-1", "https://cdn/item-1/cover")
            .await
            .unwrap();
        assert!(queue.wait_for_completion(Duration::from_secs(5)).await);

        assert_eq!(queue.stats().failed, 1);
        assert!(!root.join("item-1").join("cover.jpg").exists());

        tokio::fs::remove_dir_all(&root).await.ok();
    }

    #[tokio::test]
    async fn test_full_media_downloads_gallery_images() {
        let root = temp_media_root();
        let fetcher = Arc::new(ScriptedFetcher::new());
        let sink = Arc::new(RecordingSink::default());
        let queue = queue_with(root.clone(), Arc::clone(&fetcher), Arc::clone(&sink), vec![]);

        let record = gallery_record("item-1", vec!["https://cdn/a", "https://cdn/b", "https://cdn/c"]);
        queue.submit_full_media(record).await.unwrap();
        assert!(queue.wait_for_completion(Duration::from_secs(5)).await);

        for idx in 0..3 {
            let path = root.join("item-1").join(format!("image_{}.jpg", idx));
            assert!(path.exists(), "missing {:?}", path);
        }
        assert!(root.join("item-1").join("cover.jpg").exists());
        assert_eq!(queue.stats().completed, 1);

        tokio::fs::remove_dir_all(&root).await.ok();
    }

    #[tokio::test]
    async fn test_full_media_skips_video_payloads() {
        let root = temp_media_root();
        let fetcher = Arc::new(ScriptedFetcher::new());
        let sink = Arc::new(RecordingSink::default());
        let queue = queue_with(root.clone(), Arc::clone(&fetcher), Arc::clone(&sink), vec![]);

        let mut record = gallery_record("item-1", vec!["https://cdn/a", "https://cdn/b"]);
        record.kind = Some("video".to_string());
        record.video_url = Some("https://cdn/item-1/video".to_string());
        queue.submit_full_media(record).await.unwrap();
        assert!(queue.wait_for_completion(Duration::from_secs(5)).await);

        // Only the cover frame is fetched.
        assert_eq!(fetcher.call_count(), 1);
        assert!(root.join("item-1").join("cover.jpg").exists());
        assert!(!root.join("item-1").join("image_0.jpg").exists());

        tokio::fs::remove_dir_all(&root).await.ok();
    }

    #[tokio::test]
    async fn test_wait_for_completion_empty_queue() {
        let queue = queue_with(
            temp_media_root(),
            Arc::new(ScriptedFetcher::new()),
            Arc::new(RecordingSink::default()),
            vec![],
        );
        assert!(queue.wait_for_completion(Duration::from_millis(50)).await);
    }
}
