//! # Sync Orchestration Engine
//!
//! Synchronizes content published by tracked accounts on a rate-limiting
//! remote platform into a local store.
//!
//! ## Overview
//!
//! This crate manages the lifecycle of account sync jobs, including:
//! - Listing an account's items via [`ContentSource`](source_traits::ContentSource)
//! - Fast (list-only) and deep (per-item detail) fetch strategies
//! - Adaptive backoff against the platform's rate limiter
//! - Non-regressing merge of partial data into stored records
//! - Bounded concurrent media downloads
//! - Stale-job reaping after crashes or restarts
//!
//! ## Components
//!
//! - **Job State Machine** (`job`): account sync job lifecycle with validated transitions
//! - **Delay Controller** (`delay`): adaptive rate-limit backoff with jittered pacing
//! - **Issue Collector** (`issues`): capped per-job structured issue log and summary
//! - **Download Queue** (`download`): bounded worker pool for cover/media downloads
//! - **Heartbeat Monitor** (`monitor`): reaps jobs stuck in processing
//! - **Repository** (`repository`): SQLite persistence for records and jobs
//! - **Orchestrator** (`orchestrator`): drives the per-account/per-item algorithm

pub mod delay;
pub mod download;
pub mod error;
pub mod issues;
pub mod job;
pub mod merge;
pub mod model;
pub mod monitor;
pub mod orchestrator;
pub mod repository;

pub use delay::{DelayConfig, DelayController, DelaySnapshot};
pub use download::{
    CoverSink, DownloadConfig, DownloadQueue, DownloadStats, ReqwestFetcher,
};
pub use error::{Result, SyncError};
pub use issues::{IssueCollector, IssueKind, IssueRecord, JobSummary};
pub use job::{AccountSyncJob, JobStatus, SyncMode};
pub use merge::{merge_record, missing_required_fields, RecordPatch};
pub use model::ContentRecord;
pub use monitor::{HeartbeatMonitor, HEARTBEAT_TIMEOUT_SECS};
pub use orchestrator::{SyncConfig, SyncOrchestrator};
pub use repository::{
    ContentStore, JobStore, SqliteContentStore, SqliteJobStore,
};
