//! # Heartbeat Monitor
//!
//! Reaps jobs whose worker died without reaching a terminal state.
//!
//! ## Overview
//!
//! Workers stamp a heartbeat into their job row on every progress write.
//! A job stuck in `processing` with a heartbeat older than
//! [`HEARTBEAT_TIMEOUT_SECS`] (or no heartbeat at all) has lost its
//! worker; the monitor fails it so the account can be resubmitted.

use crate::job::current_timestamp;
use crate::repository::JobStore;
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A `processing` job whose heartbeat is older than this is stale.
pub const HEARTBEAT_TIMEOUT_SECS: i64 = 300;

/// Error message written to reaped jobs.
const STALE_MESSAGE: &str = "sync worker stopped responding (heartbeat timeout)";

/// Periodic stale-job reaper.
pub struct HeartbeatMonitor {
    jobs: Arc<dyn JobStore>,
}

impl HeartbeatMonitor {
    pub fn new(jobs: Arc<dyn JobStore>) -> Self {
        Self { jobs }
    }

    /// Fail every `processing` job whose heartbeat predates `timeout`.
    /// Returns the number of jobs reaped.
    pub async fn cleanup_stale(&self, timeout: Duration) -> Result<u64> {
        let cutoff = current_timestamp() - timeout.as_secs() as i64;

        let stale = self.jobs.find_stale(cutoff).await?;
        if stale.is_empty() {
            return Ok(0);
        }

        for job in &stale {
            warn!(
                account_id = %job.account_id,
                heartbeat_at = ?job.heartbeat_at,
                "Reaping stale sync job"
            );
        }

        let reaped = self.jobs.reap_stale(cutoff, STALE_MESSAGE).await?;
        info!(reaped, "Stale sync jobs failed");
        Ok(reaped)
    }

    /// Run [`cleanup_stale`](Self::cleanup_stale) every `interval` until
    /// the token is cancelled. Errors are logged and the loop continues.
    pub async fn run_periodic(&self, interval: Duration, shutdown: CancellationToken) {
        let timeout = Duration::from_secs(HEARTBEAT_TIMEOUT_SECS as u64);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Heartbeat monitor shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.cleanup_stale(timeout).await {
                        warn!(error = %e, "Stale job cleanup failed");
                    }
                }
            }
        }
    }
}
