//! # Adaptive Delay Controller
//!
//! Paces per-item detail fetches against the platform's rate limiter.
//!
//! ## Overview
//!
//! The controller keeps one mutable state: the current base delay. A
//! rate-limit signal doubles it (capped); a run of consecutive successes
//! shrinks it back (floored). Emitted delays are jittered so request timing
//! never falls into a detectable pattern.
//!
//! One controller instance serves one orchestrator; it is reset at the
//! start of every batch.

use rand::Rng;
use serde::Serialize;
use std::sync::Mutex;
use std::time::Duration;

/// Tuning knobs for the delay controller.
#[derive(Debug, Clone)]
pub struct DelayConfig {
    /// Floor for the base delay
    pub min_delay: Duration,
    /// Ceiling for the base delay
    pub max_delay: Duration,
    /// Base delay after a reset
    pub initial_delay: Duration,
    /// Multiplier applied on each rate-limit signal
    pub backoff_factor: f64,
    /// Consecutive successes needed before the delay shrinks
    pub recovery_threshold: u32,
    /// Multiplier (< 1) applied once the recovery threshold is reached
    pub recovery_factor: f64,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
            initial_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
            recovery_threshold: 3,
            recovery_factor: 0.7,
        }
    }
}

/// Mutable controller state, guarded by one mutex.
#[derive(Debug)]
struct DelayState {
    current_delay_secs: f64,
    consecutive_successes: u32,
    rate_limit_count: u32,
}

/// Read-only view of the controller state for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DelaySnapshot {
    pub current_delay_secs: f64,
    pub consecutive_successes: u32,
    pub rate_limit_count: u32,
}

/// Thread-safe adaptive rate controller.
///
/// All methods take `&self`; the controller is shared behind `Arc` between
/// the orchestrator and anything that wants to inspect it.
#[derive(Debug)]
pub struct DelayController {
    config: DelayConfig,
    state: Mutex<DelayState>,
}

impl DelayController {
    pub fn new(config: DelayConfig) -> Self {
        let state = DelayState {
            current_delay_secs: config.initial_delay.as_secs_f64(),
            consecutive_successes: 0,
            rate_limit_count: 0,
        };
        Self {
            config,
            state: Mutex::new(state),
        }
    }

    /// The jittered pacing delay to sleep before the next detail fetch:
    /// current base delay scaled by a uniform factor in [0.8, 1.2].
    pub fn delay(&self) -> Duration {
        let base = self.lock().current_delay_secs;
        let jitter = rand::thread_rng().gen_range(0.8..1.2);
        Duration::from_secs_f64(base * jitter)
    }

    /// Register a rate-limit signal: grow the base delay by the backoff
    /// factor (capped at `max_delay`), reset the success streak.
    pub fn record_rate_limit(&self) {
        let max = self.config.max_delay.as_secs_f64();
        let mut state = self.lock();
        state.current_delay_secs = (state.current_delay_secs * self.config.backoff_factor).min(max);
        state.consecutive_successes = 0;
        state.rate_limit_count += 1;
    }

    /// Register a successful detail fetch. Once `recovery_threshold`
    /// successes accumulate without an intervening rate limit, the base
    /// delay shrinks by `recovery_factor` (floored at `min_delay`).
    pub fn record_success(&self) {
        let min = self.config.min_delay.as_secs_f64();
        let mut state = self.lock();
        state.consecutive_successes += 1;
        if state.consecutive_successes >= self.config.recovery_threshold {
            state.current_delay_secs =
                (state.current_delay_secs * self.config.recovery_factor).max(min);
            state.consecutive_successes = 0;
        }
    }

    /// The wait to apply after an observed rate limit, before retrying:
    /// twice the base delay, plus an escalation of 15s per rate limit seen
    /// this batch (capped at 120s), plus 5-15s of jitter.
    pub fn rate_limit_wait(&self) -> Duration {
        let (base, count) = {
            let state = self.lock();
            (state.current_delay_secs, state.rate_limit_count)
        };
        let escalation = (count as f64 * 15.0).min(120.0);
        let jitter = rand::thread_rng().gen_range(5.0..15.0);
        Duration::from_secs_f64(2.0 * base + escalation + jitter)
    }

    /// Back to the initial delay with zeroed counters. Called at the start
    /// of every batch.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.current_delay_secs = self.config.initial_delay.as_secs_f64();
        state.consecutive_successes = 0;
        state.rate_limit_count = 0;
    }

    /// Current state for diagnostics and logs.
    pub fn snapshot(&self) -> DelaySnapshot {
        let state = self.lock();
        DelaySnapshot {
            current_delay_secs: state.current_delay_secs,
            consecutive_successes: state.consecutive_successes,
            rate_limit_count: state.rate_limit_count,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DelayState> {
        // State stays coherent across a panicked holder; recover from
        // poisoning instead of propagating it.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for DelayController {
    fn default() -> Self {
        Self::new(DelayConfig::default())
    }
}
