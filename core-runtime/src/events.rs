//! # Event Bus System
//!
//! Event-driven progress reporting for the sync engine using
//! `tokio::sync::broadcast`. Transport layers (SSE, WebSocket, a TUI)
//! subscribe to the bus and forward events to clients; the engine emits and
//! never waits.
//!
//! ## Overview
//!
//! - **Event Types**: strongly-typed enums per domain ([`SyncEvent`],
//!   [`CredentialEvent`]) wrapped in [`CoreEvent`]
//! - **EventBus**: central broadcast channel
//! - **EventStream**: receiver wrapper with filtering
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{EventBus, CoreEvent, SyncEvent, EventSeverity};
//!
//! let event_bus = EventBus::new(100);
//!
//! let event = CoreEvent::Sync(SyncEvent::Log {
//!     severity: EventSeverity::Info,
//!     message: "starting sync".to_string(),
//!     account_id: Some("acct-1".to_string()),
//!     item_id: None,
//!     extra: None,
//! });
//!
//! // Delivery failures never affect sync correctness.
//! event_bus.emit(event).ok();
//! ```
//!
//! ## Error Handling
//!
//! `tokio::sync::broadcast` produces two receive errors:
//!
//! - `RecvError::Lagged(n)`: the subscriber missed `n` events. Non-fatal;
//!   progress reporting is allowed to drop events.
//! - `RecvError::Closed`: all senders dropped, treat as shutdown.
//!
//! ## Thread Safety
//!
//! `EventBus` is `Send + Sync` and cheap to clone; share it across spawned
//! tasks directly or behind `Arc`.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that fall behind by more than this receive
/// `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Sync lifecycle and progress events
    Sync(SyncEvent),
    /// Platform credential events
    Credential(CredentialEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Credential(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::Log { severity, .. }) => *severity,
            CoreEvent::Sync(SyncEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Credential(CredentialEvent::Invalidated { .. }) => EventSeverity::Error,
            CoreEvent::Sync(SyncEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Sync(SyncEvent::BatchStarted { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events emitted by the sync orchestrator.
///
/// `Log` is the free-form channel (per-retry notes, list-fetch results);
/// `Progress` and `Completed` are the structured ones a UI renders directly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// A sync batch was scheduled.
    BatchStarted {
        /// Accounts queued in this batch, in processing order.
        account_ids: Vec<String>,
        /// `"fast"` or `"deep"`.
        mode: String,
    },
    /// Free-form log line pushed to observers.
    Log {
        severity: EventSeverity,
        message: String,
        /// Account the line relates to, if any.
        account_id: Option<String>,
        /// Item the line relates to, if any.
        item_id: Option<String>,
        /// Structured payload for observers that want more than text.
        extra: Option<serde_json::Value>,
    },
    /// Per-account progress update.
    Progress {
        account_id: String,
        /// Current job status as text (`"processing"` etc).
        status: String,
        /// Progress percentage (0-100).
        percent: u8,
        /// Items persisted so far.
        loaded: u32,
        /// Total items in the account's listing.
        total: u32,
    },
    /// An account's job reached a terminal status.
    Completed {
        account_id: String,
        /// Terminal status as text (`"completed"` or `"failed"`).
        status: String,
        /// Finalized issue summary, when one was collected.
        summary: Option<serde_json::Value>,
    },
    /// The whole batch aborted before finishing its accounts.
    Failed {
        message: String,
        /// Accounts that never got processed.
        remaining_account_ids: Vec<String>,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::BatchStarted { .. } => "Sync batch started",
            SyncEvent::Log { .. } => "Sync log line",
            SyncEvent::Progress { .. } => "Sync progress update",
            SyncEvent::Completed { .. } => "Account sync finished",
            SyncEvent::Failed { .. } => "Sync batch failed",
        }
    }
}

// ============================================================================
// Credential Events
// ============================================================================

/// Events related to the platform credential.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum CredentialEvent {
    /// The active credential was rejected by the platform and invalidated.
    Invalidated {
        /// The platform message that triggered the invalidation.
        message: String,
    },
}

impl CredentialEvent {
    fn description(&self) -> &str {
        match self {
            CredentialEvent::Invalidated { .. } => "Credential invalidated",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally:
/// - multiple producers (clone the `EventBus`)
/// - multiple consumers (each `subscribe()` creates a new receiver)
/// - non-blocking sends, lagging detection for slow subscribers
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error when there are none. Callers on the sync path ignore the
    /// result (`.ok()`): observers are optional.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber to receive events.
    ///
    /// Each call creates an independent receiver seeing all future events;
    /// past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
///
/// ```rust
/// use core_runtime::events::{EventBus, EventStream, CoreEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut sync_only = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Sync(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Adds a filter; only matching events are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// `RecvError::Lagged(n)` when the subscriber fell behind by `n`
    /// events; `RecvError::Closed` when all senders are gone.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;

            let Some(filter) = &self.filter else {
                return Ok(event);
            };

            if filter(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` when no matching event is currently buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    let Some(filter) = &self.filter else {
                        return Some(Ok(event));
                    };

                    if filter(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_event(message: &str) -> CoreEvent {
        CoreEvent::Sync(SyncEvent::Log {
            severity: EventSeverity::Info,
            message: message.to_string(),
            account_id: None,
            item_id: None,
            extra: None,
        })
    }

    #[tokio::test]
    async fn test_emit_and_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(log_event("hello")).unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received, log_event("hello"));
    }

    #[tokio::test]
    async fn test_multiple_subscribers_each_receive() {
        let bus = EventBus::new(16);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.emit(log_event("fanout")).unwrap();

        assert_eq!(a.recv().await.unwrap(), log_event("fanout"));
        assert_eq!(b.recv().await.unwrap(), log_event("fanout"));
    }

    #[test]
    fn test_emit_without_subscribers_is_an_error() {
        let bus = EventBus::new(16);
        assert!(bus.emit(log_event("nobody home")).is_err());
    }

    #[test]
    fn test_subscriber_count() {
        let bus = EventBus::new(16);
        assert_eq!(bus.subscriber_count(), 0);
        let _rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_stream_filter_skips_non_matching() {
        let bus = EventBus::new(16);
        let mut stream = EventStream::new(bus.subscribe()).filter(|event| {
            matches!(
                event,
                CoreEvent::Sync(SyncEvent::Completed { .. }) | CoreEvent::Credential(_)
            )
        });

        bus.emit(log_event("noise")).unwrap();
        bus.emit(CoreEvent::Sync(SyncEvent::Completed {
            account_id: "acct-1".to_string(),
            status: "completed".to_string(),
            summary: None,
        }))
        .unwrap();

        let received = stream.recv().await.unwrap();
        assert!(matches!(
            received,
            CoreEvent::Sync(SyncEvent::Completed { ref account_id, .. }) if account_id == "acct-1"
        ));
    }

    #[test]
    fn test_try_recv_empty() {
        let bus = EventBus::new(16);
        let mut stream = EventStream::new(bus.subscribe());
        assert!(stream.try_recv().is_none());
    }

    #[test]
    fn test_severity_mapping() {
        let completed = CoreEvent::Sync(SyncEvent::Completed {
            account_id: "a".to_string(),
            status: "completed".to_string(),
            summary: None,
        });
        assert_eq!(completed.severity(), EventSeverity::Info);

        let invalidated = CoreEvent::Credential(CredentialEvent::Invalidated {
            message: "401".to_string(),
        });
        assert_eq!(invalidated.severity(), EventSeverity::Error);

        let warn = CoreEvent::Sync(SyncEvent::Log {
            severity: EventSeverity::Warning,
            message: "rate limited".to_string(),
            account_id: None,
            item_id: None,
            extra: None,
        });
        assert_eq!(warn.severity(), EventSeverity::Warning);
    }

    #[test]
    fn test_event_serialization_round_trip() {
        let event = CoreEvent::Sync(SyncEvent::Progress {
            account_id: "acct-1".to_string(),
            status: "processing".to_string(),
            percent: 40,
            loaded: 4,
            total: 10,
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"Sync\""));
        let back: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
