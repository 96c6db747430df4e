//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the sync engine:
//! - Logging and tracing infrastructure
//! - Event bus system
//!
//! ## Overview
//!
//! This crate contains the runtime utilities the engine crates depend on.
//! It establishes the logging conventions and event broadcasting mechanism
//! used throughout the system; it knows nothing about sync semantics.

pub mod error;
pub mod events;
pub mod logging;

pub use error::{Result, RuntimeError};
pub use events::{CoreEvent, CredentialEvent, EventBus, EventSeverity, EventStream, SyncEvent};
pub use logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
