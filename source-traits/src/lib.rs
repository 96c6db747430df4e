//! # Content Source Traits
//!
//! Collaborator contracts between the sync engine and the remote content
//! platform.
//!
//! ## Overview
//!
//! The engine never talks to the remote platform directly. Everything it
//! needs from the outside world is expressed as a trait in this crate:
//!
//! - [`ContentSource`](content::ContentSource) - list items, fetch per-item
//!   detail, fetch account profiles, refresh item access tokens
//! - [`CredentialStore`](credentials::CredentialStore) - the active platform
//!   credential (cookie/session) and its invalidation
//! - [`MediaFetcher`](http::MediaFetcher) - raw byte downloads for covers
//!   and gallery images
//!
//! Integrations implement these traits against the real platform (signed
//! requests, cookie handling, response parsing); the engine is tested
//! against scripted mocks.
//!
//! ## Error Classification
//!
//! Remote failures cross this boundary as [`FetchError`](error::FetchError)
//! carrying a typed [`FailureKind`](error::FailureKind). Implementations
//! that only have a legacy text message available can build the kind with
//! [`FailureKind::classify`](error::FailureKind::classify), which applies
//! the documented substring contract (rate-limit, unavailable, auth-invalid,
//! token-invalid).
//!
//! ## Thread Safety
//!
//! All traits require `Send + Sync`; the engine shares them across spawned
//! tasks behind `Arc<dyn _>`.

pub mod content;
pub mod credentials;
pub mod error;
pub mod http;

pub use error::{FailureKind, FetchError, Result};

// Re-export commonly used types
pub use content::{AccountInfo, AccountRef, ContentSource, ItemDetail, ItemRef, ItemSummary};
pub use credentials::{CredentialInfo, CredentialStore};
pub use http::MediaFetcher;
