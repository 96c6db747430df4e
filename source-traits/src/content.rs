//! Remote content source abstraction.
//!
//! One implementation per platform integration. The engine only consumes
//! the trait; everything request-signing related stays on the other side of
//! this boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Reference to a tracked account, as the remote platform identifies it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRef {
    /// Platform-side user id.
    pub user_id: String,
    /// Account-level access token, when the platform requires one for
    /// listing. May be empty for platforms that only need the credential.
    pub access_token: Option<String>,
}

impl AccountRef {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            access_token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }
}

/// Reference to a single item for a detail fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRef {
    pub item_id: String,
    /// Item-level access token the platform hands out on list pages.
    pub access_token: Option<String>,
}

/// Item data as it appears on a list page. Lower fidelity than
/// [`ItemDetail`]: several fields are absent or approximate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemSummary {
    pub item_id: String,
    pub owner_id: String,
    pub owner_name: Option<String>,
    pub owner_avatar_url: Option<String>,
    pub title: Option<String>,
    /// `"normal"` for image galleries, `"video"` for video items.
    pub kind: Option<String>,
    /// List pages usually expose the like counter only.
    pub like_count: Option<i64>,
    pub cover_url: Option<String>,
    pub image_urls: Vec<String>,
    pub access_token: Option<String>,
}

/// Item data from a per-item detail fetch. Higher fidelity than
/// [`ItemSummary`]; fields that stay `None` are genuinely absent remotely.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemDetail {
    pub item_id: String,
    pub owner_id: String,
    pub owner_name: Option<String>,
    pub owner_avatar_url: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub kind: Option<String>,
    pub like_count: Option<i64>,
    pub save_count: Option<i64>,
    pub comment_count: Option<i64>,
    pub share_count: Option<i64>,
    /// Platform-formatted publish timestamp, kept as text.
    pub published_at: Option<String>,
    pub video_url: Option<String>,
    pub image_urls: Vec<String>,
    pub tags: Vec<String>,
    pub ip_location: Option<String>,
    pub cover_url: Option<String>,
    pub access_token: Option<String>,
}

/// Account profile data used to refresh the tracked account's metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountInfo {
    pub user_id: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub description: Option<String>,
    pub follower_count: Option<i64>,
    pub following_count: Option<i64>,
    pub interaction_count: Option<i64>,
}

/// Remote content platform operations.
///
/// All methods classify failures through
/// [`FetchError`](crate::error::FetchError); the engine decides retry and
/// abort behavior from the carried [`FailureKind`](crate::error::FailureKind)
/// alone.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// List the account's published items in platform order.
    ///
    /// Contract note: the platform is known to occasionally return an empty
    /// list for a valid, non-empty account when the account-level token is
    /// stale. Callers should treat a first empty result as suspect, refresh
    /// the token via [`refresh_access_token`](Self::refresh_access_token)
    /// and retry once before concluding the account has no public items.
    async fn list_items(&self, account: &AccountRef, credential: &str)
        -> Result<Vec<ItemSummary>>;

    /// Fetch full detail for one item. Subject to aggressive rate limiting.
    async fn fetch_item_detail(&self, item: &ItemRef, credential: &str) -> Result<ItemDetail>;

    /// Fetch the account's profile.
    async fn fetch_account_info(&self, user_id: &str, credential: &str) -> Result<AccountInfo>;

    /// Obtain a fresh account-level access token.
    ///
    /// Returns `Ok(None)` when the platform has no token to hand out (the
    /// account may be private or gone).
    async fn refresh_access_token(
        &self,
        user_id: &str,
        credential: &str,
    ) -> Result<Option<String>>;
}
