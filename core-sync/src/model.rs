//! Stored content record model.

use serde::{Deserialize, Serialize};

/// One remote content item as persisted locally, globally unique by
/// `item_id`.
///
/// Counter fields are independently nullable: `None` means "unknown, not
/// yet fetched", never zero. `cover_local_path` is written only by the
/// download queue's completion callback; everything else is written by the
/// orchestrator through the merge policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub item_id: String,
    pub owner_id: String,
    pub owner_name: Option<String>,
    pub owner_avatar_url: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    /// `"normal"` for image galleries, `"video"` for video items.
    pub kind: Option<String>,
    pub like_count: Option<i64>,
    pub save_count: Option<i64>,
    pub comment_count: Option<i64>,
    pub share_count: Option<i64>,
    /// Platform-formatted publish timestamp, kept as text.
    pub published_at: Option<String>,
    pub video_url: Option<String>,
    /// Ordered gallery image URLs.
    pub image_urls: Vec<String>,
    pub tags: Vec<String>,
    pub ip_location: Option<String>,
    pub cover_remote_url: Option<String>,
    /// Local path of the downloaded cover, relative to the media root.
    pub cover_local_path: Option<String>,
    /// Item-level access token required for detail fetches.
    pub access_token: Option<String>,
    /// Unix epoch seconds of the last write.
    pub last_updated_at: i64,
}

impl ContentRecord {
    pub fn is_video(&self) -> bool {
        self.kind.as_deref() == Some("video")
    }
}
