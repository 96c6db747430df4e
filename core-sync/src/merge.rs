//! # Merge & Field-Completeness Policy
//!
//! Non-regressing merge of fetched data into stored records, and the
//! completeness check that routes items through the detail-fetch path.
//!
//! ## Overview
//!
//! Writes reach a record from two sources of different fidelity: list-page
//! data (fast, incomplete) and per-item detail fetches (complete, rate
//! limited). The merge rules guarantee a lower-fidelity write never erases
//! a field a higher-fidelity write already populated:
//!
//! - counters are only overwritten when the incoming value is non-null
//!   (the like counter is on every list page, so it refreshes every pass)
//! - `image_urls` is only replaced when the incoming list is strictly
//!   longer than the stored one, or the stored one has at most one entry
//! - text fields are only overwritten when the incoming value is non-blank
//! - `cover_local_path` is never touched by merges; only the download
//!   queue's completion callback writes it

use crate::job::current_timestamp;
use crate::model::ContentRecord;
use serde::{Deserialize, Serialize};
use source_traits::{ItemDetail, ItemSummary};
use std::path::Path;

/// Minimum byte size for a local media file to count as present.
pub const MIN_VALID_FILE_BYTES: u64 = 1024;

/// Incoming data for one item, from either a list page or a detail fetch.
///
/// `None` / empty fields mean "not carried by this source", not "clear the
/// stored value".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordPatch {
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
    pub published_at: Option<String>,
    pub video_url: Option<String>,
    pub image_urls: Vec<String>,
    pub tags: Vec<String>,
    pub ip_location: Option<String>,
    pub cover_remote_url: Option<String>,
    pub access_token: Option<String>,
}

impl From<ItemSummary> for RecordPatch {
    fn from(summary: ItemSummary) -> Self {
        Self {
            item_id: summary.item_id,
            owner_id: summary.owner_id,
            owner_name: summary.owner_name,
            owner_avatar_url: summary.owner_avatar_url,
            title: summary.title,
            kind: summary.kind,
            like_count: summary.like_count,
            image_urls: summary.image_urls,
            cover_remote_url: summary.cover_url,
            access_token: summary.access_token,
            ..Default::default()
        }
    }
}

impl From<ItemDetail> for RecordPatch {
    fn from(detail: ItemDetail) -> Self {
        Self {
            item_id: detail.item_id,
            owner_id: detail.owner_id,
            owner_name: detail.owner_name,
            owner_avatar_url: detail.owner_avatar_url,
            title: detail.title,
            description: detail.description,
            kind: detail.kind,
            like_count: detail.like_count,
            save_count: detail.save_count,
            comment_count: detail.comment_count,
            share_count: detail.share_count,
            published_at: detail.published_at,
            video_url: detail.video_url,
            image_urls: detail.image_urls,
            tags: detail.tags,
            ip_location: detail.ip_location,
            cover_remote_url: detail.cover_url,
            access_token: detail.access_token,
        }
    }
}

fn non_blank(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|s| !s.trim().is_empty())
}

fn overwrite_text(target: &mut Option<String>, incoming: Option<String>) {
    if non_blank(&incoming) {
        *target = incoming;
    }
}

fn overwrite_counter(target: &mut Option<i64>, incoming: Option<i64>) {
    if incoming.is_some() {
        *target = incoming;
    }
}

/// Merge `patch` into `existing` under the non-regression rules, or build
/// a fresh record when `existing` is `None`. Returns the record to store.
pub fn merge_record(existing: Option<ContentRecord>, patch: RecordPatch) -> ContentRecord {
    let mut record = match existing {
        Some(record) => record,
        None => ContentRecord {
            item_id: patch.item_id.clone(),
            owner_id: patch.owner_id.clone(),
            ..ContentRecord::default()
        },
    };

    if !patch.owner_id.is_empty() {
        record.owner_id = patch.owner_id;
    }

    overwrite_text(&mut record.owner_name, patch.owner_name);
    overwrite_text(&mut record.owner_avatar_url, patch.owner_avatar_url);
    overwrite_text(&mut record.title, patch.title);
    overwrite_text(&mut record.description, patch.description);
    overwrite_text(&mut record.kind, patch.kind);
    overwrite_text(&mut record.published_at, patch.published_at);
    overwrite_text(&mut record.video_url, patch.video_url);
    overwrite_text(&mut record.ip_location, patch.ip_location);
    overwrite_text(&mut record.cover_remote_url, patch.cover_remote_url);
    overwrite_text(&mut record.access_token, patch.access_token);

    overwrite_counter(&mut record.like_count, patch.like_count);
    overwrite_counter(&mut record.save_count, patch.save_count);
    overwrite_counter(&mut record.comment_count, patch.comment_count);
    overwrite_counter(&mut record.share_count, patch.share_count);

    // A shorter incoming list means the source only saw the cover image;
    // keep the richer stored gallery.
    if patch.image_urls.len() > record.image_urls.len() || record.image_urls.len() <= 1 {
        if !patch.image_urls.is_empty() {
            record.image_urls = patch.image_urls;
        }
    }

    if !patch.tags.is_empty() {
        record.tags = patch.tags;
    }

    record.last_updated_at = current_timestamp();
    record
}

/// Names of required fields that are missing or stale on `record`.
///
/// A record is "complete" for deep-sync purposes iff this returns empty;
/// any violation routes the item through the detail-fetch path.
/// `media_root` is the directory holding downloaded media
/// (`<media_root>/<item_id>/image_<idx>.jpg` and cover files).
pub fn missing_required_fields(record: &ContentRecord, media_root: &Path) -> Vec<&'static str> {
    let mut missing = Vec::new();

    if !non_blank(&record.title) {
        missing.push("title");
    }
    if !non_blank(&record.description) {
        missing.push("description");
    }
    if !non_blank(&record.kind) {
        missing.push("kind");
    }
    if !non_blank(&record.published_at) {
        missing.push("published_at");
    }

    if record.like_count.is_none() {
        missing.push("like_count");
    }
    if record.save_count.is_none() {
        missing.push("save_count");
    }
    if record.comment_count.is_none() {
        missing.push("comment_count");
    }
    if record.share_count.is_none() {
        missing.push("share_count");
    }

    if !non_blank(&record.cover_remote_url) {
        missing.push("cover_remote_url");
    }
    if !non_blank(&record.cover_local_path) {
        missing.push("cover_local_path");
    } else if let Some(path) = record.cover_local_path.as_deref() {
        if !file_is_valid(&media_root.join(path)) {
            missing.push("local_cover");
        }
    }

    if record.is_video() {
        if !non_blank(&record.video_url) {
            missing.push("video_url");
        }
    } else {
        // Gallery items carry more than the cover image.
        if record.image_urls.len() <= 1 {
            missing.push("image_urls");
        } else {
            let item_dir = media_root.join(&record.item_id);
            let all_present = (0..record.image_urls.len())
                .all(|idx| file_is_valid(&item_dir.join(format!("image_{}.jpg", idx))));
            if !all_present {
                missing.push("local_images");
            }
        }
    }

    missing
}

fn file_is_valid(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() > MIN_VALID_FILE_BYTES)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn full_patch(item_id: &str) -> RecordPatch {
        RecordPatch {
            item_id: item_id.to_string(),
            owner_id: "owner-1".to_string(),
            owner_name: Some("alice".to_string()),
            title: Some("a title".to_string()),
            description: Some("a description".to_string()),
            kind: Some("normal".to_string()),
            like_count: Some(10),
            save_count: Some(4),
            comment_count: Some(2),
            share_count: Some(1),
            published_at: Some("2024-05-01".to_string()),
            image_urls: vec![
                "https://cdn/img0".to_string(),
                "https://cdn/img1".to_string(),
                "https://cdn/img2".to_string(),
            ],
            tags: vec!["travel".to_string()],
            cover_remote_url: Some("https://cdn/cover".to_string()),
            access_token: Some("tok-1".to_string()),
            ..Default::default()
        }
    }

    fn list_patch(item_id: &str) -> RecordPatch {
        RecordPatch {
            item_id: item_id.to_string(),
            owner_id: "owner-1".to_string(),
            title: Some("a title".to_string()),
            kind: Some("normal".to_string()),
            like_count: Some(12),
            image_urls: vec!["https://cdn/img0".to_string()],
            cover_remote_url: Some("https://cdn/cover".to_string()),
            access_token: Some("tok-2".to_string()),
            ..Default::default()
        }
    }

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("merge-test-{}-{}", tag, uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_file(path: &Path, len: usize) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, vec![0u8; len]).unwrap();
    }

    #[test]
    fn test_fresh_record_from_patch() {
        let record = merge_record(None, full_patch("item-1"));

        assert_eq!(record.item_id, "item-1");
        assert_eq!(record.owner_id, "owner-1");
        assert_eq!(record.save_count, Some(4));
        assert_eq!(record.image_urls.len(), 3);
        assert!(record.cover_local_path.is_none());
        assert!(record.last_updated_at > 0);
    }

    #[test]
    fn test_list_update_never_nulls_detail_counters() {
        let detailed = merge_record(None, full_patch("item-1"));
        let merged = merge_record(Some(detailed), list_patch("item-1"));

        // Counters the list page lacks stay intact.
        assert_eq!(merged.save_count, Some(4));
        assert_eq!(merged.comment_count, Some(2));
        assert_eq!(merged.share_count, Some(1));
        // The like counter refreshes from every list pass.
        assert_eq!(merged.like_count, Some(12));
    }

    #[test]
    fn test_shorter_image_list_does_not_regress() {
        let detailed = merge_record(None, full_patch("item-1"));
        let merged = merge_record(Some(detailed), list_patch("item-1"));
        assert_eq!(merged.image_urls.len(), 3);
    }

    #[test]
    fn test_longer_image_list_replaces() {
        let record = merge_record(None, list_patch("item-1"));
        assert_eq!(record.image_urls.len(), 1);

        let merged = merge_record(Some(record), full_patch("item-1"));
        assert_eq!(merged.image_urls.len(), 3);
    }

    #[test]
    fn test_single_entry_stored_list_is_replaceable() {
        let mut stored = merge_record(None, full_patch("item-1"));
        stored.image_urls = vec!["https://cdn/old".to_string()];

        let mut incoming = list_patch("item-1");
        incoming.image_urls = vec!["https://cdn/new".to_string()];

        let merged = merge_record(Some(stored), incoming);
        assert_eq!(merged.image_urls, vec!["https://cdn/new"]);
    }

    #[test]
    fn test_blank_published_at_does_not_overwrite() {
        let detailed = merge_record(None, full_patch("item-1"));

        let mut incoming = list_patch("item-1");
        incoming.published_at = Some("   ".to_string());

        let merged = merge_record(Some(detailed), incoming);
        assert_eq!(merged.published_at, Some("2024-05-01".to_string()));
    }

    #[test]
    fn test_empty_description_does_not_overwrite() {
        let detailed = merge_record(None, full_patch("item-1"));

        let mut incoming = list_patch("item-1");
        incoming.description = Some(String::new());

        let merged = merge_record(Some(detailed), incoming);
        assert_eq!(merged.description, Some("a description".to_string()));
    }

    #[test]
    fn test_access_token_refreshes_when_present() {
        let record = merge_record(None, full_patch("item-1"));
        let merged = merge_record(Some(record), list_patch("item-1"));
        assert_eq!(merged.access_token, Some("tok-2".to_string()));
    }

    #[test]
    fn test_non_regression_over_repeated_list_updates() {
        // Once detail data exists, replaying list patches in any amount
        // never loses it.
        let mut record = merge_record(None, full_patch("item-1"));
        for i in 0..20 {
            let mut patch = list_patch("item-1");
            patch.like_count = Some(i);
            record = merge_record(Some(record), patch);

            assert_eq!(record.save_count, Some(4));
            assert_eq!(record.image_urls.len(), 3);
            assert_eq!(record.published_at, Some("2024-05-01".to_string()));
            assert_eq!(record.description, Some("a description".to_string()));
        }
    }

    #[test]
    fn test_completeness_fresh_list_record_is_incomplete() {
        let media_root = temp_dir("list");
        let record = merge_record(None, list_patch("item-1"));

        let missing = missing_required_fields(&record, &media_root);
        assert!(missing.contains(&"description"));
        assert!(missing.contains(&"published_at"));
        assert!(missing.contains(&"save_count"));
        assert!(missing.contains(&"cover_local_path"));
        assert!(missing.contains(&"image_urls"));
    }

    #[test]
    fn test_completeness_all_fields_and_files_present() {
        let media_root = temp_dir("complete");
        let mut record = merge_record(None, full_patch("item-1"));
        record.cover_local_path = Some("item-1/cover.jpg".to_string());

        write_file(&media_root.join("item-1/cover.jpg"), 2048);
        for idx in 0..3 {
            write_file(&media_root.join(format!("item-1/image_{}.jpg", idx)), 2048);
        }

        assert!(missing_required_fields(&record, &media_root).is_empty());
    }

    #[test]
    fn test_completeness_undersized_cover_counts_as_missing() {
        let media_root = temp_dir("small");
        let mut record = merge_record(None, full_patch("item-1"));
        record.cover_local_path = Some("item-1/cover.jpg".to_string());

        write_file(&media_root.join("item-1/cover.jpg"), 100);
        for idx in 0..3 {
            write_file(&media_root.join(format!("item-1/image_{}.jpg", idx)), 2048);
        }

        let missing = missing_required_fields(&record, &media_root);
        assert!(missing.contains(&"local_cover"));
    }

    #[test]
    fn test_completeness_video_requires_video_url() {
        let media_root = temp_dir("video");
        let mut record = merge_record(None, full_patch("item-1"));
        record.kind = Some("video".to_string());
        record.cover_local_path = Some("item-1/cover.jpg".to_string());
        write_file(&media_root.join("item-1/cover.jpg"), 2048);

        let missing = missing_required_fields(&record, &media_root);
        assert!(missing.contains(&"video_url"));
        assert!(!missing.contains(&"image_urls"));

        record.video_url = Some("https://cdn/video".to_string());
        let missing = missing_required_fields(&record, &media_root);
        assert!(!missing.contains(&"video_url"));
    }

    #[test]
    fn test_completeness_missing_gallery_file() {
        let media_root = temp_dir("gallery");
        let mut record = merge_record(None, full_patch("item-1"));
        record.cover_local_path = Some("item-1/cover.jpg".to_string());

        write_file(&media_root.join("item-1/cover.jpg"), 2048);
        write_file(&media_root.join("item-1/image_0.jpg"), 2048);
        write_file(&media_root.join("item-1/image_1.jpg"), 2048);
        // image_2.jpg never downloaded

        let missing = missing_required_fields(&record, &media_root);
        assert_eq!(missing, vec!["local_images"]);
    }
}
