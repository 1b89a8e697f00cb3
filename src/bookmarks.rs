//! Bookmarks: saved moments inside a video. Kept in the local store only.

use chrono::Utc;
use uuid::Uuid;

use crate::model::Bookmark;
use crate::storage::LocalStore;

#[derive(Clone)]
pub struct BookmarkStore {
    local: LocalStore,
}

impl BookmarkStore {
    pub fn new(local: LocalStore) -> Self {
        Self { local }
    }

    /// Create and persist a bookmark. Blank notes are dropped, negative or
    /// non-finite times are clamped to 0.
    pub fn add(&self, video_id: &str, playlist_id: &str, time: f64, note: Option<&str>) -> Bookmark {
        let time = if time.is_finite() { time.max(0.0) } else { 0.0 };
        let note = note
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        let bookmark = Bookmark {
            id: Uuid::new_v4().to_string(),
            video_id: video_id.to_string(),
            playlist_id: playlist_id.to_string(),
            time,
            note,
            timestamp: Utc::now(),
        };
        self.local.put_bookmark(&bookmark);
        tracing::debug!("Bookmarked {} at {:.1}s", video_id, time);
        bookmark
    }

    /// All bookmarks, newest first.
    pub fn list(&self) -> Vec<Bookmark> {
        let mut bookmarks: Vec<Bookmark> = self.local.get_bookmarks().into_values().collect();
        bookmarks.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        bookmarks
    }

    /// Bookmarks of one video in playback order.
    pub fn for_video(&self, video_id: &str) -> Vec<Bookmark> {
        let mut bookmarks: Vec<Bookmark> = self
            .local
            .get_bookmarks()
            .into_values()
            .filter(|b| b.video_id == video_id)
            .collect();
        bookmarks.sort_by(|a, b| a.time.total_cmp(&b.time));
        bookmarks
    }

    pub fn get(&self, id: &str) -> Option<Bookmark> {
        self.local.get_bookmarks().remove(id)
    }

    /// Returns false if no bookmark had this ID.
    pub fn delete(&self, id: &str) -> bool {
        self.local.delete_bookmark(id)
    }
}
