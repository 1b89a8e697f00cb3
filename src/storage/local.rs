//! Local store: JSON documents under fixed keys in a [`KeyValueStore`].
//!
//! Nothing here returns an error. A missing backend behaves like an empty
//! store that ignores writes, corrupt JSON reads as absent, and failed writes
//! are logged and dropped.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::kv::{MemoryKvStore, RedbKvStore};
use super::{KeyValueStore, BOOKMARKS_KEY, PENDING_KEY, PLAYLISTS_KEY, PROGRESS_KEY};
use crate::model::{Bookmark, Playlist, ProgressMap, VideoProgress};

/// Local writes the remote store hasn't confirmed yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingChanges {
    /// Playlists whose local record is newer than the remote one
    #[serde(default)]
    pub playlists: BTreeSet<String>,
    /// Playlists deleted locally but possibly still present remotely
    #[serde(default)]
    pub deleted_playlists: BTreeSet<String>,
    /// Progress records written locally only
    #[serde(default)]
    pub progress: BTreeSet<String>,
    /// Progress records cleared locally but possibly still present remotely
    #[serde(default)]
    pub cleared_progress: BTreeSet<String>,
}

impl PendingChanges {
    pub fn is_empty(&self) -> bool {
        self.playlists.is_empty()
            && self.deleted_playlists.is_empty()
            && self.progress.is_empty()
            && self.cleared_progress.is_empty()
    }

    pub fn playlist_saved(&mut self, id: &str) {
        self.deleted_playlists.remove(id);
        self.playlists.insert(id.to_string());
    }

    pub fn playlist_deleted(&mut self, id: &str) {
        self.playlists.remove(id);
        self.deleted_playlists.insert(id.to_string());
    }

    pub fn progress_saved(&mut self, video_id: &str) {
        self.cleared_progress.remove(video_id);
        self.progress.insert(video_id.to_string());
    }

    pub fn progress_cleared(&mut self, video_id: &str) {
        self.progress.remove(video_id);
        self.cleared_progress.insert(video_id.to_string());
    }
}

#[derive(Clone)]
pub struct LocalStore {
    kv: Option<Arc<dyn KeyValueStore>>,
    // Serializes read-modify-write cycles on a key
    write_lock: Arc<Mutex<()>>,
}

impl LocalStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv: Some(kv),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// A store with no backing storage: reads are empty, writes are dropped.
    pub fn unavailable() -> Self {
        Self {
            kv: None,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKvStore::new()))
    }

    /// Open the redb-backed store, degrading to [`LocalStore::unavailable`] on failure.
    pub fn open_default(data_dir: Option<&Path>) -> Self {
        match RedbKvStore::open_default(data_dir) {
            Ok(kv) => Self::new(Arc::new(kv)),
            Err(e) => {
                tracing::warn!("Could not initialize local store: {}", e);
                Self::unavailable()
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.kv.is_some()
    }

    pub fn backend_name(&self) -> &str {
        match &self.kv {
            Some(kv) => kv.backend_name(),
            None => "unavailable",
        }
    }

    fn read_json<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        let Some(kv) = &self.kv else {
            return T::default();
        };
        match kv.get(key) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!("Ignoring corrupt local data under {}: {}", key, e);
                    T::default()
                }
            },
            Ok(None) => T::default(),
            Err(e) => {
                tracing::warn!("Failed to read {} from local store: {}", key, e);
                T::default()
            }
        }
    }

    fn write_json<T: Serialize>(&self, key: &str, value: &T) -> bool {
        let Some(kv) = &self.kv else {
            return false;
        };
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("Failed to serialize {}: {}", key, e);
                return false;
            }
        };
        match kv.set(key, &json) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to write {} to local store: {}", key, e);
                false
            }
        }
    }

    /// Read, mutate and write back one document under the write lock.
    fn modify<T, R>(&self, key: &str, f: impl FnOnce(&mut T) -> R) -> Option<R>
    where
        T: DeserializeOwned + Serialize + Default,
    {
        self.kv.as_ref()?;
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut value: T = self.read_json(key);
        let result = f(&mut value);
        self.write_json(key, &value).then_some(result)
    }

    // ── Playlists ────────────────────────────────────────────────────

    /// All playlists, most recently added first.
    pub fn get_playlists(&self) -> Vec<Playlist> {
        self.read_json(PLAYLISTS_KEY)
    }

    pub fn get_playlist(&self, id: &str) -> Option<Playlist> {
        self.get_playlists().into_iter().find(|p| p.id == id)
    }

    /// Replace in place if present, otherwise prepend.
    pub fn save_playlist(&self, playlist: &Playlist) {
        self.modify(PLAYLISTS_KEY, |playlists: &mut Vec<Playlist>| {
            upsert_playlist(playlists, playlist.clone());
        });
    }

    pub fn delete_playlist(&self, id: &str) {
        self.modify(PLAYLISTS_KEY, |playlists: &mut Vec<Playlist>| {
            playlists.retain(|p| p.id != id);
        });
    }

    /// Remove a video from a playlist. Returns the updated playlist if it changed.
    pub fn remove_video(&self, playlist_id: &str, video_id: &str) -> Option<Playlist> {
        self.modify(PLAYLISTS_KEY, |playlists: &mut Vec<Playlist>| {
            let playlist = playlists.iter_mut().find(|p| p.id == playlist_id)?;
            playlist.remove_video(video_id).then(|| playlist.clone())
        })
        .flatten()
    }

    /// Upsert a whole list. Listed playlists come first in the given order,
    /// playlists only known locally keep their relative order after them.
    pub fn merge_playlists(&self, incoming: &[Playlist]) {
        self.modify(PLAYLISTS_KEY, |playlists: &mut Vec<Playlist>| {
            let incoming_ids: BTreeSet<&str> = incoming.iter().map(|p| p.id.as_str()).collect();
            let local_only: Vec<Playlist> = playlists
                .drain(..)
                .filter(|p| !incoming_ids.contains(p.id.as_str()))
                .collect();
            playlists.extend(incoming.iter().cloned());
            playlists.extend(local_only);
        });
    }

    // ── Progress ─────────────────────────────────────────────────────

    pub fn get_video_progress(&self) -> ProgressMap {
        self.read_json(PROGRESS_KEY)
    }

    pub fn get_progress(&self, video_id: &str) -> Option<VideoProgress> {
        self.get_video_progress().remove(video_id)
    }

    pub fn put_video_progress(&self, progress: &VideoProgress) {
        self.modify(PROGRESS_KEY, |map: &mut ProgressMap| {
            map.insert(progress.video_id.clone(), progress.clone());
        });
    }

    pub fn replace_video_progress(&self, progress: &ProgressMap) {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.write_json(PROGRESS_KEY, progress);
    }

    pub fn clear_video_progress(&self, video_id: &str) {
        self.modify(PROGRESS_KEY, |map: &mut ProgressMap| {
            map.remove(video_id);
        });
    }

    pub fn clear_playlist_progress(&self, video_ids: &[String]) {
        if video_ids.is_empty() {
            return;
        }
        self.modify(PROGRESS_KEY, |map: &mut ProgressMap| {
            for id in video_ids {
                map.remove(id);
            }
        });
    }

    // ── Bookmarks ────────────────────────────────────────────────────

    pub fn get_bookmarks(&self) -> BTreeMap<String, Bookmark> {
        self.read_json(BOOKMARKS_KEY)
    }

    pub fn put_bookmark(&self, bookmark: &Bookmark) {
        self.modify(BOOKMARKS_KEY, |map: &mut BTreeMap<String, Bookmark>| {
            map.insert(bookmark.id.clone(), bookmark.clone());
        });
    }

    /// Returns true if a bookmark was removed.
    pub fn delete_bookmark(&self, id: &str) -> bool {
        self.modify(BOOKMARKS_KEY, |map: &mut BTreeMap<String, Bookmark>| {
            map.remove(id).is_some()
        })
        .unwrap_or(false)
    }

    // ── Pending remote changes ───────────────────────────────────────

    pub fn pending(&self) -> PendingChanges {
        self.read_json(PENDING_KEY)
    }

    pub fn update_pending(&self, f: impl FnOnce(&mut PendingChanges)) {
        self.modify(PENDING_KEY, f);
    }
}

/// Replace by ID in place, or insert at the front.
pub(crate) fn upsert_playlist(playlists: &mut Vec<Playlist>, playlist: Playlist) {
    match playlists.iter_mut().find(|p| p.id == playlist.id) {
        Some(existing) => *existing = playlist,
        None => playlists.insert(0, playlist),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Video;

    fn playlist(id: &str, title: &str, video_ids: &[&str]) -> Playlist {
        let videos = video_ids
            .iter()
            .map(|v| Video::new(*v, format!("Chapter {}", v), "", 60))
            .collect();
        Playlist::new(id, title, None, "", "", videos)
    }

    #[test]
    fn test_empty_store_reads_empty() {
        let store = LocalStore::in_memory();
        assert!(store.get_playlists().is_empty());
        assert!(store.get_video_progress().is_empty());
        assert!(store.get_bookmarks().is_empty());
        assert!(store.pending().is_empty());
    }

    #[test]
    fn test_save_playlist_prepends_and_upserts() {
        let store = LocalStore::in_memory();
        store.save_playlist(&playlist("p1", "First", &["a"]));
        store.save_playlist(&playlist("p2", "Second", &["b"]));

        let ids: Vec<String> = store.get_playlists().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["p2", "p1"]);

        store.save_playlist(&playlist("p1", "Renamed", &["a", "c"]));
        let playlists = store.get_playlists();
        assert_eq!(playlists.len(), 2);
        assert_eq!(playlists[1].title, "Renamed");
        assert_eq!(playlists[1].video_count(), 2);
    }

    #[test]
    fn test_delete_playlist_missing_is_noop() {
        let store = LocalStore::in_memory();
        store.save_playlist(&playlist("p1", "First", &["a"]));
        store.delete_playlist("nope");
        assert_eq!(store.get_playlists().len(), 1);
        store.delete_playlist("p1");
        assert!(store.get_playlist("p1").is_none());
    }

    #[test]
    fn test_remove_video_recounts() {
        let store = LocalStore::in_memory();
        store.save_playlist(&playlist("p1", "Book", &["a", "b", "c"]));

        let updated = store.remove_video("p1", "b").unwrap();
        assert_eq!(updated.video_count(), 2);

        let stored = store.get_playlist("p1").unwrap();
        assert_eq!(stored.video_ids(), vec!["a", "c"]);
        assert_eq!(stored.video_count(), 2);

        assert!(store.remove_video("p1", "zzz").is_none());
        assert!(store.remove_video("nope", "a").is_none());
    }

    #[test]
    fn test_merge_playlists_keeps_incoming_order() {
        let store = LocalStore::in_memory();
        store.save_playlist(&playlist("local", "Local only", &[]));
        store.save_playlist(&playlist("r2", "Old title", &[]));

        store.merge_playlists(&[playlist("r1", "R1", &[]), playlist("r2", "R2", &[])]);

        let playlists = store.get_playlists();
        let ids: Vec<&str> = playlists.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r2", "local"]);
        assert_eq!(playlists[1].title, "R2");
    }

    #[test]
    fn test_progress_map_operations() {
        let store = LocalStore::in_memory();
        store.put_video_progress(&VideoProgress::new("v1", Some("p1".into()), 10.0, 60.0, false));
        store.put_video_progress(&VideoProgress::new("v2", Some("p1".into()), 20.0, 60.0, false));
        store.put_video_progress(&VideoProgress::new("v3", Some("p2".into()), 30.0, 60.0, false));

        store.put_video_progress(&VideoProgress::new("v1", Some("p1".into()), 15.0, 60.0, false));
        assert_eq!(store.get_progress("v1").unwrap().current_time, 15.0);

        store.clear_video_progress("v3");
        assert!(store.get_progress("v3").is_none());

        store.clear_playlist_progress(&["v1".to_string(), "v2".to_string()]);
        assert!(store.get_video_progress().is_empty());
    }

    #[test]
    fn test_corrupt_json_reads_as_empty() {
        let kv = Arc::new(MemoryKvStore::new());
        kv.set(PLAYLISTS_KEY, "{not json").unwrap();
        let store = LocalStore::new(kv.clone());

        assert!(store.get_playlists().is_empty());

        // The next write replaces the corrupt document
        store.save_playlist(&playlist("p1", "Book", &[]));
        assert_eq!(store.get_playlists().len(), 1);
    }

    #[test]
    fn test_quota_exceeded_is_noop() {
        let store = LocalStore::new(Arc::new(MemoryKvStore::with_quota(64)));
        store.save_playlist(&playlist("p1", "A title long enough to blow the quota", &["a", "b"]));
        assert!(store.get_playlists().is_empty());
    }

    #[test]
    fn test_unavailable_store_degrades() {
        let store = LocalStore::unavailable();
        assert!(!store.is_available());
        store.save_playlist(&playlist("p1", "Book", &["a"]));
        store.put_video_progress(&VideoProgress::new("a", None, 1.0, 2.0, false));

        assert!(store.get_playlists().is_empty());
        assert!(store.get_video_progress().is_empty());
        assert!(store.remove_video("p1", "a").is_none());
        assert!(!store.delete_bookmark("x"));
    }

    #[test]
    fn test_redb_backed_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open_default(Some(dir.path()));
        assert_eq!(store.backend_name(), "redb");

        store.save_playlist(&playlist("p1", "Book", &["a"]));
        drop(store);

        let reopened = LocalStore::open_default(Some(dir.path()));
        assert!(reopened.is_available());
        assert_eq!(reopened.get_playlists().len(), 1);
    }

    #[test]
    fn test_pending_transitions() {
        let store = LocalStore::in_memory();
        store.update_pending(|p| p.playlist_saved("p1"));
        store.update_pending(|p| p.progress_saved("v1"));

        let pending = store.pending();
        assert!(pending.playlists.contains("p1"));
        assert!(pending.progress.contains("v1"));

        store.update_pending(|p| {
            p.playlist_deleted("p1");
            p.progress_cleared("v1");
        });
        let pending = store.pending();
        assert!(pending.playlists.is_empty());
        assert!(pending.deleted_playlists.contains("p1"));
        assert!(pending.progress.is_empty());
        assert!(pending.cleared_progress.contains("v1"));
    }
}
