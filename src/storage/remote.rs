//! Remote store: user-scoped relational persistence.
//!
//! Three tables joined by owner-scoped foreign keys:
//!
//! ```text
//! playlists(id, user_id, title, description, thumbnail, video_count, url, date_added)
//! videos(id, playlist_id, user_id, title, thumbnail, duration, duration_seconds)
//! video_progress(user_id, video_id, playlist_id, progress_time, duration, watched, last_played)
//! ```
//!
//! [`RemoteBackend`] is the table-level contract; [`RemoteStore`] assembles
//! entities from rows on top of it. Every call is filtered by the injected user.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{RemoteError, RemoteResult};
use crate::model::{Playlist, ProgressMap, Video, VideoProgress};
use crate::session::User;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistRow {
    pub id: String,
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub video_count: i64,
    #[serde(default)]
    pub url: Option<String>,
    pub date_added: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRow {
    pub id: String,
    pub playlist_id: String,
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub duration_seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRow {
    pub user_id: String,
    pub video_id: String,
    #[serde(default)]
    pub playlist_id: Option<String>,
    pub progress_time: f64,
    pub duration: f64,
    pub watched: bool,
    pub last_played: DateTime<Utc>,
}

/// Table-level operations. All queries are scoped to `user.id`.
#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Human-readable backend name (e.g., "postgrest", "memory").
    fn backend_name(&self) -> &str;

    // ── playlists ────────────────────────────────────────────────────

    /// Owner's playlists, newest `date_added` first.
    async fn select_playlists(&self, user: &User) -> RemoteResult<Vec<PlaylistRow>>;

    async fn select_playlist(&self, user: &User, id: &str) -> RemoteResult<Option<PlaylistRow>>;

    /// Upsert on `(user_id, id)`.
    async fn upsert_playlists(&self, user: &User, rows: &[PlaylistRow]) -> RemoteResult<()>;

    async fn update_video_count(&self, user: &User, playlist_id: &str, count: i64) -> RemoteResult<()>;

    async fn delete_playlist(&self, user: &User, id: &str) -> RemoteResult<()>;

    // ── videos ───────────────────────────────────────────────────────

    /// Videos of one playlist in insertion order.
    async fn select_videos(&self, user: &User, playlist_id: &str) -> RemoteResult<Vec<VideoRow>>;

    /// Upsert on `(user_id, playlist_id, id)`.
    async fn upsert_videos(&self, user: &User, rows: &[VideoRow]) -> RemoteResult<()>;

    /// Delete every video of a playlist, or only `video_id` when given.
    async fn delete_videos(
        &self,
        user: &User,
        playlist_id: &str,
        video_id: Option<&str>,
    ) -> RemoteResult<()>;

    // ── video_progress ───────────────────────────────────────────────

    async fn select_progress(&self, user: &User) -> RemoteResult<Vec<ProgressRow>>;

    /// Upsert on `(user_id, video_id, playlist_id)`. A NULL `playlist_id`
    /// never conflicts, so rows without one insert a new row every time.
    async fn upsert_progress(&self, user: &User, rows: &[ProgressRow]) -> RemoteResult<()>;

    /// Delete progress rows whose `video_id` is in `video_ids`.
    async fn delete_progress(&self, user: &User, video_ids: &[String]) -> RemoteResult<()>;
}

/// Entity-level operations over a [`RemoteBackend`].
#[derive(Clone)]
pub struct RemoteStore {
    backend: Arc<dyn RemoteBackend>,
}

impl RemoteStore {
    pub fn new(backend: Arc<dyn RemoteBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.backend_name()
    }

    /// Playlists newest first, one video query per playlist.
    pub async fn get_playlists(&self, user: &User) -> RemoteResult<Vec<Playlist>> {
        let rows = self.backend.select_playlists(user).await?;
        let backend = &self.backend;
        try_join_all(rows.into_iter().map(|row| async move {
            let videos = backend.select_videos(user, &row.id).await?;
            Ok::<_, RemoteError>(playlist_from_rows(row, videos))
        }))
        .await
    }

    pub async fn get_playlist(&self, user: &User, id: &str) -> RemoteResult<Playlist> {
        let row = self
            .backend
            .select_playlist(user, id)
            .await?
            .ok_or_else(|| RemoteError::not_found(format!("playlist {}", id)))?;
        let videos = self.backend.select_videos(user, id).await?;
        Ok(playlist_from_rows(row, videos))
    }

    /// Upsert the playlist row, then replace all of its video rows.
    pub async fn save_playlist(&self, user: &User, playlist: &Playlist) -> RemoteResult<()> {
        self.backend
            .upsert_playlists(user, &[playlist_to_row(playlist, user)])
            .await?;
        self.backend.delete_videos(user, &playlist.id, None).await?;
        let videos = video_rows(playlist, user);
        if !videos.is_empty() {
            self.backend.upsert_videos(user, &videos).await?;
        }
        Ok(())
    }

    /// Delete a playlist and its videos.
    pub async fn delete_playlist(&self, user: &User, id: &str) -> RemoteResult<()> {
        self.backend.delete_videos(user, id, None).await?;
        self.backend.delete_playlist(user, id).await
    }

    /// Delete one video row and persist the recomputed `video_count`.
    pub async fn remove_video(&self, user: &User, playlist_id: &str, video_id: &str) -> RemoteResult<()> {
        self.backend
            .delete_videos(user, playlist_id, Some(video_id))
            .await?;
        let remaining = self.backend.select_videos(user, playlist_id).await?;
        self.backend
            .update_video_count(user, playlist_id, remaining.len() as i64)
            .await
    }

    pub async fn get_video_progress(&self, user: &User) -> RemoteResult<ProgressMap> {
        let rows = self.backend.select_progress(user).await?;
        Ok(rows
            .into_iter()
            .map(|row| (row.video_id.clone(), progress_from_row(row)))
            .collect())
    }

    pub async fn update_video_progress(&self, user: &User, progress: &VideoProgress) -> RemoteResult<()> {
        self.backend
            .upsert_progress(user, &[progress_to_row(progress, user)])
            .await
    }

    pub async fn clear_video_progress(&self, user: &User, video_id: &str) -> RemoteResult<()> {
        self.backend
            .delete_progress(user, &[video_id.to_string()])
            .await
    }

    pub async fn clear_playlist_progress(&self, user: &User, video_ids: &[String]) -> RemoteResult<()> {
        if video_ids.is_empty() {
            return Ok(());
        }
        self.backend.delete_progress(user, video_ids).await
    }

    // ── batched upserts used by sync ─────────────────────────────────

    /// Delete every video row of a playlist, keeping the playlist row.
    pub async fn clear_video_rows(&self, user: &User, playlist_id: &str) -> RemoteResult<()> {
        self.backend.delete_videos(user, playlist_id, None).await
    }

    /// One batched upsert of every playlist row. Returns the row count.
    pub async fn upsert_playlist_rows(&self, user: &User, playlists: &[Playlist]) -> RemoteResult<usize> {
        if playlists.is_empty() {
            return Ok(0);
        }
        let rows: Vec<PlaylistRow> = playlists.iter().map(|p| playlist_to_row(p, user)).collect();
        self.backend.upsert_playlists(user, &rows).await?;
        Ok(rows.len())
    }

    /// One batched upsert of every video row across `playlists`.
    pub async fn upsert_video_rows(&self, user: &User, playlists: &[Playlist]) -> RemoteResult<usize> {
        let rows: Vec<VideoRow> = playlists.iter().flat_map(|p| video_rows(p, user)).collect();
        if rows.is_empty() {
            return Ok(0);
        }
        self.backend.upsert_videos(user, &rows).await?;
        Ok(rows.len())
    }

    /// One batched upsert of every progress record.
    pub async fn upsert_progress_rows(&self, user: &User, progress: &ProgressMap) -> RemoteResult<usize> {
        if progress.is_empty() {
            return Ok(0);
        }
        let rows: Vec<ProgressRow> = progress
            .values()
            .filter(|p| {
                if p.playlist_id.is_none() {
                    tracing::debug!("Not syncing progress for {}: no playlist", p.video_id);
                }
                p.playlist_id.is_some()
            })
            .map(|p| progress_to_row(p, user))
            .collect();
        if rows.is_empty() {
            return Ok(0);
        }
        self.backend.upsert_progress(user, &rows).await?;
        Ok(rows.len())
    }
}

pub fn playlist_to_row(playlist: &Playlist, user: &User) -> PlaylistRow {
    PlaylistRow {
        id: playlist.id.clone(),
        user_id: user.id.clone(),
        title: playlist.title.clone(),
        description: playlist.description.clone(),
        thumbnail: Some(playlist.thumbnail.clone()),
        video_count: playlist.video_count() as i64,
        url: Some(playlist.url.clone()),
        date_added: playlist.date_added,
    }
}

pub fn video_rows(playlist: &Playlist, user: &User) -> Vec<VideoRow> {
    playlist
        .videos()
        .iter()
        .map(|v| VideoRow {
            id: v.id.clone(),
            playlist_id: playlist.id.clone(),
            user_id: user.id.clone(),
            title: v.title.clone(),
            thumbnail: Some(v.thumbnail.clone()),
            duration: Some(v.duration.clone()),
            duration_seconds: v.duration_seconds as i64,
        })
        .collect()
}

/// Assemble a playlist. `video_count` is re-derived from the rows, not trusted.
pub fn playlist_from_rows(row: PlaylistRow, videos: Vec<VideoRow>) -> Playlist {
    let videos = videos
        .into_iter()
        .map(|v| {
            Video::new(
                v.id,
                v.title,
                v.thumbnail.unwrap_or_default(),
                v.duration_seconds.max(0) as u64,
            )
        })
        .collect();
    Playlist::new(
        row.id,
        row.title,
        row.description,
        row.thumbnail.unwrap_or_default(),
        row.url.unwrap_or_default(),
        videos,
    )
    .with_date_added(row.date_added)
}

pub fn progress_to_row(progress: &VideoProgress, user: &User) -> ProgressRow {
    ProgressRow {
        user_id: user.id.clone(),
        video_id: progress.video_id.clone(),
        playlist_id: progress.playlist_id.clone(),
        progress_time: progress.current_time,
        duration: progress.duration,
        watched: progress.watched,
        last_played: progress.last_played,
    }
}

/// Fill in a missing `playlist_id` from the first playlist holding the video.
pub fn backfill_playlist_ids(progress: &mut ProgressMap, playlists: &[Playlist]) {
    for record in progress.values_mut().filter(|r| r.playlist_id.is_none()) {
        record.playlist_id = playlists
            .iter()
            .find(|p| p.video_index(&record.video_id).is_some())
            .map(|p| p.id.clone());
    }
}

pub fn progress_from_row(row: ProgressRow) -> VideoProgress {
    VideoProgress {
        video_id: row.video_id,
        playlist_id: row.playlist_id,
        current_time: row.progress_time,
        duration: row.duration,
        last_played: row.last_played,
        watched: row.watched,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteErrorKind;
    use crate::storage::memory::{MemoryBackend, Table};

    fn user() -> User {
        User::new("u1", "u1@example.com")
    }

    fn book(id: &str, video_ids: &[&str]) -> Playlist {
        let videos = video_ids
            .iter()
            .map(|v| Video::new(*v, format!("Chapter {}", v), "", 120))
            .collect();
        Playlist::new(id, format!("Book {}", id), None, "thumb", "url", videos)
    }

    fn store() -> (Arc<MemoryBackend>, RemoteStore) {
        let backend = Arc::new(MemoryBackend::new());
        (backend.clone(), RemoteStore::new(backend))
    }

    #[test]
    fn test_row_conversion_rederives_count() {
        let row = PlaylistRow {
            id: "p1".into(),
            user_id: "u1".into(),
            title: "Book".into(),
            description: None,
            thumbnail: None,
            video_count: 42,
            url: None,
            date_added: Utc::now(),
        };
        let videos = vec![VideoRow {
            id: "v1".into(),
            playlist_id: "p1".into(),
            user_id: "u1".into(),
            title: "One".into(),
            thumbnail: None,
            duration: Some("garbage".into()),
            duration_seconds: 3661,
        }];

        let playlist = playlist_from_rows(row, videos);
        assert_eq!(playlist.video_count(), 1);
        assert_eq!(playlist.videos()[0].duration, "1:01:01");
    }

    #[tokio::test]
    async fn test_save_replaces_video_rows() {
        let (_, remote) = store();
        let user = user();

        remote.save_playlist(&user, &book("p1", &["a", "b", "c"])).await.unwrap();
        remote.save_playlist(&user, &book("p1", &["c", "d"])).await.unwrap();

        let playlist = remote.get_playlist(&user, "p1").await.unwrap();
        assert_eq!(playlist.video_ids(), vec!["c", "d"]);
        assert_eq!(playlist.video_count(), 2);
    }

    #[tokio::test]
    async fn test_get_playlists_newest_first() {
        let (_, remote) = store();
        let user = user();
        let older = book("old", &["a"]).with_date_added(Utc::now() - chrono::Duration::days(1));
        let newer = book("new", &["b"]);

        remote.save_playlist(&user, &older).await.unwrap();
        remote.save_playlist(&user, &newer).await.unwrap();

        let ids: Vec<String> = remote.get_playlists(&user).await.unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn test_rows_are_scoped_by_user() {
        let (_, remote) = store();
        let alice = user();
        let bob = User::new("u2", "u2@example.com");

        remote.save_playlist(&alice, &book("p1", &["a"])).await.unwrap();
        assert!(remote.get_playlists(&bob).await.unwrap().is_empty());

        let err = remote.get_playlist(&bob, "p1").await.unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_remove_video_updates_count_column() {
        let (backend, remote) = store();
        let user = user();
        remote.save_playlist(&user, &book("p1", &["a", "b"])).await.unwrap();

        remote.remove_video(&user, "p1", "a").await.unwrap();

        let row = backend.select_playlist(&user, "p1").await.unwrap().unwrap();
        assert_eq!(row.video_count, 1);
    }

    #[tokio::test]
    async fn test_delete_playlist_cascades_videos() {
        let (backend, remote) = store();
        let user = user();
        remote.save_playlist(&user, &book("p1", &["a", "b"])).await.unwrap();

        remote.delete_playlist(&user, "p1").await.unwrap();

        assert!(backend.select_videos(&user, "p1").await.unwrap().is_empty());
        assert!(backend.select_playlist(&user, "p1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_progress_roundtrip_and_clear() {
        let (_, remote) = store();
        let user = user();
        let progress = VideoProgress::new("v1", Some("p1".into()), 30.0, 60.0, false);

        remote.update_video_progress(&user, &progress).await.unwrap();
        let map = remote.get_video_progress(&user).await.unwrap();
        assert_eq!(map["v1"].current_time, 30.0);
        assert_eq!(map["v1"].playlist_id.as_deref(), Some("p1"));

        remote.clear_playlist_progress(&user, &[]).await.unwrap();
        remote.clear_video_progress(&user, "v1").await.unwrap();
        assert!(remote.get_video_progress(&user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_legacy_progress_gets_playlist_before_upsert() {
        let (backend, remote) = store();
        let user = user();
        let mut progress = ProgressMap::new();
        progress.insert("b".into(), VideoProgress::new("b", None, 30.0, 120.0, false));
        progress.insert("orphan".into(), VideoProgress::new("orphan", None, 5.0, 60.0, false));

        backfill_playlist_ids(&mut progress, &[book("p1", &["a"]), book("p2", &["b"])]);
        assert_eq!(progress["b"].playlist_id.as_deref(), Some("p2"));
        assert!(progress["orphan"].playlist_id.is_none());

        // Repeated syncs update the same row; the orphan is never sent
        assert_eq!(remote.upsert_progress_rows(&user, &progress).await.unwrap(), 1);
        assert_eq!(remote.upsert_progress_rows(&user, &progress).await.unwrap(), 1);
        let rows = backend.progress_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].playlist_id.as_deref(), Some("p2"));
    }

    #[tokio::test]
    async fn test_video_fanout_failure_fails_read() {
        let (backend, remote) = store();
        let user = user();
        remote.save_playlist(&user, &book("p1", &["a"])).await.unwrap();

        backend.fail_table(Table::Videos, Some(RemoteErrorKind::Network));
        let err = remote.get_playlists(&user).await.unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::Network);
    }
}
