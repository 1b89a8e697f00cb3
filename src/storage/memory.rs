//! In-memory [`RemoteBackend`] with per-table fault injection.
//!
//! Mirrors the relational contract closely enough to exercise the hybrid
//! facade without a network: user scoping, upsert conflict keys, insertion
//! order, `date_added` ordering and the playlist → videos cascade.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::remote::{PlaylistRow, ProgressRow, RemoteBackend, VideoRow};
use crate::error::{RemoteError, RemoteErrorKind, RemoteResult};
use crate::session::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Playlists,
    Videos,
    Progress,
}

#[derive(Default)]
struct Tables {
    playlists: Vec<PlaylistRow>,
    videos: Vec<VideoRow>,
    progress: Vec<ProgressRow>,
}

#[derive(Default)]
pub struct MemoryBackend {
    tables: Mutex<Tables>,
    faults: Mutex<HashMap<Table, RemoteErrorKind>>,
    calls: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call touching `table` fail with `kind`, or heal it with `None`.
    pub fn fail_table(&self, table: Table, kind: Option<RemoteErrorKind>) {
        let mut faults = self.faults.lock().unwrap_or_else(|e| e.into_inner());
        match kind {
            Some(kind) => {
                faults.insert(table, kind);
            }
            None => {
                faults.remove(&table);
            }
        }
    }

    pub fn fail_all(&self, kind: Option<RemoteErrorKind>) {
        for table in [Table::Playlists, Table::Videos, Table::Progress] {
            self.fail_table(table, kind);
        }
    }

    /// Number of backend calls made so far, including failed ones.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn playlist_rows(&self) -> Vec<PlaylistRow> {
        self.lock_tables().map(|t| t.playlists.clone()).unwrap_or_default()
    }

    pub fn video_rows(&self) -> Vec<VideoRow> {
        self.lock_tables().map(|t| t.videos.clone()).unwrap_or_default()
    }

    pub fn progress_rows(&self) -> Vec<ProgressRow> {
        self.lock_tables().map(|t| t.progress.clone()).unwrap_or_default()
    }

    fn check(&self, table: Table) -> RemoteResult<()> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let faults = self.faults.lock().unwrap_or_else(|e| e.into_inner());
        match faults.get(&table) {
            Some(kind) => Err(RemoteError::new(*kind, format!("injected failure on {:?}", table))),
            None => Ok(()),
        }
    }

    fn lock_tables(&self) -> RemoteResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|e| RemoteError::unavailable(format!("lock poisoned: {e}")))
    }
}

fn check_owner(user: &User, row_user_id: &str) -> RemoteResult<()> {
    if row_user_id != user.id {
        return Err(RemoteError::unauthorized(
            "row-level security: row belongs to another user",
        ));
    }
    Ok(())
}

#[async_trait]
impl RemoteBackend for MemoryBackend {
    fn backend_name(&self) -> &str {
        "memory"
    }

    async fn select_playlists(&self, user: &User) -> RemoteResult<Vec<PlaylistRow>> {
        self.check(Table::Playlists)?;
        let tables = self.lock_tables()?;
        let mut rows: Vec<PlaylistRow> = tables
            .playlists
            .iter()
            .filter(|r| r.user_id == user.id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.date_added.cmp(&a.date_added));
        Ok(rows)
    }

    async fn select_playlist(&self, user: &User, id: &str) -> RemoteResult<Option<PlaylistRow>> {
        self.check(Table::Playlists)?;
        let tables = self.lock_tables()?;
        Ok(tables
            .playlists
            .iter()
            .find(|r| r.user_id == user.id && r.id == id)
            .cloned())
    }

    async fn upsert_playlists(&self, user: &User, rows: &[PlaylistRow]) -> RemoteResult<()> {
        self.check(Table::Playlists)?;
        for row in rows {
            check_owner(user, &row.user_id)?;
        }
        let mut tables = self.lock_tables()?;
        for row in rows {
            match tables
                .playlists
                .iter_mut()
                .find(|r| r.user_id == row.user_id && r.id == row.id)
            {
                Some(existing) => *existing = row.clone(),
                None => tables.playlists.push(row.clone()),
            }
        }
        Ok(())
    }

    async fn update_video_count(&self, user: &User, playlist_id: &str, count: i64) -> RemoteResult<()> {
        self.check(Table::Playlists)?;
        let mut tables = self.lock_tables()?;
        if let Some(row) = tables
            .playlists
            .iter_mut()
            .find(|r| r.user_id == user.id && r.id == playlist_id)
        {
            row.video_count = count;
        }
        Ok(())
    }

    async fn delete_playlist(&self, user: &User, id: &str) -> RemoteResult<()> {
        self.check(Table::Playlists)?;
        let mut tables = self.lock_tables()?;
        tables.playlists.retain(|r| !(r.user_id == user.id && r.id == id));
        // ON DELETE CASCADE
        tables
            .videos
            .retain(|r| !(r.user_id == user.id && r.playlist_id == id));
        Ok(())
    }

    async fn select_videos(&self, user: &User, playlist_id: &str) -> RemoteResult<Vec<VideoRow>> {
        self.check(Table::Videos)?;
        let tables = self.lock_tables()?;
        Ok(tables
            .videos
            .iter()
            .filter(|r| r.user_id == user.id && r.playlist_id == playlist_id)
            .cloned()
            .collect())
    }

    async fn upsert_videos(&self, user: &User, rows: &[VideoRow]) -> RemoteResult<()> {
        self.check(Table::Videos)?;
        for row in rows {
            check_owner(user, &row.user_id)?;
        }
        let mut tables = self.lock_tables()?;
        for row in rows {
            match tables.videos.iter_mut().find(|r| {
                r.user_id == row.user_id && r.playlist_id == row.playlist_id && r.id == row.id
            }) {
                Some(existing) => *existing = row.clone(),
                None => tables.videos.push(row.clone()),
            }
        }
        Ok(())
    }

    async fn delete_videos(
        &self,
        user: &User,
        playlist_id: &str,
        video_id: Option<&str>,
    ) -> RemoteResult<()> {
        self.check(Table::Videos)?;
        let mut tables = self.lock_tables()?;
        tables.videos.retain(|r| {
            let matches = r.user_id == user.id
                && r.playlist_id == playlist_id
                && video_id.map_or(true, |id| r.id == id);
            !matches
        });
        Ok(())
    }

    async fn select_progress(&self, user: &User) -> RemoteResult<Vec<ProgressRow>> {
        self.check(Table::Progress)?;
        let tables = self.lock_tables()?;
        Ok(tables
            .progress
            .iter()
            .filter(|r| r.user_id == user.id)
            .cloned()
            .collect())
    }

    async fn upsert_progress(&self, user: &User, rows: &[ProgressRow]) -> RemoteResult<()> {
        self.check(Table::Progress)?;
        for row in rows {
            check_owner(user, &row.user_id)?;
        }
        let mut tables = self.lock_tables()?;
        for row in rows {
            // NULL playlist_id never matches, as in Postgres
            match tables.progress.iter_mut().find(|r| {
                r.user_id == row.user_id
                    && r.video_id == row.video_id
                    && row.playlist_id.is_some()
                    && r.playlist_id == row.playlist_id
            }) {
                Some(existing) => *existing = row.clone(),
                None => tables.progress.push(row.clone()),
            }
        }
        Ok(())
    }

    async fn delete_progress(&self, user: &User, video_ids: &[String]) -> RemoteResult<()> {
        self.check(Table::Progress)?;
        let mut tables = self.lock_tables()?;
        tables
            .progress
            .retain(|r| !(r.user_id == user.id && video_ids.contains(&r.video_id)));
        Ok(())
    }
}
