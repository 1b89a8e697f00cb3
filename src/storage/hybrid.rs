//! Hybrid storage facade: local store as the durability floor, remote store
//! when signed in and online.
//!
//! Writes always land in the local store first. The remote half goes through
//! the [`WriteQueue`]; when it is skipped (local mode) or fails, the entity is
//! recorded in [`PendingChanges`]. Remote reads are overlaid with pending local
//! records so a local write stays visible until a sync reconciles it. Any
//! remote read error falls back to the local store.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use super::local::{upsert_playlist, LocalStore, PendingChanges};
use super::queue::{RemoteWrite, WriteQueue};
use super::remote::{backfill_playlist_ids, RemoteStore};
use crate::error::{RemoteError, RemoteErrorKind, RemoteResult};
use crate::model::{Playlist, ProgressMap, VideoProgress};
use crate::session::{Session, StorageMode, User};

/// Result of syncing one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Number of records written
    Synced(usize),
    Failed(RemoteErrorKind),
    Skipped,
}

impl SyncOutcome {
    fn from_result(result: RemoteResult<usize>, collection: &str) -> Self {
        match result {
            Ok(n) => SyncOutcome::Synced(n),
            Err(e) => {
                tracing::warn!("Sync of {} failed: {}", collection, e);
                SyncOutcome::Failed(e.kind)
            }
        }
    }

    pub fn is_synced(&self) -> bool {
        matches!(self, SyncOutcome::Synced(_))
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOutcome::Synced(n) => write!(f, "synced {}", n),
            SyncOutcome::Failed(kind) => write!(f, "failed ({})", kind),
            SyncOutcome::Skipped => write!(f, "skipped"),
        }
    }
}

/// Per-collection outcome of a sync run. Collections fail independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub playlists: SyncOutcome,
    pub videos: SyncOutcome,
    pub progress: SyncOutcome,
    /// Replayed remote deletions (local → remote only)
    pub deletions: SyncOutcome,
}

impl SyncReport {
    pub fn skipped() -> Self {
        Self {
            playlists: SyncOutcome::Skipped,
            videos: SyncOutcome::Skipped,
            progress: SyncOutcome::Skipped,
            deletions: SyncOutcome::Skipped,
        }
    }

    pub fn is_skipped(&self) -> bool {
        *self == Self::skipped()
    }

    /// True when no collection failed.
    pub fn is_complete(&self) -> bool {
        ![self.playlists, self.videos, self.progress, self.deletions]
            .iter()
            .any(|o| matches!(o, SyncOutcome::Failed(_)))
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "playlists {}, videos {}, progress {}, deletions {}",
            self.playlists, self.videos, self.progress, self.deletions
        )
    }
}

pub struct HybridStorage {
    local: LocalStore,
    remote: Option<RemoteStore>,
    session: Arc<Session>,
    queue: Option<WriteQueue>,
}

impl HybridStorage {
    /// Build the facade. With a remote store this spawns the write worker,
    /// so it must be called inside a tokio runtime.
    pub fn new(local: LocalStore, remote: Option<RemoteStore>, session: Arc<Session>) -> Self {
        let queue = remote
            .as_ref()
            .map(|r| WriteQueue::spawn(r.clone(), local.clone(), session.clone()));
        Self {
            local,
            remote,
            session,
            queue,
        }
    }

    /// A facade that never leaves local mode.
    pub fn local_only(local: LocalStore, session: Arc<Session>) -> Self {
        Self::new(local, None, session)
    }

    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Backend the next operation will use.
    pub fn backend_name(&self) -> &str {
        match (&self.remote, self.session.storage_mode()) {
            (Some(remote), StorageMode::Remote { .. }) => remote.backend_name(),
            _ => self.local.backend_name(),
        }
    }

    fn remote_target(&self) -> Option<(&RemoteStore, User)> {
        let remote = self.remote.as_ref()?;
        match self.session.storage_mode() {
            StorageMode::Remote { user, .. } => Some((remote, user)),
            StorageMode::Local => None,
        }
    }

    // ── Remote write dispatch ────────────────────────────────────────

    /// Fire-and-forget the remote half of a write. The write is recorded as
    /// pending before it is queued; the worker clears the entry once the
    /// remote store confirms it.
    fn dispatch(&self, write: RemoteWrite) {
        let Some(queue) = &self.queue else {
            return;
        };
        self.local.update_pending(|p| write.mark_pending(p));
        if let StorageMode::Remote { user, epoch } = self.session.storage_mode() {
            queue.enqueue(write, user, epoch);
        }
    }

    /// Run the remote half of a write and wait for it. Failures are logged
    /// by the worker and the write stays pending.
    async fn submit(&self, write: RemoteWrite) {
        let Some(queue) = &self.queue else {
            return;
        };
        self.local.update_pending(|p| write.mark_pending(p));
        if let StorageMode::Remote { user, epoch } = self.session.storage_mode() {
            let _ = queue.submit(write, user, epoch).await;
        }
    }

    /// Wait for queued remote writes to finish.
    pub async fn flush(&self) {
        if let Some(queue) = &self.queue {
            queue.flush().await;
        }
    }

    // ── Playlists ────────────────────────────────────────────────────

    pub async fn get_playlists(&self) -> Vec<Playlist> {
        let Some((remote, user)) = self.remote_target() else {
            return self.local.get_playlists();
        };
        match remote.get_playlists(&user).await {
            Ok(playlists) => overlay_playlists(playlists, &self.local, &self.local.pending()),
            Err(e) => {
                tracing::warn!("Falling back to local playlists: {}", e);
                self.local.get_playlists()
            }
        }
    }

    pub async fn get_playlist(&self, id: &str) -> Option<Playlist> {
        let Some((remote, user)) = self.remote_target() else {
            return self.local.get_playlist(id);
        };
        let pending = self.local.pending();
        if pending.deleted_playlists.contains(id) {
            return None;
        }
        if pending.playlists.contains(id) {
            if let Some(playlist) = self.local.get_playlist(id) {
                return Some(playlist);
            }
        }
        match remote.get_playlist(&user, id).await {
            Ok(playlist) => Some(playlist),
            Err(e) => {
                if e.kind != RemoteErrorKind::NotFound {
                    tracing::warn!("Falling back to local playlist {}: {}", id, e);
                }
                self.local.get_playlist(id)
            }
        }
    }

    pub async fn save_playlist(&self, playlist: &Playlist) {
        self.local.save_playlist(playlist);
        self.submit(RemoteWrite::SavePlaylist(playlist.clone())).await;
    }

    pub async fn delete_playlist(&self, id: &str) {
        self.local.delete_playlist(id);
        self.submit(RemoteWrite::DeletePlaylist(id.to_string())).await;
    }

    pub async fn remove_video(&self, playlist_id: &str, video_id: &str) {
        self.local.remove_video(playlist_id, video_id);
        self.submit(RemoteWrite::RemoveVideo {
            playlist_id: playlist_id.to_string(),
            video_id: video_id.to_string(),
        })
        .await;
    }

    // ── Progress ─────────────────────────────────────────────────────

    pub async fn get_video_progress(&self) -> ProgressMap {
        let Some((remote, user)) = self.remote_target() else {
            return self.local.get_video_progress();
        };
        match remote.get_video_progress(&user).await {
            Ok(progress) => overlay_progress(progress, &self.local, &self.local.pending()),
            Err(e) => {
                tracing::warn!("Falling back to local progress: {}", e);
                self.local.get_video_progress()
            }
        }
    }

    /// Persist a progress record locally, then queue the remote upsert
    /// without waiting for it.
    pub fn update_video_progress(
        &self,
        video_id: &str,
        playlist_id: &str,
        current_time: f64,
        duration: f64,
        watched: bool,
    ) -> VideoProgress {
        let progress = VideoProgress::new(
            video_id,
            Some(playlist_id.to_string()),
            current_time,
            duration,
            watched,
        );
        self.put_video_progress(&progress);
        progress
    }

    /// Persist an already-built progress record.
    pub fn put_video_progress(&self, progress: &VideoProgress) {
        self.local.put_video_progress(progress);
        self.dispatch(RemoteWrite::UpdateProgress(progress.clone()));
    }

    pub fn clear_video_progress(&self, video_id: &str) {
        self.local.clear_video_progress(video_id);
        self.dispatch(RemoteWrite::ClearProgress(vec![video_id.to_string()]));
    }

    pub fn clear_playlist_progress(&self, video_ids: &[String]) {
        if video_ids.is_empty() {
            return;
        }
        self.local.clear_playlist_progress(video_ids);
        self.dispatch(RemoteWrite::ClearProgress(video_ids.to_vec()));
    }

    // ── Sync ─────────────────────────────────────────────────────────

    /// Resolve the remote store and identity for a sync, or `None` to skip.
    fn sync_target(&self, direction: &str) -> Option<(&RemoteStore, User, u64)> {
        let Some(remote) = &self.remote else {
            tracing::debug!("No remote store configured - skipping sync {}", direction);
            return None;
        };
        if !self.session.is_online() {
            tracing::info!("Offline - skipping sync {}", direction);
            return None;
        }
        let snapshot = self.session.snapshot();
        let Some(user) = snapshot.user else {
            tracing::debug!("Not signed in - skipping sync {}", direction);
            return None;
        };
        Some((remote, user, snapshot.epoch))
    }

    fn fence(&self, epoch: u64) -> RemoteResult<()> {
        if self.session.is_current(epoch) {
            Ok(())
        } else {
            Err(RemoteError::stale("identity changed during sync"))
        }
    }

    /// Push every local playlist, video and progress record to the remote
    /// store (called on login). Matching remote rows are overwritten. Pending
    /// deletions are replayed. Collections run concurrently and fail independently.
    pub async fn sync_local_to_remote(&self) -> SyncReport {
        let Some((remote, user, epoch)) = self.sync_target("to remote") else {
            return SyncReport::skipped();
        };
        self.flush().await;

        let playlists = self.local.get_playlists();
        let mut progress = self.local.get_video_progress();
        backfill_playlist_ids(&mut progress, &playlists);
        let pending = self.local.pending();
        let user = &user;

        // Videos follow their playlist rows; a playlist failure doesn't stop them
        let playlists_and_videos = async {
            let playlists_result = async {
                self.fence(epoch)?;
                remote.upsert_playlist_rows(user, &playlists).await
            }
            .await;
            let videos_result = async {
                // Locally edited playlists may have lost videos; replace their rows
                for playlist in playlists.iter().filter(|p| pending.playlists.contains(&p.id)) {
                    self.fence(epoch)?;
                    remote.clear_video_rows(user, &playlist.id).await?;
                }
                self.fence(epoch)?;
                remote.upsert_video_rows(user, &playlists).await
            }
            .await;
            (playlists_result, videos_result)
        };

        let progress_sync = async {
            self.fence(epoch)?;
            remote.upsert_progress_rows(user, &progress).await
        };

        let deletions = async {
            let mut count = 0;
            for id in &pending.deleted_playlists {
                self.fence(epoch)?;
                remote.delete_playlist(user, id).await?;
                count += 1;
            }
            if !pending.cleared_progress.is_empty() {
                let ids: Vec<String> = pending.cleared_progress.iter().cloned().collect();
                self.fence(epoch)?;
                remote.clear_playlist_progress(user, &ids).await?;
                count += ids.len();
            }
            Ok::<_, RemoteError>(count)
        };

        let ((playlists_result, videos_result), progress_result, deletions_result) =
            tokio::join!(playlists_and_videos, progress_sync, deletions);

        let report = SyncReport {
            playlists: SyncOutcome::from_result(playlists_result, "playlists"),
            videos: SyncOutcome::from_result(videos_result, "videos"),
            progress: SyncOutcome::from_result(progress_result, "progress"),
            deletions: SyncOutcome::from_result(deletions_result, "deletions"),
        };

        if self.session.is_current(epoch) {
            self.local
                .update_pending(|p| clear_confirmed(p, &pending, &report));
        }
        tracing::info!("Synced local data to remote: {}", report);
        report
    }

    /// Pull the remote library into the local store (called on logout).
    /// Playlists are merged in remote order; the progress map is replaced.
    /// Local writes still pending are kept on top of the remote data.
    pub async fn sync_remote_to_local(&self) -> SyncReport {
        let Some((remote, user, epoch)) = self.sync_target("to local") else {
            return SyncReport::skipped();
        };
        self.flush().await;

        let (playlists, progress) = tokio::join!(
            remote.get_playlists(&user),
            remote.get_video_progress(&user)
        );

        let mut report = SyncReport::skipped();
        if let Err(e) = self.fence(epoch) {
            tracing::warn!("Discarding remote data: {}", e);
            report.playlists = SyncOutcome::Failed(e.kind);
            report.progress = SyncOutcome::Failed(e.kind);
            return report;
        }

        let pending = self.local.pending();
        match playlists {
            Ok(playlists) => {
                let video_total: usize = playlists.iter().map(|p| p.video_count()).sum();
                report.playlists = SyncOutcome::Synced(playlists.len());
                report.videos = SyncOutcome::Synced(video_total);
                let merged = overlay_playlists(playlists, &self.local, &pending);
                self.local.merge_playlists(&merged);
            }
            Err(e) => {
                tracing::warn!("Sync of playlists to local failed: {}", e);
                report.playlists = SyncOutcome::Failed(e.kind);
                report.videos = SyncOutcome::Failed(e.kind);
            }
        }
        match progress {
            Ok(progress) => {
                report.progress = SyncOutcome::Synced(progress.len());
                let merged = overlay_progress(progress, &self.local, &pending);
                self.local.replace_video_progress(&merged);
            }
            Err(e) => {
                tracing::warn!("Sync of progress to local failed: {}", e);
                report.progress = SyncOutcome::Failed(e.kind);
            }
        }

        tracing::info!("Synced remote data to local: {}", report);
        report
    }
}

/// Hide pending deletions and lay pending local playlists over a remote list.
fn overlay_playlists(
    mut playlists: Vec<Playlist>,
    local: &LocalStore,
    pending: &PendingChanges,
) -> Vec<Playlist> {
    if pending.playlists.is_empty() && pending.deleted_playlists.is_empty() {
        return playlists;
    }
    playlists.retain(|p| !pending.deleted_playlists.contains(&p.id));
    let local_playlists = local.get_playlists();
    // Reverse so prepended playlists keep their newest-first order
    for playlist in local_playlists
        .into_iter()
        .rev()
        .filter(|p| pending.playlists.contains(&p.id))
    {
        upsert_playlist(&mut playlists, playlist);
    }
    playlists
}

/// Hide pending clears and lay pending local progress over a remote map.
fn overlay_progress(mut progress: ProgressMap, local: &LocalStore, pending: &PendingChanges) -> ProgressMap {
    if pending.progress.is_empty() && pending.cleared_progress.is_empty() {
        return progress;
    }
    for id in &pending.cleared_progress {
        progress.remove(id);
    }
    let local_progress = local.get_video_progress();
    for id in &pending.progress {
        if let Some(record) = local_progress.get(id) {
            progress.insert(id.clone(), record.clone());
        }
    }
    progress
}

/// Drop the pending entries a sync run confirmed. Entries added after the
/// run's snapshot stay.
fn clear_confirmed(current: &mut PendingChanges, synced: &PendingChanges, report: &SyncReport) {
    fn remove_all(set: &mut BTreeSet<String>, confirmed: &BTreeSet<String>) {
        set.retain(|id| !confirmed.contains(id));
    }
    if report.playlists.is_synced() && report.videos.is_synced() {
        remove_all(&mut current.playlists, &synced.playlists);
    }
    if report.progress.is_synced() {
        remove_all(&mut current.progress, &synced.progress);
    }
    if report.deletions.is_synced() {
        remove_all(&mut current.deleted_playlists, &synced.deleted_playlists);
        remove_all(&mut current.cleared_progress, &synced.cleared_progress);
    }
}
