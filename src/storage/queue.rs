//! Ordered queue of remote writes executed by a single background task.
//!
//! Every local write that should reach the remote store is turned into a
//! [`RemoteWrite`] and queued here. Callers either fire and forget
//! ([`WriteQueue::enqueue`]) or wait for the outcome ([`WriteQueue::submit`]).
//! Each job carries the identity epoch it was issued under; a job whose epoch
//! is no longer current is dropped as [`RemoteErrorKind::Stale`].
//!
//! Outcomes feed the pending-change ledger: a failed or dropped write is
//! recorded as pending, a confirmed one clears its entry as long as the local
//! record still matches what was sent.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use super::local::{LocalStore, PendingChanges};
use super::remote::RemoteStore;
use crate::error::{RemoteError, RemoteErrorKind, RemoteResult};
use crate::model::{Playlist, VideoProgress};
use crate::session::{Session, User};

#[derive(Debug, Clone)]
pub enum RemoteWrite {
    SavePlaylist(Playlist),
    DeletePlaylist(String),
    RemoveVideo { playlist_id: String, video_id: String },
    UpdateProgress(VideoProgress),
    ClearProgress(Vec<String>),
}

impl RemoteWrite {
    fn describe(&self) -> String {
        match self {
            RemoteWrite::SavePlaylist(p) => format!("save playlist {}", p.id),
            RemoteWrite::DeletePlaylist(id) => format!("delete playlist {}", id),
            RemoteWrite::RemoveVideo { playlist_id, video_id } => {
                format!("remove video {} from {}", video_id, playlist_id)
            }
            RemoteWrite::UpdateProgress(p) => format!("update progress {}", p.video_id),
            RemoteWrite::ClearProgress(ids) => format!("clear progress of {} video(s)", ids.len()),
        }
    }

    async fn apply(&self, remote: &RemoteStore, user: &User) -> RemoteResult<()> {
        match self {
            RemoteWrite::SavePlaylist(p) => remote.save_playlist(user, p).await,
            RemoteWrite::DeletePlaylist(id) => remote.delete_playlist(user, id).await,
            RemoteWrite::RemoveVideo { playlist_id, video_id } => {
                remote.remove_video(user, playlist_id, video_id).await
            }
            RemoteWrite::UpdateProgress(p) => remote.update_video_progress(user, p).await,
            RemoteWrite::ClearProgress(ids) => remote.clear_playlist_progress(user, ids).await,
        }
    }

    /// Record that the local side of this write is still ahead of the remote store.
    pub fn mark_pending(&self, pending: &mut PendingChanges) {
        match self {
            RemoteWrite::SavePlaylist(p) => pending.playlist_saved(&p.id),
            RemoteWrite::DeletePlaylist(id) => pending.playlist_deleted(id),
            // The whole local playlist replaces the remote one on the next sync
            RemoteWrite::RemoveVideo { playlist_id, .. } => pending.playlist_saved(playlist_id),
            RemoteWrite::UpdateProgress(p) => pending.progress_saved(&p.video_id),
            RemoteWrite::ClearProgress(ids) => {
                for id in ids {
                    pending.progress_cleared(id);
                }
            }
        }
    }

    /// Clear pending entries this write settled. A local record changed
    /// since the write was issued keeps its entry for the write behind it.
    fn mark_confirmed(&self, pending: &mut PendingChanges, local: &LocalStore) {
        match self {
            RemoteWrite::SavePlaylist(p) => {
                if local.get_playlist(&p.id).as_ref() == Some(p) {
                    pending.playlists.remove(&p.id);
                }
            }
            RemoteWrite::DeletePlaylist(id) => {
                if local.get_playlist(id).is_none() {
                    pending.deleted_playlists.remove(id);
                }
            }
            // Only one video row changed; an earlier pending save still needs a full sync
            RemoteWrite::RemoveVideo { .. } => {}
            RemoteWrite::UpdateProgress(p) => {
                if local.get_progress(&p.video_id).as_ref() == Some(p) {
                    pending.progress.remove(&p.video_id);
                }
            }
            RemoteWrite::ClearProgress(ids) => {
                for id in ids {
                    if local.get_progress(id).is_none() {
                        pending.cleared_progress.remove(id);
                    }
                }
            }
        }
    }
}

struct Job {
    write: RemoteWrite,
    user: User,
    epoch: u64,
    done: Option<oneshot::Sender<RemoteResult<()>>>,
}

enum Message {
    Job(Job),
    Flush(oneshot::Sender<()>),
}

/// Handle to the remote write worker. Cloning shares the same worker.
#[derive(Clone)]
pub struct WriteQueue {
    tx: mpsc::UnboundedSender<Message>,
}

impl WriteQueue {
    /// Spawn the worker on the current tokio runtime.
    pub fn spawn(remote: RemoteStore, local: LocalStore, session: Arc<Session>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(rx, remote, local, session));
        Self { tx }
    }

    /// Queue a write without waiting for it.
    pub fn enqueue(&self, write: RemoteWrite, user: User, epoch: u64) {
        let job = Job {
            write,
            user,
            epoch,
            done: None,
        };
        if self.tx.send(Message::Job(job)).is_err() {
            tracing::warn!("Remote write queue is closed, dropping write");
        }
    }

    /// Queue a write and wait for its outcome.
    pub async fn submit(&self, write: RemoteWrite, user: User, epoch: u64) -> RemoteResult<()> {
        let (done_tx, done_rx) = oneshot::channel();
        let job = Job {
            write,
            user,
            epoch,
            done: Some(done_tx),
        };
        self.tx
            .send(Message::Job(job))
            .map_err(|_| RemoteError::unavailable("remote write queue is closed"))?;
        done_rx
            .await
            .map_err(|_| RemoteError::unavailable("remote write worker stopped"))?
    }

    /// Wait until every write queued before this call has been executed.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Message::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<Message>,
    remote: RemoteStore,
    local: LocalStore,
    session: Arc<Session>,
) {
    while let Some(message) = rx.recv().await {
        match message {
            Message::Job(job) => {
                let result = execute(&job, &remote, &session).await;
                match &result {
                    Ok(()) => local.update_pending(|p| job.write.mark_confirmed(p, &local)),
                    Err(e) => {
                        if e.kind == RemoteErrorKind::Stale {
                            tracing::debug!("Dropped {}: {}", job.write.describe(), e.message);
                        } else {
                            tracing::warn!("Remote write failed ({}): {}", job.write.describe(), e);
                        }
                        local.update_pending(|p| job.write.mark_pending(p));
                    }
                }
                if let Some(done) = job.done {
                    let _ = done.send(result);
                }
            }
            Message::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
    tracing::debug!("Remote write worker stopped");
}

async fn execute(job: &Job, remote: &RemoteStore, session: &Session) -> RemoteResult<()> {
    if !session.is_current(job.epoch) {
        return Err(RemoteError::stale(format!(
            "issued under identity epoch {}, now {}",
            job.epoch,
            session.epoch()
        )));
    }
    tracing::debug!("Remote write: {}", job.write.describe());
    job.write.apply(remote, &job.user).await
}
