//! Identity and connectivity transitions.
//!
//! Login pushes the local library up before switching reads to the remote
//! store; logout pulls the remote library down before signing out so the
//! local copy stays complete.

use super::AudiobookApp;
use crate::session::User;
use crate::storage::SyncReport;

impl AudiobookApp {
    /// Reload playlists and progress from storage into memory.
    pub async fn reload(&mut self) {
        let (playlists, progress) = tokio::join!(
            self.storage.get_playlists(),
            self.storage.get_video_progress()
        );
        tracing::debug!(
            "Loaded {} playlists and {} progress records from {}",
            playlists.len(),
            progress.len(),
            self.storage.backend_name()
        );
        self.library.set(playlists);
        self.tracker.load_progress(progress);
    }

    pub async fn login(&mut self, user: User) -> SyncReport {
        self.session.sign_in(user);

        let report = self.storage.sync_local_to_remote().await;
        if !report.is_skipped() {
            tracing::info!("Login sync: {}", report);
        }
        self.reload().await;
        report
    }

    pub async fn logout(&mut self) -> SyncReport {
        let report = self.storage.sync_remote_to_local().await;
        if !report.is_skipped() {
            tracing::info!("Logout sync: {}", report);
        }

        self.session.sign_out();
        self.reload().await;
        report
    }

    /// Record a reachability change. Coming back online while signed in
    /// pushes writes made while offline.
    pub async fn set_online(&mut self, online: bool) -> Option<SyncReport> {
        let was_online = self.session.set_online(online);
        if was_online || !online || !self.session.is_authenticated() {
            return None;
        }

        tracing::info!("Back online - reconciling offline changes");
        let report = self.storage.sync_local_to_remote().await;
        tracing::info!("Reconnect sync: {}", report);
        self.reload().await;
        Some(report)
    }
}
