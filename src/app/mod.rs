pub mod library;
pub mod playback;
pub mod state;
mod sync;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use crate::bookmarks::BookmarkStore;
use crate::config::Config;
use crate::error::{MetadataError, MetadataResult};
use crate::model::{Playlist, Video};
use crate::service::youtube::YouTubeClient;
use crate::service::MetadataProvider;
use crate::session::Session;
use crate::stats::{continue_listening, ContinueItem, ListeningStats};
use crate::storage::postgrest::PostgrestBackend;
use crate::storage::{HybridStorage, LocalStore, RemoteStore};

pub use library::Library;
pub use playback::ProgressTracker;
pub use state::{AdvanceAction, AutoPlayMode, PlaybackState};

pub struct AudiobookApp {
    pub config: Config,
    session: Arc<Session>,
    storage: Arc<HybridStorage>,
    pub library: Library,
    pub tracker: ProgressTracker,
    bookmarks: BookmarkStore,
    provider: Option<Box<dyn MetadataProvider>>,
}

impl AudiobookApp {
    /// Wire up storage, session and the metadata provider from `config`, then
    /// load the library. Starts signed out and online.
    pub async fn new(config: Config) -> Result<Self> {
        let session = Arc::new(Session::new(true));
        let local = LocalStore::open_default(config.data_dir());

        let remote = if config.remote.is_usable() {
            let backend = PostgrestBackend::new(
                &config.remote.url,
                &config.remote.anon_key,
                Duration::from_secs(config.remote.timeout_secs),
            )
            .context("Failed to configure remote backend")?;
            tracing::info!("Remote storage at {}", config.remote.url);
            Some(RemoteStore::new(Arc::new(backend)))
        } else {
            tracing::debug!("Remote storage disabled");
            None
        };

        let storage = Arc::new(HybridStorage::new(local, remote, session));
        let provider: Box<dyn MetadataProvider> = Box::new(YouTubeClient::from_config(&config.youtube));
        Ok(Self::with_parts(config, storage, Some(provider)).await)
    }

    /// Assemble an app around an existing storage facade.
    pub async fn with_parts(
        config: Config,
        storage: Arc<HybridStorage>,
        provider: Option<Box<dyn MetadataProvider>>,
    ) -> Self {
        let tracker = ProgressTracker::new(storage.clone(), config.playback.resume_min_seconds);
        let mut app = Self {
            session: storage.session().clone(),
            bookmarks: BookmarkStore::new(storage.local().clone()),
            library: Library::default(),
            tracker,
            storage,
            provider,
            config,
        };
        app.reload().await;
        app
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn storage(&self) -> &Arc<HybridStorage> {
        &self.storage
    }

    pub fn bookmarks(&self) -> &BookmarkStore {
        &self.bookmarks
    }

    pub fn playlists(&self) -> &[Playlist] {
        self.library.playlists()
    }

    // === Library ===

    /// Fetch a playlist or single video and add it to the library.
    pub async fn import(&mut self, url: &str) -> MetadataResult<Playlist> {
        let provider = self.provider.as_ref().ok_or(MetadataError::MissingApiKey)?;
        let playlist = match provider.import(url).await {
            Ok(playlist) => playlist,
            Err(e) => {
                tracing::warn!("Import of {} failed: {}", url, e);
                return Err(e);
            }
        };

        self.storage.save_playlist(&playlist).await;
        self.library.upsert(playlist.clone());
        tracing::info!("Imported \"{}\" ({} videos)", playlist.title, playlist.video_count());
        Ok(playlist)
    }

    /// Delete a playlist and the progress of every video in it.
    pub async fn delete_playlist(&mut self, id: &str) {
        let video_ids = match self.library.get(id) {
            Some(playlist) => playlist.video_ids(),
            None => self
                .storage
                .get_playlist(id)
                .await
                .map(|p| p.video_ids())
                .unwrap_or_default(),
        };

        self.tracker.clear_playlist_progress(&video_ids);
        self.storage.delete_playlist(id).await;
        self.library.remove(id);
        if self.tracker.state().current_playlist_id.as_deref() == Some(id) {
            self.tracker.set_current_playlist(None);
            self.tracker.set_is_playing(false);
        }
    }

    /// Remove one video from a playlist, clearing its progress first.
    pub async fn remove_video(&mut self, playlist_id: &str, video_id: &str) {
        self.tracker.clear_video_progress(video_id);
        self.storage.remove_video(playlist_id, video_id).await;
        self.library.remove_video(playlist_id, video_id);
    }

    // === Playback ===

    /// Make the video at `index` current. Returns it with the position to
    /// resume from, if any.
    pub fn start_video(&mut self, playlist_id: &str, index: usize) -> Option<(Video, Option<f64>)> {
        let video = self.library.get(playlist_id)?.videos().get(index)?.clone();
        self.tracker.set_current_playlist(Some(playlist_id.to_string()));
        self.tracker.set_current_video(&video.id, index);
        self.tracker.set_is_playing(true);
        let resume = self.tracker.resume_position(&video.id);
        Some((video, resume))
    }

    /// Apply the configured auto-play mode to the current playlist.
    pub fn video_ended(&mut self) -> AdvanceAction {
        let playlist_len = self
            .tracker
            .state()
            .current_playlist_id
            .as_deref()
            .and_then(|id| self.library.get(id))
            .map_or(0, |p| p.video_count());
        self.tracker.on_video_ended(self.config.playback.auto_play, playlist_len)
    }

    // === Derived views ===

    pub fn continue_listening(&self) -> Vec<ContinueItem> {
        continue_listening(
            self.library.playlists(),
            self.tracker.progress_map(),
            self.config.playback.continue_min_seconds,
            self.config.playback.continue_limit,
        )
    }

    pub fn stats(&self) -> ListeningStats {
        ListeningStats::compute(self.library.playlists(), self.tracker.progress_map(), chrono::Utc::now())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::Video;
    use crate::storage::memory::MemoryBackend;
    use async_trait::async_trait;

    /// Serves one canned playlist for any URL.
    pub(crate) struct StubProvider {
        pub playlist: Playlist,
    }

    #[async_trait]
    impl MetadataProvider for StubProvider {
        fn provider_name(&self) -> &str {
            "stub"
        }

        async fn fetch_playlist(&self, _url: &str) -> MetadataResult<Playlist> {
            Ok(self.playlist.clone())
        }

        async fn fetch_video(&self, url: &str) -> MetadataResult<Playlist> {
            Err(MetadataError::Unavailable(url.to_string()))
        }
    }

    pub(crate) fn book(id: &str, videos: &[(&str, u64)]) -> Playlist {
        let videos = videos
            .iter()
            .map(|(vid, secs)| Video::new(*vid, format!("Chapter {}", vid), "", *secs))
            .collect();
        Playlist::new(id, format!("Book {}", id), None, "", "", videos)
    }

    pub(crate) async fn app_with_remote(playlist: Playlist) -> (AudiobookApp, Arc<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::new());
        let storage = Arc::new(HybridStorage::new(
            LocalStore::in_memory(),
            Some(RemoteStore::new(backend.clone())),
            Arc::new(Session::new(true)),
        ));
        let provider: Box<dyn MetadataProvider> = Box::new(StubProvider { playlist });
        let app = AudiobookApp::with_parts(Config::default(), storage, Some(provider)).await;
        (app, backend)
    }

    #[tokio::test]
    async fn test_import_adds_to_library_and_storage() {
        let (mut app, _) = app_with_remote(book("p1", &[("a", 65), ("b", 3661), ("c", 600)])).await;

        let imported = app
            .import("https://www.youtube.com/playlist?list=p1")
            .await
            .unwrap();
        assert_eq!(imported.video_count(), 3);
        assert_eq!(app.playlists().len(), 1);
        assert!(app.storage().local().get_playlist("p1").is_some());
    }

    #[tokio::test]
    async fn test_import_error_propagates() {
        let (mut app, _) = app_with_remote(book("p1", &[])).await;

        let err = app.import("https://youtu.be/abc").await.unwrap_err();
        assert!(matches!(err, MetadataError::Unavailable(_)));
        let err = app.import("https://example.com").await.unwrap_err();
        assert!(matches!(err, MetadataError::InvalidUrl(_)));
        assert!(app.playlists().is_empty());
    }

    #[tokio::test]
    async fn test_import_without_provider() {
        let storage = Arc::new(HybridStorage::local_only(LocalStore::in_memory(), Arc::new(Session::default())));
        let mut app = AudiobookApp::with_parts(Config::default(), storage, None).await;
        let err = app.import("https://youtu.be/abc").await.unwrap_err();
        assert!(matches!(err, MetadataError::MissingApiKey));
    }

    #[tokio::test]
    async fn test_delete_playlist_clears_progress() {
        let (mut app, _) = app_with_remote(book("p1", &[("v1", 600), ("v2", 600)])).await;
        app.import("https://www.youtube.com/playlist?list=p1").await.unwrap();
        app.tracker.update_video_progress("v1", "p1", 100.0, 600.0);
        app.tracker.update_video_progress("v2", "p1", 200.0, 600.0);

        app.delete_playlist("p1").await;

        assert!(app.playlists().is_empty());
        assert!(app.tracker.progress_map().is_empty());
        assert!(app.storage().local().get_video_progress().is_empty());
        assert!(app.storage().local().get_playlists().is_empty());
    }

    #[tokio::test]
    async fn test_remove_video_clears_its_progress() {
        let (mut app, _) = app_with_remote(book("p1", &[("v1", 600), ("v2", 600)])).await;
        app.import("https://www.youtube.com/playlist?list=p1").await.unwrap();
        app.tracker.update_video_progress("v1", "p1", 100.0, 600.0);
        app.tracker.update_video_progress("v2", "p1", 200.0, 600.0);

        app.remove_video("p1", "v1").await;

        assert_eq!(app.library.get("p1").unwrap().video_ids(), vec!["v2"]);
        assert!(app.tracker.progress("v1").is_none());
        assert!(app.tracker.progress("v2").is_some());
        assert_eq!(app.storage().local().get_playlist("p1").unwrap().video_count(), 1);
    }

    #[tokio::test]
    async fn test_start_video_and_auto_advance() {
        let (mut app, _) = app_with_remote(book("p1", &[("v1", 600), ("v2", 600)])).await;
        app.import("https://www.youtube.com/playlist?list=p1").await.unwrap();
        app.tracker.update_video_progress("v2", "p1", 42.0, 600.0);

        let (video, resume) = app.start_video("p1", 0).unwrap();
        assert_eq!(video.id, "v1");
        assert_eq!(resume, None);

        assert_eq!(app.video_ended(), AdvanceAction::PlayIndex(1));
        let (video, resume) = app.start_video("p1", 1).unwrap();
        assert_eq!(video.id, "v2");
        assert_eq!(resume, Some(42.0));

        assert_eq!(app.video_ended(), AdvanceAction::Stop);
        assert!(app.start_video("p1", 5).is_none());
    }

    #[tokio::test]
    async fn test_continue_listening_and_stats() {
        let (mut app, _) = app_with_remote(book("p1", &[("v1", 600), ("v2", 600)])).await;
        app.import("https://www.youtube.com/playlist?list=p1").await.unwrap();
        app.tracker.update_video_progress("v1", "p1", 590.0, 600.0);
        app.tracker.update_video_progress("v2", "p1", 60.0, 600.0);

        let shelf = app.continue_listening();
        assert_eq!(shelf.len(), 1);
        assert_eq!(shelf[0].video.id, "v2");

        let stats = app.stats();
        assert_eq!(stats.completed_chapters, 1);
        assert_eq!(stats.total_chapters, 2);
        assert_eq!(stats.completion_percentage, 50);
    }
}
