use crate::model::Playlist;
use crate::storage::local::upsert_playlist;

/// In-memory playlist list, newest first. Mirrors what storage returned on
/// the last reload plus the writes made since.
#[derive(Debug, Clone, Default)]
pub struct Library {
    playlists: Vec<Playlist>,
}

impl Library {
    pub fn new(playlists: Vec<Playlist>) -> Self {
        Self { playlists }
    }

    pub fn playlists(&self) -> &[Playlist] {
        &self.playlists
    }

    pub fn len(&self) -> usize {
        self.playlists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.playlists.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Playlist> {
        self.playlists.iter().find(|p| p.id == id)
    }

    pub fn set(&mut self, playlists: Vec<Playlist>) {
        self.playlists = playlists;
    }

    /// Replace a playlist with the same ID in place, or add it at the front.
    pub fn upsert(&mut self, playlist: Playlist) {
        upsert_playlist(&mut self.playlists, playlist);
    }

    pub fn remove(&mut self, id: &str) -> Option<Playlist> {
        let index = self.playlists.iter().position(|p| p.id == id)?;
        Some(self.playlists.remove(index))
    }

    /// Returns false if the playlist or video was not found.
    pub fn remove_video(&mut self, playlist_id: &str, video_id: &str) -> bool {
        self.playlists
            .iter_mut()
            .find(|p| p.id == playlist_id)
            .is_some_and(|p| p.remove_video(video_id))
    }

    /// First playlist containing `video_id`, with the video's index.
    pub fn find_video(&self, video_id: &str) -> Option<(&Playlist, usize)> {
        self.playlists
            .iter()
            .find_map(|p| p.video_index(video_id).map(|i| (p, i)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Video;

    fn playlist(id: &str, videos: &[&str]) -> Playlist {
        let videos = videos.iter().map(|v| Video::new(*v, *v, "", 60)).collect();
        Playlist::new(id, id, None, "", "", videos)
    }

    #[test]
    fn test_upsert_prepends_new_and_replaces_existing() {
        let mut library = Library::default();
        library.upsert(playlist("p1", &["a"]));
        library.upsert(playlist("p2", &["b"]));
        assert_eq!(library.playlists()[0].id, "p2");

        library.upsert(playlist("p1", &["a", "c"]));
        assert_eq!(library.len(), 2);
        assert_eq!(library.playlists()[1].video_count(), 2);
    }

    #[test]
    fn test_remove_and_remove_video() {
        let mut library = Library::new(vec![playlist("p1", &["a", "b"]), playlist("p2", &["c"])]);

        assert!(library.remove_video("p1", "a"));
        assert!(!library.remove_video("p1", "a"));
        assert!(!library.remove_video("missing", "b"));
        assert_eq!(library.get("p1").unwrap().video_count(), 1);

        assert_eq!(library.remove("p2").map(|p| p.id), Some("p2".to_string()));
        assert!(library.remove("p2").is_none());
        assert_eq!(library.len(), 1);
    }

    #[test]
    fn test_find_video() {
        let library = Library::new(vec![playlist("p1", &["a", "b"]), playlist("p2", &["c"])]);
        let (playlist, index) = library.find_video("b").unwrap();
        assert_eq!((playlist.id.as_str(), index), ("p1", 1));
        assert!(library.find_video("zzz").is_none());
    }
}
