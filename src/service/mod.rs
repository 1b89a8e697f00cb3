//! Video metadata providers.
//!
//! A provider turns a playlist or video URL into a [`Playlist`] ready to be
//! stored. Single-video imports become one-video playlists keyed by the video ID.

pub mod youtube;

use async_trait::async_trait;

use crate::error::{MetadataError, MetadataResult};
use crate::model::{Playlist, Video};

/// What an import URL points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportSource {
    Playlist(String),
    Video(String),
}

/// Classify an import URL. A `list` parameter wins over a video ID.
pub fn classify_url(url: &str) -> MetadataResult<ImportSource> {
    if let Some(id) = youtube::extract_playlist_id(url) {
        return Ok(ImportSource::Playlist(id));
    }
    if let Some(id) = youtube::extract_video_id(url) {
        return Ok(ImportSource::Video(id));
    }
    Err(MetadataError::InvalidUrl(url.to_string()))
}

/// Top-level playlist metadata, before videos are attached.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistEnvelope {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub thumbnail: String,
    pub url: String,
}

/// Build a playlist from its envelope and videos. The first video's
/// thumbnail is used as cover, falling back to the envelope's.
pub fn assemble_playlist(envelope: PlaylistEnvelope, videos: Vec<Video>) -> Playlist {
    let thumbnail = videos
        .first()
        .map(|v| v.thumbnail.clone())
        .filter(|t| !t.is_empty())
        .unwrap_or(envelope.thumbnail);
    let description = envelope.description.filter(|d| !d.trim().is_empty());
    Playlist::new(envelope.id, envelope.title, description, thumbnail, envelope.url, videos)
}

#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Human-readable provider name (e.g., "youtube").
    fn provider_name(&self) -> &str;

    async fn fetch_playlist(&self, url: &str) -> MetadataResult<Playlist>;

    async fn fetch_video(&self, url: &str) -> MetadataResult<Playlist>;

    /// Fetch whatever `url` points at.
    async fn import(&self, url: &str) -> MetadataResult<Playlist> {
        match classify_url(url)? {
            ImportSource::Playlist(_) => self.fetch_playlist(url).await,
            ImportSource::Video(_) => self.fetch_video(url).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(thumbnail: &str) -> PlaylistEnvelope {
        PlaylistEnvelope {
            id: "PL1".into(),
            title: "Book".into(),
            description: Some("  ".into()),
            thumbnail: thumbnail.into(),
            url: "https://www.youtube.com/playlist?list=PL1".into(),
        }
    }

    #[test]
    fn test_classify_url() {
        assert_eq!(
            classify_url("https://www.youtube.com/playlist?list=PL123").unwrap(),
            ImportSource::Playlist("PL123".into())
        );
        assert_eq!(
            classify_url("https://www.youtube.com/watch?v=abc123&list=PL9").unwrap(),
            ImportSource::Playlist("PL9".into())
        );
        assert_eq!(
            classify_url("https://youtu.be/abc123").unwrap(),
            ImportSource::Video("abc123".into())
        );
        assert!(matches!(
            classify_url("https://example.com/watch?v=abc"),
            Err(MetadataError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_assemble_uses_first_video_thumbnail() {
        let videos = vec![
            Video::new("a", "A", "a.jpg", 65),
            Video::new("b", "B", "b.jpg", 3661),
            Video::new("c", "C", "c.jpg", 600),
        ];
        let playlist = assemble_playlist(envelope("cover.jpg"), videos);
        assert_eq!(playlist.thumbnail, "a.jpg");
        assert_eq!(playlist.video_count(), 3);
        assert!(playlist.description.is_none());
    }

    #[test]
    fn test_assemble_empty_falls_back_to_envelope() {
        let playlist = assemble_playlist(envelope("cover.jpg"), Vec::new());
        assert_eq!(playlist.thumbnail, "cover.jpg");
        assert_eq!(playlist.video_count(), 0);
    }
}
