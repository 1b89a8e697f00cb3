use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::duration::format_duration;

/// Fraction of a video's duration after which it counts as watched.
pub const WATCHED_THRESHOLD: f64 = 0.90;

/// Progress records keyed by video ID.
pub type ProgressMap = BTreeMap<String, VideoProgress>;

/// A single chapter of an audiobook.
///
/// Deserialization ignores any stored `duration` string and formats it again
/// from `duration_seconds`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "VideoRecord")]
pub struct Video {
    /// YouTube video ID
    pub id: String,
    pub title: String,
    pub thumbnail: String,
    /// Display form of `duration_seconds` (`M:SS` or `H:MM:SS`)
    pub duration: String,
    pub duration_seconds: u64,
}

impl Video {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        thumbnail: impl Into<String>,
        duration_seconds: u64,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            thumbnail: thumbnail.into(),
            duration: format_duration(duration_seconds),
            duration_seconds,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoRecord {
    id: String,
    title: String,
    #[serde(default)]
    thumbnail: String,
    #[serde(default)]
    duration_seconds: u64,
}

impl From<VideoRecord> for Video {
    fn from(record: VideoRecord) -> Self {
        Video::new(record.id, record.title, record.thumbnail, record.duration_seconds)
    }
}

/// An imported audiobook: an ordered list of videos plus display metadata.
///
/// `videos` and `video_count` are private so the count can never drift from
/// the list; every constructor, mutation and deserialization re-derives it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "PlaylistRecord", into = "PlaylistRecord")]
pub struct Playlist {
    /// Source playlist ID, or the video ID for single-video imports
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub thumbnail: String,
    /// The URL the playlist was imported from
    pub url: String,
    pub date_added: DateTime<Utc>,
    videos: Vec<Video>,
    video_count: usize,
}

/// JSON shape of a playlist in the local store.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistRecord {
    id: String,
    title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default)]
    thumbnail: String,
    #[serde(default)]
    video_count: usize,
    #[serde(default)]
    videos: Vec<Video>,
    #[serde(default)]
    url: String,
    date_added: DateTime<Utc>,
}

impl From<PlaylistRecord> for Playlist {
    fn from(record: PlaylistRecord) -> Self {
        Playlist::new(
            record.id,
            record.title,
            record.description,
            record.thumbnail,
            record.url,
            record.videos,
        )
        .with_date_added(record.date_added)
    }
}

impl From<Playlist> for PlaylistRecord {
    fn from(playlist: Playlist) -> Self {
        Self {
            id: playlist.id,
            title: playlist.title,
            description: playlist.description,
            thumbnail: playlist.thumbnail,
            video_count: playlist.video_count,
            videos: playlist.videos,
            url: playlist.url,
            date_added: playlist.date_added,
        }
    }
}

impl Playlist {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        description: Option<String>,
        thumbnail: impl Into<String>,
        url: impl Into<String>,
        videos: Vec<Video>,
    ) -> Self {
        let video_count = videos.len();
        Self {
            id: id.into(),
            title: title.into(),
            description,
            thumbnail: thumbnail.into(),
            url: url.into(),
            date_added: Utc::now(),
            videos,
            video_count,
        }
    }

    pub fn with_date_added(mut self, date_added: DateTime<Utc>) -> Self {
        self.date_added = date_added;
        self
    }

    pub fn videos(&self) -> &[Video] {
        &self.videos
    }

    pub fn video_count(&self) -> usize {
        self.video_count
    }

    pub fn video(&self, video_id: &str) -> Option<&Video> {
        self.videos.iter().find(|v| v.id == video_id)
    }

    pub fn video_index(&self, video_id: &str) -> Option<usize> {
        self.videos.iter().position(|v| v.id == video_id)
    }

    pub fn contains_video(&self, video_id: &str) -> bool {
        self.video_index(video_id).is_some()
    }

    pub fn video_ids(&self) -> Vec<String> {
        self.videos.iter().map(|v| v.id.clone()).collect()
    }

    pub fn total_duration_seconds(&self) -> u64 {
        self.videos.iter().map(|v| v.duration_seconds).sum()
    }

    /// Append a video at the end of the playback order.
    pub fn push_video(&mut self, video: Video) {
        self.videos.push(video);
        self.video_count = self.videos.len();
    }

    /// Remove a video by ID. Returns false if it wasn't present.
    pub fn remove_video(&mut self, video_id: &str) -> bool {
        let len_before = self.videos.len();
        self.videos.retain(|v| v.id != video_id);
        self.video_count = self.videos.len();
        self.videos.len() < len_before
    }
}

/// Last known playhead state for one video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoProgress {
    pub video_id: String,
    /// Playlist the progress was recorded under (part of the remote key)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playlist_id: Option<String>,
    pub current_time: f64,
    pub duration: f64,
    pub last_played: DateTime<Utc>,
    pub watched: bool,
}

impl VideoProgress {
    pub fn new(
        video_id: impl Into<String>,
        playlist_id: Option<String>,
        current_time: f64,
        duration: f64,
        watched: bool,
    ) -> Self {
        Self {
            video_id: video_id.into(),
            playlist_id,
            current_time,
            duration,
            last_played: Utc::now(),
            watched,
        }
    }

    /// Fraction of the video played, 0 when the duration is unknown.
    pub fn ratio(&self) -> f64 {
        if self.duration > 0.0 {
            self.current_time / self.duration
        } else {
            0.0
        }
    }
}

/// Watched iff at least [`WATCHED_THRESHOLD`] of a known duration has been played.
pub fn is_watched(current_time: f64, duration: f64) -> bool {
    if !(duration > 0.0) {
        return false;
    }
    current_time / duration >= WATCHED_THRESHOLD
}

/// A saved moment inside a video. Local only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    pub id: String,
    pub video_id: String,
    pub playlist_id: String,
    /// Seconds into the video
    pub time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub timestamp: DateTime<Utc>,
}
