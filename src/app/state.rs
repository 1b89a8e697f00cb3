use serde::{Deserialize, Serialize};
use std::fmt;

/// What to do when a chapter finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoPlayMode {
    /// Advance to the next chapter, stop after the last one
    #[default]
    Next,
    Repeat,
    Stop,
}

impl fmt::Display for AutoPlayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AutoPlayMode::Next => "next",
            AutoPlayMode::Repeat => "repeat",
            AutoPlayMode::Stop => "stop",
        };
        f.write_str(name)
    }
}

/// Player instruction after a chapter ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceAction {
    PlayIndex(usize),
    Replay,
    Stop,
}

/// Playback state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackState {
    pub current_video_id: Option<String>,
    pub current_playlist_id: Option<String>,
    pub current_video_index: usize,
    pub is_playing: bool,
}

impl PlaybackState {
    pub fn is_current(&self, video_id: &str) -> bool {
        self.current_video_id.as_deref() == Some(video_id)
    }
}
