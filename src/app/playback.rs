//! Progress reducer.
//!
//! [`ProgressTracker`] holds the authoritative in-memory progress map and the
//! current playback position. Every progress mutation is written through the
//! storage facade before the call returns; the remote half is queued.

use std::sync::Arc;

use super::state::{AdvanceAction, AutoPlayMode, PlaybackState};
use crate::model::{is_watched, ProgressMap, VideoProgress};
use crate::storage::HybridStorage;

pub struct ProgressTracker {
    storage: Arc<HybridStorage>,
    progress: ProgressMap,
    state: PlaybackState,
    resume_min_seconds: f64,
}

impl ProgressTracker {
    pub fn new(storage: Arc<HybridStorage>, resume_min_seconds: f64) -> Self {
        Self {
            storage,
            progress: ProgressMap::new(),
            state: PlaybackState::default(),
            resume_min_seconds,
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn progress_map(&self) -> &ProgressMap {
        &self.progress
    }

    pub fn progress(&self, video_id: &str) -> Option<&VideoProgress> {
        self.progress.get(video_id)
    }

    // === Playback bookkeeping (not persisted) ===

    pub fn set_current_video(&mut self, video_id: &str, index: usize) {
        self.state.current_video_id = Some(video_id.to_string());
        self.state.current_video_index = index;
    }

    pub fn set_is_playing(&mut self, playing: bool) {
        self.state.is_playing = playing;
    }

    pub fn set_current_playlist(&mut self, playlist_id: Option<String>) {
        self.state.current_playlist_id = playlist_id;
    }

    pub fn set_current_video_index(&mut self, index: usize) {
        self.state.current_video_index = index;
    }

    // === Progress actions (write-through) ===

    /// Replace the in-memory map, e.g. after a reload from storage.
    pub fn load_progress(&mut self, progress: ProgressMap) {
        self.progress = progress;
    }

    /// Overwrite the record for `video_id`. `watched` is recomputed from the
    /// ratio and `last_played` reset to now.
    pub fn update_video_progress(
        &mut self,
        video_id: &str,
        playlist_id: &str,
        current_time: f64,
        duration: f64,
    ) -> VideoProgress {
        let watched = is_watched(current_time, duration);
        let record = self
            .storage
            .update_video_progress(video_id, playlist_id, current_time, duration, watched);
        self.progress.insert(video_id.to_string(), record.clone());
        record
    }

    /// Flag an existing record as watched without looking at its ratio. The
    /// next `update_video_progress` recomputes the flag. Returns false if the
    /// video has no record.
    pub fn mark_as_watched(&mut self, video_id: &str, playlist_id: &str) -> bool {
        let Some(existing) = self.progress.get(video_id) else {
            tracing::debug!("No progress to mark watched for {}", video_id);
            return false;
        };
        let record = self.storage.update_video_progress(
            video_id,
            playlist_id,
            existing.current_time,
            existing.duration,
            true,
        );
        self.progress.insert(video_id.to_string(), record);
        true
    }

    pub fn clear_video_progress(&mut self, video_id: &str) {
        self.progress.remove(video_id);
        self.storage.clear_video_progress(video_id);
    }

    pub fn clear_playlist_progress(&mut self, video_ids: &[String]) {
        for id in video_ids {
            self.progress.remove(id);
        }
        self.storage.clear_playlist_progress(video_ids);
    }

    // === Navigation helpers ===

    /// Where to seek when `video_id` starts playing.
    pub fn resume_position(&self, video_id: &str) -> Option<f64> {
        self.progress
            .get(video_id)
            .map(|p| p.current_time)
            .filter(|t| *t > self.resume_min_seconds)
    }

    pub fn next_index(&self, playlist_len: usize) -> Option<usize> {
        let next = self.state.current_video_index + 1;
        (next < playlist_len).then_some(next)
    }

    pub fn previous_index(&self) -> Option<usize> {
        self.state.current_video_index.checked_sub(1)
    }

    /// Decide what follows the current chapter and update the playback state.
    pub fn on_video_ended(&mut self, mode: AutoPlayMode, playlist_len: usize) -> AdvanceAction {
        let action = match mode {
            AutoPlayMode::Repeat => AdvanceAction::Replay,
            AutoPlayMode::Next => match self.next_index(playlist_len) {
                Some(next) => AdvanceAction::PlayIndex(next),
                None => AdvanceAction::Stop,
            },
            AutoPlayMode::Stop => AdvanceAction::Stop,
        };

        match action {
            AdvanceAction::PlayIndex(index) => {
                self.state.current_video_index = index;
                self.state.current_video_id = None;
            }
            AdvanceAction::Stop => self.state.is_playing = false,
            AdvanceAction::Replay => {}
        }
        action
    }
}
