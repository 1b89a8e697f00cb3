//! Listening statistics and the "continue listening" shelf.

use chrono::{DateTime, Duration, Utc};
use std::fmt;

use crate::model::{Playlist, ProgressMap, Video, VideoProgress};

const FIVE_HOURS: f64 = 5.0 * 3600.0;
const TEN_HOURS: f64 = 10.0 * 3600.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Achievement {
    TenHourListener,
    FiveHourListener,
    ChapterMaster,
    Bookworm,
    GettingStarted,
}

impl Achievement {
    pub fn name(&self) -> &'static str {
        match self {
            Achievement::TenHourListener => "10 Hour Listener",
            Achievement::FiveHourListener => "5 Hour Listener",
            Achievement::ChapterMaster => "Chapter Master",
            Achievement::Bookworm => "Bookworm",
            Achievement::GettingStarted => "Getting Started",
        }
    }
}

impl fmt::Display for Achievement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListeningStats {
    /// Sum of saved playhead positions, in seconds
    pub total_listening_seconds: f64,
    pub completed_chapters: usize,
    pub total_chapters: usize,
    /// Completed over total, rounded to a whole percent
    pub completion_percentage: u32,
    /// Started but not finished
    pub in_progress: usize,
    pub week_listening_seconds: f64,
    pub week_completed: usize,
    pub achievements: Vec<Achievement>,
}

impl ListeningStats {
    pub fn compute(playlists: &[Playlist], progress: &ProgressMap, now: DateTime<Utc>) -> Self {
        let total_chapters: usize = playlists.iter().map(|p| p.video_count()).sum();
        let total_listening_seconds: f64 = progress.values().map(|p| p.current_time.max(0.0)).sum();
        let completed_chapters = progress.values().filter(|p| p.watched).count();
        let in_progress = progress
            .values()
            .filter(|p| !p.watched && p.current_time > 0.0)
            .count();

        let completion_percentage = if total_chapters > 0 {
            (completed_chapters as f64 / total_chapters as f64 * 100.0).round() as u32
        } else {
            0
        };

        let week_ago = now - Duration::days(7);
        let this_week: Vec<&VideoProgress> = progress
            .values()
            .filter(|p| p.last_played > week_ago)
            .collect();
        let week_listening_seconds: f64 = this_week.iter().map(|p| p.current_time.max(0.0)).sum();
        let week_completed = this_week.iter().filter(|p| p.watched).count();

        let mut achievements = Vec::new();
        if total_listening_seconds >= TEN_HOURS {
            achievements.push(Achievement::TenHourListener);
        }
        if total_listening_seconds >= FIVE_HOURS {
            achievements.push(Achievement::FiveHourListener);
        }
        if completed_chapters >= 50 {
            achievements.push(Achievement::ChapterMaster);
        }
        if completed_chapters >= 20 {
            achievements.push(Achievement::Bookworm);
        }
        if completed_chapters >= 10 {
            achievements.push(Achievement::GettingStarted);
        }

        Self {
            total_listening_seconds,
            completed_chapters,
            total_chapters,
            completion_percentage,
            in_progress,
            week_listening_seconds,
            week_completed,
            achievements,
        }
    }
}

/// A partially played chapter and where it lives.
#[derive(Debug, Clone, PartialEq)]
pub struct ContinueItem {
    pub playlist: Playlist,
    pub video: Video,
    pub video_index: usize,
    pub progress: VideoProgress,
}

impl ContinueItem {
    pub fn percent_complete(&self) -> f64 {
        self.progress.ratio() * 100.0
    }
}

/// Unfinished chapters played past `min_seconds`, most recent first.
///
/// The `limit` most recent records are taken before matching, so records
/// whose video is no longer in any playlist shorten the list.
pub fn continue_listening(
    playlists: &[Playlist],
    progress: &ProgressMap,
    min_seconds: f64,
    limit: usize,
) -> Vec<ContinueItem> {
    let mut candidates: Vec<&VideoProgress> = progress
        .values()
        .filter(|p| !p.watched && p.current_time > min_seconds)
        .collect();
    candidates.sort_by(|a, b| b.last_played.cmp(&a.last_played));

    candidates
        .into_iter()
        .take(limit)
        .filter_map(|p| {
            let playlist = playlists.iter().find(|pl| pl.contains_video(&p.video_id))?;
            let video_index = playlist.video_index(&p.video_id)?;
            Some(ContinueItem {
                playlist: playlist.clone(),
                video: playlist.videos()[video_index].clone(),
                video_index,
                progress: p.clone(),
            })
        })
        .collect()
}

/// `"1h 5m"`, or `"12m"` under an hour.
pub fn format_listening_time(seconds: f64) -> String {
    let seconds = if seconds.is_finite() { seconds.max(0.0) as u64 } else { 0 };
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(id: &str, time: f64, watched: bool, played: DateTime<Utc>) -> VideoProgress {
        VideoProgress {
            video_id: id.to_string(),
            playlist_id: Some("p1".to_string()),
            current_time: time,
            duration: 600.0,
            last_played: played,
            watched,
        }
    }

    fn library() -> Vec<Playlist> {
        vec![Playlist::new(
            "p1",
            "Book",
            None,
            "",
            "",
            vec![
                Video::new("a", "A", "", 600),
                Video::new("b", "B", "", 600),
                Video::new("c", "C", "", 600),
                Video::new("d", "D", "", 600),
            ],
        )]
    }

    #[test]
    fn test_format_listening_time() {
        assert_eq!(format_listening_time(0.0), "0m");
        assert_eq!(format_listening_time(59.0), "0m");
        assert_eq!(format_listening_time(720.0), "12m");
        assert_eq!(format_listening_time(3900.0), "1h 5m");
        assert_eq!(format_listening_time(-10.0), "0m");
    }

    #[test]
    fn test_compute_basic() {
        let now = Utc::now();
        let mut map = ProgressMap::new();
        map.insert("a".into(), progress("a", 600.0, true, now));
        map.insert("b".into(), progress("b", 120.0, false, now - Duration::days(10)));
        map.insert("c".into(), progress("c", 0.0, false, now));

        let stats = ListeningStats::compute(&library(), &map, now);
        assert_eq!(stats.total_listening_seconds, 720.0);
        assert_eq!(stats.completed_chapters, 1);
        assert_eq!(stats.total_chapters, 4);
        assert_eq!(stats.completion_percentage, 25);
        assert_eq!(stats.in_progress, 1);
        assert_eq!(stats.week_listening_seconds, 600.0);
        assert_eq!(stats.week_completed, 1);
        assert!(stats.achievements.is_empty());
    }

    #[test]
    fn test_empty_library() {
        let stats = ListeningStats::compute(&[], &ProgressMap::new(), Utc::now());
        assert_eq!(stats.completion_percentage, 0);
        assert_eq!(stats.total_chapters, 0);
    }

    #[test]
    fn test_achievements() {
        let now = Utc::now();
        let mut map = ProgressMap::new();
        for i in 0..20 {
            let id = format!("v{}", i);
            map.insert(id.clone(), progress(&id, 1900.0, true, now));
        }

        let stats = ListeningStats::compute(&[], &map, now);
        assert_eq!(
            stats.achievements,
            vec![
                Achievement::TenHourListener,
                Achievement::FiveHourListener,
                Achievement::Bookworm,
                Achievement::GettingStarted,
            ]
        );
    }

    #[test]
    fn test_continue_listening() {
        let now = Utc::now();
        let mut map = ProgressMap::new();
        map.insert("a".into(), progress("a", 100.0, false, now - Duration::minutes(10)));
        map.insert("b".into(), progress("b", 200.0, false, now));
        map.insert("c".into(), progress("c", 4.0, false, now));
        map.insert("d".into(), progress("d", 590.0, true, now));
        map.insert("gone".into(), progress("gone", 50.0, false, now - Duration::minutes(5)));

        let items = continue_listening(&library(), &map, 5.0, 5);
        let ids: Vec<&str> = items.iter().map(|i| i.video.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(items[0].video_index, 1);
        assert_eq!(items[0].playlist.id, "p1");

        let limited = continue_listening(&library(), &map, 5.0, 1);
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].video.id, "b");
    }
}
