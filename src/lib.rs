//! Offline-first audiobook library.
//!
//! YouTube playlists and single videos are imported as audiobooks. Playlists,
//! per-video progress and bookmarks live in a local key-value store and, when
//! a user is signed in and online, are mirrored to a remote relational backend.
//!
//! - [`storage::HybridStorage`]: the facade every caller goes through
//! - [`app::AudiobookApp`]: explicit application state (library, player, session)
//! - [`service::youtube::YouTubeClient`]: metadata import

pub mod app;
pub mod bookmarks;
pub mod config;
pub mod duration;
pub mod error;
pub mod model;
pub mod service;
pub mod session;
pub mod stats;
pub mod storage;
