//! Persistence for the audiobook library.
//!
//! - [`local::LocalStore`]: JSON records in a [`KeyValueStore`] (always available)
//! - [`remote::RemoteStore`]: user-scoped relational tables behind a [`remote::RemoteBackend`]
//! - [`hybrid::HybridStorage`]: routes between the two and reconciles on login/logout
//!
//! The app holds an `Arc<HybridStorage>` and all persistence goes through it.

pub mod hybrid;
pub mod kv;
pub mod local;
pub mod memory;
pub mod postgrest;
pub mod queue;
pub mod remote;

use anyhow::Result;

pub use hybrid::{HybridStorage, SyncOutcome, SyncReport};
pub use kv::{MemoryKvStore, RedbKvStore};
pub use local::{LocalStore, PendingChanges};
pub use remote::{RemoteBackend, RemoteStore};

/// Playlists, newest first.
pub const PLAYLISTS_KEY: &str = "audiobook_playlists";
/// Map of video ID to progress record.
pub const PROGRESS_KEY: &str = "audiobook_video_progress";
/// Map of bookmark ID to bookmark.
pub const BOOKMARKS_KEY: &str = "audiobook_bookmarks";
/// Local writes not yet confirmed by the remote store.
pub const PENDING_KEY: &str = "audiobook_pending_remote";

/// Synchronous string-keyed storage of JSON documents.
///
/// Errors are returned so the local store can log them; nothing above the
/// local store ever sees them.
pub trait KeyValueStore: Send + Sync {
    /// Human-readable backend name (e.g., "redb", "memory").
    fn backend_name(&self) -> &str;

    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;
}
