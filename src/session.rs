//! Identity and connectivity, injected into storage instead of queried ad hoc.
//!
//! Every sign-in and sign-out bumps an identity epoch. Remote writes and sync
//! routines capture the epoch when they start and refuse to apply their
//! results once it has moved on.

use tokio::sync::watch;

/// An authenticated user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub email: String,
    /// Bearer token for the remote backend; `None` falls back to the anon key
    pub access_token: Option<String>,
}

impl User {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            access_token: None,
        }
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }
}

/// Point-in-time view of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub user: Option<User>,
    pub online: bool,
    pub epoch: u64,
}

/// Which store an operation should target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageMode {
    Local,
    Remote { user: User, epoch: u64 },
}

impl StorageMode {
    pub fn is_remote(&self) -> bool {
        matches!(self, StorageMode::Remote { .. })
    }
}

/// Mode Selector: remote only when signed in and online.
pub fn use_remote(authenticated: bool, online: bool) -> bool {
    authenticated && online
}

/// Shared session state. Cheap to read, changes broadcast to subscribers.
#[derive(Debug)]
pub struct Session {
    tx: watch::Sender<SessionSnapshot>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Session {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(SessionSnapshot {
            user: None,
            online,
            epoch: 0,
        });
        Self { tx }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.tx.subscribe()
    }

    pub fn current_user(&self) -> Option<User> {
        self.tx.borrow().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.tx.borrow().user.is_some()
    }

    pub fn is_online(&self) -> bool {
        self.tx.borrow().online
    }

    pub fn epoch(&self) -> u64 {
        self.tx.borrow().epoch
    }

    /// True while `epoch` still identifies the current identity.
    pub fn is_current(&self, epoch: u64) -> bool {
        self.epoch() == epoch
    }

    /// Replace the signed-in user. Returns the new epoch.
    pub fn sign_in(&self, user: User) -> u64 {
        tracing::info!("Signed in as {}", user.email);
        let mut epoch = 0;
        self.tx.send_modify(|s| {
            s.user = Some(user);
            s.epoch += 1;
            epoch = s.epoch;
        });
        epoch
    }

    /// Clear the signed-in user. Returns the new epoch.
    pub fn sign_out(&self) -> u64 {
        let mut epoch = 0;
        self.tx.send_modify(|s| {
            if let Some(user) = s.user.take() {
                tracing::info!("Signed out {}", user.email);
            }
            s.epoch += 1;
            epoch = s.epoch;
        });
        epoch
    }

    /// Update reachability. Returns the previous value.
    pub fn set_online(&self, online: bool) -> bool {
        let mut previous = online;
        self.tx.send_if_modified(|s| {
            previous = s.online;
            s.online = online;
            previous != online
        });
        if previous != online {
            tracing::debug!("Network is now {}", if online { "online" } else { "offline" });
        }
        previous
    }

    /// Decide the backend for the next operation.
    pub fn storage_mode(&self) -> StorageMode {
        let snapshot = self.tx.borrow();
        match &snapshot.user {
            Some(user) if use_remote(true, snapshot.online) => StorageMode::Remote {
                user: user.clone(),
                epoch: snapshot.epoch,
            },
            _ => StorageMode::Local,
        }
    }
}
