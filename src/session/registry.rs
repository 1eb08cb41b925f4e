//! In-memory registry of pairing sessions.
//!
//! Every pairing request creates one [`SessionEntry`] keyed by its generated
//! identifier. The entry owns the linked-device handle so that whoever
//! removes it (the failure path, the sweep) is responsible for closing it.
//!
//! # Lifecycle
//!
//! ```text
//!              insert()
//!                 │
//!                 ▼
//!            ┌─────────┐ mark_connected() ┌───────────┐
//!            │ pending │ ───────────────► │ connected │
//!            └────┬────┘                  └───────────┘
//!                 │ mark_failed()
//!                 ▼
//!            ┌─────────┐
//!            │ failed  │
//!            └─────────┘
//! ```
//!
//! `mark_failed()` only applies to pending sessions, so a connected session
//! is never downgraded.
//!
//! Entries are dropped by `remove()` or by `drain_expired()` once they are
//! older than the configured TTL, whatever their status. Whoever drops an
//! entry fires its `cancel` token so the task following the link stops.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::link::LinkedDevice;
use crate::phone::PhoneNumber;

// =============================================================================
// Types
// =============================================================================

/// Pairing progress of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Code issued, waiting for the device to come online
    Pending,

    /// Device linked and session string available
    Connected,

    /// The link closed before the device came online
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Connected => "connected",
            SessionStatus::Failed => "failed",
        }
    }
}

/// A live pairing session.
pub struct SessionEntry {
    /// Handle to the protocol client for this session
    pub device: Arc<dyn LinkedDevice>,

    /// Current status
    pub status: SessionStatus,

    /// Portable session string, set once connected
    pub session: Option<String>,

    /// Number the code was issued for
    pub phone: PhoneNumber,

    /// When the session was registered
    pub created_at: Instant,

    /// Directory holding this session's credential files
    pub auth_dir: PathBuf,

    /// Fired when the session is discarded
    pub cancel: CancellationToken,
}

impl SessionEntry {
    pub fn new(device: Arc<dyn LinkedDevice>, phone: PhoneNumber, auth_dir: PathBuf) -> Self {
        Self {
            device,
            status: SessionStatus::Pending,
            session: None,
            phone,
            created_at: Instant::now(),
            auth_dir,
            cancel: CancellationToken::new(),
        }
    }

    /// Age of the session at `now`.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }
}

/// Point-in-time view of a session, safe to hand out of the lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub session: Option<String>,
}

// =============================================================================
// SessionRegistry
// =============================================================================

/// Registry of live sessions indexed by session ID.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionEntry>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session. Returns false (and leaves the map untouched) if
    /// the ID is already taken.
    pub async fn insert(&self, session_id: impl Into<String>, entry: SessionEntry) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.entry(session_id.into()) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(entry);
                true
            }
        }
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }

    pub async fn snapshot(&self, session_id: &str) -> Option<SessionSnapshot> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|entry| SessionSnapshot {
                status: entry.status,
                session: entry.session.clone(),
            })
    }

    pub async fn auth_dir(&self, session_id: &str) -> Option<PathBuf> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|entry| entry.auth_dir.clone())
    }

    /// Record the session string and flip the session to `connected`.
    ///
    /// Returns false if the session no longer exists.
    pub async fn mark_connected(&self, session_id: &str, session: String) -> bool {
        match self.sessions.write().await.get_mut(session_id) {
            Some(entry) => {
                entry.status = SessionStatus::Connected;
                entry.session = Some(session);
                true
            }
            None => false,
        }
    }

    /// Flip the session to `failed` unless it is already connected.
    ///
    /// Returns true only if the status actually changed.
    pub async fn mark_failed(&self, session_id: &str) -> bool {
        match self.sessions.write().await.get_mut(session_id) {
            Some(entry) if entry.status == SessionStatus::Pending => {
                entry.status = SessionStatus::Failed;
                true
            }
            _ => false,
        }
    }

    pub async fn remove(&self, session_id: &str) -> Option<SessionEntry> {
        self.sessions.write().await.remove(session_id)
    }

    /// Remove and return every session strictly older than `ttl` at `now`.
    pub async fn drain_expired(&self, now: Instant, ttl: Duration) -> Vec<(String, SessionEntry)> {
        let mut sessions = self.sessions.write().await;

        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, entry)| entry.age(now) > ttl)
            .map(|(id, _)| id.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|id| sessions.remove(&id).map(|entry| (id, entry)))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
