//! Room registry and edit-lock state.
//!
//! DESIGN
//! ======
//! A room is the live coordination state of one picture: the set of
//! connected sessions and the user currently holding the edit lock. Both
//! live in one `RoomState` under one `RwLock`, so lock arbitration and
//! membership changes for a picture are serialized by the same writer
//! section — `try_acquire` is the linearization point for the
//! single-editor rule, and a lock can never survive its holder's session.
//!
//! `Rooms` owns all synchronization internally; callers never lock. It is
//! constructed once at startup and shared by handle, and each test builds
//! its own instance.
//!
//! LIFECYCLE
//! =========
//! Rooms are created by the first `join` and pruned by the `leave` that
//! empties them. A room therefore exists iff it has at least one session,
//! which keeps the map bounded by the number of live connections.

use std::collections::HashMap;

use axum::extract::ws::Utf8Bytes;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::message::ServerMessage;

// =============================================================================
// TYPES
// =============================================================================

/// One live connection as the registry sees it.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    /// Process-local connection id.
    pub client_id: Uuid,
    /// The authenticated user behind the connection.
    pub user_id: i64,
    /// Outbound channel drained by the connection's transport task.
    pub tx: mpsc::Sender<Utf8Bytes>,
}

/// Live coordination state of one picture.
#[derive(Debug, Default)]
struct RoomState {
    /// Connected sessions keyed by client id.
    sessions: HashMap<Uuid, SessionHandle>,
    /// User currently holding the edit lock, if any.
    editor: Option<i64>,
}

/// Registry of all active rooms. Internally synchronized.
#[derive(Debug, Default)]
pub struct Rooms {
    inner: RwLock<HashMap<i64, RoomState>>,
}

// =============================================================================
// SESSION REGISTRY
// =============================================================================

impl Rooms {
    #[must_use]
    pub fn new() -> Self {
        Self { inner: RwLock::new(HashMap::new()) }
    }

    /// Register a session, creating the room if absent. Idempotent per
    /// client id.
    pub async fn join(&self, picture_id: i64, session: SessionHandle) {
        let mut rooms = self.inner.write().await;
        let room = rooms.entry(picture_id).or_default();
        room.sessions.insert(session.client_id, session);
    }

    /// Remove a session and prune the room once its last session is gone.
    /// Returns whether a session was actually removed, which makes a
    /// duplicate disconnect a no-op.
    pub async fn leave(&self, picture_id: i64, client_id: Uuid) -> bool {
        let mut rooms = self.inner.write().await;
        let Some(room) = rooms.get_mut(&picture_id) else {
            return false;
        };
        let removed = room.sessions.remove(&client_id).is_some();
        if room.sessions.is_empty() {
            rooms.remove(&picture_id);
            debug!(picture_id, "pruned empty room");
        }
        removed
    }

    /// Point-in-time member list for fan-out.
    pub async fn snapshot(&self, picture_id: i64) -> Vec<SessionHandle> {
        let rooms = self.inner.read().await;
        rooms
            .get(&picture_id)
            .map(|room| room.sessions.values().cloned().collect())
            .unwrap_or_default()
    }
}

// =============================================================================
// EDIT LOCK
// =============================================================================

impl Rooms {
    /// Record `user_id` as the picture's editor iff the room exists and no
    /// editor is set. Exactly one concurrent caller wins; everyone else
    /// observes `false`. Requiring a live room means a lock can only be
    /// taken while its holder has a registered session.
    pub async fn try_acquire(&self, picture_id: i64, user_id: i64) -> bool {
        let mut rooms = self.inner.write().await;
        match rooms.get_mut(&picture_id) {
            Some(room) if room.editor.is_none() => {
                room.editor = Some(user_id);
                true
            }
            _ => false,
        }
    }

    /// Clear the editor iff it currently equals `user_id`. A stale or
    /// non-holder caller cannot clobber a legitimate new holder. Serves
    /// both the explicit exit-edit path and the disconnect path.
    pub async fn release_if_held_by(&self, picture_id: i64, user_id: i64) -> bool {
        let mut rooms = self.inner.write().await;
        let Some(room) = rooms.get_mut(&picture_id) else {
            return false;
        };
        if room.editor == Some(user_id) {
            room.editor = None;
            true
        } else {
            false
        }
    }

    /// Current editor of the picture, if any.
    pub async fn holder(&self, picture_id: i64) -> Option<i64> {
        let rooms = self.inner.read().await;
        rooms.get(&picture_id).and_then(|room| room.editor)
    }
}

// =============================================================================
// FAN-OUT
// =============================================================================

impl Rooms {
    /// Broadcast a message to every session of a picture, optionally
    /// excluding one client (the actor, who already applied the change
    /// locally).
    ///
    /// The message is serialized once; each member gets a cheap clone of
    /// the same buffer. A full or closed per-connection channel skips that
    /// member and never aborts the rest of the fan-out.
    pub async fn broadcast(&self, picture_id: i64, message: &ServerMessage, exclude: Option<Uuid>) {
        let text = match serde_json::to_string(message) {
            Ok(text) => Utf8Bytes::from(text),
            Err(e) => {
                warn!(picture_id, error = %e, "broadcast serialization failed");
                return;
            }
        };

        for session in self.snapshot(picture_id).await {
            if exclude == Some(session.client_id) {
                continue;
            }
            match session.tx.try_send(text.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        picture_id,
                        client_id = %session.client_id,
                        "outbound queue full; dropping broadcast for slow client"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(
                        picture_id,
                        client_id = %session.client_id,
                        "client channel closed during fan-out"
                    );
                }
            }
        }
    }
}

// =============================================================================
// TEST SUPPORT
// =============================================================================

#[cfg(test)]
impl Rooms {
    /// Whether a room entry exists for the picture at all.
    pub(crate) async fn room_exists(&self, picture_id: i64) -> bool {
        self.inner.read().await.contains_key(&picture_id)
    }
}

#[cfg(test)]
#[path = "rooms_test.rs"]
mod tests;
