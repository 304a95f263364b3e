//! Wire messages for the picture co-editing websocket protocol.
//!
//! DESIGN
//! ======
//! Every frame is JSON, tagged by `type`. Clients send edit-session
//! requests (`enterEdit` / `editAction` / `exitEdit`), the server answers
//! with broadcasts that carry a human-readable message and the public view
//! of the acting user. `editAction` is the only message kind with an
//! action payload, and the tag set is closed — an unrecognized tag fails
//! to parse and the frame is dropped at the transport layer, so handlers
//! only ever see well-formed messages.

use serde::{Deserialize, Serialize};

// =============================================================================
// CLIENT MESSAGES
// =============================================================================

/// Inbound message from a connected editor client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Request the edit lock for the connection's picture.
    EnterEdit,
    /// Relay one edit operation. Valid only from the current lock holder.
    EditAction { edit_action: EditAction },
    /// Give up the edit lock.
    ExitEdit,
}

/// The recognized edit operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EditAction {
    ZoomIn,
    ZoomOut,
    RotateLeft,
    RotateRight,
}

impl EditAction {
    /// Human-readable label used in broadcast messages.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::ZoomIn => "zoom in",
            Self::ZoomOut => "zoom out",
            Self::RotateLeft => "rotate left",
            Self::RotateRight => "rotate right",
        }
    }
}

// =============================================================================
// SERVER MESSAGES
// =============================================================================

/// Outbound broadcast to every session editing a picture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Session lifecycle notice (joined / left).
    Info { message: String, user: UserView },
    /// A user acquired the edit lock.
    EnterEdit { message: String, user: UserView },
    /// The lock holder performed an edit operation.
    EditAction {
        message: String,
        user: UserView,
        edit_action: EditAction,
    },
    /// The lock holder released the edit lock.
    ExitEdit { message: String, user: UserView },
}

/// Public projection of a user, embedded in every broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    #[serde(with = "id_string")]
    pub id: i64,
    pub name: String,
    pub avatar_url: Option<String>,
}

// =============================================================================
// ID ENCODING
// =============================================================================

/// i64 ids exceed JavaScript's 2^53 safe-integer range, so they cross the
/// wire as strings.
pub(crate) mod id_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(id: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(id)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Num(i64),
            Text(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Num(n) => Ok(n),
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
#[path = "message_test.rs"]
mod tests;
