//! Message handlers — the per-picture editing state machine.
//!
//! DESIGN
//! ======
//! Each picture is either unlocked or locked by one user. Handlers are
//! invoked by the pipeline workers, mutate the lock through `Rooms`, and
//! emit broadcasts; they never touch a transport directly. Because the
//! pipeline routes all events of one picture to one worker, handler
//! bodies for a given picture never interleave.
//!
//! Illegal transitions (enter-edit while locked, edit-action or exit-edit
//! from a non-holder) are silent no-ops toward the client: the protocol
//! sends no denial frame, state is observed through broadcasts only.

use tracing::{debug, info};

use crate::message::{ClientMessage, EditAction, ServerMessage};
use crate::pipeline::{EditEvent, EventKind};
use crate::rooms::Rooms;

/// Dispatch one queued event to its handler.
pub async fn apply(rooms: &Rooms, event: EditEvent) {
    match event.kind {
        EventKind::Joined => joined(rooms, &event).await,
        EventKind::Client(ClientMessage::EnterEdit) => enter_edit(rooms, &event).await,
        EventKind::Client(ClientMessage::EditAction { edit_action }) => {
            edit_action_msg(rooms, &event, edit_action).await;
        }
        EventKind::Client(ClientMessage::ExitEdit) => exit_edit(rooms, &event).await,
        EventKind::Disconnected => disconnected(rooms, &event).await,
    }
}

// =============================================================================
// LIFECYCLE
// =============================================================================

async fn joined(rooms: &Rooms, event: &EditEvent) {
    info!(
        client_id = %event.client_id,
        picture_id = event.picture_id,
        user_id = event.user.id,
        "session joined"
    );
    let message = ServerMessage::Info {
        message: format!("{} joined the editing session", event.user.name),
        user: event.user.view(),
    };
    rooms.broadcast(event.picture_id, &message, None).await;
}

/// Implicit exit-edit plus deregistration. Safe to run more than once for
/// the same client: the second pass releases nothing and removes nothing,
/// so nothing is broadcast.
async fn disconnected(rooms: &Rooms, event: &EditEvent) {
    if rooms.release_if_held_by(event.picture_id, event.user.id).await {
        let message = ServerMessage::ExitEdit {
            message: format!("{} stopped editing", event.user.name),
            user: event.user.view(),
        };
        rooms.broadcast(event.picture_id, &message, None).await;
    }

    if rooms.leave(event.picture_id, event.client_id).await {
        info!(
            client_id = %event.client_id,
            picture_id = event.picture_id,
            user_id = event.user.id,
            "session left"
        );
        let message = ServerMessage::Info {
            message: format!("{} left the editing session", event.user.name),
            user: event.user.view(),
        };
        rooms.broadcast(event.picture_id, &message, None).await;
    }
}

// =============================================================================
// EDIT SESSION
// =============================================================================

async fn enter_edit(rooms: &Rooms, event: &EditEvent) {
    if !rooms.try_acquire(event.picture_id, event.user.id).await {
        debug!(
            picture_id = event.picture_id,
            user_id = event.user.id,
            "enter-edit ignored; picture already locked"
        );
        return;
    }

    let message = ServerMessage::EnterEdit {
        message: format!("{} started editing", event.user.name),
        user: event.user.view(),
    };
    rooms.broadcast(event.picture_id, &message, None).await;
}

/// Relay an edit operation from the lock holder to everyone else. The
/// sender already applied the action locally and is excluded to avoid
/// double-applying it.
async fn edit_action_msg(rooms: &Rooms, event: &EditEvent, action: EditAction) {
    if rooms.holder(event.picture_id).await != Some(event.user.id) {
        debug!(
            picture_id = event.picture_id,
            user_id = event.user.id,
            "edit-action from non-holder ignored"
        );
        return;
    }

    let message = ServerMessage::EditAction {
        message: format!("{} applied {}", event.user.name, action.label()),
        user: event.user.view(),
        edit_action: action,
    };
    rooms.broadcast(event.picture_id, &message, Some(event.client_id)).await;
}

async fn exit_edit(rooms: &Rooms, event: &EditEvent) {
    if !rooms.release_if_held_by(event.picture_id, event.user.id).await {
        debug!(
            picture_id = event.picture_id,
            user_id = event.user.id,
            "exit-edit from non-holder ignored"
        );
        return;
    }

    let message = ServerMessage::ExitEdit {
        message: format!("{} stopped editing", event.user.name),
        user: event.user.view(),
    };
    rooms.broadcast(event.picture_id, &message, None).await;
}

#[cfg(test)]
#[path = "handlers_test.rs"]
mod tests;
