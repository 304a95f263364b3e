//! WebSocket endpoint — handshake gate and connection loop.
//!
//! DESIGN
//! ======
//! Authorization runs once, before the upgrade: picture id, session
//! token, picture existence, container checks, and the edit-capability
//! predicate, in that order. Any failure refuses the upgrade and nothing
//! is registered.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → register the session handle, announce the join
//! 2. `select!` loop: inbound frames → parse → pipeline; outbound
//!    channel → socket
//! 3. Close or transport error → announce the disconnect exactly once
//!
//! The connection task never runs business logic itself — every parsed
//! frame goes through the pipeline so a session's events are handled in
//! the order they arrived.

use std::collections::HashMap;

use axum::extract::ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::message::ClientMessage;
use crate::pipeline::{EditEvent, EventKind};
use crate::rooms::SessionHandle;
use crate::services::picture::{self, SPACE_TYPE_TEAM};
use crate::services::session::{self, SessionUser};
use crate::services::access;
use crate::state::AppState;

/// Outbound frames buffered per connection before broadcasts start
/// dropping for that client.
const OUTBOUND_BUFFER: usize = 256;

// =============================================================================
// HANDSHAKE ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("missing or malformed pictureId")]
    BadPictureId,
    #[error("missing token")]
    MissingToken,
    #[error("invalid or expired session token")]
    Unauthenticated,
    #[error("picture not found: {0}")]
    PictureNotFound(i64),
    #[error("space not found: {0}")]
    SpaceNotFound(i64),
    #[error("space {0} does not support collaborative editing")]
    NotCollaborative(i64),
    #[error("user {user_id} may not edit picture {picture_id}")]
    Forbidden { user_id: i64, picture_id: i64 },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl HandshakeError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadPictureId => StatusCode::BAD_REQUEST,
            Self::MissingToken | Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::PictureNotFound(_) | Self::SpaceNotFound(_) => StatusCode::NOT_FOUND,
            Self::NotCollaborative(_) | Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    match authorize(&state, &params).await {
        Ok((user, picture_id)) => ws.on_upgrade(move |socket| run_ws(socket, state, picture_id, user)),
        Err(e) => {
            warn!(error = %e, "ws: handshake rejected");
            (e.status(), e.to_string()).into_response()
        }
    }
}

/// The authorization gate. Checks run in a fixed order and short-circuit;
/// no session state exists until every check passes.
async fn authorize(
    state: &AppState,
    params: &HashMap<String, String>,
) -> Result<(SessionUser, i64), HandshakeError> {
    let picture_id: i64 = params
        .get("pictureId")
        .ok_or(HandshakeError::BadPictureId)?
        .parse()
        .map_err(|_| HandshakeError::BadPictureId)?;

    let token = params.get("token").ok_or(HandshakeError::MissingToken)?;
    let user = session::validate_session(&state.pool, token)
        .await?
        .ok_or(HandshakeError::Unauthenticated)?;

    let picture = picture::get_picture(&state.pool, picture_id)
        .await?
        .ok_or(HandshakeError::PictureNotFound(picture_id))?;

    let space = match picture.space_id {
        Some(space_id) => {
            let space = picture::get_space(&state.pool, space_id)
                .await?
                .ok_or(HandshakeError::SpaceNotFound(space_id))?;
            if space.space_type != SPACE_TYPE_TEAM {
                return Err(HandshakeError::NotCollaborative(space_id));
            }
            Some(space)
        }
        None => None,
    };

    if !access::can_edit(&state.pool, &user, &picture, space.as_ref()).await? {
        return Err(HandshakeError::Forbidden { user_id: user.id, picture_id });
    }

    Ok((user, picture_id))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, picture_id: i64, user: SessionUser) {
    let client_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::channel::<Utf8Bytes>(OUTBOUND_BUFFER);

    state
        .rooms
        .join(picture_id, SessionHandle { client_id, user_id: user.id, tx })
        .await;
    state
        .pipeline
        .announce(event(picture_id, client_id, &user, EventKind::Joined))
        .await;
    info!(%client_id, user_id = user.id, picture_id, "ws: client connected");

    loop {
        tokio::select! {
            inbound = socket.recv() => {
                let Some(Ok(msg)) = inbound else { break };
                match msg {
                    Message::Text(text) => {
                        let parsed: ClientMessage = match serde_json::from_str(text.as_str()) {
                            Ok(parsed) => parsed,
                            Err(e) => {
                                warn!(%client_id, error = %e, "ws: malformed frame dropped");
                                continue;
                            }
                        };
                        if let Err(e) =
                            state.pipeline.submit(event(picture_id, client_id, &user, EventKind::Client(parsed)))
                        {
                            warn!(%client_id, error = %e, "ws: inbound event rejected");
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            outbound = rx.recv() => {
                let Some(text) = outbound else { break };
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        }
    }

    // The single exit point of the loop: the implicit exit-edit and the
    // registry removal ride the pipeline behind this session's still
    // queued events.
    state
        .pipeline
        .announce(event(picture_id, client_id, &user, EventKind::Disconnected))
        .await;
    info!(%client_id, picture_id, "ws: client disconnected");
}

fn event(picture_id: i64, client_id: Uuid, user: &SessionUser, kind: EventKind) -> EditEvent {
    EditEvent { picture_id, client_id, user: user.clone(), kind }
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
