use super::*;
use axum::extract::ws::Utf8Bytes;
use tokio::time::{Duration, timeout};

use crate::message::{EditAction, ServerMessage};
use crate::rooms::SessionHandle;
use crate::state::test_helpers::test_user;

fn event(picture_id: i64, client_id: Uuid, user_id: i64, kind: EventKind) -> EditEvent {
    EditEvent { picture_id, client_id, user: test_user(user_id, &format!("user-{user_id}")), kind }
}

async fn join(rooms: &Rooms, picture_id: i64, user_id: i64) -> (Uuid, mpsc::Receiver<Utf8Bytes>) {
    let client_id = Uuid::new_v4();
    let (tx, rx) = mpsc::channel(64);
    rooms.join(picture_id, SessionHandle { client_id, user_id, tx }).await;
    (client_id, rx)
}

async fn recv_msg(rx: &mut mpsc::Receiver<Utf8Bytes>) -> ServerMessage {
    let text = timeout(Duration::from_millis(500), rx.recv())
        .await
        .expect("broadcast receive timed out")
        .expect("channel closed");
    serde_json::from_str(text.as_str()).expect("parse broadcast")
}

// =============================================================================
// ORDERING
// =============================================================================

#[tokio::test]
async fn per_session_order_preserved_under_cross_picture_load() {
    let rooms = Arc::new(Rooms::new());
    let pipeline = Pipeline::spawn(rooms.clone(), &PipelineConfig { workers: 2, queue_capacity: 128 });

    // Pictures 1 and 2 hash to different shards with two workers.
    let (sender, _sender_rx) = join(&rooms, 1, 1).await;
    let (_, mut peer_rx) = join(&rooms, 1, 2).await;
    let (noise, _noise_rx) = join(&rooms, 2, 3).await;

    // Saturate the other shard with no-op events.
    for _ in 0..32 {
        pipeline
            .submit(event(2, noise, 3, EventKind::Client(ClientMessage::ExitEdit)))
            .expect("noise submit");
    }

    let sequence = [
        EventKind::Client(ClientMessage::EnterEdit),
        EventKind::Client(ClientMessage::EditAction { edit_action: EditAction::RotateLeft }),
        EventKind::Client(ClientMessage::EditAction { edit_action: EditAction::RotateRight }),
        EventKind::Client(ClientMessage::ExitEdit),
    ];
    for kind in sequence {
        pipeline.submit(event(1, sender, 1, kind)).expect("submit");
    }

    // The peer observes the sender's session in submission order.
    assert!(matches!(recv_msg(&mut peer_rx).await, ServerMessage::EnterEdit { .. }));
    match recv_msg(&mut peer_rx).await {
        ServerMessage::EditAction { edit_action, .. } => assert_eq!(edit_action, EditAction::RotateLeft),
        other => panic!("expected editAction, got {other:?}"),
    }
    match recv_msg(&mut peer_rx).await {
        ServerMessage::EditAction { edit_action, .. } => assert_eq!(edit_action, EditAction::RotateRight),
        other => panic!("expected editAction, got {other:?}"),
    }
    assert!(matches!(recv_msg(&mut peer_rx).await, ServerMessage::ExitEdit { .. }));
}

#[tokio::test]
async fn worker_processes_events_for_unknown_rooms_without_stalling() {
    let rooms = Arc::new(Rooms::new());
    let pipeline = Pipeline::spawn(rooms.clone(), &PipelineConfig { workers: 1, queue_capacity: 16 });

    // No sessions exist for picture 5; the handler is a no-op.
    let stray = Uuid::new_v4();
    pipeline
        .submit(event(5, stray, 9, EventKind::Client(ClientMessage::EnterEdit)))
        .expect("submit");

    // The same worker must still process later events.
    let (joiner, mut rx) = join(&rooms, 5, 1).await;
    pipeline.announce(event(5, joiner, 1, EventKind::Joined)).await;

    assert!(matches!(recv_msg(&mut rx).await, ServerMessage::Info { .. }));
    assert_eq!(rooms.holder(5).await, None, "stray enter-edit must not take the lock");
}

// =============================================================================
// OVERFLOW
// =============================================================================

#[tokio::test]
async fn overflow_rejects_newest_and_counts() {
    let (pipeline, mut shards) = Pipeline::idle(1, 2);
    let client = Uuid::new_v4();

    let fill = || event(1, client, 1, EventKind::Client(ClientMessage::EnterEdit));
    pipeline.submit(fill()).expect("first fits");
    pipeline.submit(fill()).expect("second fits");

    let rejected = pipeline.submit(fill());
    assert!(matches!(rejected, Err(SubmitError::QueueFull)));
    assert_eq!(pipeline.dropped_events(), 1);

    // Freeing one slot lets the producer submit again.
    shards[0].try_recv().expect("queued event available");
    pipeline.submit(fill()).expect("capacity freed");
    assert_eq!(pipeline.dropped_events(), 1);
}

#[tokio::test]
async fn overflow_on_one_shard_leaves_others_usable() {
    let (pipeline, _shards) = Pipeline::idle(2, 1);
    let client = Uuid::new_v4();

    // Picture 2 maps to shard 0, picture 1 to shard 1.
    pipeline
        .submit(event(2, client, 1, EventKind::Client(ClientMessage::EnterEdit)))
        .expect("fills shard 0");
    let rejected = pipeline.submit(event(2, client, 1, EventKind::Client(ClientMessage::ExitEdit)));
    assert!(matches!(rejected, Err(SubmitError::QueueFull)));

    pipeline
        .submit(event(1, client, 1, EventKind::Client(ClientMessage::EnterEdit)))
        .expect("other shard unaffected");
}

#[tokio::test]
async fn announce_waits_for_capacity_instead_of_dropping() {
    let (pipeline, mut shards) = Pipeline::idle(1, 1);
    let client = Uuid::new_v4();

    pipeline
        .submit(event(1, client, 1, EventKind::Client(ClientMessage::EnterEdit)))
        .expect("fills the shard");

    // The lifecycle announce parks until the queued event is drained.
    let announced = tokio::spawn({
        let pipeline = pipeline.clone();
        async move { pipeline.announce(event(1, client, 1, EventKind::Disconnected)).await }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!announced.is_finished(), "announce must wait, not drop");

    shards[0].recv().await.expect("drain queued event");
    timeout(Duration::from_millis(200), announced)
        .await
        .expect("announce completed after capacity freed")
        .expect("announce task panicked");
    assert_eq!(pipeline.dropped_events(), 0, "lifecycle events are never counted as drops");
}
