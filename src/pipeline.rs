//! Event ingestion pipeline — bounded queues between transport and logic.
//!
//! DESIGN
//! ======
//! Connection tasks produce `EditEvent`s; a small fixed pool of worker
//! tasks consumes them, runs the message handlers, and fans out the
//! results. Events are sharded by picture id onto one bounded mpsc
//! channel per worker, so every event of one picture (and therefore of
//! one session) is processed in FIFO order by a single consumer, while
//! distinct pictures spread across the pool. No ordering is promised
//! across pictures.
//!
//! BACKPRESSURE
//! ============
//! Client messages enqueue with `try_send`: when a shard is full the
//! newest event is rejected, a counter increments, and the producer keeps
//! running — one hot picture cannot stall unrelated connections. The
//! rejection is returned to the caller and logged, never silent.
//! Lifecycle events (join/disconnect) instead wait for capacity, because
//! dropping one would leak a registry entry or a held lock.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::handlers;
use crate::message::ClientMessage;
use crate::rooms::Rooms;
use crate::services::session::SessionUser;

const DEFAULT_WORKERS: usize = 4;
const DEFAULT_QUEUE_CAPACITY: usize = 256;

// =============================================================================
// CONFIG
// =============================================================================

/// Worker-pool sizing, overridable through the environment.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Number of consumer tasks (one queue shard each).
    pub workers: usize,
    /// Bounded capacity of each shard.
    pub queue_capacity: usize,
}

impl PipelineConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            workers: env_parse("PIPELINE_WORKERS", DEFAULT_WORKERS).max(1),
            queue_capacity: env_parse("PIPELINE_QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY).max(1),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { workers: DEFAULT_WORKERS, queue_capacity: DEFAULT_QUEUE_CAPACITY }
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

// =============================================================================
// EVENTS
// =============================================================================

/// One queued unit of work. Immutable once enqueued.
#[derive(Debug, Clone)]
pub struct EditEvent {
    pub picture_id: i64,
    pub client_id: Uuid,
    pub user: SessionUser,
    pub kind: EventKind,
}

#[derive(Debug, Clone)]
pub enum EventKind {
    /// The session was registered; announce it to the room.
    Joined,
    /// A parsed client frame.
    Client(ClientMessage),
    /// The transport closed; run the implicit exit-edit and deregister.
    Disconnected,
}

// =============================================================================
// PIPELINE
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("event queue at capacity; event rejected")]
    QueueFull,
    #[error("event queue closed")]
    Closed,
}

/// Cloneable handle over the shard senders and the drop counter.
#[derive(Clone)]
pub struct Pipeline {
    shards: Arc<Vec<mpsc::Sender<EditEvent>>>,
    dropped: Arc<AtomicU64>,
}

impl Pipeline {
    /// Start the worker pool and return the producer handle.
    #[must_use]
    pub fn spawn(rooms: Arc<Rooms>, config: &PipelineConfig) -> Self {
        let mut shards = Vec::with_capacity(config.workers);
        for worker in 0..config.workers {
            let (tx, rx) = mpsc::channel(config.queue_capacity);
            tokio::spawn(run_worker(worker, rx, rooms.clone()));
            shards.push(tx);
        }
        info!(workers = config.workers, queue_capacity = config.queue_capacity, "pipeline started");
        Self { shards: Arc::new(shards), dropped: Arc::new(AtomicU64::new(0)) }
    }

    /// Enqueue a client message without blocking.
    ///
    /// # Errors
    ///
    /// `QueueFull` when the picture's shard is at capacity; the event is
    /// rejected (newest-loses) and counted. The caller's read loop is
    /// expected to carry on.
    pub fn submit(&self, event: EditEvent) -> Result<(), SubmitError> {
        match self.shard(event.picture_id).try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(event)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    picture_id = event.picture_id,
                    client_id = %event.client_id,
                    dropped_total = total,
                    "event queue full; rejecting newest event"
                );
                Err(SubmitError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => Err(SubmitError::Closed),
        }
    }

    /// Enqueue a lifecycle event, waiting for capacity if needed.
    ///
    /// Join and disconnect are exempt from the reject-newest policy:
    /// losing one would leak a registry entry or a held lock, and the
    /// producing task is about to suspend or exit anyway.
    pub async fn announce(&self, event: EditEvent) {
        if self.shard(event.picture_id).send(event).await.is_err() {
            error!("event queue closed; lifecycle event lost");
        }
    }

    /// Events rejected so far by the overflow policy.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn shard(&self, picture_id: i64) -> &mpsc::Sender<EditEvent> {
        // Same shard for every event of one picture: per-picture FIFO.
        let idx = picture_id.unsigned_abs() as usize % self.shards.len();
        &self.shards[idx]
    }
}

async fn run_worker(worker: usize, mut rx: mpsc::Receiver<EditEvent>, rooms: Arc<Rooms>) {
    while let Some(event) = rx.recv().await {
        let picture_id = event.picture_id;
        // A broken handler drops its event, never the worker or the shard.
        if AssertUnwindSafe(handlers::apply(&rooms, event)).catch_unwind().await.is_err() {
            error!(worker, picture_id, "handler panicked; event dropped");
        }
    }
}

// =============================================================================
// TEST SUPPORT
// =============================================================================

#[cfg(test)]
impl Pipeline {
    /// Shards without workers, so tests can hold queues at capacity. The
    /// receivers must stay alive for `try_send` to report `Full` rather
    /// than `Closed`.
    pub(crate) fn idle(shards: usize, capacity: usize) -> (Self, Vec<mpsc::Receiver<EditEvent>>) {
        let mut senders = Vec::with_capacity(shards);
        let mut receivers = Vec::with_capacity(shards);
        for _ in 0..shards {
            let (tx, rx) = mpsc::channel(capacity);
            senders.push(tx);
            receivers.push(rx);
        }
        let pipeline = Self { shards: Arc::new(senders), dropped: Arc::new(AtomicU64::new(0)) };
        (pipeline, receivers)
    }
}

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod tests;
