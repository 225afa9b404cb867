#![forbid(unsafe_code)]
#![warn(
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]

//! Transfer lifecycle event bus.
//!
//! Events carry sequential identifiers and a bounded replay ring so late subscribers can catch up
//! on a transfer that is already in flight. Internally it uses `tokio::broadcast`; when a
//! subscriber lags, the oldest events are dropped for that subscriber rather than blocking the
//! publisher.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, Receiver, Sender};

/// Identifier assigned to each published event.
pub type EventId = u64;

const DEFAULT_REPLAY_CAPACITY: usize = 512;

/// Lifecycle milestones of a single transfer attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransferEvent {
    /// The facade accepted a request and began provisioning.
    TransferStarted {
        /// Request identifier.
        request_id: String,
        /// Enclosing process identifier.
        process_id: String,
    },
    /// Secret, linked service and dataset exist for one side of the copy.
    EndpointProvisioned {
        /// Request identifier.
        request_id: String,
        /// `source` or `destination`.
        role: String,
        /// Dataset descriptor name.
        dataset: String,
    },
    /// The pipeline was created and a run triggered.
    PipelineSubmitted {
        /// Request identifier.
        request_id: String,
        /// Pipeline name.
        pipeline: String,
        /// Run identifier returned by the service.
        run_id: String,
    },
    /// One status query returned.
    RunStatusObserved {
        /// Request identifier.
        request_id: String,
        /// Run identifier.
        run_id: String,
        /// Raw status string.
        status: String,
    },
    /// The attempt produced an outcome.
    TransferCompleted {
        /// Request identifier.
        request_id: String,
        /// Whether the copy succeeded.
        succeeded: bool,
        /// Whether the caller may retry.
        retryable: bool,
        /// Service-reported message, if any.
        message: Option<String>,
    },
    /// The attempt ended with an error rather than an outcome.
    TransferFailed {
        /// Request identifier.
        request_id: String,
        /// Error description.
        message: String,
    },
    /// Compensating cleanup finished.
    CleanupCompleted {
        /// Request identifier.
        request_id: String,
        /// Resources deleted.
        removed: usize,
        /// Deletions that failed and were skipped.
        failed: usize,
    },
}

impl TransferEvent {
    /// Machine-friendly discriminator.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::TransferStarted { .. } => "transfer_started",
            Self::EndpointProvisioned { .. } => "endpoint_provisioned",
            Self::PipelineSubmitted { .. } => "pipeline_submitted",
            Self::RunStatusObserved { .. } => "run_status_observed",
            Self::TransferCompleted { .. } => "transfer_completed",
            Self::TransferFailed { .. } => "transfer_failed",
            Self::CleanupCompleted { .. } => "cleanup_completed",
        }
    }

    /// Request the event belongs to.
    #[must_use]
    pub fn request_id(&self) -> &str {
        match self {
            Self::TransferStarted { request_id, .. }
            | Self::EndpointProvisioned { request_id, .. }
            | Self::PipelineSubmitted { request_id, .. }
            | Self::RunStatusObserved { request_id, .. }
            | Self::TransferCompleted { request_id, .. }
            | Self::TransferFailed { request_id, .. }
            | Self::CleanupCompleted { request_id, .. } => request_id,
        }
    }
}

/// Event plus its identifier and emission time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    /// Sequential identifier.
    pub id: EventId,
    /// Emission timestamp.
    pub timestamp: DateTime<Utc>,
    /// Payload.
    pub event: TransferEvent,
}

/// Shared event bus built on top of `tokio::broadcast`.
#[derive(Clone)]
pub struct EventBus {
    sender: Sender<EventEnvelope>,
    buffer: Arc<Mutex<VecDeque<EventEnvelope>>>,
    next_id: Arc<AtomicU64>,
    replay_capacity: usize,
}

impl EventBus {
    /// Construct a bus whose broadcast channel and replay ring share `capacity`.
    ///
    /// A zero capacity is raised to one.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            next_id: Arc::new(AtomicU64::new(1)),
            replay_capacity: capacity,
        }
    }

    /// Construct a bus with the default replay capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Publish an event, assigning it the next identifier. Never blocks on subscribers.
    pub fn publish(&self, event: TransferEvent) -> EventId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };

        {
            let mut buffer = self.ring();
            if buffer.len() == self.replay_capacity {
                buffer.pop_front();
            }
            buffer.push_back(envelope.clone());
        }

        // No receivers is not an error for the publisher.
        let _ = self.sender.send(envelope);
        id
    }

    /// Subscribe, replaying buffered events newer than `since_id` before live ones.
    #[must_use]
    pub fn subscribe(&self, since_id: Option<EventId>) -> EventStream {
        let backlog = since_id.map_or_else(VecDeque::new, |since| {
            self.ring()
                .iter()
                .filter(|item| item.id > since)
                .cloned()
                .collect()
        });
        EventStream {
            backlog,
            receiver: self.sender.subscribe(),
        }
    }

    /// Identifier of the most recently published event still in the ring.
    #[must_use]
    pub fn last_event_id(&self) -> Option<EventId> {
        self.ring().back().map(|event| event.id)
    }

    fn ring(&self) -> MutexGuard<'_, VecDeque<EventEnvelope>> {
        // The ring holds plain data; a panic mid-push leaves it usable.
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscriber handle yielding the replay backlog first, then live events.
pub struct EventStream {
    backlog: VecDeque<EventEnvelope>,
    receiver: Receiver<EventEnvelope>,
}

impl EventStream {
    /// Receive the next event; `None` once the bus is dropped.
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }

        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Receive an event if one is ready without waiting.
    pub fn try_next(&mut self) -> Option<EventEnvelope> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                Err(_) => return None,
            }
        }
    }
}
