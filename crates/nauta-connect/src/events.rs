//! Typed events emitted by the session engine and the transport.
//!
//! The [`EventBus`] is a `tokio::sync::broadcast` channel carrying
//! [`PortalEvent`] values. Front ends subscribe and render; when nobody is
//! subscribed, events are dropped.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::FailureKind;

/// Default buffer capacity of an [`EventBus`].
const DEFAULT_CAPACITY: usize = 64;

/// Every event a portal session emits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PortalEvent {
    /// Progress message ("checking portal", "logging in", ...).
    Status { message: String },
    /// An operation failed; `kind` lets a front end branch on the cause.
    Error { kind: FailureKind, message: String },
    /// The session became connected or disconnected.
    ConnectionState { connected: bool },
    /// Remaining connection time reported by the portal.
    TimeRemaining { remaining: Duration },
    /// The transport is about to retry a request.
    Retry(RetryNotice),
}

/// Details of one scheduled retry. Informational only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryNotice {
    /// Status reason or error text of the failed attempt.
    pub message: String,
    /// HTTP status of the failed attempt, 0 when no response arrived.
    pub status_code: u16,
    /// Maximum retries the policy allows.
    pub total_retries: u32,
    /// Which retry this is, starting at 1.
    pub retry: u32,
    /// Backoff before the retry is sent.
    pub delay: Duration,
}

/// Broadcast channel shared by the engine and its transport.
///
/// Cloning yields another sender on the same channel.
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: broadcast::Sender<PortalEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers. Silently ignores if no subscribers.
    pub fn emit(&self, event: PortalEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<PortalEvent> {
        self.sender.subscribe()
    }
}

/// Take every event already buffered in `receiver` without waiting.
pub fn drain(receiver: &mut broadcast::Receiver<PortalEvent>) -> Vec<PortalEvent> {
    let mut events = Vec::new();
    loop {
        match receiver.try_recv() {
            Ok(event) => events.push(event),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event receiver lagged");
            }
            Err(_) => break,
        }
    }
    events
}
