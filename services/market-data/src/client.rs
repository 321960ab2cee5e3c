//! Per-client outbound queues and flow control
//!
//! Every connected subscriber gets a bounded outbound queue. The hub only
//! ever calls the non-blocking [`ClientHandle::deliver`], so a stalled
//! client cannot hold up delivery to anyone else. When a queue is full the
//! client's [`OverflowPolicy`] decides whether the message is dropped or the
//! client is asked to disconnect.
//!
//! The hub holds handles, never connections: the transport that created the
//! handle owns the lifecycle and reports the disconnect.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, warn};
use types::ids::UserId;

use crate::error::HubError;
use crate::feeds::FeedType;

/// Unique client identifier, assigned by the hub on connect.
pub type ClientId = u64;

/// What to do when a client's outbound queue overflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Drop the message for this client only.
    DropMessage,
    /// Ask the transport to disconnect the lagging client.
    Disconnect,
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop" | "drop_message" => Ok(OverflowPolicy::DropMessage),
            "disconnect" => Ok(OverflowPolicy::Disconnect),
            other => Err(format!("unknown overflow policy: {}", other)),
        }
    }
}

/// Queue settings applied to every new client.
#[derive(Debug, Clone, Copy)]
pub struct ClientConfig {
    /// Maximum queued messages per client.
    pub queue_capacity: usize,
    pub overflow_policy: OverflowPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            overflow_policy: OverflowPolicy::Disconnect,
        }
    }
}

/// A serialized message waiting to be written to a client.
///
/// The payload is shared: one broadcast encodes once and every subscriber
/// queue holds the same allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Feed the message was broadcast on; `None` for protocol replies.
    pub feed: Option<FeedType>,
    pub payload: Arc<str>,
}

impl OutboundMessage {
    pub fn feed(feed: FeedType, payload: Arc<str>) -> Self {
        Self {
            feed: Some(feed),
            payload,
        }
    }

    pub fn control(payload: impl Into<Arc<str>>) -> Self {
        Self {
            feed: None,
            payload: payload.into(),
        }
    }
}

/// Result of a delivery attempt that did not enqueue the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// Queue full, message dropped, client stays connected.
    Dropped,
    /// Queue full, client asked to disconnect.
    DisconnectRequested,
    /// The transport side of the queue is gone.
    Closed,
}

impl fmt::Display for DeliveryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryFailure::Dropped => write!(f, "queue full, message dropped"),
            DeliveryFailure::DisconnectRequested => write!(f, "queue full, disconnecting"),
            DeliveryFailure::Closed => write!(f, "connection closed"),
        }
    }
}

struct ClientInner {
    id: ClientId,
    user_id: Option<UserId>,
    tx: mpsc::Sender<OutboundMessage>,
    policy: OverflowPolicy,
    dropped: AtomicU64,
    disconnect_requested: AtomicBool,
    kick: Notify,
}

/// Non-owning, cheaply cloneable reference to one connected subscriber.
#[derive(Clone)]
pub struct ClientHandle {
    inner: Arc<ClientInner>,
}

impl ClientHandle {
    /// Create a handle and the receiving end of its outbound queue.
    pub fn new(
        id: ClientId,
        user_id: Option<UserId>,
        config: ClientConfig,
    ) -> (Self, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let handle = Self {
            inner: Arc::new(ClientInner {
                id,
                user_id,
                tx,
                policy: config.overflow_policy,
                dropped: AtomicU64::new(0),
                disconnect_requested: AtomicBool::new(false),
                kick: Notify::new(),
            }),
        };
        (handle, rx)
    }

    pub fn id(&self) -> ClientId {
        self.inner.id
    }

    /// Authenticated user behind this connection, if any.
    pub fn user_id(&self) -> Option<UserId> {
        self.inner.user_id
    }

    /// Enqueue without waiting.
    pub fn deliver(&self, message: OutboundMessage) -> Result<(), DeliveryFailure> {
        match self.inner.tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => match self.inner.policy {
                OverflowPolicy::DropMessage => {
                    let dropped = self.inner.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    debug!(client_id = self.id(), dropped, "Client queue full, message dropped");
                    Err(DeliveryFailure::Dropped)
                }
                OverflowPolicy::Disconnect => {
                    self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                    if self.request_disconnect() {
                        warn!(client_id = self.id(), "Backpressure: disconnecting lagging client");
                    }
                    Err(DeliveryFailure::DisconnectRequested)
                }
            },
            Err(mpsc::error::TrySendError::Closed(_)) => Err(DeliveryFailure::Closed),
        }
    }

    /// Same as [`deliver`](Self::deliver) with the failure expressed as a hub error.
    pub fn try_deliver(&self, message: OutboundMessage) -> Result<(), HubError> {
        self.deliver(message).map_err(|failure| HubError::Delivery {
            client_id: self.id(),
            reason: failure.to_string(),
        })
    }

    /// Ask the transport to close this connection.
    ///
    /// Returns true the first time it is called.
    pub fn request_disconnect(&self) -> bool {
        let first = !self.inner.disconnect_requested.swap(true, Ordering::AcqRel);
        if first {
            self.inner.kick.notify_one();
        }
        first
    }

    pub fn is_disconnect_requested(&self) -> bool {
        self.inner.disconnect_requested.load(Ordering::Acquire)
    }

    /// Resolves once a disconnect has been requested.
    pub async fn disconnect_requested(&self) {
        if self.is_disconnect_requested() {
            return;
        }
        self.inner.kick.notified().await;
    }

    /// Messages this client has lost to a full queue.
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle")
            .field("id", &self.inner.id)
            .field("user_id", &self.inner.user_id)
            .field("policy", &self.inner.policy)
            .finish()
    }
}
