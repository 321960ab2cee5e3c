//! Request correlator
//!
//! Bridges a synchronous caller to the asynchronous matching engine. Each
//! submitted order gets a `PendingRequest` keyed by its `OrderId`; the entry
//! is resolved exactly once by whichever happens first:
//!
//! - a confirmation with the same id arrives on the bus,
//! - the deadline passes (caller-side timer or the background reaper),
//! - the caller cancels (explicitly or by dropping its `PendingConfirmation`).
//!
//! Every resolution path claims the entry with an atomic remove on the
//! pending table, so at most one of them can win. Late or duplicate
//! confirmations find nothing to claim and are dropped.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bus::{topics, BusProducer};
use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use types::ids::OrderId;
use types::order::{Order, OrderConfirmation};

use crate::error::CorrelatorError;

/// Longest deadline a submit can ask for; larger timeouts are clamped.
pub const MAX_ORDER_TIMEOUT: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Terminal result delivered to a waiting caller.
pub type ConfirmationResult = Result<OrderConfirmation, CorrelatorError>;

/// Configuration for the correlator.
#[derive(Debug, Clone)]
pub struct CorrelatorConfig {
    /// Topic order requests are produced to.
    pub request_topic: String,
    /// Deadline applied by [`Correlator::submit`].
    pub default_timeout: Duration,
    /// How often the reaper sweeps abandoned entries.
    pub reaper_interval: Duration,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            request_topic: topics::ORDER_REQUEST.to_string(),
            default_timeout: Duration::from_secs(5),
            reaper_interval: Duration::from_secs(1),
        }
    }
}

/// Counters for every terminal outcome and dropped message.
#[derive(Debug, Default)]
pub struct CorrelatorMetrics {
    pub submitted: AtomicU64,
    pub submission_failed: AtomicU64,
    pub confirmed: AtomicU64,
    pub timed_out: AtomicU64,
    pub cancelled: AtomicU64,
    pub unknown_dropped: AtomicU64,
    pub decode_failed: AtomicU64,
}

impl CorrelatorMetrics {
    /// Export metrics as a BTreeMap for Prometheus-style exposition.
    pub fn export(&self) -> BTreeMap<String, u64> {
        let mut m = BTreeMap::new();
        m.insert("submitted".to_string(), self.submitted.load(Ordering::Relaxed));
        m.insert(
            "submission_failed".to_string(),
            self.submission_failed.load(Ordering::Relaxed),
        );
        m.insert("confirmed".to_string(), self.confirmed.load(Ordering::Relaxed));
        m.insert("timed_out".to_string(), self.timed_out.load(Ordering::Relaxed));
        m.insert("cancelled".to_string(), self.cancelled.load(Ordering::Relaxed));
        m.insert(
            "unknown_dropped".to_string(),
            self.unknown_dropped.load(Ordering::Relaxed),
        );
        m.insert(
            "decode_failed".to_string(),
            self.decode_failed.load(Ordering::Relaxed),
        );
        m
    }

    /// Requests that reached a terminal state (confirmed, timed out or cancelled).
    pub fn resolved(&self) -> u64 {
        self.confirmed.load(Ordering::Relaxed)
            + self.timed_out.load(Ordering::Relaxed)
            + self.cancelled.load(Ordering::Relaxed)
    }
}

/// In-flight order awaiting its confirmation.
struct PendingRequest {
    tx: oneshot::Sender<ConfirmationResult>,
    deadline: Instant,
}

type PendingTable = DashMap<OrderId, PendingRequest>;

/// Maps outbound orders to future confirmations.
pub struct Correlator {
    pending: Arc<PendingTable>,
    producer: Arc<dyn BusProducer>,
    config: CorrelatorConfig,
    metrics: Arc<CorrelatorMetrics>,
}

impl Correlator {
    pub fn new(producer: Arc<dyn BusProducer>, config: CorrelatorConfig) -> Self {
        info!(
            request_topic = %config.request_topic,
            default_timeout_ms = config.default_timeout.as_millis() as u64,
            "Correlator initialized"
        );

        Self {
            pending: Arc::new(DashMap::new()),
            producer,
            config,
            metrics: Arc::new(CorrelatorMetrics::default()),
        }
    }

    /// Submit an order with the configured default deadline.
    pub async fn submit(&self, order: &Order) -> Result<PendingConfirmation, CorrelatorError> {
        self.submit_with_timeout(order, self.config.default_timeout)
            .await
    }

    /// Register the order as pending, then hand it to the bus.
    ///
    /// The entry exists before the bus sees the order, so even an immediate
    /// confirmation finds it. If the bus rejects the order the entry is
    /// removed again and the caller gets `Submission` right away.
    pub async fn submit_with_timeout(
        &self,
        order: &Order,
        timeout: Duration,
    ) -> Result<PendingConfirmation, CorrelatorError> {
        let order_id = order.order_id();
        let payload =
            serde_json::to_vec(order).map_err(|e| CorrelatorError::Encode(e.to_string()))?;

        let timeout = timeout.min(MAX_ORDER_TIMEOUT);
        let deadline = Instant::now() + timeout;
        let (tx, rx) = oneshot::channel();
        {
            match self.pending.entry(order_id) {
                Entry::Occupied(_) => return Err(CorrelatorError::DuplicateOrder(order_id)),
                Entry::Vacant(slot) => {
                    slot.insert(PendingRequest { tx, deadline });
                }
            }
        }

        if let Err(err) = self
            .producer
            .produce(
                &self.config.request_topic,
                &order_id.to_string(),
                Bytes::from(payload),
            )
            .await
        {
            self.pending.remove(&order_id);
            self.metrics.submission_failed.fetch_add(1, Ordering::Relaxed);
            warn!(order_id = %order_id, error = %err, "Order submission failed");
            return Err(CorrelatorError::Submission(err));
        }

        self.metrics.submitted.fetch_add(1, Ordering::Relaxed);
        debug!(
            order_id = %order_id,
            product_id = %order.product_id(),
            timeout_ms = timeout.as_millis() as u64,
            "Order submitted"
        );

        Ok(PendingConfirmation {
            order_id,
            deadline,
            rx,
            pending: Arc::clone(&self.pending),
            metrics: Arc::clone(&self.metrics),
            settled: false,
        })
    }

    /// Handle one raw confirmation from the bus.
    ///
    /// Never fails the caller: malformed payloads and confirmations with no
    /// pending request are logged and dropped. The returned error only tells
    /// the consumer what happened.
    pub fn on_confirmation(&self, raw: &[u8]) -> Result<OrderId, CorrelatorError> {
        let confirmation: OrderConfirmation = match serde_json::from_slice(raw) {
            Ok(conf) => conf,
            Err(e) => {
                self.metrics.decode_failed.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, bytes = raw.len(), "Dropping malformed confirmation");
                return Err(CorrelatorError::Decode(e.to_string()));
            }
        };

        let order_id = confirmation.order_id;
        let Some((_, request)) = self.pending.remove(&order_id) else {
            self.metrics.unknown_dropped.fetch_add(1, Ordering::Relaxed);
            debug!(order_id = %order_id, "Dropping confirmation with no pending request");
            return Err(CorrelatorError::UnknownCorrelation(order_id));
        };

        self.metrics.confirmed.fetch_add(1, Ordering::Relaxed);
        if request.tx.send(Ok(confirmation)).is_err() {
            debug!(order_id = %order_id, "Caller went away before confirmation arrived");
        } else {
            debug!(order_id = %order_id, "Confirmation delivered");
        }
        Ok(order_id)
    }

    /// Cancel a pending request. Returns false if it was already resolved.
    pub fn cancel(&self, order_id: &OrderId) -> bool {
        cancel_entry(&self.pending, &self.metrics, order_id)
    }

    /// Resolve every entry past its deadline with `Timeout`.
    pub fn reap_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<OrderId> = self
            .pending
            .iter()
            .filter(|entry| entry.deadline <= now)
            .map(|entry| *entry.key())
            .collect();

        let mut reaped = 0;
        for order_id in expired {
            if let Some((_, request)) = self
                .pending
                .remove_if(&order_id, |_, request| request.deadline <= now)
            {
                self.metrics.timed_out.fetch_add(1, Ordering::Relaxed);
                let _ = request.tx.send(Err(CorrelatorError::Timeout(order_id)));
                reaped += 1;
            }
        }

        if reaped > 0 {
            info!(reaped, "Reaped expired pending requests");
        }
        reaped
    }

    /// Run the reaper until shutdown is signalled.
    pub async fn run_reaper(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.reaper_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.changed() => {
                    info!("Reaper received shutdown signal");
                    break;
                }

                _ = ticker.tick() => {
                    self.reap_expired();
                }
            }
        }
    }

    /// Whether a request for this order is still pending.
    pub fn is_pending(&self, order_id: &OrderId) -> bool {
        self.pending.contains_key(order_id)
    }

    /// Number of pending requests.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn metrics(&self) -> &CorrelatorMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &CorrelatorConfig {
        &self.config
    }
}

fn cancel_entry(pending: &PendingTable, metrics: &CorrelatorMetrics, order_id: &OrderId) -> bool {
    if pending.remove(order_id).is_some() {
        metrics.cancelled.fetch_add(1, Ordering::Relaxed);
        debug!(order_id = %order_id, "Pending request cancelled");
        true
    } else {
        false
    }
}

/// Caller's handle on a submitted order.
///
/// Await it with [`PendingConfirmation::wait`]. Dropping it before it
/// resolves cancels the pending request.
pub struct PendingConfirmation {
    order_id: OrderId,
    deadline: Instant,
    rx: oneshot::Receiver<ConfirmationResult>,
    pending: Arc<PendingTable>,
    metrics: Arc<CorrelatorMetrics>,
    settled: bool,
}

impl PendingConfirmation {
    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Wait for the confirmation, the deadline or a cancellation.
    pub async fn wait(mut self) -> ConfirmationResult {
        let order_id = self.order_id;
        let result = match tokio::time::timeout_at(self.deadline, &mut self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CorrelatorError::Cancelled(order_id)),
            Err(_) => {
                if self.pending.remove(&order_id).is_some() {
                    self.metrics.timed_out.fetch_add(1, Ordering::Relaxed);
                    debug!(order_id = %order_id, "Pending request timed out");
                    Err(CorrelatorError::Timeout(order_id))
                } else {
                    // Another path claimed the entry first; its result is on the way.
                    match (&mut self.rx).await {
                        Ok(result) => result,
                        Err(_) => Err(CorrelatorError::Cancelled(order_id)),
                    }
                }
            }
        };

        self.settled = true;
        result
    }
}

impl Drop for PendingConfirmation {
    fn drop(&mut self) {
        if !self.settled {
            cancel_entry(&self.pending, &self.metrics, &self.order_id);
        }
    }
}
