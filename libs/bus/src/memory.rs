//! In-process bus
//!
//! Each `consume` call gets its own bounded queue; `produce` pushes a record
//! into every queue registered for the topic. A full queue is reported as
//! backpressure instead of blocking the producer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{BusConsumer, BusError, BusProducer, BusRecord, RecordStream};

/// Default queue depth per consumer.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Bus living entirely inside the current process.
pub struct InMemoryBus {
    subscribers: Mutex<HashMap<String, Vec<mpsc::Sender<BusRecord>>>>,
    online: AtomicBool,
    capacity: usize,
}

impl InMemoryBus {
    pub fn new(capacity: usize) -> Self {
        info!(capacity, "InMemoryBus initialized");
        Self {
            subscribers: Mutex::new(HashMap::new()),
            online: AtomicBool::new(true),
            capacity,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }

    /// Simulate losing (or regaining) the broker connection.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
        warn!(online, "InMemoryBus connectivity changed");
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Number of live consumers on a topic.
    pub fn consumer_count(&self, topic: &str) -> usize {
        let subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subscribers
            .get(topic)
            .map(|senders| senders.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[async_trait]
impl BusProducer for InMemoryBus {
    async fn produce(&self, topic: &str, key: &str, payload: Bytes) -> Result<(), BusError> {
        if !self.is_online() {
            return Err(BusError::Unavailable("in-memory bus is offline".to_string()));
        }

        let record = BusRecord {
            topic: topic.to_string(),
            key: key.to_string(),
            payload,
        };

        // Held across the sends so concurrent producers cannot interleave
        // records for one key differently per consumer.
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        let Some(senders) = subscribers.get_mut(topic) else {
            debug!(topic, key, "No consumers for topic, record dropped");
            return Ok(());
        };

        senders.retain(|tx| !tx.is_closed());

        // Every queue takes the record or none does
        let mut permits = Vec::with_capacity(senders.len());
        for tx in senders.iter() {
            match tx.try_reserve() {
                Ok(permit) => permits.push(permit),
                Err(mpsc::error::TrySendError::Full(())) => {
                    return Err(BusError::Backpressure {
                        topic: topic.to_string(),
                    });
                }
                Err(mpsc::error::TrySendError::Closed(())) => {
                    debug!(topic, "Consumer went away during produce");
                }
            }
        }
        for permit in permits {
            permit.send(record.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl BusConsumer for InMemoryBus {
    async fn consume(&self, topic: &str) -> Result<RecordStream, BusError> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(topic.to_string())
            .or_default()
            .push(tx);

        info!(topic, "InMemoryBus consumer registered");

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|record| (record, rx))
        });
        Ok(stream.boxed())
    }
}
