//! Message bus adapter
//!
//! The matching engine sits behind a durable asynchronous bus. Services talk
//! to it through two small contracts:
//!
//! - [`BusProducer::produce`] hands an encoded payload to the bus for a topic,
//!   keyed so that all records with the same key stay in order.
//! - [`BusConsumer::consume`] returns a stream of records for a topic.
//!
//! Delivery is at-least-once: consumers must tolerate duplicates.
//!
//! Two implementations are provided: [`InMemoryBus`] for single-process
//! deployments and tests, and [`NatsBus`] backed by a NATS server.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;

pub mod memory;
pub mod nats;

pub use memory::InMemoryBus;
pub use nats::NatsBus;

/// Topic names shared by producers and consumers.
pub mod topics {
    /// Order requests from the gateway to the matching engine (key: order id)
    pub const ORDER_REQUEST: &str = "order.request";
    /// Order confirmations from the matching engine (key: order id)
    pub const ORDER_CONFIRMATION: &str = "order.conf";
    /// Trade and market-state events (key: product id)
    pub const MARKET_EVENTS: &str = "market.events";
}

/// One record read from the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusRecord {
    pub topic: String,
    pub key: String,
    pub payload: Bytes,
}

/// Errors surfaced by bus adapters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("bus unavailable: {0}")]
    Unavailable(String),

    #[error("bus backpressure on topic {topic}")]
    Backpressure { topic: String },

    #[error("subscription failed for topic {topic}: {reason}")]
    Subscribe { topic: String, reason: String },
}

/// Stream of records from one topic.
pub type RecordStream = BoxStream<'static, BusRecord>;

/// Outbound side of the bus.
#[async_trait]
pub trait BusProducer: Send + Sync {
    /// Send `payload` to `topic`. Ordering is preserved per `key`.
    async fn produce(&self, topic: &str, key: &str, payload: Bytes) -> Result<(), BusError>;
}

/// Inbound side of the bus.
#[async_trait]
pub trait BusConsumer: Send + Sync {
    /// Subscribe to `topic`. The stream ends when the bus shuts down.
    async fn consume(&self, topic: &str) -> Result<RecordStream, BusError>;
}
