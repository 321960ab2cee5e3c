//! NATS-backed bus.
//!
//! Records are published on subject `{topic}.{key}`; consumers subscribe to
//! `{topic}.>` and recover the key from the subject suffix.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tracing::info;

use crate::{BusConsumer, BusError, BusProducer, BusRecord, RecordStream};

/// Wrapper around a connected NATS client.
#[derive(Clone)]
pub struct NatsBus {
    client: async_nats::Client,
}

impl NatsBus {
    /// Connect to a NATS server.
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        info!("Connecting to NATS at {}", url);
        let client = async_nats::connect(url)
            .await
            .map_err(|e| BusError::Unavailable(e.to_string()))?;
        Ok(Self { client })
    }
}

/// Subject used for a record with the given key.
pub fn subject_for(topic: &str, key: &str) -> String {
    format!("{}.{}", topic, key)
}

/// Key carried by a subject published on `topic`, if it belongs to it.
pub fn key_from_subject<'a>(topic: &str, subject: &'a str) -> Option<&'a str> {
    subject
        .strip_prefix(topic)
        .and_then(|rest| rest.strip_prefix('.'))
        .filter(|key| !key.is_empty())
}

#[async_trait]
impl BusProducer for NatsBus {
    async fn produce(&self, topic: &str, key: &str, payload: Bytes) -> Result<(), BusError> {
        self.client
            .publish(subject_for(topic, key), payload)
            .await
            .map_err(|e| BusError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl BusConsumer for NatsBus {
    async fn consume(&self, topic: &str) -> Result<RecordStream, BusError> {
        let pattern = format!("{}.>", topic);
        info!("Subscribing to subject pattern: {}", pattern);

        let subscriber = self
            .client
            .subscribe(pattern)
            .await
            .map_err(|e| BusError::Subscribe {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;

        let topic = topic.to_string();
        let stream = subscriber.map(move |msg| {
            let subject = msg.subject.to_string();
            let key = key_from_subject(&topic, &subject).unwrap_or_default().to_string();
            BusRecord {
                topic: topic.clone(),
                key,
                payload: msg.payload,
            }
        });
        Ok(stream.boxed())
    }
}
