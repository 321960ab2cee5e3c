//! Heartbeat emitter
//!
//! Publishes a per-product heartbeat on the heartbeat feed every interval so
//! subscribers can tell a quiet market from a dead connection.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;
use types::feed::{FeedEvent, HeartbeatEvent};
use types::ids::ProductId;
use types::now_nanos;

use crate::feeds::FeedType;
use crate::hub::BroadcastHub;

/// Per-product heartbeat sequences.
pub struct Heartbeat {
    hub: Arc<BroadcastHub>,
    sequences: BTreeMap<ProductId, u64>,
}

impl Heartbeat {
    pub fn new(hub: Arc<BroadcastHub>) -> Self {
        let sequences = hub.products().iter().map(|p| (p.clone(), 0)).collect();
        Self { hub, sequences }
    }

    /// Emit one heartbeat for every product. Returns total deliveries.
    pub fn beat(&mut self, time: i64) -> usize {
        let mut delivered = 0;
        for (product_id, sequence) in self.sequences.iter_mut() {
            *sequence += 1;
            let event = FeedEvent::Heartbeat(HeartbeatEvent {
                product_id: product_id.clone(),
                sequence: *sequence,
                time,
            });
            delivered += self
                .hub
                .broadcast(FeedType::Heartbeat, &event)
                .unwrap_or_default();
        }
        delivered
    }

    /// Beat every `interval` until shutdown is signalled.
    pub async fn run(mut self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.changed() => {
                    info!("Heartbeat received shutdown signal");
                    break;
                }

                _ = ticker.tick() => {
                    self.beat(now_nanos());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientConfig;
    use types::product::ProductRegistry;

    fn hub() -> Arc<BroadcastHub> {
        Arc::new(BroadcastHub::new(
            ProductRegistry::parse("BTC-USD,ETH-USD").unwrap(),
            ClientConfig::default(),
        ))
    }

    #[test]
    fn test_sequences_increase_per_product() {
        let hub = hub();
        let (client, mut rx) = hub.connect(None);
        hub.subscribe(&client, FeedType::Heartbeat, &[ProductId::new("ETH-USD")])
            .unwrap();

        let mut heartbeat = Heartbeat::new(hub.clone());
        assert_eq!(heartbeat.beat(1), 1);
        assert_eq!(heartbeat.beat(2), 1);

        for expected in 1..=2u64 {
            let message = rx.try_recv().unwrap();
            let json: serde_json::Value = serde_json::from_str(&message.payload).unwrap();
            assert_eq!(json["type"], "heartbeat");
            assert_eq!(json["product_id"], "ETH-USD");
            assert_eq!(json["sequence"], expected);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ticks_until_shutdown() {
        let hub = hub();
        let (client, mut rx) = hub.connect(None);
        hub.subscribe(&client, FeedType::Heartbeat, &[ProductId::new("BTC-USD")])
            .unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(
            Heartbeat::new(hub.clone()).run(Duration::from_secs(1), shutdown_rx),
        );

        // First tick fires immediately, then one per second
        tokio::time::sleep(Duration::from_millis(2500)).await;
        shutdown_tx.send(true).unwrap();
        task.await.unwrap();

        let mut beats = 0;
        while rx.try_recv().is_ok() {
            beats += 1;
        }
        assert_eq!(beats, 3);
    }
}
