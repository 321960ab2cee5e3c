//! Channel broadcast hub
//!
//! Owns one [`Channel`] per feed type, all seeded from the same product
//! registry at construction. Routes each market event to the feeds that
//! publish it and tracks connected clients so a disconnect can be turned
//! into a full unsubscribe.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};
use types::feed::FeedEvent;
use types::ids::{ProductId, UserId};
use types::product::ProductRegistry;

use crate::channel::Channel;
use crate::client::{ClientConfig, ClientHandle, ClientId, OutboundMessage};
use crate::error::HubError;
use crate::feeds::FeedType;
use crate::metrics::HubMetrics;

pub struct BroadcastHub {
    channels: BTreeMap<FeedType, Channel>,
    products: Arc<ProductRegistry>,
    client_config: ClientConfig,
    next_client_id: AtomicU64,
    metrics: Arc<HubMetrics>,
}

impl BroadcastHub {
    /// Build every feed's channel from an already loaded registry.
    pub fn new(products: Arc<ProductRegistry>, client_config: ClientConfig) -> Self {
        let metrics = Arc::new(HubMetrics::new());
        let channels = FeedType::ALL
            .into_iter()
            .map(|feed| (feed, Channel::new(feed.build(), &products, metrics.clone())))
            .collect();

        info!(
            feeds = FeedType::ALL.len(),
            products = products.len(),
            queue_capacity = client_config.queue_capacity,
            overflow_policy = ?client_config.overflow_policy,
            "Broadcast hub initialized"
        );

        Self {
            channels,
            products,
            client_config,
            next_client_id: AtomicU64::new(1),
            metrics,
        }
    }

    /// Register a new connection and hand back its handle and queue.
    pub fn connect(&self, user_id: Option<UserId>) -> (ClientHandle, mpsc::Receiver<OutboundMessage>) {
        let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        self.metrics.client_connected();
        debug!(client_id = id, authenticated = user_id.is_some(), "Client connected");
        ClientHandle::new(id, user_id, self.client_config)
    }

    /// Drop every subscription the client holds.
    pub fn disconnect(&self, client_id: ClientId) {
        self.unsubscribe_all(client_id);
        self.metrics.client_disconnected();
        debug!(client_id, "Client disconnected");
    }

    pub fn subscribe(
        &self,
        client: &ClientHandle,
        feed: FeedType,
        products: &[ProductId],
    ) -> Result<(), HubError> {
        self.channel(feed).subscribe(client, products)
    }

    /// Subscribe to several feeds at once. Every pair is checked first, so
    /// a rejected request leaves the client's subscriptions untouched.
    pub fn subscribe_all_or_none(
        &self,
        client: &ClientHandle,
        requests: &[(FeedType, Vec<ProductId>)],
    ) -> Result<(), HubError> {
        for (feed, products) in requests {
            self.channel(*feed).check_subscribe(client, products)?;
        }
        for (feed, products) in requests {
            self.channel(*feed).subscribe(client, products)?;
        }
        Ok(())
    }

    pub fn unsubscribe(&self, client_id: ClientId, feed: FeedType, products: &[ProductId]) {
        self.channel(feed).unsubscribe(client_id, products);
    }

    /// Remove the client from every (feed, product) pair.
    pub fn unsubscribe_all(&self, client_id: ClientId) {
        for channel in self.channels.values() {
            channel.unsubscribe_all(client_id);
        }
    }

    /// Publish an event on one feed.
    pub fn broadcast(&self, feed: FeedType, event: &FeedEvent) -> Result<usize, HubError> {
        self.channel(feed).broadcast(event.product_id(), event)
    }

    /// Publish an event on every feed that carries it.
    ///
    /// A failure on one feed is logged by that channel and does not stop
    /// delivery on the others. Returns the total number of deliveries.
    pub fn route(&self, event: &FeedEvent) -> usize {
        self.metrics.record_event_routed();
        FeedType::routes_for(event)
            .iter()
            .filter_map(|feed| self.broadcast(*feed, event).ok())
            .sum()
    }

    /// Feed → products the client is subscribed to. Feeds with no
    /// subscriptions are omitted.
    pub fn subscriptions(&self, client_id: ClientId) -> BTreeMap<FeedType, Vec<ProductId>> {
        self.channels
            .iter()
            .map(|(feed, channel)| (*feed, channel.subscriptions_of(client_id)))
            .filter(|(_, products)| !products.is_empty())
            .collect()
    }

    pub fn channel(&self, feed: FeedType) -> &Channel {
        // Every FeedType gets a channel in `new`
        &self.channels[&feed]
    }

    pub fn products(&self) -> &Arc<ProductRegistry> {
        &self.products
    }

    pub fn metrics(&self) -> &Arc<HubMetrics> {
        &self.metrics
    }
}
