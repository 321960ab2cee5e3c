//! One feed's subscription registry
//!
//! A channel maps every known product to the set of clients subscribed to
//! it. The product map is built once from the registry and never changes
//! afterwards; only the per-product client sets are mutated. Each set is
//! its own concurrent map, so subscribers of one product never contend
//! with another product's broadcasts.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};
use types::feed::FeedEvent;
use types::ids::ProductId;
use types::product::ProductRegistry;

use crate::client::{ClientHandle, ClientId, DeliveryFailure, OutboundMessage};
use crate::error::HubError;
use crate::feeds::{Feed, FeedType};
use crate::metrics::HubMetrics;

type ClientSet = DashMap<ClientId, ClientHandle>;

pub struct Channel {
    feed: Box<dyn Feed>,
    subscribers: BTreeMap<ProductId, ClientSet>,
    metrics: Arc<HubMetrics>,
}

impl Channel {
    /// Create the channel with an empty client set for every product.
    pub fn new(feed: Box<dyn Feed>, products: &ProductRegistry, metrics: Arc<HubMetrics>) -> Self {
        let subscribers = products
            .iter()
            .map(|product| (product.clone(), DashMap::new()))
            .collect();
        Self {
            feed,
            subscribers,
            metrics,
        }
    }

    pub fn feed_type(&self) -> FeedType {
        self.feed.feed_type()
    }

    /// Check that `client` may subscribe to `products` without changing
    /// anything.
    pub fn check_subscribe(&self, client: &ClientHandle, products: &[ProductId]) -> Result<(), HubError> {
        if self.feed.requires_auth() && client.user_id().is_none() {
            return Err(HubError::Unauthenticated {
                feed: self.feed_type().as_str(),
            });
        }
        match products.iter().find(|product| !self.subscribers.contains_key(*product)) {
            Some(unknown) => Err(HubError::UnknownProduct(unknown.to_string())),
            None => Ok(()),
        }
    }

    /// Add the client to each product's set. Subscribing twice is a no-op.
    ///
    /// Nothing changes if any product is unknown.
    pub fn subscribe(&self, client: &ClientHandle, products: &[ProductId]) -> Result<(), HubError> {
        self.check_subscribe(client, products)?;

        for product in products {
            if let Some(set) = self.subscribers.get(product) {
                set.insert(client.id(), client.clone());
            }
        }
        debug!(
            client_id = client.id(),
            feed = %self.feed_type(),
            products = products.len(),
            "Client subscribed"
        );
        Ok(())
    }

    /// Remove the client from the named products. Unknown products and
    /// missing memberships are ignored.
    pub fn unsubscribe(&self, client_id: ClientId, products: &[ProductId]) {
        for product in products {
            if let Some(set) = self.subscribers.get(product) {
                set.remove(&client_id);
            }
        }
    }

    /// Remove the client from every product on this channel.
    pub fn unsubscribe_all(&self, client_id: ClientId) {
        for set in self.subscribers.values() {
            set.remove(&client_id);
        }
    }

    pub fn is_subscribed(&self, client_id: ClientId, product: &ProductId) -> bool {
        self.subscribers
            .get(product)
            .is_some_and(|set| set.contains_key(&client_id))
    }

    /// Ids of the clients subscribed to `product`, sorted.
    pub fn subscriber_ids(&self, product: &ProductId) -> Vec<ClientId> {
        let mut ids: Vec<ClientId> = self
            .subscribers
            .get(product)
            .map(|set| set.iter().map(|entry| *entry.key()).collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    /// Products the client is subscribed to on this channel.
    pub fn subscriptions_of(&self, client_id: ClientId) -> Vec<ProductId> {
        self.subscribers
            .iter()
            .filter(|(_, set)| set.contains_key(&client_id))
            .map(|(product, _)| product.clone())
            .collect()
    }

    /// Deliver `event` to every current subscriber of `product`.
    ///
    /// The client set is copied before delivery so subscribe and unsubscribe
    /// are never blocked behind a slow client. Returns how many clients the
    /// message was queued for.
    pub fn broadcast(&self, product: &ProductId, event: &FeedEvent) -> Result<usize, HubError> {
        let set = self
            .subscribers
            .get(product)
            .ok_or_else(|| HubError::UnknownProduct(product.to_string()))?;

        let recipients: Vec<ClientHandle> = set
            .iter()
            .filter(|entry| self.feed.admits(entry.value(), event))
            .map(|entry| entry.value().clone())
            .collect();
        if recipients.is_empty() {
            return Ok(0);
        }

        let payload = match self.feed.transform(event) {
            Ok(payload) => payload,
            Err(err) => {
                if matches!(err, HubError::TransformMismatch { .. }) {
                    self.metrics.record_transform_mismatch();
                }
                warn!(
                    feed = %self.feed_type(),
                    product_id = %product,
                    event = event.kind(),
                    error = %err,
                    "Skipping delivery"
                );
                return Err(err);
            }
        };

        let message = OutboundMessage::feed(self.feed_type(), payload);
        let mut delivered = 0;
        for client in recipients {
            match client.deliver(message.clone()) {
                Ok(()) => delivered += 1,
                Err(DeliveryFailure::Dropped) => self.metrics.record_backpressure_drop(),
                Err(DeliveryFailure::DisconnectRequested) => {
                    self.metrics.record_backpressure_drop();
                    self.metrics.record_disconnect_requested();
                }
                Err(DeliveryFailure::Closed) => {
                    debug!(client_id = client.id(), feed = %self.feed_type(), "Client gone, skipping");
                }
            }
        }

        self.metrics.record_deliveries(delivered as u64);
        Ok(delivered)
    }
}
