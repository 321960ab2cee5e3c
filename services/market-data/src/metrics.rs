//! Broadcast hub counters
//!
//! Plain atomics, exported as a sorted map for the `/metrics` endpoint.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct HubMetrics {
    // Inbound
    pub events_routed: AtomicU64,
    pub decode_failed: AtomicU64,
    pub unknown_products: AtomicU64,

    // Fan-out
    pub deliveries: AtomicU64,
    pub transform_mismatches: AtomicU64,
    pub backpressure_drops: AtomicU64,
    pub disconnects_requested: AtomicU64,

    // Clients
    pub connected_clients: AtomicU64,
}

impl HubMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event_routed(&self) {
        self.events_routed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failed(&self) {
        self.decode_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unknown_product(&self) {
        self.unknown_products.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deliveries(&self, count: u64) {
        self.deliveries.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_transform_mismatch(&self) {
        self.transform_mismatches.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a message dropped due to backpressure.
    pub fn record_backpressure_drop(&self) {
        self.backpressure_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_disconnect_requested(&self) {
        self.disconnects_requested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn client_connected(&self) {
        self.connected_clients.fetch_add(1, Ordering::Relaxed);
    }

    pub fn client_disconnected(&self) {
        let _ = self
            .connected_clients
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Export metrics as a BTreeMap for Prometheus-style exposition.
    pub fn export(&self) -> BTreeMap<String, u64> {
        let mut m = BTreeMap::new();
        m.insert("events_routed".to_string(), self.events_routed.load(Ordering::Relaxed));
        m.insert("decode_failed".to_string(), self.decode_failed.load(Ordering::Relaxed));
        m.insert("unknown_products".to_string(), self.unknown_products.load(Ordering::Relaxed));
        m.insert("deliveries".to_string(), self.deliveries.load(Ordering::Relaxed));
        m.insert(
            "transform_mismatches".to_string(),
            self.transform_mismatches.load(Ordering::Relaxed),
        );
        m.insert(
            "backpressure_drops".to_string(),
            self.backpressure_drops.load(Ordering::Relaxed),
        );
        m.insert(
            "disconnects_requested".to_string(),
            self.disconnects_requested.load(Ordering::Relaxed),
        );
        m.insert(
            "connected_clients".to_string(),
            self.connected_clients.load(Ordering::Relaxed),
        );
        m
    }
}
