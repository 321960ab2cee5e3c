//! Market and user events published by the matching engine
//!
//! Every event is tagged with the product that produced it. The wire format
//! is internally tagged JSON: `{"type": "trade", ...}`.

use crate::ids::{OrderId, ProductId, UserId};
use crate::numeric::{Price, Quantity};
use crate::order::Side;
use crate::trade::TradeEvent;
use serde::{Deserialize, Serialize};

/// One price level change in an order book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level2Change {
    pub side: Side,
    pub price: Price,
    /// New aggregate size at this level; zero removes the level
    pub size: Quantity,
}

/// Incremental order book update for a product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Level2Update {
    pub product_id: ProductId,
    pub sequence: u64,
    pub changes: Vec<Level2Change>,
    pub time: i64,
}

/// Lifecycle state reported for a user's order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderState {
    Received,
    Open,
    Done,
}

/// Private update about one user's order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub product_id: ProductId,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub state: OrderState,
    pub side: Side,
    #[serde(default)]
    pub price: Option<Price>,
    pub remaining_size: Quantity,
    pub time: i64,
}

/// Trading status of a product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Online,
    CancelOnly,
    Offline,
}

/// Product status change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub product_id: ProductId,
    pub status: ProductStatus,
    pub time: i64,
}

/// Liveness message for a product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatEvent {
    pub product_id: ProductId,
    pub sequence: u64,
    pub time: i64,
}

/// Any event that can be fanned out on a feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
    Trade(TradeEvent),
    Level2(Level2Update),
    Order(OrderUpdate),
    Status(StatusEvent),
    Heartbeat(HeartbeatEvent),
}

impl FeedEvent {
    /// Product that produced this event.
    pub fn product_id(&self) -> &ProductId {
        match self {
            FeedEvent::Trade(e) => &e.product_id,
            FeedEvent::Level2(e) => &e.product_id,
            FeedEvent::Order(e) => &e.product_id,
            FeedEvent::Status(e) => &e.product_id,
            FeedEvent::Heartbeat(e) => &e.product_id,
        }
    }

    /// Get the event type as a string label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            FeedEvent::Trade(_) => "trade",
            FeedEvent::Level2(_) => "level2",
            FeedEvent::Order(_) => "order",
            FeedEvent::Status(_) => "status",
            FeedEvent::Heartbeat(_) => "heartbeat",
        }
    }
}
