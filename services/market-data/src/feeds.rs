//! Feed types and per-feed message transforms
//!
//! Each feed decides two things about an event before it is delivered:
//! what the subscriber sees ([`Feed::transform`]) and which subscribers see
//! it at all ([`Feed::admits`]). Most feeds forward the event unchanged;
//! the ticker feed derives a ticker update from a trade, the user feed
//! only reaches the user the event belongs to, and the full feed publishes
//! order updates without their owner.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use types::feed::{FeedEvent, OrderState, OrderUpdate};
use types::ids::{OrderId, ProductId, TradeId};
use types::numeric::{Price, Quantity};
use types::order::Side;
use types::trade::TradeEvent;

use crate::client::ClientHandle;
use crate::error::HubError;

/// The real-time feeds a client can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedType {
    Heartbeat,
    Status,
    Ticker,
    Level2,
    User,
    Matches,
    Full,
}

impl FeedType {
    pub const ALL: [FeedType; 7] = [
        FeedType::Heartbeat,
        FeedType::Status,
        FeedType::Ticker,
        FeedType::Level2,
        FeedType::User,
        FeedType::Matches,
        FeedType::Full,
    ];

    /// Name used in the subscription protocol.
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedType::Heartbeat => "heartbeat",
            FeedType::Status => "status",
            FeedType::Ticker => "ticker",
            FeedType::Level2 => "level2",
            FeedType::User => "user",
            FeedType::Matches => "matches",
            FeedType::Full => "full",
        }
    }

    /// Feeds an event is published on.
    pub fn routes_for(event: &FeedEvent) -> &'static [FeedType] {
        match event {
            FeedEvent::Trade(_) => &[FeedType::Ticker, FeedType::Matches, FeedType::Full],
            FeedEvent::Level2(_) => &[FeedType::Level2, FeedType::Full],
            FeedEvent::Order(_) => &[FeedType::User, FeedType::Full],
            FeedEvent::Status(_) => &[FeedType::Status],
            FeedEvent::Heartbeat(_) => &[FeedType::Heartbeat],
        }
    }

    /// Build the feed implementation for this type.
    pub fn build(self) -> Box<dyn Feed> {
        match self {
            FeedType::Ticker => Box::new(TickerFeed),
            FeedType::User => Box::new(UserFeed),
            FeedType::Full => Box::new(FullFeed),
            other => Box::new(PassThroughFeed(other)),
        }
    }
}

impl fmt::Display for FeedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedType {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FeedType::ALL
            .into_iter()
            .find(|feed| feed.as_str() == s)
            .ok_or_else(|| HubError::UnknownFeed(s.to_string()))
    }
}

/// Per-feed delivery behaviour.
pub trait Feed: Send + Sync {
    fn feed_type(&self) -> FeedType;

    /// Encode `event` into the message subscribers of this feed receive.
    ///
    /// An event the feed does not understand is a `TransformMismatch`; the
    /// caller skips that delivery and carries on.
    fn transform(&self, event: &FeedEvent) -> Result<Arc<str>, HubError> {
        encode(self.feed_type(), event)
    }

    /// Whether `client` may receive `event` on this feed.
    fn admits(&self, _client: &ClientHandle, _event: &FeedEvent) -> bool {
        true
    }

    /// Whether subscribing requires an authenticated client.
    fn requires_auth(&self) -> bool {
        false
    }
}

fn encode<T: Serialize>(feed: FeedType, value: &T) -> Result<Arc<str>, HubError> {
    serde_json::to_string(value)
        .map(Arc::from)
        .map_err(|e| HubError::Encode {
            feed: feed.as_str(),
            reason: e.to_string(),
        })
}

/// Forwards every event unchanged.
pub struct PassThroughFeed(pub FeedType);

impl Feed for PassThroughFeed {
    fn feed_type(&self) -> FeedType {
        self.0
    }
}

/// Ticker update derived from the last trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "ticker")]
pub struct TickerMessage {
    pub product_id: ProductId,
    pub trade_id: TradeId,
    pub price: Price,
    pub size: Quantity,
    pub side: Side,
    pub time: i64,
    pub sequence: u64,
}

impl From<&TradeEvent> for TickerMessage {
    fn from(trade: &TradeEvent) -> Self {
        Self {
            product_id: trade.product_id.clone(),
            trade_id: trade.trade_id,
            price: trade.price,
            size: trade.size,
            side: trade.side,
            time: trade.time,
            sequence: trade.sequence,
        }
    }
}

/// Turns trades into ticker updates. Anything else is a mismatch.
pub struct TickerFeed;

impl Feed for TickerFeed {
    fn feed_type(&self) -> FeedType {
        FeedType::Ticker
    }

    fn transform(&self, event: &FeedEvent) -> Result<Arc<str>, HubError> {
        match event {
            FeedEvent::Trade(trade) => encode(FeedType::Ticker, &TickerMessage::from(trade)),
            other => Err(HubError::TransformMismatch {
                feed: FeedType::Ticker.as_str(),
                event: other.kind(),
            }),
        }
    }
}

/// Order update as published on the public full feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "order")]
pub struct PublicOrderMessage {
    pub product_id: ProductId,
    pub order_id: OrderId,
    pub state: OrderState,
    pub side: Side,
    pub price: Option<Price>,
    pub remaining_size: Quantity,
    pub time: i64,
}

impl From<&OrderUpdate> for PublicOrderMessage {
    fn from(update: &OrderUpdate) -> Self {
        Self {
            product_id: update.product_id.clone(),
            order_id: update.order_id,
            state: update.state,
            side: update.side,
            price: update.price,
            remaining_size: update.remaining_size,
            time: update.time,
        }
    }
}

/// Every market event, with order updates stripped of their owner.
pub struct FullFeed;

impl Feed for FullFeed {
    fn feed_type(&self) -> FeedType {
        FeedType::Full
    }

    fn transform(&self, event: &FeedEvent) -> Result<Arc<str>, HubError> {
        match event {
            FeedEvent::Order(update) => encode(FeedType::Full, &PublicOrderMessage::from(update)),
            other => encode(FeedType::Full, other),
        }
    }
}

/// Private order updates: each update reaches only its owner.
pub struct UserFeed;

impl Feed for UserFeed {
    fn feed_type(&self) -> FeedType {
        FeedType::User
    }

    fn transform(&self, event: &FeedEvent) -> Result<Arc<str>, HubError> {
        match event {
            FeedEvent::Order(_) => encode(FeedType::User, event),
            other => Err(HubError::TransformMismatch {
                feed: FeedType::User.as_str(),
                event: other.kind(),
            }),
        }
    }

    fn admits(&self, client: &ClientHandle, event: &FeedEvent) -> bool {
        match event {
            FeedEvent::Order(update) => client.user_id() == Some(update.user_id),
            _ => false,
        }
    }

    fn requires_auth(&self) -> bool {
        true
    }
}
