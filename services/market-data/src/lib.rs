//! Market Data Service
//!
//! Fans matching-engine events out to websocket subscribers, partitioned by
//! feed and product.
//!
//! # Architecture
//!
//! ```text
//!   bus (market.events)        Heartbeat
//!          │                       │
//!   ┌──────▼──────┐                │
//!   │  consumer   │  decode        │
//!   └──────┬──────┘                │
//!          │ route                 │ broadcast
//!   ┌──────▼───────────────────────▼──────┐
//!   │ BroadcastHub                        │
//!   │  heartbeat status ticker level2     │
//!   │  user matches full   (Channel each) │
//!   └──────┬──────────────────────────────┘
//!          │ transform + deliver (bounded queue per client)
//!   ┌──────▼──────┐
//!   │  websocket  │ ── disconnect → unsubscribe_all
//!   └─────────────┘
//! ```

pub mod channel;
pub mod client;
pub mod config;
pub mod consumer;
pub mod error;
pub mod feeds;
pub mod heartbeat;
pub mod hub;
pub mod metrics;
pub mod router;
pub mod websocket;

pub use channel::Channel;
pub use client::{ClientConfig, ClientHandle, ClientId, OutboundMessage, OverflowPolicy};
pub use config::MarketDataConfig;
pub use consumer::run_event_consumer;
pub use error::HubError;
pub use feeds::{Feed, FeedType, PublicOrderMessage, TickerMessage};
pub use heartbeat::Heartbeat;
pub use hub::BroadcastHub;
pub use metrics::HubMetrics;
pub use router::{create_router, AppState};

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
