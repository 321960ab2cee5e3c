//! Types library for the order-flow and market-data backbone
//!
//! Core type definitions shared by the gateway (order path) and the market
//! data hub (broadcast path).
//!
//! # Modules
//! - `ids`: Unique identifiers (OrderId, TradeId, UserId, ProductId)
//! - `numeric`: Fixed-point decimal types (Price, Quantity)
//! - `order`: Order requests, validated orders and confirmations
//! - `trade`: Trade execution events
//! - `feed`: Market and user feed events
//! - `product`: Read-only product registry
//! - `errors`: Error taxonomy

// Public modules
pub mod ids;
pub mod numeric;
pub mod order;
pub mod trade;
pub mod feed;
pub mod product;
pub mod errors;

/// Current time as Unix nanoseconds
pub fn now_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
}
