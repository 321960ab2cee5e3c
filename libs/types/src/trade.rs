//! Trade execution events reported by the matching engine

use crate::ids::{OrderId, ProductId, TradeId};
use crate::numeric::{Price, Quantity};
use crate::order::Side;
use serde::{Deserialize, Serialize};

/// A match between a resting maker order and an incoming taker order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    pub trade_id: TradeId,
    /// Per-product monotonic sequence assigned by the matching engine
    pub sequence: u64,
    pub product_id: ProductId,

    // Order references
    pub maker_order_id: OrderId,
    pub taker_order_id: OrderId,

    // Trade details (from taker perspective)
    pub side: Side,
    pub price: Price,
    pub size: Quantity,

    pub time: i64, // Unix nanos
}
