//! Order and confirmation types
//!
//! An `OrderRequest` is what a caller sends before validation. Once the
//! gateway has validated it and assigned identity it becomes an immutable
//! `Order`, which is what travels to the matching engine. The engine answers
//! with exactly one `OrderConfirmation` keyed by the same `OrderId`.

use crate::ids::{OrderId, ProductId, UserId};
use crate::numeric::{Price, Quantity};
use serde::{Deserialize, Serialize};

/// Order side (buyer or seller)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Buy order (bid)
    Buy,
    /// Sell order (ask)
    Sell,
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Limit,
    Market,
    Stop,
}

impl OrderType {
    /// Whether orders of this type must carry a positive price.
    pub fn requires_price(&self) -> bool {
        matches!(self, OrderType::Limit | OrderType::Stop)
    }
}

/// Order fields as submitted by a caller, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub product_id: ProductId,
    pub side: Side,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub amount: Quantity,
    #[serde(default)]
    pub price: Option<Price>,
}

/// A validated order with identity assigned.
///
/// Immutable once built; fields are only readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    order_id: OrderId,
    user_id: UserId,
    product_id: ProductId,
    side: Side,
    #[serde(rename = "type")]
    order_type: OrderType,
    amount: Quantity,
    price: Option<Price>,
    created_at: i64, // Unix nanos
}

impl Order {
    /// Assign identity to an already-validated request.
    pub fn new(request: OrderRequest, order_id: OrderId, user_id: UserId, created_at: i64) -> Self {
        Self {
            order_id,
            user_id,
            product_id: request.product_id,
            side: request.side,
            order_type: request.order_type,
            amount: request.amount,
            price: request.price,
            created_at,
        }
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn product_id(&self) -> &ProductId {
        &self.product_id
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn order_type(&self) -> OrderType {
        self.order_type
    }

    pub fn amount(&self) -> Quantity {
        self.amount
    }

    pub fn price(&self) -> Option<Price> {
        self.price
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }
}

/// Outcome reported by the matching engine for a submitted order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationStatus {
    /// Accepted and resting on (or matched against) the book
    Accepted,
    /// Rejected by the engine (e.g. insufficient funds)
    Rejected,
}

/// Confirmation for one order, keyed by its `OrderId`.
///
/// The correlator only reads `order_id`; the rest is passed to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderConfirmation {
    pub order_id: OrderId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    pub product_id: ProductId,
    pub side: Side,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub amount: Quantity,
    #[serde(default)]
    pub price: Option<Price>,
    pub status: ConfirmationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub timestamp: i64, // Unix nanos
}

impl OrderConfirmation {
    /// Confirmation as it may leave the system: caller-internal fields removed.
    pub fn into_public(mut self) -> Self {
        self.user_id = None;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> OrderRequest {
        OrderRequest {
            product_id: ProductId::new("BTC-USD"),
            side: Side::Buy,
            order_type: OrderType::Limit,
            amount: Quantity::from_str("1.5").unwrap(),
            price: Some(Price::from_u64(20000)),
        }
    }

    #[test]
    fn test_requires_price() {
        assert!(OrderType::Limit.requires_price());
        assert!(OrderType::Stop.requires_price());
        assert!(!OrderType::Market.requires_price());
    }

    #[test]
    fn test_order_carries_assigned_identity() {
        let order_id = OrderId::new();
        let user_id = UserId::new();
        let order = Order::new(sample_request(), order_id, user_id, 1708123456789000000);

        assert_eq!(order.order_id(), order_id);
        assert_eq!(order.user_id(), user_id);
        assert_eq!(order.product_id().as_str(), "BTC-USD");
        assert_eq!(order.price(), Some(Price::from_u64(20000)));
    }

    #[test]
    fn test_request_wire_format() {
        let json = r#"{"product_id":"ETH-USD","side":"sell","type":"market","amount":"2.5"}"#;
        let request: OrderRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.side, Side::Sell);
        assert_eq!(request.order_type, OrderType::Market);
        assert!(request.price.is_none());
    }

    #[test]
    fn test_confirmation_into_public_strips_user() {
        let conf = OrderConfirmation {
            order_id: OrderId::new(),
            user_id: Some(UserId::new()),
            product_id: ProductId::new("BTC-USD"),
            side: Side::Buy,
            order_type: OrderType::Limit,
            amount: Quantity::from_u64(1),
            price: Some(Price::from_u64(20000)),
            status: ConfirmationStatus::Accepted,
            reason: None,
            timestamp: 1708123456789000000,
        };

        let public = conf.into_public();
        assert!(public.user_id.is_none());
        let json = serde_json::to_string(&public).unwrap();
        assert!(!json.contains("user_id"));
    }
}
