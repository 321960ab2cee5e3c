//! Error types shared across services
//!
//! Comprehensive error taxonomy using thiserror

use thiserror::Error;

/// Order fields rejected by the gateway before submission
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("amount must be > 0")]
    NonPositiveAmount,

    #[error("price must be > 0")]
    NonPositivePrice,

    #[error("price is required for {order_type} orders")]
    MissingPrice { order_type: String },

    #[error("invalid product_id: {product_id}")]
    UnknownProduct { product_id: String },
}

/// Failures building the product registry at startup
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProductRegistryError {
    #[error("product registry is empty")]
    Empty,

    #[error("malformed product identifier: {0}")]
    InvalidProduct(String),
}
