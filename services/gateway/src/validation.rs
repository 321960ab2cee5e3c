//! Order field validation performed before anything reaches the correlator.

use types::errors::ValidationError;
use types::order::OrderRequest;
use types::product::ProductRegistry;

/// Check an incoming request against the order rules and the product registry.
///
/// Side and type are already constrained by deserialization.
pub fn validate_order(
    request: &OrderRequest,
    products: &ProductRegistry,
) -> Result<(), ValidationError> {
    if !request.amount.is_positive() {
        return Err(ValidationError::NonPositiveAmount);
    }

    match request.price {
        Some(price) if !price.is_positive() => return Err(ValidationError::NonPositivePrice),
        None if request.order_type.requires_price() => {
            return Err(ValidationError::MissingPrice {
                order_type: format!("{:?}", request.order_type).to_lowercase(),
            })
        }
        _ => {}
    }

    if !products.contains(&request.product_id) {
        return Err(ValidationError::UnknownProduct {
            product_id: request.product_id.to_string(),
        });
    }

    Ok(())
}
