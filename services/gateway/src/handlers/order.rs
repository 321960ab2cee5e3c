use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::state::AppState;
use crate::validation::validate_order;
use axum::{extract::State, Json};
use tracing::info;
use types::ids::{OrderId, ProductId};
use types::now_nanos;
use types::order::{Order, OrderConfirmation, OrderRequest};

pub async fn create_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<OrderRequest>,
) -> Result<Json<OrderConfirmation>, AppError> {
    // 1. Validate fields before anything is pending
    validate_order(&payload, &state.products)?;

    // 2. Assign identity
    let order = Order::new(payload, OrderId::new(), user.user_id, now_nanos());
    info!(
        order_id = %order.order_id(),
        product_id = %order.product_id(),
        side = ?order.side(),
        "Processing order request"
    );

    // 3. Submit and wait; dropping this future (client gone) cancels the request
    let pending = state.correlator.submit(&order).await?;
    let confirmation = pending.wait().await?;

    // 4. Only keep caller-facing fields
    Ok(Json(confirmation.into_public()))
}

pub async fn list_products(State(state): State<AppState>) -> Json<Vec<ProductId>> {
    Json(state.products.iter().cloned().collect())
}
