use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use jsonwebtoken::DecodingKey;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use types::ids::ProductId;

use crate::hub::BroadcastHub;
use crate::websocket::ws_handler;

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<BroadcastHub>,
    pub decoding_key: Arc<DecodingKey>,
}

impl AppState {
    pub fn new(hub: Arc<BroadcastHub>, jwt_secret: &str) -> Self {
        Self {
            hub,
            decoding_key: Arc::new(DecodingKey::from_secret(jwt_secret.as_bytes())),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/metrics", get(metrics))
        .route("/products", get(products))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn metrics(State(state): State<AppState>) -> Json<BTreeMap<String, u64>> {
    Json(state.hub.metrics().export())
}

async fn products(State(state): State<AppState>) -> Json<Vec<ProductId>> {
    Json(state.hub.products().iter().cloned().collect())
}
