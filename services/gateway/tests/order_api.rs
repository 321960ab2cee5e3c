use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use bus::{topics, BusConsumer, BusProducer, InMemoryBus};
use bytes::Bytes;
use futures::StreamExt;
use gateway::auth::Claims;
use gateway::{create_router, run_confirmation_consumer, AppState, Correlator, CorrelatorConfig};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tokio::sync::watch;
use tower::ServiceExt;
use types::ids::UserId;
use types::order::{ConfirmationStatus, Order, OrderConfirmation};
use types::product::ProductRegistry;

const SECRET: &str = "test-secret";

struct TestApp {
    router: Router,
    bus: Arc<InMemoryBus>,
    _shutdown: watch::Sender<bool>,
}

async fn spawn_app(order_timeout: Duration, with_engine: bool) -> TestApp {
    let bus = Arc::new(InMemoryBus::with_defaults());
    let correlator = Arc::new(Correlator::new(
        bus.clone(),
        CorrelatorConfig {
            default_timeout: order_timeout,
            ..CorrelatorConfig::default()
        },
    ));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let confirmations = bus.consume(topics::ORDER_CONFIRMATION).await.unwrap();
    tokio::spawn(run_confirmation_consumer(
        correlator.clone(),
        confirmations,
        shutdown_rx.clone(),
    ));
    tokio::spawn(correlator.clone().run_reaper(shutdown_rx));

    if with_engine {
        let mut requests = bus.consume(topics::ORDER_REQUEST).await.unwrap();
        let engine_bus = bus.clone();
        tokio::spawn(async move {
            while let Some(record) = requests.next().await {
                let order: Order = serde_json::from_slice(&record.payload).unwrap();
                let conf = OrderConfirmation {
                    order_id: order.order_id(),
                    user_id: Some(order.user_id()),
                    product_id: order.product_id().clone(),
                    side: order.side(),
                    order_type: order.order_type(),
                    amount: order.amount(),
                    price: order.price(),
                    status: ConfirmationStatus::Accepted,
                    reason: None,
                    timestamp: order.created_at() + 1,
                };
                let payload = Bytes::from(serde_json::to_vec(&conf).unwrap());
                let _ = engine_bus
                    .produce(topics::ORDER_CONFIRMATION, &record.key, payload)
                    .await;
            }
        });
    }

    let products = ProductRegistry::parse("BTC-USD,ETH-USD").unwrap();
    let state = AppState::new(correlator, products, SECRET);

    TestApp {
        router: create_router(state),
        bus,
        _shutdown: shutdown_tx,
    }
}

fn bearer() -> String {
    let token = encode(
        &Header::default(),
        &Claims {
            sub: UserId::new(),
            exp: 4_000_000_000,
        },
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap();
    format!("Bearer {}", token)
}

fn order_request(body: Value, auth: Option<String>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/v1/orders")
        .header("content-type", "application/json");
    if let Some(auth) = auth {
        builder = builder.header("Authorization", auth);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn limit_buy() -> Value {
    json!({
        "product_id": "BTC-USD",
        "side": "buy",
        "type": "limit",
        "amount": "1.5",
        "price": "20000"
    })
}

#[tokio::test]
async fn test_order_confirmed() {
    let app = spawn_app(Duration::from_secs(2), true).await;

    let response = app
        .router
        .oneshot(order_request(limit_buy(), Some(bearer())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["product_id"], "BTC-USD");
    assert_eq!(body["amount"], "1.5");
    assert!(body.get("user_id").is_none());
}

#[tokio::test]
async fn test_missing_token_rejected() {
    let app = spawn_app(Duration::from_secs(2), true).await;

    let response = app
        .router
        .oneshot(order_request(limit_buy(), None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_invalid_order_rejected_before_submission() {
    let app = spawn_app(Duration::from_secs(2), true).await;

    let mut unknown_product = limit_buy();
    unknown_product["product_id"] = json!("DOGE-USD");
    let response = app
        .router
        .clone()
        .oneshot(order_request(unknown_product, Some(bearer())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    for (field, value) in [("amount", "-1.5"), ("price", "-20000")] {
        let mut negative = limit_buy();
        negative[field] = json!(value);
        let response = app
            .router
            .clone()
            .oneshot(order_request(negative, Some(bearer())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "negative {}", field);
    }

    let mut missing_price = limit_buy();
    missing_price
        .as_object_mut()
        .unwrap()
        .remove("price");
    let response = app
        .router
        .oneshot(order_request(missing_price, Some(bearer())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_bus_unavailable_is_503() {
    let app = spawn_app(Duration::from_secs(2), true).await;
    app.bus.set_online(false);

    let response = app
        .router
        .oneshot(order_request(limit_buy(), Some(bearer())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_no_engine_is_504() {
    let app = spawn_app(Duration::from_millis(100), false).await;

    let response = app
        .router
        .oneshot(order_request(limit_buy(), Some(bearer())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    let body = body_json(response).await;
    assert_eq!(body["error"], "TIMEOUT");
}

#[tokio::test]
async fn test_list_products() {
    let app = spawn_app(Duration::from_secs(2), false).await;

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/v1/products")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!(["BTC-USD", "ETH-USD"]));
}
