//! End-to-end correlation tests
//!
//! Runs the correlator, the confirmation consumer and a stand-in matching
//! engine over the in-process bus.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use bus::{topics, BusConsumer, BusProducer, InMemoryBus};
use bytes::Bytes;
use futures::StreamExt;
use gateway::{run_confirmation_consumer, Correlator, CorrelatorConfig, CorrelatorError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use types::ids::{OrderId, ProductId, UserId};
use types::numeric::{Price, Quantity};
use types::order::{ConfirmationStatus, Order, OrderConfirmation, OrderRequest, OrderType, Side};

fn make_order(order_id: OrderId, amount: &str, price: u64) -> Order {
    Order::new(
        OrderRequest {
            product_id: ProductId::new("BTC-USD"),
            side: Side::Buy,
            order_type: OrderType::Limit,
            amount: Quantity::from_str(amount).unwrap(),
            price: Some(Price::from_u64(price)),
        },
        order_id,
        UserId::new(),
        1708123456789000000,
    )
}

fn confirm(order: &Order) -> Bytes {
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
        timestamp: 1708123456790000000,
    };
    Bytes::from(serde_json::to_vec(&conf).unwrap())
}

struct Harness {
    bus: Arc<InMemoryBus>,
    correlator: Arc<Correlator>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Harness {
    async fn start(config: CorrelatorConfig) -> Self {
        let bus = Arc::new(InMemoryBus::with_defaults());
        let correlator = Arc::new(Correlator::new(bus.clone(), config));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let confirmations = bus.consume(topics::ORDER_CONFIRMATION).await.unwrap();
        let tasks = vec![
            tokio::spawn(run_confirmation_consumer(
                correlator.clone(),
                confirmations,
                shutdown_rx.clone(),
            )),
            tokio::spawn(correlator.clone().run_reaper(shutdown_rx)),
        ];

        Self {
            bus,
            correlator,
            shutdown_tx,
            tasks,
        }
    }

    async fn stop(self) {
        self.shutdown_tx.send(true).unwrap();
        for task in self.tasks {
            task.await.unwrap();
        }
    }
}

#[tokio::test]
async fn test_confirmation_within_deadline() {
    let harness = Harness::start(CorrelatorConfig::default()).await;
    let order = make_order(OrderId::new(), "1.5", 20000);

    let pending = harness
        .correlator
        .submit_with_timeout(&order, Duration::from_secs(2))
        .await
        .unwrap();

    let bus = harness.bus.clone();
    let reply = order.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        bus.produce(
            topics::ORDER_CONFIRMATION,
            &reply.order_id().to_string(),
            confirm(&reply),
        )
        .await
        .unwrap();
    });

    let conf = pending.wait().await.unwrap();
    assert_eq!(conf.order_id, order.order_id());
    assert_eq!(conf.amount, Quantity::from_str("1.5").unwrap());
    assert!(!harness.correlator.is_pending(&order.order_id()));

    // Same bytes again: dropped without side effects.
    harness
        .bus
        .produce(
            topics::ORDER_CONFIRMATION,
            &order.order_id().to_string(),
            confirm(&order),
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let metrics = harness.correlator.metrics();
    assert_eq!(metrics.confirmed.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.unknown_dropped.load(Ordering::Relaxed), 1);
    assert_eq!(harness.correlator.pending_len(), 0);

    harness.stop().await;
}

#[tokio::test]
async fn test_no_confirmation_times_out() {
    let harness = Harness::start(CorrelatorConfig::default()).await;
    let order = make_order(OrderId::new(), "1", 20000);

    let started = tokio::time::Instant::now();
    let pending = harness
        .correlator
        .submit_with_timeout(&order, Duration::from_millis(200))
        .await
        .unwrap();

    let err = pending.wait().await.unwrap_err();
    assert!(matches!(err, CorrelatorError::Timeout(id) if id == order.order_id()));
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert!(!harness.correlator.is_pending(&order.order_id()));

    harness.stop().await;
}

#[tokio::test]
async fn test_bus_outage_fails_submit_immediately() {
    let harness = Harness::start(CorrelatorConfig::default()).await;
    harness.bus.set_online(false);

    let order = make_order(OrderId::new(), "1", 20000);
    let err = harness.correlator.submit(&order).await.err().unwrap();

    assert!(matches!(err, CorrelatorError::Submission(_)));
    assert_eq!(harness.correlator.pending_len(), 0);

    harness.stop().await;
}

/// Many concurrent callers racing confirmations, duplicates, cancellation,
/// caller-side deadlines and the reaper. Every order must end in exactly one
/// terminal state.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_exactly_once_resolution_under_contention() {
    const ORDERS: usize = 400;

    let harness = Harness::start(CorrelatorConfig {
        reaper_interval: Duration::from_millis(5),
        ..CorrelatorConfig::default()
    })
    .await;

    // Stand-in matching engine: confirms two out of three orders, twice each.
    let mut requests = harness.bus.consume(topics::ORDER_REQUEST).await.unwrap();
    let engine_bus = harness.bus.clone();
    let engine = tokio::spawn(async move {
        let mut seen = 0usize;
        while let Some(record) = requests.next().await {
            let order: Order = serde_json::from_slice(&record.payload).unwrap();
            seen += 1;
            if seen % 3 == 0 {
                continue;
            }
            for _ in 0..2 {
                engine_bus
                    .produce(topics::ORDER_CONFIRMATION, &record.key, confirm(&order))
                    .await
                    .unwrap();
            }
            if seen == ORDERS {
                break;
            }
        }
    });

    let mut callers = Vec::with_capacity(ORDERS);
    for i in 0..ORDERS {
        let correlator = harness.correlator.clone();
        callers.push(tokio::spawn(async move {
            let order = make_order(OrderId::new(), "1", 20000 + i as u64);
            let timeout = Duration::from_millis(20 + (i % 7) as u64 * 10);
            let pending = correlator.submit_with_timeout(&order, timeout).await.unwrap();

            if i % 11 == 0 {
                correlator.cancel(&order.order_id());
            }

            match pending.wait().await {
                Ok(conf) => {
                    assert_eq!(conf.order_id, order.order_id());
                    0u8
                }
                Err(CorrelatorError::Timeout(_)) => 1,
                Err(CorrelatorError::Cancelled(_)) => 2,
                Err(other) => panic!("unexpected outcome: {:?}", other),
            }
        }));
    }

    let mut outcomes = [0usize; 3];
    for caller in callers {
        outcomes[caller.await.unwrap() as usize] += 1;
    }
    engine.abort();

    let metrics = harness.correlator.metrics();
    assert_eq!(outcomes.iter().sum::<usize>(), ORDERS);
    assert_eq!(metrics.submitted.load(Ordering::Relaxed), ORDERS as u64);
    assert_eq!(metrics.resolved(), ORDERS as u64);
    assert_eq!(metrics.confirmed.load(Ordering::Relaxed), outcomes[0] as u64);
    assert_eq!(metrics.timed_out.load(Ordering::Relaxed), outcomes[1] as u64);
    assert_eq!(metrics.cancelled.load(Ordering::Relaxed), outcomes[2] as u64);
    assert_eq!(harness.correlator.pending_len(), 0);

    harness.stop().await;
}
