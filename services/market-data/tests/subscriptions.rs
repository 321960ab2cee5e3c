use std::collections::BTreeMap;

use market_data::{BroadcastHub, ClientConfig, ClientHandle, FeedType};
use proptest::prelude::*;
use types::ids::{ProductId, UserId};
use types::product::ProductRegistry;

const PRODUCTS: [&str; 3] = ["BTC-USD", "ETH-USD", "SOL-USD"];

fn hub() -> BroadcastHub {
    BroadcastHub::new(
        ProductRegistry::parse(&PRODUCTS.join(",")).unwrap(),
        ClientConfig::default(),
    )
}

/// Full subscription state: (feed, product) → sorted client ids.
fn snapshot(hub: &BroadcastHub) -> BTreeMap<(FeedType, ProductId), Vec<u64>> {
    let mut state = BTreeMap::new();
    for feed in FeedType::ALL {
        for product in PRODUCTS {
            let product = ProductId::new(product);
            let ids = hub.channel(feed).subscriber_ids(&product);
            state.insert((feed, product), ids);
        }
    }
    state
}

#[derive(Debug, Clone)]
enum Op {
    Subscribe(usize, FeedType, Vec<usize>),
    Unsubscribe(usize, FeedType, Vec<usize>),
    UnsubscribeAll(usize),
}

fn feed_strategy() -> impl Strategy<Value = FeedType> {
    proptest::sample::select(FeedType::ALL.to_vec())
}

fn products_strategy() -> impl Strategy<Value = Vec<usize>> {
    proptest::collection::vec(0..PRODUCTS.len(), 1..=PRODUCTS.len())
}

fn op_strategy(clients: usize) -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..clients, feed_strategy(), products_strategy())
            .prop_map(|(c, f, p)| Op::Subscribe(c, f, p)),
        (0..clients, feed_strategy(), products_strategy())
            .prop_map(|(c, f, p)| Op::Unsubscribe(c, f, p)),
        (0..clients).prop_map(Op::UnsubscribeAll),
    ]
}

fn product_ids(indices: &[usize]) -> Vec<ProductId> {
    indices.iter().map(|i| ProductId::new(PRODUCTS[*i])).collect()
}

fn apply(hub: &BroadcastHub, clients: &[ClientHandle], op: &Op) {
    match op {
        Op::Subscribe(c, feed, products) => {
            hub.subscribe(&clients[*c], *feed, &product_ids(products)).unwrap();
        }
        Op::Unsubscribe(c, feed, products) => {
            hub.unsubscribe(clients[*c].id(), *feed, &product_ids(products));
        }
        Op::UnsubscribeAll(c) => hub.unsubscribe_all(clients[*c].id()),
    }
}

fn connect_clients(hub: &BroadcastHub, n: usize) -> Vec<ClientHandle> {
    // All authenticated so the user feed accepts them too
    (0..n)
        .map(|_| hub.connect(Some(UserId::new())).0)
        .collect()
}

proptest! {
    #[test]
    fn prop_subscribe_then_unsubscribe_restores_state(
        history in proptest::collection::vec(op_strategy(3), 0..30),
        client in 0usize..4,
        feed in feed_strategy(),
        product in 0..PRODUCTS.len(),
    ) {
        let hub = hub();
        let clients = connect_clients(&hub, 4);
        // Client 3 never appears in the history, so it starts unsubscribed
        for op in &history {
            apply(&hub, &clients, op);
        }

        let target = &clients[client];
        let products = product_ids(&[product]);
        let was_member = hub.channel(feed).is_subscribed(target.id(), &products[0]);
        prop_assume!(!was_member);

        let before = snapshot(&hub);
        hub.subscribe(target, feed, &products).unwrap();
        prop_assert!(hub.channel(feed).is_subscribed(target.id(), &products[0]));
        hub.unsubscribe(target.id(), feed, &products);

        prop_assert_eq!(snapshot(&hub), before);
    }

    #[test]
    fn prop_unsubscribe_all_removes_client_everywhere(
        history in proptest::collection::vec(op_strategy(3), 0..40),
        client in 0usize..3,
    ) {
        let hub = hub();
        let clients = connect_clients(&hub, 3);
        for op in &history {
            apply(&hub, &clients, op);
        }

        let target = clients[client].id();
        let mut expected = snapshot(&hub);
        for ids in expected.values_mut() {
            ids.retain(|id| *id != target);
        }

        hub.unsubscribe_all(target);

        prop_assert!(hub.subscriptions(target).is_empty());
        prop_assert_eq!(snapshot(&hub), expected);
    }

    #[test]
    fn prop_subscribe_is_idempotent(
        feed in feed_strategy(),
        products in products_strategy(),
    ) {
        let hub = hub();
        let clients = connect_clients(&hub, 1);
        let products = product_ids(&products);

        hub.subscribe(&clients[0], feed, &products).unwrap();
        let once = snapshot(&hub);
        hub.subscribe(&clients[0], feed, &products).unwrap();

        prop_assert_eq!(snapshot(&hub), once);
    }
}
