#![allow(dead_code)]

use std::{num::NonZeroUsize, sync::Arc, time::Duration};

use orderline::{
    application::ingest::IngestPipeline,
    cache::{CacheConfig, OrderCache},
    domain::order::Order,
    infra::{memory::InMemoryOrders, stream::ChannelOptions},
};
use serde_json::{Value, json};

pub const STORE_TIMEOUT: Duration = Duration::from_millis(500);

/// A complete order payload that passes validation.
pub fn order_json(uid: &str) -> Value {
    json!({
        "order_uid": uid,
        "track_number": "WBILMTESTTRACK",
        "entry": "WBIL",
        "delivery": {
            "name": "Test Testov",
            "phone": "+9720000000",
            "zip": "2639809",
            "city": "Kiryat Mozkin",
            "address": "Ploshad Mira 15",
            "region": "Kraiot",
            "email": "test@gmail.com"
        },
        "payment": {
            "transaction": uid,
            "request_id": "",
            "currency": "USD",
            "provider": "wbpay",
            "amount": 1817,
            "payment_dt": 1637907727,
            "bank": "alpha",
            "delivery_cost": 1500,
            "goods_total": 317,
            "custom_fee": 0
        },
        "items": [{
            "chrt_id": 9934930,
            "track_number": "WBILMTESTTRACK",
            "price": 453,
            "rid": "ab4219087a764ae0btest",
            "name": "Mascaras",
            "sale": 30,
            "size": "0",
            "total_price": 317,
            "nm_id": 2389212,
            "brand": "Vivienne Sabo",
            "status": 202
        }],
        "locale": "en",
        "internal_signature": "",
        "customer_id": "test",
        "delivery_service": "meest",
        "shardkey": "9",
        "sm_id": 99,
        "date_created": "2021-11-26T06:22:19Z",
        "oof_shard": "1"
    })
}

pub fn order_bytes(uid: &str) -> Vec<u8> {
    serde_json::to_vec(&order_json(uid)).expect("order json serializes")
}

pub fn order(uid: &str) -> Order {
    serde_json::from_value(order_json(uid)).expect("order json decodes")
}

pub struct Harness {
    pub repo: Arc<InMemoryOrders>,
    pub cache: Arc<OrderCache>,
    pub pipeline: IngestPipeline,
}

pub fn cache_config(capacity: usize) -> CacheConfig {
    CacheConfig::new(NonZeroUsize::new(capacity).expect("non-zero capacity"))
}

/// Channel transport options with an ack wait long enough that tests never
/// hit it unless they ask to.
pub fn channel_options(redelivery_delay: Duration, max_payload_bytes: usize) -> ChannelOptions {
    ChannelOptions {
        redelivery_delay,
        ack_wait: Duration::from_secs(30),
        max_payload_bytes,
    }
}

pub fn harness(capacity: usize) -> Harness {
    harness_with_repo(capacity, Arc::new(InMemoryOrders::new()))
}

pub fn harness_with_repo(capacity: usize, repo: Arc<InMemoryOrders>) -> Harness {
    let cache = Arc::new(OrderCache::new(&cache_config(capacity)));
    let pipeline = IngestPipeline::new(repo.clone(), cache.clone(), STORE_TIMEOUT);
    Harness {
        repo,
        cache,
        pipeline,
    }
}
