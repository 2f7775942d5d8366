mod support;

use std::{sync::Arc, time::Duration};

use orderline::{
    application::ingest::{Disposition, IngestConsumer, IngestOutcome, MessageStream},
    cache::OrderLookup,
    domain::order::OrderUid,
    infra::{memory::InMemoryOrders, stream},
};
use tokio::{sync::watch, time::timeout};

use support::{channel_options, harness, harness_with_repo, order_bytes, order_json};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn valid_order_is_stored_cached_and_acked() {
    let h = harness(8);

    let outcome = h.pipeline.process(&order_bytes("order-1")).await;

    assert_eq!(
        outcome,
        IngestOutcome::Stored {
            uid: OrderUid::new("order-1")
        }
    );
    assert_eq!(outcome.disposition(), Disposition::Ack);
    assert!(h.repo.get(&OrderUid::new("order-1")).await.is_some());

    let cached = h.cache.get(&OrderUid::new("order-1")).expect("cached");
    assert_eq!(cached.payment.amount, 1817);
}

#[tokio::test]
async fn redelivered_message_is_a_benign_duplicate() {
    let h = harness(8);
    let payload = order_bytes("order-1");

    let first = h.pipeline.process(&payload).await;
    let second = h.pipeline.process(&payload).await;

    assert!(matches!(first, IngestOutcome::Stored { .. }));
    assert_eq!(
        second,
        IngestOutcome::Duplicate {
            uid: OrderUid::new("order-1")
        }
    );
    assert_eq!(first.disposition(), Disposition::Ack);
    assert_eq!(second.disposition(), Disposition::Ack);
    assert_eq!(h.repo.len().await, 1);
    assert!(h.cache.contains(&OrderUid::new("order-1")));
}

#[tokio::test]
async fn concurrent_deliveries_of_one_order_store_it_once() {
    let h = harness(8);
    h.repo.set_latency(Some(Duration::from_millis(50))).await;
    let payload = order_bytes("order-1");

    let (first, second) = tokio::join!(
        h.pipeline.process(&payload),
        h.pipeline.process(&payload)
    );

    let outcomes = [first, second];
    let stored = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, IngestOutcome::Stored { .. }))
        .count();
    let duplicates = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, IngestOutcome::Duplicate { .. }))
        .count();
    assert_eq!((stored, duplicates), (1, 1), "got {outcomes:?}");
    for outcome in &outcomes {
        assert_eq!(outcome.disposition(), Disposition::Ack);
    }
    assert_eq!(h.repo.len().await, 1);
    assert!(h.cache.contains(&OrderUid::new("order-1")));
}

#[tokio::test]
async fn duplicate_refreshes_an_evicted_cache_entry() {
    let repo = Arc::new(InMemoryOrders::new());
    let h = harness_with_repo(1, repo);

    h.pipeline.process(&order_bytes("a")).await;
    h.pipeline.process(&order_bytes("b")).await;
    assert!(!h.cache.contains(&OrderUid::new("a")));

    let outcome = h.pipeline.process(&order_bytes("a")).await;

    assert!(matches!(outcome, IngestOutcome::Duplicate { .. }));
    assert!(h.cache.contains(&OrderUid::new("a")));
}

#[tokio::test]
async fn malformed_payload_is_acked_and_dropped() {
    let h = harness(8);

    let outcome = h.pipeline.process(b"Invalid message").await;

    assert_eq!(outcome, IngestOutcome::DecodeFailed);
    assert_eq!(outcome.disposition(), Disposition::Ack);
    assert!(h.repo.is_empty().await);
    assert!(h.cache.is_empty());
}

#[tokio::test]
async fn invalid_order_reports_each_problem_and_is_acked() {
    let h = harness(8);
    let mut order = order_json("order-1");
    order["order_uid"] = "".into();
    order["locale"] = "".into();
    order["delivery"]["email"] = "".into();
    let payload = serde_json::to_vec(&order).expect("serializes");

    let outcome = h.pipeline.process(&payload).await;

    let IngestOutcome::ValidationFailed(problems) = &outcome else {
        panic!("expected validation failure, got {outcome:?}");
    };
    assert_eq!(problems.len(), 3);
    for field in ["order_uid", "locale", "delivery"] {
        assert!(problems.contains(field), "missing {field}");
    }
    assert_eq!(outcome.disposition(), Disposition::Ack);
    assert!(h.repo.is_empty().await);
    assert!(h.cache.is_empty());
}

#[tokio::test]
async fn store_outage_leaves_message_for_retry() {
    let h = harness(8);
    h.repo.set_available(false);

    let outcome = h.pipeline.process(&order_bytes("order-1")).await;

    assert_eq!(outcome, IngestOutcome::PersistFailed);
    assert_eq!(outcome.disposition(), Disposition::Retry);
    assert!(h.cache.is_empty());
}

#[tokio::test]
async fn slow_store_counts_as_failure() {
    let h = harness(8);
    h.repo
        .set_latency(Some(support::STORE_TIMEOUT * 4))
        .await;

    let outcome = h.pipeline.process(&order_bytes("order-1")).await;

    assert_eq!(outcome, IngestOutcome::PersistFailed);
    assert!(h.cache.is_empty());
}

#[tokio::test]
async fn consumer_drains_stream_and_acks_everything_processed() {
    let h = harness(8);
    let (publisher, order_stream) =
        stream::channel(channel_options(Duration::from_millis(5), 64 * 1024));

    publisher.publish(order_bytes("a")).expect("publish");
    publisher.publish(order_bytes("b")).expect("publish");
    publisher.publish(order_bytes("a")).expect("publish");
    publisher.publish("Invalid message").expect("publish");
    drop(publisher);

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer = IngestConsumer::new(h.pipeline.clone(), 2);
    let stream_handle: Arc<dyn MessageStream> = order_stream.clone();

    let report = timeout(WAIT, consumer.run(stream_handle, shutdown_rx))
        .await
        .expect("consumer finishes once the stream closes");

    assert_eq!(report.received, 4);
    assert_eq!(report.acked, 4);
    assert_eq!(report.retried, 0);
    assert_eq!(order_stream.in_flight(), 0);
    assert_eq!(h.repo.len().await, 2);
    assert_eq!(h.cache.len(), 2);
}

#[tokio::test]
async fn failed_persist_is_redelivered_until_store_recovers() {
    let h = harness(8);
    h.repo.set_available(false);
    let (publisher, order_stream) =
        stream::channel(channel_options(Duration::from_millis(10), 64 * 1024));
    publisher.publish(order_bytes("order-1")).expect("publish");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer = IngestConsumer::new(h.pipeline.clone(), 1);
    let stream_handle: Arc<dyn MessageStream> = order_stream.clone();
    let running = tokio::spawn(async move { consumer.run(stream_handle, shutdown_rx).await });

    timeout(WAIT, async {
        while order_stream.redelivered() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("message was rejected at least once");
    assert!(h.repo.is_empty().await);

    h.repo.set_available(true);
    timeout(WAIT, async {
        while !h.cache.contains(&OrderUid::new("order-1")) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("order stored after recovery");

    shutdown_tx.send_replace(true);
    let report = timeout(WAIT, running)
        .await
        .expect("consumer stops on shutdown")
        .expect("consumer task joins");

    assert!(report.retried >= 1);
    assert_eq!(report.acked, 1);
    assert_eq!(h.repo.len().await, 1);
}

#[tokio::test]
async fn shutdown_stops_an_idle_consumer() {
    let h = harness(8);
    let (_publisher, order_stream) =
        stream::channel(channel_options(Duration::from_millis(5), 1024));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer = IngestConsumer::new(h.pipeline.clone(), 4);
    let running = tokio::spawn(async move { consumer.run(order_stream, shutdown_rx).await });

    tokio::time::sleep(Duration::from_millis(20)).await;
    shutdown_tx.send_replace(true);

    let report = timeout(WAIT, running)
        .await
        .expect("consumer stops on shutdown")
        .expect("consumer task joins");
    assert_eq!(report.received, 0);
}
