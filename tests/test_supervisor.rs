//! Supervisor tests against the in-memory broker
//!
//! The supervisor starts both listeners at once; these tests drive traffic
//! through the shared broker and observe both listeners working
//! independently, and what happens when the broker goes away.

mod test_helpers;

use std::sync::Arc;
use std::time::Duration;
use test_helpers::{eventually, test_config, WAIT};
use tokio::sync::mpsc;
use wshub_listener::config::{HubConfig, ReconnectSection};
use wshub_listener::error::ListenerError;
use wshub_listener::observability::MetricsCollector;
use wshub_listener::supervisor::Supervisor;
use wshub_listener::testing::MemoryBroker;

/// Supervisor counting into its own registry, so parallel tests do not
/// share listener counters
fn supervisor(config: &HubConfig, broker: &MemoryBroker) -> Supervisor<MemoryBroker> {
    Supervisor::new(config, broker.clone())
        .unwrap()
        .with_metrics(Arc::new(MetricsCollector::new()))
}

fn fast_reconnect(max_attempts: u32) -> ReconnectSection {
    ReconnectSection {
        max_attempts,
        backoff_pattern_ms: vec![1, 2],
        sustained_delay_ms: 5,
    }
}

#[tokio::test]
async fn test_supervisor_runs_both_listeners() {
    let broker = MemoryBroker::new();
    let (tx, mut rx) = mpsc::channel(8);
    let handles = supervisor(&test_config(), &broker)
        .with_data_sink(tx)
        .start();

    assert!(broker.wait_for_subscriptions(2, WAIT).await);

    broker.publish("ws-hub:client-new", "c7");
    broker.publish("ws-hub:client-data:c7", "ping");

    assert!(broker.wait_for_published("ws-hub:groups-new:c7", 1, WAIT).await);
    let record = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(record.client_id.as_deref(), Some("c7"));
    assert_eq!(record.payload, "ping");

    for handle in &handles {
        assert!(!handle.is_finished());
        handle.abort();
    }
}

#[tokio::test]
async fn test_each_listener_owns_a_connection() {
    let broker = MemoryBroker::new();
    let handles = supervisor(&test_config(), &broker).start();

    assert!(broker.wait_for_subscriptions(2, WAIT).await);
    assert_eq!(broker.connections_opened(), 2);

    for handle in &handles {
        handle.abort();
    }
}

#[tokio::test]
async fn test_configured_prefix_and_groups_reach_listeners() {
    let broker = MemoryBroker::new();
    let config = HubConfig::from_toml_str(
        r#"
[broker]
prefix = "tenant"

[listeners]
initial_groups = ["vip"]
"#,
    )
    .unwrap();
    let handles = supervisor(&config, &broker).start();
    assert!(broker.wait_for_subscriptions(2, WAIT).await);

    broker.publish("tenant:client-new", "c1");

    assert!(broker.wait_for_published("tenant:groups-new:c1", 1, WAIT).await);
    assert_eq!(broker.published_on("tenant:groups-new:c1"), vec!["vip"]);

    for handle in &handles {
        handle.abort();
    }
}

#[tokio::test]
async fn test_lost_connection_stops_listeners_without_reconnect() {
    let broker = MemoryBroker::new();
    let handles = supervisor(&test_config(), &broker).start();
    assert!(broker.wait_for_subscriptions(2, WAIT).await);

    broker.fail_all("connection reset");

    for handle in handles {
        let result = tokio::time::timeout(WAIT, handle.join())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(ListenerError::Connection(_))));
    }
    assert_eq!(broker.connections_opened(), 2);
}

#[tokio::test]
async fn test_listeners_resubscribe_when_reconnect_enabled() {
    let broker = MemoryBroker::new();
    let mut config = test_config();
    config.reconnect = fast_reconnect(3);

    let handles = supervisor(&config, &broker).start();
    assert!(broker.wait_for_subscriptions(2, WAIT).await);

    broker.disconnect_all();
    assert!(eventually(|| broker.connections_opened() == 4).await);
    assert!(broker.wait_for_subscriptions(2, WAIT).await);

    broker.publish("ws-hub:client-new", "after-reconnect");
    assert!(
        broker
            .wait_for_published("ws-hub:groups-new:after-reconnect", 1, WAIT)
            .await
    );

    for handle in &handles {
        handle.abort();
    }
}

#[tokio::test]
async fn test_reconnect_gives_up_after_max_attempts() {
    let broker = MemoryBroker::new();
    let mut config = test_config();
    config.reconnect = fast_reconnect(2);

    let handles = supervisor(&config, &broker).start();
    assert!(broker.wait_for_subscriptions(2, WAIT).await);

    broker.set_unreachable(true);
    broker.disconnect_all();

    for handle in handles {
        let result = tokio::time::timeout(Duration::from_secs(5), handle.join())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(ListenerError::Connection(_))));
    }
}

#[tokio::test]
async fn test_unreachable_broker_at_startup_ends_every_listener() {
    let broker = MemoryBroker::unreachable();
    let handles = supervisor(&test_config(), &broker).start();

    for handle in handles {
        let name = handle.name().to_string();
        let result = tokio::time::timeout(WAIT, handle.join())
            .await
            .unwrap()
            .unwrap();
        assert!(
            matches!(result, Err(ListenerError::Connection(_))),
            "{name} should fail with a connection error"
        );
    }
    assert_eq!(broker.subscription_count(), 0);
}
