//! Test helpers and utilities for integration tests

use std::time::Duration;
use tokio::task::JoinHandle;
use wshub_listener::broker::Connector;
use wshub_listener::config::HubConfig;
use wshub_listener::error::ListenerResult;
use wshub_listener::listener::Listener;
use wshub_listener::testing::MemoryBroker;

/// Default wait for anything crossing a task boundary
#[allow(dead_code)]
pub const WAIT: Duration = Duration::from_secs(2);

/// Create a test configuration pointing at a local broker
#[allow(dead_code)]
pub fn test_config() -> HubConfig {
    HubConfig::default()
}

/// Run `listener` on its own connection to `broker` and wait until it has
/// subscribed
#[allow(dead_code)]
pub async fn start_listener<L>(broker: &MemoryBroker, listener: L) -> JoinHandle<ListenerResult<()>>
where
    L: Listener + 'static,
{
    let before = broker.subscription_count();
    let mut connection = broker.connect().await.unwrap();
    let handle = tokio::spawn(async move { listener.run(&mut connection).await });

    assert!(
        broker.wait_for_subscriptions(before + 1, WAIT).await,
        "listener did not subscribe in time"
    );
    handle
}

/// Poll `condition` until it holds or `WAIT` elapses
#[allow(dead_code)]
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .is_ok()
}
