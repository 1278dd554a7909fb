//! In-process broker for tests
//!
//! Behaves like a Redis pub/sub server as far as listeners can tell: exact
//! and glob pattern subscriptions, `subscribe`/`psubscribe` confirmations as
//! the first stream item, and publishes that return the receiver count. Every
//! publish is recorded so tests can assert on outbound traffic.

use crate::broker::{
    BrokerConnection, BrokerError, BrokerResult, Connector, InboundMessage, MessageStream,
    SubscriptionMode,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::channel::mpsc;
use futures::StreamExt;
use globset::{Glob, GlobMatcher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// One publish seen by the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub channel: String,
    pub payload: Bytes,
}

struct Subscriber {
    mode: SubscriptionMode,
    channel: String,
    matcher: Option<GlobMatcher>,
    sender: mpsc::UnboundedSender<BrokerResult<InboundMessage>>,
}

impl Subscriber {
    fn delivery_for(&self, channel: &str, payload: &Bytes) -> Option<InboundMessage> {
        match self.mode {
            SubscriptionMode::Exact if self.channel == channel => {
                Some(InboundMessage::message(channel.to_string(), payload.clone()))
            }
            SubscriptionMode::Pattern
                if self.matcher.as_ref().is_some_and(|m| m.is_match(channel)) =>
            {
                Some(InboundMessage::pattern_message(
                    self.channel.clone(),
                    channel.to_string(),
                    payload.clone(),
                ))
            }
            _ => None,
        }
    }
}

#[derive(Default)]
struct BrokerState {
    subscribers: Vec<Subscriber>,
    published: Vec<PublishedMessage>,
    unreachable: bool,
    connections_opened: usize,
}

impl BrokerState {
    fn prune(&mut self) {
        self.subscribers.retain(|s| !s.sender.is_closed());
    }
}

/// Shared handle to an in-memory broker; clones see the same state
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Broker refusing every connection
    pub fn unreachable() -> Self {
        let broker = Self::new();
        broker.set_unreachable(true);
        broker
    }

    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Refuse (or accept again) new connections, subscriptions and publishes
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state().unreachable = unreachable;
    }

    /// Publish to every matching subscriber, returning how many received it
    pub fn publish(&self, channel: &str, payload: impl Into<Bytes>) -> usize {
        let payload = payload.into();
        let mut state = self.state();
        state.published.push(PublishedMessage {
            channel: channel.to_string(),
            payload: payload.clone(),
        });
        state.prune();

        state
            .subscribers
            .iter()
            .filter_map(|s| {
                s.delivery_for(channel, &payload)
                    .map(|item| s.sender.unbounded_send(Ok(item)).is_ok())
            })
            .filter(|delivered| *delivered)
            .count()
    }

    /// Push a raw item to every live subscription, bypassing matching
    pub fn inject(&self, item: InboundMessage) -> usize {
        let mut state = self.state();
        state.prune();
        state
            .subscribers
            .iter()
            .filter(|s| s.sender.unbounded_send(Ok(item.clone())).is_ok())
            .count()
    }

    /// Drop every subscription; their streams end as if the connection
    /// had been closed
    pub fn disconnect_all(&self) {
        self.state().subscribers.clear();
    }

    /// Deliver an error to every subscription, then drop them
    pub fn fail_all(&self, reason: &str) {
        let mut state = self.state();
        for subscriber in state.subscribers.drain(..) {
            let _ = subscriber
                .sender
                .unbounded_send(Err(BrokerError::ConnectionLost(reason.to_string())));
        }
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.state().published.clone()
    }

    /// Payloads published on one channel, in order
    pub fn published_on(&self, channel: &str) -> Vec<Bytes> {
        self.state()
            .published
            .iter()
            .filter(|p| p.channel == channel)
            .map(|p| p.payload.clone())
            .collect()
    }

    /// Number of live subscriptions
    pub fn subscription_count(&self) -> usize {
        let mut state = self.state();
        state.prune();
        state.subscribers.len()
    }

    pub fn connections_opened(&self) -> usize {
        self.state().connections_opened
    }

    /// Wait until at least `count` subscriptions are live
    pub async fn wait_for_subscriptions(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, || self.subscription_count() >= count)
            .await
    }

    /// Wait until `channel` has received at least `count` publishes
    pub async fn wait_for_published(&self, channel: &str, count: usize, timeout: Duration) -> bool {
        self.wait_until(timeout, || self.published_on(channel).len() >= count)
            .await
    }

    async fn wait_until(&self, timeout: Duration, condition: impl Fn() -> bool) -> bool {
        tokio::time::timeout(timeout, async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .is_ok()
    }
}

#[async_trait]
impl Connector for MemoryBroker {
    type Connection = MemoryConnection;

    fn address(&self) -> String {
        "memory://".to_string()
    }

    async fn connect(&self) -> BrokerResult<MemoryConnection> {
        let mut state = self.state();
        if state.unreachable {
            return Err(BrokerError::ConnectionFailed(
                "memory broker unreachable".into(),
            ));
        }
        state.connections_opened += 1;
        Ok(MemoryConnection {
            broker: self.clone(),
            id: state.connections_opened,
        })
    }
}

/// Connection to a [`MemoryBroker`]
pub struct MemoryConnection {
    broker: MemoryBroker,
    id: usize,
}

impl MemoryConnection {
    /// Sequence number of this connection on its broker, starting at 1
    pub fn id(&self) -> usize {
        self.id
    }
}

#[async_trait]
impl BrokerConnection for MemoryConnection {
    async fn subscribe(
        &mut self,
        mode: SubscriptionMode,
        channel: &str,
    ) -> BrokerResult<MessageStream> {
        let matcher = match mode {
            SubscriptionMode::Exact => None,
            SubscriptionMode::Pattern => Some(
                Glob::new(channel)
                    .map_err(|e| BrokerError::SubscriptionFailed {
                        channel: channel.to_string(),
                        source: Box::new(e),
                    })?
                    .compile_matcher(),
            ),
        };

        let mut state = self.broker.state();
        if state.unreachable {
            return Err(BrokerError::ConnectionLost(
                "memory broker unreachable".to_string(),
            ));
        }

        let (sender, receiver) = mpsc::unbounded();
        let confirmation = match mode {
            SubscriptionMode::Exact => "subscribe",
            SubscriptionMode::Pattern => "psubscribe",
        };
        let _ = sender.unbounded_send(Ok(InboundMessage::control(
            confirmation,
            channel.to_string(),
            1,
        )));

        state.subscribers.push(Subscriber {
            mode,
            channel: channel.to_string(),
            matcher,
            sender,
        });

        Ok(receiver.boxed())
    }

    async fn publish(&mut self, channel: &str, payload: &[u8]) -> BrokerResult<usize> {
        if self.broker.state().unreachable {
            return Err(BrokerError::PublishFailed {
                channel: channel.to_string(),
                source: "memory broker unreachable".into(),
            });
        }
        Ok(self
            .broker
            .publish(channel, Bytes::copy_from_slice(payload)))
    }
}
