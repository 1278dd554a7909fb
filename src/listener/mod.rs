//! Listener abstraction and the shared receive loop
//!
//! A [`Listener`] describes *what* to subscribe to and how to react; a
//! [`ListenerWorker`] owns the broker connection and is the unit that gets
//! scheduled. Concrete listeners implement [`MessageHandler`] and delegate
//! their `run` to [`receive_loop`], which gives every variant the same
//! protocol:
//!
//! 1. subscribe on the connection in the listener's [`SubscriptionMode`]
//! 2. consume the subscription stream in broker order
//! 3. hand items of the expected kind to the handler after UTF-8 decoding,
//!    skipping messages that fail to decode
//! 4. ignore every other item (subscription confirmations included)
//!
//! The loop ends only with an error: a closed stream is reported as a
//! connection error.

use crate::broker::{
    BrokerConnection, BrokerError, ChannelNamespace, Connector, DecodedMessage, SubscriptionMode,
};
use crate::config::ReconnectSection;
use crate::error::{ListenerError, ListenerResult};
use crate::observability::{metrics, ListenerStats};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub mod data_client;
pub mod new_client;

pub use data_client::{ClientDataRecord, DataClientListener};
pub use new_client::NewClientListener;

/// Subscription behavior of a listener
#[async_trait]
pub trait Listener: Send + Sync {
    /// Stable name used in logs and metrics
    fn name(&self) -> &str;

    /// Namespace the listener's channels live in
    fn namespace(&self) -> &ChannelNamespace;

    /// Topic appended to the namespace prefix; `None` for a listener that
    /// was never given one
    fn subscribe_topic(&self) -> Option<&str> {
        None
    }

    /// Exact or pattern subscription; exact unless overridden
    fn mode(&self) -> SubscriptionMode {
        SubscriptionMode::Exact
    }

    /// Counters for this listener, registered globally by name
    fn stats(&self) -> Arc<ListenerStats> {
        metrics().listener(self.name())
    }

    /// `{prefix}:{subscribe_topic}`
    fn channel_name(&self) -> ListenerResult<String> {
        let topic = self
            .subscribe_topic()
            .ok_or_else(|| ListenerError::missing_topic(self.name()))?;
        Ok(self.namespace().channel(topic))
    }

    /// Receive loop; every concrete listener provides its own
    async fn run<C>(&self, connection: &mut C) -> ListenerResult<()>
    where
        C: BrokerConnection,
    {
        let _ = connection;
        Err(ListenerError::unimplemented(self.name()))
    }
}

/// Reaction to one decoded message
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn on_message<C>(&self, connection: &mut C, message: DecodedMessage) -> ListenerResult<()>
    where
        C: BrokerConnection;
}

/// Subscribe and dispatch until the subscription ends
pub async fn receive_loop<L, C>(listener: &L, connection: &mut C) -> ListenerResult<()>
where
    L: Listener + MessageHandler + ?Sized,
    C: BrokerConnection,
{
    let channel = listener.channel_name()?;
    let mode = listener.mode();
    let expected = mode.expected_kind();
    let stats = listener.stats();

    let mut messages = connection.subscribe(mode, &channel).await?;
    info!(channel = %channel, mode = %mode, "Listening");

    while let Some(item) = messages.next().await {
        let message = item?;

        if message.kind != expected {
            stats.message_ignored();
            debug!(kind = message.kind.as_str(), "Ignoring non-message item");
            continue;
        }
        stats.message_received();

        let decoded = match message.decode() {
            Ok(decoded) => decoded,
            Err(e) => {
                stats.decode_failed();
                warn!(error = %e, "Skipping undecodable message");
                continue;
            }
        };

        match listener.on_message(connection, decoded).await {
            Ok(()) => stats.message_handled(),
            Err(e) if e.is_recoverable() => {
                stats.decode_failed();
                warn!(error = %e, "Skipping message rejected by handler");
            }
            Err(e) => {
                stats.handler_failed();
                return Err(e);
            }
        }
    }

    Err(BrokerError::StreamClosed { channel }.into())
}

/// Owns one listener and its exclusive broker connection
pub struct ListenerWorker<L, K: Connector> {
    listener: L,
    connector: K,
    connection: Option<K::Connection>,
    reconnect: ReconnectSection,
    stats: Arc<ListenerStats>,
}

impl<L, K> ListenerWorker<L, K>
where
    L: Listener,
    K: Connector,
{
    pub fn new(listener: L, connector: K) -> Self {
        let stats = listener.stats();
        Self {
            listener,
            connector,
            connection: None,
            reconnect: ReconnectSection::default(),
            stats,
        }
    }

    /// Retry policy for connection errors; the default never retries
    pub fn with_reconnect(mut self, reconnect: ReconnectSection) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn name(&self) -> &str {
        self.listener.name()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Connection owned by this worker, opened on the first call and
    /// returned unchanged afterwards
    pub async fn connect(&mut self) -> ListenerResult<&mut K::Connection> {
        ensure_connection(&mut self.connection, &self.connector, &self.stats).await
    }

    /// Run the listener until it fails for good
    ///
    /// Connection errors are retried per the reconnect policy; the attempt
    /// counter resets once a connection has delivered a message. Any other
    /// error ends the worker immediately.
    pub async fn run(mut self) -> ListenerResult<()> {
        let mut attempt = 0u32;

        loop {
            let received_before = self.stats.messages_received();
            let error = match self.run_once().await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            if !error.is_connection_error() {
                return Err(error);
            }

            self.connection = None;
            self.stats.connection_failed();

            if self.stats.messages_received() > received_before {
                attempt = 0;
            }
            attempt += 1;

            if attempt > self.reconnect.max_attempts {
                return Err(error);
            }

            let delay = self.reconnect.backoff_delay(attempt);
            warn!(
                error = %error,
                attempt,
                max_attempts = self.reconnect.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Connection lost, reconnecting"
            );
            self.stats.reconnect_scheduled();
            tokio::time::sleep(delay).await;
        }
    }

    async fn run_once(&mut self) -> ListenerResult<()> {
        let connection =
            ensure_connection(&mut self.connection, &self.connector, &self.stats).await?;
        self.listener.run(connection).await
    }
}

/// Connection held in `slot`, opened through `connector` only when empty
async fn ensure_connection<'a, K: Connector>(
    slot: &'a mut Option<K::Connection>,
    connector: &K,
    stats: &ListenerStats,
) -> ListenerResult<&'a mut K::Connection> {
    let connection = match slot.take() {
        Some(connection) => connection,
        None => {
            stats.connection_attempt();
            let connection = connector.connect().await?;
            stats.connection_established();
            debug!(broker = %connector.address(), "Broker connection ready");
            connection
        }
    };
    Ok(slot.insert(connection))
}
