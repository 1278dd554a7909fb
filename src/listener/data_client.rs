//! Observer for data sent by clients
//!
//! Pattern-subscribes to `{prefix}:client-data:*` and surfaces each message
//! as a [`ClientDataRecord`]. Nothing is published back; without an attached
//! sink the record only reaches the log.

use super::{receive_loop, Listener, MessageHandler};
use crate::broker::channel::SEPARATOR;
use crate::broker::{topics, BrokerConnection, ChannelNamespace, DecodedMessage, SubscriptionMode};
use crate::error::ListenerResult;
use crate::observability::{metrics, ListenerStats};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{info, warn};

/// Diagnostic record for one client-data message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientDataRecord {
    /// Concrete channel the message arrived on
    pub channel: String,
    /// Trailing segment of the channel, when it follows `client-data:`
    pub client_id: Option<String>,
    pub payload: String,
    pub received_at: DateTime<Utc>,
}

impl ClientDataRecord {
    pub fn new(namespace: &ChannelNamespace, message: DecodedMessage) -> Self {
        let client_id = namespace
            .topic_of(&message.channel)
            .and_then(|topic| topic.strip_prefix(topics::CLIENT_DATA))
            .and_then(|rest| rest.strip_prefix(SEPARATOR))
            .map(str::to_string);

        Self {
            channel: message.channel,
            client_id,
            payload: message.payload,
            received_at: Utc::now(),
        }
    }
}

/// Logs every client-data message and optionally forwards it
pub struct DataClientListener {
    namespace: ChannelNamespace,
    sink: Option<mpsc::Sender<ClientDataRecord>>,
    stats: Arc<ListenerStats>,
}

impl DataClientListener {
    pub const NAME: &'static str = "data-client";

    pub fn new(namespace: ChannelNamespace) -> Self {
        Self {
            namespace,
            sink: None,
            stats: metrics().listener(Self::NAME),
        }
    }

    /// Forward records to `sink` in addition to logging them
    ///
    /// Forwarding never waits: a record that does not fit in the sink is
    /// dropped with a warning so the receive loop keeps pace with the broker.
    pub fn with_sink(mut self, sink: mpsc::Sender<ClientDataRecord>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Count into `stats` instead of the global registry
    pub fn with_stats(mut self, stats: Arc<ListenerStats>) -> Self {
        self.stats = stats;
        self
    }
}

#[async_trait]
impl Listener for DataClientListener {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn namespace(&self) -> &ChannelNamespace {
        &self.namespace
    }

    fn subscribe_topic(&self) -> Option<&str> {
        Some(topics::CLIENT_DATA_PATTERN)
    }

    fn mode(&self) -> SubscriptionMode {
        SubscriptionMode::Pattern
    }

    fn stats(&self) -> Arc<ListenerStats> {
        self.stats.clone()
    }

    async fn run<C>(&self, connection: &mut C) -> ListenerResult<()>
    where
        C: BrokerConnection,
    {
        receive_loop(self, connection).await
    }
}

#[async_trait]
impl MessageHandler for DataClientListener {
    async fn on_message<C>(&self, _connection: &mut C, message: DecodedMessage) -> ListenerResult<()>
    where
        C: BrokerConnection,
    {
        let record = ClientDataRecord::new(&self.namespace, message);
        info!(
            channel = %record.channel,
            client_id = record.client_id.as_deref().unwrap_or(""),
            payload = %record.payload,
            "Data from client"
        );

        if let Some(sink) = &self.sink {
            match sink.try_send(record) {
                Ok(()) => {}
                Err(TrySendError::Full(record)) => {
                    warn!(channel = %record.channel, "Client data sink full, record dropped");
                }
                Err(TrySendError::Closed(record)) => {
                    warn!(channel = %record.channel, "Client data sink closed, record dropped");
                }
            }
        }
        Ok(())
    }
}
