//! Redis pub/sub adapter
//!
//! Each [`RedisConnection`] holds a multiplexed connection used for
//! `PUBLISH` and opens a dedicated pub/sub connection per subscription,
//! since a connection in subscribed state cannot issue other commands.

use super::{
    parse_broker_url, redact_broker_url, BrokerConnection, BrokerError, BrokerResult, Connector,
    InboundMessage, MessageKind, MessageStream, SubscriptionMode,
};
use crate::broker_span;
use ::redis::aio::MultiplexedConnection;
use ::redis::{AsyncCommands, Client, Msg};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tracing::{debug, Instrument};
use url::Url;

/// Connector for a Redis-compatible broker
#[derive(Debug, Clone)]
pub struct RedisConnector {
    url: Url,
}

impl RedisConnector {
    pub fn new(broker_url: &str) -> BrokerResult<Self> {
        Ok(Self {
            url: parse_broker_url(broker_url)?,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Connector for RedisConnector {
    type Connection = RedisConnection;

    fn address(&self) -> String {
        redact_broker_url(&self.url)
    }

    async fn connect(&self) -> BrokerResult<RedisConnection> {
        let address = self.address();
        async {
            let client = Client::open(self.url.as_str())
                .map_err(|e| BrokerError::ConnectionFailed(Box::new(e)))?;
            let publisher = client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| BrokerError::ConnectionFailed(Box::new(e)))?;

            debug!("Connected to broker");
            Ok(RedisConnection { client, publisher })
        }
        .instrument(broker_span!(broker = %address, op = "connect"))
        .await
    }
}

/// Connection owned by a single listener worker
pub struct RedisConnection {
    client: Client,
    publisher: MultiplexedConnection,
}

#[async_trait]
impl BrokerConnection for RedisConnection {
    async fn subscribe(
        &mut self,
        mode: SubscriptionMode,
        channel: &str,
    ) -> BrokerResult<MessageStream> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| BrokerError::ConnectionFailed(Box::new(e)))?;

        let subscribed = match mode {
            SubscriptionMode::Exact => pubsub.subscribe(channel).await,
            SubscriptionMode::Pattern => pubsub.psubscribe(channel).await,
        };
        subscribed.map_err(|e| BrokerError::SubscriptionFailed {
            channel: channel.to_string(),
            source: Box::new(e),
        })?;

        debug!(channel, %mode, "Broker subscription open");

        // The client consumes subscribe confirmations itself, so only
        // published items reach the stream.
        Ok(pubsub
            .into_on_message()
            .map(|msg| Ok(inbound_from_msg(&msg)))
            .boxed())
    }

    async fn publish(&mut self, channel: &str, payload: &[u8]) -> BrokerResult<usize> {
        let receivers: usize = self
            .publisher
            .publish(channel, payload)
            .await
            .map_err(|e| BrokerError::PublishFailed {
                channel: channel.to_string(),
                source: Box::new(e),
            })?;
        Ok(receivers)
    }
}

/// Translate a Redis pub/sub item without interpreting its bytes
fn inbound_from_msg(msg: &Msg) -> InboundMessage {
    let channel: Vec<u8> = msg.get_channel().unwrap_or_default();
    let payload = Bytes::copy_from_slice(msg.get_payload_bytes());

    if msg.from_pattern() {
        let pattern: Option<Vec<u8>> = msg.get_pattern().ok();
        InboundMessage {
            kind: MessageKind::PatternMessage,
            channel: Bytes::from(channel),
            pattern: pattern.map(Bytes::from),
            payload,
        }
    } else {
        InboundMessage::message(channel, payload)
    }
}
