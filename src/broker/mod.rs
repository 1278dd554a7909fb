//! Broker abstraction for listener connections
//!
//! A [`Connector`] knows how to reach the broker; each listener worker asks it
//! for its own [`BrokerConnection`] and never shares it. Subscriptions are
//! exposed as a [`MessageStream`]: a lazy, infinite, non-restartable sequence
//! of inbound items that ends only when the connection goes away.
//!
//! [`redis_pubsub`] is the production adapter; `crate::testing` provides an
//! in-process broker for tests.

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;
use url::Url;

pub mod channel;
pub mod message;
pub mod redis_pubsub;

pub use channel::{topics, ChannelNamespace, NamespaceError, DEFAULT_PREFIX};
pub use message::{DecodedMessage, InboundMessage, MessageField, MessageKind, SubscriptionMode};
pub use redis_pubsub::{RedisConnection, RedisConnector};

/// Address used when nothing else is configured
pub const DEFAULT_BROKER_URL: &str = "redis://localhost:6379/0";

const SUPPORTED_SCHEMES: &[&str] = &["redis", "rediss", "redis+unix", "unix"];

/// Broker transport errors
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Connection failed")]
    ConnectionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Subscription to {channel} failed")]
    SubscriptionFailed {
        channel: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Publishing to {channel} failed")]
    PublishFailed {
        channel: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Subscription stream for {channel} closed")]
    StreamClosed { channel: String },
    #[error("Connection lost: {0}")]
    ConnectionLost(String),
}

pub type BrokerResult<T> = Result<T, BrokerError>;

/// Stream of items delivered on one subscription
pub type MessageStream = BoxStream<'static, BrokerResult<InboundMessage>>;

/// One exclusively-owned connection to the broker
#[async_trait]
pub trait BrokerConnection: Send {
    /// Open a subscription scope on this connection
    async fn subscribe(
        &mut self,
        mode: SubscriptionMode,
        channel: &str,
    ) -> BrokerResult<MessageStream>;

    /// Publish a payload, returning the number of receivers the broker reports
    async fn publish(&mut self, channel: &str, payload: &[u8]) -> BrokerResult<usize>;
}

/// Factory for broker connections bound to one address
#[async_trait]
pub trait Connector: Send + Sync {
    type Connection: BrokerConnection + 'static;

    /// Address with credentials redacted, for logs
    fn address(&self) -> String;

    /// Open a new connection; fails when the broker is unreachable
    async fn connect(&self) -> BrokerResult<Self::Connection>;
}

/// Parse and check a broker URL
pub fn parse_broker_url(raw: &str) -> BrokerResult<Url> {
    let url = Url::parse(raw).map_err(|_| BrokerError::InvalidBrokerUrl(raw.to_string()))?;

    if !SUPPORTED_SCHEMES.contains(&url.scheme()) {
        return Err(BrokerError::InvalidBrokerUrl(raw.to_string()));
    }

    if matches!(url.scheme(), "redis" | "rediss") && url.host_str().is_none() {
        return Err(BrokerError::InvalidBrokerUrl(raw.to_string()));
    }

    Ok(url)
}

/// Render a broker URL with any password masked
pub fn redact_broker_url(url: &Url) -> String {
    let mut redacted = url.clone();
    if redacted.password().is_some() {
        let _ = redacted.set_password(Some("***"));
    }
    redacted.to_string()
}
