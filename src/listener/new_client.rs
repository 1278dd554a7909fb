//! Registration of new clients
//!
//! Every client id published on `{prefix}:client-new` is answered with one
//! publish on `{prefix}:groups-new:{client_id}` carrying the client's initial
//! group memberships.

use super::{receive_loop, Listener, MessageHandler};
use crate::broker::{topics, BrokerConnection, ChannelNamespace, DecodedMessage, SubscriptionMode};
use crate::config::ListenerSection;
use crate::error::ListenerResult;
use crate::observability::{metrics, ListenerStats};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Assigns initial groups to each newly registered client
pub struct NewClientListener {
    namespace: ChannelNamespace,
    groups_payload: String,
    stats: Arc<ListenerStats>,
}

impl NewClientListener {
    pub const NAME: &'static str = "new-client";

    /// Listener publishing the default groups (`1,2,all,news`)
    pub fn new(namespace: ChannelNamespace) -> Self {
        Self {
            namespace,
            groups_payload: ListenerSection::default().groups_payload(),
            stats: metrics().listener(Self::NAME),
        }
    }

    /// Use the configured initial groups
    pub fn with_groups(mut self, listeners: &ListenerSection) -> Self {
        self.groups_payload = listeners.groups_payload();
        self
    }

    /// Count into `stats` instead of the global registry
    pub fn with_stats(mut self, stats: Arc<ListenerStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Payload published for every registration
    pub fn groups_payload(&self) -> &str {
        &self.groups_payload
    }
}

#[async_trait]
impl Listener for NewClientListener {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn namespace(&self) -> &ChannelNamespace {
        &self.namespace
    }

    fn subscribe_topic(&self) -> Option<&str> {
        Some(topics::CLIENT_NEW)
    }

    fn mode(&self) -> SubscriptionMode {
        SubscriptionMode::Exact
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
impl MessageHandler for NewClientListener {
    async fn on_message<C>(&self, connection: &mut C, message: DecodedMessage) -> ListenerResult<()>
    where
        C: BrokerConnection,
    {
        let client_id = message.payload;
        info!(client_id = %client_id, "New client");

        let target = self.namespace.groups_new_channel(&client_id);
        let receivers = connection
            .publish(&target, self.groups_payload.as_bytes())
            .await?;
        self.stats.message_published();

        debug!(channel = %target, receivers, "Published initial groups");
        Ok(())
    }
}
