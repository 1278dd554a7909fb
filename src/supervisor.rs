//! Starts one task per listener
//!
//! The supervisor wires the concrete listeners to a broker connector and
//! spawns each worker as an independent tokio task. It does not restart
//! listeners or coordinate their shutdown; the returned handles only let the
//! process notice when listeners have stopped.

use crate::broker::{ChannelNamespace, Connector, RedisConnector};
use crate::config::{HubConfig, ListenerSection, ReconnectSection};
use crate::error::ListenerResult;
use crate::listener::{ClientDataRecord, DataClientListener, Listener, ListenerWorker, NewClientListener};
use crate::listener_span;
use crate::observability::{metrics, ListenerStats, MetricsCollector};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinError, JoinHandle};
use tracing::{error, info, Instrument};

/// Handle to a spawned listener task
pub struct ListenerHandle {
    name: String,
    handle: JoinHandle<ListenerResult<()>>,
}

impl ListenerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn abort(&self) {
        self.handle.abort();
    }

    /// Aborts the task without holding on to the handle
    pub fn abort_handle(&self) -> AbortHandle {
        self.handle.abort_handle()
    }

    /// Wait for the listener to stop and return how it ended
    pub async fn join(self) -> Result<ListenerResult<()>, JoinError> {
        self.handle.await
    }
}

/// Spawn a worker for `listener` on its own task
///
/// Fatal listener errors are logged here so a stopped listener always
/// leaves a trace, whether or not anyone joins the handle.
pub fn spawn_listener<L, K>(listener: L, connector: K, reconnect: ReconnectSection) -> ListenerHandle
where
    L: Listener + 'static,
    K: Connector + 'static,
{
    let name = listener.name().to_string();
    let span = listener_span!(listener = %name);
    let worker = ListenerWorker::new(listener, connector).with_reconnect(reconnect);

    let handle = tokio::spawn(
        async move {
            info!("Starting listener");
            let result = worker.run().await;
            match &result {
                Ok(()) => info!("Listener finished"),
                Err(e) => error!(error = %e, "Listener stopped"),
            }
            result
        }
        .instrument(span),
    );

    ListenerHandle { name, handle }
}

/// Builds and starts the concrete listeners
pub struct Supervisor<K> {
    connector: K,
    namespace: ChannelNamespace,
    listeners: ListenerSection,
    reconnect: ReconnectSection,
    data_sink: Option<mpsc::Sender<ClientDataRecord>>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl Supervisor<RedisConnector> {
    /// Supervisor connecting to the broker named in `config`
    pub fn from_config(config: &HubConfig) -> ListenerResult<Self> {
        config.validate()?;
        let connector = RedisConnector::new(&config.broker.url)?;
        Self::new(config, connector)
    }
}

impl<K> Supervisor<K>
where
    K: Connector + Clone + 'static,
{
    pub fn new(config: &HubConfig, connector: K) -> ListenerResult<Self> {
        Ok(Self {
            connector,
            namespace: config.namespace()?,
            listeners: config.listeners.clone(),
            reconnect: config.reconnect.clone(),
            data_sink: None,
            metrics: None,
        })
    }

    /// Forward client-data records to `sink`
    pub fn with_data_sink(mut self, sink: mpsc::Sender<ClientDataRecord>) -> Self {
        self.data_sink = Some(sink);
        self
    }

    /// Count into `collector` instead of the global registry
    pub fn with_metrics(mut self, collector: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(collector);
        self
    }

    pub fn namespace(&self) -> &ChannelNamespace {
        &self.namespace
    }

    /// Spawn every listener; must be called inside a tokio runtime
    pub fn start(self) -> Vec<ListenerHandle> {
        info!(
            broker = %self.connector.address(),
            prefix = %self.namespace,
            "Starting listeners"
        );
        if self.reconnect.is_enabled() {
            info!(
                max_attempts = self.reconnect.max_attempts,
                max_total_delay_ms = self.reconnect.max_total_delay().as_millis() as u64,
                "Reconnect enabled"
            );
        }

        let new_client = NewClientListener::new(self.namespace.clone())
            .with_groups(&self.listeners)
            .with_stats(self.stats_for(NewClientListener::NAME));

        let mut data_client = DataClientListener::new(self.namespace.clone())
            .with_stats(self.stats_for(DataClientListener::NAME));
        if let Some(sink) = self.data_sink {
            data_client = data_client.with_sink(sink);
        }

        vec![
            spawn_listener(new_client, self.connector.clone(), self.reconnect.clone()),
            spawn_listener(data_client, self.connector, self.reconnect),
        ]
    }

    fn stats_for(&self, name: &str) -> Arc<ListenerStats> {
        match &self.metrics {
            Some(collector) => collector.listener(name),
            None => metrics().listener(name),
        }
    }
}
