//! ws-hub listeners
//!
//! Fan-out listeners for the ws-hub pub/sub channels. Each listener owns one
//! broker connection, subscribes to a channel by exact name or glob pattern,
//! and reacts to every message in the order the broker delivers them.
//!
//! # Overview
//!
//! - [`broker`] - connection abstraction, message model and the Redis adapter
//! - [`listener`] - the [`Listener`] trait, the shared receive loop and the
//!   two concrete listeners
//! - [`supervisor`] - spawns one task per listener
//! - [`config`], [`error`], [`observability`] - configuration, errors,
//!   logging and metrics
//! - [`testing`] - an in-memory broker for tests
//!
//! # Quick Start
//!
//! ```rust
//! use wshub_listener::broker::{ChannelNamespace, Connector};
//! use wshub_listener::listener::{Listener, NewClientListener};
//! use wshub_listener::testing::MemoryBroker;
//!
//! # tokio_test::block_on(async {
//! let broker = MemoryBroker::new();
//! let listener = NewClientListener::new(ChannelNamespace::default());
//! assert_eq!(listener.channel_name()?, "ws-hub:client-new");
//!
//! let mut connection = broker.connect().await?;
//! tokio::spawn(async move { listener.run(&mut connection).await });
//!
//! broker.wait_for_subscriptions(1, std::time::Duration::from_secs(1)).await;
//! broker.publish("ws-hub:client-new", "client42");
//! broker
//!     .wait_for_published("ws-hub:groups-new:client42", 1, std::time::Duration::from_secs(1))
//!     .await;
//! assert_eq!(broker.published_on("ws-hub:groups-new:client42")[0], "1,2,all,news");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod broker;
pub mod config;
pub mod error;
pub mod listener;
pub mod observability;
pub mod supervisor;
pub mod testing;

pub use broker::{BrokerConnection, ChannelNamespace, Connector, RedisConnector, SubscriptionMode};
pub use config::*;
pub use error::{ListenerError, ListenerResult};
pub use listener::{
    ClientDataRecord, DataClientListener, Listener, ListenerWorker, MessageHandler,
    NewClientListener,
};
pub use supervisor::{ListenerHandle, Supervisor};
