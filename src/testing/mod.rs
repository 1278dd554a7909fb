//! Testing utilities
//!
//! Provides an in-memory broker so listeners can be exercised without a
//! running Redis server.

pub mod memory;

pub use memory::{MemoryBroker, MemoryConnection, PublishedMessage};
