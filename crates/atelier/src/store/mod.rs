//! Durable key-value state store.
//!
//! The store is the only channel between transient callers and the
//! background worker. Values are opaque strings (JSON records); every
//! `set` fully replaces the previous value.

use async_trait::async_trait;

use crate::error::StoreError;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Asynchronous key-value store that survives controller restarts.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Returns the value under `key`, or `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removes `key`. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}
