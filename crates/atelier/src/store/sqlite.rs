//! SQLite-backed store built on the `kv_store` table.

use async_trait::async_trait;

use super::StateStore;
use crate::db::{kv_repo, Database};
use crate::error::StoreError;

/// Durable store. Each call runs on the blocking pool so the connection
/// mutex never parks a runtime worker.
#[derive(Clone)]
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    async fn run<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Database) -> Result<T, crate::db::DatabaseError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))?
            .map_err(StoreError::from)
    }
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let key = key.to_string();
        self.run(move |db| kv_repo::get(db, &key)).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let key = key.to_string();
        let value = value.to_string();
        self.run(move |db| kv_repo::put(db, &key, &value)).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let key = key.to_string();
        self.run(move |db| kv_repo::delete(db, &key).map(|_| ()))
            .await
    }
}
