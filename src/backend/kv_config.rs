//! Generic KV storage based on SurrealDB.
//!
//! This module provides a SurrealDB table called `settings` to store key-value pairs.
//!
//! The values are `key` and `value` pairs, where `key` is a string and `value` is a JSON value.
//! Values are stored untyped so callers can decide how to handle records that no longer
//! match the shape they expect.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use surrealdb::{Surreal, engine::any::Any};

const TABLE_NAME: &str = "settings";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KVConfig {
    pub key: String,
    #[serde(default)]
    pub value: Option<Value>,
}

impl KVConfig {
    pub fn new(key: impl Into<String>, value: Option<Value>) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Handle to the `settings` table
#[derive(Debug, Clone)]
pub struct KvStore {
    db: Surreal<Any>,
}

impl KvStore {
    pub fn new(db: Surreal<Any>) -> Self {
        Self { db }
    }

    /// Returns the raw JSON value stored under `key`, if any.
    pub async fn get(&self, key: &str) -> surrealdb::Result<Option<Value>> {
        let q: Option<KVConfig> = self.db.select((TABLE_NAME, key)).await?;
        tracing::trace!("Retrieved value for key {}: {:?}", key, q);

        match q {
            Some(kv) => Ok(kv.value),
            None => {
                tracing::debug!("Key {} not found in KV store", key);
                Ok(None)
            }
        }
    }

    /// Replaces the value stored under `key`.
    pub async fn set(&self, key: &str, value: Value) -> surrealdb::Result<()> {
        let record = KVConfig::new(key, Some(value));
        let q: Option<KVConfig> = self.db.upsert((TABLE_NAME, key)).content(record).await?;
        tracing::trace!("Set value for key {}: {:?}", key, q);
        Ok(())
    }
}
