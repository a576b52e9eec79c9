//! Durable cache store collaborator interface.
//!
//! The persistent key-value backing is external to this layer; it is
//! treated as an opaque async get/set/delete service keyed by
//! `"cache_" + url`. An in-memory implementation is provided for tests
//! and for running without persistence.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::freshness::Freshness;

/// One cached upstream response. Created on any successful network
/// response; never mutated, only replaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Capture instant, unix seconds. Wall-clock so records survive
    /// process restarts.
    #[serde(rename = "timestamp")]
    pub captured_at: i64,
    pub payload: Value,
}

impl CacheRecord {
    pub fn new(payload: Value) -> Self {
        Self {
            captured_at: OffsetDateTime::now_utc().unix_timestamp(),
            payload,
        }
    }

    /// A record captured `age` ago. Used to seed stores with aged data.
    pub fn aged(payload: Value, age: Duration) -> Self {
        Self {
            captured_at: OffsetDateTime::now_utc().unix_timestamp() - age.as_secs() as i64,
            payload,
        }
    }

    pub fn age(&self) -> Duration {
        let seconds = OffsetDateTime::now_utc().unix_timestamp() - self.captured_at;
        Duration::from_secs(seconds.max(0) as u64)
    }

    pub fn freshness(&self) -> Freshness {
        Freshness::classify(self.age())
    }
}

/// Failure of the durable store collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError(String);

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for StoreError {}

type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Opaque async key-value store contract.
pub trait DurableStore: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<CacheRecord>>;
    fn set<'a>(&'a self, key: &'a str, record: CacheRecord) -> StoreFuture<'a, ()>;
    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;
}

/// In-memory reference implementation.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<tokio::sync::RwLock<HashMap<String, CacheRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Seed a record directly, bypassing the trait. Handy for aged records.
    pub async fn seed(&self, key: impl Into<String>, record: CacheRecord) {
        self.inner.write().await.insert(key.into(), record);
    }
}

impl DurableStore for MemoryStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<CacheRecord>> {
        Box::pin(async move { Ok(self.inner.read().await.get(key).cloned()) })
    }

    fn set<'a>(&'a self, key: &'a str, record: CacheRecord) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.inner.write().await.insert(key.to_string(), record);
            Ok(())
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.inner.write().await.remove(key);
            Ok(())
        })
    }
}
