//! The durable key-value contract and the in-process engine.

use {
    crate::Result,
    async_trait::async_trait,
    parking_lot::RwLock,
    std::collections::{BTreeMap, HashMap},
};

/// A durable string map with hash fields.
///
/// Every operation is a suspension point from the caller's perspective;
/// implementations may be remote. Values are strings (JSON for structured
/// records).
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn del(&self, key: &str) -> Result<()>;

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>>;
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()>;
    async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>>;
    async fn hexists(&self, key: &str, field: &str) -> Result<bool>;
    async fn hdel(&self, key: &str, field: &str) -> Result<()>;

    /// Liveness probe; answers `"PONG"`.
    async fn ping(&self) -> Result<String>;
}

/// In-process [`KvStore`] engine.
///
/// Hash fields are kept ordered so `hgetall` is deterministic — tests and
/// registry loads depend on stable iteration.
#[derive(Default)]
pub struct MemoryKv {
    plain: RwLock<HashMap<String, String>>,
    hashes: RwLock<HashMap<String, BTreeMap<String, String>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.plain.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.plain.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.plain.write().remove(key);
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        Ok(self
            .hashes
            .read()
            .get(key)
            .and_then(|h| h.get(field).cloned()))
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.hashes
            .write()
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> Result<Vec<(String, String)>> {
        Ok(self
            .hashes
            .read()
            .get(key)
            .map(|h| h.iter().map(|(f, v)| (f.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn hexists(&self, key: &str, field: &str) -> Result<bool> {
        Ok(self
            .hashes
            .read()
            .get(key)
            .is_some_and(|h| h.contains_key(field)))
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<()> {
        if let Some(h) = self.hashes.write().get_mut(key) {
            h.remove(field);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<String> {
        Ok("PONG".to_string())
    }
}
