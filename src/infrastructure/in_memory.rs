use crate::domain::ports::{KeyValueStore, WriteOp};
use crate::error::{DealflowError, Result};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    values: HashMap<String, String>,
    sets: HashMap<String, BTreeSet<String>>,
}

impl Inner {
    fn apply(&mut self, op: WriteOp) {
        match op {
            WriteOp::Set { key, value } => {
                self.values.insert(key, value);
            }
            WriteOp::Delete { key } => {
                self.values.remove(&key);
            }
            WriteOp::SAdd { key, member } => {
                self.sets.entry(key).or_default().insert(member);
            }
            WriteOp::SRem { key, member } => {
                if let Some(set) = self.sets.get_mut(&key) {
                    set.remove(&member);
                    if set.is_empty() {
                        self.sets.remove(&key);
                    }
                }
            }
        }
    }
}

/// A thread-safe in-memory key-value store.
///
/// Uses `Arc<RwLock<..>>` so clones share the same data. Batches are applied
/// under a single write lock, which makes them atomic for readers.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let inner = self.inner.read().await;
        Ok(inner.values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.values.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        Ok(inner.values.remove(key).is_some())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let inner = self.inner.read().await;
        Ok(inner
            .values
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut inner = self.inner.write().await;
        let current = match inner.values.get(key) {
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|e| DealflowError::Store(format!("`{key}` is not a counter: {e}")))?,
            None => 0,
        };
        let next = current + 1;
        inner.values.insert(key.to_string(), next.to_string());
        Ok(next)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let inner = self.inner.read().await;
        Ok(inner
            .sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.apply(WriteOp::SAdd {
            key: key.to_string(),
            member: member.to_string(),
        });
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.apply(WriteOp::SRem {
            key: key.to_string(),
            member: member.to_string(),
        });
        Ok(())
    }

    async fn exec(&self, ops: Vec<WriteOp>) -> Result<()> {
        let mut inner = self.inner.write().await;
        for op in ops {
            inner.apply(op);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_values_and_prefix_scan() {
        let store = InMemoryStore::new();
        store.set("a:1", "x".to_string()).await.unwrap();
        store.set("a:2", "y".to_string()).await.unwrap();
        store.set("b:1", "z".to_string()).await.unwrap();

        assert_eq!(store.get("a:1").await.unwrap(), Some("x".to_string()));
        let mut keys = store.keys("a:").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a:1", "a:2"]);

        assert!(store.delete("a:1").await.unwrap());
        assert!(!store.delete("a:1").await.unwrap());
        assert!(store.get("a:1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sets_and_counter() {
        let store = InMemoryStore::new();
        store.sadd("s", "1").await.unwrap();
        store.sadd("s", "1").await.unwrap();
        store.sadd("s", "2").await.unwrap();
        assert_eq!(store.smembers("s").await.unwrap(), vec!["1", "2"]);
        store.srem("s", "1").await.unwrap();
        assert_eq!(store.smembers("s").await.unwrap(), vec!["2"]);

        assert_eq!(store.incr("n").await.unwrap(), 1);
        assert_eq!(store.incr("n").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_exec_applies_batch() {
        let store = InMemoryStore::new();
        store
            .exec(vec![
                WriteOp::Set {
                    key: "k".to_string(),
                    value: "v".to_string(),
                },
                WriteOp::SAdd {
                    key: "s".to_string(),
                    member: "k".to_string(),
                },
            ])
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
        assert_eq!(store.smembers("s").await.unwrap(), vec!["k"]);
    }
}
