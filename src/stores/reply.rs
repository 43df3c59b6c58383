use super::is_expired;
use crate::domain::ports::{ClockRef, KeyValueStoreRef};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Identifies the message a reply binding is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReplyKey {
    pub chat_id: i64,
    pub user_id: i64,
    pub message_id: i64,
}

impl ReplyKey {
    pub fn new(chat_id: i64, user_id: i64, message_id: i64) -> Self {
        Self {
            chat_id,
            user_id,
            message_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ReplyBinding {
    data: Value,
    #[serde(default)]
    expires_at: Option<i64>,
}

/// A binding removed by the sweep, with everything needed to tell its owner.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpiredReply {
    pub key: ReplyKey,
    pub data: Value,
}

/// Message → expected-answer contracts, keyed by `(chat, user, message)`.
///
/// At most one binding exists per key, and its expiry never moves earlier.
#[derive(Clone)]
pub struct ReplyStore {
    store: KeyValueStoreRef,
    clock: ClockRef,
    prefix: String,
}

impl ReplyStore {
    pub fn new(store: KeyValueStoreRef, clock: ClockRef, namespace: &str) -> Self {
        Self {
            store,
            clock,
            prefix: format!("{namespace}:reply_bind"),
        }
    }

    fn key(&self, key: &ReplyKey) -> String {
        format!(
            "{}:{}:{}:{}",
            self.prefix, key.chat_id, key.user_id, key.message_id
        )
    }

    fn parse_key(&self, raw: &str) -> Option<ReplyKey> {
        let rest = raw.strip_prefix(&self.prefix)?.strip_prefix(':')?;
        let mut parts = rest.split(':').map(str::parse::<i64>);
        let key = ReplyKey::new(
            parts.next()?.ok()?,
            parts.next()?.ok()?,
            parts.next()?.ok()?,
        );
        parts.next().is_none().then_some(key)
    }

    async fn load(&self, key: &str) -> Result<Option<ReplyBinding>> {
        match self.store.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Binds `data` to a message, expiring at `delete_at` (epoch ms).
    ///
    /// Re-binding a key replaces the payload but keeps the later expiry;
    /// `None` means no expiry and wins over any timestamp.
    pub async fn bind(&self, key: ReplyKey, data: Value, delete_at: Option<i64>) -> Result<()> {
        let storage_key = self.key(&key);
        let now = self.clock.now_ms();
        let expires_at = match self.load(&storage_key).await? {
            Some(existing) if !is_expired(existing.expires_at, now) => {
                match (existing.expires_at, delete_at) {
                    (Some(old), Some(new)) => Some(old.max(new)),
                    _ => None,
                }
            }
            _ => delete_at,
        };
        let binding = ReplyBinding { data, expires_at };
        self.store
            .set(&storage_key, serde_json::to_string(&binding)?)
            .await?;
        debug!(key = %storage_key, ?expires_at, "Reply binding stored");
        Ok(())
    }

    /// The binding's payload, or `None` if absent or expired.
    ///
    /// An expired binding is deleted by the read.
    pub async fn get(&self, key: ReplyKey) -> Result<Option<Value>> {
        let storage_key = self.key(&key);
        let Some(binding) = self.load(&storage_key).await? else {
            return Ok(None);
        };
        if is_expired(binding.expires_at, self.clock.now_ms()) {
            self.store.delete(&storage_key).await?;
            debug!(key = %storage_key, "Expired reply binding dropped on read");
            return Ok(None);
        }
        Ok(Some(binding.data))
    }

    /// Returns `true` when a binding was actually removed.
    pub async fn delete(&self, key: ReplyKey) -> Result<bool> {
        self.store.delete(&self.key(&key)).await
    }

    /// Removes every binding expired at `now` and returns them.
    ///
    /// A binding is only returned by the caller whose delete removed it, so
    /// two overlapping sweeps never report the same entry.
    pub async fn cleanup_expired(&self, now: i64) -> Result<Vec<ExpiredReply>> {
        let mut expired = Vec::new();
        for storage_key in self.store.keys(&format!("{}:", self.prefix)).await? {
            let Some(key) = self.parse_key(&storage_key) else {
                warn!(key = %storage_key, "Skipping malformed reply binding key");
                continue;
            };
            let Some(binding) = self.load(&storage_key).await? else {
                continue;
            };
            if is_expired(binding.expires_at, now) && self.store.delete(&storage_key).await? {
                expired.push(ExpiredReply {
                    key,
                    data: binding.data,
                });
            }
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::KeyValueStore;
    use crate::infrastructure::clock::ManualClock;
    use crate::infrastructure::in_memory::InMemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    fn setup(now: i64) -> (ReplyStore, ManualClock, Arc<InMemoryStore>) {
        let kv = Arc::new(InMemoryStore::new());
        let clock = ManualClock::new(now);
        let store = ReplyStore::new(kv.clone(), Arc::new(clock.clone()), "test");
        (store, clock, kv)
    }

    #[tokio::test]
    async fn test_bind_and_get() {
        let (store, _clock, kv) = setup(1_000);
        let key = ReplyKey::new(1, 2, 3);
        store
            .bind(key, json!({"type": "reply_deal_amount", "deal_id": 7}), None)
            .await
            .unwrap();

        assert_eq!(
            store.get(key).await.unwrap(),
            Some(json!({"type": "reply_deal_amount", "deal_id": 7}))
        );
        assert!(kv.get("test:reply_bind:1:2:3").await.unwrap().is_some());
        assert!(store.get(ReplyKey::new(1, 2, 4)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_get_deletes() {
        let (store, clock, kv) = setup(1_000);
        let key = ReplyKey::new(1, 2, 3);
        store.bind(key, json!({}), Some(1_500)).await.unwrap();

        clock.set(1_499);
        assert!(store.get(key).await.unwrap().is_some());

        clock.set(1_500);
        assert!(store.get(key).await.unwrap().is_none());
        assert!(kv.get("test:reply_bind:1:2:3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expiry_never_decreases() {
        let (store, clock, _kv) = setup(0);
        let key = ReplyKey::new(1, 2, 3);
        store.bind(key, json!({"v": 1}), Some(2_000)).await.unwrap();
        store.bind(key, json!({"v": 2}), Some(1_000)).await.unwrap();

        clock.set(1_500);
        assert_eq!(store.get(key).await.unwrap(), Some(json!({"v": 2})));

        // No expiry is the latest possible.
        store.bind(key, json!({"v": 3}), None).await.unwrap();
        store.bind(key, json!({"v": 4}), Some(1_600)).await.unwrap();
        clock.set(10_000);
        assert_eq!(store.get(key).await.unwrap(), Some(json!({"v": 4})));
    }

    #[tokio::test]
    async fn test_rebind_after_expiry_takes_new_deadline() {
        let (store, clock, _kv) = setup(0);
        let key = ReplyKey::new(1, 2, 3);
        store.bind(key, json!({}), Some(100)).await.unwrap();
        clock.set(200);
        store.bind(key, json!({}), Some(150)).await.unwrap();
        assert!(store.get(key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cleanup_claims_each_binding_once() {
        let (store, _clock, _kv) = setup(0);
        store
            .bind(ReplyKey::new(1, 2, 3), json!({"a": 1}), Some(100))
            .await
            .unwrap();
        store
            .bind(ReplyKey::new(1, 2, 4), json!({"b": 1}), Some(300))
            .await
            .unwrap();
        store
            .bind(ReplyKey::new(5, 6, 7), json!({"c": 1}), None)
            .await
            .unwrap();

        let expired = store.cleanup_expired(200).await.unwrap();
        assert_eq!(
            expired,
            vec![ExpiredReply {
                key: ReplyKey::new(1, 2, 3),
                data: json!({"a": 1}),
            }]
        );
        assert!(store.cleanup_expired(200).await.unwrap().is_empty());
        assert_eq!(store.cleanup_expired(i64::MAX).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_reports_removal() {
        let (store, _clock, _kv) = setup(0);
        let key = ReplyKey::new(1, 2, 3);
        store.bind(key, json!({}), None).await.unwrap();
        assert!(store.delete(key).await.unwrap());
        assert!(!store.delete(key).await.unwrap());
    }
}
