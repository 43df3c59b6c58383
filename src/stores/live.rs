use super::is_expired;
use crate::domain::ports::{ClockRef, KeyValueStoreRef, WriteOp};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::debug;

/// The two families of tracked messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LiveKind {
    /// Messages kept textually in sync with changing state.
    Edited,
    /// Outstanding prompts awaiting a free-text answer.
    Replys,
}

impl LiveKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Edited => "edited",
            Self::Replys => "replys",
        }
    }
}

impl fmt::Display for LiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tracked message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveMessage {
    pub chat_id: i64,
    pub message_id: i64,
    #[serde(default)]
    pub user_id: Option<i64>,
    /// Epoch milliseconds; `None` never expires.
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub data: Value,
}

impl LiveMessage {
    pub fn new(chat_id: i64, message_id: i64) -> Self {
        Self {
            chat_id,
            message_id,
            user_id: None,
            expires_at: None,
            data: Value::Null,
        }
    }

    pub fn owned_by(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn expires_at(mut self, at: i64) -> Self {
        self.expires_at = Some(at);
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpiredLive {
    pub kind: LiveKind,
    pub method: String,
    pub message: LiveMessage,
}

/// Groups of tracked messages keyed by `(kind, method name)`.
///
/// Layout: entries at `<ns>:<kind>:<method>:<message_id>`, the group's ids
/// in the set `<ns>:<kind>:<method>:ids`, and known method names in
/// `<ns>:<kind>:methods`. A method name leaves the index when its last
/// entry goes.
#[derive(Clone)]
pub struct LiveStore {
    store: KeyValueStoreRef,
    clock: ClockRef,
    namespace: String,
}

impl LiveStore {
    pub fn new(store: KeyValueStoreRef, clock: ClockRef, namespace: &str) -> Self {
        Self {
            store,
            clock,
            namespace: namespace.to_string(),
        }
    }

    fn entry_key(&self, kind: LiveKind, method: &str, message_id: i64) -> String {
        format!("{}:{}:{}:{}", self.namespace, kind, method, message_id)
    }

    fn ids_key(&self, kind: LiveKind, method: &str) -> String {
        format!("{}:{}:{}:ids", self.namespace, kind, method)
    }

    fn methods_key(&self, kind: LiveKind) -> String {
        format!("{}:{}:methods", self.namespace, kind)
    }

    async fn load(&self, key: &str) -> Result<Option<LiveMessage>> {
        match self.store.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Tracks `message` under `(kind, method)`, atomically with its indices.
    pub async fn add(&self, kind: LiveKind, method: &str, message: &LiveMessage) -> Result<()> {
        self.store
            .exec(vec![
                WriteOp::Set {
                    key: self.entry_key(kind, method, message.message_id),
                    value: serde_json::to_string(message)?,
                },
                WriteOp::SAdd {
                    key: self.ids_key(kind, method),
                    member: message.message_id.to_string(),
                },
                WriteOp::SAdd {
                    key: self.methods_key(kind),
                    member: method.to_string(),
                },
            ])
            .await?;
        debug!(%kind, method, message_id = message.message_id, "Live message tracked");
        Ok(())
    }

    /// The entry, or `None` if absent or expired. Expired entries are removed.
    pub async fn get(&self, kind: LiveKind, method: &str, message_id: i64) -> Result<Option<LiveMessage>> {
        let key = self.entry_key(kind, method, message_id);
        let Some(message) = self.load(&key).await? else {
            return Ok(None);
        };
        if is_expired(message.expires_at, self.clock.now_ms()) {
            self.delete(kind, method, message_id).await?;
            return Ok(None);
        }
        Ok(Some(message))
    }

    /// Returns `true` when the entry was actually removed.
    pub async fn delete(&self, kind: LiveKind, method: &str, message_id: i64) -> Result<bool> {
        let removed = self
            .store
            .delete(&self.entry_key(kind, method, message_id))
            .await?;
        let ids_key = self.ids_key(kind, method);
        self.store.srem(&ids_key, &message_id.to_string()).await?;
        if self.store.smembers(&ids_key).await?.is_empty() {
            self.store.srem(&self.methods_key(kind), method).await?;
        }
        Ok(removed)
    }

    /// Live entries of one group, ordered by message id.
    pub async fn messages(&self, kind: LiveKind, method: &str) -> Result<Vec<LiveMessage>> {
        let mut ids: Vec<i64> = self
            .store
            .smembers(&self.ids_key(kind, method))
            .await?
            .iter()
            .filter_map(|id| id.parse().ok())
            .collect();
        ids.sort_unstable();

        let mut messages = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(message) = self.get(kind, method, id).await? {
                messages.push(message);
            }
        }
        Ok(messages)
    }

    /// Every group of one kind, ordered by method name.
    pub async fn all(&self, kind: LiveKind) -> Result<Vec<(String, Vec<LiveMessage>)>> {
        let mut methods = self.store.smembers(&self.methods_key(kind)).await?;
        methods.sort();
        let mut groups = Vec::with_capacity(methods.len());
        for method in methods {
            let messages = self.messages(kind, &method).await?;
            if !messages.is_empty() {
                groups.push((method, messages));
            }
        }
        Ok(groups)
    }

    /// Drops a whole group and returns what it held.
    pub async fn clear(&self, kind: LiveKind, method: &str) -> Result<Vec<LiveMessage>> {
        let messages = self.messages(kind, method).await?;
        let mut ops = Vec::with_capacity(messages.len() * 2 + 1);
        for id in self.store.smembers(&self.ids_key(kind, method)).await? {
            ops.push(WriteOp::Delete {
                key: format!("{}:{}:{}:{}", self.namespace, kind, method, id),
            });
            ops.push(WriteOp::SRem {
                key: self.ids_key(kind, method),
                member: id,
            });
        }
        ops.push(WriteOp::SRem {
            key: self.methods_key(kind),
            member: method.to_string(),
        });
        self.store.exec(ops).await?;
        Ok(messages)
    }

    /// Removes every entry of `kind` expired at `now` and returns them.
    ///
    /// An entry is returned only by the caller whose delete removed it.
    pub async fn cleanup_expired(&self, kind: LiveKind, now: i64) -> Result<Vec<ExpiredLive>> {
        let mut expired = Vec::new();
        for method in self.store.smembers(&self.methods_key(kind)).await? {
            for id in self.store.smembers(&self.ids_key(kind, &method)).await? {
                let Ok(message_id) = id.parse::<i64>() else {
                    continue;
                };
                let key = self.entry_key(kind, &method, message_id);
                let Some(message) = self.load(&key).await? else {
                    // Index points at nothing: repair it.
                    self.delete(kind, &method, message_id).await?;
                    continue;
                };
                if is_expired(message.expires_at, now)
                    && self.delete(kind, &method, message_id).await?
                {
                    expired.push(ExpiredLive {
                        kind,
                        method: method.clone(),
                        message,
                    });
                }
            }
        }
        Ok(expired)
    }
}
