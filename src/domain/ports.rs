use super::ui::Keyboard;
use crate::error::{Result, TransportError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A single write inside an atomic [`KeyValueStore::exec`] batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Set { key: String, value: String },
    Delete { key: String },
    SAdd { key: String, member: String },
    SRem { key: String, member: String },
}

/// The persisted key-value store the binding stores are built on.
///
/// Values are JSON strings. Sets are independent from plain keys: a set
/// named `k` does not collide with a value stored at `k`.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: String) -> Result<()>;
    /// Returns `true` when a value was actually removed.
    async fn delete(&self, key: &str) -> Result<bool>;
    /// Plain keys starting with `prefix`, in no particular order.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>>;
    async fn incr(&self, key: &str) -> Result<i64>;
    async fn smembers(&self, key: &str) -> Result<Vec<String>>;
    async fn sadd(&self, key: &str, member: &str) -> Result<()>;
    async fn srem(&self, key: &str, member: &str) -> Result<()>;
    /// Applies every operation or none of them.
    async fn exec(&self, ops: Vec<WriteOp>) -> Result<()>;
}

pub type KeyValueStoreRef = Arc<dyn KeyValueStore>;

/// Options for sending or editing a message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SendOptions {
    #[serde(default, skip_serializing_if = "Keyboard::is_empty")]
    pub inline_keyboard: Keyboard,
    #[serde(default)]
    pub force_reply: bool,
}

/// What the transport reports back after a send or an edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    pub message_id: i64,
    pub chat_id: i64,
    pub text: String,
}

/// Outbound side of the chat transport.
///
/// Implementations classify failures into [`TransportError`] kinds.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        chat_id: i64,
        text: &str,
        opts: &SendOptions,
    ) -> std::result::Result<SentMessage, TransportError>;

    async fn edit(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        opts: &SendOptions,
    ) -> std::result::Result<SentMessage, TransportError>;

    async fn delete(&self, chat_id: i64, message_id: i64)
    -> std::result::Result<(), TransportError>;

    async fn answer_callback(&self, callback_id: &str) -> std::result::Result<(), TransportError>;
}

pub type TransportRef = Arc<dyn Transport>;

/// Wall-clock source, in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

pub type ClockRef = Arc<dyn Clock>;
