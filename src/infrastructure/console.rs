use crate::domain::ports::{SendOptions, SentMessage, Transport};
use crate::error::TransportError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// One outbound operation performed against the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportOp {
    Sent {
        chat_id: i64,
        message_id: i64,
        text: String,
        opts: SendOptions,
    },
    Edited {
        chat_id: i64,
        message_id: i64,
        text: String,
        opts: SendOptions,
    },
    Deleted {
        chat_id: i64,
        message_id: i64,
    },
    Answered {
        callback_id: String,
    },
}

#[derive(Default)]
struct ChatState {
    next_id: i64,
    messages: HashMap<(i64, i64), (String, SendOptions)>,
    ops: Vec<TransportOp>,
}

/// A simulated chat that keeps messages in memory and logs every operation.
///
/// It reproduces the two failure modes the engine cares about: editing a
/// message to identical content reports `NotModified`, and touching a
/// message that does not exist reports `NotFound`.
#[derive(Clone, Default)]
pub struct ConsoleTransport {
    state: Arc<Mutex<ChatState>>,
}

impl ConsoleTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Message ids handed out by `send` start after `first_id`.
    pub fn starting_at(first_id: i64) -> Self {
        let transport = Self::default();
        if let Ok(mut state) = transport.state.try_lock() {
            state.next_id = first_id;
        }
        transport
    }

    /// Registers a message written by a user, so the bot can later delete it.
    pub async fn observe(&self, chat_id: i64, message_id: i64, text: &str) {
        let mut state = self.state.lock().await;
        state.next_id = state.next_id.max(message_id);
        state
            .messages
            .insert((chat_id, message_id), (text.to_string(), SendOptions::default()));
    }

    /// A user writes `text` into the chat; returns the new message id.
    pub async fn receive(&self, chat_id: i64, text: &str) -> i64 {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let message_id = state.next_id;
        state
            .messages
            .insert((chat_id, message_id), (text.to_string(), SendOptions::default()));
        message_id
    }

    /// Removes a message as if the user deleted it on their side.
    pub async fn forget(&self, chat_id: i64, message_id: i64) {
        self.state.lock().await.messages.remove(&(chat_id, message_id));
    }

    pub async fn text_of(&self, chat_id: i64, message_id: i64) -> Option<String> {
        self.state
            .lock()
            .await
            .messages
            .get(&(chat_id, message_id))
            .map(|(text, _)| text.clone())
    }

    pub async fn exists(&self, chat_id: i64, message_id: i64) -> bool {
        self.state
            .lock()
            .await
            .messages
            .contains_key(&(chat_id, message_id))
    }

    pub async fn ops(&self) -> Vec<TransportOp> {
        self.state.lock().await.ops.clone()
    }

    pub async fn clear_ops(&self) {
        self.state.lock().await.ops.clear();
    }
}

#[async_trait]
impl Transport for ConsoleTransport {
    async fn send(
        &self,
        chat_id: i64,
        text: &str,
        opts: &SendOptions,
    ) -> Result<SentMessage, TransportError> {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let message_id = state.next_id;
        state
            .messages
            .insert((chat_id, message_id), (text.to_string(), opts.clone()));
        state.ops.push(TransportOp::Sent {
            chat_id,
            message_id,
            text: text.to_string(),
            opts: opts.clone(),
        });
        info!(chat_id, message_id, text, "send");
        Ok(SentMessage {
            message_id,
            chat_id,
            text: text.to_string(),
        })
    }

    async fn edit(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        opts: &SendOptions,
    ) -> Result<SentMessage, TransportError> {
        let mut state = self.state.lock().await;
        let Some(current) = state.messages.get_mut(&(chat_id, message_id)) else {
            return Err(TransportError::NotFound);
        };
        if current.0 == text && current.1 == *opts {
            return Err(TransportError::NotModified);
        }
        *current = (text.to_string(), opts.clone());
        state.ops.push(TransportOp::Edited {
            chat_id,
            message_id,
            text: text.to_string(),
            opts: opts.clone(),
        });
        info!(chat_id, message_id, text, "edit");
        Ok(SentMessage {
            message_id,
            chat_id,
            text: text.to_string(),
        })
    }

    async fn delete(&self, chat_id: i64, message_id: i64) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        if state.messages.remove(&(chat_id, message_id)).is_none() {
            return Err(TransportError::NotFound);
        }
        state.ops.push(TransportOp::Deleted {
            chat_id,
            message_id,
        });
        info!(chat_id, message_id, "delete");
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), TransportError> {
        self.state.lock().await.ops.push(TransportOp::Answered {
            callback_id: callback_id.to_string(),
        });
        info!(callback_id, "answer callback");
        Ok(())
    }
}
