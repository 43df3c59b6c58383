use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "type")]
    pub kind: String,
    pub offset: usize,
    pub length: usize,
}

/// An inbound chat message as the transport delivers it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat_id: i64,
    pub from: User,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<Entity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<Box<Message>>,
}

impl Message {
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }

    /// `true` when the message opens with a bot command entity.
    pub fn is_command(&self) -> bool {
        self.entities
            .iter()
            .any(|e| e.kind == "bot_command" && e.offset == 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub message_id: i64,
    pub chat_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<MessageRef>,
}

/// A raw update before categorization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawUpdate {
    #[serde(default)]
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

/// Categorized inbound payload handed to the engine.
///
/// `ReplyExpired` and `Timeout` never come from the network: they are
/// synthesized by the expiry sweep and routed like any other payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportPayload {
    Start {
        message: Message,
    },
    Command {
        message: Message,
    },
    Message {
        message: Message,
    },
    ReplyMessage {
        message: Message,
        reply_to: Message,
    },
    CallbackQuery {
        callback: CallbackQuery,
    },
    ReplyExpired {
        chat_id: i64,
        user_id: i64,
        message_id: i64,
        data: Value,
    },
    Timeout {
        chat_id: i64,
        user_id: i64,
        message_id: i64,
        data: Value,
    },
}

impl TransportPayload {
    /// Sorts a raw update into a payload category.
    ///
    /// Callbacks win over messages; a message replying to another one is a
    /// reply even if it starts with a command. Updates without text are
    /// dropped.
    pub fn categorize(update: RawUpdate) -> Option<Self> {
        if let Some(callback) = update.callback_query {
            return Some(Self::CallbackQuery { callback });
        }

        let mut message = update.message?;
        message.text.as_ref()?;

        if message.text() == "/start" || message.text().starts_with("/start ") {
            return Some(Self::Start { message });
        }
        if let Some(reply_to) = message.reply_to.take() {
            return Some(Self::ReplyMessage {
                message,
                reply_to: *reply_to,
            });
        }
        if message.is_command() {
            return Some(Self::Command { message });
        }
        Some(Self::Message { message })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Command { .. } => "command",
            Self::Message { .. } => "message",
            Self::ReplyMessage { .. } => "reply_message",
            Self::CallbackQuery { .. } => "callback_query",
            Self::ReplyExpired { .. } => "reply_expired",
            Self::Timeout { .. } => "timeout",
        }
    }

    pub fn user_id(&self) -> i64 {
        match self {
            Self::Start { message }
            | Self::Command { message }
            | Self::Message { message }
            | Self::ReplyMessage { message, .. } => message.from.id,
            Self::CallbackQuery { callback } => callback.from.id,
            Self::ReplyExpired { user_id, .. } | Self::Timeout { user_id, .. } => *user_id,
        }
    }

    pub fn chat_id(&self) -> i64 {
        match self {
            Self::Start { message }
            | Self::Command { message }
            | Self::Message { message }
            | Self::ReplyMessage { message, .. } => message.chat_id,
            Self::CallbackQuery { callback } => callback
                .message
                .map(|m| m.chat_id)
                .unwrap_or(callback.from.id),
            Self::ReplyExpired { chat_id, .. } | Self::Timeout { chat_id, .. } => *chat_id,
        }
    }

    pub fn message(&self) -> Option<&Message> {
        match self {
            Self::Start { message }
            | Self::Command { message }
            | Self::Message { message }
            | Self::ReplyMessage { message, .. } => Some(message),
            _ => None,
        }
    }

    pub fn callback(&self) -> Option<&CallbackQuery> {
        match self {
            Self::CallbackQuery { callback } => Some(callback),
            _ => None,
        }
    }

    pub fn callback_id(&self) -> Option<&str> {
        self.callback().map(|c| c.id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: i64, text: &str) -> Message {
        Message {
            message_id: id,
            chat_id: 10,
            from: User {
                id: 20,
                username: None,
            },
            text: Some(text.to_string()),
            entities: Vec::new(),
            reply_to: None,
        }
    }

    #[test]
    fn test_categorize_reply_before_command() {
        let mut msg = message(2, "/amount");
        msg.entities.push(Entity {
            kind: "bot_command".to_string(),
            offset: 0,
            length: 7,
        });
        msg.reply_to = Some(Box::new(message(1, "Enter the amount")));

        let payload = TransportPayload::categorize(RawUpdate {
            update_id: 1,
            message: Some(msg),
            callback_query: None,
        })
        .unwrap();

        match payload {
            TransportPayload::ReplyMessage { reply_to, .. } => assert_eq!(reply_to.message_id, 1),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_categorize_command_and_start() {
        let mut cmd = message(3, "/ready");
        cmd.entities.push(Entity {
            kind: "bot_command".to_string(),
            offset: 0,
            length: 6,
        });
        let payload = TransportPayload::categorize(RawUpdate {
            message: Some(cmd),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(payload.kind(), "command");

        let payload = TransportPayload::categorize(RawUpdate {
            message: Some(message(4, "/start")),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(payload.kind(), "start");
    }

    #[test]
    fn test_categorize_drops_textless_message() {
        let mut msg = message(5, "");
        msg.text = None;
        assert!(
            TransportPayload::categorize(RawUpdate {
                message: Some(msg),
                ..Default::default()
            })
            .is_none()
        );
    }

    #[test]
    fn test_payload_wire_shape() {
        let payload: TransportPayload = serde_json::from_str(
            r#"{"type":"callback_query","callback":{"id":"cb1","from":{"id":7},"data":"x:1","message":{"message_id":3,"chat_id":70}}}"#,
        )
        .unwrap();
        assert_eq!(payload.user_id(), 7);
        assert_eq!(payload.chat_id(), 70);
        assert_eq!(payload.callback_id(), Some("cb1"));
    }
}
