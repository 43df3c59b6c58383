//! Stock [`Stage`]s for composed routes.

use super::composer::{Inbound, Stage};
use crate::domain::payload::{CallbackQuery, TransportPayload};
use crate::error::Result;
use crate::stores::{ContextStore, ReplyKey, ReplyStore};
use async_trait::async_trait;
use serde_json::Value;

/// Accepts only `/start`.
pub struct StartGuard;

#[async_trait]
impl<C: Inbound + Send + Sync> Stage<C> for StartGuard {
    type Added = ();

    async fn run(&self, ctx: &C) -> Result<Option<()>> {
        Ok(matches!(ctx.payload(), TransportPayload::Start { .. }).then_some(()))
    }
}

/// Accepts `/<name>`, optionally addressed as `/<name>@bot`; adds the
/// argument text after the command.
pub struct CommandGuard {
    name: String,
}

impl CommandGuard {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl<C: Inbound + Send + Sync> Stage<C> for CommandGuard {
    type Added = String;

    async fn run(&self, ctx: &C) -> Result<Option<String>> {
        let TransportPayload::Command { message } = ctx.payload() else {
            return Ok(None);
        };
        let (command, args) = message
            .text()
            .split_once(char::is_whitespace)
            .unwrap_or((message.text(), ""));
        let Some(command) = command.strip_prefix('/') else {
            return Ok(None);
        };
        let command = command.split('@').next().unwrap_or_default();
        Ok((command == self.name).then(|| args.trim().to_string()))
    }
}

/// Accepts callback queries whose data starts with `prefix`.
pub struct CallbackGuard {
    prefix: String,
}

impl CallbackGuard {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

#[async_trait]
impl<C: Inbound + Send + Sync> Stage<C> for CallbackGuard {
    type Added = CallbackQuery;

    async fn run(&self, ctx: &C) -> Result<Option<CallbackQuery>> {
        Ok(ctx
            .payload()
            .callback()
            .filter(|callback| callback.data.starts_with(&self.prefix))
            .cloned())
    }
}

/// Accepts plain text messages and adds the text.
pub struct TextGuard;

#[async_trait]
impl<C: Inbound + Send + Sync> Stage<C> for TextGuard {
    type Added = String;

    async fn run(&self, ctx: &C) -> Result<Option<String>> {
        let TransportPayload::Message { message } = ctx.payload() else {
            return Ok(None);
        };
        Ok(message.text.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub id: i64,
    pub chat_id: i64,
    pub username: Option<String>,
}

/// Never vetoes; adds who sent the payload.
pub struct UserStage;

#[async_trait]
impl<C: Inbound + Send + Sync> Stage<C> for UserStage {
    type Added = UserInfo;

    async fn run(&self, ctx: &C) -> Result<Option<UserInfo>> {
        let payload = ctx.payload();
        let username = match payload {
            TransportPayload::CallbackQuery { callback } => callback.from.username.clone(),
            other => other.message().and_then(|m| m.from.username.clone()),
        };
        Ok(Some(UserInfo {
            id: payload.user_id(),
            chat_id: payload.chat_id(),
            username,
        }))
    }
}

/// Accepts users whose context lists `role` under `roles`.
pub struct RoleGuard {
    role: String,
    contexts: ContextStore,
}

impl RoleGuard {
    pub fn new(role: impl Into<String>, contexts: ContextStore) -> Self {
        Self {
            role: role.into(),
            contexts,
        }
    }
}

#[async_trait]
impl<C: Inbound + Send + Sync> Stage<C> for RoleGuard {
    type Added = ();

    async fn run(&self, ctx: &C) -> Result<Option<()>> {
        let context = self
            .contexts
            .get(ctx.payload().user_id())
            .await?
            .unwrap_or_default();
        let has_role = context
            .get("roles")
            .and_then(Value::as_array)
            .is_some_and(|roles| roles.iter().any(|r| r.as_str() == Some(self.role.as_str())));
        Ok(has_role.then_some(()))
    }
}

/// Accepts replies to a bound message, consuming the binding; adds its data.
pub struct ReplyStage {
    replies: ReplyStore,
}

impl ReplyStage {
    pub fn new(replies: ReplyStore) -> Self {
        Self { replies }
    }
}

#[async_trait]
impl<C: Inbound + Send + Sync> Stage<C> for ReplyStage {
    type Added = Value;

    async fn run(&self, ctx: &C) -> Result<Option<Value>> {
        let TransportPayload::ReplyMessage { message, reply_to } = ctx.payload() else {
            return Ok(None);
        };
        let key = ReplyKey::new(message.chat_id, message.from.id, reply_to.message_id);
        let Some(data) = self.replies.get(key).await? else {
            return Ok(None);
        };
        // Only the caller that removed the binding may act on it.
        Ok(self.replies.delete(key).await?.then_some(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::composer::Composer;
    use crate::domain::payload::{Entity, Message, MessageRef, User};
    use crate::infrastructure::clock::ManualClock;
    use crate::infrastructure::in_memory::InMemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    fn message(text: &str) -> Message {
        Message {
            message_id: 9,
            chat_id: 3,
            from: User {
                id: 3,
                username: Some("alice".to_string()),
            },
            text: Some(text.to_string()),
            entities: Vec::new(),
            reply_to: None,
        }
    }

    fn command(text: &str) -> TransportPayload {
        let mut message = message(text);
        message.entities.push(Entity {
            kind: "bot_command".to_string(),
            offset: 0,
            length: text.len(),
        });
        TransportPayload::Command { message }
    }

    #[tokio::test]
    async fn test_command_guard() {
        let guard = CommandGuard::new("ready");
        assert_eq!(guard.run(&command("/ready")).await.unwrap(), Some(String::new()));
        assert_eq!(
            guard.run(&command("/ready@dealbot now")).await.unwrap(),
            Some("now".to_string())
        );
        assert_eq!(guard.run(&command("/readyx")).await.unwrap(), None);
        assert_eq!(
            guard
                .run(&TransportPayload::Message {
                    message: message("/ready")
                })
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_callback_guard_and_user_stage() {
        let payload = TransportPayload::CallbackQuery {
            callback: CallbackQuery {
                id: "cb".to_string(),
                from: User {
                    id: 4,
                    username: Some("bob".to_string()),
                },
                data: "callback_deal_accept:2".to_string(),
                message: Some(MessageRef {
                    message_id: 11,
                    chat_id: 40,
                }),
            },
        };
        let callback = CallbackGuard::new("callback_deal_accept:")
            .run(&payload)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(callback.id, "cb");
        assert!(
            CallbackGuard::new("callback_deal_close:")
                .run(&payload)
                .await
                .unwrap()
                .is_none()
        );

        let user = UserStage.run(&payload).await.unwrap().unwrap();
        assert_eq!(
            user,
            UserInfo {
                id: 4,
                chat_id: 40,
                username: Some("bob".to_string())
            }
        );
    }

    #[tokio::test]
    async fn test_role_guard_reads_context_roles() {
        let contexts = ContextStore::new(Arc::new(InMemoryStore::new()), "test");
        let guard = RoleGuard::new("trader", contexts.clone());
        let payload = command("/ready");
        assert!(guard.run(&payload).await.unwrap().is_none());

        let mut patch = serde_json::Map::new();
        patch.insert("roles".to_string(), json!(["admin", "trader"]));
        contexts.merge(3, &patch, false).await.unwrap();
        assert!(guard.run(&payload).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_reply_stage_consumes_binding_once() {
        let replies = ReplyStore::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(ManualClock::new(0)),
            "test",
        );
        replies
            .bind(ReplyKey::new(3, 3, 8), json!({"type": "note"}), None)
            .await
            .unwrap();

        let payload = TransportPayload::ReplyMessage {
            message: message("hello"),
            reply_to: Message {
                message_id: 8,
                ..message("Write a note")
            },
        };

        let stage = ReplyStage::new(replies.clone());
        assert_eq!(
            stage.run(&payload).await.unwrap(),
            Some(json!({"type": "note"}))
        );
        assert_eq!(stage.run(&payload).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_guards_compose_in_a_route() {
        let route = Composer::new("text")
            .with(TextGuard)
            .with(UserStage)
            .handler(|((_, text), user): ((TransportPayload, String), UserInfo)| async move {
                assert_eq!(text, "hi");
                assert_eq!(user.username.as_deref(), Some("alice"));
                Ok(())
            });
        assert!(
            route
                .handle(&TransportPayload::Message {
                    message: message("hi")
                })
                .await
                .unwrap()
        );
        assert!(!route.handle(&command("/hi")).await.unwrap());
        assert!(StartGuard.run(&command("/hi")).await.unwrap().is_none());
    }
}
