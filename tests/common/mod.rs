#![allow(dead_code)]

use dealflow::application::router::Outcome;
use dealflow::config::AppConfig;
use dealflow::domain::payload::{CallbackQuery, Entity, Message, MessageRef, TransportPayload, User};
use dealflow::domain::ports::SendOptions;
use dealflow::infrastructure::clock::ManualClock;
use dealflow::infrastructure::console::{ConsoleTransport, TransportOp};
use dealflow::infrastructure::in_memory::InMemoryStore;
use dealflow::system::System;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const CLIENT: i64 = 1;
pub const TRADER_A: i64 = 200;
pub const TRADER_B: i64 = 201;
pub const START_MS: i64 = 1_700_000_000_000;
pub const REPLY_TTL_MS: i64 = 60_000;
pub const ACCEPTANCE_TTL_MS: i64 = 120_000;

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.store.namespace = "test".to_string();
    config.timing.reply_ttl_secs = 60;
    config.timing.acceptance_ttl_secs = 120;
    config.deals.methods = vec!["Card".to_string(), "Bank transfer".to_string()];
    config.deals.traders = vec![TRADER_A, TRADER_B];
    config
}

/// An in-memory system driven by a manual clock.
pub struct Harness {
    pub system: System,
    pub transport: ConsoleTransport,
    pub clock: ManualClock,
    callbacks: AtomicUsize,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: AppConfig) -> Self {
        let transport = ConsoleTransport::new();
        let clock = ManualClock::new(START_MS);
        let system = System::build(
            &config,
            Arc::new(InMemoryStore::new()),
            Arc::new(transport.clone()),
            Arc::new(clock.clone()),
        )
        .await
        .unwrap();
        Self {
            system,
            transport,
            clock,
            callbacks: AtomicUsize::new(0),
        }
    }

    pub async fn handle(&self, payload: TransportPayload) -> Outcome {
        self.system.router.handle(payload).await.unwrap()
    }

    /// The user types `text` into their private chat.
    pub async fn user_message(&self, user: i64, text: &str) -> Message {
        let message_id = self.transport.receive(user, text).await;
        Message {
            message_id,
            chat_id: user,
            from: User {
                id: user,
                username: None,
            },
            text: Some(text.to_string()),
            entities: Vec::new(),
            reply_to: None,
        }
    }

    pub async fn text(&self, user: i64, text: &str) -> TransportPayload {
        TransportPayload::Message {
            message: self.user_message(user, text).await,
        }
    }

    pub async fn command(&self, user: i64, text: &str) -> TransportPayload {
        let mut message = self.user_message(user, text).await;
        let length = text.split_whitespace().next().unwrap_or_default().len();
        message.entities.push(Entity {
            kind: "bot_command".to_string(),
            offset: 0,
            length,
        });
        if text == "/start" {
            TransportPayload::Start { message }
        } else {
            TransportPayload::Command { message }
        }
    }

    pub async fn reply(&self, user: i64, text: &str, reply_to: i64) -> TransportPayload {
        let message = self.user_message(user, text).await;
        let replied = self.transport.text_of(user, reply_to).await.unwrap_or_default();
        TransportPayload::ReplyMessage {
            message,
            reply_to: Message {
                message_id: reply_to,
                chat_id: user,
                from: User {
                    id: 0,
                    username: Some("dealbot".to_string()),
                },
                text: Some(replied),
                entities: Vec::new(),
                reply_to: None,
            },
        }
    }

    /// A button press on `message_id`.
    pub fn callback(&self, user: i64, data: &str, message_id: i64) -> TransportPayload {
        let n = self.callbacks.fetch_add(1, Ordering::SeqCst);
        TransportPayload::CallbackQuery {
            callback: CallbackQuery {
                id: format!("cb-{n}"),
                from: User {
                    id: user,
                    username: None,
                },
                data: data.to_string(),
                message: Some(MessageRef {
                    message_id,
                    chat_id: user,
                }),
            },
        }
    }

    pub async fn ops(&self) -> Vec<TransportOp> {
        self.transport.ops().await
    }

    /// Messages sent to `chat_id`, oldest first.
    pub async fn sent_to(&self, chat_id: i64) -> Vec<(i64, String, SendOptions)> {
        self.ops()
            .await
            .into_iter()
            .filter_map(|op| match op {
                TransportOp::Sent {
                    chat_id: chat,
                    message_id,
                    text,
                    opts,
                } if chat == chat_id => Some((message_id, text, opts)),
                _ => None,
            })
            .collect()
    }

    pub async fn last_sent_to(&self, chat_id: i64) -> (i64, String, SendOptions) {
        self.sent_to(chat_id).await.pop().unwrap()
    }

    pub async fn was_deleted(&self, chat_id: i64, message_id: i64) -> bool {
        self.ops().await.iter().any(|op| {
            *op == TransportOp::Deleted {
                chat_id,
                message_id,
            }
        })
    }

    /// Opens a deal for `user`; returns the deal id and its summary message.
    pub async fn open_deal(&self, user: i64) -> (i64, i64) {
        let payload = self.text(user, "Top up").await;
        self.handle(payload).await;
        let (summary_id, text, _) = self.last_sent_to(user).await;
        let deal_id = text
            .lines()
            .next()
            .and_then(|line| line.strip_prefix("Deal #"))
            .and_then(|id| id.parse().ok())
            .unwrap();
        (deal_id, summary_id)
    }

    pub async fn set_amount(&self, user: i64, deal_id: i64, summary_id: i64, amount: &str) {
        self.handle(self.callback(user, &format!("callback_deal_amount:{deal_id}"), summary_id))
            .await;
        let (prompt_id, _, _) = self.last_sent_to(user).await;
        let reply = self.reply(user, amount, prompt_id).await;
        self.handle(reply).await;
    }

    pub async fn set_method(&self, user: i64, deal_id: i64, summary_id: i64, method: &str) {
        self.handle(self.callback(user, &format!("callback_deal_menu_methods:{deal_id}"), summary_id))
            .await;
        let (picker_id, _, _) = self.last_sent_to(user).await;
        self.handle(self.callback(user, &format!("callback_deal_method:{method}:{deal_id}"), picker_id))
            .await;
    }

    pub async fn make_ready(&self, trader: i64) {
        let payload = self.command(trader, "/ready").await;
        assert_eq!(self.handle(payload).await, Outcome::Routed("ready".to_string()));
    }
}
