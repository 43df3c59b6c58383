//! Render directives returned by flow handlers.

use super::context::FlowContext;
use crate::error::Result;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub text: String,
    pub callback_data: String,
}

impl Button {
    pub fn new(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: callback_data.into(),
        }
    }
}

/// Rows of inline buttons.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Keyboard(pub Vec<Vec<Button>>);

impl Keyboard {
    pub fn new(rows: Vec<Vec<Button>>) -> Self {
        Self(rows)
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(Vec::is_empty)
    }
}

/// What a post hook sees once its instruction has been rendered.
#[derive(Debug, Clone)]
pub struct PostContext {
    /// The message sent or edited by the instruction, if any.
    pub message_id: Option<i64>,
    pub chat_id: i64,
    /// The user's context as stored after the instruction's own patch.
    pub context: FlowContext,
}

/// Runs after an instruction is rendered; may return a further context patch.
pub type PostHook =
    Arc<dyn Fn(PostContext) -> BoxFuture<'static, Result<Option<FlowContext>>> + Send + Sync>;

/// A single render directive.
///
/// Every facet is optional; an absent facet is a no-op. Editing and
/// sending are mutually exclusive: `edit_message_id` selects an edit.
#[derive(Clone, Default)]
pub struct UiInstruction {
    pub text: Option<String>,
    pub inline_keyboard: Keyboard,
    pub force_reply: bool,
    pub edit_message_id: Option<i64>,
    /// Render into this chat instead of the originating one.
    pub chat_id: Option<i64>,
    /// Acknowledge the originating callback query.
    pub answer_callback: bool,
    /// Reply binding payload for the rendered message.
    pub bind_data: Option<Value>,
    /// Absolute expiry of the binding, epoch milliseconds.
    pub delete_at: Option<i64>,
    /// Echo the rendered message id into the binding payload under this key.
    pub bind_echo: Option<String>,
    /// Patch merged into the user's context after rendering.
    pub context: Option<FlowContext>,
    pub strict: bool,
    /// Dotted path of the patch that receives the rendered message id.
    pub bind_id: Option<String>,
    pub post: Option<PostHook>,
}

impl UiInstruction {
    pub fn send(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn edit(message_id: i64, text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            edit_message_id: Some(message_id),
            ..Default::default()
        }
    }

    /// In `on_exit` lists: delete the message and any binding on it.
    pub fn remove(message_id: i64) -> Self {
        Self {
            edit_message_id: Some(message_id),
            ..Default::default()
        }
    }

    /// A bare callback acknowledgement.
    pub fn answer() -> Self {
        Self {
            answer_callback: true,
            ..Default::default()
        }
    }

    pub fn keyboard(mut self, keyboard: Keyboard) -> Self {
        self.inline_keyboard = keyboard;
        self
    }

    pub fn force_reply(mut self) -> Self {
        self.force_reply = true;
        self
    }

    pub fn to_chat(mut self, chat_id: i64) -> Self {
        self.chat_id = Some(chat_id);
        self
    }

    pub fn answer_callback(mut self) -> Self {
        self.answer_callback = true;
        self
    }

    pub fn bind(mut self, data: Value, delete_at: Option<i64>) -> Self {
        self.bind_data = Some(data);
        self.delete_at = delete_at;
        self
    }

    pub fn bind_echo(mut self, key: impl Into<String>) -> Self {
        self.bind_echo = Some(key.into());
        self
    }

    pub fn context(mut self, patch: FlowContext) -> Self {
        self.context = Some(patch);
        self
    }

    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn bind_id(mut self, path: impl Into<String>) -> Self {
        self.bind_id = Some(path.into());
        self
    }

    pub fn post<F>(mut self, hook: F) -> Self
    where
        F: Fn(PostContext) -> BoxFuture<'static, Result<Option<FlowContext>>> + Send + Sync + 'static,
    {
        self.post = Some(Arc::new(hook));
        self
    }

    pub fn options(&self) -> super::ports::SendOptions {
        super::ports::SendOptions {
            inline_keyboard: self.inline_keyboard.clone(),
            force_reply: self.force_reply,
        }
    }
}

impl fmt::Debug for UiInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UiInstruction")
            .field("text", &self.text)
            .field("inline_keyboard", &self.inline_keyboard)
            .field("force_reply", &self.force_reply)
            .field("edit_message_id", &self.edit_message_id)
            .field("chat_id", &self.chat_id)
            .field("answer_callback", &self.answer_callback)
            .field("bind_data", &self.bind_data)
            .field("delete_at", &self.delete_at)
            .field("bind_echo", &self.bind_echo)
            .field("context", &self.context)
            .field("strict", &self.strict)
            .field("bind_id", &self.bind_id)
            .field("post", &self.post.as_ref().map(|_| "<hook>"))
            .finish()
    }
}

/// Instructions for entering and leaving a visual state.
#[derive(Debug, Clone, Default)]
pub struct Transition {
    pub on_enter: Vec<UiInstruction>,
    pub on_exit: Vec<UiInstruction>,
}

impl Transition {
    pub fn enter(instructions: impl IntoIterator<Item = UiInstruction>) -> Self {
        Self {
            on_enter: instructions.into_iter().collect(),
            on_exit: Vec::new(),
        }
    }

    pub fn exit(mut self, instructions: impl IntoIterator<Item = UiInstruction>) -> Self {
        self.on_exit.extend(instructions);
        self
    }
}

impl From<UiInstruction> for Transition {
    fn from(instruction: UiInstruction) -> Self {
        Self::enter([instruction])
    }
}
