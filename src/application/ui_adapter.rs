use crate::domain::context::{FlowContext, set_path};
use crate::domain::ports::TransportRef;
use crate::domain::ui::{PostContext, UiInstruction};
use crate::error::{Result, TransportError};
use crate::stores::{ContextStore, ReplyKey, ReplyStore};
use serde_json::Value;
use tracing::{debug, warn};

/// Who an instruction list is rendered for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTarget {
    pub user_id: i64,
    pub chat_id: i64,
    /// The callback query being answered, if the payload was one.
    pub callback_id: Option<String>,
}

impl RenderTarget {
    pub fn new(user_id: i64, chat_id: i64) -> Self {
        Self {
            user_id,
            chat_id,
            callback_id: None,
        }
    }

    pub fn with_callback(mut self, callback_id: Option<String>) -> Self {
        self.callback_id = callback_id;
        self
    }
}

/// Interprets [`UiInstruction`]s against the transport and the stores.
#[derive(Clone)]
pub struct UiAdapter {
    transport: TransportRef,
    replies: ReplyStore,
    contexts: ContextStore,
}

impl UiAdapter {
    pub fn new(transport: TransportRef, replies: ReplyStore, contexts: ContextStore) -> Self {
        Self {
            transport,
            replies,
            contexts,
        }
    }

    /// Renders every instruction in order.
    ///
    /// Returns, per instruction, the id of the message it sent or edited.
    pub async fn render(&self, target: &RenderTarget, instructions: &[UiInstruction]) -> Result<Vec<Option<i64>>> {
        let mut rendered = Vec::with_capacity(instructions.len());
        for instruction in instructions {
            rendered.push(self.render_one(target, instruction).await?);
        }
        Ok(rendered)
    }

    async fn render_one(&self, target: &RenderTarget, instruction: &UiInstruction) -> Result<Option<i64>> {
        if instruction.answer_callback
            && let Some(callback_id) = &target.callback_id
        {
            self.transport.answer_callback(callback_id).await?;
        }

        let chat_id = instruction.chat_id.unwrap_or(target.chat_id);
        let opts = instruction.options();
        let message_id = match (instruction.edit_message_id, &instruction.text) {
            (Some(message_id), Some(text)) => {
                match self.transport.edit(chat_id, message_id, text, &opts).await {
                    Ok(_) => {}
                    Err(TransportError::NotModified) => {
                        debug!(chat_id, message_id, "Edit left message unchanged");
                    }
                    Err(err) => return Err(err.into()),
                }
                Some(message_id)
            }
            (None, Some(text)) => Some(self.transport.send(chat_id, text, &opts).await?.message_id),
            (edit, None) => edit,
        };

        if let (Some(data), Some(message_id)) = (&instruction.bind_data, message_id) {
            let mut data = data.clone();
            if let (Some(key), Value::Object(object)) = (&instruction.bind_echo, &mut data) {
                object.insert(key.clone(), Value::from(message_id));
            }
            // In a private chat the chat id is the user who will answer.
            let user_id = instruction.chat_id.unwrap_or(target.user_id);
            self.replies
                .bind(ReplyKey::new(chat_id, user_id, message_id), data, instruction.delete_at)
                .await?;
        }

        let mut context: Option<FlowContext> = None;
        if let Some(patch) = &instruction.context {
            let mut patch = patch.clone();
            if let (Some(path), Some(message_id)) = (&instruction.bind_id, message_id) {
                set_path(&mut patch, path, Value::from(message_id));
            }
            context = Some(
                self.contexts
                    .merge(target.user_id, &patch, instruction.strict)
                    .await?,
            );
        }

        if let Some(post) = &instruction.post {
            let context = match context {
                Some(context) => context,
                None => self.contexts.get(target.user_id).await?.unwrap_or_default(),
            };
            let patch = post(PostContext {
                message_id,
                chat_id,
                context,
            })
            .await?;
            if let Some(patch) = patch {
                self.contexts.merge(target.user_id, &patch, false).await?;
            }
        }

        Ok(message_id)
    }

    /// Deletes every message an exit list refers to, with its reply binding.
    ///
    /// A message that is already gone is not an error.
    pub async fn cleanup(&self, target: &RenderTarget, instructions: &[UiInstruction]) -> Result<()> {
        for instruction in instructions {
            let Some(message_id) = instruction.edit_message_id else {
                continue;
            };
            let chat_id = instruction.chat_id.unwrap_or(target.chat_id);
            match self.transport.delete(chat_id, message_id).await {
                Ok(()) => {}
                Err(TransportError::NotFound) => {
                    warn!(chat_id, message_id, "Message to delete not found");
                }
                Err(err) => return Err(err.into()),
            }
            let user_id = instruction.chat_id.unwrap_or(target.user_id);
            self.replies
                .delete(ReplyKey::new(chat_id, user_id, message_id))
                .await?;
        }
        Ok(())
    }
}
