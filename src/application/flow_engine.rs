use crate::domain::context::FlowContext;
use crate::domain::event::{DomainEvent, EventBody, EventCatalog};
use crate::domain::ui::Transition;
use crate::error::{DealflowError, Result};
use crate::stores::ContextStore;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Business logic for one or more event types.
///
/// The handler receives the event without its `user_id`/`chat_id` base
/// (those are seeded into `context`) and may mutate the context in place.
/// It must tolerate seeing the same logical event twice.
#[async_trait]
pub trait FlowHandler: Send + Sync {
    async fn handle(&self, event: &EventBody, context: &mut FlowContext) -> Result<Option<Transition>>;
}

pub type FlowHandlerRef = Arc<dyn FlowHandler>;

/// One handler per event type, dispatched against per-user context.
pub struct FlowEngine {
    contexts: ContextStore,
    catalog: Arc<EventCatalog>,
    handlers: HashMap<String, FlowHandlerRef>,
}

impl FlowEngine {
    pub fn new(contexts: ContextStore, catalog: Arc<EventCatalog>) -> Self {
        Self {
            contexts,
            catalog,
            handlers: HashMap::new(),
        }
    }

    /// Registers `handler` for `kind`.
    ///
    /// Fails if the type is not in the catalog or already has a handler.
    pub fn register_handler(&mut self, kind: &str, handler: FlowHandlerRef) -> Result<()> {
        if !self.catalog.contains(kind) {
            return Err(DealflowError::UnknownEventType(kind.to_string()));
        }
        if self.handlers.contains_key(kind) {
            return Err(DealflowError::DuplicateHandler(kind.to_string()));
        }
        self.handlers.insert(kind.to_string(), handler);
        debug!(kind, "Handler registered");
        Ok(())
    }

    pub fn has_handler(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Runs the handler for `event` against `user_id`'s context.
    ///
    /// Events without a handler are dropped. Otherwise the context is saved
    /// after the handler returns, whether or not it changed. Handler errors
    /// propagate and leave the stored context untouched.
    pub async fn dispatch(&self, user_id: i64, event: &DomainEvent) -> Result<Option<Transition>> {
        let Some(handler) = self.handlers.get(event.kind()) else {
            info!(kind = event.kind(), user_id, "No handler, event dropped");
            return Ok(None);
        };

        let mut context = self.contexts.get(user_id).await?.unwrap_or_default();
        context.insert("user_id".to_string(), Value::from(event.user_id));
        context.insert("chat_id".to_string(), Value::from(event.chat_id));

        let transition = handler.handle(&event.body, &mut context).await?;
        self.contexts.set(user_id, &context).await?;
        debug!(kind = event.kind(), user_id, "Event dispatched");
        Ok(transition)
    }

    pub async fn get_user_context(&self, user_id: i64) -> Result<FlowContext> {
        Ok(self.contexts.get(user_id).await?.unwrap_or_default())
    }

    pub async fn reset_user_context(&self, user_id: i64) -> Result<()> {
        self.contexts.reset(user_id).await?;
        Ok(())
    }
}

/// Reads an integer the dispatcher seeded into the context.
pub fn context_i64(context: &FlowContext, key: &str) -> Result<i64> {
    context
        .get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| DealflowError::Validation(format!("context has no integer `{key}`")))
}
