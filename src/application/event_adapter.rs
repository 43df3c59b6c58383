use crate::domain::event::{DomainEvent, EventCatalog, Fields, REPLY_EXPIRED, TIMEOUT};
use crate::domain::payload::TransportPayload;
use crate::error::Result;
use crate::stores::{ReplyKey, ReplyStore};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, trace};

/// What a mapper looks at: the payload plus the binding it answers, if any.
#[derive(Debug, Clone, Copy)]
pub struct MapperInput<'a> {
    pub payload: &'a TransportPayload,
    pub bind_data: Option<&'a Value>,
}

impl MapperInput<'_> {
    /// The binding's `type` tag, when the payload answers a binding.
    pub fn bind_type(&self) -> Option<&str> {
        self.bind_data?.get("type")?.as_str()
    }
}

/// Pure function from payload shape to a domain event.
///
/// Mappers must not perform I/O; they only inspect the input.
pub trait EventMapper: Send + Sync {
    fn map(&self, input: &MapperInput<'_>) -> Option<DomainEvent>;
}

impl<F> EventMapper for F
where
    F: Fn(&MapperInput<'_>) -> Option<DomainEvent> + Send + Sync,
{
    fn map(&self, input: &MapperInput<'_>) -> Option<DomainEvent> {
        self(input)
    }
}

/// Normalizes transport payloads into [`DomainEvent`]s.
pub struct EventAdapter {
    replies: ReplyStore,
    catalog: Arc<EventCatalog>,
    mappers: Vec<Box<dyn EventMapper>>,
}

impl EventAdapter {
    pub fn new(replies: ReplyStore, catalog: Arc<EventCatalog>) -> Self {
        Self {
            replies,
            catalog,
            mappers: Vec::new(),
        }
    }

    /// Appends a mapper. Mappers are tried in registration order.
    pub fn register_mapper(&mut self, mapper: impl EventMapper + 'static) {
        self.mappers.push(Box::new(mapper));
    }

    pub fn catalog(&self) -> &EventCatalog {
        &self.catalog
    }

    /// Resolves a payload into an event.
    ///
    /// A reply to a message without a live binding is `unknown` and no
    /// mapper sees it. The binding itself is left in place; consuming it is
    /// up to the handler.
    pub async fn handle(&self, payload: &TransportPayload) -> Result<DomainEvent> {
        let bind_data = match payload {
            TransportPayload::ReplyMessage { message, reply_to } => {
                let key = ReplyKey::new(message.chat_id, message.from.id, reply_to.message_id);
                match self.replies.get(key).await? {
                    Some(data) => Some(data),
                    None => {
                        debug!(
                            chat_id = key.chat_id,
                            user_id = key.user_id,
                            message_id = key.message_id,
                            "Reply without binding"
                        );
                        return Ok(DomainEvent::unknown(payload));
                    }
                }
            }
            _ => None,
        };

        let input = MapperInput {
            payload,
            bind_data: bind_data.as_ref(),
        };
        for mapper in &self.mappers {
            if let Some(event) = mapper.map(&input) {
                self.catalog.validate(&event)?;
                trace!(kind = event.kind(), user_id = event.user_id, "Payload mapped");
                return Ok(event);
            }
        }

        Ok(Self::fallback(payload))
    }

    fn fallback(payload: &TransportPayload) -> DomainEvent {
        match payload {
            TransportPayload::ReplyExpired {
                chat_id,
                user_id,
                message_id,
                data,
            } => DomainEvent::new(
                REPLY_EXPIRED,
                *user_id,
                *chat_id,
                expiry_fields(*message_id, data),
            ),
            TransportPayload::Timeout {
                chat_id,
                user_id,
                message_id,
                data,
            } => DomainEvent::new(TIMEOUT, *user_id, *chat_id, expiry_fields(*message_id, data)),
            _ => DomainEvent::unknown(payload),
        }
    }
}

fn expiry_fields(message_id: i64, data: &Value) -> Fields {
    let mut fields = Fields::new();
    fields.insert("message_id".to_string(), Value::from(message_id));
    fields.insert("data".to_string(), data.clone());
    fields
}
