//! Domain events and the catalog of event types known at startup.
//!
//! A `DomainEvent` is a tagged record `{type, user_id, chat_id, ...fields}`.
//! The set of valid tags is closed per process: it is fixed when the
//! [`EventCatalog`] is built from explicit [`EventDescriptor`] lists, and new
//! flows extend it by contributing descriptors rather than touching the
//! dispatcher.

use super::payload::TransportPayload;
use crate::error::{DealflowError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

pub type Fields = Map<String, Value>;

pub const UNKNOWN: &str = "unknown";
pub const REPLY_EXPIRED: &str = "reply_expired";
pub const TIMEOUT: &str = "timeout";

/// The variant part of an event: its tag and variant-specific fields.
///
/// Flow handlers receive this, without the `user_id`/`chat_id` base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventBody {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub fields: Fields,
}

impl EventBody {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Decodes the body into a `#[serde(tag = "type")]` enum.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let mut object = self.fields.clone();
        object.insert("type".to_string(), Value::String(self.kind.clone()));
        Ok(serde_json::from_value(Value::Object(object))?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub user_id: i64,
    pub chat_id: i64,
    #[serde(flatten)]
    pub body: EventBody,
}

impl DomainEvent {
    pub fn new(kind: impl Into<String>, user_id: i64, chat_id: i64, fields: Fields) -> Self {
        Self {
            user_id,
            chat_id,
            body: EventBody {
                kind: kind.into(),
                fields,
            },
        }
    }

    /// Builds an event from a typed variant serialized with a `type` tag.
    pub fn from_variant<T: Serialize>(user_id: i64, chat_id: i64, variant: &T) -> Result<Self> {
        let Value::Object(mut fields) = serde_json::to_value(variant)? else {
            return Err(DealflowError::InvalidEvent {
                kind: "?".to_string(),
                reason: "variant did not serialize to an object".to_string(),
            });
        };
        let Some(Value::String(kind)) = fields.remove("type") else {
            return Err(DealflowError::InvalidEvent {
                kind: "?".to_string(),
                reason: "variant has no string `type` tag".to_string(),
            });
        };
        Ok(Self::new(kind, user_id, chat_id, fields))
    }

    /// The catch-all event, carrying the original payload for diagnostics.
    pub fn unknown(payload: &TransportPayload) -> Self {
        let mut fields = Fields::new();
        fields.insert(
            "payload".to_string(),
            serde_json::to_value(payload).unwrap_or(Value::Null),
        );
        Self::new(UNKNOWN, payload.user_id(), payload.chat_id(), fields)
    }

    pub fn kind(&self) -> &str {
        &self.body.kind
    }

    pub fn is_unknown(&self) -> bool {
        self.body.kind == UNKNOWN
    }
}

/// Declares one event type and the fields every instance must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventDescriptor {
    pub name: &'static str,
    pub fields: &'static [&'static str],
}

impl EventDescriptor {
    pub const fn new(name: &'static str, fields: &'static [&'static str]) -> Self {
        Self { name, fields }
    }
}

/// Implemented by typed event enums so they can contribute descriptors.
pub trait EventVariants: Serialize + DeserializeOwned {
    fn descriptors() -> Vec<EventDescriptor>;
}

const BUILTINS: [EventDescriptor; 3] = [
    EventDescriptor::new(UNKNOWN, &["payload"]),
    EventDescriptor::new(REPLY_EXPIRED, &["message_id", "data"]),
    EventDescriptor::new(TIMEOUT, &["message_id", "data"]),
];

#[derive(Debug, Clone)]
pub struct EventCatalog {
    descriptors: HashMap<&'static str, EventDescriptor>,
}

impl EventCatalog {
    /// Builds the catalog from the built-in types plus `descriptors`.
    ///
    /// Declaring the same type twice is a configuration error.
    pub fn new(descriptors: impl IntoIterator<Item = EventDescriptor>) -> Result<Self> {
        let mut map = HashMap::new();
        for descriptor in BUILTINS.into_iter().chain(descriptors) {
            if map.insert(descriptor.name, descriptor).is_some() {
                return Err(DealflowError::Validation(format!(
                    "event type `{}` declared twice",
                    descriptor.name
                )));
            }
        }
        Ok(Self { descriptors: map })
    }

    pub fn builtin() -> Self {
        Self {
            descriptors: BUILTINS.into_iter().map(|d| (d.name, d)).collect(),
        }
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.descriptors.contains_key(kind)
    }

    pub fn descriptor(&self, kind: &str) -> Option<&EventDescriptor> {
        self.descriptors.get(kind)
    }

    /// Checks that the event's type is declared and its fields are present.
    pub fn validate(&self, event: &DomainEvent) -> Result<()> {
        let descriptor = self
            .descriptor(event.kind())
            .ok_or_else(|| DealflowError::UnknownEventType(event.kind().to_string()))?;
        if let Some(missing) = descriptor
            .fields
            .iter()
            .find(|f| !event.body.fields.contains_key(**f))
        {
            return Err(DealflowError::InvalidEvent {
                kind: event.kind().to_string(),
                reason: format!("missing field `{missing}`"),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type", rename_all = "snake_case")]
    enum Sample {
        Ping { deal_id: i64 },
    }

    #[test]
    fn test_wire_shape_is_flat() {
        let event = DomainEvent::from_variant(1, 2, &Sample::Ping { deal_id: 7 }).unwrap();
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({"type": "ping", "user_id": 1, "chat_id": 2, "deal_id": 7})
        );

        let back: DomainEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_decode_body() {
        let event = DomainEvent::from_variant(1, 2, &Sample::Ping { deal_id: 7 }).unwrap();
        let decoded: Sample = event.body.decode().unwrap();
        assert_eq!(decoded, Sample::Ping { deal_id: 7 });
    }

    #[test]
    fn test_catalog_rejects_duplicates() {
        let d = EventDescriptor::new("ping", &["deal_id"]);
        assert!(EventCatalog::new([d, d]).is_err());
        assert!(EventCatalog::new([EventDescriptor::new(UNKNOWN, &[])]).is_err());
    }

    #[test]
    fn test_catalog_validation() {
        let catalog = EventCatalog::new([EventDescriptor::new("ping", &["deal_id"])]).unwrap();

        let ok = DomainEvent::from_variant(1, 2, &Sample::Ping { deal_id: 7 }).unwrap();
        assert!(catalog.validate(&ok).is_ok());

        let missing = DomainEvent::new("ping", 1, 2, Fields::new());
        assert!(matches!(
            catalog.validate(&missing),
            Err(DealflowError::InvalidEvent { .. })
        ));

        let undeclared = DomainEvent::new("pong", 1, 2, Fields::new());
        assert!(matches!(
            catalog.validate(&undeclared),
            Err(DealflowError::UnknownEventType(_))
        ));
    }
}
