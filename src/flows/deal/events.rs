use crate::application::event_adapter::{EventAdapter, MapperInput};
use crate::domain::event::{DomainEvent, EventDescriptor, EventVariants};
use crate::domain::payload::TransportPayload;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const REPLY_DEAL_AMOUNT: &str = "reply_deal_amount";

/// Events of the deal flow.
///
/// `ReplyExpired` is the built-in `reply_expired` event, decoded here so the
/// flow can react to its own prompts timing out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DealEvent {
    DealCreate {
        delete_id: i64,
    },
    CallbackDealMenuMethods {
        deal_id: i64,
    },
    CallbackDealMethod {
        deal_id: i64,
        method_name: String,
    },
    CallbackDealAmount {
        deal_id: i64,
    },
    ReplyDealAmount {
        deal_id: i64,
        amount_str: String,
        delete_ids: Vec<i64>,
    },
    CallbackDealSented {
        deal_id: i64,
    },
    CallbackDealAccept {
        deal_id: i64,
    },
    CallbackDealClose {
        deal_id: i64,
    },
    DealExpired {
        deal_id: i64,
    },
    ReplyExpired {
        message_id: i64,
        data: Value,
    },
}

impl EventVariants for DealEvent {
    fn descriptors() -> Vec<EventDescriptor> {
        vec![
            EventDescriptor::new("deal_create", &["delete_id"]),
            EventDescriptor::new("callback_deal_menu_methods", &["deal_id"]),
            EventDescriptor::new("callback_deal_method", &["deal_id", "method_name"]),
            EventDescriptor::new("callback_deal_amount", &["deal_id"]),
            EventDescriptor::new(REPLY_DEAL_AMOUNT, &["deal_id", "amount_str", "delete_ids"]),
            EventDescriptor::new("callback_deal_sented", &["deal_id"]),
            EventDescriptor::new("callback_deal_accept", &["deal_id"]),
            EventDescriptor::new("callback_deal_close", &["deal_id"]),
            EventDescriptor::new("deal_expired", &["deal_id"]),
        ]
    }
}

fn event(payload: &TransportPayload, variant: DealEvent) -> Option<DomainEvent> {
    DomainEvent::from_variant(payload.user_id(), payload.chat_id(), &variant).ok()
}

/// `<prefix><id>` callback data.
fn callback_id(payload: &TransportPayload, prefix: &str) -> Option<i64> {
    payload.callback()?.data.strip_prefix(prefix)?.parse().ok()
}

fn map_create(trigger: &str, input: &MapperInput<'_>) -> Option<DomainEvent> {
    let TransportPayload::Message { message } = input.payload else {
        return None;
    };
    if !message.text().starts_with(trigger) {
        return None;
    }
    event(
        input.payload,
        DealEvent::DealCreate {
            delete_id: message.message_id,
        },
    )
}

fn map_menu_methods(input: &MapperInput<'_>) -> Option<DomainEvent> {
    let deal_id = callback_id(input.payload, "callback_deal_menu_methods:")?;
    event(input.payload, DealEvent::CallbackDealMenuMethods { deal_id })
}

/// `callback_deal_method:<method name>:<deal id>`
fn map_method(input: &MapperInput<'_>) -> Option<DomainEvent> {
    let rest = input
        .payload
        .callback()?
        .data
        .strip_prefix("callback_deal_method:")?;
    let (method_name, deal_id) = rest.rsplit_once(':')?;
    event(
        input.payload,
        DealEvent::CallbackDealMethod {
            deal_id: deal_id.parse().ok()?,
            method_name: method_name.to_string(),
        },
    )
}

fn map_amount(input: &MapperInput<'_>) -> Option<DomainEvent> {
    let deal_id = callback_id(input.payload, "callback_deal_amount:")?;
    event(input.payload, DealEvent::CallbackDealAmount { deal_id })
}

fn map_amount_reply(input: &MapperInput<'_>) -> Option<DomainEvent> {
    let TransportPayload::ReplyMessage { message, reply_to } = input.payload else {
        return None;
    };
    if input.bind_type() != Some(REPLY_DEAL_AMOUNT) {
        return None;
    }
    let deal_id = input.bind_data?.get("deal_id")?.as_i64()?;
    event(
        input.payload,
        DealEvent::ReplyDealAmount {
            deal_id,
            amount_str: message.text().to_string(),
            delete_ids: vec![message.message_id, reply_to.message_id],
        },
    )
}

fn map_sented(input: &MapperInput<'_>) -> Option<DomainEvent> {
    let deal_id = callback_id(input.payload, "callback_deal_sented:")?;
    event(input.payload, DealEvent::CallbackDealSented { deal_id })
}

fn map_accept(input: &MapperInput<'_>) -> Option<DomainEvent> {
    let deal_id = callback_id(input.payload, "callback_deal_accept:")?;
    event(input.payload, DealEvent::CallbackDealAccept { deal_id })
}

fn map_close(input: &MapperInput<'_>) -> Option<DomainEvent> {
    let deal_id = callback_id(input.payload, "callback_deal_close:")?;
    event(input.payload, DealEvent::CallbackDealClose { deal_id })
}

fn map_timeout(input: &MapperInput<'_>) -> Option<DomainEvent> {
    let TransportPayload::Timeout { data, .. } = input.payload else {
        return None;
    };
    let deal_id = data.get("deal_id")?.as_i64()?;
    event(input.payload, DealEvent::DealExpired { deal_id })
}

/// Registers the deal mappers, most specific first.
pub fn register_mappers(adapter: &mut EventAdapter, trigger_text: &str) {
    let trigger = trigger_text.to_string();
    adapter.register_mapper(map_amount_reply);
    adapter.register_mapper(map_timeout);
    adapter.register_mapper(map_menu_methods);
    adapter.register_mapper(map_method);
    adapter.register_mapper(map_amount);
    adapter.register_mapper(map_sented);
    adapter.register_mapper(map_accept);
    adapter.register_mapper(map_close);
    adapter.register_mapper(move |input: &MapperInput<'_>| map_create(&trigger, input));
}
