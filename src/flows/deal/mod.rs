//! Deal flow: a client opens a deal, fills in payment method and amount,
//! submits it, and one of the ready traders accepts and later closes it.
//! Submitted deals nobody accepts in time expire.

pub mod events;
pub mod handlers;
pub mod views;

pub use events::DealEvent;
pub use handlers::DealHandler;

use crate::application::event_adapter::EventAdapter;
use crate::application::flow_engine::{FlowEngine, FlowHandlerRef};
use crate::config::AppConfig;
use crate::domain::event::{EventVariants, REPLY_EXPIRED};
use crate::error::Result;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct DealSettings {
    pub trigger_text: String,
    pub methods: Vec<String>,
    pub traders: Vec<i64>,
    pub reply_ttl_ms: i64,
    pub acceptance_ttl_ms: i64,
}

impl DealSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            trigger_text: config.deals.trigger_text.clone(),
            methods: config.deals.methods.clone(),
            traders: config.deals.traders.clone(),
            reply_ttl_ms: secs_to_ms(config.timing.reply_ttl_secs),
            acceptance_ttl_ms: secs_to_ms(config.timing.acceptance_ttl_secs),
        }
    }
}

fn secs_to_ms(secs: u64) -> i64 {
    i64::try_from(secs.saturating_mul(1000)).unwrap_or(i64::MAX)
}

/// Wires the deal flow into the adapter and the engine.
///
/// The engine's catalog must already declare [`DealEvent::descriptors`].
pub fn install(adapter: &mut EventAdapter, engine: &mut FlowEngine, handler: DealHandler, trigger_text: &str) -> Result<()> {
    events::register_mappers(adapter, trigger_text);
    let handler: FlowHandlerRef = Arc::new(handler);
    for descriptor in DealEvent::descriptors() {
        engine.register_handler(descriptor.name, handler.clone())?;
    }
    engine.register_handler(REPLY_EXPIRED, handler)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_convert_ttls_to_millis() {
        let mut config = AppConfig::default();
        config.timing.reply_ttl_secs = 2;
        config.deals.traders = vec![5];
        let settings = DealSettings::from_config(&config);
        assert_eq!(settings.reply_ttl_ms, 2_000);
        assert_eq!(settings.acceptance_ttl_ms, 600_000);
        assert_eq!(settings.traders, vec![5]);
    }
}
