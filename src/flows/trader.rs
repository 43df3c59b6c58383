use crate::application::composer::{Composer, Route};
use crate::application::guards::{CommandGuard, RoleGuard, UserInfo, UserStage};
use crate::domain::context::FlowContext;
use crate::domain::payload::TransportPayload;
use crate::domain::ports::{SendOptions, TransportRef};
use crate::error::Result;
use crate::stores::ContextStore;
use serde_json::{Value, json};
use tracing::info;

pub const TRADER_ROLE: &str = "trader";

/// Gives every configured trader the trader role.
pub async fn grant_roles(contexts: &ContextStore, traders: &[i64]) -> Result<()> {
    let mut patch = FlowContext::new();
    patch.insert("roles".to_string(), json!([TRADER_ROLE]));
    for &trader in traders {
        contexts.merge(trader, &patch, false).await?;
    }
    Ok(())
}

/// `/ready` for traders: toggles whether new deals are offered to them.
pub fn ready_route(contexts: ContextStore, transport: TransportRef) -> Route {
    Composer::new("ready")
        .with(CommandGuard::new("ready"))
        .with(RoleGuard::new(TRADER_ROLE, contexts.clone()))
        .with(UserStage)
        .handler(
            move |(((_, _args), ()), user): (((TransportPayload, String), ()), UserInfo)| {
                let contexts = contexts.clone();
                let transport = transport.clone();
                async move {
                    let ready = contexts
                        .get(user.id)
                        .await?
                        .and_then(|context| context.get("ready").and_then(Value::as_bool))
                        .unwrap_or(false);
                    let mut patch = FlowContext::new();
                    patch.insert("ready".to_string(), Value::Bool(!ready));
                    contexts.merge(user.id, &patch, false).await?;
                    info!(user_id = user.id, ready = !ready, "Trader readiness toggled");

                    let text = if ready {
                        "You are no longer accepting deals."
                    } else {
                        "You are now accepting deals."
                    };
                    transport
                        .send(user.chat_id, text, &SendOptions::default())
                        .await?;
                    Ok(())
                }
            },
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::in_memory::InMemoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_grant_roles_is_idempotent() {
        let contexts = ContextStore::new(Arc::new(InMemoryStore::new()), "test");
        grant_roles(&contexts, &[7]).await.unwrap();
        grant_roles(&contexts, &[7]).await.unwrap();
        let context = contexts.get(7).await.unwrap().unwrap();
        assert_eq!(context.get("roles"), Some(&json!(["trader"])));
    }
}
