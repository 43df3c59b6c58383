use crate::application::composer::{Composer, Route};
use crate::application::guards::{StartGuard, UserInfo, UserStage};
use crate::domain::context::FlowContext;
use crate::domain::payload::TransportPayload;
use crate::domain::ports::{SendOptions, TransportRef};
use crate::stores::ContextStore;
use tracing::info;

pub fn greeting(trigger_text: &str) -> String {
    format!("Welcome! Send \"{trigger_text}\" to open a deal.")
}

/// `/start`: forgets everything about the user except their roles, then
/// greets them.
pub fn route(contexts: ContextStore, transport: TransportRef, trigger_text: &str) -> Route {
    let greeting = greeting(trigger_text);
    Composer::new("start")
        .with(StartGuard)
        .with(UserStage)
        .handler(move |((_, ()), user): ((TransportPayload, ()), UserInfo)| {
            let contexts = contexts.clone();
            let transport = transport.clone();
            let greeting = greeting.clone();
            async move {
                let roles = contexts
                    .get(user.id)
                    .await?
                    .and_then(|mut context| context.remove("roles"));
                contexts.reset(user.id).await?;
                if let Some(roles) = roles {
                    let mut kept = FlowContext::new();
                    kept.insert("roles".to_string(), roles);
                    contexts.set(user.id, &kept).await?;
                }
                info!(user_id = user.id, username = ?user.username, "User started");
                transport
                    .send(user.chat_id, &greeting, &SendOptions::default())
                    .await?;
                Ok(())
            }
        })
}
