use super::DealSettings;
use super::events::{DealEvent, REPLY_DEAL_AMOUNT};
use super::views;
use crate::application::flow_engine::{FlowHandler, context_i64};
use crate::domain::context::{FlowContext, get_path, set_path};
use crate::domain::deal::{Amount, Deal, DealState};
use crate::domain::event::EventBody;
use crate::domain::ports::ClockRef;
use crate::domain::ui::{Keyboard, PostContext, Transition, UiInstruction};
use crate::error::Result;
use crate::stores::{ContextStore, DealStore, LiveKind, LiveMessage, LiveStore, PendingTimeout, PendingTimeouts};
use async_trait::async_trait;
use futures::FutureExt;
use serde_json::{Value, json};
use tracing::{debug, info};

const MENU_METHODS: &str = "menu_methods";
const SUM_MESSAGES: &str = "sum_messages";
const DEAL_INFO: &str = "deal_info";

/// Live group holding the trader copies of a submitted deal.
pub fn offer_group(deal_id: i64) -> String {
    format!("{DEAL_INFO}:{deal_id}")
}

/// Removes and returns a message id tracked under `<group>.<deal_id>`.
fn take_tracked(context: &mut FlowContext, group: &str, deal_id: i64) -> Option<i64> {
    let Some(Value::Object(tracked)) = context.get_mut(group) else {
        return None;
    };
    let id = tracked.remove(&deal_id.to_string())?.as_i64();
    if tracked.is_empty() {
        context.remove(group);
    }
    id
}

fn tracked(context: &FlowContext, group: &str, deal_id: i64) -> Option<i64> {
    get_path(context, &format!("{group}.{deal_id}")).and_then(Value::as_i64)
}

/// Re-renders every client summary of `deal`.
fn client_edits(deal: &Deal, keyboard: Keyboard) -> Vec<UiInstruction> {
    let text = views::summary(deal);
    deal.client_messages
        .iter()
        .map(|&message_id| {
            UiInstruction::edit(message_id, text.as_str())
                .keyboard(keyboard.clone())
                .to_chat(deal.chat_id)
        })
        .collect()
}

fn answered(mut instructions: Vec<UiInstruction>) -> Transition {
    instructions.push(UiInstruction::answer());
    Transition::enter(instructions)
}

fn answer_only() -> Option<Transition> {
    Some(UiInstruction::answer().into())
}

/// Handles every deal event and the prompts of this flow that time out.
pub struct DealHandler {
    deals: DealStore,
    contexts: ContextStore,
    live: LiveStore,
    pending: PendingTimeouts,
    clock: ClockRef,
    settings: DealSettings,
}

impl DealHandler {
    pub fn new(
        deals: DealStore,
        contexts: ContextStore,
        live: LiveStore,
        pending: PendingTimeouts,
        clock: ClockRef,
        settings: DealSettings,
    ) -> Self {
        Self {
            deals,
            contexts,
            live,
            pending,
            clock,
            settings,
        }
    }

    async fn create(&self, user_id: i64, chat_id: i64, delete_id: i64) -> Result<Option<Transition>> {
        let deal = self.deals.create(user_id, chat_id, self.clock.now_ms()).await?;
        info!(deal_id = deal.id, user_id, "Deal created");

        let deals = self.deals.clone();
        let deal_id = deal.id;
        let summary = UiInstruction::send(views::summary(&deal))
            .keyboard(views::client_keyboard(deal_id, None))
            .post(move |post: PostContext| {
                let deals = deals.clone();
                async move {
                    if let Some(message_id) = post.message_id {
                        deals.set_client_messages(deal_id, vec![message_id]).await?;
                    }
                    Ok(None)
                }
                .boxed()
            });
        Ok(Some(
            Transition::from(summary).exit([UiInstruction::remove(delete_id)]),
        ))
    }

    async fn menu_methods(&self, context: &mut FlowContext, deal_id: i64) -> Result<Option<Transition>> {
        let Some(deal) = self.deals.get(deal_id).await? else {
            return Ok(answer_only());
        };
        if !deal.state.is_editable() {
            return Ok(answer_only());
        }
        let previous = take_tracked(context, MENU_METHODS, deal_id);
        let picker = UiInstruction::send(views::METHODS_PROMPT)
            .keyboard(views::methods_keyboard(deal_id, &self.settings.methods))
            .answer_callback()
            .context(FlowContext::new())
            .bind_id(format!("{MENU_METHODS}.{deal_id}"));
        Ok(Some(
            Transition::from(picker).exit(previous.map(UiInstruction::remove)),
        ))
    }

    async fn choose_method(
        &self,
        context: &mut FlowContext,
        deal_id: i64,
        method_name: &str,
    ) -> Result<Option<Transition>> {
        if !self.settings.methods.iter().any(|m| m == method_name) {
            debug!(deal_id, method_name, "Unknown payment method");
            return Ok(answer_only());
        }
        let picker = take_tracked(context, MENU_METHODS, deal_id);
        let Some(deal) = self.deals.set_method(deal_id, method_name).await? else {
            return Ok(answer_only());
        };
        let edits = if deal.state.is_editable() {
            client_edits(&deal, views::client_keyboard(deal_id, None))
        } else {
            Vec::new()
        };
        Ok(Some(answered(edits).exit(picker.map(UiInstruction::remove))))
    }

    /// A force-reply prompt for the amount, bound for `reply_ttl`.
    fn amount_prompt(&self, user_id: i64, deal_id: i64, text: String) -> UiInstruction {
        let deadline = self.clock.now_ms() + self.settings.reply_ttl_ms;
        let live = self.live.clone();
        UiInstruction::send(text)
            .force_reply()
            .bind(json!({ "type": REPLY_DEAL_AMOUNT, "deal_id": deal_id }), Some(deadline))
            .context(FlowContext::new())
            .bind_id(format!("{SUM_MESSAGES}.{deal_id}"))
            .post(move |post: PostContext| {
                let live = live.clone();
                async move {
                    if let Some(message_id) = post.message_id {
                        let prompt = LiveMessage::new(post.chat_id, message_id)
                            .owned_by(user_id)
                            .expires_at(deadline)
                            .with_data(json!({ "deal_id": deal_id }));
                        live.add(LiveKind::Replys, REPLY_DEAL_AMOUNT, &prompt).await?;
                    }
                    Ok(None)
                }
                .boxed()
            })
    }

    async fn ask_amount(&self, context: &mut FlowContext, user_id: i64, deal_id: i64) -> Result<Option<Transition>> {
        let Some(deal) = self.deals.get(deal_id).await? else {
            return Ok(answer_only());
        };
        if !deal.state.is_editable() {
            return Ok(answer_only());
        }
        let previous = take_tracked(context, SUM_MESSAGES, deal_id);
        if let Some(previous) = previous {
            self.live.delete(LiveKind::Replys, REPLY_DEAL_AMOUNT, previous).await?;
        }
        let prompt = self
            .amount_prompt(user_id, deal_id, views::AMOUNT_PROMPT.to_string())
            .answer_callback();
        Ok(Some(
            Transition::from(prompt).exit(previous.map(UiInstruction::remove)),
        ))
    }

    async fn receive_amount(
        &self,
        context: &mut FlowContext,
        user_id: i64,
        deal_id: i64,
        amount_str: &str,
        delete_ids: &[i64],
    ) -> Result<Option<Transition>> {
        take_tracked(context, SUM_MESSAGES, deal_id);
        for &message_id in delete_ids {
            self.live.delete(LiveKind::Replys, REPLY_DEAL_AMOUNT, message_id).await?;
        }
        let cleanup: Vec<UiInstruction> = delete_ids.iter().copied().map(UiInstruction::remove).collect();

        let amount = match amount_str.parse::<Amount>() {
            Ok(amount) => amount,
            Err(err) => {
                debug!(deal_id, amount_str, error = %err, "Amount rejected");
                let retry = self.amount_prompt(user_id, deal_id, views::invalid_amount(amount_str));
                return Ok(Some(Transition::from(retry).exit(cleanup)));
            }
        };

        let edits = match self.deals.set_amount(deal_id, amount).await? {
            Some(deal) if deal.state.is_editable() => {
                client_edits(&deal, views::client_keyboard(deal_id, None))
            }
            _ => Vec::new(),
        };
        Ok(Some(Transition::enter(edits).exit(cleanup)))
    }

    /// Configured traders who declared themselves ready.
    async fn ready_traders(&self) -> Result<Vec<i64>> {
        let mut ready = Vec::new();
        for &trader in &self.settings.traders {
            let context = self.contexts.get(trader).await?.unwrap_or_default();
            if context.get("ready").and_then(Value::as_bool) == Some(true) {
                ready.push(trader);
            }
        }
        Ok(ready)
    }

    async fn submit(&self, deal_id: i64) -> Result<Option<Transition>> {
        let Some(deal) = self.deals.get(deal_id).await? else {
            return Ok(answer_only());
        };
        if !deal.state.is_editable() {
            return Ok(answer_only());
        }

        let traders = self.ready_traders().await?;
        let problem = deal
            .missing_for_submit()
            .or_else(|| traders.is_empty().then_some(views::NO_TRADERS));
        if let Some(problem) = problem {
            info!(deal_id, problem, "Deal not submitted");
            return Ok(Some(answered(client_edits(
                &deal,
                views::client_keyboard(deal_id, Some(problem)),
            ))));
        }

        let now = self.clock.now_ms();
        let Some(deal) = self.deals.submit(deal_id, now).await? else {
            return Ok(answer_only());
        };
        let deadline = now + self.settings.acceptance_ttl_ms;
        self.pending
            .register(PendingTimeout {
                deal_id,
                chat_id: deal.chat_id,
                user_id: deal.client_id,
                message_id: deal.client_messages.first().copied().unwrap_or_default(),
                deadline,
            })
            .await;
        info!(deal_id, traders = traders.len(), "Deal submitted");

        let mut instructions = client_edits(&deal, views::review_keyboard(deal_id));
        let offer = views::trader_offer(&deal);
        for trader in traders {
            let live = self.live.clone();
            let text = offer.clone();
            instructions.push(
                UiInstruction::send(offer.as_str())
                    .keyboard(views::accept_keyboard(deal_id))
                    .to_chat(trader)
                    .post(move |post: PostContext| {
                        let live = live.clone();
                        let text = text.clone();
                        async move {
                            if let Some(message_id) = post.message_id {
                                let copy = LiveMessage::new(post.chat_id, message_id)
                                    .owned_by(trader)
                                    .expires_at(deadline)
                                    .with_data(json!({ "deal_id": deal_id, "text": text }));
                                live.add(LiveKind::Edited, &offer_group(deal_id), &copy).await?;
                            }
                            Ok(None)
                        }
                        .boxed()
                    }),
            );
        }
        Ok(Some(answered(instructions)))
    }

    async fn accept(&self, context: &mut FlowContext, trader_id: i64, deal_id: i64) -> Result<Option<Transition>> {
        if !self.settings.traders.contains(&trader_id) {
            return Ok(answer_only());
        }
        // Whoever removes the pending entry owns the deal's fate.
        if self.pending.take(deal_id).await.is_none() {
            debug!(deal_id, trader_id, "Deal no longer pending");
            return Ok(answer_only());
        }
        let Some(deal) = self.deals.accept(deal_id, trader_id).await? else {
            return Ok(answer_only());
        };
        if deal.trader_id != Some(trader_id) {
            return Ok(answer_only());
        }
        info!(deal_id, trader_id, "Deal accepted");

        let mut instructions = client_edits(&deal, Keyboard::default());
        for copy in self.live.clear(LiveKind::Edited, &offer_group(deal_id)).await? {
            let instruction = if copy.user_id == Some(trader_id) {
                set_path(context, &format!("{DEAL_INFO}.{deal_id}"), Value::from(copy.message_id));
                UiInstruction::edit(copy.message_id, views::accepted_by_you(&deal))
                    .keyboard(views::close_keyboard(deal_id))
            } else {
                UiInstruction::edit(copy.message_id, views::taken_by_other(deal_id))
            };
            instructions.push(instruction.to_chat(copy.chat_id));
        }
        Ok(Some(answered(instructions)))
    }

    async fn close(
        &self,
        context: &mut FlowContext,
        trader_id: i64,
        chat_id: i64,
        deal_id: i64,
    ) -> Result<Option<Transition>> {
        let Some(deal) = self.deals.close(deal_id, trader_id, self.clock.now_ms()).await? else {
            return Ok(answer_only());
        };
        if deal.state != DealState::Closed || deal.trader_id != Some(trader_id) {
            return Ok(answer_only());
        }
        info!(deal_id, trader_id, "Deal closed");

        let mut instructions = client_edits(&deal, Keyboard::default());
        if let Some(message_id) = take_tracked(context, DEAL_INFO, deal_id) {
            instructions.push(UiInstruction::edit(message_id, views::closed_by_you(&deal)).to_chat(chat_id));
        }
        Ok(Some(answered(instructions)))
    }

    async fn expire(&self, deal_id: i64) -> Result<Option<Transition>> {
        let Some(deal) = self.deals.expire(deal_id, self.clock.now_ms()).await? else {
            return Ok(None);
        };
        if deal.state != DealState::Expired {
            return Ok(None);
        }
        info!(deal_id, "Deal expired");
        let mut instructions = client_edits(&deal, Keyboard::default());
        instructions.push(UiInstruction::send(views::expired_notice(deal_id)).to_chat(deal.chat_id));
        Ok(Some(Transition::enter(instructions)))
    }

    fn reply_expired(&self, context: &mut FlowContext, message_id: i64, data: &Value) -> Option<Transition> {
        if data.get("type").and_then(Value::as_str) != Some(REPLY_DEAL_AMOUNT) {
            return None;
        }
        let deal_id = data.get("deal_id").and_then(Value::as_i64)?;
        if tracked(context, SUM_MESSAGES, deal_id) == Some(message_id) {
            take_tracked(context, SUM_MESSAGES, deal_id);
        }
        Some(UiInstruction::send(views::amount_timed_out(deal_id)).into())
    }
}

#[async_trait]
impl FlowHandler for DealHandler {
    async fn handle(&self, event: &EventBody, context: &mut FlowContext) -> Result<Option<Transition>> {
        let user_id = context_i64(context, "user_id")?;
        let chat_id = context_i64(context, "chat_id")?;
        match event.decode::<DealEvent>()? {
            DealEvent::DealCreate { delete_id } => self.create(user_id, chat_id, delete_id).await,
            DealEvent::CallbackDealMenuMethods { deal_id } => self.menu_methods(context, deal_id).await,
            DealEvent::CallbackDealMethod {
                deal_id,
                method_name,
            } => self.choose_method(context, deal_id, &method_name).await,
            DealEvent::CallbackDealAmount { deal_id } => self.ask_amount(context, user_id, deal_id).await,
            DealEvent::ReplyDealAmount {
                deal_id,
                amount_str,
                delete_ids,
            } => {
                self.receive_amount(context, user_id, deal_id, &amount_str, &delete_ids)
                    .await
            }
            DealEvent::CallbackDealSented { deal_id } => self.submit(deal_id).await,
            DealEvent::CallbackDealAccept { deal_id } => self.accept(context, user_id, deal_id).await,
            DealEvent::CallbackDealClose { deal_id } => self.close(context, user_id, chat_id, deal_id).await,
            DealEvent::DealExpired { deal_id } => self.expire(deal_id).await,
            DealEvent::ReplyExpired { message_id, data } => Ok(self.reply_expired(context, message_id, &data)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_tracked_removes_entry_and_empty_group() {
        let mut context = FlowContext::new();
        context.insert(MENU_METHODS.to_string(), json!({"7": 30, "8": 31}));

        assert_eq!(take_tracked(&mut context, MENU_METHODS, 7), Some(30));
        assert_eq!(tracked(&context, MENU_METHODS, 8), Some(31));
        assert_eq!(take_tracked(&mut context, MENU_METHODS, 7), None);

        assert_eq!(take_tracked(&mut context, MENU_METHODS, 8), Some(31));
        assert!(!context.contains_key(MENU_METHODS));
    }

    #[test]
    fn test_client_edits_target_the_client_chat() {
        let mut deal = Deal::new(7, 10, 100, 0);
        deal.client_messages = vec![5, 6];
        let edits = client_edits(&deal, Keyboard::default());
        assert_eq!(edits.len(), 2);
        assert!(edits.iter().all(|e| e.chat_id == Some(100)));
        assert_eq!(edits[1].edit_message_id, Some(6));
    }
}
