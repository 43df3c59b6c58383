use super::composer::Route;
use super::event_adapter::EventAdapter;
use super::flow_engine::FlowEngine;
use super::ui_adapter::{RenderTarget, UiAdapter};
use crate::domain::payload::TransportPayload;
use crate::error::Result;
use crate::sync::{Ticket, TicketLock};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{error, info, instrument};

/// How a payload was consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A composed route accepted it.
    Routed(String),
    /// It resolved to an event with a handler.
    Dispatched(String),
    /// It resolved to `unknown` or to an event nobody handles.
    Dropped(String),
}

/// A user's lock, forgotten once its last handle finishes.
struct UserLock<'a> {
    users: &'a Mutex<HashMap<i64, Arc<TicketLock>>>,
    user_id: i64,
    lock: Arc<TicketLock>,
}

impl UserLock<'_> {
    fn lock(&self) -> Ticket {
        self.lock.lock()
    }
}

impl Drop for UserLock<'_> {
    fn drop(&mut self) {
        let mut users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the map and this slot still point at it.
        if Arc::strong_count(&self.lock) == 2 {
            users.remove(&self.user_id);
        }
    }
}

/// Counts from [`Router::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub handled: usize,
    pub dropped: usize,
    pub failed: usize,
}

/// Entry point for inbound payloads.
///
/// Payloads of one user are processed one at a time, in arrival order.
pub struct Router {
    adapter: EventAdapter,
    engine: FlowEngine,
    ui: UiAdapter,
    routes: Vec<Route>,
    users: Mutex<HashMap<i64, Arc<TicketLock>>>,
}

impl Router {
    pub fn new(adapter: EventAdapter, engine: FlowEngine, ui: UiAdapter) -> Self {
        Self {
            adapter,
            engine,
            ui,
            routes: Vec::new(),
            users: Mutex::new(HashMap::new()),
        }
    }

    /// Composed routes are offered the payload, in order, before the
    /// event pipeline.
    pub fn add_route(&mut self, route: Route) {
        self.routes.push(route);
    }

    pub fn engine(&self) -> &FlowEngine {
        &self.engine
    }

    fn user_lock(&self, user_id: i64) -> UserLock<'_> {
        let lock = self
            .users
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(user_id)
            .or_default()
            .clone();
        UserLock {
            users: &self.users,
            user_id,
            lock,
        }
    }

    #[instrument(skip_all, fields(kind = payload.kind(), user_id = payload.user_id()))]
    pub async fn handle(&self, payload: TransportPayload) -> Result<Outcome> {
        let user_id = payload.user_id();
        let slot = self.user_lock(user_id);
        let _release = slot.lock().await;

        for route in &self.routes {
            if route.handle(&payload).await? {
                info!(route = route.name(), "Payload routed");
                return Ok(Outcome::Routed(route.name().to_string()));
            }
        }

        let event = self.adapter.handle(&payload).await?;
        if event.is_unknown() {
            info!("Unknown payload dropped");
            return Ok(Outcome::Dropped(event.kind().to_string()));
        }
        if !self.engine.has_handler(event.kind()) {
            info!(event = event.kind(), "No handler, event dropped");
            return Ok(Outcome::Dropped(event.kind().to_string()));
        }

        let transition = self.engine.dispatch(user_id, &event).await?;
        if let Some(transition) = transition {
            let target = RenderTarget::new(user_id, payload.chat_id())
                .with_callback(payload.callback_id().map(str::to_string));
            self.ui.render(&target, &transition.on_enter).await?;
            self.ui.cleanup(&target, &transition.on_exit).await?;
        }
        Ok(Outcome::Dispatched(event.kind().to_string()))
    }

    /// Handles every payload in turn; one failure does not stop the rest.
    pub async fn run(&self, payloads: impl IntoIterator<Item = TransportPayload>) -> RunSummary {
        let mut summary = RunSummary::default();
        for payload in payloads {
            let kind = payload.kind();
            match self.handle(payload).await {
                Ok(Outcome::Dropped(_)) => summary.dropped += 1,
                Ok(_) => summary.handled += 1,
                Err(err) => {
                    error!(kind, error = %err, "Payload failed");
                    summary.failed += 1;
                }
            }
        }
        summary
    }
}
