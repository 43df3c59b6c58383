use crate::application::event_adapter::EventAdapter;
use crate::application::expiry::ExpirySweeper;
use crate::application::flow_engine::FlowEngine;
use crate::application::router::Router;
use crate::application::ui_adapter::UiAdapter;
use crate::config::AppConfig;
use crate::domain::event::{EventCatalog, EventVariants};
use crate::domain::ports::{ClockRef, KeyValueStoreRef, TransportRef};
use crate::error::Result;
use crate::flows::deal::{self, DealEvent, DealHandler, DealSettings};
use crate::flows::{start, trader};
use crate::stores::{ContextStore, DealStore, LiveStore, PendingTimeouts, ReplyStore};
use std::sync::Arc;
use tracing::info;

/// A fully wired instance: stores, router and sweeper over the given ports.
pub struct System {
    pub router: Arc<Router>,
    pub sweeper: Arc<ExpirySweeper>,
    pub deals: DealStore,
    pub contexts: ContextStore,
    pub replies: ReplyStore,
    pub live: LiveStore,
    pub pending: PendingTimeouts,
}

impl System {
    pub async fn build(
        config: &AppConfig,
        store: KeyValueStoreRef,
        transport: TransportRef,
        clock: ClockRef,
    ) -> Result<Self> {
        let namespace = config.store.namespace.as_str();
        let replies = ReplyStore::new(store.clone(), clock.clone(), namespace);
        let contexts = ContextStore::new(store.clone(), namespace);
        let live = LiveStore::new(store.clone(), clock.clone(), namespace);
        let deals = DealStore::new(store, namespace);
        let pending = PendingTimeouts::new();

        let catalog = Arc::new(EventCatalog::new(DealEvent::descriptors())?);
        let mut adapter = EventAdapter::new(replies.clone(), catalog.clone());
        let mut engine = FlowEngine::new(contexts.clone(), catalog);

        let settings = DealSettings::from_config(config);
        trader::grant_roles(&contexts, &settings.traders).await?;
        let trigger_text = settings.trigger_text.clone();
        let handler = DealHandler::new(
            deals.clone(),
            contexts.clone(),
            live.clone(),
            pending.clone(),
            clock.clone(),
            settings,
        );
        deal::install(&mut adapter, &mut engine, handler, &trigger_text)?;

        let ui = UiAdapter::new(transport.clone(), replies.clone(), contexts.clone());
        let mut router = Router::new(adapter, engine, ui);
        router.add_route(start::route(contexts.clone(), transport.clone(), &trigger_text));
        router.add_route(trader::ready_route(contexts.clone(), transport.clone()));
        let router = Arc::new(router);

        let sweeper = Arc::new(ExpirySweeper::new(
            router.clone(),
            transport,
            replies.clone(),
            live.clone(),
            pending.clone(),
            clock,
        ));
        info!(namespace, traders = config.deals.traders.len(), "System ready");

        Ok(Self {
            router,
            sweeper,
            deals,
            contexts,
            replies,
            live,
            pending,
        })
    }
}
