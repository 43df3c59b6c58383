//! Guard/enrichment chains in front of terminal handlers.
//!
//! A [`Composer`] starts from the inbound [`TransportPayload`] and grows its
//! accumulated context one stage at a time: `with(stage)` turns a
//! `Composer<C>` into a `Composer<(C, S::Added)>`, so the terminal handler
//! receives a nested tuple holding everything every stage contributed. A
//! stage returning `None` vetoes: later stages and the handler are skipped.

use crate::domain::payload::TransportPayload;
use crate::error::Result;
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use tracing::trace;

/// Anything that still carries the inbound payload.
pub trait Inbound {
    fn payload(&self) -> &TransportPayload;
}

impl Inbound for TransportPayload {
    fn payload(&self) -> &TransportPayload {
        self
    }
}

impl<C: Inbound, A> Inbound for (C, A) {
    fn payload(&self) -> &TransportPayload {
        self.0.payload()
    }
}

/// One link of a chain.
#[async_trait]
pub trait Stage<C: Send + Sync>: Send + Sync {
    type Added: Send + Sync + 'static;

    /// `Ok(None)` vetoes the chain; `Ok(Some(added))` accepts and extends it.
    async fn run(&self, ctx: &C) -> Result<Option<Self::Added>>;
}

type Runner<C> = Arc<dyn Fn(TransportPayload) -> BoxFuture<'static, Result<Option<C>>> + Send + Sync>;

/// A chain of stages awaiting its terminal handler.
pub struct Composer<C> {
    name: String,
    runner: Runner<C>,
}

impl Composer<TransportPayload> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            runner: Arc::new(
                |payload: TransportPayload| -> BoxFuture<'static, Result<Option<TransportPayload>>> {
                    async move { Ok(Some(payload)) }.boxed()
                },
            ),
        }
    }
}

impl<C> Composer<C>
where
    C: Send + Sync + 'static,
{
    /// Appends a stage.
    pub fn with<S>(self, stage: S) -> Composer<(C, S::Added)>
    where
        S: Stage<C> + 'static,
    {
        let previous = self.runner;
        let stage = Arc::new(stage);
        let name = self.name.clone();
        Composer {
            name: self.name,
            runner: Arc::new(move |payload: TransportPayload| -> BoxFuture<'static, Result<Option<(C, S::Added)>>> {
                let previous = previous.clone();
                let stage = stage.clone();
                let name = name.clone();
                async move {
                    let Some(ctx) = previous(payload).await? else {
                        return Ok(None);
                    };
                    match stage.run(&ctx).await? {
                        Some(added) => Ok(Some((ctx, added))),
                        None => {
                            trace!(route = %name, stage = std::any::type_name::<S>(), "Stage vetoed");
                            Ok(None)
                        }
                    }
                }
                .boxed()
            }),
        }
    }

    /// Closes the chain with its terminal handler.
    pub fn handler<F, Fut>(self, handler: F) -> Route
    where
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let runner = self.runner;
        let handler = Arc::new(handler);
        Route {
            name: self.name,
            run: Arc::new(move |payload: TransportPayload| -> BoxFuture<'static, Result<bool>> {
                let runner = runner.clone();
                let handler = handler.clone();
                async move {
                    match runner(payload).await? {
                        Some(ctx) => {
                            handler(ctx).await?;
                            Ok(true)
                        }
                        None => Ok(false),
                    }
                }
                .boxed()
            }),
        }
    }
}

/// A finished chain: runs the stages and, if all accept, the handler.
#[derive(Clone)]
pub struct Route {
    name: String,
    run: Arc<dyn Fn(TransportPayload) -> BoxFuture<'static, Result<bool>> + Send + Sync>,
}

impl Route {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` when the handler ran.
    pub async fn handle(&self, payload: &TransportPayload) -> Result<bool> {
        (self.run)(payload.clone()).await
    }
}
