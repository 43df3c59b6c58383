use super::router::Router;
use crate::domain::payload::TransportPayload;
use crate::domain::ports::{ClockRef, SendOptions, TransportRef};
use crate::error::{DealflowError, Result, TransportError};
use crate::stores::{
    ExpiredLive, LiveKind, LiveMessage, LiveStore, PendingTimeouts, ReplyKey, ReplyStore,
};
use crate::sync::{TicketLock, Timer};
use futures::FutureExt;
use serde_json::json;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tracing::{debug, warn};

pub const OUTDATED_PREFIX: &str = "[Outdated] ";

/// What one sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub replies: usize,
    pub edited: usize,
    pub prompts: usize,
    pub timeouts: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Periodic expiry over the binding stores and the pending-timeouts list.
///
/// Expired reply bindings and timeouts re-enter the [`Router`] as
/// `reply_expired` / `timeout` payloads. Expired "edited" live messages are
/// marked outdated in place; expired "replys" prompts are deleted.
pub struct ExpirySweeper {
    router: Arc<Router>,
    transport: TransportRef,
    replies: ReplyStore,
    live: LiveStore,
    pending: PendingTimeouts,
    clock: ClockRef,
    lock: TicketLock,
    timer: Mutex<Option<Timer>>,
}

impl ExpirySweeper {
    pub fn new(
        router: Arc<Router>,
        transport: TransportRef,
        replies: ReplyStore,
        live: LiveStore,
        pending: PendingTimeouts,
        clock: ClockRef,
    ) -> Self {
        Self {
            router,
            transport,
            replies,
            live,
            pending,
            clock,
            lock: TicketLock::new(),
            timer: Mutex::new(None),
        }
    }

    /// Runs one sweep. Overlapping calls run one after the other.
    pub async fn tick(&self) -> Result<SweepReport> {
        let _release = self.lock.lock().await;
        let now = self.clock.now_ms();
        let mut report = SweepReport::default();

        for expired in self.replies.cleanup_expired(now).await? {
            report.replies += 1;
            let ReplyKey {
                chat_id,
                user_id,
                message_id,
            } = expired.key;
            self.route(TransportPayload::ReplyExpired {
                chat_id,
                user_id,
                message_id,
                data: expired.data,
            })
            .await;
        }

        for expired in self.live.cleanup_expired(LiveKind::Edited, now).await? {
            match self.mark_outdated(&expired.message).await {
                Ok(()) => report.edited += 1,
                Err(err) => self.keep_for_retry(expired, err).await,
            }
        }

        for expired in self.live.cleanup_expired(LiveKind::Replys, now).await? {
            match self.drop_prompt(&expired.message).await {
                Ok(()) => report.prompts += 1,
                Err(err) => self.keep_for_retry(expired, err).await,
            }
        }

        for timeout in self.pending.sweep(now).await {
            report.timeouts += 1;
            self.route(TransportPayload::Timeout {
                chat_id: timeout.chat_id,
                user_id: timeout.user_id,
                message_id: timeout.message_id,
                data: json!({ "deal_id": timeout.deal_id }),
            })
            .await;
        }

        if !report.is_empty() {
            debug!(?report, "Sweep finished");
        }
        Ok(report)
    }

    async fn mark_outdated(&self, message: &LiveMessage) -> Result<()> {
        let text = message
            .data
            .get("text")
            .and_then(|t| t.as_str())
            .unwrap_or_default();
        let outdated = format!("{OUTDATED_PREFIX}{text}");
        match self
            .transport
            .edit(message.chat_id, message.message_id, &outdated, &SendOptions::default())
            .await
        {
            Ok(_) | Err(TransportError::NotModified) => Ok(()),
            Err(TransportError::NotFound) => {
                debug!(message_id = message.message_id, "Outdated message already gone");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn drop_prompt(&self, message: &LiveMessage) -> Result<()> {
        match self.transport.delete(message.chat_id, message.message_id).await {
            Ok(()) | Err(TransportError::NotFound) => {}
            Err(err) => return Err(err.into()),
        }
        let user_id = message.user_id.unwrap_or(message.chat_id);
        self.replies
            .delete(ReplyKey::new(message.chat_id, user_id, message.message_id))
            .await?;
        Ok(())
    }

    /// Puts a claimed entry back so the next sweep tries it again.
    async fn keep_for_retry(&self, expired: ExpiredLive, err: DealflowError) {
        let ExpiredLive {
            kind,
            method,
            message,
        } = expired;
        warn!(
            %kind,
            %method,
            message_id = message.message_id,
            error = %err,
            "Expired live message not processed, retrying next sweep"
        );
        if let Err(err) = self.live.add(kind, &method, &message).await {
            warn!(
                %kind,
                %method,
                message_id = message.message_id,
                error = %err,
                "Expired live message dropped"
            );
        }
    }

    async fn route(&self, payload: TransportPayload) {
        let kind = payload.kind();
        if let Err(err) = self.router.handle(payload).await {
            warn!(kind, error = %err, "Expiry payload failed");
        }
    }

    /// Starts ticking every `period`. Calling it twice does nothing.
    pub fn start(self: &Arc<Self>, period: Duration) {
        let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if timer.as_ref().is_some_and(Timer::is_running) {
            return;
        }
        let sweeper: Weak<Self> = Arc::downgrade(self);
        let next = Timer::new(
            period,
            Arc::new(move || {
                let sweeper = sweeper.clone();
                async move {
                    let Some(sweeper) = sweeper.upgrade() else {
                        return;
                    };
                    if let Err(err) = sweeper.tick().await {
                        warn!(error = %err, "Sweep failed");
                    }
                }
                .boxed()
            }),
        );
        next.start();
        *timer = Some(next);
    }

    pub fn stop(&self) {
        if let Some(timer) = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            timer.stop();
        }
    }
}
