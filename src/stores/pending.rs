use crate::sync::TicketLock;
use std::sync::Arc;
use tracing::debug;

/// A deal waiting for a trader to accept it before `deadline`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTimeout {
    pub deal_id: i64,
    pub chat_id: i64,
    pub user_id: i64,
    /// The client's summary message the timeout refers to.
    pub message_id: i64,
    /// Epoch milliseconds.
    pub deadline: i64,
}

/// In-memory list of acceptance deadlines shared by the sweep and handlers.
///
/// The list lives inside a [`TicketLock`], so a timer-driven removal and an
/// event-driven removal of the same entry are ordered and exactly one of
/// them gets it.
#[derive(Clone, Default)]
pub struct PendingTimeouts {
    entries: Arc<TicketLock<Vec<PendingTimeout>>>,
}

impl PendingTimeouts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry, replacing any earlier one for the same deal.
    pub async fn register(&self, entry: PendingTimeout) {
        let mut entries = self.entries.lock().await;
        entries.retain(|e| e.deal_id != entry.deal_id);
        debug!(deal_id = entry.deal_id, deadline = entry.deadline, "Timeout registered");
        entries.push(entry);
    }

    /// Removes and returns the entry for `deal_id`, if still pending.
    pub async fn take(&self, deal_id: i64) -> Option<PendingTimeout> {
        let mut entries = self.entries.lock().await;
        let index = entries.iter().position(|e| e.deal_id == deal_id)?;
        Some(entries.remove(index))
    }

    /// Removes and returns every entry whose deadline is `<= now`.
    pub async fn sweep(&self, now: i64) -> Vec<PendingTimeout> {
        let mut entries = self.entries.lock().await;
        let (expired, pending): (Vec<_>, Vec<_>) = entries.drain(..).partition(|e| e.deadline <= now);
        *entries = pending;
        expired
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(deal_id: i64, deadline: i64) -> PendingTimeout {
        PendingTimeout {
            deal_id,
            chat_id: 1,
            user_id: 1,
            message_id: 10 + deal_id,
            deadline,
        }
    }

    #[tokio::test]
    async fn test_sweep_takes_only_due_entries() {
        let pending = PendingTimeouts::new();
        pending.register(entry(1, 100)).await;
        pending.register(entry(2, 300)).await;

        let expired = pending.sweep(200).await;
        assert_eq!(expired, vec![entry(1, 100)]);
        assert_eq!(pending.len().await, 1);
    }

    #[tokio::test]
    async fn test_register_replaces_same_deal() {
        let pending = PendingTimeouts::new();
        pending.register(entry(1, 100)).await;
        pending.register(entry(1, 500)).await;
        assert_eq!(pending.len().await, 1);
        assert!(pending.sweep(200).await.is_empty());
    }

    #[tokio::test]
    async fn test_entry_goes_to_exactly_one_remover() {
        let pending = PendingTimeouts::new();
        for round in 0..50 {
            pending.register(entry(round, 0)).await;

            let sweeper = {
                let pending = pending.clone();
                tokio::spawn(async move { pending.sweep(1).await.len() })
            };
            let taker = {
                let pending = pending.clone();
                tokio::spawn(async move { usize::from(pending.take(round).await.is_some()) })
            };

            let swept = sweeper.await.unwrap();
            let taken = taker.await.unwrap();
            assert_eq!(swept + taken, 1);
        }
        assert!(pending.is_empty().await);
    }
}
