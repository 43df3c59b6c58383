use crate::domain::deal::{Amount, Deal, DealState};
use crate::domain::ports::{KeyValueStoreRef, WriteOp};
use crate::error::Result;
use tracing::{debug, info};

/// Deal records persisted as JSON, one key per deal.
#[derive(Clone)]
pub struct DealStore {
    store: KeyValueStoreRef,
    prefix: String,
}

impl DealStore {
    pub fn new(store: KeyValueStoreRef, namespace: &str) -> Self {
        Self {
            store,
            prefix: format!("{namespace}:deals"),
        }
    }

    fn key(&self, id: i64) -> String {
        format!("{}:{}", self.prefix, id)
    }

    fn ids_key(&self) -> String {
        format!("{}:ids", self.prefix)
    }

    /// Opens a new deal for `client_id`. Ids come from a counter.
    pub async fn create(&self, client_id: i64, chat_id: i64, now: i64) -> Result<Deal> {
        let id = self.store.incr(&format!("{}:last_id", self.prefix)).await?;
        let deal = Deal::new(id, client_id, chat_id, now);
        self.store
            .exec(vec![
                WriteOp::Set {
                    key: self.key(id),
                    value: serde_json::to_string(&deal)?,
                },
                WriteOp::SAdd {
                    key: self.ids_key(),
                    member: id.to_string(),
                },
            ])
            .await?;
        info!(deal_id = id, client_id, "Deal created");
        Ok(deal)
    }

    pub async fn get(&self, id: i64) -> Result<Option<Deal>> {
        match self.store.get(&self.key(id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn save(&self, deal: &Deal) -> Result<()> {
        self.store
            .exec(vec![
                WriteOp::Set {
                    key: self.key(deal.id),
                    value: serde_json::to_string(deal)?,
                },
                WriteOp::SAdd {
                    key: self.ids_key(),
                    member: deal.id.to_string(),
                },
            ])
            .await
    }

    /// Applies `change` and saves the deal when it reports a change.
    ///
    /// Returns the deal as stored afterwards, or `None` when it does not
    /// exist. A refused change leaves the deal untouched.
    async fn update<F>(&self, id: i64, change: F) -> Result<Option<Deal>>
    where
        F: FnOnce(&mut Deal) -> bool,
    {
        let Some(mut deal) = self.get(id).await? else {
            return Ok(None);
        };
        if change(&mut deal) {
            self.save(&deal).await?;
            debug!(deal_id = id, state = ?deal.state, "Deal updated");
        }
        Ok(Some(deal))
    }

    pub async fn set_method(&self, id: i64, method: &str) -> Result<Option<Deal>> {
        self.update(id, |deal| {
            if !deal.state.is_editable() {
                return false;
            }
            deal.method_name = Some(method.to_string());
            deal.refresh_draft_state();
            true
        })
        .await
    }

    pub async fn set_amount(&self, id: i64, amount: Amount) -> Result<Option<Deal>> {
        self.update(id, |deal| {
            if !deal.state.is_editable() {
                return false;
            }
            deal.amount = Some(amount);
            deal.refresh_draft_state();
            true
        })
        .await
    }

    /// Moves a complete draft to `submitted`.
    pub async fn submit(&self, id: i64, now: i64) -> Result<Option<Deal>> {
        self.update(id, |deal| {
            if !deal.state.is_editable() || deal.missing_for_submit().is_some() {
                return false;
            }
            deal.state = DealState::Submitted;
            deal.submitted_at = Some(now);
            true
        })
        .await
    }

    /// Assigns the deal to `trader_id`. Only a submitted deal can be taken.
    pub async fn accept(&self, id: i64, trader_id: i64) -> Result<Option<Deal>> {
        self.update(id, |deal| {
            if deal.state != DealState::Submitted {
                return false;
            }
            deal.state = DealState::Accepted;
            deal.trader_id = Some(trader_id);
            true
        })
        .await
    }

    pub async fn close(&self, id: i64, trader_id: i64, now: i64) -> Result<Option<Deal>> {
        self.update(id, |deal| {
            if deal.state != DealState::Accepted || deal.trader_id != Some(trader_id) {
                return false;
            }
            deal.state = DealState::Closed;
            deal.closed_at = Some(now);
            true
        })
        .await
    }

    /// Marks a submitted deal nobody accepted in time.
    pub async fn expire(&self, id: i64, now: i64) -> Result<Option<Deal>> {
        self.update(id, |deal| {
            if deal.state != DealState::Submitted {
                return false;
            }
            deal.state = DealState::Expired;
            deal.closed_at = Some(now);
            true
        })
        .await
    }

    pub async fn set_client_messages(&self, id: i64, message_ids: Vec<i64>) -> Result<Option<Deal>> {
        self.update(id, |deal| {
            deal.client_messages = message_ids;
            true
        })
        .await
    }

    pub async fn client_messages(&self, id: i64) -> Result<Vec<i64>> {
        Ok(self
            .get(id)
            .await?
            .map(|deal| deal.client_messages)
            .unwrap_or_default())
    }

    /// Every deal, ordered by id.
    pub async fn all(&self) -> Result<Vec<Deal>> {
        let mut ids: Vec<i64> = self
            .store
            .smembers(&self.ids_key())
            .await?
            .iter()
            .filter_map(|id| id.parse().ok())
            .collect();
        ids.sort_unstable();

        let mut deals = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(deal) = self.get(id).await? {
                deals.push(deal);
            }
        }
        Ok(deals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::in_memory::InMemoryStore;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn store() -> DealStore {
        DealStore::new(Arc::new(InMemoryStore::new()), "test")
    }

    #[tokio::test]
    async fn test_create_assigns_sequential_ids() {
        let deals = store();
        let first = deals.create(1, 1, 100).await.unwrap();
        let second = deals.create(2, 2, 200).await.unwrap();
        assert_eq!((first.id, second.id), (1, 2));
        assert_eq!(deals.all().await.unwrap(), vec![first, second]);
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let deals = store();
        let deal = deals.create(1, 1, 0).await.unwrap();

        let deal = deals.set_method(deal.id, "Bank").await.unwrap().unwrap();
        assert_eq!(deal.state, DealState::MethodSelected);

        // Incomplete drafts are not submitted.
        let deal = deals.submit(deal.id, 5).await.unwrap().unwrap();
        assert_eq!(deal.state, DealState::MethodSelected);

        let amount = Amount::new(dec!(100)).unwrap();
        let deal = deals.set_amount(deal.id, amount).await.unwrap().unwrap();
        assert_eq!(deal.state, DealState::AmountSet);

        let deal = deals.submit(deal.id, 10).await.unwrap().unwrap();
        assert_eq!(deal.state, DealState::Submitted);
        assert_eq!(deal.submitted_at, Some(10));

        // Submitted deals are frozen for the client.
        let deal = deals.set_method(deal.id, "Cash").await.unwrap().unwrap();
        assert_eq!(deal.method_name.as_deref(), Some("Bank"));

        let deal = deals.accept(deal.id, 9).await.unwrap().unwrap();
        assert_eq!((deal.state, deal.trader_id), (DealState::Accepted, Some(9)));

        // Only the assigned trader closes.
        let deal = deals.close(deal.id, 8, 20).await.unwrap().unwrap();
        assert_eq!(deal.state, DealState::Accepted);
        let deal = deals.close(deal.id, 9, 20).await.unwrap().unwrap();
        assert_eq!((deal.state, deal.closed_at), (DealState::Closed, Some(20)));

        // A closed deal cannot expire.
        let deal = deals.expire(deal.id, 30).await.unwrap().unwrap();
        assert_eq!(deal.state, DealState::Closed);
    }

    #[tokio::test]
    async fn test_expire_submitted() {
        let deals = store();
        let deal = deals.create(1, 1, 0).await.unwrap();
        deals.set_method(deal.id, "Bank").await.unwrap();
        deals
            .set_amount(deal.id, Amount::new(dec!(5)).unwrap())
            .await
            .unwrap();
        deals.submit(deal.id, 1).await.unwrap();

        let deal = deals.expire(deal.id, 2).await.unwrap().unwrap();
        assert_eq!(deal.state, DealState::Expired);
        let deal = deals.accept(deal.id, 9).await.unwrap().unwrap();
        assert_eq!(deal.state, DealState::Expired);
    }

    #[tokio::test]
    async fn test_client_messages_and_missing_deal() {
        let deals = store();
        let deal = deals.create(1, 1, 0).await.unwrap();
        deals.set_client_messages(deal.id, vec![4, 6]).await.unwrap();
        assert_eq!(deals.client_messages(deal.id).await.unwrap(), vec![4, 6]);

        assert!(deals.set_method(99, "Bank").await.unwrap().is_none());
        assert!(deals.client_messages(99).await.unwrap().is_empty());
    }
}
