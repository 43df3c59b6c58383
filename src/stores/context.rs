use crate::domain::context::{FlowContext, deep_merge};
use crate::domain::ports::KeyValueStoreRef;
use crate::error::Result;
use tracing::debug;

/// Per-user flow context, stored as one JSON document per user.
///
/// Every write stores a full snapshot, so readers never see half a merge.
#[derive(Clone)]
pub struct ContextStore {
    store: KeyValueStoreRef,
    prefix: String,
}

impl ContextStore {
    pub fn new(store: KeyValueStoreRef, namespace: &str) -> Self {
        Self {
            store,
            prefix: format!("{namespace}:flow_ctx"),
        }
    }

    fn key(&self, user_id: i64) -> String {
        format!("{}:{}", self.prefix, user_id)
    }

    pub async fn get(&self, user_id: i64) -> Result<Option<FlowContext>> {
        match self.store.get(&self.key(user_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Replaces the stored snapshot.
    pub async fn set(&self, user_id: i64, context: &FlowContext) -> Result<()> {
        self.store
            .set(&self.key(user_id), serde_json::to_string(context)?)
            .await
    }

    /// Deep-merges `patch` into the stored context and returns the result.
    pub async fn merge(&self, user_id: i64, patch: &FlowContext, strict: bool) -> Result<FlowContext> {
        let current = self.get(user_id).await?.unwrap_or_default();
        let merged = deep_merge(&current, patch, strict);
        self.set(user_id, &merged).await?;
        debug!(user_id, keys = patch.len(), strict, "Context merged");
        Ok(merged)
    }

    pub async fn reset(&self, user_id: i64) -> Result<bool> {
        self.store.delete(&self.key(user_id)).await
    }
}
