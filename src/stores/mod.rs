//! Binding stores layered over the [`KeyValueStore`](crate::domain::ports::KeyValueStore) port.
//!
//! Every store that carries an expiry treats an entry with
//! `expires_at <= now` as absent: reading it deletes it on the spot, and the
//! periodic sweep removes the rest.

pub mod context;
pub mod deal;
pub mod live;
pub mod pending;
pub mod reply;

pub use context::ContextStore;
pub use deal::DealStore;
pub use live::{ExpiredLive, LiveKind, LiveMessage, LiveStore};
pub use pending::{PendingTimeout, PendingTimeouts};
pub use reply::{ExpiredReply, ReplyKey, ReplyStore};

/// `None` never expires.
pub(crate) fn is_expired(expires_at: Option<i64>, now: i64) -> bool {
    expires_at.is_some_and(|at| at <= now)
}
