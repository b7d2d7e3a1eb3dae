//! The user store the hub writes last-seen times to.

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

/// User store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The user id is not valid for this store.
    #[error("Invalid user id: {0}")]
    InvalidUserId(String),

    /// The backing store failed.
    #[error("Store error: {0}")]
    Backend(String),
}

/// Persistence the hub depends on.
///
/// Failures are logged by the hub and never roll back presence state.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Persist the time a user was last reachable, in milliseconds since the
    /// Unix epoch.
    async fn update_last_seen(&self, user_id: &str, last_seen: u64) -> Result<(), StoreError>;

    /// Store name for logs.
    fn name(&self) -> &'static str;
}

/// A store that keeps nothing, for deployments without a database.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullUserStore;

#[async_trait]
impl UserStore for NullUserStore {
    async fn update_last_seen(&self, user_id: &str, last_seen: u64) -> Result<(), StoreError> {
        debug!(user = %user_id, last_seen, "Discarding last-seen update");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "null"
    }
}
