//! The contract the engine needs from the remote, per-user counter store.

use std::fmt;

use futures::future::try_join_all;

use crate::{Counter, CounterId, SyncError, UserId};

/// A per-user keyed collection of counter records. Every operation is keyed by `(user, counter)`.
///
/// Futures returned here are driven on a single thread and need not be `Send`.
#[allow(async_fn_in_trait)]
pub trait CounterStore {
    async fn list_all(&self, user: &UserId) -> Result<Vec<Counter>, SyncError>;

    /// Writes an absolute value, creating the record if needed.
    async fn create_or_set_value(
        &self,
        user: &UserId,
        id: &CounterId,
        value: i64,
    ) -> Result<(), SyncError>;

    /// Atomically adds `delta`. A missing record is created with `delta` as its value.
    async fn apply_delta(&self, user: &UserId, id: &CounterId, delta: i64)
    -> Result<(), SyncError>;

    /// Removes a record. Removing a record that does not exist is not an error.
    async fn delete(&self, user: &UserId, id: &CounterId) -> Result<(), SyncError>;

    /// Sets every record that currently exists to zero, in as few batches as the backend allows.
    /// Never creates records.
    async fn batch_reset_existing_to_zero(&self, user: &UserId) -> Result<(), SyncError>;

    /// Writes a whole set of counters, e.g. the defaults for a fresh user.
    async fn create_all(&self, user: &UserId, counters: &[Counter]) -> Result<(), SyncError> {
        try_join_all(
            counters
                .iter()
                .map(|counter| self.create_or_set_value(user, &counter.id, counter.value)),
        )
        .await?;
        Ok(())
    }
}

/// Names the remote operations, for diagnostics and for store adapters that opt out of some of them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreOp {
    ListAll,
    CreateOrSetValue,
    ApplyDelta,
    Delete,
    BatchReset,
}

impl StoreOp {
    pub fn name(self) -> &'static str {
        match self {
            StoreOp::ListAll => "list_all",
            StoreOp::CreateOrSetValue => "create_or_set_value",
            StoreOp::ApplyDelta => "apply_delta",
            StoreOp::Delete => "delete",
            StoreOp::BatchReset => "batch_reset_existing_to_zero",
        }
    }
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
