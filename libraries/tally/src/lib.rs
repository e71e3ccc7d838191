//! This is a library for keeping a small set of per-user counters in sync with a remote document store.
//! Rendering reads a local copy, which is always updated before the remote store hears about a change.
//!
//! Syncing strategy:
//! 1. Every mutation is applied to the local [`CounterSet`] first, so the UI updates instantly.
//! 2. The matching remote write is then dispatched and left to settle on its own. Its outcome only feeds the pending-write count and the logs; a failed write is never rolled back or retried.
//! 3. Increments and decrements are sent as atomic deltas, so they commute no matter what order the network delivers them in. Resets are absolute and do not commute with deltas still in flight.
//! 4. When a user signs in, the local set is replaced with what the store holds (seeding the defaults if the store is empty). When they sign out, it goes back to the defaults and nothing is written.

pub mod counter_set;
pub mod data_model;
pub mod dispatch;
pub mod engine;
mod error;
pub mod memory;
pub mod pending;
pub mod session;
pub mod store;

#[cfg(feature = "firestore")]
pub mod firestore;

pub use counter_set::CounterSet;
pub use data_model::{Counter, CounterId, Session, UserId, default_counters};
pub use dispatch::Dispatcher;
pub use engine::{Engine, SaveStatus, Snapshot, WriteFailure};
pub use error::{AuthError, SyncError};
pub use memory::MemoryStore;
pub use pending::{PendingWrite, PendingWrites};
pub use session::{AuthStatus, LocalSessionProvider, SessionBinding, SessionProvider};
pub use store::{CounterStore, StoreOp};

slotmap::new_key_type! {
    /// Handle returned when registering a listener, used to unregister it later.
    pub struct ListenerKey;
}
