//! An in-process [`CounterStore`].
//!
//! Besides standing in for a real backend, it can hold writes back and release them in any
//! order, drop offline, or fail on demand, which is what the engine's tests are built on.

use std::{
    cell::RefCell,
    collections::{HashMap, HashSet, VecDeque},
    rc::Rc,
};

use futures::channel::oneshot;
use indexmap::IndexMap;

use crate::{Counter, CounterId, CounterStore, StoreOp, SyncError, UserId};

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Rc<RefCell<State>>,
}

#[derive(Default)]
struct State {
    users: HashMap<UserId, IndexMap<CounterId, i64>>,
    operations: Vec<StoreOp>,
    held: bool,
    parked: VecDeque<oneshot::Sender<()>>,
    offline: bool,
    fail_next: VecDeque<SyncError>,
    unsupported: HashSet<StoreOp>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Puts records in place directly, bypassing holds and faults.
    pub fn seed(&self, user: &UserId, counters: impl IntoIterator<Item = Counter>) {
        let mut state = self.state.borrow_mut();
        let documents = state.users.entry(user.clone()).or_default();
        for counter in counters {
            documents.insert(counter.id, counter.value);
        }
    }

    pub fn value(&self, user: &UserId, id: &CounterId) -> Option<i64> {
        self.state
            .borrow()
            .users
            .get(user)
            .and_then(|documents| documents.get(id).copied())
    }

    pub fn documents(&self, user: &UserId) -> Vec<Counter> {
        self.state
            .borrow()
            .users
            .get(user)
            .map(|documents| {
                documents
                    .iter()
                    .map(|(id, value)| Counter::new(id.clone(), *value))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every operation that has been called, in call order (including ones still held).
    pub fn operations(&self) -> Vec<StoreOp> {
        self.state.borrow().operations.clone()
    }

    /// From now on, every call waits until it is released.
    pub fn hold(&self) {
        self.state.borrow_mut().held = true;
    }

    pub fn parked(&self) -> usize {
        self.state.borrow().parked.len()
    }

    /// Releases the oldest parked call. Returns false if nothing was parked.
    pub fn release_next(&self) -> bool {
        let sender = self.state.borrow_mut().parked.pop_front();
        sender.map(|sender| sender.send(())).is_some()
    }

    /// Releases the most recently parked call.
    pub fn release_last(&self) -> bool {
        let sender = self.state.borrow_mut().parked.pop_back();
        sender.map(|sender| sender.send(())).is_some()
    }

    pub fn release_all(&self) {
        let parked = std::mem::take(&mut self.state.borrow_mut().parked);
        for sender in parked {
            let _ = sender.send(());
        }
    }

    pub fn go_offline(&self) {
        self.state.borrow_mut().offline = true;
    }

    pub fn go_online(&self) {
        self.state.borrow_mut().offline = false;
    }

    /// The next call to reach the store fails with `error`.
    pub fn fail_next(&self, error: SyncError) {
        self.state.borrow_mut().fail_next.push_back(error);
    }

    pub fn unsupported(&self, op: StoreOp) {
        self.state.borrow_mut().unsupported.insert(op);
    }

    /// Records the call, waits out any hold, then decides whether the call goes through.
    async fn arrive(&self, op: StoreOp) -> Result<(), SyncError> {
        let gate = {
            let mut state = self.state.borrow_mut();
            state.operations.push(op);
            state.held.then(|| {
                let (sender, receiver) = oneshot::channel();
                state.parked.push_back(sender);
                receiver
            })
        };
        if let Some(gate) = gate {
            // a dropped sender releases too
            let _ = gate.await;
        }

        let mut state = self.state.borrow_mut();
        if state.unsupported.contains(&op) {
            return Err(SyncError::NotImplemented(op.name()));
        }
        if state.offline {
            return Err(SyncError::unavailable(
                "unavailable",
                "memory store is offline",
            ));
        }
        if let Some(error) = state.fail_next.pop_front() {
            return Err(error);
        }
        Ok(())
    }
}

impl CounterStore for MemoryStore {
    async fn list_all(&self, user: &UserId) -> Result<Vec<Counter>, SyncError> {
        self.arrive(StoreOp::ListAll).await?;
        Ok(self.documents(user))
    }

    async fn create_or_set_value(
        &self,
        user: &UserId,
        id: &CounterId,
        value: i64,
    ) -> Result<(), SyncError> {
        self.arrive(StoreOp::CreateOrSetValue).await?;
        self.state
            .borrow_mut()
            .users
            .entry(user.clone())
            .or_default()
            .insert(id.clone(), value);
        Ok(())
    }

    async fn apply_delta(
        &self,
        user: &UserId,
        id: &CounterId,
        delta: i64,
    ) -> Result<(), SyncError> {
        self.arrive(StoreOp::ApplyDelta).await?;
        let mut state = self.state.borrow_mut();
        let value = state
            .users
            .entry(user.clone())
            .or_default()
            .entry(id.clone())
            .or_insert(0);
        *value = value.saturating_add(delta);
        Ok(())
    }

    async fn delete(&self, user: &UserId, id: &CounterId) -> Result<(), SyncError> {
        self.arrive(StoreOp::Delete).await?;
        if let Some(documents) = self.state.borrow_mut().users.get_mut(user) {
            documents.shift_remove(id);
        }
        Ok(())
    }

    async fn batch_reset_existing_to_zero(&self, user: &UserId) -> Result<(), SyncError> {
        self.arrive(StoreOp::BatchReset).await?;
        if let Some(documents) = self.state.borrow_mut().users.get_mut(user) {
            documents.values_mut().for_each(|value| *value = 0);
        }
        Ok(())
    }
}
