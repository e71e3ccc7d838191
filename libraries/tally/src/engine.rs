//! # Engine
//! Binds the local [`CounterSet`], the [`PendingWrites`] tracker and a [`CounterStore`] together.
//!
//! Every mutation has the same two phases:
//! 1. Apply it to the local set right away and tell listeners.
//! 2. If someone is signed in, dispatch the matching remote write and forget about it. Its
//!    outcome is only used to settle the pending count and, on failure, to log and record
//!    a [`WriteFailure`]. The local state is never compensated.
//!
//! Nothing here orders writes against each other. Deltas commute so that doesn't matter for
//! increment/decrement, but a reset can be undone by a delta that lands after it, and a delete
//! can be undone by a delta that was dispatched before it but lands after it.

use std::{cell::RefCell, fmt, rc::Rc};

use chrono::{DateTime, Utc};
use futures::future::LocalBoxFuture;
use slotmap::SlotMap;

use crate::{
    Counter, CounterId, CounterSet, CounterStore, Dispatcher, ListenerKey, PendingWrites, Session,
    StoreOp, SyncError, UserId, default_counters,
};

type Listener = Rc<dyn Fn(&Snapshot)>;

pub struct Engine<S> {
    shared: Rc<Shared<S>>,
}

impl<S> Clone for Engine<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

struct Shared<S> {
    store: S,
    dispatcher: Box<dyn Dispatcher>,
    // never hold a borrow of this across an .await or while calling listeners
    state: RefCell<LocalState>,
    pending: PendingWrites,
    listeners: RefCell<SlotMap<ListenerKey, Listener>>,
}

struct LocalState {
    session: Session,
    counters: CounterSet,
    // bumped on every session transition so late loads can tell they are stale
    epoch: u64,
    last_failure: Option<WriteFailure>,
}

/// A remote write the engine has dispatched.
enum Write {
    Delta { id: CounterId, delta: i64 },
    Delete(CounterId),
    ResetExisting,
}

impl Write {
    fn op(&self) -> StoreOp {
        match self {
            Write::Delta { .. } => StoreOp::ApplyDelta,
            Write::Delete(_) => StoreOp::Delete,
            Write::ResetExisting => StoreOp::BatchReset,
        }
    }

    fn counter_id(&self) -> Option<&CounterId> {
        match self {
            Write::Delta { id, .. } | Write::Delete(id) => Some(id),
            Write::ResetExisting => None,
        }
    }
}

/// The last remote write that failed. Kept for diagnostics only.
#[derive(Clone, Debug, PartialEq)]
pub struct WriteFailure {
    pub operation: StoreOp,
    pub user_id: UserId,
    pub counter_id: Option<CounterId>,
    pub error: SyncError,
    pub at: DateTime<Utc>,
}

/// What the presentation layer renders from.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub session: Session,
    pub counters: Vec<Counter>,
    pub pending_writes: usize,
    pub last_failure: Option<WriteFailure>,
}

impl Snapshot {
    /// Number of counters above zero.
    pub fn items_in_use(&self) -> usize {
        self.counters.iter().filter(|c| c.value > 0).count()
    }

    pub fn save_status(&self) -> SaveStatus {
        match self.pending_writes {
            0 => SaveStatus::Saved,
            n => SaveStatus::Saving(n),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveStatus {
    Saved,
    Saving(usize),
}

impl fmt::Display for SaveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaveStatus::Saved => write!(f, "Saved"),
            SaveStatus::Saving(n) => write!(f, "Saving... ({n} pending)"),
        }
    }
}

impl<S: CounterStore + 'static> Engine<S> {
    /// Starts signed out, with the default counters.
    pub fn new(store: S, dispatcher: impl Dispatcher + 'static) -> Self {
        let shared = Rc::new(Shared {
            store,
            dispatcher: Box::new(dispatcher),
            state: RefCell::new(LocalState {
                session: Session::SignedOut,
                counters: CounterSet::defaults(),
                epoch: 0,
                last_failure: None,
            }),
            pending: PendingWrites::new(),
            listeners: RefCell::new(SlotMap::with_key()),
        });

        // weak, since the tracker is owned by `shared`
        let weak = Rc::downgrade(&shared);
        shared.pending.set_observer(move |_| {
            if let Some(shared) = weak.upgrade() {
                shared.notify();
            }
        });

        Self { shared }
    }

    pub fn session(&self) -> Session {
        self.shared.state.borrow().session.clone()
    }

    pub fn counters(&self) -> Vec<Counter> {
        self.shared.state.borrow().counters.to_vec()
    }

    pub fn value(&self, id: &CounterId) -> Option<i64> {
        self.shared.state.borrow().counters.get(id)
    }

    pub fn pending_writes(&self) -> usize {
        self.shared.pending.count()
    }

    pub fn last_failure(&self) -> Option<WriteFailure> {
        self.shared.state.borrow().last_failure.clone()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.shared.snapshot()
    }

    /// `listener` is called after every local change and every settled write.
    /// It may call back into the engine.
    pub fn register_listener(&self, listener: impl Fn(&Snapshot) + 'static) -> ListenerKey {
        self.shared
            .listeners
            .borrow_mut()
            .insert(Rc::new(listener))
    }

    pub fn unregister_listener(&self, key: ListenerKey) {
        self.shared.listeners.borrow_mut().remove(key);
    }

    pub fn increment(&self, id: &CounterId) {
        self.apply_delta(id, 1);
    }

    /// No floor is enforced here. Keeping values at or above zero is up to the UI.
    pub fn decrement(&self, id: &CounterId) {
        self.apply_delta(id, -1);
    }

    fn apply_delta(&self, id: &CounterId, delta: i64) {
        let user = {
            let mut state = self.shared.state.borrow_mut();
            let value = state.counters.apply_delta(id, delta);
            log::debug!("Counter {id} is now {value} locally");
            state.session.user_id().cloned()
        };
        if let Some(user) = user {
            self.dispatch(
                user,
                Write::Delta {
                    id: id.clone(),
                    delta,
                },
            );
        }
        self.shared.notify();
    }

    pub fn delete(&self, id: &CounterId) {
        let user = {
            let mut state = self.shared.state.borrow_mut();
            if state.counters.remove(id).is_none() {
                log::debug!("Counter {id} was not present locally");
            }
            state.session.user_id().cloned()
        };
        if let Some(user) = user {
            self.dispatch(user, Write::Delete(id.clone()));
        }
        self.shared.notify();
    }

    /// Zeroes every counter, keeping the ids.
    pub fn reset_all(&self) {
        let user = {
            let mut state = self.shared.state.borrow_mut();
            state.counters.reset_values();
            state.session.user_id().cloned()
        };
        if let Some(user) = user {
            self.dispatch(user, Write::ResetExisting);
        }
        self.shared.notify();
    }

    /// Goes back to the four default counters locally.
    ///
    /// Remotely this is the same batch reset as [`Engine::reset_all`], which only touches records
    /// that still exist. Deleted defaults are not recreated remotely, so local and remote disagree
    /// until the next load.
    pub fn restart(&self) {
        let user = {
            let mut state = self.shared.state.borrow_mut();
            state.counters = CounterSet::defaults();
            state.session.user_id().cloned()
        };
        if let Some(user) = user {
            self.dispatch(user, Write::ResetExisting);
        }
        self.shared.notify();
    }

    /// Moves to `session` and runs the sign-in load in the background.
    /// Signing out takes effect before this returns.
    pub fn switch_session(&self, session: Session) {
        if let Some(load) = self.begin_session(session) {
            self.shared.dispatcher.dispatch(load);
        }
    }

    /// Moves to `session` and waits for the sign-in load, if any, to finish.
    pub async fn apply_session(&self, session: Session) {
        if let Some(load) = self.begin_session(session) {
            load.await;
        }
    }

    fn begin_session(&self, session: Session) -> Option<LocalBoxFuture<'static, ()>> {
        let epoch = {
            let mut state = self.shared.state.borrow_mut();
            state.epoch += 1;
            state.session = session.clone();
            if session == Session::SignedOut {
                state.counters = CounterSet::defaults();
            }
            state.epoch
        };
        self.shared.notify();

        match session {
            Session::SignedOut => {
                log::info!("Signed out, counters reset to defaults");
                None
            }
            Session::SignedIn(user) => {
                log::info!("Signed in as {user}, loading counters");
                let engine = self.clone();
                Some(Box::pin(async move { engine.bootstrap(user, epoch).await }))
            }
        }
    }

    async fn bootstrap(&self, user: UserId, epoch: u64) {
        let counters = self.load(&user).await;

        {
            let mut state = self.shared.state.borrow_mut();
            if state.epoch != epoch {
                log::warn!("Discarding counters loaded for {user}: session changed while loading");
                return;
            }
            state.counters = counters;
        }
        self.shared.notify();
    }

    /// Reads the user's counters. An empty store gets the defaults written to it.
    /// A failed read falls back to the defaults without writing anything.
    async fn load(&self, user: &UserId) -> CounterSet {
        let remote = match self.shared.store.list_all(user).await {
            Ok(remote) => remote,
            Err(e) => {
                log::error!("Failed to load counters for {user}: {} {e}", e.code());
                return CounterSet::defaults();
            }
        };

        if !remote.is_empty() {
            log::info!("Loaded {} counters for {user}", remote.len());
            return CounterSet::from_counters(remote);
        }

        let defaults = default_counters();
        let _pending = self.shared.pending.begin();
        if let Err(e) = self.shared.store.create_all(user, &defaults).await {
            self.shared
                .record_failure(StoreOp::CreateOrSetValue, user, None, e);
        } else {
            log::info!("Created default counters for {user}");
        }
        CounterSet::from_counters(defaults)
    }

    fn dispatch(&self, user: UserId, write: Write) {
        let pending = self.shared.pending.begin();
        log::debug!(
            "Dispatching {} for {user} ({} pending)",
            write.op(),
            self.shared.pending.count()
        );

        let shared = Rc::clone(&self.shared);
        self.shared.dispatcher.dispatch(Box::pin(async move {
            let result = match &write {
                Write::Delta { id, delta } => shared.store.apply_delta(&user, id, *delta).await,
                Write::Delete(id) => shared.store.delete(&user, id).await,
                Write::ResetExisting => shared.store.batch_reset_existing_to_zero(&user).await,
            };
            if let Err(e) = result {
                shared.record_failure(write.op(), &user, write.counter_id(), e);
            }
            // settles the write and notifies listeners
            drop(pending);
        }));
    }
}

impl<S> Shared<S> {
    fn snapshot(&self) -> Snapshot {
        let state = self.state.borrow();
        Snapshot {
            session: state.session.clone(),
            counters: state.counters.to_vec(),
            pending_writes: self.pending.count(),
            last_failure: state.last_failure.clone(),
        }
    }

    fn notify(&self) {
        let snapshot = self.snapshot();
        // clone the listeners out so they can re-enter the engine
        let listeners: Vec<Listener> = self.listeners.borrow().values().cloned().collect();
        for listener in listeners {
            listener(&snapshot);
        }
    }

    fn record_failure(
        &self,
        operation: StoreOp,
        user: &UserId,
        counter: Option<&CounterId>,
        error: SyncError,
    ) {
        match counter {
            Some(id) => log::error!(
                "{operation} failed for user {user}, counter {id}: {} {error}",
                error.code()
            ),
            None => log::error!(
                "{operation} failed for user {user}: {} {error}",
                error.code()
            ),
        }
        self.state.borrow_mut().last_failure = Some(WriteFailure {
            operation,
            user_id: user.clone(),
            counter_id: counter.cloned(),
            error,
            at: Utc::now(),
        });
    }
}
