//! Counting of remote writes that have been dispatched but not yet settled.
//!
//! This is only a count. It does not know which writes are outstanding, and it has no
//! bearing on ordering or correctness; it exists to drive a "Saving..." indicator.

use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::Rc,
};

type Observer = Rc<dyn Fn(usize)>;

#[derive(Clone, Default)]
pub struct PendingWrites {
    inner: Rc<Inner>,
}

#[derive(Default)]
struct Inner {
    count: Cell<usize>,
    on_settle: RefCell<Option<Observer>>,
}

impl PendingWrites {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.inner.count.get()
    }

    /// Marks one write as in flight. The write counts as settled when the returned guard is dropped,
    /// so the count comes back down whether the write succeeded, failed, or was abandoned.
    #[must_use = "the write is considered settled as soon as the guard is dropped"]
    pub fn begin(&self) -> PendingWrite {
        self.inner.count.set(self.inner.count.get() + 1);
        PendingWrite {
            tracker: self.clone(),
        }
    }

    /// Called with the new count each time a write settles.
    pub fn set_observer(&self, observer: impl Fn(usize) + 'static) {
        *self.inner.on_settle.borrow_mut() = Some(Rc::new(observer));
    }

    fn end(&self) {
        let count = self.inner.count.get();
        debug_assert!(count > 0, "pending write ended more times than it began");
        let count = count.saturating_sub(1);
        self.inner.count.set(count);

        // clone out so the observer may touch the tracker again
        let observer = self.inner.on_settle.borrow().clone();
        if let Some(observer) = observer {
            observer(count);
        }
    }
}

impl fmt::Debug for PendingWrites {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingWrites")
            .field("count", &self.count())
            .finish()
    }
}

/// One in-flight write. Dropping it settles the write.
#[derive(Debug)]
pub struct PendingWrite {
    tracker: PendingWrites,
}

impl Drop for PendingWrite {
    fn drop(&mut self) {
        self.tracker.end();
    }
}
