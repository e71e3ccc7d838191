//! Where detached remote writes get run.
//!
//! Everything happens on one logical thread, so the futures handed over here are not `Send`.

use futures::future::LocalBoxFuture;
use futures::task::LocalSpawnExt as _;

pub trait Dispatcher {
    /// Starts `task` in the background. It must eventually be polled to completion;
    /// there is no way to cancel it once dispatched.
    fn dispatch(&self, task: LocalBoxFuture<'static, ()>);
}

impl Dispatcher for futures::executor::LocalSpawner {
    fn dispatch(&self, task: LocalBoxFuture<'static, ()>) {
        if let Err(e) = self.spawn_local(task) {
            log::error!("Failed to dispatch remote write: {e:?}");
        }
    }
}
