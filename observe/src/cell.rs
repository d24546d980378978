//! Latest-value cell shared between an adapter and the callbacks feeding it.
//!
//! Every attached source gets a [`Writer`] bound to an epoch. Starting a new
//! epoch (identity change, source swap, teardown) happens under the same lock
//! that writers take, so once [`LatestCell::next_epoch`] or
//! [`LatestCell::close`] returns, no writer of an earlier epoch can change the
//! value any more.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

struct Shared<T> {
    epoch: Mutex<u64>,
    value: watch::Sender<T>,
}

impl<T> Shared<T> {
    fn epoch(&self) -> MutexGuard<'_, u64> {
        self.epoch.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub(crate) struct LatestCell<T> {
    shared: Arc<Shared<T>>,
}

impl<T> LatestCell<T> {
    pub(crate) fn new(initial: T) -> Self {
        let (value, _) = watch::channel(initial);
        Self {
            shared: Arc::new(Shared {
                epoch: Mutex::new(0),
                value,
            }),
        }
    }

    pub(crate) fn get(&self) -> T
    where
        T: Clone,
    {
        self.shared.value.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<T> {
        self.shared.value.subscribe()
    }

    /// Invalidate all writers, reset the value, and hand out the writer for
    /// the new epoch.
    pub(crate) fn next_epoch(&self, reset: T) -> Writer<T> {
        let mut epoch = self.shared.epoch();
        *epoch += 1;
        self.shared.value.send_replace(reset);
        Writer {
            shared: Arc::clone(&self.shared),
            epoch: *epoch,
        }
    }

    /// Invalidate all writers and reset the value.
    pub(crate) fn close(&self, reset: T) {
        let mut epoch = self.shared.epoch();
        *epoch += 1;
        self.shared.value.send_replace(reset);
    }
}

pub(crate) struct Writer<T> {
    shared: Arc<Shared<T>>,
    epoch: u64,
}

impl<T> Writer<T> {
    /// Store `value` if this writer's epoch is still current. Returns whether
    /// the value was applied.
    pub(crate) fn write(&self, value: T) -> bool {
        let epoch = self.shared.epoch();
        if *epoch != self.epoch {
            return false;
        }
        self.shared.value.send_replace(value);
        true
    }

    /// Wake receivers without changing the value, if this writer's epoch is
    /// still current.
    pub(crate) fn notify(&self) -> bool {
        let epoch = self.shared.epoch();
        if *epoch != self.epoch {
            return false;
        }
        self.shared.value.send_modify(|_| {});
        true
    }

    pub(crate) fn is_current(&self) -> bool {
        *self.shared.epoch() == self.epoch
    }
}
