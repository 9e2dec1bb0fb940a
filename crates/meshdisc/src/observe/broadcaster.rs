// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! One-to-many notification primitive.
//!
//! A [`Broadcaster`] holds the registered observers of one observable object.
//! The observer capability is an ordinary trait whose notification methods all
//! return [`NotifyResult`](crate::NotifyResult); a broadcast is a closure that
//! invokes one of those methods on every observer.
//!
//! ```ignore
//! let broadcaster: Broadcaster<dyn StateChangeObserver<Mode>> = Broadcaster::new();
//! broadcaster.add_observer(Arc::new(MyObserver));
//! broadcaster.notify(|o| o.on_state_changed(Mode::Active))?;
//! ```

use crate::error::{NotifyResult, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_OBSERVABLE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of an observable (broadcaster or state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObservableId(u64);

impl ObservableId {
    pub(crate) fn next() -> Self {
        Self(NEXT_OBSERVABLE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw identifier value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Registry of observers with synchronous broadcast.
///
/// Observers are identified by their `Arc` allocation and kept in insertion
/// order. Adding the same `Arc` twice has no effect.
pub struct Broadcaster<O: ?Sized> {
    id: ObservableId,
    observers: Mutex<Vec<Arc<O>>>,
}

impl<O: ?Sized> Broadcaster<O> {
    /// Create an empty broadcaster.
    pub fn new() -> Self {
        Self {
            id: ObservableId::next(),
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Identity of this broadcaster.
    pub fn id(&self) -> ObservableId {
        self.id
    }

    /// Register an observer. Returns `false` if it was already registered.
    pub fn add_observer(&self, observer: Arc<O>) -> bool {
        let mut observers = self.observers.lock();
        if observers.iter().any(|o| same_observer(o, &observer)) {
            return false;
        }
        observers.push(observer);
        true
    }

    /// Deregister an observer. Returns `false` if it was not registered.
    pub fn remove_observer(&self, observer: &Arc<O>) -> bool {
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|o| !same_observer(o, observer));
        observers.len() != before
    }

    /// Check whether an observer is registered.
    pub fn contains(&self, observer: &Arc<O>) -> bool {
        self.observers
            .lock()
            .iter()
            .any(|o| same_observer(o, observer))
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }

    /// Invoke `notification` on every registered observer.
    ///
    /// Observers are snapshotted first, so handlers may add or remove
    /// observers (including themselves) without deadlocking. The first
    /// failing handler stops the broadcast and its error is returned.
    pub fn notify<F>(&self, mut notification: F) -> Result<()>
    where
        F: FnMut(&O) -> NotifyResult,
    {
        let snapshot: Vec<Arc<O>> = self.observers.lock().clone();
        for observer in &snapshot {
            notification(observer)?;
        }
        Ok(())
    }
}

impl<O: ?Sized> Default for Broadcaster<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: ?Sized> std::fmt::Debug for Broadcaster<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcaster")
            .field("id", &self.id)
            .field("observers", &self.observer_count())
            .finish()
    }
}

fn same_observer<O: ?Sized>(a: &Arc<O>, b: &Arc<O>) -> bool {
    std::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
}
