// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Observable state machine with blocking wait-for-state.
//!
//! [`StateMachine`] wraps one value of an enumerated state type. Every change
//! is broadcast synchronously, on the thread calling [`StateMachine::set`], to
//! the registered [`StateChangeObserver`]s. Threads can block until the value
//! enters a set of target states.
//!
//! # Ordering
//!
//! Calls to `set` on one machine are serialized by a re-entrant lock held
//! across the update and the broadcast, so observers see changes in the order
//! they were applied. A handler may call `get` or `set` on the same machine
//! from within its notification.

use super::broadcaster::{Broadcaster, ObservableId};
use crate::error::{NotifyResult, Result};
use parking_lot::{Condvar, Mutex, ReentrantMutex};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Observer of state changes.
pub trait StateChangeObserver<S>: Send + Sync {
    /// Called once for every change, with the new state.
    fn on_state_changed(&self, state: S) -> NotifyResult;
}

/// Adapter turning a closure into a [`StateChangeObserver`].
pub struct StateChangeFn<F>(pub F);

impl<S, F> StateChangeObserver<S> for StateChangeFn<F>
where
    F: Fn(S) -> NotifyResult + Send + Sync,
{
    fn on_state_changed(&self, state: S) -> NotifyResult {
        (self.0)(state)
    }
}

/// Outcome of [`StateMachine::transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition<S> {
    /// The current state was accepted and the new state applied.
    Applied,
    /// The current state was not in the accepted set; nothing changed.
    Rejected(S),
}

/// Thread-safe observable holder of one state value.
pub struct StateMachine<S> {
    current: Mutex<S>,
    sequencer: ReentrantMutex<()>,
    broadcaster: Broadcaster<dyn StateChangeObserver<S>>,
}

impl<S> StateMachine<S>
where
    S: Copy + PartialEq + Debug + Send + Sync + 'static,
{
    /// Create a machine in `initial` state with no observers.
    pub fn new(initial: S) -> Self {
        Self {
            current: Mutex::new(initial),
            sequencer: ReentrantMutex::new(()),
            broadcaster: Broadcaster::new(),
        }
    }

    /// Identity of this machine (used as a forwarding-binding key).
    pub fn id(&self) -> ObservableId {
        self.broadcaster.id()
    }

    /// Current state (non-blocking snapshot).
    pub fn get(&self) -> S {
        *self.current.lock()
    }

    /// Check whether the current state equals `state`.
    pub fn is(&self, state: S) -> bool {
        self.get() == state
    }

    /// Check whether the current state is one of `states`.
    pub fn is_any_of(&self, states: &[S]) -> bool {
        states.contains(&self.get())
    }

    /// Set the state.
    ///
    /// Observers are notified only if `state` differs from the current value.
    /// A failing observer stops the broadcast and the failure is returned;
    /// the new state stays applied.
    pub fn set(&self, state: S) -> Result<()> {
        let _sequence = self.sequencer.lock();
        {
            let mut current = self.current.lock();
            if *current == state {
                return Ok(());
            }
            *current = state;
        }
        self.broadcaster.notify(|o| o.on_state_changed(state))
    }

    /// Atomically move to `to` if the current state is one of `from`.
    ///
    /// The check and the update happen under the same sequencing lock as
    /// [`set`](Self::set), so two racing transitions cannot both succeed
    /// from the same state.
    pub fn transition(&self, from: &[S], to: S) -> Result<Transition<S>> {
        let _sequence = self.sequencer.lock();
        {
            let mut current = self.current.lock();
            if !from.contains(&*current) {
                return Ok(Transition::Rejected(*current));
            }
            if *current == to {
                return Ok(Transition::Applied);
            }
            *current = to;
        }
        self.broadcaster.notify(|o| o.on_state_changed(to))?;
        Ok(Transition::Applied)
    }

    /// Block until the state equals `state`.
    pub fn wait_for(&self, state: S) -> S {
        self.wait_for_any_of(&[state])
    }

    /// Block until the state is one of `states`, returning that state.
    ///
    /// The returned value is the state actually observed, whatever its
    /// position in `states`. Blocks forever if `states` is empty.
    pub fn wait_for_any_of(&self, states: &[S]) -> S {
        if let Some(found) = self.matching(states) {
            return found;
        }

        let signal = Arc::new(WaitSignal::new());
        let _registration = WaitRegistration::install(&self.broadcaster, signal.clone());

        loop {
            let mut generation = signal.generation.lock();
            if let Some(found) = self.matching(states) {
                return found;
            }
            signal.condvar.wait(&mut generation);
        }
    }

    /// Like [`wait_for_any_of`](Self::wait_for_any_of) but gives up after
    /// `timeout`, returning `None`.
    pub fn wait_for_any_of_timeout(&self, states: &[S], timeout: Duration) -> Option<S> {
        if let Some(found) = self.matching(states) {
            return Some(found);
        }

        let deadline = Instant::now() + timeout;
        let signal = Arc::new(WaitSignal::new());
        let _registration = WaitRegistration::install(&self.broadcaster, signal.clone());

        loop {
            let mut generation = signal.generation.lock();
            if let Some(found) = self.matching(states) {
                return Some(found);
            }
            if signal
                .condvar
                .wait_until(&mut generation, deadline)
                .timed_out()
            {
                return self.matching(states);
            }
        }
    }

    /// Register an observer. Returns `false` if already registered.
    pub fn add_observer(&self, observer: Arc<dyn StateChangeObserver<S>>) -> bool {
        self.broadcaster.add_observer(observer)
    }

    /// Deregister an observer. Returns `false` if it was not registered.
    pub fn remove_observer(&self, observer: &Arc<dyn StateChangeObserver<S>>) -> bool {
        self.broadcaster.remove_observer(observer)
    }

    /// Number of registered observers (including active waiters).
    pub fn observer_count(&self) -> usize {
        self.broadcaster.observer_count()
    }

    fn matching(&self, states: &[S]) -> Option<S> {
        let current = self.get();
        states.iter().copied().find(|s| *s == current)
    }
}

impl<S> std::fmt::Debug for StateMachine<S>
where
    S: Copy + PartialEq + Debug + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMachine")
            .field("id", &self.id())
            .field("state", &self.get())
            .field("observers", &self.observer_count())
            .finish()
    }
}

/// Temporary observer that wakes blocked waiters on every change.
struct WaitSignal {
    generation: Mutex<u64>,
    condvar: Condvar,
}

impl WaitSignal {
    fn new() -> Self {
        Self {
            generation: Mutex::new(0),
            condvar: Condvar::new(),
        }
    }
}

impl<S> StateChangeObserver<S> for WaitSignal {
    fn on_state_changed(&self, _state: S) -> NotifyResult {
        let mut generation = self.generation.lock();
        *generation = generation.wrapping_add(1);
        self.condvar.notify_all();
        Ok(())
    }
}

/// Scoped registration of a waiter; removes the observer when dropped.
struct WaitRegistration<'a, S> {
    broadcaster: &'a Broadcaster<dyn StateChangeObserver<S>>,
    observer: Arc<dyn StateChangeObserver<S>>,
}

impl<'a, S: 'static> WaitRegistration<'a, S> {
    fn install(
        broadcaster: &'a Broadcaster<dyn StateChangeObserver<S>>,
        signal: Arc<WaitSignal>,
    ) -> Self {
        let observer: Arc<dyn StateChangeObserver<S>> = signal;
        broadcaster.add_observer(observer.clone());
        Self {
            broadcaster,
            observer,
        }
    }
}

impl<S> Drop for WaitRegistration<'_, S> {
    fn drop(&mut self) {
        self.broadcaster.remove_observer(&self.observer);
    }
}
