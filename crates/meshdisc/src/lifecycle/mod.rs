// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Observable start/stop lifecycle shared by every long-running component.
//!
//! ```text
//!            start()             did_start()
//!  Stopped ----------> Starting -------------> Started
//!     ^                   |                       |
//!     |   abort_start()   |                       | stop()
//!     +-------------------+                       v
//!     +------------------------------------- Stopping
//!                    did_stop()
//! ```
//!
//! A component embeds a [`Lifecycle`] and implements [`LifecycleObject`],
//! supplying the `start_impl`/`stop_impl` hooks. The hooks report completion
//! with [`Lifecycle::did_start`] / [`Lifecycle::did_stop`], possibly later and
//! from another thread.
//!
//! The internal [`StateMachine`] is bound to the component's own broadcaster
//! through the injected [`StateForwardingRegistry`], so observers registered
//! on the component hear every transition. The binding is removed by
//! [`Lifecycle::close`].

mod periodic;

pub use periodic::{PeriodTask, PeriodicLifecycle, PeriodicWork};

use crate::error::{Error, Result};
use crate::observe::{
    Broadcaster, StateChangeObserver, StateForwardingRegistry, StateMachine, Transition,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle states. Transitions follow the cycle
/// Stopped -> Starting -> Started -> Stopping -> Stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Not running.
    Stopped,
    /// Setup in progress.
    Starting,
    /// Running.
    Started,
    /// Teardown in progress.
    Stopping,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Started => "started",
            Self::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Plain observer of lifecycle transitions.
pub type LifecycleObserver = dyn StateChangeObserver<LifecycleState>;

/// Lifecycle state plus the component's own observer broadcaster.
///
/// `O` is the component's observer capability; it must at least observe
/// lifecycle transitions.
pub struct Lifecycle<O: ?Sized = LifecycleObserver> {
    state: StateMachine<LifecycleState>,
    broadcaster: Arc<Broadcaster<O>>,
    registry: Arc<StateForwardingRegistry>,
    bound: AtomicBool,
}

impl<O> Lifecycle<O>
where
    O: ?Sized + StateChangeObserver<LifecycleState> + Send + Sync + 'static,
{
    /// Create a stopped lifecycle and bind it to its own broadcaster.
    ///
    /// Fails with [`Error::IllegalState`] if the self-binding cannot be
    /// established.
    pub fn new(registry: Arc<StateForwardingRegistry>) -> Result<Self> {
        let state = StateMachine::new(LifecycleState::Stopped);
        let broadcaster = Arc::new(Broadcaster::new());

        if !registry.bind(&state, &broadcaster) {
            return Err(Error::IllegalState(
                "lifecycle self-binding already established".to_string(),
            ));
        }

        Ok(Self {
            state,
            broadcaster,
            registry,
            bound: AtomicBool::new(true),
        })
    }

    /// Stopped -> Starting.
    pub fn begin_start(&self) -> Result<()> {
        self.step("start", LifecycleState::Stopped, LifecycleState::Starting)
    }

    /// Starting -> Started. Called by the start hook once setup completes.
    pub fn did_start(&self) -> Result<()> {
        self.step("did_start", LifecycleState::Starting, LifecycleState::Started)
    }

    /// Starting -> Stopped. Used when a start hook fails before completing.
    pub fn abort_start(&self) -> Result<()> {
        self.step(
            "abort_start",
            LifecycleState::Starting,
            LifecycleState::Stopped,
        )
    }

    /// Started -> Stopping.
    pub fn begin_stop(&self) -> Result<()> {
        self.step("stop", LifecycleState::Started, LifecycleState::Stopping)
    }

    /// Stopping -> Stopped. Called by the stop hook once teardown completes.
    pub fn did_stop(&self) -> Result<()> {
        self.step("did_stop", LifecycleState::Stopping, LifecycleState::Stopped)
    }

    fn step(
        &self,
        operation: &'static str,
        from: LifecycleState,
        to: LifecycleState,
    ) -> Result<()> {
        match self.state.transition(&[from], to)? {
            Transition::Applied => Ok(()),
            Transition::Rejected(state) => Err(Error::Lifecycle { operation, state }),
        }
    }

    /// Current state.
    pub fn state(&self) -> LifecycleState {
        self.state.get()
    }

    /// Check whether the current state equals `state`.
    pub fn is(&self, state: LifecycleState) -> bool {
        self.state.is(state)
    }

    /// Check whether the current state is one of `states`.
    pub fn is_any_of(&self, states: &[LifecycleState]) -> bool {
        self.state.is_any_of(states)
    }

    /// Block until the state equals `state`.
    pub fn wait_for(&self, state: LifecycleState) -> LifecycleState {
        self.state.wait_for(state)
    }

    /// Block until the state is one of `states`.
    pub fn wait_for_any_of(&self, states: &[LifecycleState]) -> LifecycleState {
        self.state.wait_for_any_of(states)
    }

    /// Block until the state is one of `states` or `timeout` elapses.
    pub fn wait_for_any_of_timeout(
        &self,
        states: &[LifecycleState],
        timeout: Duration,
    ) -> Option<LifecycleState> {
        self.state.wait_for_any_of_timeout(states, timeout)
    }

    /// Register an observer on the component.
    pub fn add_observer(&self, observer: Arc<O>) -> bool {
        self.broadcaster.add_observer(observer)
    }

    /// Deregister an observer from the component.
    pub fn remove_observer(&self, observer: &Arc<O>) -> bool {
        self.broadcaster.remove_observer(observer)
    }

    /// The component's broadcaster, for notifications beyond state changes.
    pub fn broadcaster(&self) -> &Broadcaster<O> {
        &self.broadcaster
    }

    /// Remove the self-binding. Must be called once the component is
    /// permanently discarded.
    ///
    /// Fails with [`Error::IllegalState`] if the binding is no longer
    /// established (for example on a second call).
    pub fn close(&self) -> Result<()> {
        if self.bound.swap(false, Ordering::AcqRel)
            && self.registry.unbind(&self.state, &*self.broadcaster)
        {
            return Ok(());
        }
        Err(Error::IllegalState(
            "lifecycle self-binding is not established".to_string(),
        ))
    }

    /// Check whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        !self.bound.load(Ordering::Acquire)
    }
}

impl<O: ?Sized> Drop for Lifecycle<O> {
    fn drop(&mut self) {
        if self.bound.swap(false, Ordering::AcqRel) {
            log::debug!("[Lifecycle] dropped without close(), removing self-binding");
            self.registry.unbind(&self.state, &*self.broadcaster);
        }
    }
}

impl<O: ?Sized> std::fmt::Debug for Lifecycle<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("state", &self.state.get())
            .field("observers", &self.broadcaster.observer_count())
            .field("bound", &self.bound.load(Ordering::Relaxed))
            .finish()
    }
}

/// A component with an observable start/stop lifecycle.
///
/// Implementors provide the hooks; `start`/`stop` enforce the transition
/// table and should not be overridden.
pub trait LifecycleObject: Send + Sync {
    /// Observer capability of this component.
    type Observer: ?Sized + StateChangeObserver<LifecycleState> + Send + Sync + 'static;

    /// The embedded lifecycle.
    fn lifecycle(&self) -> &Lifecycle<Self::Observer>;

    /// Setup work. Must eventually call [`Lifecycle::did_start`].
    fn start_impl(&self) -> Result<()>;

    /// Teardown work. Must eventually call [`Lifecycle::did_stop`].
    fn stop_impl(&self) -> Result<()>;

    /// Stopped -> Starting, then run the start hook.
    ///
    /// If the hook fails before reporting Started, the component returns
    /// to Stopped and the hook's error is returned.
    fn start(&self) -> Result<()> {
        self.lifecycle().begin_start()?;
        if let Err(e) = self.start_impl() {
            if let Err(abort) = self.lifecycle().abort_start() {
                log::debug!("[Lifecycle] abort after failed start skipped: {}", abort);
            }
            return Err(e);
        }
        Ok(())
    }

    /// Started -> Stopping, then run the stop hook.
    fn stop(&self) -> Result<()> {
        self.lifecycle().begin_stop()?;
        self.stop_impl()
    }

    /// Current lifecycle state.
    fn state(&self) -> LifecycleState {
        self.lifecycle().state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NotifyResult;
    use parking_lot::Mutex;
    use std::thread;

    use LifecycleState::{Started, Starting, Stopped, Stopping};

    struct Recorder {
        seen: Mutex<Vec<LifecycleState>>,
    }

    impl StateChangeObserver<LifecycleState> for Recorder {
        fn on_state_changed(&self, state: LifecycleState) -> NotifyResult {
            self.seen.lock().push(state);
            Ok(())
        }
    }

    /// Synchronous start, asynchronous stop.
    struct Widget {
        lifecycle: Lifecycle,
        fail_start: bool,
    }

    impl Widget {
        fn new(fail_start: bool) -> Arc<Self> {
            Arc::new(Self {
                lifecycle: Lifecycle::new(StateForwardingRegistry::new_shared()).unwrap(),
                fail_start,
            })
        }
    }

    impl LifecycleObject for Widget {
        type Observer = LifecycleObserver;

        fn lifecycle(&self) -> &Lifecycle {
            &self.lifecycle
        }

        fn start_impl(&self) -> Result<()> {
            if self.fail_start {
                return Err(Error::Configuration("widget refused".to_string()));
            }
            self.lifecycle.did_start()
        }

        fn stop_impl(&self) -> Result<()> {
            Ok(())
        }
    }

    fn lifecycle() -> Lifecycle {
        Lifecycle::new(StateForwardingRegistry::new_shared()).unwrap()
    }

    fn assert_rejected(result: Result<()>, expected_state: LifecycleState) {
        match result {
            Err(Error::Lifecycle { state, .. }) => assert_eq!(state, expected_state),
            other => panic!("expected lifecycle error, got {:?}", other),
        }
    }

    #[test]
    fn test_transition_table() {
        let lc = lifecycle();

        // Stopped
        assert_rejected(lc.begin_stop(), Stopped);
        assert_rejected(lc.did_start(), Stopped);
        assert_rejected(lc.did_stop(), Stopped);
        lc.begin_start().unwrap();

        // Starting
        assert_rejected(lc.begin_start(), Starting);
        assert_rejected(lc.begin_stop(), Starting);
        assert_rejected(lc.did_stop(), Starting);
        lc.did_start().unwrap();

        // Started
        assert_rejected(lc.begin_start(), Started);
        assert_rejected(lc.did_start(), Started);
        assert_rejected(lc.did_stop(), Started);
        lc.begin_stop().unwrap();

        // Stopping
        assert_rejected(lc.begin_start(), Stopping);
        assert_rejected(lc.begin_stop(), Stopping);
        assert_rejected(lc.did_start(), Stopping);
        lc.did_stop().unwrap();

        assert_eq!(lc.state(), Stopped);
    }

    #[test]
    fn test_observers_hear_every_transition() {
        let widget = Widget::new(false);
        let rec = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        widget.lifecycle().add_observer(rec.clone());

        widget.start().unwrap();
        widget.stop().unwrap();
        widget.lifecycle().did_stop().unwrap();

        assert_eq!(*rec.seen.lock(), vec![Starting, Started, Stopping, Stopped]);
    }

    #[test]
    fn test_start_on_started_and_stop_on_stopped_fail() {
        let widget = Widget::new(false);
        assert_rejected(widget.stop(), Stopped);

        widget.start().unwrap();
        assert_eq!(widget.state(), Started);
        assert_rejected(widget.start(), Started);
    }

    #[test]
    fn test_failed_start_returns_to_stopped() {
        let widget = Widget::new(true);
        assert!(matches!(widget.start(), Err(Error::Configuration(_))));
        assert_eq!(widget.state(), Stopped);
    }

    #[test]
    fn test_async_did_stop_releases_waiter() {
        let widget = Widget::new(false);
        widget.start().unwrap();
        widget.stop().unwrap();
        assert_eq!(widget.state(), Stopping);

        let finisher = {
            let widget = Arc::clone(&widget);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                widget.lifecycle().did_stop().unwrap();
            })
        };

        assert_eq!(widget.lifecycle().wait_for(Stopped), Stopped);
        finisher.join().unwrap();
    }

    #[test]
    fn test_close_twice_is_illegal() {
        let registry = StateForwardingRegistry::new_shared();
        let lc: Lifecycle = Lifecycle::new(Arc::clone(&registry)).unwrap();
        assert_eq!(registry.len(), 1);

        lc.close().unwrap();
        assert!(lc.is_closed());
        assert!(registry.is_empty());
        assert!(matches!(lc.close(), Err(Error::IllegalState(_))));
    }

    #[test]
    fn test_drop_removes_binding() {
        let registry = StateForwardingRegistry::new_shared();
        {
            let _lc: Lifecycle = Lifecycle::new(Arc::clone(&registry)).unwrap();
            assert_eq!(registry.len(), 1);
        }
        assert!(registry.is_empty());
    }
}
