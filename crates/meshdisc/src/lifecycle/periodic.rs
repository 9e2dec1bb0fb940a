// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Lifecycle object with a self-rescheduling recurring task.
//!
//! While Started, a named worker thread repeatedly asks the work for the
//! delay until the next run, sleeps on an interruptible signal, checks that
//! the object is still Started, and runs the task it is handed. Each delay is
//! measured from the end of the previous run, so drift accumulates.

use super::{Lifecycle, LifecycleObject, LifecycleObserver, LifecycleState};
use crate::error::{Error, Result};
use crate::observe::StateForwardingRegistry;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// One execution of a periodic task.
pub type PeriodTask = Box<dyn FnOnce() + Send + 'static>;

/// Hooks of a periodic object.
pub trait PeriodicWork: Send + Sync + 'static {
    /// Time to wait before the next run.
    fn next_delay(&self) -> Duration;

    /// The task to run next.
    fn next_task(&self) -> PeriodTask;
}

struct PeriodicShared<W> {
    lifecycle: Lifecycle,
    work: W,
    stop_requested: Mutex<bool>,
    wake: Condvar,
}

impl<W> PeriodicShared<W> {
    /// Sleep for `delay` unless a stop is requested first.
    /// Returns `true` if the worker should exit.
    fn sleep(&self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        let mut stop = self.stop_requested.lock();
        while !*stop {
            if self.wake.wait_until(&mut stop, deadline).timed_out() {
                break;
            }
        }
        *stop
    }

    fn request_stop(&self) {
        *self.stop_requested.lock() = true;
        self.wake.notify_all();
    }
}

/// A [`LifecycleObject`] running `W`'s task periodically while Started.
pub struct PeriodicLifecycle<W: PeriodicWork> {
    name: String,
    shared: Arc<PeriodicShared<W>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<W: PeriodicWork> PeriodicLifecycle<W> {
    /// Create a stopped periodic object; `name` labels the worker thread.
    pub fn new(
        name: impl Into<String>,
        work: W,
        registry: Arc<StateForwardingRegistry>,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            shared: Arc::new(PeriodicShared {
                lifecycle: Lifecycle::new(registry)?,
                work,
                stop_requested: Mutex::new(false),
                wake: Condvar::new(),
            }),
            worker: Mutex::new(None),
        })
    }

    /// The periodic work.
    pub fn work(&self) -> &W {
        &self.shared.work
    }

    /// Worker thread name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Remove the lifecycle self-binding.
    pub fn close(&self) -> Result<()> {
        self.shared.lifecycle.close()
    }

    fn join_worker(&self) {
        let Some(handle) = self.worker.lock().take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            // Stopped from inside the task; the loop exits on its own.
            return;
        }
        if handle.join().is_err() {
            log::warn!("[{}] worker thread panicked", self.name);
        }
    }
}

impl<W: PeriodicWork> LifecycleObject for PeriodicLifecycle<W> {
    type Observer = LifecycleObserver;

    fn lifecycle(&self) -> &Lifecycle {
        &self.shared.lifecycle
    }

    fn start_impl(&self) -> Result<()> {
        *self.shared.stop_requested.lock() = false;

        let shared = Arc::clone(&self.shared);
        let name = self.name.clone();
        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || run_periodic(&name, &shared))
            .map_err(|source| Error::ThreadSpawn {
                name: self.name.clone(),
                source,
            })?;
        *self.worker.lock() = Some(handle);

        log::debug!("[{}] periodic worker started", self.name);
        self.shared.lifecycle.did_start()
    }

    fn stop_impl(&self) -> Result<()> {
        self.shared.request_stop();
        self.join_worker();
        log::debug!("[{}] periodic worker stopped", self.name);
        self.shared.lifecycle.did_stop()
    }
}

impl<W: PeriodicWork> Drop for PeriodicLifecycle<W> {
    fn drop(&mut self) {
        self.shared.request_stop();
        self.join_worker();
    }
}

impl<W: PeriodicWork> std::fmt::Debug for PeriodicLifecycle<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicLifecycle")
            .field("name", &self.name)
            .field("state", &self.shared.lifecycle.state())
            .finish()
    }
}

fn run_periodic<W: PeriodicWork>(name: &str, shared: &PeriodicShared<W>) {
    let first = shared.lifecycle.wait_for_any_of(&[
        LifecycleState::Started,
        LifecycleState::Stopping,
        LifecycleState::Stopped,
    ]);
    if first != LifecycleState::Started {
        return;
    }

    loop {
        if shared.sleep(shared.work.next_delay()) {
            break;
        }
        if !shared.lifecycle.is(LifecycleState::Started) {
            break;
        }
        log::trace!("[{}] running periodic task", name);
        (shared.work.next_task())();
    }
    log::trace!("[{}] periodic loop exited", name);
}
