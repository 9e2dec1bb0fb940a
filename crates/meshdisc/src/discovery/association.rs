// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Addressing strategy: periodic walk of the association tree.
//!
//! Each pass starts at the browse root (normally the coordinator) and issues
//! extended address requests, paging through every device's associated
//! children breadth-first. Every device that answers is pushed into the
//! import queue. The first completed pass of a startup cycle marks the
//! initial browse as complete and notifies the browser's observers.

use super::address::{ImportEntry, NetworkAddress};
use super::network::{AddressRequest, NetworkManager};
use super::queue::ImportQueue;
use crate::error::{Error, NotifyResult, Result};
use crate::lifecycle::{
    Lifecycle, LifecycleObject, LifecycleObserver, PeriodTask, PeriodicLifecycle, PeriodicWork,
};
use crate::observe::{Broadcaster, StateForwardingRegistry};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Observer of association browsing progress.
pub trait AssociationBrowserObserver: Send + Sync {
    /// The first full pass of the current cycle completed.
    fn on_initial_network_browsing_complete(&self) -> NotifyResult;
}

struct AssociationState {
    network: Arc<dyn NetworkManager>,
    queue: Arc<ImportQueue>,
    root: NetworkAddress,
    active: AtomicBool,
    immediate: AtomicBool,
    initial_complete: AtomicBool,
    passes: AtomicU64,
    observers: Broadcaster<dyn AssociationBrowserObserver>,
}

/// Outcome of one pass.
enum PassEnd {
    Complete(usize),
    Interrupted,
}

impl AssociationState {
    fn browse(&self) {
        match self.walk() {
            PassEnd::Complete(imported) => {
                let pass = self.passes.fetch_add(1, Ordering::AcqRel) + 1;
                log::debug!(
                    "[AssociationBrowser] pass {} complete, {} devices imported",
                    pass,
                    imported
                );
                if !self.initial_complete.swap(true, Ordering::AcqRel) {
                    log::info!("[AssociationBrowser] initial network browsing complete");
                    if let Err(e) = self
                        .observers
                        .notify(|o| o.on_initial_network_browsing_complete())
                    {
                        log::warn!("[AssociationBrowser] observer failed: {}", e);
                    }
                }
            }
            PassEnd::Interrupted => {
                log::debug!("[AssociationBrowser] pass interrupted");
            }
        }
    }

    fn walk(&self) -> PassEnd {
        let mut visited: HashSet<NetworkAddress> = HashSet::new();
        let mut pending: VecDeque<NetworkAddress> = VecDeque::from([self.root]);
        let mut imported = 0;

        while let Some(address) = pending.pop_front() {
            if !visited.insert(address) {
                continue;
            }

            let mut start_index: u8 = 0;
            loop {
                if !self.active.load(Ordering::Acquire) {
                    return PassEnd::Interrupted;
                }

                let request = AddressRequest::extended(address, start_index);
                let Some(response) = self.network.resolve_long_address(request) else {
                    log::debug!("[AssociationBrowser] no response from {}", address);
                    break;
                };
                if !response.status.is_success() {
                    log::debug!(
                        "[AssociationBrowser] {} answered {}",
                        address,
                        response.status
                    );
                    break;
                }

                if start_index == 0 {
                    match self
                        .queue
                        .push(ImportEntry::new(address, response.long_address))
                    {
                        Ok(()) => imported += 1,
                        Err(Error::QueueClosed) => return PassEnd::Interrupted,
                        Err(e) => log::warn!("[AssociationBrowser] {}", e),
                    }
                }

                for child in &response.associated_devices {
                    if !visited.contains(child) {
                        pending.push_back(*child);
                    }
                }

                let next = usize::from(start_index) + response.associated_devices.len();
                if response.associated_devices.is_empty()
                    || next >= usize::from(response.total_associated)
                {
                    break;
                }
                match u8::try_from(next) {
                    Ok(index) => start_index = index,
                    Err(_) => break,
                }
            }
        }
        PassEnd::Complete(imported)
    }
}

struct AssociationWork {
    state: Arc<AssociationState>,
    period: Duration,
}

impl PeriodicWork for AssociationWork {
    fn next_delay(&self) -> Duration {
        // First pass of a cycle runs immediately.
        if self.state.immediate.swap(false, Ordering::AcqRel) {
            Duration::ZERO
        } else {
            self.period
        }
    }

    fn next_task(&self) -> PeriodTask {
        let state = Arc::clone(&self.state);
        Box::new(move || state.browse())
    }
}

/// Periodic association-tree browser.
pub struct AssociationBrowser {
    periodic: PeriodicLifecycle<AssociationWork>,
}

impl AssociationBrowser {
    /// Create a stopped browser walking from `root` every `period`.
    pub fn new(
        network: Arc<dyn NetworkManager>,
        queue: Arc<ImportQueue>,
        root: NetworkAddress,
        period: Duration,
        registry: Arc<StateForwardingRegistry>,
    ) -> Result<Self> {
        let state = Arc::new(AssociationState {
            network,
            queue,
            root,
            active: AtomicBool::new(false),
            immediate: AtomicBool::new(false),
            initial_complete: AtomicBool::new(false),
            passes: AtomicU64::new(0),
            observers: Broadcaster::new(),
        });
        let work = AssociationWork { state, period };
        Ok(Self {
            periodic: PeriodicLifecycle::new("meshdisc-association", work, registry)?,
        })
    }

    /// Check whether the first pass of the current cycle completed.
    pub fn is_initial_network_browsing_complete(&self) -> bool {
        self.shared().initial_complete.load(Ordering::Acquire)
    }

    /// Completed passes in the current cycle.
    pub fn pass_count(&self) -> u64 {
        self.shared().passes.load(Ordering::Acquire)
    }

    /// Register a progress observer.
    pub fn add_browser_observer(&self, observer: Arc<dyn AssociationBrowserObserver>) -> bool {
        self.shared().observers.add_observer(observer)
    }

    /// Deregister a progress observer.
    pub fn remove_browser_observer(&self, observer: &Arc<dyn AssociationBrowserObserver>) -> bool {
        self.shared().observers.remove_observer(observer)
    }

    /// Remove the lifecycle self-binding.
    pub fn close(&self) -> Result<()> {
        self.periodic.close()
    }

    fn shared(&self) -> &AssociationState {
        &self.periodic.work().state
    }
}

impl LifecycleObject for AssociationBrowser {
    type Observer = LifecycleObserver;

    fn lifecycle(&self) -> &Lifecycle {
        self.periodic.lifecycle()
    }

    fn start_impl(&self) -> Result<()> {
        let state = self.shared();
        state.initial_complete.store(false, Ordering::Release);
        state.passes.store(0, Ordering::Release);
        state.immediate.store(true, Ordering::Release);
        state.active.store(true, Ordering::Release);
        log::debug!("[AssociationBrowser] browsing from {}", state.root);
        self.periodic.start_impl()
    }

    fn stop_impl(&self) -> Result<()> {
        self.shared().active.store(false, Ordering::Release);
        self.periodic.stop_impl()
    }
}

impl std::fmt::Debug for AssociationBrowser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssociationBrowser")
            .field("root", &self.shared().root)
            .field("passes", &self.pass_count())
            .field("state", &self.periodic.state())
            .finish()
    }
}
