// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Link-quality strategy: periodic walk of neighbor tables.
//!
//! Each pass pages through the browse root's neighbor table and recurses
//! into every coordinator or router neighbor. Every neighbor is pushed into
//! the import queue and its LQI recorded; the readings of the last complete
//! pass are kept as a snapshot.

use super::address::{ImportEntry, NetworkAddress};
use super::network::NetworkManager;
use super::queue::ImportQueue;
use crate::error::{Error, Result};
use crate::lifecycle::{
    Lifecycle, LifecycleObject, LifecycleObserver, PeriodTask, PeriodicLifecycle, PeriodicWork,
};
use crate::observe::StateForwardingRegistry;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One directed link reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkReport {
    /// Device whose neighbor table reported the link.
    pub source: NetworkAddress,
    /// Neighbor at the other end.
    pub neighbor: NetworkAddress,
    /// Link quality indicator.
    pub lqi: u8,
}

struct LinkQualityState {
    network: Arc<dyn NetworkManager>,
    queue: Arc<ImportQueue>,
    root: NetworkAddress,
    active: AtomicBool,
    immediate: AtomicBool,
    passes: AtomicU64,
    links: RwLock<Vec<LinkReport>>,
}

impl LinkQualityState {
    fn browse(&self) {
        let Some(links) = self.walk() else {
            log::debug!("[LinkQualityBrowser] pass interrupted");
            return;
        };
        let pass = self.passes.fetch_add(1, Ordering::AcqRel) + 1;
        log::debug!(
            "[LinkQualityBrowser] pass {} complete, {} links",
            pass,
            links.len()
        );
        *self.links.write() = links;
    }

    /// Walk the mesh; `None` if interrupted.
    fn walk(&self) -> Option<Vec<LinkReport>> {
        let mut visited: HashSet<NetworkAddress> = HashSet::new();
        let mut imported: HashSet<NetworkAddress> = HashSet::new();
        let mut pending: VecDeque<NetworkAddress> = VecDeque::from([self.root]);
        let mut links = Vec::new();

        while let Some(source) = pending.pop_front() {
            if !visited.insert(source) {
                continue;
            }

            let mut start_index: u8 = 0;
            loop {
                if !self.active.load(Ordering::Acquire) {
                    return None;
                }

                let Some(page) = self.network.request_neighbor_table(source, start_index) else {
                    log::debug!("[LinkQualityBrowser] no neighbor table from {}", source);
                    break;
                };
                if !page.status.is_success() {
                    log::debug!("[LinkQualityBrowser] {} answered {}", source, page.status);
                    break;
                }

                for neighbor in &page.neighbors {
                    links.push(LinkReport {
                        source,
                        neighbor: neighbor.network_address,
                        lqi: neighbor.lqi,
                    });

                    if imported.insert(neighbor.network_address) {
                        let entry =
                            ImportEntry::new(neighbor.network_address, neighbor.long_address);
                        match self.queue.push(entry) {
                            Ok(()) => {}
                            Err(Error::QueueClosed) => return None,
                            Err(e) => log::warn!("[LinkQualityBrowser] {}", e),
                        }
                    }

                    if neighbor.device_type.routes() && !visited.contains(&neighbor.network_address)
                    {
                        pending.push_back(neighbor.network_address);
                    }
                }

                let next = usize::from(start_index) + page.neighbors.len();
                if page.neighbors.is_empty() || next >= usize::from(page.total_entries) {
                    break;
                }
                match u8::try_from(next) {
                    Ok(index) => start_index = index,
                    Err(_) => break,
                }
            }
        }
        Some(links)
    }
}

struct LinkQualityWork {
    state: Arc<LinkQualityState>,
    period: Duration,
}

impl PeriodicWork for LinkQualityWork {
    fn next_delay(&self) -> Duration {
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

/// Periodic neighbor-table browser.
pub struct LinkQualityBrowser {
    periodic: PeriodicLifecycle<LinkQualityWork>,
}

impl LinkQualityBrowser {
    /// Create a stopped browser walking from `root` every `period`.
    pub fn new(
        network: Arc<dyn NetworkManager>,
        queue: Arc<ImportQueue>,
        root: NetworkAddress,
        period: Duration,
        registry: Arc<StateForwardingRegistry>,
    ) -> Result<Self> {
        let state = Arc::new(LinkQualityState {
            network,
            queue,
            root,
            active: AtomicBool::new(false),
            immediate: AtomicBool::new(false),
            passes: AtomicU64::new(0),
            links: RwLock::new(Vec::new()),
        });
        let work = LinkQualityWork { state, period };
        Ok(Self {
            periodic: PeriodicLifecycle::new("meshdisc-link-quality", work, registry)?,
        })
    }

    /// Best LQI reported toward `address` in the last complete pass.
    pub fn link_quality(&self, address: NetworkAddress) -> Option<u8> {
        self.shared()
            .links
            .read()
            .iter()
            .filter(|l| l.neighbor == address)
            .map(|l| l.lqi)
            .max()
    }

    /// Every link of the last complete pass.
    pub fn links(&self) -> Vec<LinkReport> {
        self.shared().links.read().clone()
    }

    /// Best LQI per neighbor in the last complete pass.
    pub fn link_quality_map(&self) -> HashMap<NetworkAddress, u8> {
        let mut best: HashMap<NetworkAddress, u8> = HashMap::new();
        for link in self.shared().links.read().iter() {
            let lqi = best.entry(link.neighbor).or_insert(link.lqi);
            *lqi = (*lqi).max(link.lqi);
        }
        best
    }

    /// Completed passes in the current cycle.
    pub fn pass_count(&self) -> u64 {
        self.shared().passes.load(Ordering::Acquire)
    }

    /// Remove the lifecycle self-binding.
    pub fn close(&self) -> Result<()> {
        self.periodic.close()
    }

    fn shared(&self) -> &LinkQualityState {
        &self.periodic.work().state
    }
}

impl LifecycleObject for LinkQualityBrowser {
    type Observer = LifecycleObserver;

    fn lifecycle(&self) -> &Lifecycle {
        self.periodic.lifecycle()
    }

    fn start_impl(&self) -> Result<()> {
        let state = self.shared();
        state.passes.store(0, Ordering::Release);
        state.immediate.store(true, Ordering::Release);
        state.active.store(true, Ordering::Release);
        self.periodic.start_impl()
    }

    fn stop_impl(&self) -> Result<()> {
        self.shared().active.store(false, Ordering::Release);
        self.periodic.stop_impl()
    }
}

impl std::fmt::Debug for LinkQualityBrowser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkQualityBrowser")
            .field("root", &self.shared().root)
            .field("passes", &self.pass_count())
            .field("state", &self.periodic.state())
            .finish()
    }
}
