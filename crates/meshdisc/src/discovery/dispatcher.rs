// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Deduplicating address inspection.
//!
//! Every incoming message names a source address. The first time an address
//! is seen in a startup cycle, an inspection job is queued for a fixed pool of
//! worker threads; later messages from the same address are ignored until
//! [`InspectionDispatcher::reset`] runs again.
//!
//! # Architecture
//!
//! ```text
//! on_incoming_message --dispatch--> [ inspected set + Sender ]  (one Mutex)
//!                                          |
//!                                  crossbeam bounded channel
//!                                          |
//!                       meshdisc-inspect-0 .. meshdisc-inspect-N
//!                                          |
//!               resolve_long_address --> ImportQueue::push --> NodeModel
//! ```
//!
//! Shutdown drops the sender. Workers drain what is already queued and exit;
//! they are never joined. Each worker pool belongs to one cycle: a result is
//! delivered only while its cycle is still current, so a late resolution
//! never reaches the import queue or node model of a later cycle.

use super::address::{DiscoveredNode, ImportEntry, NetworkAddress};
use super::network::{AddressRequest, NetworkManager, NodeModel};
use super::queue::ImportQueue;
use crate::error::{Error, ResolutionFailure, Result};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Collaborators needed by an inspection job.
struct InspectionContext {
    network: Arc<dyn NetworkManager>,
    node_model: Arc<dyn NodeModel>,
    queue: Arc<ImportQueue>,
    /// Current cycle. Deliveries hold the read side; `reset` and `shutdown`
    /// advance it under the write side.
    cycle: RwLock<u64>,
}

impl InspectionContext {
    /// Advance the cycle once every in-flight delivery has finished.
    fn advance_cycle(&self) -> u64 {
        let mut cycle = self.cycle.write();
        *cycle = cycle.wrapping_add(1);
        *cycle
    }
}

#[derive(Default)]
struct DispatchState {
    inspected: HashSet<NetworkAddress>,
    sender: Option<Sender<NetworkAddress>>,
}

/// Inspected-address set plus the bounded inspection worker pool.
pub struct InspectionDispatcher {
    context: Arc<InspectionContext>,
    workers: usize,
    capacity: usize,
    state: Mutex<DispatchState>,
    dispatched: AtomicU64,
}

impl InspectionDispatcher {
    /// Create an idle dispatcher. Nothing is dispatched before
    /// [`reset`](Self::reset).
    pub fn new(
        network: Arc<dyn NetworkManager>,
        node_model: Arc<dyn NodeModel>,
        queue: Arc<ImportQueue>,
        workers: usize,
        capacity: usize,
    ) -> Self {
        Self {
            context: Arc::new(InspectionContext {
                network,
                node_model,
                queue,
                cycle: RwLock::new(0),
            }),
            workers: workers.max(1),
            capacity: capacity.max(1),
            state: Mutex::new(DispatchState::default()),
            dispatched: AtomicU64::new(0),
        }
    }

    /// Forget every inspected address and spawn a fresh worker pool.
    ///
    /// Workers of a previous cycle are detached; their remaining jobs are
    /// dropped without delivering anything.
    pub fn reset(&self) -> Result<()> {
        self.state.lock().sender = None;
        let cycle = self.context.advance_cycle();
        let (sender, receiver) = channel::bounded(self.capacity);

        for index in 0..self.workers {
            let name = format!("meshdisc-inspect-{}", index);
            let context = Arc::clone(&self.context);
            let receiver: Receiver<NetworkAddress> = receiver.clone();
            std::thread::Builder::new()
                .name(name.clone())
                .spawn(move || {
                    while let Ok(address) = receiver.recv() {
                        run_inspection(&context, cycle, address);
                    }
                    log::trace!("[InspectionDispatcher] worker exiting");
                })
                .map_err(|source| Error::ThreadSpawn { name, source })?;
        }

        let mut state = self.state.lock();
        state.inspected.clear();
        state.sender = Some(sender);
        drop(state);

        log::debug!(
            "[InspectionDispatcher] cycle {} pool ready: {} workers, capacity {}",
            cycle,
            self.workers,
            self.capacity
        );
        Ok(())
    }

    /// Stop accepting new inspections.
    ///
    /// Returns once no job is delivering a result. Jobs still queued or
    /// resolving finish detached and are dropped.
    pub fn shutdown(&self) {
        if self.state.lock().sender.take().is_some() {
            let cycle = self.context.advance_cycle();
            log::debug!("[InspectionDispatcher] dispatch closed, cycle {}", cycle);
        }
    }

    /// Queue an inspection of `address` unless one was already dispatched in
    /// this cycle.
    ///
    /// Returns `true` if a job was queued. When the job channel is full the
    /// address stays unmarked, so a later message retries it.
    pub fn dispatch(&self, address: NetworkAddress) -> bool {
        let mut state = self.state.lock();
        if state.inspected.contains(&address) {
            return false;
        }
        let Some(sender) = state.sender.as_ref() else {
            log::trace!(
                "[InspectionDispatcher] not running, ignoring {}",
                address
            );
            return false;
        };

        match sender.try_send(address) {
            Ok(()) => {
                state.inspected.insert(address);
                self.dispatched.fetch_add(1, Ordering::Relaxed);
                log::debug!("[InspectionDispatcher] inspecting {}", address);
                true
            }
            Err(TrySendError::Full(_)) => {
                log::warn!(
                    "[InspectionDispatcher] inspection queue full, deferring {}",
                    address
                );
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                log::debug!("[InspectionDispatcher] workers gone, dropping {}", address);
                false
            }
        }
    }

    /// Check whether an inspection was dispatched for `address` this cycle.
    pub fn is_inspected(&self, address: NetworkAddress) -> bool {
        self.state.lock().inspected.contains(&address)
    }

    /// Number of addresses inspected this cycle.
    pub fn inspected_count(&self) -> usize {
        self.state.lock().inspected.len()
    }

    /// Total jobs dispatched since creation.
    pub fn dispatched_count(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Check whether new inspections are accepted.
    pub fn is_running(&self) -> bool {
        self.state.lock().sender.is_some()
    }
}

impl std::fmt::Debug for InspectionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InspectionDispatcher")
            .field("workers", &self.workers)
            .field("capacity", &self.capacity)
            .field("inspected", &self.inspected_count())
            .field("dispatched", &self.dispatched_count())
            .finish()
    }
}

/// Resolve `address` and hand the result to the import queue and node model.
///
/// `cycle` is the cycle the job was dispatched in; nothing is delivered once
/// it is over.
fn inspect_address(
    context: &InspectionContext,
    cycle: u64,
    address: NetworkAddress,
) -> Result<DiscoveredNode> {
    if *context.cycle.read() != cycle {
        return Err(Error::StaleInspection { address });
    }

    let response = context
        .network
        .resolve_long_address(AddressRequest::single(address))
        .ok_or(Error::Resolution {
            address,
            reason: ResolutionFailure::NoResponse,
        })?;

    if !response.status.is_success() {
        return Err(Error::Resolution {
            address,
            reason: ResolutionFailure::Status(response.status),
        });
    }

    let node = DiscoveredNode {
        network_address: address,
        long_address: response.long_address,
        pan_id: context.network.current_pan_id(),
    };

    let current = context.cycle.read();
    if *current != cycle {
        return Err(Error::StaleInspection { address });
    }
    context.queue.push(ImportEntry::from(&node))?;
    context.node_model.notify_node_browsed(&node);
    drop(current);
    Ok(node)
}

fn run_inspection(context: &InspectionContext, cycle: u64, address: NetworkAddress) {
    match inspect_address(context, cycle, address) {
        Ok(node) => log::debug!(
            "[InspectionDispatcher] {} resolved to {} on PAN 0x{:04X}",
            node.network_address,
            node.long_address,
            node.pan_id
        ),
        Err(
            e @ Error::Resolution {
                reason: ResolutionFailure::NoResponse,
                ..
            },
        ) => log::debug!("[InspectionDispatcher] {}", e),
        Err(e @ Error::Resolution { .. }) => log::warn!("[InspectionDispatcher] {}", e),
        Err(e @ Error::StaleInspection { .. }) => log::debug!("[InspectionDispatcher] {}", e),
        Err(Error::QueueClosed) => log::warn!(
            "[InspectionDispatcher] import queue closed, dropping {}",
            address
        ),
        Err(e) => log::warn!("[InspectionDispatcher] inspection of {} failed: {}", address, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{
        AddressResponse, AnnounceListener, LongAddress, MessageListener, NeighborTableResponse,
        PanId, ZdoStatus,
    };
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::{Duration, Instant};

    struct StubNetwork {
        answers: HashMap<NetworkAddress, AddressResponse>,
        gate: Mutex<Option<Receiver<()>>>,
        calls: AtomicUsize,
    }

    impl StubNetwork {
        fn new(answers: &[(u16, AddressResponse)]) -> Self {
            Self {
                answers: answers
                    .iter()
                    .map(|(a, r)| (NetworkAddress(*a), r.clone()))
                    .collect(),
                gate: Mutex::new(None),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl NetworkManager for StubNetwork {
        fn add_announce_listener(&self, _listener: Arc<dyn AnnounceListener>) -> bool {
            true
        }
        fn remove_announce_listener(&self, _listener: &Arc<dyn AnnounceListener>) -> bool {
            true
        }
        fn add_message_listener(&self, _listener: Arc<dyn MessageListener>) -> bool {
            true
        }
        fn remove_message_listener(&self, _listener: &Arc<dyn MessageListener>) -> bool {
            true
        }

        fn resolve_long_address(&self, request: AddressRequest) -> Option<AddressResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let gate = self.gate.lock().clone();
            if let Some(gate) = gate {
                let _ = gate.recv();
            }
            self.answers.get(&request.network_address).cloned()
        }

        fn request_neighbor_table(
            &self,
            _address: NetworkAddress,
            _start_index: u8,
        ) -> Option<NeighborTableResponse> {
            None
        }

        fn current_pan_id(&self) -> PanId {
            0x1A62
        }
    }

    #[derive(Default)]
    struct Nodes {
        browsed: Mutex<Vec<DiscoveredNode>>,
    }

    impl NodeModel for Nodes {
        fn notify_node_browsed(&self, node: &DiscoveredNode) {
            self.browsed.lock().push(*node);
        }
    }

    struct Fixture {
        network: Arc<StubNetwork>,
        nodes: Arc<Nodes>,
        queue: Arc<ImportQueue>,
        dispatcher: InspectionDispatcher,
    }

    fn fixture(network: StubNetwork, workers: usize, capacity: usize) -> Fixture {
        let network = Arc::new(network);
        let nodes = Arc::new(Nodes::default());
        let queue = Arc::new(ImportQueue::new());
        let dispatcher = InspectionDispatcher::new(
            network.clone(),
            nodes.clone(),
            Arc::clone(&queue),
            workers,
            capacity,
        );
        Fixture {
            network,
            nodes,
            queue,
            dispatcher,
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(1));
        }
    }

    const LONG: LongAddress = LongAddress(0xAABB_CCDD_EEFF_0011);

    #[test]
    fn test_success_pushes_and_notifies() {
        let f = fixture(
            StubNetwork::new(&[(0x1234, AddressResponse::success(NetworkAddress(0x1234), LONG))]),
            2,
            8,
        );
        f.dispatcher.reset().unwrap();

        assert!(f.dispatcher.dispatch(NetworkAddress(0x1234)));
        let entry = f.queue.pop_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(entry, ImportEntry::new(NetworkAddress(0x1234), LONG));

        wait_until(|| f.nodes.browsed.lock().len() == 1);
        assert_eq!(f.nodes.browsed.lock()[0].pan_id, 0x1A62);
    }

    #[test]
    fn test_duplicate_address_dispatched_once() {
        let f = fixture(
            StubNetwork::new(&[(0x0042, AddressResponse::success(NetworkAddress(0x0042), LONG))]),
            2,
            8,
        );
        f.dispatcher.reset().unwrap();

        assert!(f.dispatcher.dispatch(NetworkAddress(0x0042)));
        assert!(!f.dispatcher.dispatch(NetworkAddress(0x0042)));
        assert!(f.dispatcher.is_inspected(NetworkAddress(0x0042)));
        assert_eq!(f.dispatcher.dispatched_count(), 1);

        wait_until(|| f.network.calls.load(Ordering::SeqCst) == 1);
    }

    #[test]
    fn test_failures_are_dropped() {
        let f = fixture(
            StubNetwork::new(&[(
                0x0002,
                AddressResponse::failure(NetworkAddress(0x0002), ZdoStatus::DEVICE_NOT_FOUND),
            )]),
            1,
            8,
        );
        f.dispatcher.reset().unwrap();

        f.dispatcher.dispatch(NetworkAddress(0x0001)); // no response
        f.dispatcher.dispatch(NetworkAddress(0x0002)); // error status
        wait_until(|| f.network.calls.load(Ordering::SeqCst) == 2);
        thread::sleep(Duration::from_millis(10));

        assert!(f.queue.is_empty());
        assert!(f.nodes.browsed.lock().is_empty());
        assert_eq!(f.dispatcher.inspected_count(), 2);
    }

    #[test]
    fn test_closed_queue_skips_node_model() {
        let f = fixture(
            StubNetwork::new(&[(0x0009, AddressResponse::success(NetworkAddress(0x0009), LONG))]),
            1,
            8,
        );
        f.queue.close();
        f.dispatcher.reset().unwrap();

        f.dispatcher.dispatch(NetworkAddress(0x0009));
        wait_until(|| f.network.calls.load(Ordering::SeqCst) == 1);
        thread::sleep(Duration::from_millis(10));
        assert!(f.nodes.browsed.lock().is_empty());
    }

    #[test]
    fn test_full_channel_leaves_address_unmarked() {
        let network = StubNetwork::new(&[]);
        let (open, gate) = channel::unbounded();
        *network.gate.lock() = Some(gate);
        let f = fixture(network, 1, 1);
        f.dispatcher.reset().unwrap();

        // First job occupies the worker, second fills the channel.
        assert!(f.dispatcher.dispatch(NetworkAddress(1)));
        wait_until(|| f.network.calls.load(Ordering::SeqCst) == 1);
        assert!(f.dispatcher.dispatch(NetworkAddress(2)));
        assert!(!f.dispatcher.dispatch(NetworkAddress(3)));
        assert!(!f.dispatcher.is_inspected(NetworkAddress(3)));

        drop(open);
        wait_until(|| f.network.calls.load(Ordering::SeqCst) == 2);
        assert!(f.dispatcher.dispatch(NetworkAddress(3)));
    }

    #[test]
    fn test_result_of_previous_cycle_is_dropped() {
        let network = StubNetwork::new(&[(
            0x0314,
            AddressResponse::success(NetworkAddress(0x0314), LONG),
        )]);
        let (open, gate) = channel::unbounded();
        *network.gate.lock() = Some(gate);
        let f = fixture(network, 1, 4);
        f.dispatcher.reset().unwrap();

        assert!(f.dispatcher.dispatch(NetworkAddress(0x0314)));
        wait_until(|| f.network.calls.load(Ordering::SeqCst) == 1);

        // Next cycle starts while the first resolution is still pending.
        f.dispatcher.shutdown();
        f.dispatcher.reset().unwrap();
        *f.network.gate.lock() = None;
        drop(open);
        thread::sleep(Duration::from_millis(20));

        assert!(f.queue.is_empty());
        assert!(f.nodes.browsed.lock().is_empty());
        assert!(!f.dispatcher.is_inspected(NetworkAddress(0x0314)));

        assert!(f.dispatcher.dispatch(NetworkAddress(0x0314)));
        let entry = f.queue.pop_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(entry, ImportEntry::new(NetworkAddress(0x0314), LONG));
        wait_until(|| f.nodes.browsed.lock().len() == 1);
        thread::sleep(Duration::from_millis(10));
        assert_eq!(f.nodes.browsed.lock().len(), 1);
        assert!(f.queue.is_empty());
    }

    #[test]
    fn test_reset_clears_and_shutdown_stops() {
        let f = fixture(StubNetwork::new(&[]), 1, 4);
        assert!(!f.dispatcher.dispatch(NetworkAddress(5)));

        f.dispatcher.reset().unwrap();
        assert!(f.dispatcher.dispatch(NetworkAddress(5)));
        f.dispatcher.reset().unwrap();
        assert_eq!(f.dispatcher.inspected_count(), 0);
        assert!(f.dispatcher.dispatch(NetworkAddress(5)));

        f.dispatcher.shutdown();
        assert!(!f.dispatcher.is_running());
        assert!(!f.dispatcher.dispatch(NetworkAddress(6)));
    }
}
