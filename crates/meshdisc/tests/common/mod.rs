// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared fixtures: an in-memory mesh behind `NetworkManager`, plus recording
//! node model, importer and manager observer.

#![allow(dead_code)]

use meshdisc::discovery::{
    AddressRequest, AddressRequestKind, AddressResponse, AnnounceListener, DeviceAnnounce,
    DiscoveredNode, DiscoveryManagerObserver, EndpointImporter, ImportEntry, IncomingMessage,
    LongAddress, MessageListener, NeighborTableResponse, NetworkAddress, NetworkManager,
    NodeModel, PanId, ZdoStatus,
};
use meshdisc::{LifecycleState, NotifyResult, Result, StateChangeObserver};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub const PAN_ID: PanId = 0x1A62;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(2));
    }
}

/// One simulated device.
#[derive(Clone)]
struct Device {
    long_address: LongAddress,
    status: ZdoStatus,
    children: Vec<NetworkAddress>,
}

/// In-memory mesh.
///
/// Devices answer single-device and extended address requests; unknown
/// addresses never answer. Neighbor tables are empty.
#[derive(Default)]
pub struct MockNetwork {
    devices: Mutex<HashMap<NetworkAddress, Device>>,
    response_delay: Mutex<Option<Duration>>,
    message_listeners: Mutex<Vec<Arc<dyn MessageListener>>>,
    announce_listeners: Mutex<Vec<Arc<dyn AnnounceListener>>>,
    single_requests: Mutex<HashMap<NetworkAddress, usize>>,
    extended_requests: AtomicUsize,
}

impl MockNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Add a device answering with success.
    pub fn add_device(&self, network: u16, long: u64) {
        self.devices.lock().insert(
            NetworkAddress(network),
            Device {
                long_address: LongAddress(long),
                status: ZdoStatus::SUCCESS,
                children: Vec::new(),
            },
        );
    }

    /// Add a device answering with `status`.
    pub fn add_failing_device(&self, network: u16, status: ZdoStatus) {
        self.devices.lock().insert(
            NetworkAddress(network),
            Device {
                long_address: LongAddress(0),
                status,
                children: Vec::new(),
            },
        );
    }

    /// Declare `child` associated to `parent`.
    pub fn associate(&self, parent: u16, child: u16) {
        if let Some(device) = self.devices.lock().get_mut(&NetworkAddress(parent)) {
            device.children.push(NetworkAddress(child));
        }
    }

    /// Delay every address response.
    pub fn set_response_delay(&self, delay: Duration) {
        *self.response_delay.lock() = Some(delay);
    }

    /// Deliver a frame from `source` to every message listener.
    pub fn deliver_from(&self, source: u16) {
        let listeners = self.message_listeners.lock().clone();
        let message = IncomingMessage::from_address(NetworkAddress(source));
        for listener in listeners {
            listener.on_incoming_message(&message);
        }
    }

    /// Deliver a device announce to every announce listener.
    pub fn announce(&self, network: u16, long: u64) {
        let listeners = self.announce_listeners.lock().clone();
        let announce = DeviceAnnounce {
            network_address: NetworkAddress(network),
            long_address: LongAddress(long),
            capabilities: 0x8E,
        };
        for listener in listeners {
            listener.on_device_announce(&announce);
        }
    }

    pub fn single_requests_for(&self, network: u16) -> usize {
        self.single_requests
            .lock()
            .get(&NetworkAddress(network))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_single_requests(&self) -> usize {
        self.single_requests.lock().values().sum()
    }

    pub fn extended_requests(&self) -> usize {
        self.extended_requests.load(Ordering::SeqCst)
    }

    pub fn message_listener_count(&self) -> usize {
        self.message_listeners.lock().len()
    }

    pub fn announce_listener_count(&self) -> usize {
        self.announce_listeners.lock().len()
    }
}

fn same<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
}

impl NetworkManager for MockNetwork {
    fn add_announce_listener(&self, listener: Arc<dyn AnnounceListener>) -> bool {
        let mut listeners = self.announce_listeners.lock();
        if listeners.iter().any(|l| same(l, &listener)) {
            return false;
        }
        listeners.push(listener);
        true
    }

    fn remove_announce_listener(&self, listener: &Arc<dyn AnnounceListener>) -> bool {
        let mut listeners = self.announce_listeners.lock();
        let before = listeners.len();
        listeners.retain(|l| !same(l, listener));
        listeners.len() != before
    }

    fn add_message_listener(&self, listener: Arc<dyn MessageListener>) -> bool {
        let mut listeners = self.message_listeners.lock();
        if listeners.iter().any(|l| same(l, &listener)) {
            return false;
        }
        listeners.push(listener);
        true
    }

    fn remove_message_listener(&self, listener: &Arc<dyn MessageListener>) -> bool {
        let mut listeners = self.message_listeners.lock();
        let before = listeners.len();
        listeners.retain(|l| !same(l, listener));
        listeners.len() != before
    }

    fn resolve_long_address(&self, request: AddressRequest) -> Option<AddressResponse> {
        match request.kind {
            AddressRequestKind::SingleDevice => {
                *self
                    .single_requests
                    .lock()
                    .entry(request.network_address)
                    .or_insert(0) += 1;
            }
            AddressRequestKind::Extended => {
                self.extended_requests.fetch_add(1, Ordering::SeqCst);
            }
        }

        let delay = *self.response_delay.lock();
        if let Some(delay) = delay {
            thread::sleep(delay);
        }

        let device = self.devices.lock().get(&request.network_address)?.clone();
        if !device.status.is_success() {
            return Some(AddressResponse::failure(
                request.network_address,
                device.status,
            ));
        }

        let mut response = AddressResponse::success(request.network_address, device.long_address);
        if request.kind == AddressRequestKind::Extended {
            response.total_associated = u8::try_from(device.children.len()).unwrap_or(u8::MAX);
            response.start_index = request.start_index;
            response.associated_devices = device
                .children
                .iter()
                .skip(usize::from(request.start_index))
                .take(4)
                .copied()
                .collect();
        }
        Some(response)
    }

    fn request_neighbor_table(
        &self,
        address: NetworkAddress,
        start_index: u8,
    ) -> Option<NeighborTableResponse> {
        self.devices.lock().get(&address)?;
        Some(NeighborTableResponse {
            status: ZdoStatus::SUCCESS,
            source: address,
            total_entries: 0,
            start_index,
            neighbors: Vec::new(),
        })
    }

    fn current_pan_id(&self) -> PanId {
        PAN_ID
    }
}

/// Node model recording every browsed node.
#[derive(Default)]
pub struct RecordingNodeModel {
    pub browsed: Mutex<Vec<DiscoveredNode>>,
}

impl NodeModel for RecordingNodeModel {
    fn notify_node_browsed(&self, node: &DiscoveredNode) {
        self.browsed.lock().push(*node);
    }
}

impl RecordingNodeModel {
    pub fn count(&self) -> usize {
        self.browsed.lock().len()
    }
}

/// Importer recording every imported entry.
#[derive(Default)]
pub struct RecordingImporter {
    pub imported: Mutex<Vec<ImportEntry>>,
}

impl EndpointImporter for RecordingImporter {
    fn import_endpoints(&self, entry: &ImportEntry) -> Result<()> {
        self.imported.lock().push(*entry);
        Ok(())
    }
}

impl RecordingImporter {
    pub fn count(&self) -> usize {
        self.imported.lock().len()
    }

    pub fn contains(&self, network: u16) -> bool {
        self.imported
            .lock()
            .iter()
            .any(|e| e.network_address == NetworkAddress(network))
    }
}

/// Manager observer recording transitions and milestones.
#[derive(Default)]
pub struct RecordingObserver {
    pub states: Mutex<Vec<LifecycleState>>,
    pub initial_complete: AtomicUsize,
}

impl StateChangeObserver<LifecycleState> for RecordingObserver {
    fn on_state_changed(&self, state: LifecycleState) -> NotifyResult {
        self.states.lock().push(state);
        Ok(())
    }
}

impl DiscoveryManagerObserver for RecordingObserver {
    fn on_initial_browsing_complete(&self) -> NotifyResult {
        self.initial_complete.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
