// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Collaborator boundary: the network manager (transport), the node model and
//! the endpoint importer, plus the messages exchanged with them.
//!
//! Frame encoding lives on the other side of [`NetworkManager`]; this crate
//! only sees decoded requests and responses.

use super::address::{DiscoveredNode, ImportEntry, LongAddress, NetworkAddress, PanId, ZdoStatus};
use crate::error::Result;
use std::sync::Arc;

/// Any application frame received from a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncomingMessage {
    /// Sender's short address.
    pub source_address: NetworkAddress,
    /// Sender's endpoint.
    pub source_endpoint: u8,
    /// Cluster the frame belongs to.
    pub cluster_id: u16,
    /// Link quality of the received frame.
    pub link_quality: u8,
}

impl IncomingMessage {
    /// Minimal message from `source_address`.
    pub fn from_address(source_address: NetworkAddress) -> Self {
        Self {
            source_address,
            source_endpoint: 0,
            cluster_id: 0,
            link_quality: 0,
        }
    }
}

/// Announcement broadcast by a device joining or rejoining.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceAnnounce {
    /// Announced short address.
    pub network_address: NetworkAddress,
    /// Announced IEEE address.
    pub long_address: LongAddress,
    /// MAC capability flags.
    pub capabilities: u8,
}

/// Which form of address response is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressRequestKind {
    /// Only the addressed device.
    SingleDevice,
    /// The device plus a page of its associated children.
    Extended,
}

/// Request for the long address of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRequest {
    /// Device being asked.
    pub network_address: NetworkAddress,
    /// Response form.
    pub kind: AddressRequestKind,
    /// First associated device to report (extended requests).
    pub start_index: u8,
}

impl AddressRequest {
    /// Single-device request.
    pub fn single(network_address: NetworkAddress) -> Self {
        Self {
            network_address,
            kind: AddressRequestKind::SingleDevice,
            start_index: 0,
        }
    }

    /// Extended request starting at `start_index`.
    pub fn extended(network_address: NetworkAddress, start_index: u8) -> Self {
        Self {
            network_address,
            kind: AddressRequestKind::Extended,
            start_index,
        }
    }
}

/// Response to an [`AddressRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressResponse {
    /// Result of the request.
    pub status: ZdoStatus,
    /// Long address of the responder.
    pub long_address: LongAddress,
    /// Short address of the responder.
    pub network_address: NetworkAddress,
    /// Total associated devices (extended responses).
    pub total_associated: u8,
    /// Index of the first entry in `associated_devices`.
    pub start_index: u8,
    /// Page of associated children (extended responses).
    pub associated_devices: Vec<NetworkAddress>,
}

impl AddressResponse {
    /// Successful single-device response.
    pub fn success(network_address: NetworkAddress, long_address: LongAddress) -> Self {
        Self {
            status: ZdoStatus::SUCCESS,
            long_address,
            network_address,
            total_associated: 0,
            start_index: 0,
            associated_devices: Vec::new(),
        }
    }

    /// Failed response carrying `status`.
    pub fn failure(network_address: NetworkAddress, status: ZdoStatus) -> Self {
        Self {
            status,
            ..Self::success(network_address, LongAddress(0))
        }
    }
}

/// Role of a neighbor in the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    /// Network coordinator.
    Coordinator,
    /// Routing device.
    Router,
    /// Sleepy or non-routing end device.
    EndDevice,
    /// Role not reported.
    Unknown,
}

impl DeviceType {
    /// Check whether the device keeps its own neighbor table.
    pub fn routes(self) -> bool {
        matches!(self, Self::Coordinator | Self::Router)
    }
}

/// One neighbor-table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Neighbor {
    /// Neighbor short address.
    pub network_address: NetworkAddress,
    /// Neighbor IEEE address.
    pub long_address: LongAddress,
    /// Neighbor role.
    pub device_type: DeviceType,
    /// Link quality indicator toward the neighbor.
    pub lqi: u8,
}

/// One page of a device's neighbor table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborTableResponse {
    /// Result of the request.
    pub status: ZdoStatus,
    /// Device whose table this is.
    pub source: NetworkAddress,
    /// Total entries in the table.
    pub total_entries: u8,
    /// Index of the first entry in `neighbors`.
    pub start_index: u8,
    /// Entries of this page.
    pub neighbors: Vec<Neighbor>,
}

/// Receives device announcements.
pub trait AnnounceListener: Send + Sync {
    /// A device announced itself.
    fn on_device_announce(&self, announce: &DeviceAnnounce);
}

/// Receives every incoming application frame.
pub trait MessageListener: Send + Sync {
    /// A frame arrived.
    fn on_incoming_message(&self, message: &IncomingMessage);
}

/// Transport-side collaborator.
///
/// Listener identity is the `Arc` allocation; registering the same listener
/// twice returns `false`.
pub trait NetworkManager: Send + Sync {
    /// Register an announce listener.
    fn add_announce_listener(&self, listener: Arc<dyn AnnounceListener>) -> bool;

    /// Deregister an announce listener.
    fn remove_announce_listener(&self, listener: &Arc<dyn AnnounceListener>) -> bool;

    /// Register an incoming-message listener.
    fn add_message_listener(&self, listener: Arc<dyn MessageListener>) -> bool;

    /// Deregister an incoming-message listener.
    fn remove_message_listener(&self, listener: &Arc<dyn MessageListener>) -> bool;

    /// Synchronous address exchange. `None` when the device did not answer
    /// before the transport timeout.
    fn resolve_long_address(&self, request: AddressRequest) -> Option<AddressResponse>;

    /// Synchronous neighbor-table exchange. `None` on timeout.
    fn request_neighbor_table(
        &self,
        address: NetworkAddress,
        start_index: u8,
    ) -> Option<NeighborTableResponse>;

    /// Identifier of the network currently joined.
    fn current_pan_id(&self) -> PanId;
}

/// Model of known nodes, fed by discovery.
pub trait NodeModel: Send + Sync {
    /// A node was found and resolved.
    fn notify_node_browsed(&self, node: &DiscoveredNode);
}

/// Builds endpoints for a discovered node.
pub trait EndpointImporter: Send + Sync {
    /// Import the endpoints of `entry`'s node.
    fn import_endpoints(&self, entry: &ImportEntry) -> Result<()>;
}
