// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Network device discovery.
//!
//! # Architecture
//!
//! ```text
//!                       NetworkManager (transport)
//!        announces |        messages |         ^ address / neighbor requests
//!                  v                 v         |
//!   AnnounceImporter     DiscoveryManager --> InspectionDispatcher (pool)
//!                  |                 |              |
//!                  |   AssociationBrowser / LinkQualityBrowser
//!                  v                 v              v
//!                  +-------> ImportQueue <----------+       NodeModel
//!                                    |
//!                             EndpointBuilder --> EndpointImporter
//! ```

mod address;
mod announce;
mod association;
mod dispatcher;
mod endpoint_builder;
mod link_quality;
mod manager;
mod network;
mod queue;

pub use address::{DiscoveredNode, ImportEntry, LongAddress, NetworkAddress, PanId, ZdoStatus};
pub use announce::AnnounceImporter;
pub use association::{AssociationBrowser, AssociationBrowserObserver};
pub use dispatcher::InspectionDispatcher;
pub use endpoint_builder::{EndpointBuilder, EndpointBuilderObserver};
pub use link_quality::{LinkQualityBrowser, LinkReport};
pub use manager::{DiscoveryManager, DiscoveryManagerObserver};
pub use network::{
    AddressRequest, AddressRequestKind, AddressResponse, AnnounceListener, DeviceAnnounce,
    DeviceType, EndpointImporter, IncomingMessage, MessageListener, Neighbor,
    NeighborTableResponse, NetworkManager, NodeModel,
};
pub use queue::ImportQueue;

pub use crate::config::DiscoveryMode;
