// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # meshdisc - mesh network device discovery
//!
//! Discovery core of a low-power mesh stack (16-bit network addresses, 64-bit
//! IEEE long addresses, PAN identifiers), built on a small observable-state
//! toolkit.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use meshdisc::discovery::{DiscoveryManager, EndpointImporter, NetworkManager, NodeModel};
//! use meshdisc::{DiscoveryConfig, Result, StateForwardingRegistry};
//! use std::sync::Arc;
//!
//! fn run(
//!     network: Arc<dyn NetworkManager>,
//!     nodes: Arc<dyn NodeModel>,
//!     importer: Arc<dyn EndpointImporter>,
//! ) -> Result<()> {
//!     let config = DiscoveryConfig::default().with_env_overrides();
//!     let manager = DiscoveryManager::new(
//!         network,
//!         nodes,
//!         importer,
//!         config,
//!         StateForwardingRegistry::new_shared(),
//!     )?;
//!
//!     manager.startup()?;
//!     // ... incoming messages are inspected, nodes imported ...
//!     manager.shutdown()?;
//!     manager.close()
//! }
//! ```
//!
//! ## Layers
//!
//! ```text
//! +---------------------------------------------------------------+
//! |  discovery   DiscoveryManager, strategies, ImportQueue        |
//! +---------------------------------------------------------------+
//! |  lifecycle   Lifecycle, LifecycleObject, PeriodicLifecycle    |
//! +---------------------------------------------------------------+
//! |  observe     Broadcaster, StateMachine, StateForwardingRegistry|
//! +---------------------------------------------------------------+
//! ```
//!
//! ## Logging
//!
//! The crate logs through the `log` facade and never installs a logger.

pub mod config;
pub mod discovery;
pub mod error;
pub mod lifecycle;
pub mod observe;

pub use config::{DiscoveryConfig, DiscoveryMode};
pub use error::{Error, NotifyResult, ObserverError, ResolutionFailure, Result};
pub use lifecycle::{
    Lifecycle, LifecycleObject, LifecycleObserver, LifecycleState, PeriodTask, PeriodicLifecycle,
    PeriodicWork,
};
pub use observe::{
    Broadcaster, ObservableId, StateChangeFn, StateChangeObserver, StateForwardingRegistry,
    StateMachine, Transition,
};
