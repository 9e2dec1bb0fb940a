// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery orchestrator.
//!
//! [`DiscoveryManager`] starts the enabled discovery strategies, listens to
//! every incoming message to inspect newly seen addresses, and tears
//! everything down again on shutdown.
//!
//! # Startup
//!
//! 1. Stopped -> Starting
//! 2. forget inspected addresses, reopen the import queue
//! 3. announce listener / association browser / link-quality browser, as
//!    enabled (disabled modes are skipped)
//! 4. endpoint builder (always)
//! 5. register as incoming-message listener
//! 6. Starting -> Started
//!
//! # Shutdown
//!
//! Stopping, then every strategy is stopped and the import queue closed
//! before reporting Stopped. Inspections already dispatched finish detached.

use super::announce::AnnounceImporter;
use super::association::{AssociationBrowser, AssociationBrowserObserver};
use super::dispatcher::InspectionDispatcher;
use super::endpoint_builder::{EndpointBuilder, EndpointBuilderObserver};
use super::link_quality::LinkQualityBrowser;
use super::network::{
    AnnounceListener, EndpointImporter, IncomingMessage, MessageListener, NetworkManager,
    NodeModel,
};
use super::queue::ImportQueue;
use super::NetworkAddress;
use crate::config::{DiscoveryConfig, DiscoveryMode};
use crate::error::{NotifyResult, Result};
use crate::lifecycle::{Lifecycle, LifecycleObject, LifecycleState};
use crate::observe::{StateChangeObserver, StateForwardingRegistry};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Extra time granted to the endpoint builder to exit on shutdown.
const BUILDER_EXIT_GRACE: Duration = Duration::from_secs(1);

/// Observer of a [`DiscoveryManager`].
///
/// Receives every lifecycle transition plus the initial-browse milestone.
pub trait DiscoveryManagerObserver: StateChangeObserver<LifecycleState> {
    /// Initial network browsing completed for the current startup cycle.
    fn on_initial_browsing_complete(&self) -> NotifyResult {
        Ok(())
    }
}

/// Strategy instances alive between startup and shutdown.
#[derive(Default)]
struct ActiveStrategies {
    message_listener: Option<Arc<dyn MessageListener>>,
    announce: Option<Arc<dyn AnnounceListener>>,
    association: Option<AssociationBrowser>,
    link_quality: Option<LinkQualityBrowser>,
    endpoint_builder: Option<EndpointBuilder>,
}

struct ManagerShared {
    lifecycle: Lifecycle<dyn DiscoveryManagerObserver>,
    config: DiscoveryConfig,
    network: Arc<dyn NetworkManager>,
    importer: Arc<dyn EndpointImporter>,
    registry: Arc<StateForwardingRegistry>,
    queue: Arc<ImportQueue>,
    dispatcher: InspectionDispatcher,
    strategies: Mutex<Option<ActiveStrategies>>,
    reported: AtomicBool,
}

impl ManagerShared {
    fn is_initial_network_browsing_complete(&self) -> bool {
        let strategies = self.strategies.lock();
        let Some(active) = strategies.as_ref() else {
            return false;
        };
        let association_done = active
            .association
            .as_ref()
            .map_or(true, AssociationBrowser::is_initial_network_browsing_complete);
        let builder_ready = active
            .endpoint_builder
            .as_ref()
            .is_some_and(EndpointBuilder::is_ready);
        association_done && builder_ready
    }

    /// Broadcast the initial-browse milestone the first time it holds in
    /// this cycle.
    fn refresh_initial_browsing(&self) {
        if !self.is_initial_network_browsing_complete() {
            return;
        }
        if self.reported.swap(true, Ordering::AcqRel) {
            return;
        }
        log::info!("[DiscoveryManager] initial network browsing complete");
        if let Err(e) = self
            .lifecycle
            .broadcaster()
            .notify(|o| o.on_initial_browsing_complete())
        {
            log::warn!("[DiscoveryManager] observer failed: {}", e);
        }
    }

    fn launch(
        &self,
        active: &mut ActiveStrategies,
        relay: &Arc<ProgressRelay>,
        listener: Arc<dyn MessageListener>,
    ) -> Result<()> {
        if self.config.is_enabled(DiscoveryMode::Announce) {
            let announce: Arc<dyn AnnounceListener> =
                Arc::new(AnnounceImporter::new(Arc::clone(&self.queue)));
            self.network.add_announce_listener(Arc::clone(&announce));
            active.announce = Some(announce);
        } else {
            log::trace!("[DiscoveryManager] announce discovery disabled");
        }

        if self.config.is_enabled(DiscoveryMode::Addressing) {
            let browser = AssociationBrowser::new(
                Arc::clone(&self.network),
                Arc::clone(&self.queue),
                self.config.browse_root(),
                self.config.association_period(),
                Arc::clone(&self.registry),
            )?;
            browser.add_browser_observer(relay.clone());
            let browser = active.association.insert(browser);
            browser.start()?;
        } else {
            log::trace!("[DiscoveryManager] addressing discovery disabled");
        }

        if self.config.is_enabled(DiscoveryMode::LinkQuality) {
            let browser = LinkQualityBrowser::new(
                Arc::clone(&self.network),
                Arc::clone(&self.queue),
                self.config.browse_root(),
                self.config.link_quality_period(),
                Arc::clone(&self.registry),
            )?;
            let browser = active.link_quality.insert(browser);
            browser.start()?;
        } else {
            log::trace!("[DiscoveryManager] link quality discovery disabled");
        }

        let builder = EndpointBuilder::new(
            Arc::clone(&self.queue),
            Arc::clone(&self.importer),
            self.config.endpoint_poll_interval(),
            Arc::clone(&self.registry),
        )?;
        builder.add_builder_observer(relay.clone());
        let builder = active.endpoint_builder.insert(builder);
        builder.start()?;

        self.network.add_message_listener(Arc::clone(&listener));
        active.message_listener = Some(listener);
        Ok(())
    }

    /// Stop every strategy in `active` and close the import queue.
    fn teardown(&self, active: ActiveStrategies) {
        if let Some(listener) = &active.message_listener {
            self.network.remove_message_listener(listener);
        }
        if let Some(announce) = &active.announce {
            self.network.remove_announce_listener(announce);
        }

        if let Some(browser) = &active.association {
            stop_and_close("association browser", browser, |b: &AssociationBrowser| b.close());
        }
        if let Some(browser) = &active.link_quality {
            stop_and_close("link quality browser", browser, |b: &LinkQualityBrowser| {
                b.close()
            });
        }

        if let Some(builder) = &active.endpoint_builder {
            if builder.lifecycle().is(LifecycleState::Started) {
                if let Err(e) = builder.stop() {
                    log::warn!("[DiscoveryManager] stopping endpoint builder: {}", e);
                }
            }
        }

        self.queue.close();

        if let Some(builder) = &active.endpoint_builder {
            let grace = self.config.endpoint_poll_interval() + BUILDER_EXIT_GRACE;
            if builder
                .lifecycle()
                .wait_for_any_of_timeout(&[LifecycleState::Stopped], grace)
                .is_none()
            {
                log::debug!("[DiscoveryManager] endpoint builder still finishing");
            }
            if let Err(e) = builder.close() {
                log::debug!("[DiscoveryManager] closing endpoint builder: {}", e);
            }
        }
    }
}

impl MessageListener for ManagerShared {
    fn on_incoming_message(&self, message: &IncomingMessage) {
        self.dispatcher.dispatch(message.source_address);
    }
}

fn stop_and_close<T, F>(label: &str, strategy: &T, close: F)
where
    T: LifecycleObject,
    F: FnOnce(&T) -> Result<()>,
{
    if strategy.lifecycle().is(LifecycleState::Started) {
        if let Err(e) = strategy.stop() {
            log::warn!("[DiscoveryManager] stopping {}: {}", label, e);
        }
    }
    if let Err(e) = close(strategy) {
        log::debug!("[DiscoveryManager] closing {}: {}", label, e);
    }
}

/// Relays strategy progress back to the manager without keeping it alive.
struct ProgressRelay {
    manager: Weak<ManagerShared>,
}

impl ProgressRelay {
    fn refresh(&self) -> NotifyResult {
        if let Some(manager) = self.manager.upgrade() {
            manager.refresh_initial_browsing();
        }
        Ok(())
    }
}

impl AssociationBrowserObserver for ProgressRelay {
    fn on_initial_network_browsing_complete(&self) -> NotifyResult {
        self.refresh()
    }
}

impl EndpointBuilderObserver for ProgressRelay {
    fn on_ready(&self) -> NotifyResult {
        self.refresh()
    }
}

/// Owner of the discovery strategies and the address-inspection pipeline.
///
/// `startup`/`shutdown` are the [`LifecycleObject`] `start`/`stop`.
pub struct DiscoveryManager {
    shared: Arc<ManagerShared>,
}

impl DiscoveryManager {
    /// Create a stopped manager.
    ///
    /// Fails with a configuration error if `config` does not validate.
    pub fn new(
        network: Arc<dyn NetworkManager>,
        node_model: Arc<dyn NodeModel>,
        importer: Arc<dyn EndpointImporter>,
        config: DiscoveryConfig,
        registry: Arc<StateForwardingRegistry>,
    ) -> Result<Self> {
        config.validate()?;

        let queue = Arc::new(ImportQueue::new());
        let dispatcher = InspectionDispatcher::new(
            Arc::clone(&network),
            node_model,
            Arc::clone(&queue),
            config.inspection_workers,
            config.inspection_queue_capacity,
        );

        log::debug!(
            "[DiscoveryManager] created with modes {:?}",
            config.modes
        );

        Ok(Self {
            shared: Arc::new(ManagerShared {
                lifecycle: Lifecycle::new(Arc::clone(&registry))?,
                config,
                network,
                importer,
                registry,
                queue,
                dispatcher,
                strategies: Mutex::new(None),
                reported: AtomicBool::new(false),
            }),
        })
    }

    /// Start discovery.
    pub fn startup(&self) -> Result<()> {
        self.start()
    }

    /// Stop discovery.
    pub fn shutdown(&self) -> Result<()> {
        self.stop()
    }

    /// Handle an incoming frame: inspect its source address unless already
    /// inspected in this cycle.
    pub fn on_incoming_message(&self, message: &IncomingMessage) {
        self.shared.on_incoming_message(message);
    }

    /// True iff the association browser is disabled or finished its first
    /// pass, and the endpoint builder is ready.
    pub fn is_initial_network_browsing_complete(&self) -> bool {
        self.shared.is_initial_network_browsing_complete()
    }

    /// Enabled discovery modes.
    pub fn enabled_modes(&self) -> &BTreeSet<DiscoveryMode> {
        &self.shared.config.modes
    }

    /// Active configuration.
    pub fn config(&self) -> &DiscoveryConfig {
        &self.shared.config
    }

    /// The import queue shared by every strategy.
    pub fn import_queue(&self) -> &Arc<ImportQueue> {
        &self.shared.queue
    }

    /// Check whether `address` was inspected in this cycle.
    pub fn is_inspected(&self, address: NetworkAddress) -> bool {
        self.shared.dispatcher.is_inspected(address)
    }

    /// Addresses inspected in this cycle.
    pub fn inspected_count(&self) -> usize {
        self.shared.dispatcher.inspected_count()
    }

    /// Inspections dispatched since creation.
    pub fn dispatched_count(&self) -> u64 {
        self.shared.dispatcher.dispatched_count()
    }

    /// Best LQI toward `address` from the last link-quality pass.
    pub fn link_quality(&self, address: NetworkAddress) -> Option<u8> {
        self.shared
            .strategies
            .lock()
            .as_ref()?
            .link_quality
            .as_ref()?
            .link_quality(address)
    }

    /// Register an observer.
    pub fn add_observer(&self, observer: Arc<dyn DiscoveryManagerObserver>) -> bool {
        self.shared.lifecycle.add_observer(observer)
    }

    /// Deregister an observer.
    pub fn remove_observer(&self, observer: &Arc<dyn DiscoveryManagerObserver>) -> bool {
        self.shared.lifecycle.remove_observer(observer)
    }

    /// Remove the lifecycle self-binding. Call once the manager is discarded.
    pub fn close(&self) -> Result<()> {
        self.shared.lifecycle.close()
    }
}

impl LifecycleObject for DiscoveryManager {
    type Observer = dyn DiscoveryManagerObserver;

    fn lifecycle(&self) -> &Lifecycle<dyn DiscoveryManagerObserver> {
        &self.shared.lifecycle
    }

    fn start_impl(&self) -> Result<()> {
        let shared = &self.shared;
        log::info!("[DiscoveryManager] starting");

        shared.reported.store(false, Ordering::Release);
        shared.queue.clear();
        shared.dispatcher.reset()?;

        let relay = Arc::new(ProgressRelay {
            manager: Arc::downgrade(shared),
        });
        let listener: Arc<dyn MessageListener> = shared.clone();
        let mut active = ActiveStrategies::default();

        if let Err(e) = shared.launch(&mut active, &relay, listener) {
            log::warn!("[DiscoveryManager] startup failed: {}", e);
            shared.dispatcher.shutdown();
            shared.teardown(active);
            return Err(e);
        }

        *shared.strategies.lock() = Some(active);
        shared.lifecycle.did_start()?;
        log::info!("[DiscoveryManager] started");

        // Progress reported before the strategies were stored.
        shared.refresh_initial_browsing();
        Ok(())
    }

    fn stop_impl(&self) -> Result<()> {
        let shared = &self.shared;
        log::info!("[DiscoveryManager] stopping");

        let active = shared.strategies.lock().take();
        shared.dispatcher.shutdown();
        match active {
            Some(active) => shared.teardown(active),
            None => shared.queue.close(),
        }

        shared.lifecycle.did_stop()?;
        log::info!("[DiscoveryManager] stopped");
        Ok(())
    }
}

impl Drop for DiscoveryManager {
    fn drop(&mut self) {
        if self.shared.lifecycle.is(LifecycleState::Started) {
            log::debug!("[DiscoveryManager] dropped while started, shutting down");
            if let Err(e) = self.stop() {
                log::warn!("[DiscoveryManager] shutdown on drop failed: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for DiscoveryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryManager")
            .field("state", &self.shared.lifecycle.state())
            .field("modes", &self.shared.config.modes)
            .field("inspected", &self.inspected_count())
            .field("queued", &self.shared.queue.len())
            .finish()
    }
}
