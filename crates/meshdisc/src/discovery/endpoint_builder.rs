// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Consumer side of the import queue.
//!
//! One worker thread drains the queue and hands every entry to the
//! [`EndpointImporter`]. The builder becomes ready the first time it finds the
//! queue empty in a cycle. Stopping only signals the worker; the worker
//! reports Stopped itself when it exits.

use super::address::ImportEntry;
use super::network::EndpointImporter;
use super::queue::ImportQueue;
use crate::error::{Error, NotifyResult, Result};
use crate::lifecycle::{Lifecycle, LifecycleObject, LifecycleObserver, LifecycleState};
use crate::observe::{Broadcaster, StateForwardingRegistry};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const THREAD_NAME: &str = "meshdisc-endpoint-builder";

/// Observer of endpoint builder readiness.
pub trait EndpointBuilderObserver: Send + Sync {
    /// The builder drained the import queue for the first time this cycle.
    fn on_ready(&self) -> NotifyResult;
}

struct BuilderShared {
    lifecycle: Lifecycle,
    queue: Arc<ImportQueue>,
    importer: Arc<dyn EndpointImporter>,
    poll_interval: Duration,
    finish: AtomicBool,
    ready: AtomicBool,
    imported: AtomicU64,
    failed: AtomicU64,
    observers: Broadcaster<dyn EndpointBuilderObserver>,
}

impl BuilderShared {
    fn run(&self) {
        log::debug!("[EndpointBuilder] consumer started");
        while !self.finish.load(Ordering::Acquire) {
            match self.queue.pop_timeout(self.poll_interval) {
                Some(entry) => self.import(&entry),
                None if self.queue.is_closed() => break,
                None => self.mark_ready(),
            }
        }
        self.report_stopped();
    }

    fn import(&self, entry: &ImportEntry) {
        match self.importer.import_endpoints(entry) {
            Ok(()) => {
                self.imported.fetch_add(1, Ordering::Relaxed);
                log::debug!(
                    "[EndpointBuilder] imported {} ({})",
                    entry.network_address,
                    entry.long_address
                );
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                log::warn!("[EndpointBuilder] {}", e);
            }
        }
    }

    fn mark_ready(&self) {
        if !self.queue.is_empty() || self.ready.swap(true, Ordering::AcqRel) {
            return;
        }
        log::info!("[EndpointBuilder] import queue drained, ready");
        if let Err(e) = self.observers.notify(|o| o.on_ready()) {
            log::warn!("[EndpointBuilder] observer failed: {}", e);
        }
    }

    fn report_stopped(&self) {
        if self.lifecycle.is(LifecycleState::Started) {
            // Queue closed underneath a running builder.
            log::debug!("[EndpointBuilder] import queue closed while started");
            if let Err(e) = self.lifecycle.begin_stop() {
                log::debug!("[EndpointBuilder] {}", e);
            }
        }
        if let Err(e) = self.lifecycle.did_stop() {
            log::warn!("[EndpointBuilder] {}", e);
        }
        log::debug!("[EndpointBuilder] consumer exited");
    }
}

/// Import-queue consumer feeding the endpoint importer.
pub struct EndpointBuilder {
    shared: Arc<BuilderShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl EndpointBuilder {
    /// Create a stopped builder. `poll_interval` bounds how long the worker
    /// waits on an empty queue before rechecking for a stop request.
    pub fn new(
        queue: Arc<ImportQueue>,
        importer: Arc<dyn EndpointImporter>,
        poll_interval: Duration,
        registry: Arc<StateForwardingRegistry>,
    ) -> Result<Self> {
        Ok(Self {
            shared: Arc::new(BuilderShared {
                lifecycle: Lifecycle::new(registry)?,
                queue,
                importer,
                poll_interval,
                finish: AtomicBool::new(false),
                ready: AtomicBool::new(false),
                imported: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                observers: Broadcaster::new(),
            }),
            worker: Mutex::new(None),
        })
    }

    /// Check whether the queue has been drained at least once this cycle.
    pub fn is_ready(&self) -> bool {
        self.shared.ready.load(Ordering::Acquire)
    }

    /// Entries imported successfully since creation.
    pub fn imported_count(&self) -> u64 {
        self.shared.imported.load(Ordering::Relaxed)
    }

    /// Entries the importer rejected since creation.
    pub fn failed_count(&self) -> u64 {
        self.shared.failed.load(Ordering::Relaxed)
    }

    /// Register a readiness observer.
    pub fn add_builder_observer(&self, observer: Arc<dyn EndpointBuilderObserver>) -> bool {
        self.shared.observers.add_observer(observer)
    }

    /// Deregister a readiness observer.
    pub fn remove_builder_observer(&self, observer: &Arc<dyn EndpointBuilderObserver>) -> bool {
        self.shared.observers.remove_observer(observer)
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
            return;
        }
        if handle.join().is_err() {
            log::warn!("[EndpointBuilder] consumer thread panicked");
        }
    }
}

impl LifecycleObject for EndpointBuilder {
    type Observer = LifecycleObserver;

    fn lifecycle(&self) -> &Lifecycle {
        &self.shared.lifecycle
    }

    fn start_impl(&self) -> Result<()> {
        // Previous consumer already reported Stopped; reap it.
        self.join_worker();

        self.shared.finish.store(false, Ordering::Release);
        self.shared.ready.store(false, Ordering::Release);

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || shared.run())
            .map_err(|source| Error::ThreadSpawn {
                name: THREAD_NAME.to_string(),
                source,
            })?;
        *self.worker.lock() = Some(handle);

        self.shared.lifecycle.did_start()
    }

    fn stop_impl(&self) -> Result<()> {
        self.shared.finish.store(true, Ordering::Release);
        log::debug!("[EndpointBuilder] finish requested");
        Ok(())
    }
}

impl Drop for EndpointBuilder {
    fn drop(&mut self) {
        self.shared.finish.store(true, Ordering::Release);
        self.join_worker();
    }
}

impl std::fmt::Debug for EndpointBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointBuilder")
            .field("state", &self.shared.lifecycle.state())
            .field("ready", &self.is_ready())
            .field("imported", &self.imported_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{LongAddress, NetworkAddress};
    use std::time::Instant;

    #[derive(Default)]
    struct Importer {
        seen: Mutex<Vec<ImportEntry>>,
    }

    impl EndpointImporter for Importer {
        fn import_endpoints(&self, entry: &ImportEntry) -> Result<()> {
            if entry.network_address == NetworkAddress(0xDEAD) {
                return Err(Error::Import {
                    address: entry.network_address,
                    reason: "no active endpoints".to_string(),
                });
            }
            self.seen.lock().push(*entry);
            Ok(())
        }
    }

    struct ReadyCount(AtomicU64);

    impl EndpointBuilderObserver for ReadyCount {
        fn on_ready(&self) -> NotifyResult {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn entry(n: u16) -> ImportEntry {
        ImportEntry::new(NetworkAddress(n), LongAddress(u64::from(n)))
    }

    fn builder(queue: &Arc<ImportQueue>, importer: &Arc<Importer>) -> EndpointBuilder {
        EndpointBuilder::new(
            Arc::clone(queue),
            importer.clone(),
            Duration::from_millis(5),
            StateForwardingRegistry::new_shared(),
        )
        .unwrap()
    }

    #[test]
    fn test_drains_queue_then_ready() {
        let queue = Arc::new(ImportQueue::new());
        let importer = Arc::new(Importer::default());
        queue.push(entry(1)).unwrap();
        queue.push(entry(0xDEAD)).unwrap();
        queue.push(entry(2)).unwrap();

        let builder = builder(&queue, &importer);
        let ready = Arc::new(ReadyCount(AtomicU64::new(0)));
        builder.add_builder_observer(ready.clone());

        builder.start().unwrap();
        wait_until(|| ready.0.load(Ordering::SeqCst) == 1);
        assert!(builder.is_ready());

        assert_eq!(*importer.seen.lock(), vec![entry(1), entry(2)]);
        assert_eq!(builder.imported_count(), 2);
        assert_eq!(builder.failed_count(), 1);

        queue.push(entry(3)).unwrap();
        wait_until(|| builder.imported_count() == 3);
        assert_eq!(ready.0.load(Ordering::SeqCst), 1);

        builder.stop().unwrap();
        builder.lifecycle().wait_for(LifecycleState::Stopped);
        builder.close().unwrap();
    }

    #[test]
    fn test_stop_reports_stopped_asynchronously() {
        let queue = Arc::new(ImportQueue::new());
        let importer = Arc::new(Importer::default());
        let builder = builder(&queue, &importer);

        builder.start().unwrap();
        builder.stop().unwrap();
        let state = builder
            .lifecycle()
            .wait_for_any_of_timeout(&[LifecycleState::Stopped], Duration::from_secs(5));
        assert_eq!(state, Some(LifecycleState::Stopped));

        // Restartable once stopped.
        builder.start().unwrap();
        assert_eq!(builder.state(), LifecycleState::Started);
        builder.stop().unwrap();
        builder.lifecycle().wait_for(LifecycleState::Stopped);
    }

    #[test]
    fn test_queue_close_ends_consumer() {
        let queue = Arc::new(ImportQueue::new());
        let importer = Arc::new(Importer::default());
        let builder = builder(&queue, &importer);

        builder.start().unwrap();
        queue.close();
        assert_eq!(
            builder.lifecycle().wait_for(LifecycleState::Stopped),
            LifecycleState::Stopped
        );
    }
}
