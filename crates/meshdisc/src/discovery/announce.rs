// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Announce strategy: devices announcing themselves go straight to import.

use super::address::ImportEntry;
use super::network::{AnnounceListener, DeviceAnnounce};
use super::queue::ImportQueue;
use crate::error::Error;
use std::sync::Arc;

/// Announce listener feeding the import queue.
#[derive(Debug)]
pub struct AnnounceImporter {
    queue: Arc<ImportQueue>,
}

impl AnnounceImporter {
    /// Create a listener pushing into `queue`.
    pub fn new(queue: Arc<ImportQueue>) -> Self {
        Self { queue }
    }
}

impl AnnounceListener for AnnounceImporter {
    fn on_device_announce(&self, announce: &DeviceAnnounce) {
        let entry = ImportEntry::new(announce.network_address, announce.long_address);
        match self.queue.push(entry) {
            Ok(()) => log::debug!(
                "[AnnounceImporter] {} announced as {}",
                announce.network_address,
                announce.long_address
            ),
            Err(Error::QueueClosed) => log::debug!(
                "[AnnounceImporter] import queue closed, ignoring announce from {}",
                announce.network_address
            ),
            Err(e) => log::warn!("[AnnounceImporter] {}", e),
        }
    }
}
