// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Import queue: the single hand-off point between discovery and endpoint
//! building.
//!
//! Many producers (inspection workers, browsers, the announce listener) push;
//! one consumer (the endpoint builder) pops. Closing wakes blocked consumers
//! and makes further pushes fail until the queue is cleared again.

use super::address::ImportEntry;
use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct QueueInner {
    entries: VecDeque<ImportEntry>,
    closed: bool,
}

/// FIFO of discovered (network address, long address) pairs.
#[derive(Debug, Default)]
pub struct ImportQueue {
    inner: Mutex<QueueInner>,
    available: Condvar,
}

impl ImportQueue {
    /// Create an empty, open queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Fails with [`Error::QueueClosed`] once closed.
    pub fn push(&self, entry: ImportEntry) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(Error::QueueClosed);
        }
        inner.entries.push_back(entry);
        drop(inner);
        self.available.notify_one();
        Ok(())
    }

    /// Remove the oldest entry, blocking while the queue is empty and open.
    ///
    /// Returns `None` once the queue is closed. Entries still queued at close
    /// time are not handed out.
    pub fn pop(&self) -> Option<ImportEntry> {
        let mut inner = self.inner.lock();
        loop {
            if inner.closed {
                return None;
            }
            if let Some(entry) = inner.entries.pop_front() {
                return Some(entry);
            }
            self.available.wait(&mut inner);
        }
    }

    /// Like [`pop`](Self::pop), giving up after `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<ImportEntry> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if inner.closed {
                return None;
            }
            if let Some(entry) = inner.entries.pop_front() {
                return Some(entry);
            }
            if self.available.wait_until(&mut inner, deadline).timed_out() {
                if inner.closed {
                    return None;
                }
                return inner.entries.pop_front();
            }
        }
    }

    /// Drop every entry and reopen the queue.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.closed = false;
    }

    /// Close the queue and wake every blocked consumer.
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.available.notify_all();
    }

    /// Number of queued entries.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Check whether no entry is queued.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Check whether the queue is closed.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{LongAddress, NetworkAddress};
    use std::sync::Arc;
    use std::thread;

    fn entry(n: u16) -> ImportEntry {
        ImportEntry::new(NetworkAddress(n), LongAddress(u64::from(n)))
    }

    #[test]
    fn test_fifo_order() {
        let queue = ImportQueue::new();
        queue.push(entry(1)).unwrap();
        queue.push(entry(2)).unwrap();
        queue.push(entry(1)).unwrap();

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop(), Some(entry(1)));
        assert_eq!(queue.pop(), Some(entry(2)));
        assert_eq!(queue.pop(), Some(entry(1)));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_close_wakes_blocked_pop() {
        let queue = Arc::new(ImportQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop())
        };

        thread::sleep(Duration::from_millis(20));
        queue.close();
        assert_eq!(consumer.join().unwrap(), None);
    }

    #[test]
    fn test_push_after_close_fails_until_clear() {
        let queue = ImportQueue::new();
        queue.close();
        assert!(queue.is_closed());
        assert!(matches!(queue.push(entry(7)), Err(Error::QueueClosed)));

        queue.clear();
        assert!(!queue.is_closed());
        queue.push(entry(7)).unwrap();
        assert_eq!(queue.pop_timeout(Duration::from_millis(10)), Some(entry(7)));
    }

    #[test]
    fn test_pop_timeout_on_empty() {
        let queue = ImportQueue::new();
        let begin = Instant::now();
        assert_eq!(queue.pop_timeout(Duration::from_millis(15)), None);
        assert!(begin.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn test_concurrent_producers() {
        let queue = Arc::new(ImportQueue::new());
        let producers: Vec<_> = (0..8u16)
            .map(|t| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..50u16 {
                        queue.push(entry(t * 100 + i)).unwrap();
                    }
                })
            })
            .collect();

        let mut received = 0;
        while received < 400 {
            assert!(queue.pop_timeout(Duration::from_secs(5)).is_some());
            received += 1;
        }
        for p in producers {
            p.join().unwrap();
        }
        assert!(queue.is_empty());
    }
}
