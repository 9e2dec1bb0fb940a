// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! State-change forwarding bindings.
//!
//! A binding relays every transition of a source [`StateMachine`] into a
//! target [`Broadcaster`], as if the target had transitioned itself. Lifecycle
//! objects use it so observers registered on the object hear the changes of
//! the object's internal machine.
//!
//! # Architecture
//!
//! ```text
//! StateForwardingRegistry (injected, one per object graph)
//! +-- bindings: DashMap<(source id, target id), Arc<Forwarder>>
//!
//! StateMachine --on_state_changed--> Forwarder --notify--> Broadcaster<O>
//!                                     (Weak target)
//! ```

use super::broadcaster::{Broadcaster, ObservableId};
use super::state::{StateChangeObserver, StateMachine};
use crate::error::{Error, NotifyResult, ObserverError};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::any::Any;
use std::fmt::Debug;
use std::sync::{Arc, Weak};

type BindingKey = (ObservableId, ObservableId);

/// Table of (source, target) forwarding bindings.
///
/// At most one binding exists per key; binding is idempotent.
#[derive(Default)]
pub struct StateForwardingRegistry {
    bindings: DashMap<BindingKey, Box<dyn Any + Send + Sync>>,
}

impl StateForwardingRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry behind an `Arc`.
    ///
    /// Every call returns a new, independent table. Objects only see each
    /// other's bindings when they are handed the same `Arc`.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Forward every change of `source` into `target`.
    ///
    /// Returns `true` if a new binding was created, `false` if one already
    /// existed for this pair (in which case nothing changes).
    pub fn bind<S, O>(&self, source: &StateMachine<S>, target: &Arc<Broadcaster<O>>) -> bool
    where
        S: Copy + PartialEq + Debug + Send + Sync + 'static,
        O: ?Sized + StateChangeObserver<S> + Send + Sync + 'static,
    {
        match self.bindings.entry((source.id(), target.id())) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                let forwarder: Arc<dyn StateChangeObserver<S>> = Arc::new(Forwarder {
                    target: Arc::downgrade(target),
                });
                source.add_observer(forwarder.clone());
                slot.insert(Box::new(forwarder));
                true
            }
        }
    }

    /// Remove the binding between `source` and `target`.
    ///
    /// Returns `true` if a binding existed and was removed.
    pub fn unbind<S, O>(&self, source: &StateMachine<S>, target: &Broadcaster<O>) -> bool
    where
        S: Copy + PartialEq + Debug + Send + Sync + 'static,
        O: ?Sized,
    {
        let Some((_, entry)) = self.bindings.remove(&(source.id(), target.id())) else {
            return false;
        };

        match entry.downcast_ref::<Arc<dyn StateChangeObserver<S>>>() {
            Some(forwarder) => {
                source.remove_observer(forwarder);
            }
            None => log::debug!(
                "[StateForwardingRegistry] binding {:?} held an unexpected forwarder type",
                source.id()
            ),
        }
        true
    }

    /// Check whether `source` is bound to `target`.
    pub fn is_bound<S, O>(&self, source: &StateMachine<S>, target: &Broadcaster<O>) -> bool
    where
        S: Copy + PartialEq + Debug + Send + Sync + 'static,
        O: ?Sized,
    {
        self.bindings.contains_key(&(source.id(), target.id()))
    }

    /// Number of live bindings.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Check whether the registry holds no bindings.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl std::fmt::Debug for StateForwardingRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateForwardingRegistry")
            .field("bindings", &self.bindings.len())
            .finish()
    }
}

/// Relays state changes into a target broadcaster.
struct Forwarder<O: ?Sized> {
    target: Weak<Broadcaster<O>>,
}

impl<S, O> StateChangeObserver<S> for Forwarder<O>
where
    S: Copy,
    O: ?Sized + StateChangeObserver<S> + Send + Sync,
{
    fn on_state_changed(&self, state: S) -> NotifyResult {
        let Some(target) = self.target.upgrade() else {
            return Ok(());
        };
        target
            .notify(|o| o.on_state_changed(state))
            .map_err(|e| match e {
                Error::ObserverNotification(inner) => inner,
                other => ObserverError::new(other.to_string()),
            })
    }
}
