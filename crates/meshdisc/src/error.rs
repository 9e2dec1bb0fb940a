// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types shared by the observer, lifecycle and discovery layers.

use crate::discovery::{NetworkAddress, ZdoStatus};
use crate::lifecycle::LifecycleState;
use thiserror::Error;

/// Errors returned by meshdisc operations.
#[derive(Debug, Error)]
pub enum Error {
    // ========================================================================
    // Lifecycle / state errors
    // ========================================================================
    /// A lifecycle operation was invoked in a state that forbids it.
    #[error("Lifecycle operation '{operation}' not allowed in state {state:?}")]
    Lifecycle {
        /// Operation that was attempted (`start`, `did_start`, ...).
        operation: &'static str,
        /// State the object was in.
        state: LifecycleState,
    },

    /// A binding/unbinding invariant was violated (programming defect).
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// An observer failed while handling a notification.
    #[error("Observer notification failed: {0}")]
    ObserverNotification(#[from] ObserverError),

    // ========================================================================
    // Configuration errors
    // ========================================================================
    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Configuration file could not be parsed.
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// I/O error (configuration file access).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ========================================================================
    // Discovery errors
    // ========================================================================
    /// Long-address resolution for a network address failed.
    #[error("Resolution of {address} failed: {reason}")]
    Resolution {
        /// Network address being resolved.
        address: NetworkAddress,
        /// Why the exchange failed.
        reason: ResolutionFailure,
    },

    /// An inspection finished after its discovery cycle ended.
    #[error("Inspection of {address} outlived its discovery cycle")]
    StaleInspection {
        /// Network address that was being inspected.
        address: NetworkAddress,
    },

    /// The import queue has been closed.
    #[error("Import queue closed")]
    QueueClosed,

    /// The endpoint importer rejected a node.
    #[error("Import of {address} failed: {reason}")]
    Import {
        /// Network address of the node.
        address: NetworkAddress,
        /// Collaborator-provided reason.
        reason: String,
    },

    /// A worker thread could not be spawned.
    #[error("Failed to spawn thread '{name}': {source}")]
    ThreadSpawn {
        /// Thread name.
        name: String,
        /// Underlying OS error.
        source: std::io::Error,
    },
}

/// Why a long-address resolution exchange produced no usable answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionFailure {
    /// The device did not answer before the transport timed out.
    NoResponse,
    /// The device answered with a non-success status.
    Status(ZdoStatus),
}

impl std::fmt::Display for ResolutionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoResponse => write!(f, "no response"),
            Self::Status(status) => write!(f, "status {}", status),
        }
    }
}

/// Failure raised by an observer's notification handler.
///
/// Notifications never return a value; this is the only thing a handler can
/// hand back to the broadcaster.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ObserverError {
    message: String,
}

impl ObserverError {
    /// Create an observer failure with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Failure message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Return type of every observer notification.
pub type NotifyResult = std::result::Result<(), ObserverError>;

/// Convenient alias for results using the crate `Error` type.
pub type Result<T> = std::result::Result<T, Error>;
