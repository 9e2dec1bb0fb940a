// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery configuration.
//!
//! Supports programmatic construction (`with_*` builders), TOML files and
//! environment overrides.
//!
//! # Example
//!
//! ```toml
//! modes = ["announce", "addressing"]
//! inspection_workers = 2
//! association_period_secs = 600
//! browse_root = 0
//! ```
//!
//! # Environment
//!
//! - `MESHDISC_MODES`: comma-separated list of modes
//! - `MESHDISC_INSPECTION_WORKERS`: inspection worker count
//! - `MESHDISC_ASSOCIATION_PERIOD_SECS`: association browse period
//! - `MESHDISC_LINK_QUALITY_PERIOD_SECS`: link-quality browse period

use crate::discovery::NetworkAddress;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Discovery strategy selectable in [`DiscoveryConfig::modes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DiscoveryMode {
    /// Import devices announcing themselves on join.
    Announce,
    /// Periodically walk the association tree.
    Addressing,
    /// Periodically walk neighbor tables.
    LinkQuality,
}

impl DiscoveryMode {
    /// All modes, in start order.
    pub const ALL: [DiscoveryMode; 3] = [Self::Announce, Self::Addressing, Self::LinkQuality];

    /// Canonical configuration name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Announce => "announce",
            Self::Addressing => "addressing",
            Self::LinkQuality => "link_quality",
        }
    }
}

impl std::fmt::Display for DiscoveryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiscoveryMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "announce" => Ok(Self::Announce),
            "addressing" => Ok(Self::Addressing),
            "link_quality" | "linkquality" => Ok(Self::LinkQuality),
            other => Err(Error::Configuration(format!(
                "Unknown discovery mode '{}'",
                other
            ))),
        }
    }
}

impl TryFrom<String> for DiscoveryMode {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<DiscoveryMode> for String {
    fn from(mode: DiscoveryMode) -> Self {
        mode.as_str().to_string()
    }
}

/// Discovery configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Enabled strategies.
    #[serde(default = "default_modes")]
    pub modes: BTreeSet<DiscoveryMode>,

    /// Inspection worker threads.
    #[serde(default = "default_inspection_workers")]
    pub inspection_workers: usize,

    /// Pending inspections accepted before backpressure.
    #[serde(default = "default_inspection_queue_capacity")]
    pub inspection_queue_capacity: usize,

    /// Association browse period (seconds).
    #[serde(default = "default_association_period")]
    pub association_period_secs: u64,

    /// Link-quality browse period (seconds).
    #[serde(default = "default_link_quality_period")]
    pub link_quality_period_secs: u64,

    /// Network address where browsing starts (the coordinator).
    #[serde(default)]
    pub browse_root: u16,

    /// Endpoint builder poll interval (milliseconds).
    #[serde(default = "default_endpoint_poll_interval")]
    pub endpoint_poll_interval_ms: u64,
}

fn default_modes() -> BTreeSet<DiscoveryMode> {
    DiscoveryMode::ALL.into_iter().collect()
}

fn default_inspection_workers() -> usize {
    4
}

fn default_inspection_queue_capacity() -> usize {
    64
}

fn default_association_period() -> u64 {
    900
}

fn default_link_quality_period() -> u64 {
    300
}

fn default_endpoint_poll_interval() -> u64 {
    100
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            modes: default_modes(),
            inspection_workers: default_inspection_workers(),
            inspection_queue_capacity: default_inspection_queue_capacity(),
            association_period_secs: default_association_period(),
            link_quality_period_secs: default_link_quality_period(),
            browse_root: 0x0000,
            endpoint_poll_interval_ms: default_endpoint_poll_interval(),
        }
    }
}

impl DiscoveryConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Apply `MESHDISC_*` environment overrides.
    ///
    /// Unparsable values are logged and ignored.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("MESHDISC_MODES") {
            let parsed: Result<BTreeSet<DiscoveryMode>> = raw
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(str::parse)
                .collect();
            match parsed {
                Ok(modes) => self.modes = modes,
                Err(e) => log::warn!("[DiscoveryConfig] ignoring MESHDISC_MODES: {}", e),
            }
        }
        if let Some(n) = parse_override(&lookup, "MESHDISC_INSPECTION_WORKERS") {
            self.inspection_workers = n;
        }
        if let Some(secs) = parse_override(&lookup, "MESHDISC_ASSOCIATION_PERIOD_SECS") {
            self.association_period_secs = secs;
        }
        if let Some(secs) = parse_override(&lookup, "MESHDISC_LINK_QUALITY_PERIOD_SECS") {
            self.link_quality_period_secs = secs;
        }
        self
    }

    /// Replace the enabled modes.
    pub fn with_modes<I: IntoIterator<Item = DiscoveryMode>>(mut self, modes: I) -> Self {
        self.modes = modes.into_iter().collect();
        self
    }

    /// Set the inspection worker count.
    pub fn with_inspection_workers(mut self, workers: usize) -> Self {
        self.inspection_workers = workers;
        self
    }

    /// Set the inspection queue capacity.
    pub fn with_inspection_queue_capacity(mut self, capacity: usize) -> Self {
        self.inspection_queue_capacity = capacity;
        self
    }

    /// Set the association browse period.
    pub fn with_association_period(mut self, period: Duration) -> Self {
        self.association_period_secs = period.as_secs();
        self
    }

    /// Set the link-quality browse period.
    pub fn with_link_quality_period(mut self, period: Duration) -> Self {
        self.link_quality_period_secs = period.as_secs();
        self
    }

    /// Set the browse root.
    pub fn with_browse_root(mut self, root: NetworkAddress) -> Self {
        self.browse_root = root.0;
        self
    }

    /// Set the endpoint builder poll interval.
    pub fn with_endpoint_poll_interval(mut self, interval: Duration) -> Self {
        self.endpoint_poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Check whether `mode` is enabled.
    pub fn is_enabled(&self, mode: DiscoveryMode) -> bool {
        self.modes.contains(&mode)
    }

    /// Association browse period.
    pub fn association_period(&self) -> Duration {
        Duration::from_secs(self.association_period_secs)
    }

    /// Link-quality browse period.
    pub fn link_quality_period(&self) -> Duration {
        Duration::from_secs(self.link_quality_period_secs)
    }

    /// Endpoint builder poll interval.
    pub fn endpoint_poll_interval(&self) -> Duration {
        Duration::from_millis(self.endpoint_poll_interval_ms)
    }

    /// Browse root address.
    pub fn browse_root(&self) -> NetworkAddress {
        NetworkAddress(self.browse_root)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.inspection_workers == 0 {
            return Err(Error::Configuration(
                "inspection_workers must be at least 1".into(),
            ));
        }
        if self.inspection_queue_capacity == 0 {
            return Err(Error::Configuration(
                "inspection_queue_capacity must be at least 1".into(),
            ));
        }
        if self.is_enabled(DiscoveryMode::Addressing) && self.association_period_secs == 0 {
            return Err(Error::Configuration(
                "association_period_secs must be non-zero when addressing is enabled".into(),
            ));
        }
        if self.is_enabled(DiscoveryMode::LinkQuality) && self.link_quality_period_secs == 0 {
            return Err(Error::Configuration(
                "link_quality_period_secs must be non-zero when link_quality is enabled".into(),
            ));
        }
        if self.endpoint_poll_interval_ms == 0 {
            return Err(Error::Configuration(
                "endpoint_poll_interval_ms must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

fn parse_override<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("[DiscoveryConfig] ignoring {}={:?}: not a number", key, raw);
            None
        }
    }
}
