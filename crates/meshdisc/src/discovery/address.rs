// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Mesh addressing types and discovery records.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// 16-bit network (short) address, assigned on join and reusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NetworkAddress(pub u16);

impl NetworkAddress {
    /// The coordinator's address.
    pub const COORDINATOR: NetworkAddress = NetworkAddress(0x0000);
}

impl fmt::Display for NetworkAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

impl From<u16> for NetworkAddress {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

/// 64-bit IEEE long address, persistent for the lifetime of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct LongAddress(pub u64);

impl fmt::Display for LongAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.0.to_be_bytes();
        for (i, byte) in bytes.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

impl FromStr for LongAddress {
    type Err = Error;

    /// Parse `AA:BB:CC:DD:EE:FF:00:11` (most significant octet first).
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::Configuration(format!("Invalid long address '{}'", s));

        let mut value: u64 = 0;
        let mut octets = 0;
        for part in s.split(':') {
            if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            let octet = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
            value = (value << 8) | u64::from(octet);
            octets += 1;
        }
        if octets != 8 {
            return Err(invalid());
        }
        Ok(Self(value))
    }
}

impl From<u64> for LongAddress {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Personal area network identifier.
pub type PanId = u16;

/// Status byte of a device-object (ZDO) response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ZdoStatus(pub u8);

impl ZdoStatus {
    /// Request completed.
    pub const SUCCESS: ZdoStatus = ZdoStatus(0x00);
    /// Unsupported request type.
    pub const INV_REQUESTTYPE: ZdoStatus = ZdoStatus(0x80);
    /// Addressed device is unknown.
    pub const DEVICE_NOT_FOUND: ZdoStatus = ZdoStatus(0x81);
    /// Request not supported by the device.
    pub const NOT_SUPPORTED: ZdoStatus = ZdoStatus(0x84);
    /// Request timed out at the remote device.
    pub const TIMEOUT: ZdoStatus = ZdoStatus(0x85);

    /// Check for the success status.
    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    /// Symbolic name, when the code is known.
    pub fn name(self) -> Option<&'static str> {
        let name = match self.0 {
            0x00 => "SUCCESS",
            0x80 => "INV_REQUESTTYPE",
            0x81 => "DEVICE_NOT_FOUND",
            0x82 => "INVALID_EP",
            0x83 => "NOT_ACTIVE",
            0x84 => "NOT_SUPPORTED",
            0x85 => "TIMEOUT",
            0x86 => "NO_MATCH",
            0x88 => "NO_ENTRY",
            0x89 => "NO_DESCRIPTOR",
            0x8A => "INSUFFICIENT_SPACE",
            0x8B => "NOT_PERMITTED",
            0x8C => "TABLE_FULL",
            0x8D => "NOT_AUTHORIZED",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for ZdoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "0x{:02X}", self.0),
        }
    }
}

/// A device whose long address has been resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiscoveredNode {
    /// Short address at discovery time.
    pub network_address: NetworkAddress,
    /// Persistent IEEE address.
    pub long_address: LongAddress,
    /// Network the device belongs to.
    pub pan_id: PanId,
}

/// Hand-off record between discovery and endpoint building.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImportEntry {
    /// Short address of the node.
    pub network_address: NetworkAddress,
    /// Persistent IEEE address of the node.
    pub long_address: LongAddress,
}

impl ImportEntry {
    /// Pair a short and long address.
    pub fn new(network_address: NetworkAddress, long_address: LongAddress) -> Self {
        Self {
            network_address,
            long_address,
        }
    }
}

impl From<&DiscoveredNode> for ImportEntry {
    fn from(node: &DiscoveredNode) -> Self {
        Self::new(node.network_address, node.long_address)
    }
}
