// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! DNS record types and address classification.
//!
//! Only address records are managed: `A` for IPv4 and `AAAA` for IPv6. The
//! record type of a desired address is never configured; it is inferred from
//! the address literal by [`classify_address`].

use crate::errors::SyncError;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Address record type managed by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    /// IPv4 address record
    A,
    /// IPv6 address record
    #[allow(clippy::upper_case_acronyms)]
    AAAA,
}

impl RecordType {
    /// Wire name of the record type (`"A"` or `"AAAA"`).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::AAAA => "AAAA",
        }
    }

    /// Parse a provider record type, returning `None` for anything that is not `A`/`AAAA`.
    #[must_use]
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "A" => Some(Self::A),
            "AAAA" => Some(Self::AAAA),
            _ => None,
        }
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify an address literal as `A` (IPv4) or `AAAA` (IPv6).
///
/// # Errors
///
/// Returns [`SyncError::InvalidAddress`] if the literal parses as neither.
pub fn classify_address(address: &str) -> Result<RecordType, SyncError> {
    match address.trim().parse::<IpAddr>() {
        Ok(IpAddr::V4(_)) => Ok(RecordType::A),
        Ok(IpAddr::V6(_)) => Ok(RecordType::AAAA),
        Err(_) => Err(SyncError::InvalidAddress {
            address: address.to_string(),
        }),
    }
}

/// Canonical textual form of an address used for content comparisons.
///
/// IPv6 literals have several spellings (`2001:db8:0::1` vs `2001:db8::1`), so
/// parseable addresses are re-rendered; anything else is returned trimmed.
#[must_use]
pub fn canonical_address(address: &str) -> String {
    let trimmed = address.trim();
    trimmed
        .parse::<IpAddr>()
        .map_or_else(|_| trimmed.to_string(), |ip| ip.to_string())
}

/// An address record as stored by the DNS provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRecord {
    /// Provider-assigned record id
    pub id: String,
    /// Id of the zone holding the record
    pub zone_id: String,
    /// `A` or `AAAA`
    pub record_type: RecordType,
    /// Fully qualified record name
    pub name: String,
    /// Address the record points at
    pub content: String,
    /// Whether the provider proxies traffic for this record
    pub proxied: bool,
}

/// A record the engine asks the provider to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewRecord {
    /// `A` or `AAAA`
    #[serde(rename = "type")]
    pub record_type: RecordType,
    /// Fully qualified record name
    pub name: String,
    /// Address the record points at
    pub content: String,
    /// Whether the provider should proxy traffic for this record
    pub proxied: bool,
    /// Record TTL; [`crate::constants::TTL_AUTOMATIC`] lets the provider choose
    pub ttl: u32,
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod record_tests;
