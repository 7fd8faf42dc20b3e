// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for the node DNS reconciliation engine.
//!
//! Every error carries enough context (host, zone, address, record id) to
//! diagnose a reconciliation decision from the log line alone. Most variants
//! are scoped to a single host, address or record and are logged and skipped
//! by the caller; only cluster listing failures during bootstrap are fatal.

use thiserror::Error;

/// Errors raised while building desired state or converging provider records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// No known zone is a suffix of the hostname.
    ///
    /// Non-fatal: the host is skipped and reconciliation continues for others.
    #[error("No DNS zone found for host '{host}'")]
    ZoneNotFound {
        /// The hostname that could not be placed in a zone
        host: String,
    },

    /// The address literal is neither IPv4 nor IPv6.
    ///
    /// Non-fatal: only this address is skipped.
    #[error("Invalid address '{address}': not an IPv4 or IPv6 literal")]
    InvalidAddress {
        /// The offending address literal
        address: String,
    },

    /// A DNS provider call (zone listing, record listing, create or delete) failed.
    #[error("DNS provider request '{operation}' failed: {reason}")]
    ProviderRequestFailed {
        /// Human-readable operation, e.g. `delete record abc in zone 123`
        operation: String,
        /// Underlying failure
        reason: String,
    },

    /// A cluster call (node/pod listing or the pod watch) failed.
    #[error("Cluster request '{operation}' failed: {reason}")]
    ClusterRequestFailed {
        /// Human-readable operation, e.g. `list pods in namespace metrics`
        operation: String,
        /// Underlying failure
        reason: String,
    },

    /// The resource version a watch resumed from is older than the server keeps.
    ///
    /// The watch must restart from a fresh listing.
    #[error("Watch '{operation}' expired: resource version is too old")]
    WatchExpired {
        /// Human-readable operation, e.g. `watch pods in namespace metrics`
        operation: String,
    },

    /// The node a pod runs on has no external address (or the pod is unscheduled).
    ///
    /// Non-fatal: the pod contributes nothing until its node gains an address.
    #[error("Pod '{pod}' on node '{node}' has no external node address")]
    MissingNodeAddress {
        /// The pod requesting a hostname
        pod: String,
        /// The node the pod is scheduled on (empty when unscheduled)
        node: String,
    },
}

impl SyncError {
    /// Build a [`SyncError::ProviderRequestFailed`] from any displayable error.
    pub fn provider(operation: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::ProviderRequestFailed {
            operation: operation.into(),
            reason: err.to_string(),
        }
    }

    /// Build a [`SyncError::ClusterRequestFailed`] from any displayable error.
    pub fn cluster(operation: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::ClusterRequestFailed {
            operation: operation.into(),
            reason: err.to_string(),
        }
    }

    /// Short, stable reason code used in structured logs and metric labels.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::ZoneNotFound { .. } => "ZoneNotFound",
            Self::InvalidAddress { .. } => "InvalidAddress",
            Self::ProviderRequestFailed { .. } => "ProviderRequestFailed",
            Self::ClusterRequestFailed { .. } => "ClusterRequestFailed",
            Self::WatchExpired { .. } => "WatchExpired",
            Self::MissingNodeAddress { .. } => "MissingNodeAddress",
        }
    }

    /// Returns true if the error only affects a single host, address or record.
    ///
    /// Scoped errors are logged and skipped; the rest of the pass continues.
    #[must_use]
    pub fn is_scoped(&self) -> bool {
        matches!(
            self,
            Self::ZoneNotFound { .. } | Self::InvalidAddress { .. } | Self::MissingNodeAddress { .. }
        )
    }
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
