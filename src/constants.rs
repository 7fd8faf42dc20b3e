// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the nodedns controller.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// Kubernetes Constants
// ============================================================================

/// Namespace watched when none is configured
pub const DEFAULT_NAMESPACE: &str = "metrics";

/// Node address type that carries the public address
pub const NODE_ADDRESS_TYPE_EXTERNAL: &str = "ExternalIP";

/// Page size for paginated node/pod list calls
pub const KUBE_LIST_PAGE_SIZE: u32 = 500;

/// Server-side timeout for a single pod watch session (seconds)
///
/// The API server closes the stream after this long; the control loop then
/// rebuilds its baseline and reopens the watch.
pub const DEFAULT_WATCH_TIMEOUT_SECS: u32 = 290;

/// Maximum number of buffered watch events handled as one batch
pub const MAX_EVENT_BATCH: usize = 64;

// ============================================================================
// DNS Provider Constants
// ============================================================================

/// Cloudflare v4 REST API base URL
pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// TTL value Cloudflare interprets as "automatic"
pub const TTL_AUTOMATIC: u32 = 1;

/// Page size for Cloudflare zone listings (API maximum is 50)
pub const CLOUDFLARE_ZONES_PAGE_SIZE: u32 = 50;

/// Page size for Cloudflare DNS record listings
pub const CLOUDFLARE_RECORDS_PAGE_SIZE: u32 = 100;

/// Timeout for a single Cloudflare HTTP request (seconds)
pub const CLOUDFLARE_REQUEST_TIMEOUT_SECS: u64 = 30;

/// User agent sent to the DNS provider
pub const USER_AGENT: &str = concat!("nodedns/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 2;

// ============================================================================
// Metrics Server Constants
// ============================================================================

/// Port for Prometheus metrics HTTP server
pub const METRICS_SERVER_PORT: u16 = 8080;

/// Path for Prometheus metrics endpoint
pub const METRICS_SERVER_PATH: &str = "/metrics";

/// Bind address for metrics HTTP server
pub const METRICS_SERVER_BIND_ADDRESS: &str = "0.0.0.0";
