// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Pod annotation keys understood by the controller.
//!
//! Both keys can be overridden at startup; these are the defaults.

/// Annotation carrying the hostname a pod wants pointed at its node's public address
pub const ANNOTATION_NODE_DNS: &str = "tombowdit.ch/node-dns";

/// Annotation asking the provider to proxy the hostname (`"true"` / `"false"`)
pub const ANNOTATION_NODE_DNS_PROXIED: &str = "tombowdit.ch/node-dns-proxied";
