// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Desired DNS state derived from cluster observations.
//!
//! Every pod carrying the hostname annotation asks for its hostname to resolve
//! to the public address of the node it runs on. Pods sharing a hostname are
//! merged into one [`DesiredHost`]:
//!
//! - addresses are deduplicated
//! - the proxy flag is OR-ed: one pod asking for proxying proxies the host
//!
//! The state is rebuilt from scratch on every full pass and never patched
//! incrementally.

use crate::cluster::{Node, PodObservation};
use crate::config::AnnotationKeys;
use crate::errors::SyncError;
use crate::record::canonical_address;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, warn};

/// Target state for one hostname.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DesiredHost {
    /// Fully qualified hostname (lowercase)
    pub host: String,
    /// Node public addresses the host must resolve to
    pub addresses: BTreeSet<String>,
    /// Whether the provider should proxy this host
    pub proxied: bool,
    /// Pods that asked for this host
    pub source_pods: BTreeSet<String>,
}

/// Desired state for every annotated hostname, plus the diagnostics raised while building it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DesiredState {
    /// Desired hosts keyed by hostname
    pub hosts: BTreeMap<String, DesiredHost>,
    /// Non-fatal problems, e.g. pods on nodes without an external address
    #[serde(skip)]
    pub diagnostics: Vec<SyncError>,
}

impl DesiredState {
    /// Look up the desired entry for `host`.
    #[must_use]
    pub fn get(&self, host: &str) -> Option<&DesiredHost> {
        self.hosts.get(host)
    }

    /// Number of desired hosts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// True when no pod requests a hostname.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Iterate over desired hosts in hostname order.
    pub fn iter(&self) -> impl Iterator<Item = &DesiredHost> {
        self.hosts.values()
    }
}

/// Hostname requested by `pod`, if it carries a non-empty hostname annotation.
#[must_use]
pub fn pod_hostname(pod: &PodObservation, keys: &AnnotationKeys) -> Option<String> {
    pod.annotations
        .get(&keys.hostname)
        .map(|value| value.trim().trim_end_matches('.').to_ascii_lowercase())
        .filter(|host| !host.is_empty())
}

/// Parse a proxy annotation value.
///
/// Accepts `true`/`false`, `yes`/`no` and `1`/`0` in any case. Returns `None`
/// for anything else.
#[must_use]
pub fn parse_proxy_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// Whether `pod` asks for its hostname to be proxied. Unparseable values count as `false`.
#[must_use]
pub fn pod_proxied(pod: &PodObservation, keys: &AnnotationKeys) -> bool {
    let Some(raw) = pod.annotations.get(&keys.proxy) else {
        return false;
    };
    parse_proxy_flag(raw).unwrap_or_else(|| {
        warn!(
            pod = %pod.name,
            annotation = %keys.proxy,
            value = %raw,
            "Unrecognized proxy annotation value, treating as false"
        );
        false
    })
}

/// Map node name to public address; nodes without an external address are left out.
#[must_use]
pub fn node_addresses(nodes: &[Node]) -> HashMap<&str, &str> {
    nodes
        .iter()
        .filter_map(|node| {
            node.public_address
                .as_deref()
                .filter(|addr| !addr.trim().is_empty())
                .map(|addr| (node.name.as_str(), addr))
        })
        .collect()
}

/// Build the desired DNS state from a node list and a pod list.
///
/// Pure function of its inputs: the same nodes and pods always produce the same
/// state. Pods whose node has no public address are skipped and reported as
/// [`SyncError::MissingNodeAddress`] in [`DesiredState::diagnostics`].
#[must_use]
pub fn build_desired_state(
    nodes: &[Node],
    pods: &[PodObservation],
    keys: &AnnotationKeys,
) -> DesiredState {
    let addresses = node_addresses(nodes);
    let mut state = DesiredState::default();

    for pod in pods {
        let Some(host) = pod_hostname(pod, keys) else {
            continue;
        };

        let Some(address) = addresses.get(pod.node_name.as_str()) else {
            warn!(
                pod = %pod.name,
                node = %pod.node_name,
                host = %host,
                reason = "MissingNodeAddress",
                "Skipping pod: node has no external address"
            );
            state.diagnostics.push(SyncError::MissingNodeAddress {
                pod: pod.name.clone(),
                node: pod.node_name.clone(),
            });
            continue;
        };

        debug!(
            pod = %pod.name,
            node = %pod.node_name,
            host = %host,
            address = %address,
            "Pod requests node DNS"
        );

        let proxied = pod_proxied(pod, keys);
        let entry = state
            .hosts
            .entry(host.clone())
            .or_insert_with(|| DesiredHost {
                host,
                addresses: BTreeSet::new(),
                proxied: false,
                source_pods: BTreeSet::new(),
            });
        entry.addresses.insert(canonical_address(address));
        entry.proxied |= proxied;
        entry.source_pods.insert(pod.name.clone());
    }

    state
}

#[cfg(test)]
#[path = "desired_tests.rs"]
mod desired_tests;
