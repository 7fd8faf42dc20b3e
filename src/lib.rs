// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # nodedns - node DNS controller for Kubernetes
//!
//! nodedns keeps DNS provider records pointing at the nodes that annotated pods
//! run on. A pod carrying `tombowdit.ch/node-dns: api.example.com` asks for
//! `api.example.com` to resolve to the external address of its node; pods
//! sharing a hostname all contribute their node's address.
//!
//! ## Modules
//!
//! - [`zone`] - hostname to zone resolution (longest suffix wins)
//! - [`record`] - record types and address classification
//! - [`desired`] - desired state built from nodes and pods
//! - [`sync`] - diff and apply against the DNS provider
//! - [`controller`] - bootstrap, watch and recovery loop
//! - [`cloudflare`] - Cloudflare v4 API provider
//! - [`kube_cluster`] - Kubernetes cluster access
//!
//! ## Example
//!
//! ```rust
//! use nodedns::cluster::{Node, PodObservation};
//! use nodedns::config::AnnotationKeys;
//! use nodedns::desired::build_desired_state;
//! use std::collections::BTreeMap;
//!
//! let nodes = vec![Node {
//!     name: "worker-1".to_string(),
//!     public_address: Some("203.0.113.7".to_string()),
//! }];
//! let pods = vec![PodObservation {
//!     name: "web-0".to_string(),
//!     node_name: "worker-1".to_string(),
//!     annotations: BTreeMap::from([(
//!         "tombowdit.ch/node-dns".to_string(),
//!         "api.example.com".to_string(),
//!     )]),
//!     ..Default::default()
//! }];
//!
//! let desired = build_desired_state(&nodes, &pods, &AnnotationKeys::default());
//! assert!(desired.get("api.example.com").unwrap().addresses.contains("203.0.113.7"));
//! ```

pub mod cloudflare;
pub mod cluster;
pub mod config;
pub mod constants;
pub mod controller;
pub mod desired;
pub mod errors;
pub mod kube_cluster;
pub mod labels;
pub mod metrics;
pub mod provider;
pub mod record;
pub mod retry;
pub mod sync;
pub mod zone;

#[cfg(test)]
mod test_support;
