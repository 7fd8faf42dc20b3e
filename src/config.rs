// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Runtime configuration consumed by the reconciliation core.
//!
//! The binary builds a [`ControllerConfig`] from flags and environment
//! variables; the core only ever sees this plain value.

use crate::constants::DEFAULT_NAMESPACE;
use crate::labels::{ANNOTATION_NODE_DNS, ANNOTATION_NODE_DNS_PROXIED};

/// Annotation keys marking a pod's desired hostname and proxy flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationKeys {
    /// Key whose value is the requested hostname
    pub hostname: String,
    /// Key whose value is the boolean proxy flag
    pub proxy: String,
}

impl Default for AnnotationKeys {
    fn default() -> Self {
        Self {
            hostname: ANNOTATION_NODE_DNS.to_string(),
            proxy: ANNOTATION_NODE_DNS_PROXIED.to_string(),
        }
    }
}

/// Configuration for the control loop and sync engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Namespace whose pods are observed
    pub namespace: String,
    /// When true, create/delete actions are logged but never executed
    pub dry_run: bool,
    /// Annotation keys read from pods
    pub annotations: AnnotationKeys,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            dry_run: false,
            annotations: AnnotationKeys::default(),
        }
    }
}
