// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Cluster boundary: node and pod observations plus the pod event stream.
//!
//! The control loop only needs three operations from the cluster, captured by
//! [`ClusterApi`]. [`crate::kube_cluster::KubeCluster`] implements them against
//! the Kubernetes API.

use crate::errors::SyncError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::BTreeMap;

/// A cluster node and its public address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Node name
    pub name: String,
    /// First external address reported by the node, if any
    pub public_address: Option<String>,
}

/// The parts of a pod the controller cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodObservation {
    /// Pod name
    pub name: String,
    /// Unique id of this incarnation of the pod; empty when unknown.
    /// A pod recreated under the same name gets a new one.
    pub uid: String,
    /// Node the pod is scheduled on; empty while unscheduled
    pub node_name: String,
    /// Pod annotations
    pub annotations: BTreeMap<String, String>,
}

/// Kind of change reported by the pod watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodEventKind {
    /// Pod created
    Added,
    /// Pod changed (including being scheduled onto a node)
    Modified,
    /// Pod removed
    Deleted,
    /// Progress marker from the server; carries a resource version and no pod
    Bookmark,
}

impl PodEventKind {
    /// Lowercase name used in logs and metric labels.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
            Self::Bookmark => "bookmark",
        }
    }
}

/// A single pod change from the watch stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodEvent {
    /// What happened
    pub kind: PodEventKind,
    /// The pod as last observed; empty for bookmarks
    pub pod: PodObservation,
    /// Resource version the event was observed at; a watch resumed from it
    /// picks up right after this event
    pub resource_version: Option<String>,
}

/// Pods in a namespace plus the resource version the listing was taken at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodListing {
    /// Pods in the namespace
    pub pods: Vec<PodObservation>,
    /// Collection resource version of the listing, if the cluster reports one
    pub resource_version: Option<String>,
}

/// Stream of pod events. An `Err` item means the stream has failed and must be reopened.
pub type PodEventStream = BoxStream<'static, Result<PodEvent, SyncError>>;

/// Operations the control loop needs from the cluster.
///
/// Every method returns [`SyncError::ClusterRequestFailed`] on failure.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// List all nodes with their public addresses.
    async fn list_nodes(&self) -> Result<Vec<Node>, SyncError>;

    /// List all pods in `namespace`.
    async fn list_pods(&self, namespace: &str) -> Result<PodListing, SyncError>;

    /// Open a live stream of pod changes in `namespace`.
    ///
    /// With `resource_version`, the stream starts right after that listing or
    /// event, so no change made since then is missed. Without it, the stream
    /// starts from the current state. A version the server no longer keeps
    /// fails with [`SyncError::WatchExpired`], either here or as a stream item.
    async fn watch_pods(
        &self,
        namespace: &str,
        resource_version: Option<&str>,
    ) -> Result<PodEventStream, SyncError>;
}
