// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kubernetes implementation of [`ClusterApi`].
//!
//! Listing is paginated and every page request is retried with
//! [`retry_api_call`]. The pod watch starts from the resource version it is
//! given (a pod listing or the last event seen), so no change after that point
//! is lost. It ends when the API server closes it (after the watch timeout) or
//! on the first error; the control loop then re-bootstraps. Bookmarks are
//! requested (the `WatchParams` default) and passed through.

use crate::cluster::{
    ClusterApi, Node, PodEvent, PodEventKind, PodEventStream, PodListing, PodObservation,
};
use crate::constants::{KUBE_LIST_PAGE_SIZE, NODE_ADDRESS_TYPE_EXTERNAL};
use crate::errors::SyncError;
use crate::retry::retry_api_call;
use async_trait::async_trait;
use futures::{future, StreamExt};
use k8s_openapi::api::core::v1::{Node as K8sNode, Pod};
use kube::api::{ListParams, WatchEvent, WatchParams};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::debug;

/// Cluster access backed by a `kube` client.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    watch_timeout_secs: u32,
}

impl KubeCluster {
    /// Create a cluster adapter.
    ///
    /// `watch_timeout_secs` is the server-side timeout of each watch request; the
    /// Kubernetes API server caps it below 295 seconds.
    #[must_use]
    pub fn new(client: Client, watch_timeout_secs: u32) -> Self {
        Self {
            client,
            watch_timeout_secs,
        }
    }
}

/// Every item of a paginated list and the resource version it was served at.
#[derive(Debug, Clone)]
pub struct Listed<K> {
    /// Items from all pages
    pub items: Vec<K>,
    /// Collection resource version of the first page; later pages share its snapshot
    pub resource_version: Option<String>,
}

/// List all resources page by page, retrying each page on transient errors.
///
/// # Errors
///
/// Returns [`SyncError::ClusterRequestFailed`] if any page cannot be fetched.
pub async fn list_all_paginated<K>(api: &Api<K>, operation: &str) -> Result<Listed<K>, SyncError>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    let mut list_params = ListParams::default().limit(KUBE_LIST_PAGE_SIZE);
    let mut all_items = Vec::new();
    let mut resource_version = None;
    let mut page_count = 0;

    loop {
        page_count += 1;
        let result = retry_api_call(|| api.list(&list_params), operation)
            .await
            .map_err(|e| SyncError::cluster(operation, e))?;

        if page_count == 1 {
            resource_version = result.metadata.resource_version.clone();
        }
        let item_count = result.items.len();
        all_items.extend(result.items);

        debug!(
            operation = operation,
            page = page_count,
            items_in_page = item_count,
            total_items = all_items.len(),
            "Fetched page from Kubernetes API"
        );

        match result.metadata.continue_ {
            Some(token) if !token.is_empty() => list_params.continue_token = Some(token),
            _ => break,
        }
    }

    Ok(Listed {
        items: all_items,
        resource_version,
    })
}

/// Convert a Kubernetes node, keeping its first `ExternalIP` address.
#[must_use]
pub fn node_from_k8s(node: &K8sNode) -> Node {
    let public_address = node
        .status
        .as_ref()
        .and_then(|status| status.addresses.as_ref())
        .and_then(|addresses| {
            addresses
                .iter()
                .find(|a| a.type_ == NODE_ADDRESS_TYPE_EXTERNAL)
        })
        .map(|a| a.address.clone());

    Node {
        name: node.metadata.name.clone().unwrap_or_default(),
        public_address,
    }
}

/// Convert a Kubernetes pod. Unscheduled pods get an empty node name.
#[must_use]
pub fn pod_from_k8s(pod: &Pod) -> PodObservation {
    PodObservation {
        name: pod.metadata.name.clone().unwrap_or_default(),
        uid: pod.metadata.uid.clone().unwrap_or_default(),
        node_name: pod
            .spec
            .as_ref()
            .and_then(|spec| spec.node_name.clone())
            .unwrap_or_default(),
        annotations: pod.metadata.annotations.clone().unwrap_or_default(),
    }
}

/// Returns true for the 410 Gone the API server answers to a stale resource version.
fn is_gone(code: u16) -> bool {
    code == 410
}

/// Map a raw watch item to a pod event.
///
/// Bookmarks become [`PodEventKind::Bookmark`] events so the control loop can
/// advance its resume point in a quiet namespace.
fn pod_event(item: Result<WatchEvent<Pod>, kube::Error>) -> Option<Result<PodEvent, SyncError>> {
    let (kind, pod) = match item {
        Ok(WatchEvent::Added(pod)) => (PodEventKind::Added, pod),
        Ok(WatchEvent::Modified(pod)) => (PodEventKind::Modified, pod),
        Ok(WatchEvent::Deleted(pod)) => (PodEventKind::Deleted, pod),
        Ok(WatchEvent::Bookmark(bookmark)) => {
            return Some(Ok(PodEvent {
                kind: PodEventKind::Bookmark,
                pod: PodObservation::default(),
                resource_version: Some(bookmark.metadata.resource_version),
            }))
        }
        Ok(WatchEvent::Error(status)) if is_gone(status.code) => {
            return Some(Err(SyncError::WatchExpired {
                operation: "watch pods".to_string(),
            }))
        }
        Ok(WatchEvent::Error(status)) => {
            return Some(Err(SyncError::cluster(
                "watch pods",
                format!("{status:?}"),
            )))
        }
        Err(e) => return Some(Err(SyncError::cluster("watch pods", e))),
    };

    Some(Ok(PodEvent {
        kind,
        resource_version: pod.metadata.resource_version.clone(),
        pod: pod_from_k8s(&pod),
    }))
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn list_nodes(&self) -> Result<Vec<Node>, SyncError> {
        let api: Api<K8sNode> = Api::all(self.client.clone());
        let nodes = list_all_paginated(&api, "list nodes").await?;
        Ok(nodes.items.iter().map(node_from_k8s).collect())
    }

    async fn list_pods(&self, namespace: &str) -> Result<PodListing, SyncError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let operation = format!("list pods in namespace {namespace}");
        let listed = list_all_paginated(&api, &operation).await?;
        Ok(PodListing {
            pods: listed.items.iter().map(pod_from_k8s).collect(),
            resource_version: listed.resource_version,
        })
    }

    async fn watch_pods(
        &self,
        namespace: &str,
        resource_version: Option<&str>,
    ) -> Result<PodEventStream, SyncError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let operation = format!("watch pods in namespace {namespace}");

        let resource_version = match resource_version {
            Some(rv) => rv.to_string(),
            None => {
                let list_params = ListParams::default().limit(1);
                let snapshot = retry_api_call(|| api.list_metadata(&list_params), &operation)
                    .await
                    .map_err(|e| SyncError::cluster(&operation, e))?;
                snapshot
                    .metadata
                    .resource_version
                    .unwrap_or_else(|| "0".to_string())
            }
        };

        debug!(
            namespace = namespace,
            resource_version = %resource_version,
            timeout_secs = self.watch_timeout_secs,
            "Opening pod watch"
        );

        let params = WatchParams::default().timeout(self.watch_timeout_secs);
        let stream = api
            .watch(&params, &resource_version)
            .await
            .map_err(|e| match e {
                kube::Error::Api(status) if is_gone(status.code) => SyncError::WatchExpired {
                    operation: operation.clone(),
                },
                e => SyncError::cluster(&operation, e),
            })?;

        Ok(stream
            .filter_map(|item| future::ready(pod_event(item)))
            .boxed())
    }
}

#[cfg(test)]
#[path = "kube_cluster_tests.rs"]
mod kube_cluster_tests;
