// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory fakes of the cluster and DNS provider boundaries for unit tests.
//!
//! Both fakes record every call so tests can assert on exactly which provider
//! operations a pass issued.

use crate::cluster::{
    ClusterApi, Node, PodEvent, PodEventKind, PodEventStream, PodListing, PodObservation,
};
use crate::errors::SyncError;
use crate::provider::{DnsProvider, Zone};
use crate::record::{NewRecord, ProviderRecord, RecordType};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Mutex;

/// A call observed by [`FakeProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    ListZones,
    ListRecords { zone_id: String, name: String },
    Create { zone_id: String, record: NewRecord },
    Delete { zone_id: String, record_id: String },
}

impl ProviderCall {
    pub fn is_mutation(&self) -> bool {
        matches!(self, Self::Create { .. } | Self::Delete { .. })
    }
}

#[derive(Default)]
struct ProviderState {
    zones: Vec<Zone>,
    records: Vec<ProviderRecord>,
    next_id: usize,
    calls: Vec<ProviderCall>,
    fail_list_zones: bool,
    fail_list_records_for: HashSet<String>,
    fail_delete_ids: HashSet<String>,
}

/// In-memory DNS provider.
#[derive(Default)]
pub struct FakeProvider {
    state: Mutex<ProviderState>,
}

impl FakeProvider {
    pub fn with_zones(zones: &[(&str, &str)]) -> Self {
        let provider = Self::default();
        provider.state.lock().unwrap().zones = zones
            .iter()
            .map(|(id, name)| Zone {
                id: (*id).to_string(),
                name: (*name).to_string(),
            })
            .collect();
        provider
    }

    /// Seed an existing record and return its id.
    pub fn add_record(&self, zone_id: &str, name: &str, content: &str) -> String {
        let record_type = crate::record::classify_address(content).unwrap_or(RecordType::A);
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("seed-{}", state.next_id);
        state.records.push(ProviderRecord {
            id: id.clone(),
            zone_id: zone_id.to_string(),
            record_type,
            name: name.to_string(),
            content: content.to_string(),
            proxied: false,
        });
        id
    }

    pub fn fail_list_zones(&self) {
        self.state.lock().unwrap().fail_list_zones = true;
    }

    pub fn fail_list_records_for(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_list_records_for
            .insert(name.to_string());
    }

    pub fn fail_delete(&self, record_id: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_delete_ids
            .insert(record_id.to_string());
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn mutating_calls(&self) -> Vec<ProviderCall> {
        self.calls()
            .into_iter()
            .filter(ProviderCall::is_mutation)
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    /// Sorted contents of all records named `name`.
    pub fn contents_for(&self, name: &str) -> Vec<String> {
        let mut contents: Vec<String> = self
            .state
            .lock()
            .unwrap()
            .records
            .iter()
            .filter(|r| r.name == name)
            .map(|r| r.content.clone())
            .collect();
        contents.sort();
        contents
    }

    pub fn records(&self) -> Vec<ProviderRecord> {
        self.state.lock().unwrap().records.clone()
    }
}

#[async_trait]
impl DnsProvider for FakeProvider {
    async fn list_zones(&self) -> Result<Vec<Zone>, SyncError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ProviderCall::ListZones);
        if state.fail_list_zones {
            return Err(SyncError::provider("list zones", "HTTP 500: fake outage"));
        }
        Ok(state.zones.clone())
    }

    async fn list_records(
        &self,
        zone_id: &str,
        name: &str,
    ) -> Result<Vec<ProviderRecord>, SyncError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ProviderCall::ListRecords {
            zone_id: zone_id.to_string(),
            name: name.to_string(),
        });
        if state.fail_list_records_for.contains(name) {
            return Err(SyncError::provider(
                format!("list records {name}"),
                "HTTP 500: fake outage",
            ));
        }
        Ok(state
            .records
            .iter()
            .filter(|r| r.zone_id == zone_id && r.name == name)
            .cloned()
            .collect())
    }

    async fn create_record(
        &self,
        zone_id: &str,
        record: &NewRecord,
    ) -> Result<ProviderRecord, SyncError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ProviderCall::Create {
            zone_id: zone_id.to_string(),
            record: record.clone(),
        });
        state.next_id += 1;
        let created = ProviderRecord {
            id: format!("rec-{}", state.next_id),
            zone_id: zone_id.to_string(),
            record_type: record.record_type,
            name: record.name.clone(),
            content: record.content.clone(),
            proxied: record.proxied,
        };
        state.records.push(created.clone());
        Ok(created)
    }

    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<(), SyncError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(ProviderCall::Delete {
            zone_id: zone_id.to_string(),
            record_id: record_id.to_string(),
        });
        if state.fail_delete_ids.contains(record_id) {
            return Err(SyncError::provider(
                format!("delete record {record_id}"),
                "HTTP 500: fake outage",
            ));
        }
        state.records.retain(|r| r.id != record_id);
        Ok(())
    }
}

#[derive(Default)]
struct ClusterState {
    nodes: Vec<Node>,
    pods: Vec<PodObservation>,
    sessions: VecDeque<Vec<Result<PodEvent, SyncError>>>,
    list_nodes_calls: usize,
    list_pods_calls: usize,
    watch_calls: usize,
    watch_resource_versions: Vec<Option<String>>,
    fail_list_nodes_from_call: Option<usize>,
    remove_pod_on_watch: Option<(usize, String)>,
}

/// In-memory cluster with scripted watch sessions.
#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<ClusterState>,
}

impl FakeCluster {
    pub fn new(nodes: Vec<Node>, pods: Vec<PodObservation>) -> Self {
        let cluster = Self::default();
        {
            let mut state = cluster.state.lock().unwrap();
            state.nodes = nodes;
            state.pods = pods;
        }
        cluster
    }

    /// Queue the events delivered by the next `watch_pods` call.
    pub fn push_session(&self, events: Vec<Result<PodEvent, SyncError>>) {
        self.state.lock().unwrap().sessions.push_back(events);
    }

    /// Replace the node list, e.g. to simulate a node being scaled down.
    pub fn set_nodes(&self, nodes: Vec<Node>) {
        self.state.lock().unwrap().nodes = nodes;
    }

    /// Make `list_nodes` fail from its `call`-th invocation (1-based) onwards.
    pub fn fail_list_nodes_from_call(&self, call: usize) {
        self.state.lock().unwrap().fail_list_nodes_from_call = Some(call);
    }

    /// Remove pod `name` from the cluster when watch `call` (1-based) opens.
    pub fn remove_pod_on_watch(&self, call: usize, name: &str) {
        self.state.lock().unwrap().remove_pod_on_watch = Some((call, name.to_string()));
    }

    pub fn list_nodes_calls(&self) -> usize {
        self.state.lock().unwrap().list_nodes_calls
    }

    pub fn list_pods_calls(&self) -> usize {
        self.state.lock().unwrap().list_pods_calls
    }

    pub fn watch_calls(&self) -> usize {
        self.state.lock().unwrap().watch_calls
    }

    /// Resource version passed to each `watch_pods` call, in order.
    pub fn watch_resource_versions(&self) -> Vec<Option<String>> {
        self.state.lock().unwrap().watch_resource_versions.clone()
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn list_nodes(&self) -> Result<Vec<Node>, SyncError> {
        let mut state = self.state.lock().unwrap();
        state.list_nodes_calls += 1;
        if state
            .fail_list_nodes_from_call
            .is_some_and(|from| state.list_nodes_calls >= from)
        {
            return Err(SyncError::cluster("list nodes", "fake API server down"));
        }
        Ok(state.nodes.clone())
    }

    /// Each listing reports resource version `rv-<n>`, `n` counting listings.
    async fn list_pods(&self, _namespace: &str) -> Result<PodListing, SyncError> {
        let mut state = self.state.lock().unwrap();
        state.list_pods_calls += 1;
        Ok(PodListing {
            pods: state.pods.clone(),
            resource_version: Some(format!("rv-{}", state.list_pods_calls)),
        })
    }

    async fn watch_pods(
        &self,
        namespace: &str,
        resource_version: Option<&str>,
    ) -> Result<PodEventStream, SyncError> {
        let mut state = self.state.lock().unwrap();
        state.watch_calls += 1;
        state
            .watch_resource_versions
            .push(resource_version.map(str::to_string));
        if let Some((call, name)) = state.remove_pod_on_watch.clone() {
            if call == state.watch_calls {
                state.pods.retain(|p| p.name != name);
            }
        }
        match state.sessions.pop_front() {
            Some(events) => Ok(futures::stream::iter(events).boxed()),
            None => Err(SyncError::cluster(
                format!("watch pods in namespace {namespace}"),
                "no scripted watch session",
            )),
        }
    }
}

pub fn node(name: &str, address: Option<&str>) -> Node {
    Node {
        name: name.to_string(),
        public_address: address.map(str::to_string),
    }
}

/// A pod on `node_name` requesting `host` via the default hostname annotation.
pub fn pod(name: &str, node_name: &str, host: &str) -> PodObservation {
    let mut annotations = BTreeMap::new();
    annotations.insert(crate::labels::ANNOTATION_NODE_DNS.to_string(), host.to_string());
    PodObservation {
        name: name.to_string(),
        node_name: node_name.to_string(),
        annotations,
        ..Default::default()
    }
}

/// `pod` with a fixed incarnation id.
pub fn pod_with_uid(name: &str, uid: &str, node_name: &str, host: &str) -> PodObservation {
    PodObservation {
        uid: uid.to_string(),
        ..pod(name, node_name, host)
    }
}

pub fn proxied_pod(name: &str, node_name: &str, host: &str) -> PodObservation {
    let mut pod = pod(name, node_name, host);
    pod.annotations.insert(
        crate::labels::ANNOTATION_NODE_DNS_PROXIED.to_string(),
        "true".to_string(),
    );
    pod
}

pub fn event(kind: PodEventKind, pod: PodObservation) -> Result<PodEvent, SyncError> {
    Ok(PodEvent {
        kind,
        pod,
        resource_version: None,
    })
}

/// An event observed at `resource_version`.
pub fn event_at(
    kind: PodEventKind,
    pod: PodObservation,
    resource_version: &str,
) -> Result<PodEvent, SyncError> {
    Ok(PodEvent {
        kind,
        pod,
        resource_version: Some(resource_version.to_string()),
    })
}

pub fn bookmark(resource_version: &str) -> Result<PodEvent, SyncError> {
    event_at(
        PodEventKind::Bookmark,
        PodObservation::default(),
        resource_version,
    )
}
