// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Event-driven control loop.
//!
//! The loop moves through three states:
//!
//! - **Bootstrapping**: list nodes and pods, build the desired state and run a
//!   full sync. A cluster listing failure here is fatal and ends [`Controller::run`].
//! - **Watching**: consume the pod event stream. Added/Modified events trigger a
//!   full rescan; Deleted events trigger a targeted deletion of the one record
//!   the pod contributed. Per-event failures are logged and the stream continues.
//! - **Recovering**: the stream ended or failed. Wait out the watch backoff and
//!   go back to Bootstrapping. The backoff only grows while the watch keeps
//!   failing; a stream the server closed on its timeout reopens promptly.
//!
//! Events already buffered when a batch is read are coalesced: deletions are
//! handled one by one, then a single rescan covers every Added/Modified event
//! in the batch.
//!
//! The first watch opens at the resource version of the bootstrap pod listing.
//! Later watches resume from the last version the previous session saw (an
//! event or a bookmark), so deletions made while the loop was recovering are
//! replayed; only a 410 Gone falls back to the latest listing. A deleted pod's
//! node address falls back to the addresses seen in earlier passes. All of
//! this matters because a host with no pods left is never visited by a full
//! pass again, so a missed deletion would leave its record behind.
//!
//! A deletion keeps the record when another known pod for the same host still
//! resolves to the same address, e.g. two replicas on one node.

use crate::cluster::{ClusterApi, Node, PodEvent, PodEventKind, PodObservation};
use crate::config::ControllerConfig;
use crate::constants::MAX_EVENT_BATCH;
use crate::desired::{build_desired_state, node_addresses, pod_hostname};
use crate::errors::SyncError;
use crate::metrics;
use crate::provider::DnsProvider;
use crate::retry::{watch_backoff, ExponentialBackoff};
use crate::sync::{SyncEngine, SyncReport};
use futures::StreamExt;
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Control loop state.
#[derive(Debug)]
enum LoopState {
    Bootstrapping,
    Watching,
    Recovering {
        reason: &'static str,
        /// The session ended cleanly or made progress, so the backoff starts over
        reset_backoff: bool,
    },
}

/// How a watch session ended.
struct SessionEnd {
    opened: bool,
    events: usize,
    error: Option<SyncError>,
}

/// Runs the reconciliation engine against a cluster and a DNS provider.
pub struct Controller<C, P> {
    cluster: C,
    engine: SyncEngine<P>,
    config: ControllerConfig,
    watch_backoff: ExponentialBackoff,
    /// Node name to public address, merged from every successful node listing
    known_addresses: HashMap<String, String>,
    /// Resource version of the latest pod listing
    pods_resource_version: Option<String>,
    /// Last resource version a watch session saw, where the next watch resumes
    resume_version: Option<String>,
    /// Pods from the latest listing, kept current by watch events
    known_pods: BTreeMap<String, PodObservation>,
}

impl<C: ClusterApi, P: DnsProvider> Controller<C, P> {
    /// Create a controller. Dry-run is taken from `config` and handed to the sync engine.
    pub fn new(cluster: C, provider: P, config: ControllerConfig) -> Self {
        let engine = SyncEngine::new(provider, config.dry_run);
        Self {
            cluster,
            engine,
            config,
            watch_backoff: watch_backoff(),
            known_addresses: HashMap::new(),
            pods_resource_version: None,
            resume_version: None,
            known_pods: BTreeMap::new(),
        }
    }

    /// Replace the backoff applied between watch sessions.
    #[must_use]
    pub fn with_watch_backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.watch_backoff = backoff;
        self
    }

    /// The cluster this controller observes.
    pub fn cluster(&self) -> &C {
        &self.cluster
    }

    /// The sync engine, and through it the DNS provider.
    pub fn engine(&self) -> &SyncEngine<P> {
        &self.engine
    }

    /// Run one full reconciliation pass from a fresh cluster listing.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::ClusterRequestFailed`] when nodes or pods cannot be
    /// listed, or [`SyncError::ProviderRequestFailed`] when the zone list cannot
    /// be fetched.
    pub async fn reconcile_all(&mut self) -> Result<SyncReport, SyncError> {
        let start = Instant::now();
        let result = self.reconcile_inner().await;
        let status = if result.is_ok() { "success" } else { "error" };
        metrics::record_reconciliation(status, start.elapsed());
        result
    }

    async fn reconcile_inner(&mut self) -> Result<SyncReport, SyncError> {
        let namespace = self.config.namespace.clone();
        let nodes = self.cluster.list_nodes().await?;
        let listing = self.cluster.list_pods(&namespace).await?;
        let pods = listing.pods;
        self.pods_resource_version = listing.resource_version;
        self.remember_addresses(&nodes);
        self.known_pods = pods
            .iter()
            .map(|pod| (pod.name.clone(), pod.clone()))
            .collect();

        debug!(
            nodes = nodes.len(),
            pods = pods.len(),
            namespace = %namespace,
            "Listed cluster state"
        );
        if tracing::enabled!(tracing::Level::DEBUG) {
            match serde_json::to_string(&node_addresses(&nodes)) {
                Ok(json) => debug!(node_addresses = %json, "Node public addresses"),
                Err(e) => debug!(error = %e, "Failed to serialize node addresses"),
            }
        }

        let desired = build_desired_state(&nodes, &pods, &self.config.annotations);
        metrics::record_desired_hosts(&namespace, desired.len());
        for diagnostic in &desired.diagnostics {
            metrics::record_error(diagnostic.reason());
        }
        if tracing::enabled!(tracing::Level::DEBUG) {
            match serde_json::to_string(&desired) {
                Ok(json) => debug!(desired = %json, "Built desired DNS state"),
                Err(e) => debug!(error = %e, "Failed to serialize desired state"),
            }
        }

        self.engine.sync(&desired).await
    }

    fn remember_addresses(&mut self, nodes: &[Node]) {
        for (name, address) in node_addresses(nodes) {
            self.known_addresses
                .insert(name.to_string(), address.to_string());
        }
    }

    /// Bootstrapping state: a cluster listing failure is fatal, any other pass
    /// failure is logged.
    async fn bootstrap(&mut self) -> Result<(), SyncError> {
        info!(namespace = %self.config.namespace, "Bootstrapping full reconciliation");
        match self.reconcile_all().await {
            Ok(_) => {
                metrics::mark_ready();
                Ok(())
            }
            Err(e @ SyncError::ClusterRequestFailed { .. }) => {
                error!(error = %e, "Cannot build baseline from cluster, giving up");
                metrics::record_error(e.reason());
                Err(e)
            }
            Err(e) => {
                error!(error = %e, "Bootstrap reconciliation failed, continuing to watch");
                metrics::record_error(e.reason());
                Ok(())
            }
        }
    }

    /// Remove the single record a deleted pod contributed.
    async fn handle_deleted(&mut self, pod: &PodObservation) -> Result<(), SyncError> {
        self.forget_pod(pod);
        let Some(host) = pod_hostname(pod, &self.config.annotations) else {
            debug!(pod = %pod.name, "Deleted pod has no hostname annotation, ignoring");
            return Ok(());
        };

        let nodes = self.cluster.list_nodes().await?;
        let live_addresses = node_addresses(&nodes);
        let address_of = |node_name: &str| {
            live_addresses
                .get(node_name)
                .map(|a| (*a).to_string())
                .or_else(|| self.known_addresses.get(node_name).cloned())
        };
        let live = live_addresses
            .get(pod.node_name.as_str())
            .map(|a| (*a).to_string());
        let address = match live {
            Some(address) => address,
            None => {
                // A scaled-down node disappears together with its pods
                let Some(known) = self.known_addresses.get(&pod.node_name) else {
                    return Err(SyncError::MissingNodeAddress {
                        pod: pod.name.clone(),
                        node: pod.node_name.clone(),
                    });
                };
                debug!(
                    pod = %pod.name,
                    node = %pod.node_name,
                    address = %known,
                    "Node is gone, using its last known address"
                );
                known.clone()
            }
        };

        let sibling = self.known_pods.values().find(|other| {
            pod_hostname(other, &self.config.annotations).as_deref() == Some(host.as_str())
                && address_of(&other.node_name).as_deref() == Some(address.as_str())
        });
        if let Some(sibling) = sibling {
            info!(
                pod = %pod.name,
                host = %host,
                address = %address,
                action = "skip",
                reason = "address still wanted",
                sibling = %sibling.name,
                "Pod deleted, another pod still needs its DNS record"
            );
            return Ok(());
        }

        info!(
            pod = %pod.name,
            node = %pod.node_name,
            host = %host,
            address = %address,
            "Pod deleted, removing its DNS record"
        );
        self.engine.delete_single_record(&host, &address).await?;
        Ok(())
    }

    /// Drop a deleted pod from the known pods, unless the entry is a newer
    /// incarnation recreated under the same name.
    fn forget_pod(&mut self, pod: &PodObservation) {
        let newer = self.known_pods.get(&pod.name).is_some_and(|known| {
            !known.uid.is_empty() && !pod.uid.is_empty() && known.uid != pod.uid
        });
        if newer {
            debug!(
                pod = %pod.name,
                uid = %pod.uid,
                "Deleted pod was recreated under the same name, keeping the new one"
            );
            return;
        }
        self.known_pods.remove(&pod.name);
    }

    /// Handle one batch of buffered events.
    ///
    /// Returns the number of events handled and the stream error that cut the
    /// batch short, if any.
    async fn handle_batch(
        &mut self,
        batch: Vec<Result<PodEvent, SyncError>>,
    ) -> (usize, Option<SyncError>) {
        let mut handled = 0;
        let mut rescan = false;
        let mut stream_error = None;

        for item in batch {
            let event = match item {
                Ok(event) => event,
                Err(e) => {
                    stream_error = Some(e);
                    break;
                }
            };
            handled += 1;
            metrics::record_watch_event(event.kind.as_str());
            if let Some(version) = &event.resource_version {
                self.resume_version = Some(version.clone());
            }

            match event.kind {
                PodEventKind::Bookmark => {
                    debug!(resource_version = ?event.resource_version, "Watch bookmark");
                }
                PodEventKind::Added | PodEventKind::Modified => {
                    debug!(
                        pod = %event.pod.name,
                        kind = event.kind.as_str(),
                        "Pod changed, full rescan scheduled"
                    );
                    self.known_pods
                        .insert(event.pod.name.clone(), event.pod.clone());
                    rescan = true;
                }
                PodEventKind::Deleted => {
                    if let Err(e) = self.handle_deleted(&event.pod).await {
                        warn!(
                            pod = %event.pod.name,
                            node = %event.pod.node_name,
                            reason = e.reason(),
                            error = %e,
                            "Failed to handle pod deletion"
                        );
                        metrics::record_error(e.reason());
                    }
                }
            }
        }

        if rescan {
            if let Err(e) = self.reconcile_all().await {
                error!(reason = e.reason(), error = %e, "Rescan after pod change failed");
                metrics::record_error(e.reason());
            }
        }

        (handled, stream_error)
    }

    /// Drop the resume point once the server no longer keeps it; the next watch
    /// starts from the latest listing instead.
    fn forget_expired(&mut self, error: &SyncError) {
        if matches!(error, SyncError::WatchExpired { .. }) {
            warn!(
                resource_version = ?self.resume_version,
                "Watch resume point expired, restarting from the next listing"
            );
            self.resume_version = None;
        }
    }

    /// Watching state: consume one watch session until it ends.
    async fn watch_session(&mut self) -> SessionEnd {
        let start = self
            .resume_version
            .clone()
            .or_else(|| self.pods_resource_version.clone());
        self.resume_version.clone_from(&start);
        let opened = self
            .cluster
            .watch_pods(&self.config.namespace, start.as_deref())
            .await;
        let stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                self.forget_expired(&e);
                return SessionEnd {
                    opened: false,
                    events: 0,
                    error: Some(e),
                }
            }
        };
        info!(namespace = %self.config.namespace, "Watching pods");

        let mut batches = stream.ready_chunks(MAX_EVENT_BATCH);
        let mut events = 0;
        while let Some(batch) = batches.next().await {
            let (handled, stream_error) = self.handle_batch(batch).await;
            events += handled;
            if let Some(e) = &stream_error {
                self.forget_expired(e);
                return SessionEnd {
                    opened: true,
                    events,
                    error: stream_error,
                };
            }
        }

        SessionEnd {
            opened: true,
            events,
            error: None,
        }
    }

    /// Run the control loop.
    ///
    /// Only returns when a bootstrap cannot list the cluster; the process is
    /// expected to exit and be restarted by its supervisor.
    ///
    /// # Errors
    ///
    /// Returns the [`SyncError::ClusterRequestFailed`] that stopped bootstrapping.
    pub async fn run(&mut self) -> Result<(), SyncError> {
        let mut state = LoopState::Bootstrapping;

        loop {
            state = match state {
                LoopState::Bootstrapping => {
                    self.bootstrap().await?;
                    LoopState::Watching
                }
                LoopState::Watching => {
                    let end = self.watch_session().await;
                    match end.error {
                        Some(e) => {
                            warn!(
                                events = end.events,
                                reason = e.reason(),
                                error = %e,
                                "Pod watch failed"
                            );
                            metrics::record_error(e.reason());
                            let expired = matches!(e, SyncError::WatchExpired { .. });
                            let reason = if expired {
                                "expired"
                            } else if end.opened {
                                "error"
                            } else {
                                "open_failed"
                            };
                            LoopState::Recovering {
                                reason,
                                reset_backoff: expired || end.events > 0,
                            }
                        }
                        None => {
                            info!(events = end.events, "Pod watch closed");
                            LoopState::Recovering {
                                reason: "closed",
                                reset_backoff: true,
                            }
                        }
                    }
                }
                LoopState::Recovering {
                    reason,
                    reset_backoff,
                } => {
                    if reset_backoff {
                        self.watch_backoff.reset();
                    }
                    let delay = self
                        .watch_backoff
                        .next_backoff()
                        .unwrap_or(self.watch_backoff.max_interval);
                    metrics::record_watch_restart(reason);
                    info!(
                        reason = reason,
                        retry_after = ?delay,
                        "Re-bootstrapping before reopening pod watch"
                    );
                    tokio::time::sleep(delay).await;
                    LoopState::Bootstrapping
                }
            };
        }
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod controller_tests;
