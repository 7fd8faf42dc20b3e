// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Sync engine: converges provider records toward the desired state.
//!
//! One call to [`SyncEngine::sync`] is one reconciliation pass:
//!
//! 1. List zones once (only if there is anything to sync)
//! 2. Resolve each desired host to its zone; hosts without a zone are skipped
//! 3. List the host's existing records once per `(zone, host)` pair
//! 4. Delete existing `A`/`AAAA` records whose content is no longer desired
//! 5. Create records for desired addresses with no surviving record
//!
//! Deletions are decided from the records listed at the start of the host's
//! sync, never from records created during the pass. Re-running a pass over
//! unchanged state issues no create or delete calls.
//!
//! Failures scoped to one host, address or record are logged, counted and
//! collected in the [`SyncReport`]; they never abort the pass. Only a failed
//! zone listing does, since no host can be placed without zones.

use crate::constants::TTL_AUTOMATIC;
use crate::desired::{DesiredHost, DesiredState};
use crate::errors::SyncError;
use crate::metrics;
use crate::provider::{DnsProvider, Zone};
use crate::record::{canonical_address, classify_address, NewRecord, ProviderRecord, RecordType};
use crate::zone::{normalize_name, resolve_zone};
use std::collections::{HashMap, HashSet};
use tracing::{debug, error, info, warn};

/// Kind of record change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    /// A record was (or would be) created
    Create,
    /// A record was (or would be) deleted
    Delete,
}

impl ChangeAction {
    /// Lowercase action name used in logs and metric labels.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Delete => "delete",
        }
    }
}

/// A record change applied to the provider, or planned under dry-run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordChange {
    /// Create or delete
    pub action: ChangeAction,
    /// Zone id the change targets
    pub zone_id: String,
    /// Zone name the change targets
    pub zone: String,
    /// Record name
    pub host: String,
    /// `A` or `AAAA`
    pub record_type: RecordType,
    /// Record content (address)
    pub content: String,
    /// Provider record id: the deleted record, or the created one when known
    pub record_id: Option<String>,
}

impl RecordChange {
    fn delete(zone: &Zone, host: &str, record: &ProviderRecord) -> Self {
        Self {
            action: ChangeAction::Delete,
            zone_id: zone.id.clone(),
            zone: zone.name.clone(),
            host: host.to_string(),
            record_type: record.record_type,
            content: record.content.clone(),
            record_id: Some(record.id.clone()),
        }
    }
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// True when changes were only planned, not executed
    pub dry_run: bool,
    /// Changes applied (or planned under dry-run), in the order they were decided
    pub changes: Vec<RecordChange>,
    /// Hosts skipped entirely (no zone, or their records could not be listed)
    pub skipped_hosts: Vec<String>,
    /// Addresses skipped because they are not valid IP literals
    pub skipped_addresses: Vec<String>,
    /// Every error encountered during the pass
    pub errors: Vec<SyncError>,
}

impl SyncReport {
    /// Number of create changes.
    #[must_use]
    pub fn created(&self) -> usize {
        self.count(ChangeAction::Create)
    }

    /// Number of delete changes.
    #[must_use]
    pub fn deleted(&self) -> usize {
        self.count(ChangeAction::Delete)
    }

    /// True when the pass decided on no changes at all.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.changes.is_empty()
    }

    fn count(&self, action: ChangeAction) -> usize {
        self.changes.iter().filter(|c| c.action == action).count()
    }
}

/// Diffs desired hosts against provider records and issues create/delete calls.
pub struct SyncEngine<P> {
    provider: P,
    dry_run: bool,
}

impl<P: DnsProvider> SyncEngine<P> {
    /// Create an engine over `provider`. With `dry_run`, every change is logged but not executed.
    pub fn new(provider: P, dry_run: bool) -> Self {
        Self { provider, dry_run }
    }

    /// The underlying provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Whether changes are only logged.
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Run one reconciliation pass over `desired`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::ProviderRequestFailed`] only if the zone list cannot be
    /// fetched. All other failures are reported in [`SyncReport::errors`].
    pub async fn sync(&self, desired: &DesiredState) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport {
            dry_run: self.dry_run,
            ..SyncReport::default()
        };

        if desired.is_empty() {
            debug!("No desired hosts, nothing to sync");
            return Ok(report);
        }

        let zones = self.provider.list_zones().await?;
        debug!(zones = zones.len(), "Fetched zone list for pass");

        let mut record_cache: HashMap<(String, String), Vec<ProviderRecord>> = HashMap::new();

        for host in desired.iter() {
            let zone = match resolve_zone(&host.host, &zones) {
                Ok(zone) => zone,
                Err(e) => {
                    warn!(
                        host = %host.host,
                        action = "skip",
                        reason = e.reason(),
                        "No zone matches host, skipping"
                    );
                    metrics::record_error(e.reason());
                    report.skipped_hosts.push(host.host.clone());
                    report.errors.push(e);
                    continue;
                }
            };

            if let Err(e) = self
                .sync_host(zone, host, &mut record_cache, &mut report)
                .await
            {
                error!(
                    host = %host.host,
                    zone = %zone.name,
                    action = "skip",
                    reason = e.reason(),
                    error = %e,
                    "Failed to sync host, skipping"
                );
                metrics::record_error(e.reason());
                report.skipped_hosts.push(host.host.clone());
                report.errors.push(e);
            }
        }

        info!(
            hosts = desired.len(),
            created = report.created(),
            deleted = report.deleted(),
            skipped_hosts = report.skipped_hosts.len(),
            skipped_addresses = report.skipped_addresses.len(),
            errors = report.errors.len(),
            dry_run = self.dry_run,
            "Sync pass finished"
        );

        Ok(report)
    }

    /// Converge one host inside `zone`.
    ///
    /// Returns an error only when the host's records cannot be listed.
    async fn sync_host(
        &self,
        zone: &Zone,
        desired: &DesiredHost,
        record_cache: &mut HashMap<(String, String), Vec<ProviderRecord>>,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let key = (zone.id.clone(), desired.host.clone());
        let existing = if let Some(cached) = record_cache.get(&key) {
            cached.clone()
        } else {
            let listed = self.provider.list_records(&zone.id, &desired.host).await?;
            record_cache.insert(key, listed.clone());
            listed
        };

        let mut surviving: HashSet<String> = HashSet::new();

        for record in existing
            .iter()
            .filter(|r| normalize_name(&r.name) == desired.host)
        {
            let content = canonical_address(&record.content);
            if desired.addresses.contains(&content) {
                surviving.insert(content);
                continue;
            }
            self.apply_delete(zone, &desired.host, record, report).await;
        }

        for address in &desired.addresses {
            if surviving.contains(address) {
                continue;
            }

            let record_type = match classify_address(address) {
                Ok(record_type) => record_type,
                Err(e) => {
                    warn!(
                        host = %desired.host,
                        zone = %zone.name,
                        address = %address,
                        action = "skip",
                        reason = e.reason(),
                        "Address is not an IP literal, skipping"
                    );
                    metrics::record_error(e.reason());
                    report.skipped_addresses.push(address.clone());
                    report.errors.push(e);
                    continue;
                }
            };

            self.apply_create(zone, desired, address, record_type, report)
                .await;
        }

        Ok(())
    }

    async fn apply_delete(
        &self,
        zone: &Zone,
        host: &str,
        record: &ProviderRecord,
        report: &mut SyncReport,
    ) {
        let change = RecordChange::delete(zone, host, record);

        if self.dry_run {
            info!(
                host = %host,
                zone = %zone.name,
                address = %record.content,
                record_type = %record.record_type,
                record_id = %record.id,
                action = "delete",
                reason = "address no longer desired",
                dry_run = true,
                "Would delete DNS record"
            );
            report.changes.push(change);
            return;
        }

        match self.provider.delete_record(&zone.id, &record.id).await {
            Ok(()) => {
                info!(
                    host = %host,
                    zone = %zone.name,
                    address = %record.content,
                    record_type = %record.record_type,
                    record_id = %record.id,
                    action = "delete",
                    reason = "address no longer desired",
                    "Deleted DNS record"
                );
                metrics::record_change(ChangeAction::Delete.as_str(), record.record_type.as_str());
                report.changes.push(change);
            }
            Err(e) => {
                error!(
                    host = %host,
                    zone = %zone.name,
                    address = %record.content,
                    record_id = %record.id,
                    action = "delete",
                    error = %e,
                    "Failed to delete DNS record"
                );
                metrics::record_error(e.reason());
                report.errors.push(e);
            }
        }
    }

    async fn apply_create(
        &self,
        zone: &Zone,
        desired: &DesiredHost,
        address: &str,
        record_type: RecordType,
        report: &mut SyncReport,
    ) {
        let mut change = RecordChange {
            action: ChangeAction::Create,
            zone_id: zone.id.clone(),
            zone: zone.name.clone(),
            host: desired.host.clone(),
            record_type,
            content: address.to_string(),
            record_id: None,
        };

        if self.dry_run {
            info!(
                host = %desired.host,
                zone = %zone.name,
                address = %address,
                record_type = %record_type,
                proxied = desired.proxied,
                action = "create",
                reason = "address not in DNS",
                dry_run = true,
                "Would create DNS record"
            );
            report.changes.push(change);
            return;
        }

        let new_record = NewRecord {
            record_type,
            name: desired.host.clone(),
            content: address.to_string(),
            proxied: desired.proxied,
            ttl: TTL_AUTOMATIC,
        };

        match self.provider.create_record(&zone.id, &new_record).await {
            Ok(created) => {
                info!(
                    host = %desired.host,
                    zone = %zone.name,
                    address = %address,
                    record_type = %record_type,
                    record_id = %created.id,
                    proxied = desired.proxied,
                    action = "create",
                    reason = "address not in DNS",
                    "Created DNS record"
                );
                metrics::record_change(ChangeAction::Create.as_str(), record_type.as_str());
                change.record_id = Some(created.id);
                report.changes.push(change);
            }
            Err(e) => {
                error!(
                    host = %desired.host,
                    zone = %zone.name,
                    address = %address,
                    action = "create",
                    error = %e,
                    "Failed to create DNS record"
                );
                metrics::record_error(e.reason());
                report.errors.push(e);
            }
        }
    }

    /// Delete the single record pointing `host` at `address`.
    ///
    /// Used when a pod disappears: only the first record matching
    /// `(zone, host, type, address)` is removed, so other pods still serving the
    /// host from other nodes keep their records.
    ///
    /// # Returns
    ///
    /// The deleted (or, under dry-run, planned) change, or `None` when no record matched.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::ZoneNotFound`], [`SyncError::InvalidAddress`] or
    /// [`SyncError::ProviderRequestFailed`].
    pub async fn delete_single_record(
        &self,
        host: &str,
        address: &str,
    ) -> Result<Option<RecordChange>, SyncError> {
        let host = normalize_name(host);
        let address = canonical_address(address);

        let zones = self.provider.list_zones().await?;
        let zone = resolve_zone(&host, &zones)?;
        let record_type = classify_address(&address)?;

        let records = self.provider.list_records(&zone.id, &host).await?;
        let Some(record) = records.iter().find(|r| {
            r.record_type == record_type
                && normalize_name(&r.name) == host
                && canonical_address(&r.content) == address
        }) else {
            info!(
                host = %host,
                zone = %zone.name,
                address = %address,
                record_type = %record_type,
                action = "skip",
                reason = "no matching record",
                "Nothing to delete for removed pod"
            );
            return Ok(None);
        };

        let change = RecordChange::delete(zone, &host, record);

        if self.dry_run {
            info!(
                host = %host,
                zone = %zone.name,
                address = %address,
                record_id = %record.id,
                action = "delete",
                reason = "pod deleted",
                dry_run = true,
                "Would delete DNS record"
            );
            return Ok(Some(change));
        }

        self.provider.delete_record(&zone.id, &record.id).await?;
        info!(
            host = %host,
            zone = %zone.name,
            address = %address,
            record_type = %record_type,
            record_id = %record.id,
            action = "delete",
            reason = "pod deleted",
            "Deleted DNS record"
        );
        metrics::record_change(ChangeAction::Delete.as_str(), record_type.as_str());

        Ok(Some(change))
    }
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod sync_tests;
