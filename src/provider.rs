// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! DNS provider boundary.
//!
//! The sync engine talks to the DNS hosting service only through
//! [`DnsProvider`]. [`crate::cloudflare::CloudflareClient`] is the production
//! implementation; tests use an in-memory fake.

use crate::errors::SyncError;
use crate::record::{NewRecord, ProviderRecord};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A DNS zone owned by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    /// Provider-assigned zone id
    pub id: String,
    /// Zone apex, e.g. `example.com`
    pub name: String,
}

/// Operations the reconciliation engine needs from a DNS provider.
///
/// Authentication is the implementation's concern. Every method returns
/// [`SyncError::ProviderRequestFailed`] on failure.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// List every zone visible to the configured credentials.
    async fn list_zones(&self) -> Result<Vec<Zone>, SyncError>;

    /// List the `A`/`AAAA` records in `zone_id` whose name is `name`.
    async fn list_records(&self, zone_id: &str, name: &str)
        -> Result<Vec<ProviderRecord>, SyncError>;

    /// Create a record in `zone_id`.
    async fn create_record(
        &self,
        zone_id: &str,
        record: &NewRecord,
    ) -> Result<ProviderRecord, SyncError>;

    /// Delete record `record_id` from `zone_id`.
    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<(), SyncError>;
}
