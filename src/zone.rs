// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Hostname to zone resolution.
//!
//! A host belongs to the zone whose name is its longest suffix on a label
//! boundary, so `app.svc.example.com` lands in `svc.example.com` when both that
//! zone and `example.com` exist. Comparison ignores ASCII case and a trailing
//! root dot.

use crate::errors::SyncError;
use crate::provider::Zone;

/// Normalize a DNS name for comparison: trim, drop the root dot, lowercase.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Returns true if `host` is `zone` itself or a name beneath it.
///
/// Both arguments must already be normalized.
fn is_within_zone(host: &str, zone: &str) -> bool {
    if zone.is_empty() {
        return false;
    }
    host == zone
        || host
            .strip_suffix(zone)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Resolve the zone that should hold records for `host`.
///
/// The longest matching zone name wins. If two zones share the same name the
/// first one in `zones` is used.
///
/// # Errors
///
/// Returns [`SyncError::ZoneNotFound`] when no zone is a suffix of `host`.
pub fn resolve_zone<'a>(host: &str, zones: &'a [Zone]) -> Result<&'a Zone, SyncError> {
    let host_norm = normalize_name(host);

    let mut best: Option<(&Zone, usize)> = None;
    for zone in zones {
        let zone_norm = normalize_name(&zone.name);
        if !is_within_zone(&host_norm, &zone_norm) {
            continue;
        }
        if best.is_none_or(|(_, len)| zone_norm.len() > len) {
            best = Some((zone, zone_norm.len()));
        }
    }

    best.map(|(zone, _)| zone)
        .ok_or_else(|| SyncError::ZoneNotFound {
            host: host.to_string(),
        })
}

#[cfg(test)]
#[path = "zone_tests.rs"]
mod zone_tests;
