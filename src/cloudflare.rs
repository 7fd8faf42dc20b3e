// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Cloudflare v4 REST implementation of [`DnsProvider`].
//!
//! Every call is authenticated with a bearer API token and wrapped in the
//! Cloudflare response envelope (`success`, `errors`, `result`,
//! `result_info`). Zone and record listings are paginated.
//!
//! # Retries
//!
//! Calls are retried with [`http_backoff`] on HTTP 429, 5xx and connection
//! failures. Record creation is only retried when the request cannot have been
//! applied (429 or connection refused), so a retry never creates a duplicate.

use crate::constants::{
    CLOUDFLARE_RECORDS_PAGE_SIZE, CLOUDFLARE_ZONES_PAGE_SIZE, USER_AGENT,
};
use crate::errors::SyncError;
use crate::provider::{DnsProvider, Zone};
use crate::record::{NewRecord, ProviderRecord, RecordType};
use crate::retry::{http_backoff, is_retryable_http_status};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};
use url::Url;

/// HTTP error with status code for retry logic.
#[derive(Debug)]
struct HttpError {
    status: StatusCode,
    message: String,
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HTTP {}: {}", self.status, self.message)
    }
}

impl std::error::Error for HttpError {}

// ============================================================
// API Response Types
// ============================================================

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiError>,
    result: Option<T>,
    result_info: Option<ResultInfo>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ResultInfo {
    #[serde(default)]
    total_pages: u32,
}

/// A DNS record as returned by the API. `type` may be anything Cloudflare supports.
#[derive(Debug, Deserialize)]
struct WireRecord {
    id: String,
    #[serde(rename = "type")]
    record_type: String,
    name: String,
    content: String,
    #[serde(default)]
    proxied: bool,
}

impl WireRecord {
    /// Convert to a managed record; `None` for anything but `A`/`AAAA`.
    fn into_provider_record(self, zone_id: &str) -> Option<ProviderRecord> {
        let record_type = RecordType::from_wire(&self.record_type)?;
        Some(ProviderRecord {
            id: self.id,
            zone_id: zone_id.to_string(),
            record_type,
            name: self.name,
            content: self.content,
            proxied: self.proxied,
        })
    }
}

/// Cloudflare DNS API client.
pub struct CloudflareClient {
    http: reqwest::Client,
    api_token: String,
    base_url: Url,
}

impl CloudflareClient {
    /// Create a client for the API rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is not an absolute URL or the HTTP client
    /// cannot be built.
    pub fn new(api_token: impl Into<String>, base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid Cloudflare API URL: {base_url}"))?;
        if base_url.cannot_be_a_base() {
            bail!("Cloudflare API URL cannot be a base: {base_url}");
        }

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            api_token: api_token.into(),
            base_url,
        })
    }

    /// Build an endpoint URL by appending path segments to the base URL.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow!("Cloudflare API URL cannot be a base: {}", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send a request, retrying transient failures with [`http_backoff`].
    async fn request<T, B>(&self, method: Method, url: &Url, body: Option<&B>) -> Result<ApiResponse<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let mut backoff = http_backoff();
        let start_time = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self.request_once(method.clone(), url, body).await {
                Ok(response) => {
                    if attempt > 1 {
                        debug!(
                            method = %method,
                            url = %url,
                            attempt = attempt,
                            elapsed = ?start_time.elapsed(),
                            "Cloudflare API call succeeded after retries"
                        );
                    }
                    return Ok(response);
                }
                Err(e) => {
                    if !is_retryable(&method, &e) {
                        return Err(e);
                    }

                    if let Some(duration) = backoff.next_backoff() {
                        warn!(
                            method = %method,
                            url = %url,
                            attempt = attempt,
                            retry_after = ?duration,
                            error = %e,
                            "Retryable Cloudflare API error, will retry"
                        );
                        tokio::time::sleep(duration).await;
                    } else {
                        error!(
                            method = %method,
                            url = %url,
                            attempt = attempt,
                            elapsed = ?start_time.elapsed(),
                            error = %e,
                            "Backoff exhausted, giving up"
                        );
                        return Err(anyhow!("Backoff exhausted after {attempt} attempts: {e}"));
                    }
                }
            }
        }
    }

    async fn request_once<T, B>(
        &self,
        method: Method,
        url: &Url,
        body: Option<&B>,
    ) -> Result<ApiResponse<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        debug!(method = %method, url = %url, "Cloudflare API request");

        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .bearer_auth(&self.api_token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to send {method} request to {url}"))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(HttpError { status, message }.into());
        }

        let envelope: ApiResponse<T> = response
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {url}"))?;

        if !envelope.success {
            let errors: Vec<String> = envelope
                .errors
                .iter()
                .map(|e| format!("{} (code {})", e.message, e.code))
                .collect();
            bail!("Cloudflare API error: {}", errors.join(", "));
        }

        Ok(envelope)
    }

    /// Fetch every page of a list endpoint.
    async fn list_paginated<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        filters: &[(&str, &str)],
        per_page: u32,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page: u32 = 1;

        loop {
            let mut url = self.endpoint(segments)?;
            url.query_pairs_mut()
                .extend_pairs(filters)
                .append_pair("page", &page.to_string())
                .append_pair("per_page", &per_page.to_string());

            let response: ApiResponse<Vec<T>> = self.request(Method::GET, &url, None::<&()>).await?;
            let total_pages = response.result_info.map_or(1, |info| info.total_pages);
            items.extend(response.result.unwrap_or_default());

            if page >= total_pages {
                break;
            }
            page += 1;
        }

        Ok(items)
    }
}

/// Whether a failed request may be sent again.
fn is_retryable(method: &Method, err: &anyhow::Error) -> bool {
    if let Some(http_err) = err.downcast_ref::<HttpError>() {
        if *method == Method::POST {
            return http_err.status == StatusCode::TOO_MANY_REQUESTS;
        }
        return is_retryable_http_status(http_err.status);
    }
    if let Some(req_err) = err.downcast_ref::<reqwest::Error>() {
        if *method == Method::POST {
            return req_err.is_connect();
        }
        return req_err.is_connect() || req_err.is_timeout();
    }
    false
}

#[async_trait]
impl DnsProvider for CloudflareClient {
    async fn list_zones(&self) -> Result<Vec<Zone>, SyncError> {
        let zones: Vec<Zone> = self
            .list_paginated(&["zones"], &[], CLOUDFLARE_ZONES_PAGE_SIZE)
            .await
            .map_err(|e| SyncError::provider("list zones", format!("{e:#}")))?;
        debug!(zones = zones.len(), "Listed Cloudflare zones");
        Ok(zones)
    }

    async fn list_records(
        &self,
        zone_id: &str,
        name: &str,
    ) -> Result<Vec<ProviderRecord>, SyncError> {
        let wire: Vec<WireRecord> = self
            .list_paginated(
                &["zones", zone_id, "dns_records"],
                &[("name", name)],
                CLOUDFLARE_RECORDS_PAGE_SIZE,
            )
            .await
            .map_err(|e| {
                SyncError::provider(format!("list records {name} in zone {zone_id}"), format!("{e:#}"))
            })?;

        Ok(wire
            .into_iter()
            .filter_map(|record| record.into_provider_record(zone_id))
            .collect())
    }

    async fn create_record(
        &self,
        zone_id: &str,
        record: &NewRecord,
    ) -> Result<ProviderRecord, SyncError> {
        let operation = format!(
            "create {} record {} -> {} in zone {zone_id}",
            record.record_type, record.name, record.content
        );

        let url = self
            .endpoint(&["zones", zone_id, "dns_records"])
            .map_err(|e| SyncError::provider(&operation, format!("{e:#}")))?;
        let response: ApiResponse<WireRecord> = self
            .request(Method::POST, &url, Some(record))
            .await
            .map_err(|e| SyncError::provider(&operation, format!("{e:#}")))?;

        response
            .result
            .and_then(|created| created.into_provider_record(zone_id))
            .ok_or_else(|| SyncError::provider(&operation, "response carried no A/AAAA record"))
    }

    async fn delete_record(&self, zone_id: &str, record_id: &str) -> Result<(), SyncError> {
        let operation = format!("delete record {record_id} in zone {zone_id}");

        let url = self
            .endpoint(&["zones", zone_id, "dns_records", record_id])
            .map_err(|e| SyncError::provider(&operation, format!("{e:#}")))?;
        let _: ApiResponse<serde_json::Value> = self
            .request(Method::DELETE, &url, None::<&()>)
            .await
            .map_err(|e| SyncError::provider(&operation, format!("{e:#}")))?;

        Ok(())
    }
}

#[cfg(test)]
#[path = "cloudflare_tests.rs"]
mod cloudflare_tests;
