// Copyright 2025 RISC Zero, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Alternate address discovery through the analytics provider.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::Address;
use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::AnalyticsConfig;

const CACHE_FILE: &str = "analytics_cache.json";

#[derive(Debug, Serialize, Deserialize)]
struct CachedRows {
    /// Unix seconds at fetch time.
    fetched_at: i64,
    rows: Vec<Value>,
}

/// Client for the analytics query listing caching interactions.
///
/// Query results are cached on disk so repeated pipeline runs inside the TTL
/// do not re-hit the provider. Every failure degrades to an empty
/// contribution; the analytics path supplements log scanning and must never
/// abort a run.
pub struct AnalyticsClient {
    client: reqwest::Client,
    config: AnalyticsConfig,
    cache_path: PathBuf,
}

impl AnalyticsClient {
    pub fn new(config: AnalyticsConfig, data_dir: &Path) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self { client, config, cache_path: data_dir.join(CACHE_FILE) })
    }

    /// Addresses reported by the analytics query, or an empty set when
    /// neither the provider nor the cache can be used.
    pub async fn interacting_addresses(&self) -> BTreeSet<Address> {
        let rows = match self.latest_rows().await {
            Ok(rows) => rows,
            Err(err) => {
                tracing::warn!("analytics discovery skipped: {err:#}");
                return BTreeSet::new();
            }
        };

        let mut addresses = BTreeSet::new();
        for row in &rows {
            if let Some(user) = row.get("user").and_then(Value::as_str) {
                if let Ok(address) = Address::from_str(user) {
                    addresses.insert(address);
                }
            }
        }
        tracing::info!("analytics query yielded {} addresses", addresses.len());
        addresses
    }

    async fn latest_rows(&self) -> Result<Vec<Value>> {
        if let Some(rows) = self.load_cache().await {
            tracing::debug!("analytics cache hit ({} rows)", rows.len());
            return Ok(rows);
        }

        let base = self.config.api_base.as_str().trim_end_matches('/');
        let url = format!("{}/query/{}/results", base, self.config.query_id);
        let response = self
            .client
            .get(&url)
            .header("X-Dune-API-Key", &self.config.api_key)
            .send()
            .await
            .context("analytics request failed")?
            .error_for_status()
            .context("analytics request rejected")?;
        let payload: Value =
            response.json().await.context("failed to decode analytics response")?;
        let rows = payload
            .pointer("/result/rows")
            .and_then(Value::as_array)
            .cloned()
            .context("analytics response has no result rows")?;

        self.save_cache(&rows).await;
        Ok(rows)
    }

    async fn load_cache(&self) -> Option<Vec<Value>> {
        let data = tokio::fs::read(&self.cache_path).await.ok()?;
        let cached: CachedRows = serde_json::from_slice(&data).ok()?;
        let age = Utc::now().timestamp() - cached.fetched_at;
        (age >= 0 && (age as u64) < self.config.cache_ttl_secs).then_some(cached.rows)
    }

    async fn save_cache(&self, rows: &[Value]) {
        let cached = CachedRows { fetched_at: Utc::now().timestamp(), rows: rows.to_vec() };
        match serde_json::to_vec(&cached) {
            Ok(data) => {
                if let Err(err) = tokio::fs::write(&self.cache_path, data).await {
                    tracing::debug!("failed to write analytics cache: {err}");
                }
            }
            Err(err) => tracing::debug!("failed to serialize analytics cache: {err}"),
        }
    }
}
