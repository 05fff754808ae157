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

//! Per-address enrichment through the wallet-stats API.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use futures_util::future::join_all;
use serde_json::Value;
use tokio::time::sleep;
use url::Url;

use crate::fetcher::{FetchErrorKind, RateLimitedFetcher};
use crate::types::WalletStats;

/// Pacing of the enrichment pass. The batch size is deliberately smaller
/// than the stats fetcher's concurrency cap so each batch drains quickly and
/// progress is reported at a steady cadence; the pause between batches keeps
/// sustained load on the upstream below its burst tolerance even when under
/// the cap.
#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    pub batch_size: usize,
    pub batch_pause: Duration,
    /// Fixed backoff after a 429 before the next call may be issued.
    pub rate_limit_backoff: Duration,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            batch_size: 25,
            batch_pause: Duration::from_millis(500),
            rate_limit_backoff: Duration::from_secs(2),
        }
    }
}

/// Successfully enriched address: the raw payload as served (kept for the
/// secondary capture) plus the typed stats after the badge-data unwrap.
#[derive(Debug, Clone)]
pub struct EnrichedWallet {
    pub address: Address,
    pub raw: Value,
    pub stats: WalletStats,
}

#[derive(Debug, Clone)]
pub struct EnrichmentFailure {
    pub address: Address,
    pub kind: FetchErrorKind,
}

/// Outcome of one enrichment pass. Failed addresses carry no record and are
/// excluded from all downstream aggregation; they are reported, never fatal.
#[derive(Debug, Default)]
pub struct EnrichmentReport {
    pub wallets: Vec<EnrichedWallet>,
    pub failures: Vec<EnrichmentFailure>,
}

/// Batched client for the external wallet-stats endpoint.
pub struct EnrichmentClient {
    fetcher: Arc<RateLimitedFetcher>,
    stats_base: String,
    config: EnrichmentConfig,
}

impl EnrichmentClient {
    pub fn new(fetcher: Arc<RateLimitedFetcher>, stats_base: Url, config: EnrichmentConfig) -> Self {
        Self {
            fetcher,
            stats_base: stats_base.as_str().trim_end_matches('/').to_string(),
            config,
        }
    }

    /// Fetch wallet stats for every address, in input order, batch by batch.
    pub async fn enrich(&self, addresses: &[Address]) -> EnrichmentReport {
        let mut report = EnrichmentReport::default();
        let total = addresses.len();

        for (batch_index, batch) in addresses.chunks(self.config.batch_size.max(1)).enumerate() {
            if batch_index > 0 {
                sleep(self.config.batch_pause).await;
            }

            let outcomes = join_all(batch.iter().map(|&address| self.fetch_wallet(address))).await;
            for outcome in outcomes {
                match outcome {
                    Ok(wallet) => report.wallets.push(wallet),
                    Err(failure) => report.failures.push(failure),
                }
            }

            tracing::info!(
                "wallet stats progress: {} fetched, {} failed, {} total",
                report.wallets.len(),
                report.failures.len(),
                total
            );
        }

        report
    }

    async fn fetch_wallet(&self, address: Address) -> Result<EnrichedWallet, EnrichmentFailure> {
        let url = format!("{}/walletstats/{address:#x}?format=json", self.stats_base);
        match self.fetcher.get_json(&url).await {
            Ok(raw) => match decode_wallet_stats(&raw) {
                Ok(stats) => Ok(EnrichedWallet { address, raw, stats }),
                Err(err) => Err(EnrichmentFailure {
                    address,
                    kind: FetchErrorKind::DecodeError(err.to_string()),
                }),
            },
            Err(kind) => {
                if kind == FetchErrorKind::RateLimited {
                    // Single attempt per address; the backoff only delays
                    // whatever call the pass issues next.
                    sleep(self.config.rate_limit_backoff).await;
                }
                Err(EnrichmentFailure { address, kind })
            }
        }
    }
}

/// Some wallets answer with their primary-address badge payload nested under
/// `extra`; when present, that object replaces the top-level one.
fn unwrap_badge_data(raw: &Value) -> &Value {
    match raw.get("extra").and_then(|extra| extra.get("primary_address_badge_data")) {
        Some(badge) if badge.is_object() => badge,
        _ => raw,
    }
}

fn decode_wallet_stats(raw: &Value) -> Result<WalletStats, serde_json::Error> {
    serde_json::from_value(unwrap_badge_data(raw).clone())
}
