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

//! Service configuration, loaded once at startup from a TOML file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use alloy::primitives::Address;
use anyhow::{Context, Result};
use serde::Deserialize;
use url::Url;

use prime_leaderboard::scanner::ChainConfig;

/// Top-level service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Directory holding the snapshot, the raw capture, the ENS directory,
    /// and the analytics cache.
    #[serde(default = "defaults::data_dir")]
    pub data_dir: PathBuf,
    /// Chains to scan for interacting addresses. Every listed chain must
    /// contribute a complete range for a run to succeed.
    pub chains: Vec<ChainConfig>,
    pub endpoints: Endpoints,
    #[serde(default)]
    pub limits: Limits,
    /// Optional alternate discovery through the analytics provider.
    #[serde(default)]
    pub analytics: Option<AnalyticsConfig>,
    /// Optional batched diagnostic reporting.
    #[serde(default)]
    pub notifier: Option<NotifierConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Endpoints {
    /// Wallet-stats API base, e.g. `https://caching.wayfinder.ai/api`.
    pub wallet_stats: Url,
    /// NFT-ownership API base.
    pub nft_ownership: Url,
    /// Avatar collection contract whose holders are counted.
    pub avatar_contract: Address,
    /// ENS resolver API base; omitting it disables the refresh pass.
    #[serde(default)]
    pub ens_resolver: Option<Url>,
}

/// Concurrency caps and pacing. One cap per external dependency class so no
/// class can starve another.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub rpc_concurrency: usize,
    pub stats_concurrency: usize,
    pub ens_concurrency: usize,
    pub nft_concurrency: usize,
    pub request_timeout_secs: u64,
    /// Enrichment batch size; keep below `stats_concurrency`.
    pub batch_size: usize,
    pub batch_pause_ms: u64,
    pub rate_limit_backoff_ms: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            rpc_concurrency: 8,
            stats_concurrency: 40,
            ens_concurrency: 10,
            nft_concurrency: 2,
            request_timeout_secs: 30,
            batch_size: 25,
            batch_pause_ms: 500,
            rate_limit_backoff_ms: 2000,
        }
    }
}

impl Limits {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }

    pub fn rate_limit_backoff(&self) -> Duration {
        Duration::from_millis(self.rate_limit_backoff_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default = "defaults::analytics_api_base")]
    pub api_base: Url,
    pub api_key: String,
    /// Query listing caching interactions, one `user` column per row.
    pub query_id: u64,
    #[serde(default = "defaults::analytics_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
    pub bot_token: String,
    pub chat_id: String,
    /// Errors accumulated before a report is flushed.
    #[serde(default = "defaults::error_batch_size")]
    pub error_batch_size: usize,
}

mod defaults {
    use std::path::PathBuf;
    use url::Url;

    pub fn data_dir() -> PathBuf {
        PathBuf::from("data")
    }

    pub fn analytics_api_base() -> Url {
        Url::parse("https://api.dune.com/api/v1").expect("static url")
    }

    // 24 hours plus a minute of slack, matching the provider's own refresh.
    pub fn analytics_cache_ttl_secs() -> u64 {
        24 * 60 * 60 + 60
    }

    pub fn error_batch_size() -> usize {
        10
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&data)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }
}
