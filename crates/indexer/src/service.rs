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

//! Pipeline orchestration: discovery, enrichment, ranking, merges, and the
//! atomic snapshot replace, behind a single-flight run guard.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy::primitives::Address;
use anyhow::{Context, Result};
use tokio::sync::{Mutex, RwLock};

use prime_leaderboard::{
    aggregate::rank_records,
    avatars::AvatarClient,
    enrichment::{EnrichmentClient, EnrichmentConfig},
    ens::{EnsDirectory, EnsResolver},
    fetcher::RateLimitedFetcher,
    merge::{merge_avatar_counts, merge_ens_names},
    query::LeaderboardQuery,
    rpc::RpcClient,
    scanner::LogScanner,
    snapshot::SnapshotStore,
    types::{AddressRecord, RawCapture, Snapshot},
};

use crate::analytics::AnalyticsClient;
use crate::config::Config;
use crate::notifier::ErrorReporter;

const ENS_FILE: &str = "ens.json";

/// Observable state of the single-flight pipeline job.
#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    Idle,
    Running,
    Completed(RunSummary),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub addresses_discovered: usize,
    pub addresses_enriched: usize,
    pub addresses_failed: usize,
    pub duration: Duration,
}

/// Why a trigger did not produce a completed run.
#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error("a pipeline run is already in progress")]
    Busy,
    #[error(transparent)]
    Run(#[from] anyhow::Error),
}

/// The one service object, constructed at startup. Owns every external
/// dependency handle (one fetcher pool per upstream class), the snapshot
/// store, the ENS directory, the diagnostic reporter, and the run guard.
pub struct PipelineService {
    config: Config,
    scanner: LogScanner,
    enrichment: EnrichmentClient,
    avatars: AvatarClient,
    ens_resolver: Option<EnsResolver>,
    analytics: Option<AnalyticsClient>,
    store: SnapshotStore,
    ens: RwLock<EnsDirectory>,
    reporter: ErrorReporter,
    run_guard: Mutex<()>,
    status: RwLock<RunStatus>,
}

impl PipelineService {
    pub async fn new(config: Config) -> Result<Self> {
        let timeout = config.limits.request_timeout();
        let rpc_fetcher =
            Arc::new(RateLimitedFetcher::new(config.limits.rpc_concurrency, timeout)?);
        let stats_fetcher =
            Arc::new(RateLimitedFetcher::new(config.limits.stats_concurrency, timeout)?);
        let ens_fetcher =
            Arc::new(RateLimitedFetcher::new(config.limits.ens_concurrency, timeout)?);
        let nft_fetcher =
            Arc::new(RateLimitedFetcher::new(config.limits.nft_concurrency, timeout)?);

        let scanner = LogScanner::new(RpcClient::new(rpc_fetcher));
        let enrichment = EnrichmentClient::new(
            stats_fetcher,
            config.endpoints.wallet_stats.clone(),
            EnrichmentConfig {
                batch_size: config.limits.batch_size,
                batch_pause: config.limits.batch_pause(),
                rate_limit_backoff: config.limits.rate_limit_backoff(),
            },
        );
        let avatars = AvatarClient::new(
            nft_fetcher,
            config.endpoints.nft_ownership.clone(),
            config.endpoints.avatar_contract,
        );
        let ens_resolver = config
            .endpoints
            .ens_resolver
            .clone()
            .map(|base| EnsResolver::new(ens_fetcher, base));
        let analytics = config
            .analytics
            .clone()
            .map(|analytics| AnalyticsClient::new(analytics, &config.data_dir))
            .transpose()?;

        let store = SnapshotStore::open(&config.data_dir).await?;
        let ens = EnsDirectory::load(&config.data_dir.join(ENS_FILE)).await?;
        let reporter = ErrorReporter::new(config.notifier.clone());

        Ok(Self {
            config,
            scanner,
            enrichment,
            avatars,
            ens_resolver,
            analytics,
            store,
            ens: RwLock::new(ens),
            reporter,
            run_guard: Mutex::new(()),
            status: RwLock::new(RunStatus::Idle),
        })
    }

    pub async fn status(&self) -> RunStatus {
        self.status.read().await.clone()
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Run a closure against the current snapshot and ENS directory.
    pub async fn query<T>(&self, f: impl FnOnce(LeaderboardQuery<'_>) -> T) -> T {
        let snapshot = self.store.current().await;
        let ens = self.ens.read().await;
        f(LeaderboardQuery::new(&snapshot, &ens))
    }

    /// Start a run now unless one is already in flight; a concurrent trigger
    /// is rejected, never queued behind the active run.
    pub async fn try_trigger(&self) -> Result<RunSummary, TriggerError> {
        let Ok(_guard) = self.run_guard.try_lock() else {
            return Err(TriggerError::Busy);
        };
        Ok(self.run_guarded().await?)
    }

    /// Run the pipeline, waiting for any active run to finish first. Used by
    /// the interval loop, which is itself sequential.
    pub async fn run_once(&self) -> Result<RunSummary> {
        let _guard = self.run_guard.lock().await;
        self.run_guarded().await
    }

    /// Re-run the pure ranking pass over the stored snapshot without
    /// re-fetching anything. Returns the number of records re-ranked.
    pub async fn recalculate(&self) -> Result<usize> {
        let current = self.store.current().await;
        let records = rank_records(current.records().to_vec());
        let count = records.len();
        self.store.replace(Snapshot::new(records)).await?;
        tracing::info!("recalculated percentages and positions for {count} addresses");
        Ok(count)
    }

    /// Refresh the ENS directory for every address in the current snapshot,
    /// then persist it. Returns the directory size after the pass.
    pub async fn refresh_ens(&self) -> Result<usize> {
        let Some(resolver) = &self.ens_resolver else {
            anyhow::bail!("no ens resolver endpoint configured");
        };
        let current = self.store.current().await;
        let addresses: Vec<Address> =
            current.records().iter().map(|record| record.address).collect();

        let mut directory = self.ens.write().await;
        resolver.refresh(&mut directory, &addresses).await;
        directory
            .save(&self.config.data_dir.join(ENS_FILE))
            .await
            .context("failed to persist ens directory")?;
        Ok(directory.len())
    }

    async fn run_guarded(&self) -> Result<RunSummary> {
        *self.status.write().await = RunStatus::Running;
        let result = self.execute_run().await;
        *self.status.write().await = match &result {
            Ok(summary) => RunStatus::Completed(summary.clone()),
            Err(err) => RunStatus::Failed(format!("{err:#}")),
        };
        // Ship whatever diagnostics accumulated below the batch threshold.
        self.reporter.flush().await;
        result
    }

    async fn execute_run(&self) -> Result<RunSummary> {
        let started = Instant::now();
        tracing::info!("starting leaderboard pipeline run");

        // Discovery. Every configured chain must contribute a complete
        // range; the analytics path only supplements and may come up empty.
        let mut discovered: BTreeSet<Address> = BTreeSet::new();
        for chain in &self.config.chains {
            let addresses = self
                .scanner
                .scan(chain)
                .await
                .with_context(|| format!("[{}] address discovery failed", chain.name))?;
            discovered.extend(addresses);
        }
        if let Some(analytics) = &self.analytics {
            discovered.extend(analytics.interacting_addresses().await);
        }
        let addresses: Vec<Address> = discovered.into_iter().collect();
        tracing::info!("discovered {} unique interacting addresses", addresses.len());

        // Enrichment. Per-address failures are absorbed and reported.
        let report = self.enrichment.enrich(&addresses).await;
        for failure in &report.failures {
            self.reporter
                .record(
                    "wallet stats fetch",
                    format!("{:#x}", failure.address),
                    failure.kind.to_string(),
                )
                .await;
        }

        // Keep the untransformed payloads before any derivation happens.
        let captures: Vec<RawCapture> = report
            .wallets
            .iter()
            .map(|wallet| RawCapture { address: wallet.address, data: wallet.raw.clone() })
            .collect();
        self.store.write_original(&captures).await.context("failed to persist raw capture")?;

        let records: Vec<AddressRecord> = report
            .wallets
            .iter()
            .map(|wallet| AddressRecord { address: wallet.address, data: wallet.stats.clone() })
            .collect();
        let mut records = rank_records(records);

        // Attribute merges run strictly after ranking; neither influences
        // the ordering.
        if let Some(resolver) = &self.ens_resolver {
            let mut directory = self.ens.write().await;
            resolver.refresh(&mut directory, &addresses).await;
            directory
                .save(&self.config.data_dir.join(ENS_FILE))
                .await
                .context("failed to persist ens directory")?;
        }
        {
            let directory = self.ens.read().await;
            merge_ens_names(&mut records, &directory);
        }

        match self.avatars.fetch_owner_balances().await {
            Ok(balances) => merge_avatar_counts(&mut records, &balances),
            Err(err) => {
                tracing::warn!("avatar holdings unavailable, counts reset to 0: {err:#}");
                self.reporter
                    .record(
                        "avatar ownership fetch",
                        format!("{:#x}", self.config.endpoints.avatar_contract),
                        format!("{err:#}"),
                    )
                    .await;
                merge_avatar_counts(&mut records, &HashMap::new());
            }
        }

        self.store
            .replace(Snapshot::new(records))
            .await
            .context("failed to replace snapshot")?;

        let summary = RunSummary {
            addresses_discovered: addresses.len(),
            addresses_enriched: report.wallets.len(),
            addresses_failed: report.failures.len(),
            duration: started.elapsed(),
        };
        tracing::info!(
            "pipeline run complete: {}/{} addresses enriched ({} failed) in {:.1?}",
            summary.addresses_enriched,
            summary.addresses_discovered,
            summary.addresses_failed,
            summary.duration
        );
        Ok(summary)
    }

    /// Data directory this service persists into.
    pub fn data_dir(&self) -> &PathBuf {
        &self.config.data_dir
    }
}
