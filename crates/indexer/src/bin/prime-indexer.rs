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

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use prime_indexer::{Config, PipelineService};

/// Arguments of the leaderboard indexer.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct MainArgs {
    /// Path to the service configuration file.
    #[clap(short, long, env = "LEADERBOARD_CONFIG", default_value = "leaderboard.toml")]
    config: PathBuf,
    /// Interval in seconds between pipeline runs.
    #[clap(long, default_value = "86400")]
    interval: u64,
    /// Number of consecutive failed runs tolerated before quitting.
    #[clap(long, default_value = "3")]
    retries: u32,
    /// Run the pipeline once and exit.
    #[clap(long, default_value_t = false)]
    run_once: bool,
    /// Whether to log in JSON format.
    #[clap(long, env, default_value_t = false)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = MainArgs::parse();

    if args.log_json {
        tracing_subscriber::fmt()
            .with_ansi(false)
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .init();
    }

    let config = Config::load(&args.config)?;
    tracing::info!(
        "initializing leaderboard indexer for {} chains, data dir {}",
        config.chains.len(),
        config.data_dir.display()
    );
    let service = PipelineService::new(config).await?;

    if args.run_once {
        let summary = service.run_once().await?;
        tracing::info!("run finished: {summary:?}");
        return Ok(());
    }

    let mut consecutive_failures = 0u32;
    loop {
        match service.run_once().await {
            Ok(_) => consecutive_failures = 0,
            Err(err) => {
                consecutive_failures += 1;
                tracing::error!(
                    "pipeline run failed ({consecutive_failures}/{}): {err:#}",
                    args.retries
                );
                if consecutive_failures >= args.retries {
                    bail!("FATAL: {consecutive_failures} consecutive pipeline failures");
                }
            }
        }
        tokio::time::sleep(Duration::from_secs(args.interval)).await;
    }
}
