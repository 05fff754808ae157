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

//! Discovery of interacting addresses from on-chain event logs.

use std::collections::BTreeSet;
use std::str::FromStr;

use alloy::primitives::Address;
use anyhow::Context;
use futures_util::future::try_join_all;
use serde::Deserialize;
use url::Url;

use crate::rpc::RpcClient;

/// Default number of blocks covered by one `eth_getLogs` call.
pub const DEFAULT_CHUNK_SIZE: u64 = 10_000;

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

/// One scan target. Chunk size is chain-dependent since providers cap how
/// many blocks a single log query may span.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// Display name used in logs, e.g. "eth-mainnet".
    pub name: String,
    pub rpc_url: Url,
    /// Staking contract whose event emitters are collected.
    pub contract: Address,
    /// Contract creation block; scanning always starts here.
    pub from_block: u64,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
}

/// Scans chains for every address that interacted with a contract.
pub struct LogScanner {
    rpc: RpcClient,
}

impl LogScanner {
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }

    /// Collect every address that emitted an event on the chain's contract
    /// since its `from_block`.
    ///
    /// The head is looked up once, fixing the range for the whole scan. All
    /// chunks are fetched concurrently under the shared RPC permit pool;
    /// completion order does not matter since results merge into a set. Any
    /// chunk failure aborts the scan: a partial range would silently
    /// understate the leaderboard.
    ///
    /// The returned set is ordered, so a re-run over the same chain state
    /// feeds enrichment (and therefore the stable tie-break) in the same
    /// order.
    pub async fn scan(&self, chain: &ChainConfig) -> anyhow::Result<BTreeSet<Address>> {
        let to_block = self
            .rpc
            .get_block_number(chain.rpc_url.as_str())
            .await
            .with_context(|| format!("[{}] failed to fetch head block", chain.name))?;

        let ranges = chunk_ranges(chain.from_block, to_block, chain.chunk_size);
        tracing::info!(
            "[{}] scanning blocks {} to {} in {} chunks",
            chain.name,
            chain.from_block,
            to_block,
            ranges.len()
        );

        let chunks = try_join_all(ranges.iter().map(|&(start, end)| async move {
            self.rpc
                .get_logs(chain.rpc_url.as_str(), chain.contract, start, end)
                .await
                .with_context(|| {
                    format!("[{}] log fetch failed for blocks {start} to {end}", chain.name)
                })
        }))
        .await?;

        let mut addresses = BTreeSet::new();
        let mut log_count = 0usize;
        for logs in &chunks {
            log_count += logs.len();
            for log in logs {
                if let Some(address) = address_from_topics(&log.topics) {
                    addresses.insert(address);
                }
            }
        }
        tracing::info!(
            "[{}] {} logs, {} unique addresses",
            chain.name,
            log_count,
            addresses.len()
        );
        Ok(addresses)
    }
}

/// Contiguous inclusive block ranges covering `[from, to]` in steps of
/// `chunk_size`.
pub fn chunk_ranges(from: u64, to: u64, chunk_size: u64) -> Vec<(u64, u64)> {
    let mut ranges = Vec::new();
    if chunk_size == 0 || from > to {
        return ranges;
    }
    let mut start = from;
    loop {
        let end = start.saturating_add(chunk_size - 1).min(to);
        ranges.push((start, end));
        if end == to {
            return ranges;
        }
        start = end + 1;
    }
}

/// The conventional transfer-like encoding puts the emitting address in the
/// low 20 bytes of the second indexed topic. Entries without a second topic
/// are skipped.
fn address_from_topics(topics: &[String]) -> Option<Address> {
    let topic = topics.get(1)?;
    let digits = topic.trim_start_matches("0x");
    let tail = digits.get(digits.len().checked_sub(40)?..)?;
    Address::from_str(tail).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_cover_the_span_exactly() {
        assert_eq!(chunk_ranges(100, 250, 100), vec![(100, 199), (200, 250)]);
        assert_eq!(chunk_ranges(0, 99, 100), vec![(0, 99)]);
        assert_eq!(chunk_ranges(5, 5, 100), vec![(5, 5)]);
    }

    #[test]
    fn degenerate_ranges_are_empty() {
        assert!(chunk_ranges(10, 5, 100).is_empty());
        assert!(chunk_ranges(0, 10, 0).is_empty());
    }

    #[test]
    fn extracts_address_from_padded_topic() {
        let topics = vec![
            "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef".to_string(),
            "0x000000000000000000000000ab5801a7d398351b8be11c439e05c5b3259aec9b".to_string(),
        ];
        let address = address_from_topics(&topics).unwrap();
        assert_eq!(
            format!("{address:#x}"),
            "0xab5801a7d398351b8be11c439e05c5b3259aec9b"
        );
    }

    #[test]
    fn upper_case_topics_normalize_to_the_same_address() {
        let upper = vec![
            "0x0".to_string(),
            "0x000000000000000000000000AB5801A7D398351B8BE11C439E05C5B3259AEC9B".to_string(),
        ];
        let lower = vec![
            "0x0".to_string(),
            "0x000000000000000000000000ab5801a7d398351b8be11c439e05c5b3259aec9b".to_string(),
        ];
        assert_eq!(address_from_topics(&upper), address_from_topics(&lower));
    }

    #[test]
    fn short_or_missing_topics_are_skipped() {
        assert!(address_from_topics(&["0xonly".to_string()]).is_none());
        assert!(address_from_topics(&["0x0".to_string(), "0x1234".to_string()]).is_none());
        assert!(address_from_topics(&[]).is_none());
    }
}
