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

//! Core data model for the caching leaderboard.
//!
//! Field names follow the persisted JSON layout of the snapshot files so
//! that diffs across pipeline runs stay meaningful.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

/// Named score components reported by the wallet-stats API for one source
/// chain. Absent fields deserialize to 0 rather than failing the record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreComponents {
    #[serde(default)]
    pub prime_score: f64,
    #[serde(default)]
    pub community_score: f64,
    #[serde(default)]
    pub initialization_score: f64,
}

impl ScoreComponents {
    /// Sum of every component in this group.
    pub fn total(&self) -> f64 {
        self.prime_score + self.community_score + self.initialization_score
    }
}

/// Per-address wallet data carried by a snapshot entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WalletStats {
    /// Score components on the native chain.
    #[serde(default)]
    pub scores: ScoreComponents,
    /// Score components on the secondary (Base) deployment.
    #[serde(default)]
    pub base_scores: ScoreComponents,
    #[serde(default)]
    pub prime_amount_cached: f64,
    #[serde(default)]
    pub base_prime_amount_cached: f64,
    /// Composite score over all sources, derived by the ranking pass.
    #[serde(default)]
    pub total_score: f64,
    /// Share of the snapshot-wide score total, 0 to 100.
    #[serde(default)]
    pub percentage: f64,
    /// Dense 1..N rank, derived by the ranking pass.
    #[serde(default)]
    pub position: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ens_name: Option<String>,
    #[serde(default)]
    pub avatar_count: u64,
}

impl WalletStats {
    /// Composite score recomputed from the component groups. Never reads the
    /// stored `total_score`, so re-ranking stays idempotent.
    pub fn composite_score(&self) -> f64 {
        self.scores.total() + self.base_scores.total()
    }

    /// Cached amount summed over all sources.
    pub fn cached_total(&self) -> f64 {
        self.prime_amount_cached + self.base_prime_amount_cached
    }
}

/// One leaderboard entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressRecord {
    pub address: Address,
    pub data: WalletStats,
}

/// One immutable, fully-ranked generation of the leaderboard. Persisted as
/// an ordered JSON list of `{address, data}` objects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    records: Vec<AddressRecord>,
}

impl Snapshot {
    pub fn new(records: Vec<AddressRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in rank order (ascending `position` after a ranking pass).
    pub fn records(&self) -> &[AddressRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<AddressRecord> {
        self.records
    }

    /// Find a record by address. Addresses compare on raw bytes, so any hex
    /// casing of the same address matches.
    pub fn get(&self, address: Address) -> Option<&AddressRecord> {
        self.records.iter().find(|record| record.address == address)
    }
}

/// Untransformed wallet-stats payload, kept as the secondary "original"
/// capture for audit and debugging only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCapture {
    pub address: Address,
    pub data: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn missing_score_groups_default_to_zero() {
        let stats: WalletStats = serde_json::from_value(serde_json::json!({
            "scores": { "prime_score": 10.0 }
        }))
        .unwrap();

        assert_eq!(stats.scores.prime_score, 10.0);
        assert_eq!(stats.scores.community_score, 0.0);
        assert_eq!(stats.base_scores.total(), 0.0);
        assert_eq!(stats.composite_score(), 10.0);
        assert_eq!(stats.cached_total(), 0.0);
    }

    #[test]
    fn address_lookup_is_case_insensitive() {
        let address = Address::from_str("0xAb5801a7D398351b8bE11C439e05C5b3259aeC9B").unwrap();
        let snapshot = Snapshot::new(vec![AddressRecord { address, data: WalletStats::default() }]);

        let lower = Address::from_str("0xab5801a7d398351b8be11c439e05c5b3259aec9b").unwrap();
        assert!(snapshot.get(lower).is_some());
    }

    #[test]
    fn serialized_addresses_are_lower_case() {
        let address = Address::from_str("0xAb5801a7D398351b8bE11C439e05C5b3259aeC9B").unwrap();
        let record = AddressRecord { address, data: WalletStats::default() };
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(
            json["address"].as_str().unwrap(),
            "0xab5801a7d398351b8be11c439e05c5b3259aec9b"
        );
        assert!(json["data"].get("ens_name").is_none());
    }
}
