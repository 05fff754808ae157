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

//! Read-only queries against one snapshot generation.

use std::collections::HashSet;
use std::str::FromStr;

use alloy::primitives::Address;
use serde::Serialize;

use crate::ens::EnsDirectory;
use crate::types::{AddressRecord, Snapshot};

/// Typed query failures, reported to the caller rather than retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("not found")]
    NotFound,
    #[error("address has no rank in the current snapshot")]
    NoRank,
    #[error("invalid query input: {0}")]
    InvalidInput(String),
}

/// Snapshot-wide totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalTotals {
    pub total_score: f64,
    pub total_prime_cached: f64,
    pub total_addresses: usize,
}

/// Single-address lookup result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddressPosition {
    pub record: AddressRecord,
    pub position: u64,
    pub total_users: usize,
}

/// Multi-address lookup result. The found group is treated as one entrant:
/// its scores are summed into a pseudo-score and ranked against everyone
/// outside the group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CombinedPosition {
    pub total_score: f64,
    pub total_prime_cached: f64,
    pub position: u64,
    pub total_users: usize,
    pub addresses_found: usize,
    pub addresses_not_found: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardPage {
    pub entries: Vec<AddressRecord>,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub total_addresses: usize,
}

/// Result of a position search: the resolved rank plus every record up to
/// the next round-number milestone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionSearch {
    pub address: Address,
    pub rank: u64,
    pub next_round_number: u64,
    pub entries: Vec<AddressRecord>,
}

/// Query surface over one snapshot generation and the ENS directory. Borrows
/// both; a pipeline replace swaps in a new generation without touching the
/// one a query is reading.
pub struct LeaderboardQuery<'a> {
    snapshot: &'a Snapshot,
    ens: &'a EnsDirectory,
}

impl<'a> LeaderboardQuery<'a> {
    pub fn new(snapshot: &'a Snapshot, ens: &'a EnsDirectory) -> Self {
        Self { snapshot, ens }
    }

    /// Score and cached-amount totals across the whole snapshot.
    pub fn global_totals(&self) -> GlobalTotals {
        let mut totals = GlobalTotals {
            total_score: 0.0,
            total_prime_cached: 0.0,
            total_addresses: self.snapshot.len(),
        };
        for record in self.snapshot.records() {
            totals.total_score += record.data.composite_score();
            totals.total_prime_cached += record.data.cached_total();
        }
        totals
    }

    /// Find one address. Absence is a valid result, not an error.
    pub fn lookup_one(&self, address: Address) -> Option<AddressPosition> {
        let record = self.snapshot.get(address)?;
        Some(AddressPosition {
            record: record.clone(),
            position: record.data.position,
            total_users: self.snapshot.len(),
        })
    }

    /// Combined lookup over several addresses.
    ///
    /// A single requested-and-found address reports its stored rank, which
    /// keeps this query consistent with [`lookup_one`] under score ties. For
    /// larger groups the position is 1 plus the number of records outside
    /// the requested set whose score beats the group's summed pseudo-score.
    pub fn lookup_many(&self, addresses: &[Address]) -> CombinedPosition {
        let found: Vec<&AddressRecord> =
            addresses.iter().filter_map(|&address| self.snapshot.get(address)).collect();
        let total_score: f64 = found.iter().map(|record| record.data.composite_score()).sum();
        let total_prime_cached: f64 =
            found.iter().map(|record| record.data.cached_total()).sum();

        let position = if addresses.len() == 1 {
            match found.first() {
                Some(record) => record.data.position,
                // An unknown single address reports the last position.
                None => self.snapshot.len() as u64,
            }
        } else {
            let requested: HashSet<Address> = addresses.iter().copied().collect();
            let outscored = self
                .snapshot
                .records()
                .iter()
                .filter(|record| !requested.contains(&record.address))
                .filter(|record| record.data.composite_score() > total_score)
                .count() as u64;
            outscored + 1
        };

        CombinedPosition {
            total_score,
            total_prime_cached,
            position,
            total_users: self.snapshot.len().saturating_sub(addresses.len()) + 1,
            addresses_found: found.len(),
            addresses_not_found: addresses.len() - found.len(),
        }
    }

    /// One page of the leaderboard, rank ascending, 1-based page numbers.
    pub fn leaderboard_page(
        &self,
        page: usize,
        page_size: usize,
    ) -> Result<LeaderboardPage, QueryError> {
        if page == 0 || page_size == 0 {
            return Err(QueryError::InvalidInput(
                "page and page_size must be positive".to_string(),
            ));
        }
        let records = self.snapshot.records();
        let start = (page - 1).saturating_mul(page_size).min(records.len());
        let end = (start + page_size).min(records.len());
        Ok(LeaderboardPage {
            entries: records[start..end].to_vec(),
            page,
            page_size,
            total_pages: records.len().div_ceil(page_size),
            total_addresses: records.len(),
        })
    }

    /// Resolve a query (a name in the ENS convention, or a raw address) to
    /// its rank and return everything up to the next multiple of ten, so the
    /// caller sees the whole run-up to the next milestone.
    pub fn search_position(&self, query: &str) -> Result<PositionSearch, QueryError> {
        let query = query.trim();
        let address = if query.to_ascii_lowercase().ends_with(".eth") {
            self.ens.resolve_name(query).ok_or(QueryError::NotFound)?
        } else {
            Address::from_str(query).map_err(|_| {
                QueryError::InvalidInput(format!("{query:?} is not an address or ENS name"))
            })?
        };

        let record = self.snapshot.get(address).ok_or(QueryError::NoRank)?;
        let rank = record.data.position;
        if rank == 0 {
            return Err(QueryError::NoRank);
        }

        let next_round_number = rank.div_ceil(10) * 10;
        let entries = self
            .snapshot
            .records()
            .iter()
            .filter(|entry| entry.data.position <= next_round_number)
            .cloned()
            .collect();

        Ok(PositionSearch { address, rank, next_round_number, entries })
    }
}
