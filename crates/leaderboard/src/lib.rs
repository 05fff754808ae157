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

//! Core of the PRIME caching leaderboard: discovery of interacting
//! addresses from on-chain logs, rate-limited enrichment through the
//! wallet-stats API, composite scoring and dense ranking, auxiliary
//! attribute merges, and the query surface over the resulting snapshots.

pub mod aggregate;
pub mod avatars;
pub mod enrichment;
pub mod ens;
pub mod fetcher;
pub mod merge;
pub mod query;
pub mod rpc;
pub mod scanner;
pub mod snapshot;
pub mod types;

pub use aggregate::rank_records;
pub use fetcher::{FetchErrorKind, FetchOutcome, RateLimitedFetcher};
pub use query::{LeaderboardQuery, QueryError};
pub use snapshot::SnapshotStore;
pub use types::{AddressRecord, RawCapture, ScoreComponents, Snapshot, WalletStats};
