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

//! Composite scoring and rank assignment.

use crate::types::AddressRecord;

/// Rank a record set: recompute composite scores from their component
/// groups, derive each record's share of the total, and assign dense 1..N
/// positions in descending score order.
///
/// Pure and idempotent: the derived fields (`total_score`, `percentage`,
/// `position`) are recomputed from the components on every call, so running
/// the pass over its own output reproduces the same sequence. The sort is
/// stable; records with equal scores keep their input order, which makes the
/// ordering bit-reproducible for a given input order.
pub fn rank_records(mut records: Vec<AddressRecord>) -> Vec<AddressRecord> {
    for record in &mut records {
        record.data.total_score = record.data.composite_score();
    }

    let total_all_scores: f64 = records.iter().map(|record| record.data.total_score).sum();
    for record in &mut records {
        record.data.percentage = if total_all_scores > 0.0 {
            record.data.total_score / total_all_scores * 100.0
        } else {
            0.0
        };
    }

    records.sort_by(|a, b| b.data.total_score.total_cmp(&a.data.total_score));
    for (index, record) in records.iter_mut().enumerate() {
        record.data.position = index as u64 + 1;
    }

    records
}
