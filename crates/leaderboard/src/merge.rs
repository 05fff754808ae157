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

//! Auxiliary attribute merges, applied strictly after the ranking pass.
//!
//! Neither attribute influences the ordering, so no re-rank is required
//! after these passes; they must not touch the derived ranking fields.

use std::collections::HashMap;

use alloy::primitives::Address;

use crate::ens::EnsDirectory;
use crate::types::AddressRecord;

/// Fold ENS names into the records. An address absent from the directory has
/// its name cleared rather than left stale.
pub fn merge_ens_names(records: &mut [AddressRecord], directory: &EnsDirectory) {
    for record in records.iter_mut() {
        record.data.ens_name = directory.name_of(record.address).map(str::to_owned);
    }
}

/// Fold NFT holding counts into the records. Addresses without holdings get
/// an explicit 0, never an unset value.
pub fn merge_avatar_counts(records: &mut [AddressRecord], balances: &HashMap<Address, u64>) {
    for record in records.iter_mut() {
        record.data.avatar_count = balances.get(&record.address).copied().unwrap_or(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WalletStats;
    use std::str::FromStr;

    fn addr(tail: u8) -> Address {
        Address::from_str(&format!("0x{:040x}", tail)).unwrap()
    }

    fn ranked_record(tail: u8) -> AddressRecord {
        AddressRecord {
            address: addr(tail),
            data: WalletStats {
                total_score: 40.0,
                percentage: 25.0,
                position: tail as u64,
                ..WalletStats::default()
            },
        }
    }

    #[test]
    fn ens_names_are_set_and_stale_names_cleared() {
        let mut records = vec![ranked_record(1), ranked_record(2)];
        records[1].data.ens_name = Some("stale.eth".to_string());

        let mut directory = EnsDirectory::new();
        directory.insert(addr(1), "fresh.eth".to_string());
        merge_ens_names(&mut records, &directory);

        assert_eq!(records[0].data.ens_name.as_deref(), Some("fresh.eth"));
        assert_eq!(records[1].data.ens_name, None);
    }

    #[test]
    fn avatar_counts_default_to_zero() {
        let mut records = vec![ranked_record(1), ranked_record(2)];
        records[1].data.avatar_count = 9;

        let balances = HashMap::from([(addr(1), 3u64)]);
        merge_avatar_counts(&mut records, &balances);

        assert_eq!(records[0].data.avatar_count, 3);
        assert_eq!(records[1].data.avatar_count, 0);
    }

    #[test]
    fn merges_leave_ranking_fields_untouched() {
        let mut records = vec![ranked_record(1)];
        let mut directory = EnsDirectory::new();
        directory.insert(addr(1), "name.eth".to_string());

        merge_ens_names(&mut records, &directory);
        merge_avatar_counts(&mut records, &HashMap::from([(addr(1), 2u64)]));

        assert_eq!(records[0].data.total_score, 40.0);
        assert_eq!(records[0].data.percentage, 25.0);
        assert_eq!(records[0].data.position, 1);
    }
}
