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

//! NFT ownership feed used for avatar-holding counts.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use alloy::primitives::Address;
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::fetcher::RateLimitedFetcher;

#[derive(Debug, Deserialize)]
struct OwnersResponse {
    #[serde(default)]
    owners: Vec<OwnerEntry>,
}

#[derive(Debug, Deserialize)]
struct OwnerEntry {
    #[serde(rename = "ownerAddress")]
    owner_address: String,
    #[serde(rename = "tokenBalances", default)]
    token_balances: Vec<TokenBalance>,
}

#[derive(Debug, Deserialize)]
struct TokenBalance {
    #[serde(default)]
    balance: Value,
}

/// Client for the NFT-ownership endpoint of the avatar collection.
pub struct AvatarClient {
    fetcher: Arc<RateLimitedFetcher>,
    base: String,
    contract: Address,
}

impl AvatarClient {
    pub fn new(fetcher: Arc<RateLimitedFetcher>, base: Url, contract: Address) -> Self {
        Self { fetcher, base: base.as_str().trim_end_matches('/').to_string(), contract }
    }

    /// Owner address to summed token balance for the avatar contract.
    /// Owners with unparseable addresses are skipped.
    pub async fn fetch_owner_balances(&self) -> Result<HashMap<Address, u64>> {
        let url = format!(
            "{}/getOwnersForContract?contractAddress={:#x}&withTokenBalances=true",
            self.base, self.contract
        );
        let payload =
            self.fetcher.get_json(&url).await.context("owner lookup request failed")?;
        let response: OwnersResponse =
            serde_json::from_value(payload).context("failed to decode owner list")?;

        let mut balances = HashMap::new();
        for owner in response.owners {
            let Ok(address) = Address::from_str(&owner.owner_address) else {
                continue;
            };
            let held: u64 =
                owner.token_balances.iter().map(|token| balance_value(&token.balance)).sum();
            *balances.entry(address).or_insert(0) += held;
        }
        tracing::debug!("avatar contract has {} holders", balances.len());
        Ok(balances)
    }
}

/// Providers serve balances as either JSON numbers or decimal strings.
fn balance_value(value: &Value) -> u64 {
    match value {
        Value::Number(number) => number.as_u64().unwrap_or(0),
        Value::String(text) => text.parse().unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::time::Duration;

    #[test]
    fn balances_parse_from_numbers_and_strings() {
        assert_eq!(balance_value(&serde_json::json!(3)), 3);
        assert_eq!(balance_value(&serde_json::json!("12")), 12);
        assert_eq!(balance_value(&serde_json::json!("junk")), 0);
        assert_eq!(balance_value(&serde_json::json!(null)), 0);
    }

    #[tokio::test]
    async fn owner_balances_are_summed_per_address() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/nft/getOwnersForContract")
                    .query_param("withTokenBalances", "true");
                then.status(200).json_body(serde_json::json!({
                    "owners": [
                        {
                            "ownerAddress": "0x0000000000000000000000000000000000000001",
                            "tokenBalances": [ { "balance": "2" }, { "balance": 1 } ]
                        },
                        {
                            "ownerAddress": "not-an-address",
                            "tokenBalances": [ { "balance": "5" } ]
                        }
                    ]
                }));
            })
            .await;

        let fetcher = Arc::new(RateLimitedFetcher::new(2, Duration::from_secs(5)).unwrap());
        let client = AvatarClient::new(
            fetcher,
            Url::parse(&server.url("/nft")).unwrap(),
            Address::ZERO,
        );

        let balances = client.fetch_owner_balances().await.unwrap();
        assert_eq!(balances.len(), 1);
        let holder = Address::from_str("0x0000000000000000000000000000000000000001").unwrap();
        assert_eq!(balances[&holder], 3);
    }
}
