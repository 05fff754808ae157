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

//! Raw JSON-RPC access to per-chain log providers.

use std::sync::Arc;

use alloy::primitives::Address;
use anyhow::Context;
use serde::Deserialize;
use serde_json::json;

use crate::fetcher::RateLimitedFetcher;

/// A single log entry as returned by `eth_getLogs`. Only the topics are
/// consumed; everything else the provider returns is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct LogEntry {
    #[serde(default)]
    pub topics: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// JSON-RPC 2.0 client routed through the shared RPC-class fetcher, so log
/// queries across all chains share one in-flight cap.
pub struct RpcClient {
    fetcher: Arc<RateLimitedFetcher>,
}

impl RpcClient {
    pub fn new(fetcher: Arc<RateLimitedFetcher>) -> Self {
        Self { fetcher }
    }

    /// Current head block number of the chain behind `rpc_url`.
    pub async fn get_block_number(&self, rpc_url: &str) -> anyhow::Result<u64> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_blockNumber",
            "params": [],
        });
        let result = self.call(rpc_url, payload).await?;
        let hex_block = result.as_str().context("eth_blockNumber result is not a string")?;
        parse_hex_u64(hex_block)
    }

    /// Logs emitted by `contract` within the inclusive block range.
    pub async fn get_logs(
        &self,
        rpc_url: &str,
        contract: Address,
        from_block: u64,
        to_block: u64,
    ) -> anyhow::Result<Vec<LogEntry>> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_getLogs",
            "params": [{
                "fromBlock": format!("{from_block:#x}"),
                "toBlock": format!("{to_block:#x}"),
                "address": format!("{contract:#x}"),
            }],
        });
        let result = self.call(rpc_url, payload).await?;
        serde_json::from_value(result).context("failed to decode eth_getLogs result")
    }

    async fn call(
        &self,
        rpc_url: &str,
        payload: serde_json::Value,
    ) -> anyhow::Result<serde_json::Value> {
        let body = self.fetcher.post_json(rpc_url, &payload).await?;
        let envelope: RpcEnvelope =
            serde_json::from_value(body).context("malformed JSON-RPC response")?;
        if let Some(err) = envelope.error {
            anyhow::bail!("rpc error {}: {}", err.code, err.message);
        }
        envelope.result.context("rpc response carries neither result nor error")
    }
}

fn parse_hex_u64(value: &str) -> anyhow::Result<u64> {
    let digits = value.trim_start_matches("0x");
    u64::from_str_radix(digits, 16).with_context(|| format!("invalid hex quantity {value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::time::Duration;

    fn client() -> RpcClient {
        RpcClient::new(Arc::new(
            RateLimitedFetcher::new(4, Duration::from_secs(5)).unwrap(),
        ))
    }

    #[test]
    fn hex_quantities_parse() {
        assert_eq!(parse_hex_u64("0xfa").unwrap(), 250);
        assert_eq!(parse_hex_u64("0x0").unwrap(), 0);
        assert!(parse_hex_u64("latest").is_err());
    }

    #[tokio::test]
    async fn block_number_round_trips() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/rpc").json_body_partial(
                    r#"{ "method": "eth_blockNumber" }"#,
                );
                then.status(200)
                    .json_body(serde_json::json!({ "jsonrpc": "2.0", "id": 1, "result": "0x1388" }));
            })
            .await;

        let head = client().get_block_number(&server.url("/rpc")).await.unwrap();
        assert_eq!(head, 5000);
    }

    #[tokio::test]
    async fn rpc_error_objects_are_surfaced() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/rpc");
                then.status(200).json_body(serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": 1,
                    "error": { "code": -32005, "message": "query returned more than 10000 results" }
                }));
            })
            .await;

        let err = client().get_block_number(&server.url("/rpc")).await.unwrap_err();
        assert!(err.to_string().contains("-32005"));
    }
}
