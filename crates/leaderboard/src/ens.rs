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

//! ENS name directory and its refresh pass.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use alloy::primitives::Address;
use anyhow::{Context, Result};
use futures_util::future::join_all;
use serde_json::Value;
use url::Url;

use crate::fetcher::RateLimitedFetcher;

/// Address-to-name directory with a derived lower-cased inverse index.
/// Persisted as its own JSON object file, independent of the snapshot, and
/// merged into records without triggering re-enrichment.
#[derive(Debug, Clone, Default)]
pub struct EnsDirectory {
    names: HashMap<Address, String>,
    by_name: HashMap<String, Address>,
}

impl EnsDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_names(names: HashMap<Address, String>) -> Self {
        let by_name =
            names.iter().map(|(address, name)| (name.to_lowercase(), *address)).collect();
        Self { names, by_name }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name_of(&self, address: Address) -> Option<&str> {
        self.names.get(&address).map(String::as_str)
    }

    /// Reverse lookup; the query is matched case-insensitively.
    pub fn resolve_name(&self, name: &str) -> Option<Address> {
        self.by_name.get(&name.to_lowercase()).copied()
    }

    pub fn insert(&mut self, address: Address, name: String) {
        if let Some(previous) = self.names.insert(address, name.clone()) {
            self.by_name.remove(&previous.to_lowercase());
        }
        self.by_name.insert(name.to_lowercase(), address);
    }

    pub fn remove(&mut self, address: Address) {
        if let Some(previous) = self.names.remove(&address) {
            self.by_name.remove(&previous.to_lowercase());
        }
    }

    /// Load the directory from disk; a missing file yields an empty
    /// directory.
    pub async fn load(path: &Path) -> Result<Self> {
        match tokio::fs::read(path).await {
            Ok(data) => {
                let names: HashMap<Address, String> = serde_json::from_slice(&data)
                    .with_context(|| format!("failed to decode {}", path.display()))?;
                Ok(Self::from_names(names))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(err) => {
                Err(err).with_context(|| format!("failed to read {}", path.display()))
            }
        }
    }

    /// Persist the directory with the same temp-then-rename discipline as
    /// the snapshot files.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        let data =
            serde_json::to_vec_pretty(&self.names).context("failed to serialize ens directory")?;
        tokio::fs::write(&tmp, &data)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("failed to replace {}", path.display()))?;
        Ok(())
    }
}

/// Refreshes directory entries through the ENS-class HTTP resolver.
pub struct EnsResolver {
    fetcher: Arc<RateLimitedFetcher>,
    base: String,
}

impl EnsResolver {
    pub fn new(fetcher: Arc<RateLimitedFetcher>, base: Url) -> Self {
        Self { fetcher, base: base.as_str().trim_end_matches('/').to_string() }
    }

    /// Resolve names for every address, updating the directory in place. A
    /// null or missing name clears the entry so stale names never linger; a
    /// failed lookup leaves the existing entry untouched. Returns the number
    /// of failed lookups.
    pub async fn refresh(&self, directory: &mut EnsDirectory, addresses: &[Address]) -> usize {
        let mut failures = 0usize;
        for batch in addresses.chunks(50) {
            let outcomes = join_all(batch.iter().map(|&address| async move {
                let url = format!("{}/{address:#x}", self.base);
                (address, self.fetcher.get_json(&url).await)
            }))
            .await;

            for (address, outcome) in outcomes {
                match outcome {
                    Ok(payload) => match payload.get("name").and_then(Value::as_str) {
                        Some(name) if !name.is_empty() => {
                            directory.insert(address, name.to_string())
                        }
                        _ => directory.remove(address),
                    },
                    Err(_) => failures += 1,
                }
            }
        }
        if failures > 0 {
            tracing::warn!("ens refresh: {failures} of {} lookups failed", addresses.len());
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn addr(tail: u8) -> Address {
        Address::from_str(&format!("0x{:040x}", tail)).unwrap()
    }

    #[test]
    fn inverse_index_follows_inserts_and_removes() {
        let mut directory = EnsDirectory::new();
        directory.insert(addr(1), "Vault.Prime.eth".to_string());

        assert_eq!(directory.name_of(addr(1)), Some("Vault.Prime.eth"));
        assert_eq!(directory.resolve_name("vault.prime.eth"), Some(addr(1)));
        assert_eq!(directory.resolve_name("VAULT.PRIME.ETH"), Some(addr(1)));

        directory.insert(addr(1), "other.eth".to_string());
        assert_eq!(directory.resolve_name("vault.prime.eth"), None);
        assert_eq!(directory.resolve_name("other.eth"), Some(addr(1)));

        directory.remove(addr(1));
        assert!(directory.is_empty());
        assert_eq!(directory.resolve_name("other.eth"), None);
    }

    #[tokio::test]
    async fn directory_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ens.json");

        let mut directory = EnsDirectory::new();
        directory.insert(addr(1), "one.eth".to_string());
        directory.insert(addr(2), "two.eth".to_string());
        directory.save(&path).await.unwrap();

        let loaded = EnsDirectory::load(&path).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.name_of(addr(2)), Some("two.eth"));
        assert_eq!(loaded.resolve_name("ONE.eth"), Some(addr(1)));
    }

    #[tokio::test]
    async fn missing_file_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let directory = EnsDirectory::load(&dir.path().join("absent.json")).await.unwrap();
        assert!(directory.is_empty());
    }
}
