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

//! Batched diagnostic reporting.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::config::NotifierConfig;

const DEFAULT_ERROR_BATCH_SIZE: usize = 10;
/// Per-category sample size inside one report.
const REPORT_SAMPLE: usize = 5;
/// Transport message size cap.
const MESSAGE_LIMIT: usize = 4000;

#[derive(Default)]
struct PendingErrors {
    by_category: BTreeMap<String, Vec<(String, String)>>,
    count: usize,
}

/// Accumulates categorized errors and flushes them as one formatted report
/// once the batch threshold is reached, so a noisy run produces a handful of
/// messages instead of thousands.
///
/// Delivery is strictly best-effort: failures are logged at debug and
/// dropped, never propagated, and never block the pipeline. Without a
/// configured transport the reports only reach the logs.
pub struct ErrorReporter {
    client: reqwest::Client,
    config: Option<NotifierConfig>,
    pending: Mutex<PendingErrors>,
}

impl ErrorReporter {
    pub fn new(config: Option<NotifierConfig>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            pending: Mutex::new(PendingErrors::default()),
        }
    }

    fn batch_size(&self) -> usize {
        self.config
            .as_ref()
            .map(|config| config.error_batch_size.max(1))
            .unwrap_or(DEFAULT_ERROR_BATCH_SIZE)
    }

    /// Record one error; flushes automatically at the batch threshold.
    pub async fn record(&self, category: &str, identifier: String, detail: String) {
        let should_flush = {
            let mut pending = self.pending.lock().await;
            pending
                .by_category
                .entry(category.to_string())
                .or_default()
                .push((identifier, detail));
            pending.count += 1;
            pending.count >= self.batch_size()
        };
        if should_flush {
            self.flush().await;
        }
    }

    /// Send whatever is pending, if anything.
    pub async fn flush(&self) {
        let pending = {
            let mut guard = self.pending.lock().await;
            std::mem::take(&mut *guard)
        };
        if pending.count == 0 {
            return;
        }

        let mut message = format!("Error report ({} total):\n", pending.count);
        for (category, errors) in &pending.by_category {
            message.push_str(&format!("\n{} ({} occurrences):\n", category, errors.len()));
            for (identifier, detail) in errors.iter().take(REPORT_SAMPLE) {
                message.push_str(&format!("  - {identifier}: {detail}\n"));
            }
            if errors.len() > REPORT_SAMPLE {
                message.push_str(&format!("  ... and {} more\n", errors.len() - REPORT_SAMPLE));
            }
        }
        message.truncate(MESSAGE_LIMIT);
        tracing::warn!("{message}");

        let Some(config) = &self.config else {
            return;
        };
        let url = format!("https://api.telegram.org/bot{}/sendMessage", config.bot_token);
        let body = serde_json::json!({ "chat_id": config.chat_id, "text": message });
        let request = self.client.post(&url).json(&body).timeout(Duration::from_secs(10));
        match request.send().await {
            Ok(response) if !response.status().is_success() => {
                tracing::debug!("diagnostic report rejected: HTTP {}", response.status());
            }
            Ok(_) => {}
            Err(err) => tracing::debug!("diagnostic report delivery failed: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn flush_without_pending_errors_is_a_no_op() {
        let reporter = ErrorReporter::new(None);
        reporter.flush().await;
    }

    #[tokio::test]
    async fn pending_errors_clear_after_flush() {
        let reporter = ErrorReporter::new(None);
        reporter.record("wallet stats fetch", "0xabc".into(), "HTTP 500".into()).await;
        reporter.record("wallet stats fetch", "0xdef".into(), "timeout".into()).await;
        reporter.flush().await;

        let pending = reporter.pending.lock().await;
        assert_eq!(pending.count, 0);
        assert!(pending.by_category.is_empty());
    }

    #[tokio::test]
    async fn threshold_triggers_an_automatic_flush() {
        let reporter = ErrorReporter::new(None);
        for index in 0..DEFAULT_ERROR_BATCH_SIZE {
            reporter.record("rpc", format!("chunk-{index}"), "boom".into()).await;
        }

        // The tenth record crossed the threshold and drained the buffer.
        let pending = reporter.pending.lock().await;
        assert_eq!(pending.count, 0);
    }
}
