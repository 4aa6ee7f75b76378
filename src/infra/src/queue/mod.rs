// Copyright 2025 OpenObserve Inc.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use config::{COMPRESSION_EXPANSION_FACTOR, QUEUE_POST_ATTEMPTS, ider, utils::json};
use serde::{Deserialize, Serialize};

use crate::{cache::ConfigurationCache, errors::*, retry::RetryPolicy};

pub mod fake;
pub mod rest;

/// Seam for posting ingestion messages. [`rest::RestQueue`] is the production
/// implementation.
#[async_trait]
pub trait Queue: Send + Sync {
    async fn post(&self, queue_url: &str, message: Bytes) -> Result<()>;
}

/// The message that tells the engine to pull a staged blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueMessage {
    pub id: String,
    pub blob_path: String,
    pub database_name: String,
    pub table_name: String,
    /// Uncompressed size hint for the engine's batching policy.
    pub raw_data_size: u64,
    pub retain_blob_on_success: bool,
    pub flush_immediately: bool,
    /// 0 = report failures only, 2 = failures and successes.
    pub report_level: u8,
    /// 0 = report to the status tables.
    pub report_method: u8,
    pub source_message_creation_time: DateTime<Utc>,
    pub additional_properties: json::Map<String, json::Value>,
}

impl QueueMessage {
    pub fn new(
        blob_path: impl Into<String>,
        database: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            id: ider::uuid(),
            blob_path: blob_path.into(),
            database_name: database.into(),
            table_name: table.into(),
            raw_data_size: 0,
            retain_blob_on_success: true,
            flush_immediately: false,
            report_level: 0,
            report_method: 0,
            source_message_creation_time: Utc::now(),
            additional_properties: json::Map::new(),
        }
    }
}

/// Size hint for the engine: an explicit caller value wins, otherwise the
/// blob length, expanded by a crude factor when the path looks compressed.
pub fn raw_data_size(blob_path: &str, blob_len: Option<u64>, explicit: Option<u64>) -> u64 {
    if let Some(n) = explicit {
        return n;
    }
    let Some(len) = blob_len else {
        return 0;
    };
    let base = blob_path
        .split('?')
        .next()
        .unwrap_or(blob_path)
        .to_lowercase();
    if base.ends_with(".gz") || base.ends_with(".zip") {
        len * COMPRESSION_EXPANSION_FACTOR
    } else {
        len
    }
}

pub fn default_retry_policy() -> RetryPolicy {
    RetryPolicy::Custom {
        intervals: vec![
            std::time::Duration::from_millis(500);
            (QUEUE_POST_ATTEMPTS as usize).saturating_sub(1)
        ],
    }
}

/// Posts the message to one of the topology's queues, cycling across queue
/// accounts on transient failures.
pub async fn post_to_any(
    queue: &dyn Queue,
    cache: &ConfigurationCache,
    message: &QueueMessage,
    policy: &RetryPolicy,
) -> Result<()> {
    let topology = cache.get().await?;
    if topology.queues.is_empty() {
        return Err(IngestError::permanent(
            ErrorCategory::QueuePostFailed,
            "ingestion topology has no queues",
        ));
    }
    let body = Bytes::from(json::to_vec(message).map_err(|e| {
        IngestError::permanent(ErrorCategory::ParseFailure, e.to_string()).with_source(e)
    })?);

    let mut index = cache.next_queue_index(topology.queues.len());
    let mut attempt = 0u32;
    loop {
        let queue_url = &topology.queues[index];
        match queue.post(queue_url, body.clone()).await {
            Ok(()) => {
                log::info!(
                    "queued ingestion message {} for {}.{}",
                    message.id,
                    message.database_name,
                    message.table_name
                );
                return Ok(());
            }
            Err(e) if e.permanent => return Err(e),
            Err(e) => match policy.move_next(attempt) {
                Some(delay) => {
                    log::warn!("queue post attempt {attempt} failed, cycling queue: {e}");
                    attempt += 1;
                    index = (index + 1) % topology.queues.len();
                    tokio::time::sleep(delay).await;
                }
                None => {
                    return Err(IngestError::retries_exhausted(
                        ErrorCategory::QueuePostFailed,
                        e,
                    ));
                }
            },
        }
    }
}
