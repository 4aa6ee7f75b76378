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

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const SIZE_IN_MB: f64 = 1024.0 * 1024.0;
pub const SIZE_IN_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Streaming requests above this body size must not be sent.
pub const MAX_STREAMING_SIZE: u64 = 10 * 1024 * 1024;
/// Staged block size for blob uploads.
pub const BLOB_BLOCK_SIZE: usize = 4 * 1024 * 1024;
/// Bodies up to this size go out as a single PUT, larger ones are staged in blocks.
pub const BLOB_SINGLE_SHOT_MAX_SIZE: usize = 256 * 1024 * 1024;

pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
pub const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);
pub const BLOB_UPLOAD_TIMEOUT: Duration = Duration::from_secs(3600);

pub const DEFAULT_CONFIG_REFRESH_INTERVAL: Duration = Duration::from_secs(3600);
pub const QUEUE_POST_ATTEMPTS: u32 = 3;

/// Server-side size hint multiplier for compressed blobs.
pub const COMPRESSION_EXPANSION_FACTOR: u64 = 11;

pub const THROTTLE_BACKOFF: Duration = Duration::from_secs(10);
pub const STREAMING_DISABLED_BACKOFF: Duration = Duration::from_secs(15 * 60);
pub const STREAMING_RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
];
pub const STREAMING_JITTER_MAX_MS: u64 = 1000;

/// Which storage surface an uploader should stage into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadPreference {
    /// Follow the server hint, then storage, then lake.
    #[default]
    Default,
    Storage,
    Lake,
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Fan-out width for batch uploads.
    pub max_concurrency: usize,
    /// Per-source size ceiling for staged uploads, in bytes.
    pub max_data_size: u64,
    /// Skip the `max_data_size` check.
    pub ignore_size_limit: bool,
    pub upload_method: UploadPreference,
    /// Multiplier applied to `MAX_STREAMING_SIZE` when deciding stream vs queue.
    pub data_size_factor: f64,
    /// When false, a cluster-level streaming outage is surfaced as an error
    /// instead of silently falling back to queued ingestion.
    pub continue_when_streaming_unavailable: bool,
    pub config_refresh_interval: Duration,
    /// Worker ceiling for block PUTs within one upload.
    pub cpu_num: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            max_data_size: 4 * 1024 * 1024 * 1024,
            ignore_size_limit: false,
            upload_method: UploadPreference::Default,
            data_size_factor: 1.0,
            continue_when_streaming_unavailable: false,
            config_refresh_interval: DEFAULT_CONFIG_REFRESH_INTERVAL,
            cpu_num: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

impl IngestConfig {
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.max_concurrency == 0 {
            return Err(anyhow::anyhow!("max_concurrency must be greater than 0"));
        }
        if self.max_data_size == 0 {
            return Err(anyhow::anyhow!("max_data_size must be greater than 0"));
        }
        if self.data_size_factor <= 0.0 {
            return Err(anyhow::anyhow!("data_size_factor must be greater than 0"));
        }
        if self.config_refresh_interval.is_zero() {
            return Err(anyhow::anyhow!(
                "config_refresh_interval must be greater than 0"
            ));
        }
        Ok(())
    }

    /// Streaming size threshold after applying the configured factor.
    pub fn streaming_threshold(&self) -> u64 {
        (MAX_STREAMING_SIZE as f64 * self.data_size_factor) as u64
    }
}
