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

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use config::{
    IngestConfig,
    meta::source::{CompressionType, Source, StreamBody},
    utils::{size::bytes_to_human_readable, time},
};

use crate::{
    cache::{ConfigurationCache, UploadMethod},
    client::auth::TokenCredential,
    errors::*,
    retry::RetryPolicy,
    storage::{blob_name, gzip_bytes, remote::BlobStore, resolve_method},
};

/// Stages local sources into the topology's containers: validates, compresses
/// where allowed, distributes round-robin and cycles containers on transient
/// failures.
pub struct Uploader {
    cache: Arc<ConfigurationCache>,
    store: Arc<dyn BlobStore>,
    credential: Option<Arc<dyn TokenCredential>>,
    config: IngestConfig,
    retry: RetryPolicy,
}

impl Uploader {
    pub fn new(cache: Arc<ConfigurationCache>, store: Arc<dyn BlobStore>, config: IngestConfig) -> Self {
        Self {
            cache,
            store,
            credential: None,
            config,
            retry: RetryPolicy::Simple {
                total_retries: 2,
                interval: Duration::from_secs(1),
            },
        }
    }

    /// Credential for bearer-token surfaces (lake folders).
    pub fn with_credential(mut self, credential: Arc<dyn TokenCredential>) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Stages one local source and returns its remote counterpart.
    pub async fn upload_one(&self, source: &Source, prefix: &str) -> Result<Source> {
        let (remote, size) = self.stage(source, prefix).await?;
        log::info!(
            "staged source {} ({}) as {}",
            source.name(),
            bytes_to_human_readable(size as f64),
            remote.name(),
        );
        Ok(remote)
    }

    /// Stages many sources, `max_concurrency` at a time. Per-source failures
    /// land in the result instead of failing the batch.
    pub async fn upload_many(&self, sources: &[Source], prefix: &str) -> BatchResult {
        let mut result = BatchResult::default();
        for chunk in sources.chunks(self.config.max_concurrency.max(1)) {
            let records =
                futures::future::join_all(chunk.iter().map(|s| self.record_one(s, prefix))).await;
            for record in records {
                match record {
                    Ok(success) => result.successes.push(success),
                    Err(failure) => result.failures.push(failure),
                }
            }
        }
        result
    }

    /// Releases owned resources. The uploader holds only shared handles, so
    /// dropping is enough; this exists for symmetry with the client surface.
    pub fn close(self) {}

    async fn record_one(
        &self,
        source: &Source,
        prefix: &str,
    ) -> std::result::Result<UploadSuccess, UploadFailure> {
        let started_at = time::now();
        match self.stage(source, prefix).await {
            Ok((remote, size_bytes)) => {
                let blob_url = match &remote {
                    Source::Remote { url, .. } => url.clone(),
                    _ => remote.name(),
                };
                Ok(UploadSuccess {
                    source_name: source.name(),
                    started_at,
                    completed_at: time::now(),
                    blob_url,
                    size_bytes,
                })
            }
            Err(e) => {
                log::error!("staging source {} failed: {e}", source.name());
                Err(UploadFailure {
                    source_name: source.name(),
                    started_at,
                    completed_at: time::now(),
                    error_code: e.category,
                    error_message: e.message.clone(),
                    permanent: e.permanent,
                    cause: e.source.as_ref().map(|c| c.to_string()),
                })
            }
        }
    }

    async fn stage(&self, source: &Source, prefix: &str) -> Result<(Source, u64)> {
        self.validate(source)?;

        let raw = source
            .read_all()
            .await
            .map_err(|e| IngestError::permanent(ErrorCategory::SourceNotReadable, e.to_string()))?;
        if raw.is_empty() {
            return Err(IngestError::permanent(
                ErrorCategory::SourceEmpty,
                format!("source {} is empty", source.name()),
            ));
        }
        if !self.config.ignore_size_limit && raw.len() as u64 > self.config.max_data_size {
            return Err(IngestError::permanent(
                ErrorCategory::SourceTooLarge,
                format!(
                    "source {} is {} bytes, limit is {}",
                    source.name(),
                    raw.len(),
                    self.config.max_data_size
                ),
            ));
        }

        let format = source.format();
        let (body, compression) =
            if source.compression() == CompressionType::None && !format.is_binary() {
                (gzip_bytes(raw).await?, CompressionType::Gzip)
            } else {
                (raw, source.compression())
            };

        let topology = self.cache.get().await?;
        let method = resolve_method(self.config.upload_method, &topology)?;
        let list = topology.list(method);
        let name = blob_name(prefix, source.id(), format, compression);

        let mut index = self.cache.next_index(method, list.len());
        let mut attempt = 0u32;
        let size = body.len() as u64;
        loop {
            let container = &list[index];
            match self.put_once(container, &name, body.clone(), method).await {
                Ok(url) => {
                    let remote = Source::from_url(url, format)
                        .with_compression(compression)
                        .with_id(source.id());
                    return Ok((remote, size));
                }
                Err(e) if e.permanent => return Err(e),
                Err(e) => match self.retry.move_next(attempt) {
                    Some(delay) => {
                        log::warn!(
                            "upload attempt {attempt} to {} failed, cycling container: {e}",
                            container.url.split('?').next().unwrap_or_default(),
                        );
                        attempt += 1;
                        index = (index + 1) % list.len();
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        return Err(IngestError::retries_exhausted(
                            ErrorCategory::UploadFailed,
                            e,
                        ));
                    }
                },
            }
        }
    }

    async fn put_once(
        &self,
        container: &crate::cache::Container,
        name: &str,
        body: Bytes,
        method: UploadMethod,
    ) -> Result<String> {
        let token = match (&self.credential, method) {
            (Some(credential), UploadMethod::Lake) => {
                let (base, _) = container.base_and_query();
                Some(credential.get_token(&[base]).await?)
            }
            _ => None,
        };
        self.store.put(container, name, body, token.as_ref()).await
    }

    fn validate(&self, source: &Source) -> Result<()> {
        if !source.is_local() {
            return Err(IngestError::permanent(
                ErrorCategory::UploadFailed,
                "remote sources are already staged",
            ));
        }
        if let Source::LocalStream {
            body: StreamBody::Reader(slot),
            ..
        } = source
            && slot.try_lock().map(|g| g.is_none()).unwrap_or(false)
        {
            return Err(IngestError::permanent(
                ErrorCategory::SourceNull,
                "source stream was already consumed",
            ));
        }
        let size = source
            .size()
            .map_err(|e| IngestError::permanent(ErrorCategory::SourceNotReadable, e.to_string()))?;
        match size {
            Some(0) => Err(IngestError::permanent(
                ErrorCategory::SourceEmpty,
                format!("source {} is empty", source.name()),
            )),
            Some(n) if !self.config.ignore_size_limit && n > self.config.max_data_size => {
                Err(IngestError::permanent(
                    ErrorCategory::SourceTooLarge,
                    format!(
                        "source {} is {n} bytes, limit is {}",
                        source.name(),
                        self.config.max_data_size
                    ),
                ))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadSuccess {
    pub source_name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub blob_url: String,
    pub size_bytes: u64,
}

#[derive(Debug)]
pub struct UploadFailure {
    pub source_name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub error_code: ErrorCategory,
    pub error_message: String,
    pub permanent: bool,
    pub cause: Option<String>,
}

/// Outcome of [`Uploader::upload_many`]. Never an error as a whole; inspect
/// the component lists.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub successes: Vec<UploadSuccess>,
    pub failures: Vec<UploadFailure>,
}

impl BatchResult {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn total_count(&self) -> usize {
        self.successes.len() + self.failures.len()
    }
}
