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

use async_trait::async_trait;
use config::{
    IngestConfig,
    meta::{
        operation::{
            BlobStatus, IngestKind, IngestResponse, IngestionOperation, OperationStatus,
            OperationSummary,
        },
        properties::IngestProperties,
        source::{CompressionType, Source},
    },
};
use infra::{
    cache::{ConfigurationCache, HttpConfigFetcher},
    client::{API_VERSION, HEADER_API_VERSION, auth::TokenCredential, get_http_client},
    errors::*,
    queue::{Queue, QueueMessage, default_retry_policy, post_to_any, raw_data_size, rest::RestQueue},
    retry::RetryPolicy,
    storage::{Uploader, remote::{BlobStore, HttpBlobStore}},
};

use crate::{common::api, service::tracking::{self, StatusProvider}};

/// Reliable channel: stage the payload in cloud storage, then signal the
/// engine through its ingestion queue. Asynchronous but trackable.
pub struct QueuedIngestClient {
    dm_endpoint: String,
    credential: Arc<dyn TokenCredential>,
    cache: Arc<ConfigurationCache>,
    uploader: Uploader,
    queue: Arc<dyn Queue>,
    queue_retry: RetryPolicy,
}

impl QueuedIngestClient {
    pub fn new(
        dm_endpoint: impl Into<String>,
        credential: Arc<dyn TokenCredential>,
        config: IngestConfig,
    ) -> Result<Self> {
        let dm_endpoint = dm_endpoint.into();
        let cache = Arc::new(ConfigurationCache::new(
            Box::new(HttpConfigFetcher::new(&dm_endpoint, credential.clone())),
            config.config_refresh_interval,
        ));
        let store = Arc::new(HttpBlobStore::new(config.cpu_num));
        Self::from_parts(
            dm_endpoint,
            credential,
            cache,
            store,
            Arc::new(RestQueue::new()),
            config,
        )
    }

    /// Wiring constructor; lets callers substitute any of the seams.
    pub fn from_parts(
        dm_endpoint: impl Into<String>,
        credential: Arc<dyn TokenCredential>,
        cache: Arc<ConfigurationCache>,
        store: Arc<dyn BlobStore>,
        queue: Arc<dyn Queue>,
        config: IngestConfig,
    ) -> Result<Self> {
        config.validate().map_err(|e| {
            IngestError::permanent(ErrorCategory::ConfigurationUnavailable, e.to_string())
        })?;
        let uploader = Uploader::new(cache.clone(), store, config).with_credential(credential.clone());
        Ok(Self {
            dm_endpoint: dm_endpoint.into(),
            credential,
            cache,
            uploader,
            queue,
            queue_retry: default_retry_policy(),
        })
    }

    /// Direct access to the staging uploader, e.g. for batch staging through
    /// [`Uploader::upload_many`].
    pub fn uploader(&self) -> &Uploader {
        &self.uploader
    }

    pub async fn ingest(
        &self,
        database: &str,
        table: &str,
        source: &Source,
        props: &IngestProperties,
    ) -> Result<IngestResponse> {
        let staged;
        let remote = if source.is_local() {
            staged = self
                .uploader
                .upload_one(source, &format!("{database}__{table}"))
                .await?;
            &staged
        } else {
            source
        };
        let Source::Remote { url: blob_url, .. } = remote else {
            return Err(IngestError::permanent(
                ErrorCategory::UploadFailed,
                "staging produced no remote source",
            ));
        };

        let topology = self.cache.get().await?;
        let auth_context = topology.authorization_context.clone().unwrap_or_default();

        let mut message = QueueMessage::new(blob_url.clone(), database, table);
        // prefer the caller's raw size, then the uncompressed local size; the
        // expansion heuristic only kicks in for opaque compressed blobs
        let explicit = props.raw_size.or_else(|| {
            (source.compression() == CompressionType::None)
                .then(|| source.size().ok().flatten())
                .flatten()
        });
        message.raw_data_size = raw_data_size(blob_url, source.size().ok().flatten(), explicit);
        message.retain_blob_on_success = props.retain_blob_on_success;
        message.flush_immediately = props.skip_batching;
        message.report_level = if props.enable_tracking { 2 } else { 0 };
        message.additional_properties = props.additional_properties(&auth_context, source.format());

        post_to_any(
            self.queue.as_ref(),
            &self.cache,
            &message,
            &self.queue_retry,
        )
        .await?;

        Ok(IngestResponse {
            operation: IngestionOperation {
                operation_id: message.id,
                database: database.to_string(),
                table: table.to_string(),
                kind: IngestKind::Queued,
            },
            blob_url: Some(blob_url.clone()),
        })
    }

    pub async fn operation_details(
        &self,
        operation: &IngestionOperation,
    ) -> Result<Vec<BlobStatus>> {
        self.fetch_status(operation).await
    }

    pub async fn operation_summary(
        &self,
        operation: &IngestionOperation,
    ) -> Result<OperationSummary> {
        let details = self.fetch_status(operation).await?;
        Ok(OperationSummary::from_statuses(&details))
    }

    pub async fn poll_for_completion(
        &self,
        operation: &IngestionOperation,
        interval: Duration,
        timeout: Duration,
    ) -> Result<OperationStatus> {
        tracking::poll_for_completion(self, operation, interval, timeout, None).await
    }
}

#[async_trait]
impl StatusProvider for QueuedIngestClient {
    async fn fetch_status(&self, operation: &IngestionOperation) -> Result<Vec<BlobStatus>> {
        if operation.kind == IngestKind::Streaming {
            log::warn!(
                "operation {} used streaming ingestion and is not trackable",
                operation.operation_id
            );
            return Ok(Vec::new());
        }
        let token = self.credential.get_token(&[&self.dm_endpoint]).await?;
        let url = api::operation_status_url(&self.dm_endpoint, &operation.operation_id);
        let resp = get_http_client()
            .get(&url)
            .header(HEADER_API_VERSION, API_VERSION)
            .header("Authorization", token.header_value())
            .send()
            .await?;
        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(IngestError::permanent(
                ErrorCategory::AuthorizationFailure,
                format!("status query denied: http {status}"),
            ));
        }
        if !status.is_success() {
            return Err(IngestError {
                category: ErrorCategory::Network,
                message: format!("status query failed: http {status}"),
                permanent: status.is_client_error(),
                source: None,
            });
        }
        resp.json::<Vec<BlobStatus>>().await.map_err(|e| {
            IngestError::permanent(ErrorCategory::ParseFailure, e.to_string()).with_source(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use config::{meta::source::Format, utils::json};
    use infra::{
        cache::{ConfigFetcher, Container, IngestionTopology, UploadMethod},
        client::auth::{AccessToken, ConstTokenCredential},
        queue::fake::FakeQueue,
        storage::fake::FakeBlobStore,
    };

    use super::*;

    struct StaticFetcher(IngestionTopology);

    #[async_trait]
    impl ConfigFetcher for StaticFetcher {
        async fn fetch(&self) -> Result<IngestionTopology> {
            Ok(self.0.clone())
        }
    }

    fn test_topology() -> IngestionTopology {
        IngestionTopology {
            containers: vec![Container {
                url: "https://store0.blob.example/staging?sig=s0".to_string(),
                method: UploadMethod::Storage,
            }],
            queues: vec!["https://account0.queue.example/rq?sig=q0".to_string()],
            authorization_context: Some("auth-ctx-42".to_string()),
            ..Default::default()
        }
    }

    fn test_client(
        store: Arc<FakeBlobStore>,
        queue: Arc<FakeQueue>,
    ) -> QueuedIngestClient {
        let cache = Arc::new(ConfigurationCache::new(
            Box::new(StaticFetcher(test_topology())),
            Duration::from_secs(3600),
        ));
        let credential = Arc::new(ConstTokenCredential::new(AccessToken::bearer("t")));
        QueuedIngestClient::from_parts(
            "https://ingest-acme.example.com",
            credential,
            cache,
            store,
            queue,
            IngestConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_local_source_staged_and_queued() {
        let store = Arc::new(FakeBlobStore::new());
        let queue = Arc::new(FakeQueue::new());
        let client = test_client(store.clone(), queue.clone());

        let source = Source::from_bytes(&b"a,b\n1,2\n"[..], Format::Csv);
        let resp = client
            .ingest("db1", "t1", &source, &IngestProperties::default())
            .await
            .unwrap();

        assert_eq!(resp.operation.kind, IngestKind::Queued);
        assert!(!resp.operation.operation_id.is_empty());
        assert_eq!(store.put_count(), 1);
        assert_eq!(queue.post_count(), 1);

        let blobs = store.blobs.lock();
        assert!(blobs[0].name.starts_with("db1__t1/"));

        let (_, body) = queue.messages.lock()[0].clone();
        let msg: json::Value = json::from_slice(&body).unwrap();
        assert_eq!(msg["databaseName"], "db1");
        assert_eq!(msg["tableName"], "t1");
        assert_eq!(msg["blobPath"], resp.blob_url.clone().unwrap());
        // uncompressed local size is the hint, not the expansion heuristic
        assert_eq!(msg["rawDataSize"], 8);
        assert_eq!(msg["additionalProperties"]["authorizationContext"], "auth-ctx-42");
        assert_eq!(msg["additionalProperties"]["format"], "csv");
    }

    #[tokio::test]
    async fn test_remote_source_skips_upload() {
        let store = Arc::new(FakeBlobStore::new());
        let queue = Arc::new(FakeQueue::new());
        let client = test_client(store.clone(), queue.clone());

        let source = Source::from_url("https://other.blob.example/x.csv.gz?sig=z", Format::Csv);
        let resp = client
            .ingest("db1", "t1", &source, &IngestProperties::default())
            .await
            .unwrap();

        assert_eq!(store.put_count(), 0);
        assert_eq!(queue.post_count(), 1);
        assert_eq!(
            resp.blob_url.as_deref(),
            Some("https://other.blob.example/x.csv.gz?sig=z")
        );
    }

    #[tokio::test]
    async fn test_properties_flow_into_message() {
        let store = Arc::new(FakeBlobStore::new());
        let queue = Arc::new(FakeQueue::new());
        let client = test_client(store, queue.clone());

        let props = IngestProperties {
            enable_tracking: true,
            skip_batching: true,
            raw_size: Some(9999),
            ..Default::default()
        }
        .with_mapping_reference("m1");
        let source = Source::from_bytes(&b"{\"a\":1}"[..], Format::Json);
        client.ingest("db1", "t1", &source, &props).await.unwrap();

        let (_, body) = queue.messages.lock()[0].clone();
        let msg: json::Value = json::from_slice(&body).unwrap();
        assert_eq!(msg["reportLevel"], 2);
        assert_eq!(msg["flushImmediately"], true);
        assert_eq!(msg["rawDataSize"], 9999);
        assert_eq!(
            msg["additionalProperties"]["ingestionMappingReference"],
            "m1"
        );
    }

    #[tokio::test]
    async fn test_streaming_operation_not_trackable() {
        let client = test_client(Arc::new(FakeBlobStore::new()), Arc::new(FakeQueue::new()));
        let operation = IngestionOperation {
            operation_id: "op-s".to_string(),
            database: "db".to_string(),
            table: "t".to_string(),
            kind: IngestKind::Streaming,
        };
        // empty result with a warning, not an error, and no HTTP issued
        let details = client.operation_details(&operation).await.unwrap();
        assert!(details.is_empty());
        let summary = client.operation_summary(&operation).await.unwrap();
        assert!(summary.is_complete());
    }
}
