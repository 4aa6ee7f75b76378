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

use std::{panic::AssertUnwindSafe, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use config::{
    IngestConfig, STREAMING_DISABLED_BACKOFF, THROTTLE_BACKOFF,
    meta::{
        connection::ConnectionString, operation::IngestResponse, properties::IngestProperties,
        source::Source,
    },
    utils::time,
};
use dashmap::DashMap;
use infra::{
    client::auth::{AccessToken, ConstTokenCredential, TokenCredential},
    errors::*,
    retry::RetryPolicy,
};

use crate::service::{queued::QueuedIngestClient, streaming::StreamingIngestClient};

/// Classification of a failed streaming attempt, derived from the engine's
/// error code and message by intent rather than by exact wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    StreamingDisabledCluster,
    StreamingDisabledTable,
    RequestPropertiesPreventStreaming,
    Throttled,
    PayloadTooLarge,
    Other,
    Unknown,
}

/// Per-table record of the most recent streaming failure. While `reset_at`
/// lies in the future, dispatch skips the streaming attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableBackoff {
    pub reset_at: DateTime<Utc>,
    pub category: FailureCategory,
}

pub fn classify(err: &IngestError) -> FailureCategory {
    let message = err.message.to_lowercase();
    if message.contains("429") || message.contains("too many requests") || message.contains("throttl")
    {
        return FailureCategory::Throttled;
    }
    if message.contains("too large") || message.contains("payload size exceeded") {
        return FailureCategory::PayloadTooLarge;
    }
    if message.contains("streaming") && message.contains("disabled") {
        return if message.contains("table") {
            FailureCategory::StreamingDisabledTable
        } else {
            FailureCategory::StreamingDisabledCluster
        };
    }
    if message.contains("streaming policy") {
        return FailureCategory::StreamingDisabledTable;
    }
    if message.contains("properties")
        && (message.contains("prevent") || message.contains("not supported"))
    {
        return FailureCategory::RequestPropertiesPreventStreaming;
    }
    if !err.permanent {
        return FailureCategory::Other;
    }
    FailureCategory::Unknown
}

#[async_trait]
pub trait StreamingChannel: Send + Sync {
    async fn ingest(
        &self,
        database: &str,
        table: &str,
        source: &Source,
        props: &IngestProperties,
    ) -> Result<IngestResponse>;
}

#[async_trait]
pub trait QueuedChannel: Send + Sync {
    async fn ingest(
        &self,
        database: &str,
        table: &str,
        source: &Source,
        props: &IngestProperties,
    ) -> Result<IngestResponse>;
}

#[async_trait]
impl StreamingChannel for StreamingIngestClient {
    async fn ingest(
        &self,
        database: &str,
        table: &str,
        source: &Source,
        props: &IngestProperties,
    ) -> Result<IngestResponse> {
        StreamingIngestClient::ingest(self, database, table, source, props).await
    }
}

#[async_trait]
impl QueuedChannel for QueuedIngestClient {
    async fn ingest(
        &self,
        database: &str,
        table: &str,
        source: &Source,
        props: &IngestProperties,
    ) -> Result<IngestResponse> {
        QueuedIngestClient::ingest(self, database, table, source, props).await
    }
}

type SuccessCallback = Box<dyn Fn(Duration) + Send + Sync>;
type ErrorCallback = Box<dyn Fn(Duration, bool, FailureCategory, &IngestError) + Send + Sync>;

/// Routes each request between the streaming and queued channels: small
/// payloads try streaming with bounded retries and fall back to queued on
/// channel-level rejections; tables with a recent rejection skip straight to
/// queued until their backoff expires.
pub struct ManagedIngestClient {
    streaming: Arc<dyn StreamingChannel>,
    queued: Arc<dyn QueuedChannel>,
    config: IngestConfig,
    retry: RetryPolicy,
    backoff: DashMap<String, TableBackoff>,
    on_streaming_success: Option<SuccessCallback>,
    on_streaming_error: Option<ErrorCallback>,
}

impl std::fmt::Debug for ManagedIngestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedIngestClient")
            .field("config", &self.config)
            .field("retry", &self.retry)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl ManagedIngestClient {
    /// Builds both channels from a `k=v;` connection string. The string must
    /// carry a user or application token; richer credential flows plug in
    /// through [`ManagedIngestClient::new`] instead.
    pub fn from_connection_string(raw: &str, config: IngestConfig) -> Result<Self> {
        let cs = ConnectionString::parse(raw).map_err(|e| {
            IngestError::permanent(ErrorCategory::ConfigurationUnavailable, e.to_string())
        })?;
        let token = cs
            .application_token
            .clone()
            .or_else(|| cs.user_token.clone())
            .ok_or_else(|| {
                IngestError::permanent(
                    ErrorCategory::AuthorizationFailure,
                    "connection string carries no user or application token",
                )
            })?;
        let credential: Arc<dyn TokenCredential> =
            Arc::new(ConstTokenCredential::new(AccessToken::bearer(token)));
        let engine_endpoint = cs.engine_endpoint().map_err(|e| {
            IngestError::permanent(ErrorCategory::ConfigurationUnavailable, e.to_string())
        })?;
        let dm_endpoint = cs.dm_endpoint().map_err(|e| {
            IngestError::permanent(ErrorCategory::ConfigurationUnavailable, e.to_string())
        })?;
        let streaming = StreamingIngestClient::new(engine_endpoint, credential.clone());
        let queued = QueuedIngestClient::new(dm_endpoint, credential, config.clone())?;
        Self::new(Arc::new(streaming), Arc::new(queued), config)
    }

    pub fn new(
        streaming: Arc<dyn StreamingChannel>,
        queued: Arc<dyn QueuedChannel>,
        config: IngestConfig,
    ) -> Result<Self> {
        config.validate().map_err(|e| {
            IngestError::permanent(ErrorCategory::ConfigurationUnavailable, e.to_string())
        })?;
        Ok(Self {
            streaming,
            queued,
            config,
            retry: RetryPolicy::managed_streaming(),
            backoff: DashMap::new(),
            on_streaming_success: None,
            on_streaming_error: None,
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Invoked synchronously after every successful streaming request.
    pub fn on_streaming_success(mut self, f: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.on_streaming_success = Some(Box::new(f));
        self
    }

    /// Invoked synchronously after every failed streaming attempt.
    pub fn on_streaming_error(
        mut self,
        f: impl Fn(Duration, bool, FailureCategory, &IngestError) + Send + Sync + 'static,
    ) -> Self {
        self.on_streaming_error = Some(Box::new(f));
        self
    }

    pub async fn ingest(
        &self,
        database: &str,
        table: &str,
        source: &Source,
        props: &IngestProperties,
    ) -> Result<IngestResponse> {
        let key = backoff_key(database, table);

        // remote payloads and anything over the threshold go straight to the
        // queued channel
        if !source.is_local() {
            return self.queued.ingest(database, table, source, props).await;
        }
        let size = source
            .size()
            .map_err(|e| IngestError::permanent(ErrorCategory::SourceNotReadable, e.to_string()))?;
        if let Some(n) = size
            && n > self.config.streaming_threshold()
        {
            log::info!(
                "ingest {database}.{table}: {n} bytes exceeds the streaming threshold, using queued"
            );
            return self.queued.ingest(database, table, source, props).await;
        }

        if let Some(state) = self.active_backoff(&key) {
            if state.category == FailureCategory::StreamingDisabledCluster
                && !self.config.continue_when_streaming_unavailable
            {
                return Err(IngestError::permanent(
                    ErrorCategory::StreamingRejected,
                    "streaming ingestion is disabled on the cluster",
                ));
            }
            log::info!(
                "ingest {database}.{table}: streaming backed off ({:?}), using queued",
                state.category
            );
            return self.queued.ingest(database, table, source, props).await;
        }

        let mut attempt = 0u32;
        loop {
            let started = std::time::Instant::now();
            match self.streaming.ingest(database, table, source, props).await {
                Ok(resp) => {
                    self.backoff.remove(&key);
                    self.notify_success(started.elapsed());
                    return Ok(resp);
                }
                Err(e) => {
                    let category = classify(&e);
                    self.notify_error(started.elapsed(), e.permanent, category, &e);
                    match category {
                        FailureCategory::Throttled => {
                            self.set_backoff(&key, category, THROTTLE_BACKOFF);
                            return self.fallback(database, table, source, props, &e).await;
                        }
                        FailureCategory::StreamingDisabledCluster => {
                            self.set_backoff(&key, category, STREAMING_DISABLED_BACKOFF);
                            if !self.config.continue_when_streaming_unavailable {
                                return Err(IngestError::permanent(
                                    ErrorCategory::StreamingRejected,
                                    "streaming ingestion is disabled on the cluster",
                                )
                                .with_source(e));
                            }
                            return self.fallback(database, table, source, props, &e).await;
                        }
                        FailureCategory::StreamingDisabledTable
                        | FailureCategory::RequestPropertiesPreventStreaming => {
                            self.set_backoff(&key, category, STREAMING_DISABLED_BACKOFF);
                            return self.fallback(database, table, source, props, &e).await;
                        }
                        FailureCategory::PayloadTooLarge | FailureCategory::Unknown => {
                            return self.fallback(database, table, source, props, &e).await;
                        }
                        FailureCategory::Other => {
                            attempt += 1;
                            let delay = if (attempt as usize) < self.retry.max_attempts() {
                                self.retry.move_next(attempt - 1)
                            } else {
                                None
                            };
                            match delay {
                                Some(delay) => {
                                    log::warn!(
                                        "streaming attempt {attempt} for {database}.{table} \
                                         failed, retrying in {}ms: {e}",
                                        delay.as_millis()
                                    );
                                    tokio::time::sleep(delay).await;
                                }
                                None => {
                                    return self.fallback(database, table, source, props, &e).await;
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// Current backoff entry for a table, if still active. Mostly useful for
    /// observability.
    pub fn backoff_state(&self, database: &str, table: &str) -> Option<TableBackoff> {
        self.active_backoff(&backoff_key(database, table))
    }

    async fn fallback(
        &self,
        database: &str,
        table: &str,
        source: &Source,
        props: &IngestProperties,
        cause: &IngestError,
    ) -> Result<IngestResponse> {
        if !source.rewindable() {
            return Err(IngestError::permanent(
                ErrorCategory::SourceNotReadable,
                "source stream cannot be replayed for the queued fallback",
            ));
        }
        log::warn!("falling back to queued ingestion for {database}.{table}: {cause}");
        self.queued.ingest(database, table, source, props).await
    }

    fn active_backoff(&self, key: &str) -> Option<TableBackoff> {
        let state = *self.backoff.get(key)?;
        if time::now() >= state.reset_at {
            // expired entries are logically absent
            self.backoff.remove(key);
            return None;
        }
        Some(state)
    }

    fn set_backoff(&self, key: &str, category: FailureCategory, duration: Duration) {
        self.backoff.insert(
            key.to_string(),
            TableBackoff {
                reset_at: time::now() + chrono::Duration::from_std(duration).unwrap_or_default(),
                category,
            },
        );
    }

    fn notify_success(&self, duration: Duration) {
        if let Some(f) = &self.on_streaming_success
            && std::panic::catch_unwind(AssertUnwindSafe(|| f(duration))).is_err()
        {
            log::error!("streaming success callback panicked");
        }
    }

    fn notify_error(
        &self,
        duration: Duration,
        permanent: bool,
        category: FailureCategory,
        err: &IngestError,
    ) {
        if let Some(f) = &self.on_streaming_error
            && std::panic::catch_unwind(AssertUnwindSafe(|| f(duration, permanent, category, err)))
                .is_err()
        {
            log::error!("streaming error callback panicked");
        }
    }
}

fn backoff_key(database: &str, table: &str) -> String {
    format!("{database}-{table}")
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use config::meta::{
        operation::{IngestKind, IngestionOperation},
        source::Format,
    };
    use parking_lot::Mutex;

    use super::*;

    fn response(kind: IngestKind) -> IngestResponse {
        IngestResponse {
            operation: IngestionOperation {
                operation_id: "op-1".to_string(),
                database: "db".to_string(),
                table: "t".to_string(),
                kind,
            },
            blob_url: None,
        }
    }

    #[derive(Default)]
    struct FakeStreaming {
        outcomes: Mutex<VecDeque<std::result::Result<(), IngestError>>>,
        calls: AtomicUsize,
    }

    impl FakeStreaming {
        fn with_outcomes(
            outcomes: impl IntoIterator<Item = std::result::Result<(), IngestError>>,
        ) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into_iter().collect()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl StreamingChannel for FakeStreaming {
        async fn ingest(
            &self,
            _database: &str,
            _table: &str,
            _source: &Source,
            _props: &IngestProperties,
        ) -> Result<IngestResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.outcomes.lock().pop_front() {
                Some(Ok(())) | None => Ok(response(IngestKind::Streaming)),
                Some(Err(e)) => Err(e),
            }
        }
    }

    #[derive(Default)]
    struct FakeQueued {
        calls: AtomicUsize,
    }

    impl FakeQueued {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl QueuedChannel for FakeQueued {
        async fn ingest(
            &self,
            _database: &str,
            _table: &str,
            _source: &Source,
            _props: &IngestProperties,
        ) -> Result<IngestResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(response(IngestKind::Queued))
        }
    }

    fn table_disabled_err() -> IngestError {
        IngestError::permanent(
            ErrorCategory::StreamingRejected,
            "http 400 BadRequest: table t1 does not have a streaming policy",
        )
    }

    fn cluster_disabled_err() -> IngestError {
        IngestError::permanent(
            ErrorCategory::StreamingRejected,
            "http 400 BadRequest: streaming ingestion is disabled for this cluster",
        )
    }

    fn throttled_err() -> IngestError {
        IngestError::transient(
            ErrorCategory::Network,
            "http 429 too many requests: streaming ingestion throttled",
        )
    }

    fn transient_err() -> IngestError {
        IngestError::transient(ErrorCategory::Network, "connection reset by peer")
    }

    fn no_delay_retry(retries: usize) -> RetryPolicy {
        RetryPolicy::Custom {
            intervals: vec![Duration::ZERO; retries],
        }
    }

    fn client(
        streaming: Arc<FakeStreaming>,
        queued: Arc<FakeQueued>,
        config: IngestConfig,
    ) -> ManagedIngestClient {
        ManagedIngestClient::new(streaming, queued, config)
            .unwrap()
            .with_retry_policy(no_delay_retry(3))
    }

    fn small_source() -> Source {
        Source::from_bytes(&b"{\"a\":1}"[..], Format::Json)
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(&throttled_err()), FailureCategory::Throttled);
        assert_eq!(
            classify(&table_disabled_err()),
            FailureCategory::StreamingDisabledTable
        );
        assert_eq!(
            classify(&cluster_disabled_err()),
            FailureCategory::StreamingDisabledCluster
        );
        assert_eq!(
            classify(&IngestError::permanent(
                ErrorCategory::StreamingRejected,
                "http 400: streaming ingestion is disabled on table t1"
            )),
            FailureCategory::StreamingDisabledTable
        );
        assert_eq!(
            classify(&IngestError::permanent(
                ErrorCategory::StreamingRejected,
                "http 400: the request properties are not supported for streaming"
            )),
            FailureCategory::RequestPropertiesPreventStreaming
        );
        assert_eq!(
            classify(&IngestError::permanent(
                ErrorCategory::StreamingRejected,
                "request body of 10485761 bytes exceeds the streaming payload limit, payload too large"
            )),
            FailureCategory::PayloadTooLarge
        );
        assert_eq!(classify(&transient_err()), FailureCategory::Other);
        assert_eq!(
            classify(&IngestError::permanent(
                ErrorCategory::AuthorizationFailure,
                "token rejected"
            )),
            FailureCategory::Unknown
        );
    }

    #[tokio::test]
    async fn test_small_source_streams() {
        let streaming = Arc::new(FakeStreaming::default());
        let queued = Arc::new(FakeQueued::default());
        let client = client(streaming.clone(), queued.clone(), IngestConfig::default());

        let resp = client
            .ingest("db", "t", &small_source(), &IngestProperties::default())
            .await
            .unwrap();
        assert_eq!(resp.operation.kind, IngestKind::Streaming);
        assert_eq!(streaming.calls(), 1);
        assert_eq!(queued.calls(), 0);
        assert!(client.backoff_state("db", "t").is_none());
    }

    #[tokio::test]
    async fn test_size_threshold_boundary() {
        // shrink the threshold to 10 bytes
        let config = IngestConfig {
            data_size_factor: 10.0 / config::MAX_STREAMING_SIZE as f64,
            ..Default::default()
        };
        let streaming = Arc::new(FakeStreaming::default());
        let queued = Arc::new(FakeQueued::default());
        let client = client(streaming.clone(), queued.clone(), config);

        // exactly at the threshold: streaming is attempted
        let at = Source::from_bytes(vec![b'x'; 10], Format::Csv);
        client
            .ingest("db", "t", &at, &IngestProperties::default())
            .await
            .unwrap();
        assert_eq!(streaming.calls(), 1);

        // one byte over: queued directly, no streaming attempt
        let over = Source::from_bytes(vec![b'x'; 11], Format::Csv);
        let resp = client
            .ingest("db", "t", &over, &IngestProperties::default())
            .await
            .unwrap();
        assert_eq!(resp.operation.kind, IngestKind::Queued);
        assert_eq!(streaming.calls(), 1);
        assert_eq!(queued.calls(), 1);
    }

    #[tokio::test]
    async fn test_remote_source_goes_queued() {
        let streaming = Arc::new(FakeStreaming::default());
        let queued = Arc::new(FakeQueued::default());
        let client = client(streaming.clone(), queued.clone(), IngestConfig::default());

        let source = Source::from_url("https://blob.example/x.csv?sig=s", Format::Csv);
        let resp = client
            .ingest("db", "t", &source, &IngestProperties::default())
            .await
            .unwrap();
        assert_eq!(resp.operation.kind, IngestKind::Queued);
        assert_eq!(streaming.calls(), 0);
    }

    #[tokio::test]
    async fn test_table_disabled_falls_back_and_backs_off() {
        let streaming = Arc::new(FakeStreaming::with_outcomes([Err(table_disabled_err())]));
        let queued = Arc::new(FakeQueued::default());
        let client = client(streaming.clone(), queued.clone(), IngestConfig::default());

        let resp = client
            .ingest("db", "t", &small_source(), &IngestProperties::default())
            .await
            .unwrap();
        assert_eq!(resp.operation.kind, IngestKind::Queued);
        assert_eq!(streaming.calls(), 1);
        assert_eq!(queued.calls(), 1);

        let state = client.backoff_state("db", "t").unwrap();
        assert_eq!(state.category, FailureCategory::StreamingDisabledTable);
        let remaining = state.reset_at - time::now();
        assert!(remaining <= chrono::Duration::minutes(15));
        assert!(remaining > chrono::Duration::minutes(14));

        // second request within the window: queued without a streaming attempt
        let resp = client
            .ingest("db", "t", &small_source(), &IngestProperties::default())
            .await
            .unwrap();
        assert_eq!(resp.operation.kind, IngestKind::Queued);
        assert_eq!(streaming.calls(), 1);
        assert_eq!(queued.calls(), 2);
    }

    #[tokio::test]
    async fn test_throttle_backoff_and_recovery() {
        let streaming = Arc::new(FakeStreaming::with_outcomes([Err(throttled_err())]));
        let queued = Arc::new(FakeQueued::default());
        let client = client(streaming.clone(), queued.clone(), IngestConfig::default());

        client
            .ingest("db", "t", &small_source(), &IngestProperties::default())
            .await
            .unwrap();
        let state = client.backoff_state("db", "t").unwrap();
        assert_eq!(state.category, FailureCategory::Throttled);
        let remaining = state.reset_at - time::now();
        assert!(remaining <= chrono::Duration::seconds(10));
        assert!(remaining > chrono::Duration::seconds(8));

        // force the window to expire, then streaming is attempted again and
        // the success clears the state
        client.backoff.insert(
            backoff_key("db", "t"),
            TableBackoff {
                reset_at: time::now() - chrono::Duration::seconds(1),
                category: FailureCategory::Throttled,
            },
        );
        let resp = client
            .ingest("db", "t", &small_source(), &IngestProperties::default())
            .await
            .unwrap();
        assert_eq!(resp.operation.kind, IngestKind::Streaming);
        assert_eq!(streaming.calls(), 2);
        assert!(client.backoff_state("db", "t").is_none());
    }

    #[tokio::test]
    async fn test_transient_retries_then_succeeds() {
        let streaming = Arc::new(FakeStreaming::with_outcomes([
            Err(transient_err()),
            Err(transient_err()),
            Ok(()),
        ]));
        let queued = Arc::new(FakeQueued::default());
        let client = client(streaming.clone(), queued.clone(), IngestConfig::default());

        let resp = client
            .ingest("db", "t", &small_source(), &IngestProperties::default())
            .await
            .unwrap();
        assert_eq!(resp.operation.kind, IngestKind::Streaming);
        assert_eq!(streaming.calls(), 3);
        assert_eq!(queued.calls(), 0);
    }

    #[tokio::test]
    async fn test_transient_exhaustion_falls_back() {
        let streaming = Arc::new(FakeStreaming::with_outcomes([
            Err(transient_err()),
            Err(transient_err()),
            Err(transient_err()),
        ]));
        let queued = Arc::new(FakeQueued::default());
        let client = client(streaming.clone(), queued.clone(), IngestConfig::default());

        let resp = client
            .ingest("db", "t", &small_source(), &IngestProperties::default())
            .await
            .unwrap();
        assert_eq!(resp.operation.kind, IngestKind::Queued);
        // the attempt budget equals the number of delay entries
        assert_eq!(streaming.calls(), 3);
        assert_eq!(queued.calls(), 1);
    }

    #[tokio::test]
    async fn test_cluster_disabled_raises_by_default() {
        let streaming = Arc::new(FakeStreaming::with_outcomes([Err(cluster_disabled_err())]));
        let queued = Arc::new(FakeQueued::default());
        let client = client(streaming.clone(), queued.clone(), IngestConfig::default());

        let err = client
            .ingest("db", "t", &small_source(), &IngestProperties::default())
            .await
            .unwrap_err();
        assert!(err.permanent);
        assert_eq!(queued.calls(), 0);
        assert_eq!(
            client.backoff_state("db", "t").unwrap().category,
            FailureCategory::StreamingDisabledCluster
        );

        // the state short-circuits follow-up requests into the same error
        let err = client
            .ingest("db", "t", &small_source(), &IngestProperties::default())
            .await
            .unwrap_err();
        assert!(err.permanent);
        assert_eq!(streaming.calls(), 1);
    }

    #[tokio::test]
    async fn test_cluster_disabled_continues_when_configured() {
        let config = IngestConfig {
            continue_when_streaming_unavailable: true,
            ..Default::default()
        };
        let streaming = Arc::new(FakeStreaming::with_outcomes([Err(cluster_disabled_err())]));
        let queued = Arc::new(FakeQueued::default());
        let client = client(streaming.clone(), queued.clone(), config);

        let resp = client
            .ingest("db", "t", &small_source(), &IngestProperties::default())
            .await
            .unwrap();
        assert_eq!(resp.operation.kind, IngestKind::Queued);

        // follow-ups inside the window also continue into queued
        let resp = client
            .ingest("db", "t", &small_source(), &IngestProperties::default())
            .await
            .unwrap();
        assert_eq!(resp.operation.kind, IngestKind::Queued);
        assert_eq!(streaming.calls(), 1);
    }

    #[tokio::test]
    async fn test_unrewindable_stream_cannot_fall_back() {
        let streaming = Arc::new(FakeStreaming::with_outcomes([Err(table_disabled_err())]));
        let queued = Arc::new(FakeQueued::default());
        let client = client(streaming.clone(), queued.clone(), IngestConfig::default());

        let source =
            Source::from_reader(std::io::Cursor::new(b"{\"a\":1}".to_vec()), Format::Json);
        let err = client
            .ingest("db", "t", &source, &IngestProperties::default())
            .await
            .unwrap_err();
        assert!(err.permanent);
        assert_eq!(err.category, ErrorCategory::SourceNotReadable);
        assert_eq!(queued.calls(), 0);
    }

    #[test]
    fn test_from_connection_string() {
        let client = ManagedIngestClient::from_connection_string(
            "Data Source=https://acme.westus.analytics.example.com;Application Token=tok-1",
            IngestConfig::default(),
        );
        assert!(client.is_ok());

        let err = ManagedIngestClient::from_connection_string(
            "Data Source=https://acme.westus.analytics.example.com",
            IngestConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err.category, ErrorCategory::AuthorizationFailure);

        let err = ManagedIngestClient::from_connection_string(
            "Data Source=https://acme.example.com;Shoe Size=44",
            IngestConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err.category, ErrorCategory::ConfigurationUnavailable);
    }

    #[tokio::test]
    async fn test_callbacks_invoked() {
        let successes = Arc::new(AtomicUsize::new(0));
        let errors = Arc::new(Mutex::new(Vec::new()));

        let streaming = Arc::new(FakeStreaming::with_outcomes([
            Err(transient_err()),
            Ok(()),
        ]));
        let queued = Arc::new(FakeQueued::default());
        let s = successes.clone();
        let e = errors.clone();
        let client = ManagedIngestClient::new(streaming, queued, IngestConfig::default())
            .unwrap()
            .with_retry_policy(no_delay_retry(3))
            .on_streaming_success(move |_| {
                s.fetch_add(1, Ordering::SeqCst);
            })
            .on_streaming_error(move |_, permanent, category, _| {
                e.lock().push((permanent, category));
            });

        client
            .ingest("db", "t", &small_source(), &IngestProperties::default())
            .await
            .unwrap();
        assert_eq!(successes.load(Ordering::SeqCst), 1);
        let errors = errors.lock();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0], (false, FailureCategory::Other));
    }
}
