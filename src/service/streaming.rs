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

use std::sync::Arc;

use bytes::Bytes;
use config::{
    MAX_STREAMING_SIZE, ider,
    meta::{
        operation::{IngestKind, IngestResponse, IngestionOperation},
        properties::IngestProperties,
        source::{CompressionType, Source},
    },
    utils::json,
};
use infra::{
    client::{API_VERSION, HEADER_API_VERSION, auth::TokenCredential, get_http_client},
    errors::*,
    storage::gzip_bytes,
};
use reqwest::StatusCode;

use crate::common::api;

/// Low-latency channel: one HTTP POST per request, straight at the engine.
pub struct StreamingIngestClient {
    engine_endpoint: String,
    credential: Arc<dyn TokenCredential>,
}

impl StreamingIngestClient {
    pub fn new(engine_endpoint: impl Into<String>, credential: Arc<dyn TokenCredential>) -> Self {
        Self {
            engine_endpoint: engine_endpoint.into(),
            credential,
        }
    }

    pub async fn ingest(
        &self,
        database: &str,
        table: &str,
        source: &Source,
        props: &IngestProperties,
    ) -> Result<IngestResponse> {
        let (body, gzipped) = prepare_body(source).await?;
        log::info!(
            "streaming ingest {database}.{table}: {} bytes ({})",
            body.len(),
            source.format()
        );

        let token = self.credential.get_token(&[&self.engine_endpoint]).await?;
        let url = api::streaming_ingest_url(&self.engine_endpoint, database, table);
        let mut req = get_http_client()
            .post(&url)
            .query(&props.streaming_params(source.format()))
            .header(HEADER_API_VERSION, API_VERSION)
            .header("Authorization", token.header_value())
            .header("Content-Type", "application/octet-stream");
        if gzipped || source.compression() == CompressionType::Gzip {
            req = req.header("Content-Encoding", "gzip");
        }
        let resp = req.body(body).send().await?;

        let status = resp.status();
        let payload = resp.bytes().await.unwrap_or_default();
        if status.is_success() {
            let operation_id = json::from_slice::<json::Value>(&payload)
                .ok()
                .and_then(|v| v["operationId"].as_str().map(|s| s.to_string()))
                .unwrap_or_else(ider::generate);
            return Ok(IngestResponse {
                operation: IngestionOperation {
                    operation_id,
                    database: database.to_string(),
                    table: table.to_string(),
                    kind: IngestKind::Streaming,
                },
                blob_url: None,
            });
        }
        Err(streaming_error(status, &payload))
    }
}

/// Builds the request body: gzip where allowed, reject what the channel can
/// not carry. Returns the body and whether this call compressed it.
pub(crate) async fn prepare_body(source: &Source) -> Result<(Bytes, bool)> {
    if source.compression() == CompressionType::Zip {
        return Err(IngestError::permanent(
            ErrorCategory::StreamingRejected,
            "zip-compressed payloads are not supported by the streaming channel",
        ));
    }
    if !source.is_local() {
        return Err(IngestError::permanent(
            ErrorCategory::StreamingRejected,
            "remote sources must use queued ingestion",
        ));
    }
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
    let (body, gzipped) =
        if source.compression() == CompressionType::None && !source.format().is_binary() {
            (gzip_bytes(raw).await?, true)
        } else {
            (raw, false)
        };
    if body.len() as u64 > MAX_STREAMING_SIZE {
        return Err(IngestError::permanent(
            ErrorCategory::StreamingRejected,
            format!(
                "request body of {} bytes exceeds the streaming payload limit, payload too large",
                body.len()
            ),
        ));
    }
    Ok((body, gzipped))
}

/// Maps a non-2xx streaming response. The engine's `@permanent` flag is
/// authoritative when the body parses.
pub(crate) fn streaming_error(status: StatusCode, payload: &[u8]) -> IngestError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return IngestError::transient(
            ErrorCategory::Network,
            "http 429 too many requests: streaming ingestion throttled",
        );
    }
    if status.is_client_error() {
        return match EngineErrorBody::from_bytes(payload) {
            Some(parsed) => {
                let e = parsed.error;
                IngestError {
                    category: ErrorCategory::StreamingRejected,
                    message: format!("http {status} {}: {}", e.code, e.message),
                    permanent: e.permanent,
                    source: None,
                }
            }
            None => IngestError::permanent(
                ErrorCategory::StreamingRejected,
                format!("streaming request rejected: http {status}"),
            ),
        };
    }
    IngestError::transient(
        ErrorCategory::Network,
        format!("streaming request failed: http {status}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::meta::source::Format;

    #[tokio::test]
    async fn test_zip_rejected_before_any_io() {
        let source =
            Source::from_bytes(&b"zipzip"[..], Format::Csv).with_compression(CompressionType::Zip);
        let err = prepare_body(&source).await.unwrap_err();
        assert_eq!(err.category, ErrorCategory::StreamingRejected);
        assert!(err.permanent);
    }

    #[tokio::test]
    async fn test_remote_rejected() {
        let source = Source::from_url("https://blob.example/x.csv?sig=s", Format::Csv);
        let err = prepare_body(&source).await.unwrap_err();
        assert_eq!(err.category, ErrorCategory::StreamingRejected);
    }

    #[tokio::test]
    async fn test_text_body_is_gzipped() {
        let source = Source::from_bytes(&b"{\"a\":1}"[..], Format::Json);
        let (body, gzipped) = prepare_body(&source).await.unwrap();
        assert!(gzipped);
        assert_eq!(&body[0..2], &[0x1f, 0x8b]);
    }

    #[tokio::test]
    async fn test_binary_body_untouched() {
        let payload = b"PAR1binary".to_vec();
        let source = Source::from_bytes(payload.clone(), Format::Parquet);
        let (body, gzipped) = prepare_body(&source).await.unwrap();
        assert!(!gzipped);
        assert_eq!(body, Bytes::from(payload));
    }

    #[tokio::test]
    async fn test_empty_source_rejected() {
        let source = Source::from_bytes(Bytes::new(), Format::Json);
        let err = prepare_body(&source).await.unwrap_err();
        assert_eq!(err.category, ErrorCategory::SourceEmpty);
    }

    #[tokio::test]
    async fn test_body_size_boundary() {
        // pre-compressed payloads go out as-is, so the ceiling applies to the
        // exact byte count
        let at_limit = vec![0u8; MAX_STREAMING_SIZE as usize];
        let source = Source::from_bytes(at_limit, Format::Csv)
            .with_compression(CompressionType::Gzip);
        assert!(prepare_body(&source).await.is_ok());

        let over_limit = vec![0u8; MAX_STREAMING_SIZE as usize + 1];
        let source = Source::from_bytes(over_limit, Format::Csv)
            .with_compression(CompressionType::Gzip);
        let err = prepare_body(&source).await.unwrap_err();
        assert_eq!(err.category, ErrorCategory::StreamingRejected);
        assert!(err.permanent);
        assert!(err.message.contains("too large"));
    }

    #[test]
    fn test_streaming_error_throttled() {
        let err = streaming_error(StatusCode::TOO_MANY_REQUESTS, b"");
        assert!(!err.permanent);
        assert!(err.message.contains("429"));
    }

    #[test]
    fn test_streaming_error_engine_body() {
        let body = br#"{"error":{"code":"BadRequest_TableStreamingPolicyDisabled","message":"table t1 does not have a streaming policy","@permanent":true}}"#;
        let err = streaming_error(StatusCode::BAD_REQUEST, body);
        assert_eq!(err.category, ErrorCategory::StreamingRejected);
        assert!(err.permanent);
        assert!(err.message.contains("streaming policy"));

        // @permanent=false is authoritative even on a 4xx
        let body = br#"{"error":{"code":"Conflict","message":"try again","@permanent":false}}"#;
        let err = streaming_error(StatusCode::CONFLICT, body);
        assert!(!err.permanent);
    }

    #[test]
    fn test_streaming_error_unparseable_and_5xx() {
        let err = streaming_error(StatusCode::BAD_REQUEST, b"<html>oops</html>");
        assert!(err.permanent);

        let err = streaming_error(StatusCode::BAD_GATEWAY, b"");
        assert!(!err.permanent);
        assert_eq!(err.category, ErrorCategory::Network);
    }
}
