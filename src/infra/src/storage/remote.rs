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
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use bytes::Bytes;
use config::{BLOB_BLOCK_SIZE, BLOB_SINGLE_SHOT_MAX_SIZE};
use futures::{StreamExt, stream};
use reqwest::StatusCode;

use crate::{
    cache::Container,
    client::{
        API_VERSION, BLOB_TYPE_BLOCK, HEADER_API_VERSION, HEADER_BLOB_TYPE, auth::AccessToken,
        get_blob_client,
    },
    errors::*,
};

/// Seam for writing staged blobs. The HTTP implementation is the production
/// one; tests use [`super::fake::FakeBlobStore`].
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Writes `body` as `name` under `container` and returns the signed blob
    /// URL.
    async fn put(
        &self,
        container: &Container,
        name: &str,
        body: Bytes,
        token: Option<&AccessToken>,
    ) -> Result<String>;
}

/// Block-blob PUT semantics against a SAS-signed container URL.
pub struct HttpBlobStore {
    workers: usize,
}

impl HttpBlobStore {
    /// `workers` bounds the per-upload block PUT fan-out; it is clamped to
    /// the available cores.
    pub fn new(workers: usize) -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            workers: workers.clamp(1, cores),
        }
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn put(
        &self,
        container: &Container,
        name: &str,
        body: Bytes,
        token: Option<&AccessToken>,
    ) -> Result<String> {
        let (base, query) = container.base_and_query();
        let blob_base = format!("{base}/{name}");
        let blob_url = join_query(&blob_base, query, "");

        if body.len() <= BLOB_SINGLE_SHOT_MAX_SIZE {
            let mut req = get_blob_client()
                .put(&blob_url)
                .header(HEADER_API_VERSION, API_VERSION)
                .header(HEADER_BLOB_TYPE, BLOB_TYPE_BLOCK);
            if let Some(token) = token {
                req = req.header("Authorization", token.header_value());
            }
            let resp = req.body(body).send().await?;
            check_status(resp.status(), name)?;
            return Ok(blob_url);
        }

        // staged block upload
        let block_count = body.len().div_ceil(BLOB_BLOCK_SIZE);
        let puts = (0..block_count).map(|i| {
            let start = i * BLOB_BLOCK_SIZE;
            let end = ((i + 1) * BLOB_BLOCK_SIZE).min(body.len());
            let chunk = body.slice(start..end);
            let url = join_query(
                &blob_base,
                query,
                &format!("comp=block&blockid={}", block_id(i)),
            );
            let token = token.cloned();
            let name = name.to_string();
            async move {
                let mut req = get_blob_client()
                    .put(&url)
                    .header(HEADER_API_VERSION, API_VERSION);
                if let Some(token) = &token {
                    req = req.header("Authorization", token.header_value());
                }
                let resp = req.body(chunk).send().await?;
                check_status(resp.status(), &name)
            }
        });
        let results: Vec<Result<()>> = stream::iter(puts)
            .buffer_unordered(self.workers)
            .collect()
            .await;
        for r in results {
            r?;
        }

        let block_list = block_list_body(block_count);
        let url = join_query(&blob_base, query, "comp=blocklist");
        let mut req = get_blob_client()
            .put(&url)
            .header(HEADER_API_VERSION, API_VERSION)
            .header("Content-Type", "application/xml");
        if let Some(token) = token {
            req = req.header("Authorization", token.header_value());
        }
        let resp = req.body(block_list).send().await?;
        check_status(resp.status(), name)?;
        Ok(blob_url)
    }
}

fn join_query(base: &str, query: &str, extra: &str) -> String {
    match (query.is_empty(), extra.is_empty()) {
        (true, true) => base.to_string(),
        (true, false) => format!("{base}?{extra}"),
        (false, true) => format!("{base}?{query}"),
        (false, false) => format!("{base}?{query}&{extra}"),
    }
}

fn block_id(index: usize) -> String {
    BASE64.encode(format!("{index:08}"))
}

fn block_list_body(block_count: usize) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?><BlockList>");
    for i in 0..block_count {
        xml.push_str("<Latest>");
        xml.push_str(&block_id(i));
        xml.push_str("</Latest>");
    }
    xml.push_str("</BlockList>");
    xml
}

fn check_status(status: StatusCode, name: &str) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(IngestError::permanent(
            ErrorCategory::AuthorizationFailure,
            format!("blob upload denied for {name}: http {status}"),
        ));
    }
    if status.is_client_error() {
        return Err(IngestError::permanent(
            ErrorCategory::UploadFailed,
            format!("blob upload rejected for {name}: http {status}"),
        ));
    }
    Err(IngestError::transient(
        ErrorCategory::UploadFailed,
        format!("blob upload failed for {name}: http {status}"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_query() {
        assert_eq!(join_query("https://a/b", "", ""), "https://a/b");
        assert_eq!(join_query("https://a/b", "sig=x", ""), "https://a/b?sig=x");
        assert_eq!(join_query("https://a/b", "", "comp=block"), "https://a/b?comp=block");
        assert_eq!(
            join_query("https://a/b", "sig=x", "comp=block"),
            "https://a/b?sig=x&comp=block"
        );
    }

    #[test]
    fn test_block_ids_fixed_width() {
        // ids must all decode to the same length or the service rejects the list
        assert_eq!(block_id(0).len(), block_id(99_999).len());
        assert_ne!(block_id(1), block_id(2));
    }

    #[test]
    fn test_block_list_body() {
        let xml = block_list_body(2);
        assert!(xml.starts_with("<?xml"));
        assert_eq!(xml.matches("<Latest>").count(), 2);
        assert!(xml.ends_with("</BlockList>"));
    }

    #[test]
    fn test_check_status_mapping() {
        assert!(check_status(StatusCode::CREATED, "b").is_ok());
        let err = check_status(StatusCode::BAD_REQUEST, "b").unwrap_err();
        assert!(err.permanent);
        let err = check_status(StatusCode::FORBIDDEN, "b").unwrap_err();
        assert_eq!(err.category, ErrorCategory::AuthorizationFailure);
        let err = check_status(StatusCode::INTERNAL_SERVER_ERROR, "b").unwrap_err();
        assert!(!err.permanent);
    }
}
