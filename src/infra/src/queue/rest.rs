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
use reqwest::StatusCode;

use crate::{
    client::{API_VERSION, HEADER_API_VERSION, get_http_client},
    errors::*,
};

/// Posts messages to a SAS-signed cloud queue over its REST surface.
#[derive(Default)]
pub struct RestQueue;

impl RestQueue {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl super::Queue for RestQueue {
    async fn post(&self, queue_url: &str, message: Bytes) -> Result<()> {
        let (base, query) = match queue_url.split_once('?') {
            Some((base, query)) => (base, query),
            None => (queue_url, ""),
        };
        let url = if query.is_empty() {
            format!("{base}/messages")
        } else {
            format!("{base}/messages?{query}")
        };
        let body = format!(
            "<QueueMessage><MessageText>{}</MessageText></QueueMessage>",
            BASE64.encode(&message)
        );
        let resp = get_http_client()
            .post(&url)
            .header(HEADER_API_VERSION, API_VERSION)
            .header("Content-Type", "application/xml")
            .body(body)
            .send()
            .await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(IngestError::permanent(
                ErrorCategory::AuthorizationFailure,
                format!("queue post denied: http {status}"),
            ));
        }
        if status.is_client_error() {
            return Err(IngestError::permanent(
                ErrorCategory::QueuePostFailed,
                format!("queue post rejected: http {status}"),
            ));
        }
        Err(IngestError::transient(
            ErrorCategory::QueuePostFailed,
            format!("queue post failed: http {status}"),
        ))
    }
}
