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

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::{cache::Container, client::auth::AccessToken, errors::*, storage::remote::BlobStore};

#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub container_url: String,
    pub name: String,
    pub body: Bytes,
}

/// In-memory [`BlobStore`] that records every put, with optional injected
/// failures for the first N attempts.
#[derive(Default)]
pub struct FakeBlobStore {
    pub blobs: Mutex<Vec<StoredBlob>>,
    fail_times: AtomicUsize,
    fail_permanent: bool,
}

impl FakeBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `n` puts with a transient error.
    pub fn fail_times(self, n: usize) -> Self {
        self.fail_times.store(n, Ordering::SeqCst);
        self
    }

    /// Make injected failures permanent instead of transient.
    pub fn fail_permanent(mut self) -> Self {
        self.fail_permanent = true;
        self
    }

    pub fn put_count(&self) -> usize {
        self.blobs.lock().len()
    }

    /// Count of puts that landed in the given container.
    pub fn container_count(&self, container_url: &str) -> usize {
        self.blobs
            .lock()
            .iter()
            .filter(|b| b.container_url == container_url)
            .count()
    }
}

#[async_trait]
impl BlobStore for FakeBlobStore {
    async fn put(
        &self,
        container: &Container,
        name: &str,
        body: Bytes,
        _token: Option<&AccessToken>,
    ) -> Result<String> {
        if self
            .fail_times
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            let err = IngestError::new(ErrorCategory::UploadFailed, "injected failure");
            return Err(if self.fail_permanent {
                IngestError { permanent: true, ..err }
            } else {
                IngestError { permanent: false, ..err }
            });
        }
        let (base, query) = container.base_and_query();
        let url = if query.is_empty() {
            format!("{base}/{name}")
        } else {
            format!("{base}/{name}?{query}")
        };
        self.blobs.lock().push(StoredBlob {
            container_url: container.url.clone(),
            name: name.to_string(),
            body,
        });
        Ok(url)
    }
}
