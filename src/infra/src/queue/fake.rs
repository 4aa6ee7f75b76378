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

use crate::errors::*;

/// In-memory [`super::Queue`] recording every post and every attempted queue
/// URL, with optional injected failures.
#[derive(Default)]
pub struct FakeQueue {
    pub messages: Mutex<Vec<(String, Bytes)>>,
    attempts: Mutex<Vec<String>>,
    fail_times: AtomicUsize,
}

impl FakeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_times(self, n: usize) -> Self {
        self.fail_times.store(n, Ordering::SeqCst);
        self
    }

    pub fn post_count(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn attempted_queues(&self) -> Vec<String> {
        self.attempts.lock().clone()
    }
}

#[async_trait]
impl super::Queue for FakeQueue {
    async fn post(&self, queue_url: &str, message: Bytes) -> Result<()> {
        self.attempts.lock().push(queue_url.to_string());
        if self
            .fail_times
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(IngestError::transient(
                ErrorCategory::QueuePostFailed,
                "injected failure",
            ));
        }
        self.messages.lock().push((queue_url.to_string(), message));
        Ok(())
    }
}
