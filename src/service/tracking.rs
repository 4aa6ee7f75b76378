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
use config::meta::operation::{BlobStatus, IngestionOperation, OperationStatus, OperationSummary};
use infra::errors::*;
use tokio_util::sync::CancellationToken;

/// Seam over the engine's status surface.
#[async_trait]
pub trait StatusProvider: Send + Sync {
    async fn fetch_status(&self, operation: &IngestionOperation) -> Result<Vec<BlobStatus>>;
}

/// Polls the status surface until every source of the operation reached a
/// terminal state, the timeout passed, or the caller cancelled.
pub async fn poll_for_completion(
    provider: &dyn StatusProvider,
    operation: &IngestionOperation,
    interval: Duration,
    timeout: Duration,
    cancel: Option<&CancellationToken>,
) -> Result<OperationStatus> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let details = provider.fetch_status(operation).await?;
        let summary = OperationSummary::from_statuses(&details);
        let status = OperationStatus { summary, details };
        if summary.is_complete() {
            return Ok(status);
        }
        // timeout returns the last observed status without raising
        if tokio::time::Instant::now() + interval > deadline {
            log::warn!(
                "tracking operation {} timed out with {} sources in progress",
                operation.operation_id,
                summary.in_progress()
            );
            return Ok(status);
        }
        match cancel {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => {
                        return Err(IngestError::new(
                            ErrorCategory::Cancelled,
                            format!("tracking operation {} cancelled", operation.operation_id),
                        ));
                    }
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            None => tokio::time::sleep(interval).await,
        }
    }
}

pub struct OperationTracker {
    provider: Arc<dyn StatusProvider>,
}

impl OperationTracker {
    pub fn new(provider: Arc<dyn StatusProvider>) -> Self {
        Self { provider }
    }

    pub async fn poll_for_completion(
        &self,
        operation: &IngestionOperation,
        interval: Duration,
        timeout: Duration,
    ) -> Result<OperationStatus> {
        poll_for_completion(self.provider.as_ref(), operation, interval, timeout, None).await
    }

    pub async fn poll_with_cancel(
        &self,
        operation: &IngestionOperation,
        interval: Duration,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<OperationStatus> {
        poll_for_completion(
            self.provider.as_ref(),
            operation,
            interval,
            timeout,
            Some(cancel),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use config::meta::operation::{IngestKind, IngestStatus};

    use super::*;

    fn operation() -> IngestionOperation {
        IngestionOperation {
            operation_id: "op-1".to_string(),
            database: "db".to_string(),
            table: "t".to_string(),
            kind: IngestKind::Queued,
        }
    }

    fn row(status: IngestStatus) -> BlobStatus {
        BlobStatus {
            source_id: "s1".to_string(),
            status,
            details: None,
            error_code: None,
            started_at: None,
            last_update_time: None,
        }
    }

    /// Serves a fixed number of in-progress snapshots, then a terminal one.
    struct SteppingProvider {
        in_progress_rounds: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl StatusProvider for SteppingProvider {
        async fn fetch_status(&self, _op: &IngestionOperation) -> Result<Vec<BlobStatus>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.in_progress_rounds {
                Ok(vec![row(IngestStatus::Pending)])
            } else {
                Ok(vec![row(IngestStatus::Succeeded)])
            }
        }
    }

    #[tokio::test]
    async fn test_polls_until_terminal() {
        let provider = SteppingProvider {
            in_progress_rounds: 2,
            calls: AtomicUsize::new(0),
        };
        let status = poll_for_completion(
            &provider,
            &operation(),
            Duration::from_millis(5),
            Duration::from_secs(5),
            None,
        )
        .await
        .unwrap();
        assert!(status.summary.is_complete());
        assert_eq!(status.summary.succeeded, 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_timeout_returns_last_status() {
        let provider = SteppingProvider {
            in_progress_rounds: usize::MAX,
            calls: AtomicUsize::new(0),
        };
        let status = poll_for_completion(
            &provider,
            &operation(),
            Duration::from_millis(10),
            Duration::from_millis(25),
            None,
        )
        .await
        .unwrap();
        assert!(!status.summary.is_complete());
        assert_eq!(status.summary.in_progress(), 1);
    }

    #[tokio::test]
    async fn test_cancellation() {
        let provider = SteppingProvider {
            in_progress_rounds: usize::MAX,
            calls: AtomicUsize::new(0),
        };
        let token = CancellationToken::new();
        token.cancel();
        let err = poll_for_completion(
            &provider,
            &operation(),
            Duration::from_secs(10),
            Duration::from_secs(60),
            Some(&token),
        )
        .await
        .unwrap_err();
        assert_eq!(err.category, ErrorCategory::Cancelled);
    }
}
