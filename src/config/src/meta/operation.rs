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

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestKind {
    Streaming,
    Queued,
}

impl std::fmt::Display for IngestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestKind::Streaming => write!(f, "streaming"),
            IngestKind::Queued => write!(f, "queued"),
        }
    }
}

/// Handle to a submitted ingestion. Only queued operations can be tracked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionOperation {
    pub operation_id: String,
    pub database: String,
    pub table: String,
    pub kind: IngestKind,
}

#[derive(Debug, Clone)]
pub struct IngestResponse {
    pub operation: IngestionOperation,
    /// Staged blob URL for queued ingestion.
    pub blob_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IngestStatus {
    Pending,
    Started,
    Succeeded,
    Failed,
    Skipped,
}

impl IngestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            IngestStatus::Succeeded | IngestStatus::Failed | IngestStatus::Skipped
        )
    }
}

/// One row of the engine's ingestion status surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobStatus {
    pub source_id: String,
    pub status: IngestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_update_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSummary {
    pub pending: usize,
    pub started: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl OperationSummary {
    pub fn from_statuses<'a>(statuses: impl IntoIterator<Item = &'a BlobStatus>) -> Self {
        let mut summary = Self::default();
        for s in statuses {
            match s.status {
                IngestStatus::Pending => summary.pending += 1,
                IngestStatus::Started => summary.started += 1,
                IngestStatus::Succeeded => summary.succeeded += 1,
                IngestStatus::Failed => summary.failed += 1,
                IngestStatus::Skipped => summary.skipped += 1,
            }
        }
        summary
    }

    pub fn in_progress(&self) -> usize {
        self.pending + self.started
    }

    pub fn is_complete(&self) -> bool {
        self.in_progress() == 0
    }
}

/// Snapshot returned by the tracking API.
#[derive(Debug, Clone, Default)]
pub struct OperationStatus {
    pub summary: OperationSummary,
    pub details: Vec<BlobStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(s: IngestStatus) -> BlobStatus {
        BlobStatus {
            source_id: "s".to_string(),
            status: s,
            details: None,
            error_code: None,
            started_at: None,
            last_update_time: None,
        }
    }

    #[test]
    fn test_summary_counts() {
        let rows = vec![
            status(IngestStatus::Pending),
            status(IngestStatus::Started),
            status(IngestStatus::Succeeded),
            status(IngestStatus::Succeeded),
            status(IngestStatus::Failed),
        ];
        let summary = OperationSummary::from_statuses(&rows);
        assert_eq!(summary.in_progress(), 2);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert!(!summary.is_complete());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!IngestStatus::Pending.is_terminal());
        assert!(!IngestStatus::Started.is_terminal());
        assert!(IngestStatus::Succeeded.is_terminal());
        assert!(IngestStatus::Failed.is_terminal());
        assert!(IngestStatus::Skipped.is_terminal());
    }

    #[test]
    fn test_blob_status_wire_shape() {
        let raw = r#"{"sourceId":"abc","status":"Failed","errorCode":"BadFormat","startedAt":"2025-05-01T10:00:00Z","lastUpdateTime":"2025-05-01T10:01:00Z"}"#;
        let row: BlobStatus = serde_json::from_str(raw).unwrap();
        assert_eq!(row.source_id, "abc");
        assert_eq!(row.status, IngestStatus::Failed);
        assert_eq!(row.error_code.as_deref(), Some("BadFormat"));
        assert!(row.started_at.is_some());
    }
}
