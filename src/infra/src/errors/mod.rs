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

use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    SourceNull,
    SourceNotReadable,
    SourceEmpty,
    SourceTooLarge,
    NoContainersAvailable,
    UploadFailed,
    QueuePostFailed,
    StreamingRejected,
    ConfigurationUnavailable,
    ParseFailure,
    AuthorizationFailure,
    Timeout,
    Network,
    Cancelled,
}

impl ErrorCategory {
    /// Default permanence; transient categories can still be upgraded when
    /// retries run out.
    pub fn default_permanent(&self) -> bool {
        !matches!(
            self,
            ErrorCategory::UploadFailed
                | ErrorCategory::QueuePostFailed
                | ErrorCategory::Timeout
                | ErrorCategory::Network
                | ErrorCategory::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::SourceNull => "SourceNull",
            ErrorCategory::SourceNotReadable => "SourceNotReadable",
            ErrorCategory::SourceEmpty => "SourceEmpty",
            ErrorCategory::SourceTooLarge => "SourceTooLarge",
            ErrorCategory::NoContainersAvailable => "NoContainersAvailable",
            ErrorCategory::UploadFailed => "UploadFailed",
            ErrorCategory::QueuePostFailed => "QueuePostFailed",
            ErrorCategory::StreamingRejected => "StreamingRejected",
            ErrorCategory::ConfigurationUnavailable => "ConfigurationUnavailable",
            ErrorCategory::ParseFailure => "ParseFailure",
            ErrorCategory::AuthorizationFailure => "AuthorizationFailure",
            ErrorCategory::Timeout => "Timeout",
            ErrorCategory::Network => "Network",
            ErrorCategory::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(ThisError, Debug)]
#[error("{category}# {message}")]
pub struct IngestError {
    pub category: ErrorCategory,
    pub message: String,
    pub permanent: bool,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl IngestError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            permanent: category.default_permanent(),
            source: None,
        }
    }

    pub fn permanent(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            permanent: true,
            ..Self::new(category, message)
        }
    }

    pub fn transient(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            permanent: false,
            ..Self::new(category, message)
        }
    }

    pub fn with_source(
        mut self,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Wraps the last transient failure once the retry budget is spent. The
    /// category is kept, the permanence is upgraded.
    pub fn retries_exhausted(category: ErrorCategory, last: IngestError) -> Self {
        Self {
            category,
            message: format!("retries exhausted: {}", last.message),
            permanent: true,
            source: Some(Box::new(last)),
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.permanent
    }
}

impl From<reqwest::Error> for IngestError {
    fn from(e: reqwest::Error) -> Self {
        let category = if e.is_timeout() {
            ErrorCategory::Timeout
        } else {
            ErrorCategory::Network
        };
        IngestError::transient(category, e.to_string()).with_source(e)
    }
}

impl From<std::io::Error> for IngestError {
    fn from(e: std::io::Error) -> Self {
        IngestError::permanent(ErrorCategory::SourceNotReadable, e.to_string()).with_source(e)
    }
}

/// The engine's structured error object. `@permanent` is authoritative,
/// unknown fields are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineErrorBody {
    pub error: EngineError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(rename = "@message", default, skip_serializing_if = "Option::is_none")]
    pub at_message: Option<String>,
    #[serde(rename = "@type", default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(rename = "@context", default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
    #[serde(rename = "@permanent", default)]
    pub permanent: bool,
}

impl EngineErrorBody {
    pub fn from_bytes(body: &[u8]) -> Option<Self> {
        serde_json::from_slice(body).ok()
    }
}
