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

//! Client library for pushing records into a columnar analytics engine.
//!
//! Two channels are available: a low-latency streaming channel (one HTTP POST
//! per request, size-limited) and a reliable queued channel that stages data
//! in cloud storage and signals the engine through a message queue. The
//! [`service::managed::ManagedIngestClient`] routes each request between the
//! two based on payload size, configuration and recent failure history.

pub mod common;
pub mod service;

pub use config::{
    IngestConfig, UploadPreference,
    meta::{
        connection::ConnectionString,
        operation::{
            BlobStatus, IngestKind, IngestResponse, IngestStatus, IngestionOperation,
            OperationStatus, OperationSummary,
        },
        properties::{IngestProperties, Mapping},
        source::{CompressionType, Format, Source},
    },
};
pub use infra::{
    client::auth::{AccessToken, CachingTokenCredential, ConstTokenCredential, TokenCredential},
    errors::{ErrorCategory, IngestError, Result},
    retry::RetryPolicy,
};
pub use service::{
    managed::{FailureCategory, ManagedIngestClient, TableBackoff},
    queued::QueuedIngestClient,
    streaming::StreamingIngestClient,
    tracking::{OperationTracker, StatusProvider},
};
