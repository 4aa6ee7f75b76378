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

use std::io::Write;

use bytes::Bytes;
use config::{
    UploadPreference,
    meta::source::{CompressionType, Format},
    utils::rand::generate_random_hex8,
};
use flate2::{Compression, write::GzEncoder};

use crate::{
    cache::{IngestionTopology, UploadMethod},
    errors::*,
};

pub mod fake;
pub mod remote;
pub mod uploader;

pub use uploader::{BatchResult, UploadFailure, UploadSuccess, Uploader};

/// Picks the storage surface for an upload. The server hint only applies when
/// its list is populated; an explicitly requested method falls through to the
/// other surface rather than failing.
pub fn resolve_method(
    requested: UploadPreference,
    topology: &IngestionTopology,
) -> Result<UploadMethod> {
    let has_storage = !topology.containers.is_empty();
    let has_lake = !topology.lake_folders.is_empty();
    let resolved = match requested {
        UploadPreference::Default => match topology.preferred_method {
            Some(hint) if !topology.list(hint).is_empty() => Some(hint),
            _ if has_storage => Some(UploadMethod::Storage),
            _ if has_lake => Some(UploadMethod::Lake),
            _ => None,
        },
        UploadPreference::Storage => {
            if has_storage {
                Some(UploadMethod::Storage)
            } else if has_lake {
                Some(UploadMethod::Lake)
            } else {
                None
            }
        }
        UploadPreference::Lake => {
            if has_lake {
                Some(UploadMethod::Lake)
            } else if has_storage {
                Some(UploadMethod::Storage)
            } else {
                None
            }
        }
    };
    resolved.ok_or_else(|| {
        IngestError::permanent(
            ErrorCategory::NoContainersAvailable,
            "ingestion topology has no containers or lake folders",
        )
    })
}

/// Staged blob name: `<prefix>/<8-hex>_<source-id><format-ext>[+compression-ext]`.
/// Binary formats never get a compression suffix.
pub fn blob_name(
    prefix: &str,
    source_id: &str,
    format: Format,
    compression: CompressionType,
) -> String {
    let comp_ext = if format.is_binary() {
        ""
    } else {
        compression.extension().unwrap_or("")
    };
    format!(
        "{prefix}/{}_{source_id}{}{comp_ext}",
        generate_random_hex8(),
        format.extension()
    )
}

/// Gzip a payload on the blocking pool.
pub async fn gzip_bytes(data: Bytes) -> Result<Bytes> {
    tokio::task::spawn_blocking(move || {
        let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
        encoder.write_all(&data)?;
        Ok::<_, std::io::Error>(Bytes::from(encoder.finish()?))
    })
    .await
    .map_err(|e| {
        IngestError::transient(ErrorCategory::UploadFailed, format!("compression task: {e}"))
    })?
    .map_err(|e| {
        IngestError::permanent(ErrorCategory::UploadFailed, format!("compression: {e}"))
            .with_source(e)
    })
}
