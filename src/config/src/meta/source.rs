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

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::ider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionType {
    #[default]
    None,
    Gzip,
    Zip,
}

impl CompressionType {
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            CompressionType::None => None,
            CompressionType::Gzip => Some(".gz"),
            CompressionType::Zip => Some(".zip"),
        }
    }

    /// Infers the compression from a file name suffix.
    pub fn from_path(path: &str) -> Self {
        let path = path.to_lowercase();
        if path.ends_with(".gz") {
            CompressionType::Gzip
        } else if path.ends_with(".zip") {
            CompressionType::Zip
        } else {
            CompressionType::None
        }
    }

    pub fn is_compressed(&self) -> bool {
        !matches!(self, CompressionType::None)
    }
}

impl fmt::Display for CompressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionType::None => write!(f, "none"),
            CompressionType::Gzip => write!(f, "gzip"),
            CompressionType::Zip => write!(f, "zip"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Csv,
    Tsv,
    Scsv,
    Sohsv,
    Psv,
    Txt,
    Raw,
    Tsve,
    Json,
    MultiJson,
    Avro,
    ApacheAvro,
    Parquet,
    Orc,
    SStream,
    W3cLogFile,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Csv => "csv",
            Format::Tsv => "tsv",
            Format::Scsv => "scsv",
            Format::Sohsv => "sohsv",
            Format::Psv => "psv",
            Format::Txt => "txt",
            Format::Raw => "raw",
            Format::Tsve => "tsve",
            Format::Json => "json",
            Format::MultiJson => "multijson",
            Format::Avro => "avro",
            Format::ApacheAvro => "apacheavro",
            Format::Parquet => "parquet",
            Format::Orc => "orc",
            Format::SStream => "sstream",
            Format::W3cLogFile => "w3clogfile",
        }
    }

    pub fn extension(&self) -> String {
        format!(".{}", self.as_str())
    }

    /// Row-binary and columnar formats, already compressed by construction.
    /// The uploader must never recompress these.
    pub fn is_binary(&self) -> bool {
        matches!(
            self,
            Format::Avro | Format::ApacheAvro | Format::Parquet | Format::Orc
        )
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        ext.trim_start_matches('.').to_lowercase().parse().ok()
    }

    /// Picks a format from a file name, ignoring a trailing compression
    /// suffix. Unknown extensions default to csv.
    pub fn from_path(path: &str) -> Self {
        let path = path.to_lowercase();
        let base = path
            .strip_suffix(".gz")
            .or_else(|| path.strip_suffix(".zip"))
            .unwrap_or(&path);
        match base.rsplit_once('.') {
            Some((_, ext)) => Self::from_extension(ext).unwrap_or_default(),
            None => Format::default(),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Format {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(Format::Csv),
            "tsv" => Ok(Format::Tsv),
            "scsv" => Ok(Format::Scsv),
            "sohsv" => Ok(Format::Sohsv),
            "psv" => Ok(Format::Psv),
            "txt" => Ok(Format::Txt),
            "raw" => Ok(Format::Raw),
            "tsve" => Ok(Format::Tsve),
            "json" => Ok(Format::Json),
            "multijson" => Ok(Format::MultiJson),
            "avro" => Ok(Format::Avro),
            "apacheavro" => Ok(Format::ApacheAvro),
            "parquet" => Ok(Format::Parquet),
            "orc" => Ok(Format::Orc),
            "sstream" => Ok(Format::SStream),
            "w3clogfile" => Ok(Format::W3cLogFile),
            _ => Err(anyhow::anyhow!("unknown data format: {s}")),
        }
    }
}

pub type SharedReader = Arc<tokio::sync::Mutex<Option<Box<dyn AsyncRead + Send + Unpin>>>>;

/// Payload of a [`Source::LocalStream`]. `Bytes` can be re-read any number of
/// times; a `Reader` is drained exactly once.
#[derive(Clone)]
pub enum StreamBody {
    Bytes(Bytes),
    Reader(SharedReader),
}

impl StreamBody {
    pub fn from_reader(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        StreamBody::Reader(Arc::new(tokio::sync::Mutex::new(Some(Box::new(reader)))))
    }
}

impl fmt::Debug for StreamBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamBody::Bytes(b) => write!(f, "StreamBody::Bytes({} bytes)", b.len()),
            StreamBody::Reader(_) => write!(f, "StreamBody::Reader"),
        }
    }
}

/// A unit of data submitted for ingestion.
#[derive(Debug, Clone)]
pub enum Source {
    LocalFile {
        path: PathBuf,
        format: Format,
        compression: CompressionType,
        id: String,
    },
    LocalStream {
        body: StreamBody,
        format: Format,
        compression: CompressionType,
        id: String,
        size_hint: Option<u64>,
        /// Keep the drained reader handle alive instead of dropping it.
        leave_open: bool,
    },
    Remote {
        url: String,
        format: Format,
        compression: CompressionType,
        id: String,
    },
}

impl Source {
    /// A local file source. Format and compression are inferred from the file
    /// name and can be overridden with [`Source::with_format`] and
    /// [`Source::with_compression`].
    pub fn from_file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let name = path.to_string_lossy();
        Source::LocalFile {
            format: Format::from_path(&name),
            compression: CompressionType::from_path(&name),
            id: ider::generate(),
            path,
        }
    }

    pub fn from_bytes(data: impl Into<Bytes>, format: Format) -> Self {
        let data = data.into();
        Source::LocalStream {
            size_hint: Some(data.len() as u64),
            body: StreamBody::Bytes(data),
            format,
            compression: CompressionType::None,
            id: ider::generate(),
            leave_open: false,
        }
    }

    pub fn from_reader(reader: impl AsyncRead + Send + Unpin + 'static, format: Format) -> Self {
        Source::LocalStream {
            body: StreamBody::from_reader(reader),
            format,
            compression: CompressionType::None,
            id: ider::generate(),
            size_hint: None,
            leave_open: false,
        }
    }

    pub fn from_url(url: impl Into<String>, format: Format) -> Self {
        let url = url.into();
        Source::Remote {
            compression: CompressionType::from_path(url.split('?').next().unwrap_or(&url)),
            format,
            id: ider::generate(),
            url,
        }
    }

    pub fn with_format(mut self, new: Format) -> Self {
        match &mut self {
            Source::LocalFile { format, .. }
            | Source::LocalStream { format, .. }
            | Source::Remote { format, .. } => *format = new,
        }
        self
    }

    pub fn with_compression(mut self, new: CompressionType) -> Self {
        match &mut self {
            Source::LocalFile { compression, .. }
            | Source::LocalStream { compression, .. }
            | Source::Remote { compression, .. } => *compression = new,
        }
        self
    }

    pub fn with_id(mut self, new: impl Into<String>) -> Self {
        match &mut self {
            Source::LocalFile { id, .. }
            | Source::LocalStream { id, .. }
            | Source::Remote { id, .. } => *id = new.into(),
        }
        self
    }

    pub fn with_size_hint(mut self, hint: u64) -> Self {
        if let Source::LocalStream { size_hint, .. } = &mut self {
            *size_hint = Some(hint);
        }
        self
    }

    pub fn with_leave_open(mut self, v: bool) -> Self {
        if let Source::LocalStream { leave_open, .. } = &mut self {
            *leave_open = v;
        }
        self
    }

    pub fn format(&self) -> Format {
        match self {
            Source::LocalFile { format, .. }
            | Source::LocalStream { format, .. }
            | Source::Remote { format, .. } => *format,
        }
    }

    pub fn compression(&self) -> CompressionType {
        match self {
            Source::LocalFile { compression, .. }
            | Source::LocalStream { compression, .. }
            | Source::Remote { compression, .. } => *compression,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Source::LocalFile { id, .. }
            | Source::LocalStream { id, .. }
            | Source::Remote { id, .. } => id,
        }
    }

    /// Display name used in batch reports and log lines.
    pub fn name(&self) -> String {
        match self {
            Source::LocalFile { path, .. } => path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.to_string_lossy().to_string()),
            Source::LocalStream { id, .. } => id.clone(),
            Source::Remote { url, .. } => url.split('?').next().unwrap_or(url).to_string(),
        }
    }

    pub fn is_local(&self) -> bool {
        !matches!(self, Source::Remote { .. })
    }

    /// Whether the payload can be read again after a failed delivery attempt.
    pub fn rewindable(&self) -> bool {
        match self {
            Source::LocalFile { .. } | Source::Remote { .. } => true,
            Source::LocalStream { body, .. } => matches!(body, StreamBody::Bytes(_)),
        }
    }

    /// Size estimate in bytes. `Ok(None)` means the size is unknown, an error
    /// means the source is not readable.
    pub fn size(&self) -> std::io::Result<Option<u64>> {
        match self {
            Source::LocalFile { path, .. } => Ok(Some(std::fs::metadata(path)?.len())),
            Source::LocalStream {
                body, size_hint, ..
            } => match body {
                StreamBody::Bytes(b) => Ok(Some(b.len() as u64)),
                StreamBody::Reader(_) => Ok(*size_hint),
            },
            Source::Remote { .. } => Ok(None),
        }
    }

    /// Reads the whole local payload. A `Reader` stream body is drained and
    /// can not be read a second time; with `leave_open` the exhausted handle
    /// is kept alive for the caller.
    pub async fn read_all(&self) -> std::io::Result<Bytes> {
        match self {
            Source::LocalFile { path, .. } => {
                Ok(Bytes::from(tokio::fs::read(path).await?))
            }
            Source::LocalStream { body, leave_open, .. } => match body {
                StreamBody::Bytes(b) => Ok(b.clone()),
                StreamBody::Reader(slot) => {
                    let mut guard = slot.lock().await;
                    let Some(mut reader) = guard.take() else {
                        return Err(std::io::Error::other("stream already consumed"));
                    };
                    let mut buf = Vec::new();
                    let res = reader.read_to_end(&mut buf).await;
                    if *leave_open {
                        *guard = Some(reader);
                    }
                    res?;
                    Ok(Bytes::from(buf))
                }
            },
            Source::Remote { .. } => Err(std::io::Error::other(
                "remote source has no local payload",
            )),
        }
    }
}
