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
    sync::{
        Arc,
        atomic::{AtomicI64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use config::utils::{rand::get_rand_index, time};
use serde::{Deserialize, Serialize};

use crate::{
    client::{
        API_VERSION, HEADER_ACCESS_CONTEXT, HEADER_API_VERSION, get_http_client,
        auth::TokenCredential,
    },
    errors::*,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UploadMethod {
    Storage,
    Lake,
}

impl UploadMethod {
    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "storage" => Some(UploadMethod::Storage),
            "lake" => Some(UploadMethod::Lake),
            _ => None,
        }
    }
}

/// A storage surface addressable through a signed URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub url: String,
    pub method: UploadMethod,
}

impl Container {
    /// Splits the container URL into its base and the signed query string.
    pub fn base_and_query(&self) -> (&str, &str) {
        match self.url.split_once('?') {
            Some((base, query)) => (base, query),
            None => (self.url.as_str(), ""),
        }
    }
}

// Wire shape of the configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationDoc {
    pub container_settings: ContainerSettingsDoc,
    #[serde(default)]
    pub ingestion_settings: IngestionSettingsDoc,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSettingsDoc {
    #[serde(default)]
    pub containers: Vec<PathEntry>,
    #[serde(default)]
    pub lake_folders: Vec<PathEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_interval: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_upload_method: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionSettingsDoc {
    #[serde(default)]
    pub queues: Vec<PathEntry>,
    /// Opaque token the engine expects back in every queue message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_context: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathEntry {
    pub path: String,
}

/// Parsed ingestion topology. Owned by the cache, shared with readers as an
/// immutable snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestionTopology {
    pub containers: Vec<Container>,
    pub lake_folders: Vec<Container>,
    pub queues: Vec<String>,
    pub authorization_context: Option<String>,
    pub preferred_method: Option<UploadMethod>,
    pub refresh_interval: Option<Duration>,
}

impl IngestionTopology {
    pub fn list(&self, method: UploadMethod) -> &[Container] {
        match method {
            UploadMethod::Storage => &self.containers,
            UploadMethod::Lake => &self.lake_folders,
        }
    }

    pub fn to_doc(&self) -> ConfigurationDoc {
        ConfigurationDoc {
            container_settings: ContainerSettingsDoc {
                containers: self
                    .containers
                    .iter()
                    .map(|c| PathEntry { path: c.url.clone() })
                    .collect(),
                lake_folders: self
                    .lake_folders
                    .iter()
                    .map(|c| PathEntry { path: c.url.clone() })
                    .collect(),
                refresh_interval: self.refresh_interval.map(time::format_refresh_interval),
                preferred_upload_method: self.preferred_method.map(|m| match m {
                    UploadMethod::Storage => "Storage".to_string(),
                    UploadMethod::Lake => "Lake".to_string(),
                }),
            },
            ingestion_settings: IngestionSettingsDoc {
                queues: self
                    .queues
                    .iter()
                    .map(|q| PathEntry { path: q.clone() })
                    .collect(),
                authorization_context: self.authorization_context.clone(),
            },
        }
    }
}

impl From<ConfigurationDoc> for IngestionTopology {
    fn from(doc: ConfigurationDoc) -> Self {
        IngestionTopology {
            containers: doc
                .container_settings
                .containers
                .into_iter()
                .map(|e| Container {
                    url: e.path,
                    method: UploadMethod::Storage,
                })
                .collect(),
            lake_folders: doc
                .container_settings
                .lake_folders
                .into_iter()
                .map(|e| Container {
                    url: e.path,
                    method: UploadMethod::Lake,
                })
                .collect(),
            queues: doc
                .ingestion_settings
                .queues
                .into_iter()
                .map(|e| e.path)
                .collect(),
            authorization_context: doc.ingestion_settings.authorization_context,
            preferred_method: doc
                .container_settings
                .preferred_upload_method
                .as_deref()
                .and_then(UploadMethod::parse),
            refresh_interval: doc
                .container_settings
                .refresh_interval
                .as_deref()
                .and_then(time::parse_refresh_interval),
        }
    }
}

/// Seam for fetching the configuration document.
#[async_trait]
pub trait ConfigFetcher: Send + Sync {
    async fn fetch(&self) -> Result<IngestionTopology>;
}

/// Fetches `{dm}/v1/rest/ingestion/configuration`.
pub struct HttpConfigFetcher {
    dm_endpoint: String,
    credential: Arc<dyn TokenCredential>,
    /// Private-link override: when set, this service-to-service credential
    /// signs the request instead of the standard one.
    s2s_credential: Option<Arc<dyn TokenCredential>>,
    /// Private-link access context, threaded as a request header when set.
    access_context: Option<String>,
}

impl HttpConfigFetcher {
    pub fn new(dm_endpoint: impl Into<String>, credential: Arc<dyn TokenCredential>) -> Self {
        Self {
            dm_endpoint: dm_endpoint.into(),
            credential,
            s2s_credential: None,
            access_context: None,
        }
    }

    pub fn with_s2s_credential(mut self, credential: Arc<dyn TokenCredential>) -> Self {
        self.s2s_credential = Some(credential);
        self
    }

    pub fn with_access_context(mut self, context: impl Into<String>) -> Self {
        self.access_context = Some(context.into());
        self
    }
}

#[async_trait]
impl ConfigFetcher for HttpConfigFetcher {
    async fn fetch(&self) -> Result<IngestionTopology> {
        let url = format!("{}/v1/rest/ingestion/configuration", self.dm_endpoint);
        let credential = self.s2s_credential.as_ref().unwrap_or(&self.credential);
        let token = credential.get_token(&[&self.dm_endpoint]).await?;
        let mut req = get_http_client()
            .get(&url)
            .header(HEADER_API_VERSION, API_VERSION)
            .header("Authorization", token.header_value());
        if let Some(context) = &self.access_context {
            req = req.header(HEADER_ACCESS_CONTEXT, context.clone());
        }
        let resp = req.send().await?;
        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(IngestError::permanent(
                ErrorCategory::AuthorizationFailure,
                format!("configuration fetch denied: http {status}"),
            ));
        }
        if status.is_client_error() {
            return Err(IngestError::permanent(
                ErrorCategory::ConfigurationUnavailable,
                format!("configuration fetch failed: http {status}"),
            ));
        }
        if !status.is_success() {
            return Err(IngestError::transient(
                ErrorCategory::ConfigurationUnavailable,
                format!("configuration fetch failed: http {status}"),
            ));
        }
        let doc: ConfigurationDoc = resp.json().await.map_err(|e| {
            IngestError::permanent(ErrorCategory::ParseFailure, e.to_string()).with_source(e)
        })?;
        Ok(doc.into())
    }
}

/// Memoizes the ingestion topology and refreshes it at most once per window.
/// Readers share an immutable snapshot; at expiry exactly one fetch is in
/// flight and latecomers wait for it.
pub struct ConfigurationCache {
    fetcher: Box<dyn ConfigFetcher>,
    default_interval: Duration,
    snapshot: ArcSwapOption<IngestionTopology>,
    expires_at: AtomicI64,
    refresh_lock: tokio::sync::Mutex<()>,
    storage_cursor: AtomicUsize,
    lake_cursor: AtomicUsize,
    queue_cursor: AtomicUsize,
}

impl ConfigurationCache {
    pub fn new(fetcher: Box<dyn ConfigFetcher>, default_interval: Duration) -> Self {
        Self {
            fetcher,
            default_interval,
            snapshot: ArcSwapOption::const_empty(),
            expires_at: AtomicI64::new(i64::MIN),
            refresh_lock: tokio::sync::Mutex::new(()),
            // random start so independent processes do not all hammer the
            // first container in the list
            storage_cursor: AtomicUsize::new(get_rand_index(usize::MAX / 2)),
            lake_cursor: AtomicUsize::new(get_rand_index(usize::MAX / 2)),
            queue_cursor: AtomicUsize::new(get_rand_index(usize::MAX / 2)),
        }
    }

    pub async fn get(&self) -> Result<Arc<IngestionTopology>> {
        if let Some(snapshot) = self.fresh_snapshot() {
            return Ok(snapshot);
        }
        let _guard = self.refresh_lock.lock().await;
        // another getter may have refreshed while this one waited on the lock
        if let Some(snapshot) = self.fresh_snapshot() {
            return Ok(snapshot);
        }
        match self.fetcher.fetch().await {
            Ok(topology) => {
                let interval = topology
                    .refresh_interval
                    .map(|hint| hint.min(self.default_interval))
                    .unwrap_or(self.default_interval);
                let snapshot = Arc::new(topology);
                self.snapshot.store(Some(snapshot.clone()));
                self.expires_at.store(
                    time::now_micros() + interval.as_micros() as i64,
                    Ordering::Release,
                );
                log::info!(
                    "ingestion configuration refreshed, next refresh in {}s",
                    interval.as_secs()
                );
                Ok(snapshot)
            }
            Err(e) => match self.snapshot.load_full() {
                Some(stale) => {
                    log::warn!("ingestion configuration refresh failed, serving stale: {e}");
                    Ok(stale)
                }
                None => Err(IngestError {
                    category: ErrorCategory::ConfigurationUnavailable,
                    message: "no ingestion configuration available".to_string(),
                    permanent: true,
                    source: Some(Box::new(e)),
                }),
            },
        }
    }

    fn fresh_snapshot(&self) -> Option<Arc<IngestionTopology>> {
        if time::now_micros() >= self.expires_at.load(Ordering::Acquire) {
            return None;
        }
        self.snapshot.load_full()
    }

    /// Round-robin cursor shared by every uploader bound to this cache.
    pub fn next_index(&self, method: UploadMethod, len: usize) -> usize {
        let cursor = match method {
            UploadMethod::Storage => &self.storage_cursor,
            UploadMethod::Lake => &self.lake_cursor,
        };
        cursor.fetch_add(1, Ordering::Relaxed) % len
    }

    pub fn next_queue_index(&self, len: usize) -> usize {
        self.queue_cursor.fetch_add(1, Ordering::Relaxed) % len
    }
}
