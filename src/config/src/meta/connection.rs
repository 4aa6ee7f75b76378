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

use std::fmt;

use url::Url;

/// Host prefix that distinguishes the data-management endpoint from the
/// engine endpoint.
pub const INGEST_HOST_PREFIX: &str = "ingest-";

/// Parsed `k1=v1;k2=v2` connection string. Secret material is redacted from
/// `Debug` output.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConnectionString {
    pub data_source: String,
    pub initial_catalog: Option<String>,
    pub federated_security: bool,
    pub application_client_id: Option<String>,
    pub application_key: Option<String>,
    pub authority_id: Option<String>,
    pub application_name_for_tracing: Option<String>,
    pub user_name_for_tracing: Option<String>,
    /// Send the full certificate chain (x5c) with certificate auth.
    pub application_certificate_x5c: bool,
    pub user_id: Option<String>,
    pub user_token: Option<String>,
    pub application_token: Option<String>,
}

impl ConnectionString {
    pub fn parse(raw: &str) -> Result<Self, anyhow::Error> {
        let mut cs = ConnectionString::default();
        for segment in raw.split(';') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            let Some((key, value)) = segment.split_once('=') else {
                return Err(anyhow::anyhow!(
                    "connection string segment is not key=value: {segment}"
                ));
            };
            let value = value.trim();
            match normalize_key(key).as_str() {
                "datasource" | "addr" | "server" => cs.data_source = value.to_string(),
                "initialcatalog" => cs.initial_catalog = Some(value.to_string()),
                "federatedsecurity" | "fed" | "aadfederatedsecurity" => {
                    cs.federated_security = parse_bool(value)?
                }
                "applicationclientid" | "appclientid" => {
                    cs.application_client_id = Some(value.to_string())
                }
                "applicationkey" | "appkey" => cs.application_key = Some(value.to_string()),
                "authorityid" | "tenantid" => cs.authority_id = Some(value.to_string()),
                "applicationnamefortracing" => {
                    cs.application_name_for_tracing = Some(value.to_string())
                }
                "usernamefortracing" => cs.user_name_for_tracing = Some(value.to_string()),
                "applicationcertificatex5c" | "applicationcertificatesendx5c" => {
                    cs.application_certificate_x5c = parse_bool(value)?
                }
                "userid" | "aaduserid" => cs.user_id = Some(value.to_string()),
                "usertoken" => cs.user_token = Some(value.to_string()),
                "applicationtoken" => cs.application_token = Some(value.to_string()),
                other => {
                    return Err(anyhow::anyhow!(
                        "unrecognized connection string key: {other}"
                    ));
                }
            }
        }
        if cs.data_source.is_empty() {
            return Err(anyhow::anyhow!("connection string has no data source"));
        }
        Ok(cs)
    }

    /// The data-management endpoint, derived by the `ingest-` host prefix
    /// convention when the data source points at the engine.
    pub fn dm_endpoint(&self) -> Result<String, anyhow::Error> {
        let mut url = Url::parse(&self.data_source)?;
        let host = url
            .host_str()
            .ok_or_else(|| anyhow::anyhow!("data source has no host: {}", self.data_source))?;
        if !host.starts_with(INGEST_HOST_PREFIX) {
            let host = format!("{INGEST_HOST_PREFIX}{host}");
            url.set_host(Some(&host))?;
        }
        Ok(url.as_str().trim_end_matches('/').to_string())
    }

    /// The engine endpoint, with the `ingest-` host prefix stripped.
    pub fn engine_endpoint(&self) -> Result<String, anyhow::Error> {
        let mut url = Url::parse(&self.data_source)?;
        let host = url
            .host_str()
            .ok_or_else(|| anyhow::anyhow!("data source has no host: {}", self.data_source))?;
        if let Some(stripped) = host.strip_prefix(INGEST_HOST_PREFIX) {
            let host = stripped.to_string();
            url.set_host(Some(&host))?;
        }
        Ok(url.as_str().trim_end_matches('/').to_string())
    }
}

impl fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn redact(v: &Option<String>) -> &'static str {
            if v.is_some() { "***" } else { "<none>" }
        }
        f.debug_struct("ConnectionString")
            .field("data_source", &self.data_source)
            .field("initial_catalog", &self.initial_catalog)
            .field("federated_security", &self.federated_security)
            .field("application_client_id", &self.application_client_id)
            .field("application_key", &redact(&self.application_key))
            .field("authority_id", &self.authority_id)
            .field("user_id", &self.user_id)
            .field("user_token", &redact(&self.user_token))
            .field("application_token", &redact(&self.application_token))
            .finish()
    }
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

fn parse_bool(value: &str) -> Result<bool, anyhow::Error> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(anyhow::anyhow!("invalid boolean value: {other}")),
    }
}
