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

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{meta::source::Format, utils::json};

/// Server-side or inline data mapping. A request carries at most one; setting
/// either replaces the other, so the most recently set wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mapping {
    Reference(String),
    Inline(String),
}

/// Per-request ingestion options. Built once per request and treated as a
/// value afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestProperties {
    /// Overrides the source format for the engine request.
    pub format: Option<Format>,
    pub mapping: Option<Mapping>,
    /// Ask the engine to record a trackable operation.
    pub enable_tracking: bool,
    /// Hint the engine to skip batching (a.k.a. flush immediately).
    pub skip_batching: bool,
    pub ignore_first_record: bool,
    pub ignore_last_record_if_invalid: bool,
    pub additional_tags: Vec<String>,
    pub drop_by_tags: Vec<String>,
    pub ingest_by_tags: Vec<String>,
    pub ingest_if_not_exists: Vec<String>,
    pub validation_policy: Option<String>,
    pub zip_pattern: Option<String>,
    pub extend_schema: Option<bool>,
    pub recreate_schema: Option<bool>,
    /// Caller-provided uncompressed size; overrides the expansion heuristic.
    pub raw_size: Option<u64>,
    pub retain_blob_on_success: bool,
    /// Free-form pass-through engine hints.
    pub additional: HashMap<String, json::Value>,
}

impl Default for IngestProperties {
    fn default() -> Self {
        Self {
            format: None,
            mapping: None,
            enable_tracking: false,
            skip_batching: false,
            ignore_first_record: false,
            ignore_last_record_if_invalid: false,
            additional_tags: Vec::new(),
            drop_by_tags: Vec::new(),
            ingest_by_tags: Vec::new(),
            ingest_if_not_exists: Vec::new(),
            validation_policy: None,
            zip_pattern: None,
            extend_schema: None,
            recreate_schema: None,
            raw_size: None,
            retain_blob_on_success: true,
            additional: HashMap::new(),
        }
    }
}

impl IngestProperties {
    pub fn with_mapping_reference(mut self, name: impl Into<String>) -> Self {
        self.mapping = Some(Mapping::Reference(name.into()));
        self
    }

    pub fn with_inline_mapping(mut self, mapping_json: impl Into<String>) -> Self {
        self.mapping = Some(Mapping::Inline(mapping_json.into()));
        self
    }

    pub fn effective_format(&self, source_format: Format) -> Format {
        self.format.unwrap_or(source_format)
    }

    /// Extent tags with their engine prefixes applied.
    pub fn tags(&self) -> Vec<String> {
        let mut tags = self.additional_tags.clone();
        tags.extend(self.drop_by_tags.iter().map(|t| format!("drop-by:{t}")));
        tags.extend(self.ingest_by_tags.iter().map(|t| format!("ingest-by:{t}")));
        tags
    }

    /// Query parameters for the streaming endpoint.
    pub fn streaming_params(&self, source_format: Format) -> Vec<(&'static str, String)> {
        let mut params = vec![(
            "streamFormat",
            self.effective_format(source_format).to_string(),
        )];
        if let Some(Mapping::Reference(name)) = &self.mapping {
            params.push(("mappingName", name.clone()));
        }
        params
    }

    /// The `additionalProperties` object of a queue message.
    pub fn additional_properties(
        &self,
        auth_context: &str,
        source_format: Format,
    ) -> json::Map<String, json::Value> {
        let mut props = json::Map::new();
        props.insert(
            "authorizationContext".to_string(),
            auth_context.into(),
        );
        props.insert(
            "format".to_string(),
            self.effective_format(source_format).to_string().into(),
        );
        match &self.mapping {
            Some(Mapping::Reference(name)) => {
                props.insert("ingestionMappingReference".to_string(), name.clone().into());
            }
            Some(Mapping::Inline(mapping)) => {
                props.insert("ingestionMapping".to_string(), mapping.clone().into());
            }
            None => {}
        }
        let tags = self.tags();
        if !tags.is_empty() {
            props.insert("tags".to_string(), json::to_value(&tags).unwrap_or_default());
        }
        if !self.ingest_if_not_exists.is_empty() {
            props.insert(
                "ingestIfNotExists".to_string(),
                json::to_value(&self.ingest_if_not_exists).unwrap_or_default(),
            );
        }
        if self.ignore_first_record {
            props.insert("ignoreFirstRecord".to_string(), true.into());
        }
        if self.ignore_last_record_if_invalid {
            props.insert("ignoreLastRecord".to_string(), true.into());
        }
        if let Some(policy) = &self.validation_policy {
            props.insert("validationPolicy".to_string(), policy.clone().into());
        }
        if let Some(pattern) = &self.zip_pattern {
            props.insert("zipPattern".to_string(), pattern.clone().into());
        }
        if let Some(v) = self.extend_schema {
            props.insert("extend_schema".to_string(), v.into());
        }
        if let Some(v) = self.recreate_schema {
            props.insert("recreate_schema".to_string(), v.into());
        }
        for (k, v) in &self.additional {
            props.insert(k.clone(), v.clone());
        }
        props
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_most_recent_mapping_wins() {
        let props = IngestProperties::default()
            .with_mapping_reference("events_mapping")
            .with_inline_mapping("[{\"column\":\"a\"}]");
        assert_eq!(
            props.mapping,
            Some(Mapping::Inline("[{\"column\":\"a\"}]".to_string()))
        );

        let props = IngestProperties::default()
            .with_inline_mapping("[]")
            .with_mapping_reference("events_mapping");
        assert_eq!(
            props.mapping,
            Some(Mapping::Reference("events_mapping".to_string()))
        );
    }

    #[test]
    fn test_tags_prefixes() {
        let props = IngestProperties {
            additional_tags: vec!["blue".to_string()],
            drop_by_tags: vec!["batch1".to_string()],
            ingest_by_tags: vec!["job7".to_string()],
            ..Default::default()
        };
        assert_eq!(
            props.tags(),
            vec!["blue", "drop-by:batch1", "ingest-by:job7"]
        );
    }

    #[test]
    fn test_streaming_params() {
        let props = IngestProperties::default().with_mapping_reference("m1");
        let params = props.streaming_params(Format::Json);
        assert!(params.contains(&("streamFormat", "json".to_string())));
        assert!(params.contains(&("mappingName", "m1".to_string())));

        // format override wins over the source format
        let props = IngestProperties {
            format: Some(Format::MultiJson),
            ..Default::default()
        };
        let params = props.streaming_params(Format::Json);
        assert!(params.contains(&("streamFormat", "multijson".to_string())));
    }

    #[test]
    fn test_additional_properties() {
        let props = IngestProperties {
            ignore_first_record: true,
            validation_policy: Some("v1".to_string()),
            ..Default::default()
        }
        .with_mapping_reference("m1");
        let map = props.additional_properties("ctx-token", Format::Csv);
        assert_eq!(map["authorizationContext"], "ctx-token");
        assert_eq!(map["format"], "csv");
        assert_eq!(map["ingestionMappingReference"], "m1");
        assert_eq!(map["ignoreFirstRecord"], true);
        assert_eq!(map["validationPolicy"], "v1");
        assert!(!map.contains_key("tags"));
    }
}
