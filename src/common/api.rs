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

//! Engine REST surface consumed by the ingestion clients.

pub fn streaming_ingest_url(engine_endpoint: &str, database: &str, table: &str) -> String {
    format!(
        "{}/v1/rest/ingest/{database}/{table}",
        engine_endpoint.trim_end_matches('/')
    )
}

pub fn queued_ingest_url(dm_endpoint: &str) -> String {
    format!("{}/v1/rest/ingestion/ingest", dm_endpoint.trim_end_matches('/'))
}

pub fn operation_status_url(dm_endpoint: &str, operation_id: &str) -> String {
    format!(
        "{}/v1/rest/ingestion/status/{operation_id}",
        dm_endpoint.trim_end_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_shapes() {
        assert_eq!(
            streaming_ingest_url("https://acme.example.com/", "db1", "t1"),
            "https://acme.example.com/v1/rest/ingest/db1/t1"
        );
        assert_eq!(
            queued_ingest_url("https://ingest-acme.example.com"),
            "https://ingest-acme.example.com/v1/rest/ingestion/ingest"
        );
        assert_eq!(
            operation_status_url("https://ingest-acme.example.com", "op-1"),
            "https://ingest-acme.example.com/v1/rest/ingestion/status/op-1"
        );
    }
}
