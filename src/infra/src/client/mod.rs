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

use config::{BLOB_UPLOAD_TIMEOUT, HTTP_CONNECT_TIMEOUT, HTTP_REQUEST_TIMEOUT};
use once_cell::sync::Lazy;

pub mod auth;

pub const API_VERSION: &str = "2024-12-12";
pub const HEADER_API_VERSION: &str = "x-ms-version";
pub const HEADER_BLOB_TYPE: &str = "x-ms-blob-type";
pub const HEADER_ACCESS_CONTEXT: &str = "x-ms-access-context";
pub const BLOB_TYPE_BLOCK: &str = "BlockBlob";

/// Shared client for engine and queue calls.
static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_REQUEST_TIMEOUT)
        .connect_timeout(HTTP_CONNECT_TIMEOUT)
        .build()
        .expect("create http client")
});

/// Shared client for blob uploads, with the long transfer ceiling.
static BLOB_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .timeout(BLOB_UPLOAD_TIMEOUT)
        .connect_timeout(HTTP_CONNECT_TIMEOUT)
        .build()
        .expect("create blob client")
});

pub fn get_http_client() -> &'static reqwest::Client {
    &HTTP_CLIENT
}

pub fn get_blob_client() -> &'static reqwest::Client {
    &BLOB_CLIENT
}
