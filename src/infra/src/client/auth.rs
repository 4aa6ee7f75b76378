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

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;

use crate::errors::*;

/// Tokens within this window of expiry are refreshed instead of reused.
const EXPIRY_SLACK_SECS: i64 = 120;

#[derive(Debug, Clone)]
pub struct AccessToken {
    pub scheme: String,
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            scheme: "Bearer".to_string(),
            token: token.into(),
            expires_at: None,
        }
    }

    pub fn header_value(&self) -> String {
        format!("{} {}", self.scheme, self.token)
    }

    fn is_fresh(&self) -> bool {
        match self.expires_at {
            None => true,
            Some(at) => at - ChronoDuration::seconds(EXPIRY_SLACK_SECS) > Utc::now(),
        }
    }
}

/// Seam for credential acquisition. Implementations live outside this crate;
/// only the constant token and the caching decorator ship here.
#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken>;
}

/// A fixed, caller-supplied token.
pub struct ConstTokenCredential {
    token: AccessToken,
}

impl ConstTokenCredential {
    pub fn new(token: AccessToken) -> Self {
        Self { token }
    }
}

#[async_trait]
impl TokenCredential for ConstTokenCredential {
    async fn get_token(&self, _scopes: &[&str]) -> Result<AccessToken> {
        Ok(self.token.clone())
    }
}

/// Decorator that deduplicates acquisitions per requested scope set. Callers
/// see the plain [`TokenCredential`] contract.
pub struct CachingTokenCredential<C> {
    inner: C,
    cache: DashMap<String, AccessToken>,
}

impl<C: TokenCredential> CachingTokenCredential<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            cache: DashMap::new(),
        }
    }

    fn cache_key(scopes: &[&str]) -> String {
        let mut scopes = scopes.to_vec();
        scopes.sort_unstable();
        scopes.join(" ")
    }
}

#[async_trait]
impl<C: TokenCredential> TokenCredential for CachingTokenCredential<C> {
    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken> {
        let key = Self::cache_key(scopes);
        if let Some(cached) = self.cache.get(&key)
            && cached.is_fresh()
        {
            return Ok(cached.value().clone());
        }
        let token = self.inner.get_token(scopes).await?;
        self.cache.insert(key, token.clone());
        Ok(token)
    }
}
