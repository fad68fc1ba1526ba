use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::cache::CacheRecord;

use super::OAuthToken;

/// API version sent with every request.
pub const API_VERSION: &str = "9";

/// Mutable state of one authenticated session.
///
/// Owned by the client behind an async mutex; every token change happens
/// while that lock is held.
#[derive(Debug, Default)]
pub struct SessionState {
    pub oauth: Option<OAuthToken>,
    pub session_token: Option<String>,
    pub is_connected: bool,
    pub last_refresh: Option<DateTime<Utc>>,
    /// Bumped on every successful authentication. Lets a caller that saw a
    /// 401 tell whether someone else already re-authenticated.
    pub generation: u64,
    sticky_params: BTreeMap<String, String>,
    /// Last record read from disk, used as the template for the next write.
    cached: Option<CacheRecord>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parameters every authenticated call carries.
    pub fn base_params(&self) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        params.insert("api_version".to_string(), API_VERSION.to_string());
        if let Some(ref token) = self.session_token {
            params.insert("auth_token".to_string(), token.clone());
        }
        params
    }

    /// Build the parameter set for one call: base params, then any sticky
    /// params, then `extra` (which wins on collision).
    ///
    /// With `sticky` set, `extra` is remembered for later calls until the
    /// next authentication.
    pub fn request_params(
        &mut self,
        extra: &BTreeMap<String, String>,
        sticky: bool,
    ) -> BTreeMap<String, String> {
        if sticky {
            self.sticky_params
                .extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        let mut params = self.base_params();
        params.extend(self.sticky_params.iter().map(|(k, v)| (k.clone(), v.clone())));
        params.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        params
    }

    /// Take over tokens from a cache record that belongs to this account.
    pub fn adopt_cached(&mut self, record: CacheRecord) {
        self.session_token = record.token.clone();
        if record.auth.is_some() {
            self.oauth = record.auth.clone();
        }
        self.cached = Some(record);
    }

    pub fn mark_authenticated(&mut self, session_token: Option<String>) {
        if session_token.is_some() {
            self.session_token = session_token;
        }
        self.is_connected = true;
        self.generation += 1;
        self.sticky_params.clear();
    }

    pub fn mark_disconnected(&mut self) {
        self.is_connected = false;
    }

    /// Fresh cache record for the current tokens.
    pub fn snapshot(&self, account: &str) -> CacheRecord {
        let template = self.cached.clone().unwrap_or_default();
        CacheRecord {
            account: Some(account.to_string()),
            token: self.session_token.clone(),
            auth: self.oauth.clone(),
            saved_at: Some(Utc::now()),
            ..template
        }
    }
}
