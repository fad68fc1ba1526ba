#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ringcam_core::{ClientConfig, Credentials};
use serde_json::{json, Value};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const USERNAME: &str = "owner@example.com";
pub const PASSWORD: &str = "correct horse";

pub const OAUTH_PATH: &str = "/oauth/token";
pub const SESSION_PATH: &str = "/clients_api/session";
pub const DEVICES_PATH: &str = "/clients_api/ring_devices";
pub const PUSH_TOKEN_PATH: &str = "/clients_api/device";

pub struct RingMock {
    pub server: MockServer,
}

impl RingMock {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Config pointed at the mock server, no session reuse, near-zero backoff.
    pub fn config(&self) -> ClientConfig {
        ClientConfig::default()
            .with_api_base_url(self.server.uri())
            .with_oauth_url(format!("{}{}", self.server.uri(), OAUTH_PATH))
            .with_reuse_session(false)
            .with_retry_backoff(Duration::from_millis(1), Duration::from_millis(5))
    }

    pub fn config_with_cache(&self, cache_file: &Path) -> ClientConfig {
        self.config()
            .with_reuse_session(true)
            .with_cache_file(cache_file)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(USERNAME, PASSWORD)
    }

    pub async fn mount_password_grant(&self, access_token: &str, expected: u64) {
        Mock::given(method("POST"))
            .and(path(OAUTH_PATH))
            .and(body_string_contains("grant_type=password"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body(access_token)))
            .expect(expected)
            .mount(&self.server)
            .await;
    }

    pub async fn mount_refresh_grant(&self, access_token: &str, expected: u64) {
        Mock::given(method("POST"))
            .and(path(OAUTH_PATH))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body(access_token)))
            .expect(expected)
            .mount(&self.server)
            .await;
    }

    pub async fn mount_session_created(&self, session_token: &str, expected: u64) {
        Mock::given(method("POST"))
            .and(path(SESSION_PATH))
            .respond_with(ResponseTemplate::new(201).set_body_json(session_body(session_token)))
            .expect(expected)
            .mount(&self.server)
            .await;
    }

    pub async fn mount_devices(&self, body: Value, expected: u64) {
        Mock::given(method("GET"))
            .and(path(DEVICES_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(expected)
            .mount(&self.server)
            .await;
    }

    /// Requests received for a path, in arrival order.
    pub async fn requests_to(&self, request_path: &str) -> Vec<wiremock::Request> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path() == request_path)
            .collect()
    }
}

pub fn token_body(access_token: &str) -> Value {
    json!({
        "access_token": access_token,
        "refresh_token": format!("{}-refresh", access_token),
        "expires_in": 3600,
        "scope": "client",
        "token_type": "Bearer"
    })
}

pub fn session_body(session_token: &str) -> Value {
    json!({
        "profile": {
            "id": 1234,
            "email": USERNAME,
            "authentication_token": session_token
        }
    })
}

pub fn device_list_body() -> Value {
    json!({
        "doorbots": [{"id": 11, "description": "Front Door", "battery_life": 90}],
        "authorized_doorbots": [{"id": 12, "description": "Neighbor Door"}],
        "stickup_cams": [{"id": 21, "description": "Driveway"}],
        "chimes": [{"id": 31, "description": "Kitchen Chime"}]
    })
}

/// Cache file contents for `account` with an OAuth token issued at `issued_at`.
pub fn cache_body(account: &str, session_token: &str, access_token: &str, issued_at: DateTime<Utc>) -> Value {
    json!({
        "account": account,
        "token": session_token,
        "auth": {
            "access_token": access_token,
            "refresh_token": format!("{}-refresh", access_token),
            "expires_in": 3600,
            "token_type": "Bearer",
            "scope": "client",
            "issued_at": issued_at
        },
        "alerts": {}
    })
}

pub fn write_cache(path: &Path, body: &Value) {
    std::fs::write(path, serde_json::to_string_pretty(body).unwrap()).unwrap();
}

pub fn query_value(request: &wiremock::Request, key: &str) -> Option<String> {
    request
        .url
        .query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}
