//! API client for the Ring cloud API.
//!
//! `RingClient` plays two roles:
//! - session manager: obtains and refreshes the OAuth bearer token, creates
//!   the legacy API session, and reuses a cached session when allowed
//! - query executor: runs one logical API call, re-authenticating and
//!   retrying when the server answers 401
//!
//! Session state sits behind an async mutex, so concurrent callers share a
//! single refresh instead of each re-authenticating on their own.

use chrono::Utc;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::{AuthCallback, Credentials, OAuthClient, SessionState, API_VERSION};
use crate::cache::CacheStore;
use crate::config::ClientConfig;
use crate::models::{Device, DeviceKind, DeviceList, Devices, RingDevice};

use super::{ApiError, Method, QueryOptions, QueryOutcome};

// ============================================================================
// Constants
// ============================================================================

/// Creates (POST) or confirms the legacy API session.
const NEW_SESSION_ENDPOINT: &str = "/clients_api/session";

/// Lists every device on the account. Also used to validate a cached session.
pub const DEVICES_ENDPOINT: &str = "/clients_api/ring_devices";

/// Registers the push-notification token (PUT).
const PERSIST_TOKEN_ENDPOINT: &str = "/clients_api/device";

const USER_AGENT: &str = "android:com.ringapp";

const DEVICE_OS: &str = "android";

const APP_BRAND: &str = "ring";

#[derive(Debug, Deserialize)]
struct NewSessionResponse {
    profile: SessionProfile,
}

#[derive(Debug, Deserialize)]
struct SessionProfile {
    authentication_token: Option<String>,
}

pub struct RingClient {
    client: Client,
    config: ClientConfig,
    credentials: Credentials,
    auth_callback: Option<AuthCallback>,
    oauth: OAuthClient,
    cache: Option<CacheStore>,
    state: Mutex<SessionState>,
    cancel: CancellationToken,
}

impl RingClient {
    /// Create a client without touching the network.
    pub fn new(config: ClientConfig, credentials: Credentials) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(USER_AGENT)
            .build()?;

        let cache = if config.reuse_session {
            match config.cache_path() {
                Ok(path) => Some(CacheStore::new(path)),
                Err(e) => {
                    warn!(error = %e, "No cache location available, session reuse disabled");
                    None
                }
            }
        } else {
            None
        };

        let oauth = OAuthClient::new(client.clone(), config.oauth_url.clone());

        Ok(Self {
            client,
            config,
            credentials,
            auth_callback: None,
            oauth,
            cache,
            state: Mutex::new(SessionState::new()),
            cancel: CancellationToken::new(),
        })
    }

    /// Create a client and establish a session, reusing the cached one when
    /// `reuse_session` is enabled.
    pub async fn connect(
        config: ClientConfig,
        credentials: Credentials,
        auth_callback: Option<AuthCallback>,
    ) -> Result<Self, ApiError> {
        let mut client = Self::new(config, credentials)?;
        client.auth_callback = auth_callback;
        client.start().await?;
        Ok(client)
    }

    /// Supply the callback used when the password grant needs a one-time code.
    #[must_use]
    pub fn with_auth_callback(mut self, callback: AuthCallback) -> Self {
        self.auth_callback = Some(callback);
        self
    }

    /// Use an externally owned token to abort backoff waits.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Establish the session: cached if possible, otherwise from scratch.
    pub async fn start(&self) -> Result<(), ApiError> {
        if self.cache.is_some() {
            self.load_cached_session().await
        } else {
            self.authenticate(self.config.attempts).await
        }
    }

    // ===== Accessors =====

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn username(&self) -> &str {
        self.credentials.username()
    }

    pub fn cache_store(&self) -> Option<&CacheStore> {
        self.cache.as_ref()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn api_url(&self, endpoint: &str) -> String {
        self.config.api_url(endpoint)
    }

    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.is_connected
    }

    pub async fn session_token(&self) -> Option<String> {
        self.state.lock().await.session_token.clone()
    }

    pub async fn last_refresh(&self) -> Option<chrono::DateTime<Utc>> {
        self.state.lock().await.last_refresh
    }

    // ===== Session Management =====

    /// Current OAuth access token, fetching or refreshing it as needed.
    pub async fn ensure_token(&self) -> Result<String, ApiError> {
        let mut state = self.state.lock().await;
        self.ensure_token_locked(&mut state).await
    }

    async fn ensure_token_locked(&self, state: &mut SessionState) -> Result<String, ApiError> {
        let now = Utc::now();
        let current = match state.oauth {
            None => return self.fetch_oauth(state).await,
            Some(ref token) if !token.is_expired_at(now) => {
                return Ok(token.access_token.clone());
            }
            Some(ref token) => token.clone(),
        };

        match self.oauth.refresh_tokens(&current).await {
            Ok(mut fresh) => {
                if fresh.refresh_token.is_none() {
                    fresh.refresh_token = current.refresh_token;
                }
                let access = fresh.access_token.clone();
                state.oauth = Some(fresh);
                state.last_refresh = Some(now);
                info!("OAuth token refreshed");
                Ok(access)
            }
            Err(e) if e.is_transport() => Err(e),
            Err(e) => {
                warn!(error = %e, "OAuth refresh failed, falling back to password grant");
                self.fetch_oauth(state).await
            }
        }
    }

    async fn fetch_oauth(&self, state: &mut SessionState) -> Result<String, ApiError> {
        match self
            .oauth
            .fetch_token(&self.credentials, self.auth_callback.as_ref())
            .await
        {
            Ok(token) => {
                let access = token.access_token.clone();
                state.oauth = Some(token);
                state.last_refresh = Some(Utc::now());
                info!(username = self.username(), "OAuth token obtained");
                Ok(access)
            }
            Err(e) => {
                state.oauth = None;
                Err(e)
            }
        }
    }

    /// Create a new API session, trying up to `attempts` times.
    pub async fn authenticate(&self, attempts: u32) -> Result<(), ApiError> {
        let mut state = self.state.lock().await;
        self.authenticate_locked(&mut state, attempts, None).await
    }

    async fn authenticate_locked(
        &self,
        state: &mut SessionState,
        attempts: u32,
        prefetched: Option<Response>,
    ) -> Result<(), ApiError> {
        let result = self.try_authenticate(state, attempts, prefetched).await;
        if result.is_err() {
            state.mark_disconnected();
        }
        result
    }

    async fn try_authenticate(
        &self,
        state: &mut SessionState,
        attempts: u32,
        mut prefetched: Option<Response>,
    ) -> Result<(), ApiError> {
        let url = self.config.api_url(NEW_SESSION_ENDPOINT);
        let backoff = self.config.backoff();
        let mut last_failure = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                backoff.wait(attempt - 1, &self.cancel).await?;
            }

            let bearer = self.ensure_token_locked(state).await?;

            let response = match prefetched.take() {
                Some(response) => response,
                None => {
                    self.client
                        .post(&url)
                        .bearer_auth(&bearer)
                        .form(&self.session_form())
                        .send()
                        .await?
                }
            };

            let status = response.status();
            if status == StatusCode::OK || status == StatusCode::CREATED {
                // Only a freshly created session (201) carries a new token
                let session_token = if status == StatusCode::CREATED {
                    Some(Self::parse_session_token(response).await?)
                } else {
                    None
                };

                state.mark_authenticated(session_token);
                info!(attempt = attempt + 1, status = %status, "Session authenticated");

                if self.config.persist_token {
                    self.persist_push_token(state, &bearer).await?;
                }
                self.save_session(state);
                return Ok(());
            }

            let body = response.text().await.unwrap_or_default();
            warn!(
                attempt = attempt + 1,
                attempts,
                status = %status,
                "Session request failed"
            );
            last_failure = Some(ApiError::from_status(status, &body));
        }

        Err(last_failure.unwrap_or_else(|| {
            ApiError::AuthenticationFailed("No authentication attempts were made".to_string())
        }))
    }

    fn session_form(&self) -> [(&'static str, &str); 4] {
        [
            ("api_version", API_VERSION),
            ("device[os]", DEVICE_OS),
            ("device[hardware_id]", self.config.hardware_id.as_str()),
            ("device[app_brand]", APP_BRAND),
        ]
    }

    async fn parse_session_token(response: Response) -> Result<String, ApiError> {
        let parsed: NewSessionResponse = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse session response: {}", e)))?;
        parsed
            .profile
            .authentication_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                ApiError::InvalidResponse("Session response has no authentication token".to_string())
            })
    }

    async fn persist_push_token(&self, state: &SessionState, bearer: &str) -> Result<(), ApiError> {
        let Some(ref notify_url) = self.config.push_token_notify_url else {
            return Ok(());
        };

        let url = self.config.api_url(PERSIST_TOKEN_ENDPOINT);
        let auth_token = state.session_token.clone().unwrap_or_default();
        let form = [
            ("api_version", API_VERSION),
            ("device[metadata][api_version]", API_VERSION),
            ("device[os]", DEVICE_OS),
            ("device[push_notification_token]", notify_url.as_str()),
            ("auth_token", auth_token.as_str()),
        ];

        let response = self
            .client
            .put(&url)
            .bearer_auth(bearer)
            .form(&form)
            .send()
            .await?;

        if response.status().is_success() {
            debug!("Push token registered");
        } else {
            warn!(status = %response.status(), "Push token registration failed");
        }
        Ok(())
    }

    /// Write a fresh snapshot of the session. Failures are logged, not fatal.
    fn save_session(&self, state: &SessionState) {
        if let Some(ref cache) = self.cache {
            let record = state.snapshot(self.username());
            if let Err(e) = cache.save(&record) {
                warn!(error = %e, "Failed to save session cache");
            }
        }
    }

    /// Reuse the cached session if it belongs to this account and the
    /// server still accepts it; otherwise authenticate from scratch.
    pub async fn load_cached_session(&self) -> Result<(), ApiError> {
        let Some(ref cache) = self.cache else {
            return self.authenticate(self.config.attempts).await;
        };

        let record = match cache.load() {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!("No cached session");
                return self.authenticate(self.config.attempts).await;
            }
            Err(e) => {
                debug!(error = %e, "Ignoring unreadable session cache");
                return self.authenticate(self.config.attempts).await;
            }
        };

        if record.usable_token(self.username()).is_none() {
            debug!("Cached session is for another account or has no token");
            return self.authenticate(self.config.attempts).await;
        }

        self.state.lock().await.adopt_cached(record);

        let url = self.config.api_url(DEVICES_ENDPOINT);
        let validation = self.query(&url, QueryOptions::get().raw()).await?;

        match validation.and_then(QueryOutcome::into_raw) {
            Some(response) if response.status() == StatusCode::OK => {
                info!("Reusing cached session");
                let mut state = self.state.lock().await;
                self.authenticate_locked(&mut state, self.config.attempts, Some(response))
                    .await
            }
            _ => {
                info!("Cached session rejected, authenticating");
                self.authenticate(self.config.attempts).await
            }
        }
    }

    /// Forget the session: clears in-memory tokens and the cache file.
    pub async fn logout(&self) -> anyhow::Result<()> {
        *self.state.lock().await = SessionState::new();
        if let Some(ref cache) = self.cache {
            cache.clear()?;
        }
        info!(username = self.username(), "Logged out");
        Ok(())
    }

    // ===== Query Execution =====

    /// Run one API call with automatic re-authentication on 401.
    ///
    /// Returns `Ok(None)` when the call did not succeed (soft failure).
    /// Transport errors and authentication failures are returned as `Err`.
    pub async fn query(
        &self,
        url: &str,
        options: QueryOptions,
    ) -> Result<Option<QueryOutcome>, ApiError> {
        let attempts = options.attempts.unwrap_or(self.config.attempts);
        let timeout = options
            .timeout
            .unwrap_or_else(|| self.config.request_timeout());
        let backoff = self.config.backoff();
        let mut server_failures = 0;

        debug!(url = url, method = ?options.method, attempts, "Querying");

        for attempt in 1..=attempts {
            let (bearer, params, generation) = {
                let mut state = self.state.lock().await;
                let bearer = self.ensure_token_locked(&mut state).await?;
                let params =
                    state.request_params(&options.extra_params, self.config.sticky_extra_params);
                (bearer, params, state.generation)
            };

            let mut request = self
                .client
                .request(options.method.as_reqwest(), url)
                .bearer_auth(&bearer)
                .query(&params)
                .timeout(timeout);
            if options.method == Method::Post {
                if let Some(ref body) = options.json {
                    request = request.json(body);
                }
            }

            let response = request.send().await.map_err(|e| {
                warn!(url = url, error = %e, "Query transport failure");
                ApiError::from(e)
            })?;

            let status = response.status();
            debug!(url = url, attempt, status = %status, "Query response");

            match status {
                StatusCode::UNAUTHORIZED => {
                    let mut state = self.state.lock().await;
                    if state.generation == generation {
                        state.mark_disconnected();
                        info!(url = url, "Unauthorized, re-authenticating");
                        self.authenticate_locked(&mut state, self.config.attempts, None)
                            .await?;
                    } else {
                        debug!("Session already renewed by another caller");
                    }
                }
                StatusCode::OK | StatusCode::NO_CONTENT => {
                    return Self::finish(url, &options, status, response).await.map(Some);
                }
                s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => {
                    if attempt < attempts {
                        backoff.wait(server_failures, &self.cancel).await?;
                        server_failures += 1;
                    }
                }
                _ => {
                    debug!(url = url, status = %status, "Query failed");
                    return Ok(None);
                }
            }
        }

        debug!(url = url, "Query attempts exhausted");
        Ok(None)
    }

    /// Decode a successful response. Only GET bodies are parsed.
    async fn finish(
        url: &str,
        options: &QueryOptions,
        status: StatusCode,
        response: Response,
    ) -> Result<QueryOutcome, ApiError> {
        if options.raw {
            return Ok(QueryOutcome::Raw(response));
        }
        if options.method == Method::Get && status == StatusCode::OK {
            let value = response.json().await.map_err(|e| {
                ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", url, e))
            })?;
            return Ok(QueryOutcome::Json(value));
        }
        Ok(QueryOutcome::NoContent)
    }

    /// GET an endpoint relative to the API origin and decode the JSON body.
    pub async fn get_json(
        &self,
        endpoint: &str,
    ) -> Result<Option<serde_json::Value>, ApiError> {
        let url = self.api_url(endpoint);
        Ok(self
            .query(&url, QueryOptions::get())
            .await?
            .and_then(QueryOutcome::into_json))
    }

    // ===== Devices =====

    /// Fetch the raw device listing. A failed query yields an empty listing.
    pub async fn device_list(&self) -> Result<DeviceList, ApiError> {
        match self.get_json(DEVICES_ENDPOINT).await? {
            Some(value) => serde_json::from_value(value).map_err(|e| {
                ApiError::InvalidResponse(format!("Failed to parse device list: {}", e))
            }),
            None => {
                warn!("Device listing failed");
                Ok(DeviceList::default())
            }
        }
    }

    pub async fn devices(&self) -> Result<Devices, ApiError> {
        let list = self.device_list().await?;
        Ok(Devices::from_list(&list))
    }

    pub async fn devices_of(&self, kind: DeviceKind) -> Result<Vec<Device>, ApiError> {
        let list = self.device_list().await?;
        Ok(list.devices(kind))
    }

    /// Owned and shared doorbells.
    pub async fn doorbells(&self) -> Result<Vec<Device>, ApiError> {
        self.devices_of(DeviceKind::Doorbell).await
    }

    pub async fn chimes(&self) -> Result<Vec<Device>, ApiError> {
        self.devices_of(DeviceKind::Chime).await
    }

    pub async fn stickup_cams(&self) -> Result<Vec<Device>, ApiError> {
        self.devices_of(DeviceKind::StickupCam).await
    }

    /// Refresh attributes of the given devices from one listing.
    /// Returns how many devices were found and updated.
    pub async fn update<'a, I>(&self, devices: I) -> Result<usize, ApiError>
    where
        I: IntoIterator<Item = &'a mut Device>,
    {
        let list = self.device_list().await?;
        let mut updated = 0;
        for device in devices {
            debug!(kind = %device.kind(), name = device.name(), "Updating device attributes");
            if device.refresh_from(&list) {
                updated += 1;
            }
        }
        Ok(updated)
    }
}

impl std::fmt::Debug for RingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingClient")
            .field("username", &self.username())
            .field("api_base_url", &self.config.api_base_url)
            .field("reuse_session", &self.cache.is_some())
            .finish()
    }
}
