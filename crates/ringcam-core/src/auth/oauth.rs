//! OAuth bearer tokens for the Ring API.
//!
//! Tokens come from the password grant (with an optional second factor
//! delivered through a caller-supplied callback) and are renewed with the
//! refresh grant. Every token is stamped with the local time it was issued
//! so expiry can be computed without trusting the server clock.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::{de, Deserialize, Deserializer, Serialize};
use tracing::{debug, info};

use crate::api::ApiError;

use super::Credentials;

/// OAuth client identifier expected by the token endpoint.
const CLIENT_ID: &str = "ring_official_android";

/// Scope requested for every grant.
const SCOPE: &str = "client";

/// Lifetime assumed when the server omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

const TWO_FACTOR_SUPPORT_HEADER: &str = "2fa-support";
const TWO_FACTOR_CODE_HEADER: &str = "2fa-code";

/// Invoked when the token endpoint asks for a one-time code.
///
/// An error (for example a failed terminal read) aborts the login instead of
/// sending an empty code.
pub type AuthCallback = Arc<dyn Fn() -> std::io::Result<String> + Send + Sync>;

fn default_expires_in() -> i64 {
    DEFAULT_EXPIRES_IN_SECS
}

fn non_negative_secs<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = i64::deserialize(deserializer)?;
    if secs < 0 {
        return Err(de::Error::custom(format!("negative expires_in: {}", secs)));
    }
    Ok(secs)
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_expires_in", deserialize_with = "non_negative_secs")]
    pub expires_in: i64,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub issued_at: Option<DateTime<Utc>>,
}

impl OAuthToken {
    /// `None` without an issue time. A lifetime too large to represent
    /// saturates at the latest representable instant.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let issued = self.issued_at?;
        let expiry = Duration::try_seconds(self.expires_in)
            .and_then(|lifetime| issued.checked_add_signed(lifetime))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Some(expiry)
    }

    /// A token with no known issue time counts as expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at() {
            Some(expiry) => now >= expiry,
            None => true,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

impl fmt::Debug for OAuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthToken")
            .field("access_token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// Client for the OAuth token endpoint.
/// Clone is cheap - shares the underlying connection pool.
#[derive(Clone)]
pub struct OAuthClient {
    client: Client,
    url: String,
}

impl OAuthClient {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// Run the password grant, asking `callback` for a code if required.
    pub async fn fetch_token(
        &self,
        credentials: &Credentials,
        callback: Option<&AuthCallback>,
    ) -> Result<OAuthToken, ApiError> {
        let response = self.password_grant(credentials, None).await?;

        if response.status() == StatusCode::PRECONDITION_FAILED {
            let callback = callback.ok_or(ApiError::TwoFactorRequired)?;
            info!("Second factor required");
            let code = Self::request_code(Arc::clone(callback)).await?;
            let response = self.password_grant(credentials, Some(&code)).await?;
            return Self::parse_token(response).await;
        }

        Self::parse_token(response).await
    }

    /// Exchange a refresh token for a new access token.
    pub async fn refresh_tokens(&self, token: &OAuthToken) -> Result<OAuthToken, ApiError> {
        let refresh_token = token.refresh_token.as_deref().ok_or_else(|| {
            ApiError::AuthenticationFailed("No refresh token available".to_string())
        })?;

        debug!("Refreshing OAuth token");
        let response = self
            .client
            .post(&self.url)
            .form(&[
                ("client_id", CLIENT_ID),
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("scope", SCOPE),
            ])
            .send()
            .await?;

        Self::parse_token(response).await
    }

    async fn password_grant(
        &self,
        credentials: &Credentials,
        code: Option<&str>,
    ) -> Result<Response, ApiError> {
        debug!(username = credentials.username(), with_code = code.is_some(), "Requesting OAuth token");
        let response = self
            .client
            .post(&self.url)
            .header(TWO_FACTOR_SUPPORT_HEADER, "true")
            .header(TWO_FACTOR_CODE_HEADER, code.unwrap_or(""))
            .form(&[
                ("client_id", CLIENT_ID),
                ("grant_type", "password"),
                ("username", credentials.username()),
                ("password", credentials.password()),
                ("scope", SCOPE),
            ])
            .send()
            .await?;
        Ok(response)
    }

    /// The callback may block on user input, so it runs off the async workers.
    async fn request_code(callback: AuthCallback) -> Result<String, ApiError> {
        let code = tokio::task::spawn_blocking(move || callback())
            .await
            .map_err(|e| ApiError::AuthenticationFailed(format!("Code callback failed: {}", e)))?
            .map_err(|e| {
                ApiError::AuthenticationFailed(format!("Failed to read two-factor code: {}", e))
            })?;

        let code = code.trim();
        if code.is_empty() {
            return Err(ApiError::AuthenticationFailed(
                "Empty two-factor code".to_string(),
            ));
        }
        Ok(code.to_string())
    }

    async fn parse_token(response: Response) -> Result<OAuthToken, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &body));
        }

        let mut token: OAuthToken = response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse OAuth token: {}", e)))?;
        token.issued_at = Some(Utc::now());
        Ok(token)
    }
}
