mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{Duration, Utc};
use common::*;
use ringcam_core::{ApiError, AuthCallback, RingClient};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_connect_creates_session() {
    let mock = RingMock::start().await;
    mock.mount_password_grant("access-1", 1).await;
    mock.mount_session_created("sess-1", 1).await;

    let client = RingClient::connect(mock.config(), mock.credentials(), None)
        .await
        .unwrap();

    assert!(client.is_connected().await);
    assert_eq!(client.session_token().await.as_deref(), Some("sess-1"));
    assert!(client.last_refresh().await.is_some());

    let posts = mock.requests_to(SESSION_PATH).await;
    let auth = posts[0].headers.get("authorization").unwrap().to_str().unwrap();
    assert_eq!(auth, "Bearer access-1");
}

#[tokio::test]
async fn test_ensure_token_reuses_valid_token() {
    let mock = RingMock::start().await;
    mock.mount_password_grant("access-1", 1).await;
    mock.mount_refresh_grant("access-2", 0).await;
    mock.mount_session_created("sess-1", 1).await;

    let client = RingClient::connect(mock.config(), mock.credentials(), None)
        .await
        .unwrap();

    let first = client.ensure_token().await.unwrap();
    let second = client.ensure_token().await.unwrap();
    assert_eq!(first, "access-1");
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_expired_token_triggers_single_refresh() {
    let mock = RingMock::start().await;
    let dir = tempfile::tempdir().unwrap();
    let cache_file = dir.path().join("session.json");
    write_cache(
        &cache_file,
        &cache_body(USERNAME, "sess-cached", "access-old", Utc::now() - Duration::hours(2)),
    );

    mock.mount_password_grant("access-pw", 0).await;
    mock.mount_refresh_grant("access-new", 1).await;
    mock.mount_session_created("sess-new", 0).await;
    Mock::given(method("GET"))
        .and(path(DEVICES_PATH))
        .and(header("authorization", "Bearer access-new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(device_list_body()))
        .expect(1)
        .mount(&mock.server)
        .await;

    let client = RingClient::connect(mock.config_with_cache(&cache_file), mock.credentials(), None)
        .await
        .unwrap();

    assert_eq!(client.ensure_token().await.unwrap(), "access-new");
    assert_eq!(client.session_token().await.as_deref(), Some("sess-cached"));
    assert!(client.is_connected().await);
}

#[tokio::test]
async fn test_failed_refresh_falls_back_to_password_grant() {
    let mock = RingMock::start().await;
    let dir = tempfile::tempdir().unwrap();
    let cache_file = dir.path().join("session.json");
    write_cache(
        &cache_file,
        &cache_body(USERNAME, "sess-cached", "access-old", Utc::now() - Duration::hours(2)),
    );

    Mock::given(method("POST"))
        .and(path(OAUTH_PATH))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
        .expect(1)
        .mount(&mock.server)
        .await;
    mock.mount_password_grant("access-pw", 1).await;
    mock.mount_devices(device_list_body(), 1).await;

    let client = RingClient::connect(mock.config_with_cache(&cache_file), mock.credentials(), None)
        .await
        .unwrap();

    assert_eq!(client.ensure_token().await.unwrap(), "access-pw");
}

#[tokio::test]
async fn test_authenticate_succeeds_after_failed_attempts() {
    let mock = RingMock::start().await;
    mock.mount_password_grant("access-1", 1).await;
    Mock::given(method("POST"))
        .and(path(SESSION_PATH))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .expect(2)
        .mount(&mock.server)
        .await;
    mock.mount_session_created("sess-3", 1).await;

    let client = RingClient::new(mock.config(), mock.credentials()).unwrap();
    assert!(!client.is_connected().await);

    client.authenticate(3).await.unwrap();

    assert!(client.is_connected().await);
    assert_eq!(client.session_token().await.as_deref(), Some("sess-3"));
}

#[tokio::test]
async fn test_authenticate_exhaustion_raises_last_status() {
    let mock = RingMock::start().await;
    mock.mount_password_grant("access-1", 1).await;
    Mock::given(method("POST"))
        .and(path(SESSION_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(3)
        .mount(&mock.server)
        .await;

    let client = RingClient::new(mock.config(), mock.credentials()).unwrap();
    let result = client.authenticate(3).await;

    assert!(matches!(result, Err(ApiError::ServerError(ref body)) if body == "boom"));
    assert!(!client.is_connected().await);
}

#[tokio::test]
async fn test_session_200_keeps_existing_token() {
    let mock = RingMock::start().await;
    mock.mount_password_grant("access-1", 1).await;
    Mock::given(method("POST"))
        .and(path(SESSION_PATH))
        .respond_with(ResponseTemplate::new(201).set_body_json(session_body("sess-1")))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&mock.server)
        .await;
    Mock::given(method("POST"))
        .and(path(SESSION_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock.server)
        .await;

    let client = RingClient::connect(mock.config(), mock.credentials(), None)
        .await
        .unwrap();
    client.authenticate(3).await.unwrap();

    assert_eq!(client.session_token().await.as_deref(), Some("sess-1"));
    assert!(client.is_connected().await);
}

#[tokio::test]
async fn test_created_session_without_token_is_invalid() {
    let mock = RingMock::start().await;
    mock.mount_password_grant("access-1", 1).await;
    Mock::given(method("POST"))
        .and(path(SESSION_PATH))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"profile": {}})))
        .mount(&mock.server)
        .await;

    let client = RingClient::new(mock.config(), mock.credentials()).unwrap();
    let result = client.authenticate(3).await;

    assert!(matches!(result, Err(ApiError::InvalidResponse(_))));
    assert!(!client.is_connected().await);
}

#[tokio::test]
async fn test_two_factor_code_from_callback() {
    let mock = RingMock::start().await;
    Mock::given(method("POST"))
        .and(path(OAUTH_PATH))
        .and(header("2fa-code", "123456"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("access-2fa")))
        .expect(1)
        .with_priority(1)
        .mount(&mock.server)
        .await;
    Mock::given(method("POST"))
        .and(path(OAUTH_PATH))
        .respond_with(ResponseTemplate::new(412))
        .expect(1)
        .mount(&mock.server)
        .await;
    mock.mount_session_created("sess-1", 1).await;

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let callback: AuthCallback = Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(" 123456\n".to_string())
    });

    let client = RingClient::connect(mock.config(), mock.credentials(), Some(callback))
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(client.ensure_token().await.unwrap(), "access-2fa");
}

#[tokio::test]
async fn test_two_factor_without_callback_fails() {
    let mock = RingMock::start().await;
    Mock::given(method("POST"))
        .and(path(OAUTH_PATH))
        .respond_with(ResponseTemplate::new(412))
        .mount(&mock.server)
        .await;
    mock.mount_session_created("sess-1", 0).await;

    let result = RingClient::connect(mock.config(), mock.credentials(), None).await;
    assert!(matches!(result, Err(ApiError::TwoFactorRequired)));
}

#[tokio::test]
async fn test_blank_two_factor_code_aborts_login() {
    let mock = RingMock::start().await;
    Mock::given(method("POST"))
        .and(path(OAUTH_PATH))
        .respond_with(ResponseTemplate::new(412))
        .expect(1)
        .mount(&mock.server)
        .await;
    mock.mount_session_created("sess-1", 0).await;

    let callback: AuthCallback = Arc::new(|| Ok(String::new()));
    let result = RingClient::connect(mock.config(), mock.credentials(), Some(callback)).await;

    assert!(matches!(result, Err(ApiError::AuthenticationFailed(_))));
}

#[tokio::test]
async fn test_bad_password_propagates() {
    let mock = RingMock::start().await;
    Mock::given(method("POST"))
        .and(path(OAUTH_PATH))
        .respond_with(ResponseTemplate::new(401))
        .mount(&mock.server)
        .await;

    let client = RingClient::new(mock.config(), mock.credentials()).unwrap();
    assert!(matches!(client.ensure_token().await, Err(ApiError::Unauthorized)));
    assert!(matches!(client.authenticate(3).await, Err(ApiError::Unauthorized)));
    assert!(!client.is_connected().await);
}

#[tokio::test]
async fn test_persist_token_registers_push_url() {
    let mock = RingMock::start().await;
    mock.mount_password_grant("access-1", 1).await;
    mock.mount_session_created("sess-1", 1).await;
    Mock::given(method("PUT"))
        .and(path(PUSH_TOKEN_PATH))
        .and(body_string_contains("push_notification_token"))
        .and(body_string_contains("auth_token=sess-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock.server)
        .await;

    let config = mock
        .config()
        .with_persist_token(true, Some("http://example.test/notify".to_string()));
    RingClient::connect(config, mock.credentials(), None)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_cancelled_backoff_stops_authentication() {
    let mock = RingMock::start().await;
    mock.mount_password_grant("access-1", 1).await;
    Mock::given(method("POST"))
        .and(path(SESSION_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&mock.server)
        .await;

    let config = mock
        .config()
        .with_retry_backoff(std::time::Duration::from_secs(30), std::time::Duration::from_secs(30));
    let client = RingClient::new(config, mock.credentials()).unwrap();
    let cancel = client.cancellation_token();

    let (result, _) = tokio::join!(client.authenticate(3), async move {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        cancel.cancel();
    });

    assert!(matches!(result, Err(ApiError::Cancelled)));
    assert!(!client.is_connected().await);
}

#[tokio::test]
async fn test_authenticate_transport_error_is_not_retried() {
    let mock = RingMock::start().await;
    mock.mount_password_grant("access-1", 1).await;

    // OAuth goes to the mock, the API origin is a closed port
    let config = mock.config().with_api_base_url("http://127.0.0.1:1");
    let client = RingClient::new(config, mock.credentials()).unwrap();

    let result = client.authenticate(3).await;

    assert!(matches!(result, Err(ApiError::NetworkError(_))));
    assert!(!client.is_connected().await);
    assert!(client.session_token().await.is_none());
}

#[tokio::test]
async fn test_huge_server_token_lifetime_is_reused() {
    let mock = RingMock::start().await;
    let mut body = token_body("access-long");
    body["expires_in"] = serde_json::json!(9_000_000_000_000_000_000_i64);
    Mock::given(method("POST"))
        .and(path(OAUTH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(&mock.server)
        .await;
    mock.mount_session_created("sess-1", 1).await;

    let client = RingClient::connect(mock.config(), mock.credentials(), None)
        .await
        .unwrap();

    assert_eq!(client.ensure_token().await.unwrap(), "access-long");
    assert_eq!(client.ensure_token().await.unwrap(), "access-long");
}
