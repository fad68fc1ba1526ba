//! Client library for the Ring doorbell and camera cloud API.
//!
//! The library authenticates with username/password (plus an optional
//! second factor), keeps the OAuth and session tokens fresh, caches the
//! session on disk for reuse across restarts, and retries queries that fail
//! with 401 after re-authenticating.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod models;
pub mod retry;

pub use api::{ApiError, Method, QueryOptions, QueryOutcome, RingClient};
pub use auth::{AuthCallback, CredentialStore, Credentials, OAuthToken};
pub use cache::{CacheRecord, CacheStore};
pub use config::ClientConfig;
pub use models::{Device, DeviceKind, DeviceList, Devices, RingDevice};
