//! REST API client module for the Ring cloud API.
//!
//! This module provides the `RingClient`, which owns the session lifecycle
//! (OAuth token, legacy session token, cached session reuse) and executes
//! queries with automatic re-authentication on 401.
//!
//! Authenticated calls carry `Authorization: Bearer <oauth token>` plus the
//! `api_version` and `auth_token` query parameters.

pub mod client;
pub mod error;
pub mod query;

pub use client::RingClient;
pub use error::ApiError;
pub use query::{Method, QueryOptions, QueryOutcome};
