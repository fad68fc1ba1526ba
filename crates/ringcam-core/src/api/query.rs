//! Request options and outcomes for `RingClient::query`.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::{Response, StatusCode};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    Get,
    Put,
    Post,
}

impl Method {
    pub(crate) fn as_reqwest(&self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Put => reqwest::Method::PUT,
            Method::Post => reqwest::Method::POST,
        }
    }
}

/// Per-call settings. Defaults to a parsed GET with the client's attempt
/// budget and timeout.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub method: Method,
    pub attempts: Option<u32>,
    /// Merged over the session's base parameters for this call.
    pub extra_params: BTreeMap<String, String>,
    /// JSON body, only sent with POST.
    pub json: Option<Value>,
    pub raw: bool,
    pub timeout: Option<Duration>,
}

impl QueryOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn put() -> Self {
        Self {
            method: Method::Put,
            ..Self::default()
        }
    }

    pub fn post() -> Self {
        Self {
            method: Method::Post,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_params.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_json(mut self, body: Value) -> Self {
        self.json = Some(body);
        self
    }

    /// Return the transport response untouched instead of decoding it.
    #[must_use]
    pub fn raw(mut self) -> Self {
        self.raw = true;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Successful query result. A failed query is `None` at the call site.
#[derive(Debug)]
pub enum QueryOutcome {
    /// Unparsed response, when `raw` was requested.
    Raw(Response),
    /// Decoded body of a GET.
    Json(Value),
    /// PUT/POST (or an empty GET) succeeded; the body is not read.
    NoContent,
}

impl QueryOutcome {
    pub fn into_json(self) -> Option<Value> {
        match self {
            QueryOutcome::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_raw(self) -> Option<Response> {
        match self {
            QueryOutcome::Raw(response) => Some(response),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            QueryOutcome::Raw(response) => Some(response.status()),
            _ => None,
        }
    }
}
