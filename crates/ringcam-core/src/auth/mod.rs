//! Authentication module for credentials, OAuth tokens and session state.
//!
//! This module provides:
//! - `Credentials`: username/password pair with a redacting `Debug`
//! - `CredentialStore`: OS keychain storage via keyring
//! - `OAuthClient` / `OAuthToken`: password and refresh grants
//! - `SessionState`: the mutable per-client session (tokens, connection
//!   flag, query parameters)

pub mod credentials;
pub mod oauth;
pub mod session;

pub use credentials::{CredentialStore, Credentials};
pub use oauth::{AuthCallback, OAuthClient, OAuthToken};
pub use session::{SessionState, API_VERSION};
