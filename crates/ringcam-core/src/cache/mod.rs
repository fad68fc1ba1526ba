//! Durable session cache.
//!
//! This module provides the `CacheStore` for persisting the authenticated
//! session (account, session token, OAuth token) between runs so a restart
//! can skip the password grant. The record is rewritten as a whole after
//! every successful authentication, atomically via temp-file-and-rename.

pub mod manager;

pub use manager::{CacheRecord, CacheStore};
