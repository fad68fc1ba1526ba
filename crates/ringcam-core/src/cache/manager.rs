use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::auth::OAuthToken;

/// Persisted snapshot of an authenticated session.
///
/// Unknown keys found on disk are carried in `extra` and written back
/// untouched, so other tools sharing the file keep their data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheRecord {
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub auth: Option<OAuthToken>,
    #[serde(default)]
    pub alerts: Map<String, Value>,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CacheRecord {
    /// The cached session token, if this record belongs to `username`.
    pub fn usable_token(&self, username: &str) -> Option<&str> {
        match (self.account.as_deref(), self.token.as_deref()) {
            (Some(account), Some(token)) if account == username && !token.is_empty() => {
                Some(token)
            }
            _ => None,
        }
    }
}

/// File-backed store for a single `CacheRecord`.
#[derive(Debug, Clone)]
pub struct CacheStore {
    path: PathBuf,
}

impl CacheStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the record. `Ok(None)` when no cache file exists.
    pub fn load(&self) -> Result<Option<CacheRecord>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read cache file: {}", self.path.display()))?;

        let record: CacheRecord = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse cache file: {}", self.path.display()))?;

        Ok(Some(record))
    }

    /// Write the record atomically: temp file in the same directory, then rename.
    pub fn save(&self, record: &CacheRecord) -> Result<()> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent)
            .with_context(|| format!("Failed to create cache directory: {}", parent.display()))?;

        let contents = serde_json::to_string_pretty(record)?;
        let mut tmp = NamedTempFile::new_in(&parent).context("Failed to create temp cache file")?;
        tmp.write_all(contents.as_bytes())
            .context("Failed to write temp cache file")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .with_context(|| format!("Failed to replace cache file: {}", self.path.display()))?;

        debug!(path = %self.path.display(), "Session cache saved");
        Ok(())
    }

    /// Remove the cache file if present.
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
