//! On-disk credential store for the OpenAI API key.
//!
//! A single JSON object `{"api_key": "..."}` at an explicit path. The path is
//! injected rather than hard-coded so tests can point the store at a
//! temporary directory. There is no locking; concurrent saves are
//! last-writer-wins.
//!
//! "Not configured" and "unreadable" are different things: a missing file or
//! a missing/empty key is `Ok(None)`, while an I/O failure or a file that is
//! not valid JSON is an error.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

#[derive(Debug, Serialize, Deserialize)]
struct StoredCredential {
    #[serde(default)]
    api_key: String,
}

/// Persists the API key as a small JSON file.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default key file location: `~/.modelbridge/config.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".modelbridge").join("config.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the key, creating parent directories as needed and overwriting
    /// any existing file.
    pub async fn save(&self, key: &str) -> crate::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                BridgeError::CredentialIo(format!(
                    "failed to create {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        let body = serde_json::to_string(&StoredCredential {
            api_key: key.to_string(),
        })
        .map_err(|e| BridgeError::CredentialIo(format!("failed to encode key: {e}")))?;
        tokio::fs::write(&self.path, body).await.map_err(|e| {
            BridgeError::CredentialIo(format!("failed to write {}: {}", self.path.display(), e))
        })?;
        tracing::info!(path = %self.path.display(), "API key saved");
        Ok(())
    }

    /// Read the key. `Ok(None)` means "not configured" — a missing file, or
    /// a file whose key is absent or empty.
    pub async fn load(&self) -> crate::Result<Option<String>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(BridgeError::CredentialIo(format!(
                    "failed to read {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };
        let stored: StoredCredential = serde_json::from_str(&raw).map_err(|e| {
            BridgeError::CredentialMalformed(format!("{}: {}", self.path.display(), e))
        })?;
        if stored.api_key.is_empty() {
            Ok(None)
        } else {
            Ok(Some(stored.api_key))
        }
    }
}
