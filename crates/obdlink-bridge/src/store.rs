//! Durable session store for provisioning state.
//!
//! Two facts survive restarts: the platform-assigned AE-ID and the
//! setup-complete flag that gates telemetry publishing. They are kept in a
//! small JSON file, rewritten on every mutation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct SessionData {
    ae_id: Option<String>,
    setup_complete: bool,
}

/// Persisted key-value store for the device's provisioning state.
#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    data: SessionData,
}

impl SessionStore {
    /// Open the store, loading existing state if the file is present.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let data = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
                path: path.clone(),
                source: e,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SessionData::default(),
            Err(e) => {
                return Err(StoreError::Read {
                    path: path.clone(),
                    source: e,
                });
            }
        };
        debug!(path = %path.display(), ae_id = ?data.ae_id, setup_complete = data.setup_complete, "session store opened");
        Ok(Self { path, data })
    }

    /// The cached AE-ID, if provisioning has resolved one.
    pub fn ae_id(&self) -> Option<&str> {
        self.data.ae_id.as_deref()
    }

    /// Cache and persist the AE-ID.
    pub fn set_ae_id(&mut self, ae_id: impl Into<String>) -> Result<(), StoreError> {
        self.data.ae_id = Some(ae_id.into());
        self.persist()
    }

    /// Whether the one-time provisioning flow has completed.
    pub fn is_setup_complete(&self) -> bool {
        self.data.setup_complete
    }

    /// Mark provisioning complete. Never cleared by normal operation.
    pub fn set_setup_complete(&mut self) -> Result<(), StoreError> {
        self.data.setup_complete = true;
        self.persist()
    }

    fn persist(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let content =
            serde_json::to_string_pretty(&self.data).map_err(StoreError::Serialize)?;
        std::fs::write(&self.path, content).map_err(|e| StoreError::Write {
            path: self.path.clone(),
            source: e,
        })
    }
}

/// Session store errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    #[error("failed to read session store {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("session store {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to write session store {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to serialize session data: {0}")]
    Serialize(serde_json::Error),
}
