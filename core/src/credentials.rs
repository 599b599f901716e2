// Cached identity record + file-backed credential store.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::AuthResult;

const IDENTITY_FILE: &str = "identity.json";

/// Last-known identity: who the user is plus the credentials that
/// authenticate them to the chat backend. The `token` proves a successful
/// gateway login; `chat_username`/`chat_password` authenticate the protocol
/// connection and are distinct from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub email: String,
    pub chat_username: Option<String>,
    pub chat_password: Option<String>,
    pub token: Option<String>,
}

impl Identity {
    /// The username the protocol connection should bind as. Falls back to the
    /// account email when the backend did not issue a dedicated chat username.
    pub fn connection_username(&self) -> &str {
        match self.chat_username.as_deref() {
            Some(u) if !u.is_empty() => u,
            _ => &self.email,
        }
    }

    /// An identity can open a connection iff it has a non-empty username
    /// (dedicated or email) and a non-empty chat password.
    pub fn usable_for_connection(&self) -> bool {
        let has_user = !self.connection_username().is_empty();
        let has_pass = self
            .chat_password
            .as_deref()
            .map(|p| !p.is_empty())
            .unwrap_or(false);
        has_user && has_pass
    }
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to encode identity record: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to write identity record: {0}")]
    Write(#[from] std::io::Error),
}

/// Durable cache of the last-known identity. Constructed explicitly and owned
/// by the session core; there is no process-wide singleton.
///
/// Writes go through a sibling temp file + rename so a failed write leaves the
/// previous record intact rather than a half-written one.
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(data_dir: &str) -> Self {
        Self {
            path: Path::new(data_dir).join(IDENTITY_FILE),
        }
    }

    /// Side-effect-free read of the cached identity. A missing or unreadable
    /// record is treated as "not cached", never as a hard error.
    pub fn restore(&self) -> Option<Identity> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str::<Identity>(&raw) {
            Ok(identity) => Some(identity),
            Err(e) => {
                tracing::warn!(%e, path = %self.path.display(), "cached identity unreadable, treating as absent");
                None
            }
        }
    }

    /// Commits the whole identity + token from a gateway login atomically.
    pub fn set_identity(&self, auth: &AuthResult) -> Result<(), PersistenceError> {
        let identity = auth.identity();
        let json = serde_json::to_string_pretty(&identity)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Removes the cached identity. Idempotent: clearing an empty store is a
    /// no-op.
    pub fn clear(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(%e, path = %self.path.display(), "failed to clear cached identity");
            }
        }
    }

    /// Derived, never stored: authenticated iff an identity with a session
    /// token is cached.
    pub fn is_authenticated(&self) -> bool {
        self.restore().map(|i| i.token.is_some()).unwrap_or(false)
    }
}
