//! Credential pair and session storage
//!
//! The session store holds at most one `CredentialPair`. It is the single
//! source of truth for token data: the API client reads the pair before each
//! request and only the refresh coordinator replaces or clears it.
//!
//! Two stores are provided. `MemorySessionStore` keeps the pair for the
//! lifetime of the process. `FileSessionStore` persists it as JSON using
//! atomic temp-file + rename writes, so a session survives restarts of the
//! CLI. Both serialize access through a tokio Mutex.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Access/refresh token pair issued by the auth service.
///
/// Both tokens are opaque to the client. Debug output is redacted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPair {
    /// Bearer token attached to API calls
    pub access: String,
    /// Token exchanged for a new access token once `access` expires
    pub refresh: String,
}

impl CredentialPair {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: access.into(),
            refresh: refresh.into(),
        }
    }
}

impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access", &"[REDACTED]")
            .field("refresh", &"[REDACTED]")
            .finish()
    }
}

/// Storage for the current session's credential pair.
///
/// Uses `Pin<Box<dyn Future>>` return types so stores can be shared as
/// `Arc<dyn SessionStore>`. Writes never fail from the caller's point of
/// view: persistence problems are logged and the in-memory state still
/// reflects the latest call.
pub trait SessionStore: Send + Sync {
    /// Current pair, if a session exists.
    fn get(&self) -> Pin<Box<dyn Future<Output = Option<CredentialPair>> + Send + '_>>;

    /// Replace the current pair.
    fn set(&self, pair: CredentialPair) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;

    /// Forget the current session.
    fn clear(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Process-lifetime session store.
#[derive(Default)]
pub struct MemorySessionStore {
    state: Mutex<Option<CredentialPair>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with a pair.
    pub fn with_pair(pair: CredentialPair) -> Self {
        Self {
            state: Mutex::new(Some(pair)),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self) -> Pin<Box<dyn Future<Output = Option<CredentialPair>> + Send + '_>> {
        Box::pin(async move { self.state.lock().await.clone() })
    }

    fn set(&self, pair: CredentialPair) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            *self.state.lock().await = Some(pair);
        })
    }

    fn clear(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            *self.state.lock().await = None;
        })
    }
}

/// Session store persisted to a JSON file.
///
/// The Mutex serializes writes; reads clone the in-memory copy and never
/// touch the disk after `load`.
pub struct FileSessionStore {
    path: PathBuf,
    state: Mutex<Option<CredentialPair>>,
}

impl FileSessionStore {
    /// Load the session from `path`.
    ///
    /// A missing file means no session. The file is not created until a
    /// pair is stored.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading session file: {e}")))?;
            let pair: CredentialPair = serde_json::from_str(&contents)
                .map_err(|e| Error::SessionParse(format!("parsing session file: {e}")))?;
            info!(path = %path.display(), "loaded session");
            Some(pair)
        } else {
            debug!(path = %path.display(), "session file not found, starting signed out");
            None
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self) -> Pin<Box<dyn Future<Output = Option<CredentialPair>> + Send + '_>> {
        Box::pin(async move { self.state.lock().await.clone() })
    }

    fn set(&self, pair: CredentialPair) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            if let Err(e) = write_atomic(&self.path, &pair).await {
                warn!(path = %self.path.display(), error = %e, "failed to persist session");
            }
            *state = Some(pair);
        })
    }

    fn clear(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            *state = None;
            match tokio::fs::remove_file(&self.path).await {
                Ok(()) => debug!(path = %self.path.display(), "removed session file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "failed to remove session file")
                }
            }
        })
    }
}

/// Write the pair to `path` atomically with 0600 permissions.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target so a crash mid-write never leaves a truncated session file.
async fn write_atomic(path: &Path, pair: &CredentialPair) -> Result<()> {
    let json = serde_json::to_string_pretty(pair)
        .map_err(|e| Error::SessionParse(format!("serializing session: {e}")))?;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let tmp_path = dir.join(format!(".session.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp session file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting session file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp session file: {e}")))?;

    debug!(path = %path.display(), "persisted session");
    Ok(())
}
