//! Bearer-token persistence and the login gate.
//!
//! Tokens are whatever `/login` issued; the client never decides validity on
//! its own. A stored token only means "send it"; the backend answers 401 when
//! it is no longer accepted and the HTTP layer clears it.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult};

pub trait TokenStore: Send + Sync {
    fn load(&self) -> Option<String>;
    fn store(&self, token: &str) -> ClientResult<()>;
    fn clear(&self);
}

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<String> {
        self.token
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    fn store(&self, token: &str) -> ClientResult<()> {
        let mut guard = self
            .token
            .write()
            .map_err(|_| ClientError::TokenStore("token lock poisoned".to_string()))?;
        *guard = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) {
        if let Ok(mut guard) = self.token.write() {
            *guard = None;
        }
    }
}

/// Token persisted as a single line in a file, so CLI invocations share a login.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("analyst").join("token"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Option<String> {
        let raw = fs::read_to_string(&self.path).ok()?;
        let token = raw.trim();
        if token.is_empty() {
            None
        } else {
            Some(token.to_string())
        }
    }

    fn store(&self, token: &str) -> ClientResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                ClientError::TokenStore(format!(
                    "failed to create '{}': {err}",
                    parent.display()
                ))
            })?;
        }
        write_private(&self.path, token).map_err(|err| {
            ClientError::TokenStore(format!("failed to write '{}': {err}", self.path.display()))
        })?;
        debug!(path = %self.path.display(), "auth: token persisted");
        Ok(())
    }

    fn clear(&self) {
        if !self.path.exists() {
            return;
        }
        if let Err(err) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %err, "auth: failed to remove token file");
        }
    }
}

/// Owner-only on unix; an existing file is tightened before it is truncated.
fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
        options.mode(0o600);
        if path.exists() {
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
        }
    }
    let mut file = options.open(path)?;
    file.write_all(contents.as_bytes())
}

/// Decides whether a route needs a signed-in user.
#[derive(Clone)]
pub struct AccessGate {
    tokens: Arc<dyn TokenStore>,
}

impl AccessGate {
    pub fn new(tokens: Arc<dyn TokenStore>) -> Self {
        Self { tokens }
    }

    pub fn is_authenticated(&self) -> bool {
        self.tokens.load().is_some()
    }

    /// Shared reports are public: any path with a `shared` segment skips the gate.
    pub fn requires_login(path: &str) -> bool {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        !path.split('/').any(|segment| segment == "shared")
    }

    pub fn allows(&self, path: &str) -> bool {
        !Self::requires_login(path) || self.is_authenticated()
    }
}
