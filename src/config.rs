//! Run configuration resolved once at startup

use crate::error::{KubedError, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File under the home directory that records saved cluster settings
pub const SETTINGS_FILE: &str = ".kubedconf";

/// Per-request timeout for calls to the token issuer
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings shared by every phase of a run
#[derive(Debug, Clone)]
pub struct Config {
    pub home: PathBuf,
    pub store_path: PathBuf,
    /// How long to wait for the browser callback
    pub capture_timeout: Duration,
    pub http_timeout: Duration,
}

impl Config {
    /// Build a config rooted at the current user's home directory
    pub fn detect(capture_timeout: Duration) -> Result<Self> {
        let home = dirs_next::home_dir().ok_or(KubedError::NoHomeDir)?;
        Ok(Self::with_home(home, capture_timeout))
    }

    pub fn with_home(home: impl Into<PathBuf>, capture_timeout: Duration) -> Self {
        let home = home.into();
        Self {
            store_path: home.join(SETTINGS_FILE),
            home,
            capture_timeout,
            http_timeout: HTTP_TIMEOUT,
        }
    }

    /// Expand a leading ~ to the home directory
    pub fn expand_home(&self, path: &str) -> PathBuf {
        match path.strip_prefix('~') {
            Some("") => self.home.clone(),
            Some(rest) if rest.starts_with('/') || rest.starts_with('\\') => {
                self.home.join(rest.trim_start_matches(['/', '\\']))
            }
            _ => Path::new(path).to_path_buf(),
        }
    }
}
