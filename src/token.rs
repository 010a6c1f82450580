use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// How close to expiry a token may be and still count as usable.
const EXPIRY_SKEW_SECS: i64 = 60;

/// An OAuth2 token pair with the client identity that minted it.
///
/// The client id/secret are carried alongside the tokens so that a refresh
/// exchange works even when the client-secret file has since been removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expiry: DateTime<Utc>,
    pub client_id: String,
    pub client_secret: String,
}

impl Token {
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// A token is valid while it has more than a minute of life left.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_SKEW_SECS) < self.expiry
    }
}

/// On-disk JSON store for the token, overwritten wholesale on every change.
#[derive(Debug, Clone)]
pub struct TokenCache {
    path: PathBuf,
}

impl TokenCache {
    pub const FILE_NAME: &'static str = ".google_drive_token.json";

    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Cache at the fixed location in the user's home directory.
    pub fn from_home() -> Result<Self, AppError> {
        let home = dirs::home_dir()
            .ok_or_else(|| AppError::TokenCache("cannot determine home directory".into()))?;
        Ok(Self::new(home.join(Self::FILE_NAME)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns `Ok(None)` when no cache file exists. A file that exists but
    /// does not parse is an error, not an empty cache.
    pub fn load(&self) -> Result<Option<Token>, AppError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        let token = serde_json::from_str(&content).map_err(|e| {
            AppError::TokenCache(format!(
                "failed to parse token cache {}: {e}",
                self.path.display()
            ))
        })?;
        Ok(Some(token))
    }

    pub fn save(&self, token: &Token) -> Result<(), AppError> {
        let content = serde_json::to_string_pretty(token)?;
        std::fs::write(&self.path, content)?;

        // Owner read/write only; the file holds live credentials.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }
}
