use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(
        "client secret not found.\n  \
         Checked: {hidden}\n  \
         Checked: {visible}\n\n\
         Please follow these steps:\n  \
         1. Go to https://console.cloud.google.com/\n  \
         2. Create a new project or select an existing one\n  \
         3. Enable the Google Drive API\n  \
         4. Go to 'Credentials' → 'Create Credentials' → 'OAuth client ID'\n  \
         5. Choose 'Desktop app' as the application type\n  \
         6. Download the JSON file and save it as: {visible}\n     \
         (Or {hidden} if you prefer a hidden file)",
        hidden = .hidden.display(),
        visible = .visible.display()
    )]
    CredentialsNotFound { hidden: PathBuf, visible: PathBuf },

    #[error("failed to read credentials: {0}")]
    CredentialRead(String),

    #[error("token cache error: {0}")]
    TokenCache(String),

    #[error("OAuth2 error: {0}")]
    OAuth2(String),

    #[error("Drive API error: {0}")]
    DriveApi(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Outcome taxonomy for a single upload attempt. The three variants map to
/// the three distinct failure points: the local file is absent, credentials
/// could not be established, or a remote Drive call was rejected.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("file not found: {}", .0.display())]
    LocalFile(PathBuf),

    #[error("authentication failed: {0}")]
    Auth(#[source] AppError),

    #[error("remote call failed: {0}")]
    Remote(#[source] AppError),
}
