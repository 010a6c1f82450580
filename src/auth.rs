use std::path::{Path, PathBuf};

use google_drive3::DriveHub;

use crate::error::AppError;
use crate::token::{Token, TokenCache};

pub const SCOPES: &[&str] = &["https://www.googleapis.com/auth/drive.file"];

pub type Hub =
    DriveHub<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>>;

/// The two fixed locations the client-secret descriptor may live at.
#[derive(Debug, Clone)]
pub struct CredentialPaths {
    pub hidden: PathBuf,
    pub visible: PathBuf,
}

impl CredentialPaths {
    pub fn from_home() -> Result<Self, AppError> {
        let home = dirs::home_dir()
            .ok_or_else(|| AppError::CredentialRead("cannot determine home directory".into()))?;
        Ok(Self {
            hidden: home.join(".google_drive_credentials.json"),
            visible: home.join("google_drive_credentials.json"),
        })
    }

    /// First existing path wins, hidden variant preferred.
    pub fn resolve(&self) -> Option<&Path> {
        if self.hidden.exists() {
            return Some(&self.hidden);
        }
        if self.visible.exists() {
            return Some(&self.visible);
        }
        None
    }
}

/// Identity-provider interaction, kept behind a narrow seam so the token
/// lifecycle can be exercised without touching the network.
pub trait AuthFlow {
    /// Exchange a refresh token for a fresh access token.
    fn refresh(
        &self,
        token: &Token,
    ) -> impl std::future::Future<Output = Result<Token, AppError>> + Send;

    /// Run the interactive consent flow for the given client secret.
    fn obtain(
        &self,
        secret_path: &Path,
    ) -> impl std::future::Future<Output = Result<Token, AppError>> + Send;
}

/// Resolve a usable token: cached if still valid, refreshed if expired with a
/// refresh token, otherwise freshly obtained through the consent flow. Any
/// token that changed is persisted before it is returned.
pub async fn get_credentials<F: AuthFlow>(
    flow: &F,
    cache: &TokenCache,
    credentials: &CredentialPaths,
) -> Result<Token, AppError> {
    if let Some(token) = cache.load()? {
        if token.is_valid() {
            tracing::debug!("cached token still valid");
            return Ok(token);
        }
        if token.refresh_token.is_some() {
            tracing::info!("cached token expired, refreshing");
            let refreshed = flow.refresh(&token).await?;
            cache.save(&refreshed)?;
            return Ok(refreshed);
        }
    }

    let secret_path = credentials
        .resolve()
        .ok_or_else(|| AppError::CredentialsNotFound {
            hidden: credentials.hidden.clone(),
            visible: credentials.visible.clone(),
        })?;

    tracing::info!("no usable token, starting consent flow");
    let token = flow.obtain(secret_path).await?;
    cache.save(&token)?;
    Ok(token)
}

/// Build a Drive hub authenticated with the resolved access token.
pub fn build_hub(token: &Token) -> Result<Hub, AppError> {
    let connector = hyper_rustls::HttpsConnectorBuilder::new()
        .with_native_roots()
        .map_err(|e| AppError::Io(std::io::Error::other(e)))?
        .https_only()
        .enable_http2()
        .build();

    let client = hyper_util::client::legacy::Client::builder(hyper_util::rt::TokioExecutor::new())
        .build(connector);

    Ok(DriveHub::new(client, token.access_token.clone()))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::{Duration, Utc};

    use super::*;

    struct MockFlow {
        refresh_calls: Mutex<u32>,
        obtain_calls: Mutex<u32>,
    }

    impl MockFlow {
        fn new() -> Self {
            Self {
                refresh_calls: Mutex::new(0),
                obtain_calls: Mutex::new(0),
            }
        }
    }

    impl AuthFlow for MockFlow {
        async fn refresh(&self, token: &Token) -> Result<Token, AppError> {
            *self.refresh_calls.lock().unwrap() += 1;
            Ok(Token {
                access_token: "refreshed".into(),
                expiry: Utc::now() + Duration::hours(1),
                ..token.clone()
            })
        }

        async fn obtain(&self, _secret_path: &Path) -> Result<Token, AppError> {
            *self.obtain_calls.lock().unwrap() += 1;
            Ok(Token {
                access_token: "obtained".into(),
                refresh_token: Some("new-refresh".into()),
                expiry: Utc::now() + Duration::hours(1),
                client_id: "client-id".into(),
                client_secret: "client-secret".into(),
            })
        }
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "upload-screenshot-auth-{}-{name}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn token(access: &str, expiry_offset: Duration, refresh: Option<&str>) -> Token {
        Token {
            access_token: access.into(),
            refresh_token: refresh.map(String::from),
            expiry: Utc::now() + expiry_offset,
            client_id: "client-id".into(),
            client_secret: "client-secret".into(),
        }
    }

    fn paths_in(dir: &Path) -> CredentialPaths {
        CredentialPaths {
            hidden: dir.join(".google_drive_credentials.json"),
            visible: dir.join("google_drive_credentials.json"),
        }
    }

    #[tokio::test]
    async fn valid_cached_token_is_returned_unchanged() {
        let dir = scratch_dir("valid-cached");
        let cache = TokenCache::new(dir.join("token.json"));
        let cached = token("cached", Duration::hours(1), Some("refresh"));
        cache.save(&cached).unwrap();

        let flow = MockFlow::new();
        let got = get_credentials(&flow, &cache, &paths_in(&dir)).await.unwrap();

        assert_eq!(got, cached);
        assert_eq!(*flow.refresh_calls.lock().unwrap(), 0);
        assert_eq!(*flow.obtain_calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_once_and_persisted() {
        let dir = scratch_dir("refresh");
        let cache = TokenCache::new(dir.join("token.json"));
        cache
            .save(&token("stale", Duration::hours(-1), Some("refresh")))
            .unwrap();

        let flow = MockFlow::new();
        let got = get_credentials(&flow, &cache, &paths_in(&dir)).await.unwrap();

        assert_eq!(got.access_token, "refreshed");
        assert_eq!(*flow.refresh_calls.lock().unwrap(), 1);
        assert_eq!(*flow.obtain_calls.lock().unwrap(), 0);
        assert_eq!(cache.load().unwrap(), Some(got));
    }

    #[tokio::test]
    async fn expired_token_without_refresh_runs_consent_flow() {
        let dir = scratch_dir("consent");
        let cache = TokenCache::new(dir.join("token.json"));
        cache.save(&token("stale", Duration::hours(-1), None)).unwrap();

        let paths = paths_in(&dir);
        std::fs::write(&paths.hidden, "{}").unwrap();

        let flow = MockFlow::new();
        let got = get_credentials(&flow, &cache, &paths).await.unwrap();

        assert_eq!(got.access_token, "obtained");
        assert_eq!(*flow.refresh_calls.lock().unwrap(), 0);
        assert_eq!(*flow.obtain_calls.lock().unwrap(), 1);
        assert_eq!(cache.load().unwrap(), Some(got));
    }

    #[tokio::test]
    async fn missing_secret_and_no_token_is_an_error() {
        let dir = scratch_dir("no-secret");
        let cache = TokenCache::new(dir.join("token.json"));

        let flow = MockFlow::new();
        let err = get_credentials(&flow, &cache, &paths_in(&dir))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::CredentialsNotFound { .. }));
        assert_eq!(*flow.obtain_calls.lock().unwrap(), 0);
    }

    #[test]
    fn hidden_credentials_path_is_preferred() {
        let dir = scratch_dir("resolve-order");
        let paths = paths_in(&dir);
        std::fs::write(&paths.hidden, "{}").unwrap();
        std::fs::write(&paths.visible, "{}").unwrap();
        assert_eq!(paths.resolve(), Some(paths.hidden.as_path()));
    }

    #[test]
    fn visible_credentials_path_is_fallback() {
        let dir = scratch_dir("resolve-fallback");
        let paths = paths_in(&dir);
        std::fs::write(&paths.visible, "{}").unwrap();
        assert_eq!(paths.resolve(), Some(paths.visible.as_path()));
    }
}
