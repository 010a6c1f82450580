use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use yup_oauth2::read_application_secret;

use crate::auth::{AuthFlow, SCOPES};
use crate::error::AppError;
use crate::token::Token;

const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// How long to wait for the user to complete the browser consent.
const CONSENT_TIMEOUT: Duration = Duration::from_secs(300);

const SUCCESS_PAGE: &str = "<html><body><h1>Authorization successful!</h1>\
     <p>You can close this window and return to the terminal.</p></body></html>";

const FAILURE_PAGE: &str = "<html><body><h1>Authorization failed</h1>\
     <p>You can close this window.</p></body></html>";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: u64,
}

/// OAuth 2.0 installed-app flow against Google's identity endpoints.
///
/// The authorization redirect is received on a loopback listener bound to an
/// ephemeral port; the code and refresh exchanges go through the token
/// endpoint as form POSTs.
pub struct InstalledFlow {
    http: reqwest::Client,
}

impl InstalledFlow {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    async fn exchange(&self, params: &[(&str, &str)]) -> Result<TokenResponse, AppError> {
        let response = self
            .http
            .post(TOKEN_URI)
            .form(params)
            .send()
            .await
            .map_err(|e| AppError::OAuth2(format!("token endpoint unreachable: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::OAuth2(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::OAuth2(format!("malformed token response: {e}")))
    }
}

impl AuthFlow for InstalledFlow {
    async fn refresh(&self, token: &Token) -> Result<Token, AppError> {
        let refresh_token = token
            .refresh_token
            .as_deref()
            .ok_or_else(|| AppError::OAuth2("no refresh token available".into()))?;

        let response = self
            .exchange(&[
                ("client_id", token.client_id.as_str()),
                ("client_secret", token.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .await?;

        Ok(Token {
            access_token: response.access_token,
            // Google usually omits the refresh token here; keep the old one.
            refresh_token: response
                .refresh_token
                .or_else(|| token.refresh_token.clone()),
            expiry: Utc::now() + chrono::Duration::seconds(response.expires_in as i64),
            client_id: token.client_id.clone(),
            client_secret: token.client_secret.clone(),
        })
    }

    async fn obtain(&self, secret_path: &Path) -> Result<Token, AppError> {
        let secret = read_application_secret(secret_path).await.map_err(|e| {
            AppError::CredentialRead(format!(
                "failed to parse {}: {e}",
                secret_path.display()
            ))
        })?;

        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let port = listener.local_addr()?.port();
        let redirect_uri = format!("http://127.0.0.1:{port}");

        let (verifier, challenge) = pkce_pair();
        let state = random_string(16);
        let auth_url = build_auth_url(
            &secret.auth_uri,
            &secret.client_id,
            &redirect_uri,
            &challenge,
            &state,
        );

        eprintln!("\nPlease visit the following URL to authorize the upload:\n");
        eprintln!("{auth_url}\n");
        tracing::info!("waiting for authorization redirect on port {port}");

        let code = tokio::time::timeout(CONSENT_TIMEOUT, wait_for_code(listener, &state))
            .await
            .map_err(|_| AppError::OAuth2("authorization timed out after 5 minutes".into()))??;

        let response = self
            .exchange(&[
                ("client_id", secret.client_id.as_str()),
                ("client_secret", secret.client_secret.as_str()),
                ("code", code.as_str()),
                ("code_verifier", verifier.as_str()),
                ("grant_type", "authorization_code"),
                ("redirect_uri", redirect_uri.as_str()),
            ])
            .await?;

        Ok(Token {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expiry: Utc::now() + chrono::Duration::seconds(response.expires_in as i64),
            client_id: secret.client_id,
            client_secret: secret.client_secret,
        })
    }
}

impl Default for InstalledFlow {
    fn default() -> Self {
        Self::new()
    }
}

/// Accept loopback connections until the authorization redirect arrives.
/// Unrelated requests (favicon probes and the like) get a 404 and the wait
/// continues.
async fn wait_for_code(listener: TcpListener, expected_state: &str) -> Result<String, AppError> {
    loop {
        let (stream, _) = listener.accept().await?;
        let mut reader = BufReader::new(stream);
        let mut request_line = String::new();
        reader.read_line(&mut request_line).await?;

        let params = match parse_redirect(&request_line) {
            Some(params) => params,
            None => {
                respond(reader.into_inner(), "404 Not Found", "").await;
                continue;
            }
        };

        if let Some(error) = params.get("error") {
            let error = error.clone();
            respond(reader.into_inner(), "200 OK", FAILURE_PAGE).await;
            return Err(AppError::OAuth2(format!("authorization denied: {error}")));
        }

        let Some(code) = params.get("code") else {
            respond(reader.into_inner(), "200 OK", FAILURE_PAGE).await;
            return Err(AppError::OAuth2("redirect carried no code".into()));
        };

        if params.get("state").map(String::as_str) != Some(expected_state) {
            respond(reader.into_inner(), "200 OK", FAILURE_PAGE).await;
            return Err(AppError::OAuth2("redirect state mismatch".into()));
        }

        let code = code.clone();
        respond(reader.into_inner(), "200 OK", SUCCESS_PAGE).await;
        return Ok(code);
    }
}

/// Best-effort reply to the browser; errors here don't affect the flow.
async fn respond(mut stream: TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

/// Parse the query parameters out of a redirect request line such as
/// `GET /?state=xyz&code=abc HTTP/1.1`. Returns `None` for requests that
/// carry no query string.
fn parse_redirect(request_line: &str) -> Option<HashMap<String, String>> {
    let path = request_line.split_whitespace().nth(1)?;
    let (_, query) = path.split_once('?')?;

    let mut params = HashMap::new();
    for pair in query.split('&') {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let value = urlencoding::decode(value).ok()?;
        params.insert(key.to_string(), value.into_owned());
    }
    Some(params)
}

fn build_auth_url(
    auth_uri: &str,
    client_id: &str,
    redirect_uri: &str,
    challenge: &str,
    state: &str,
) -> String {
    format!(
        "{auth_uri}?client_id={}&redirect_uri={}&response_type=code&scope={}\
         &code_challenge={}&code_challenge_method=S256&state={}\
         &access_type=offline&prompt=consent",
        urlencoding::encode(client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(&SCOPES.join(" ")),
        urlencoding::encode(challenge),
        urlencoding::encode(state),
    )
}

/// PKCE verifier and its S256 challenge.
fn pkce_pair() -> (String, String) {
    let verifier = random_string(64);
    let digest = Sha256::digest(verifier.as_bytes());
    let challenge = URL_SAFE_NO_PAD.encode(digest);
    (verifier, challenge)
}

fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
