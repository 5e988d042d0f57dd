//! Google OAuth2 for installed applications.
//!
//! Reuses a cached grant (`token.json`, same field names as the Python
//! google-auth library writes), refreshes it when it has expired, and falls
//! back to the PKCE authorization-code flow with a loopback redirect when no
//! usable grant exists. The loopback flow needs an interactive terminal.

use super::{Authenticate, SessionHandle};
use crate::error::{ExportError, Result};
use crate::fetch::http::extract_error_message;
use crate::fetch::{HttpSettings, Session};
use chrono::{DateTime, Duration, Utc};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, IsTerminal, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/calendar.readonly",
    "https://www.googleapis.com/auth/drive.activity.readonly",
    "https://www.googleapis.com/auth/drive.metadata.readonly",
];

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Cached grant, field-compatible with google-auth's `Credentials.to_json()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredToken {
    #[serde(rename = "token")]
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl StoredToken {
    /// A grant without an expiry never expires.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        if self.access_token.is_empty() {
            return false;
        }
        match self.expiry {
            Some(expiry) => expiry - now > Duration::seconds(EXPIRY_MARGIN_SECS),
            None => true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ClientSecrets {
    installed: Option<ClientConfig>,
    web: Option<ClientConfig>,
}

#[derive(Debug, Clone, Deserialize)]
struct ClientConfig {
    client_id: String,
    #[serde(default)]
    client_secret: String,
    #[serde(default = "default_auth_uri")]
    auth_uri: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

pub struct GoogleOAuth {
    credentials_path: PathBuf,
    token_path: PathBuf,
    scopes: Vec<String>,
    interactive: bool,
}

impl GoogleOAuth {
    pub fn new(credentials_path: impl Into<PathBuf>, token_path: impl Into<PathBuf>) -> Self {
        Self {
            credentials_path: credentials_path.into(),
            token_path: token_path.into(),
            scopes: SCOPES.iter().map(|s| s.to_string()).collect(),
            interactive: std::io::stdin().is_terminal(),
        }
    }

    pub fn with_interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    fn load_cached(&self) -> Option<StoredToken> {
        let raw = match std::fs::read_to_string(&self.token_path) {
            Ok(raw) => raw,
            Err(e) => {
                debug!("No token cache at {}: {}", self.token_path.display(), e);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(token) => Some(token),
            Err(e) => {
                warn!("Ignoring unreadable token cache {}: {}", self.token_path.display(), e);
                None
            }
        }
    }

    fn save(&self, token: &StoredToken) -> Result<()> {
        std::fs::write(&self.token_path, serde_json::to_string_pretty(token)?)?;
        debug!("Token cache written to {}", self.token_path.display());
        Ok(())
    }

    fn refresh(&self, client: &Client, cached: &StoredToken, refresh_token: &str) -> Result<StoredToken> {
        info!("Refreshing Google access token");
        let params = [
            ("client_id", cached.client_id.as_str()),
            ("client_secret", cached.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        let response = post_form(client, &cached.token_uri, &params)?;
        Ok(apply_token_response(
            response,
            StoredToken {
                refresh_token: Some(refresh_token.to_string()),
                ..cached.clone()
            },
        ))
    }

    fn consent(&self, client: &Client) -> Result<StoredToken> {
        if !self.interactive {
            return Err(ExportError::Auth(format!(
                "interactive consent required but no terminal is attached; run once interactively to create {}",
                self.token_path.display()
            )));
        }

        let config = load_client_config(&self.credentials_path)?;
        let verifier = generate_code_verifier();
        let challenge = generate_code_challenge(&verifier);
        let state = generate_state();

        let listener = TcpListener::bind("127.0.0.1:0")?;
        let redirect_uri = format!("http://127.0.0.1:{}", listener.local_addr()?.port());
        info!("OAuth callback server listening on {}", redirect_uri);

        let url = authorize_url(&config, &self.scopes, &state, &challenge, &redirect_uri);
        eprintln!("Authorize access in your browser:\n\n  {url}\n");
        if let Err(e) = open::that(&url) {
            warn!("Failed to open browser automatically: {}", e);
        }

        let code = wait_for_code(&listener, &state)?;

        info!("Exchanging authorization code for tokens");
        let params = [
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("code", code.as_str()),
            ("code_verifier", verifier.as_str()),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri.as_str()),
        ];
        let response = post_form(client, &config.token_uri, &params)?;
        Ok(apply_token_response(
            response,
            StoredToken {
                access_token: String::new(),
                refresh_token: None,
                token_uri: config.token_uri.clone(),
                client_id: config.client_id.clone(),
                client_secret: config.client_secret.clone(),
                scopes: self.scopes.clone(),
                expiry: None,
            },
        ))
    }
}

impl Authenticate for GoogleOAuth {
    fn authenticate(&self, http: &HttpSettings) -> Result<SessionHandle> {
        let client = http.client()?;
        let now = Utc::now();

        let token = match self.load_cached() {
            Some(cached) if cached.is_valid(now) => cached,
            Some(cached) => match cached.refresh_token.clone().filter(|t| !t.is_empty()) {
                Some(refresh_token) => {
                    let token = self.refresh(&client, &cached, &refresh_token)?;
                    self.save(&token)?;
                    token
                }
                None => {
                    let token = self.consent(&client)?;
                    self.save(&token)?;
                    token
                }
            },
            None => {
                let token = self.consent(&client)?;
                self.save(&token)?;
                token
            }
        };

        let session = Session::new(http, format!("Bearer {}", token.access_token))?;
        Ok(SessionHandle {
            session,
            account: None,
        })
    }
}

fn load_client_config(path: &Path) -> Result<ClientConfig> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        ExportError::Config(format!("cannot read OAuth client file {}: {e}", path.display()))
    })?;
    let secrets: ClientSecrets = serde_json::from_str(&raw)?;
    secrets.installed.or(secrets.web).ok_or_else(|| {
        ExportError::Config(format!(
            "{} has neither an \"installed\" nor a \"web\" client",
            path.display()
        ))
    })
}

fn post_form(client: &Client, url: &str, params: &[(&str, &str)]) -> Result<TokenResponse> {
    let response = client.post(url).form(params).send()?;
    let status = response.status();
    let body = response.text()?;
    if !status.is_success() {
        return Err(ExportError::Auth(format!(
            "token endpoint returned {}: {}",
            status,
            extract_error_message(&body, status)
        )));
    }
    Ok(serde_json::from_str(&body)?)
}

fn apply_token_response(response: TokenResponse, mut token: StoredToken) -> StoredToken {
    token.access_token = response.access_token;
    if let Some(refresh) = response.refresh_token {
        token.refresh_token = Some(refresh);
    }
    token.expiry = Some(Utc::now() + Duration::seconds(response.expires_in.unwrap_or(3600)));
    if let Some(scope) = response.scope {
        token.scopes = scope.split_whitespace().map(str::to_string).collect();
    }
    token
}

fn authorize_url(
    config: &ClientConfig,
    scopes: &[String],
    state: &str,
    code_challenge: &str,
    redirect_uri: &str,
) -> String {
    format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&state={}&code_challenge={}&code_challenge_method=S256&access_type=offline&prompt=consent",
        config.auth_uri,
        urlencoding::encode(&config.client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(&scopes.join(" ")),
        urlencoding::encode(state),
        urlencoding::encode(code_challenge),
    )
}

/// Serves the loopback redirect until it carries `code` (or `error`).
fn wait_for_code(listener: &TcpListener, expected_state: &str) -> Result<String> {
    loop {
        let (mut socket, _) = listener.accept()?;

        let mut request_line = String::new();
        BufReader::new(&socket).read_line(&mut request_line)?;

        // "GET /path?query HTTP/1.1"
        let target = request_line.split_whitespace().nth(1).unwrap_or("");
        let query = target.split_once('?').map(|(_, q)| q).unwrap_or("");
        let params = parse_query_params(query);

        if let Some(error) = params.get("error") {
            send_response(&mut socket, "400 Bad Request", "Authorization was denied.")?;
            return Err(ExportError::Auth(format!("consent was not granted: {error}")));
        }

        match (params.get("code"), params.get("state")) {
            (Some(code), Some(state)) if state == expected_state => {
                send_response(&mut socket, "200 OK", "Authorization complete. You can close this tab.")?;
                return Ok(code.clone());
            }
            (Some(_), _) => {
                send_response(&mut socket, "400 Bad Request", "State mismatch. Please try again.")?;
                return Err(ExportError::Auth("OAuth state mismatch".to_string()));
            }
            _ => send_response(&mut socket, "404 Not Found", "")?,
        }
    }
}

fn send_response(socket: &mut TcpStream, status: &str, message: &str) -> Result<()> {
    let html = format!("<!DOCTYPE html><html><body><p>{message}</p></body></html>");
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        html.len(),
        html
    );
    socket.write_all(response.as_bytes())?;
    socket.flush()?;
    Ok(())
}

fn parse_query_params(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter_map(|part| {
            let (key, value) = part.split_once('=')?;
            let value = urlencoding::decode(value).ok()?;
            Some((key.to_string(), value.into_owned()))
        })
        .collect()
}

/// PKCE code verifier: 32 random bytes, base64url without padding.
fn generate_code_verifier() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    base64_url_encode(&bytes)
}

fn generate_code_challenge(verifier: &str) -> String {
    use sha2::{Digest, Sha256};
    base64_url_encode(&Sha256::digest(verifier.as_bytes()))
}

fn generate_state() -> String {
    use rand::Rng;
    let bytes: [u8; 16] = rand::rngs::OsRng.gen();
    hex::encode(bytes)
}

fn base64_url_encode(data: &[u8]) -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    URL_SAFE_NO_PAD.encode(data)
}
