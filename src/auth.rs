use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, anyhow, bail};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;

use crate::config::Config;

const GMAIL_SCOPE: &str = "https://www.googleapis.com/auth/gmail.send";
const AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// Refresh this many seconds before the recorded expiry, so a token that is
/// about to lapse is not handed to the send loop.
const EXPIRY_MARGIN_SECS: u64 = 60;

const CALLBACK_RESPONSE: &str = "HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\n\r\nAuthentication successful! You can close this window.";

/// An authenticated Gmail session. Constructing one walks the token
/// lifecycle: cached token -> refresh -> interactive authorization.
pub struct GmailSession {
    access_token: String,
}

impl GmailSession {
    pub fn access_token(&self) -> &str {
        &self.access_token
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CachedToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Unix seconds after which the access token is no longer usable.
    pub expires_at: u64,
}

impl CachedToken {
    pub fn is_fresh(&self, now: u64) -> bool {
        now + EXPIRY_MARGIN_SECS < self.expires_at
    }

    pub fn should_attempt_refresh(&self, now: u64) -> bool {
        !self.is_fresh(now) && self.refresh_token.is_some()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
    refresh_token: Option<String>,
}

#[derive(Debug, Clone)]
struct ClientSecrets {
    client_id: String,
    client_secret: String,
    redirect_uri: Option<String>,
}

/// Layout of an OAuth client file downloaded from Google Cloud Console.
#[derive(Debug, Deserialize)]
struct SecretFile {
    installed: Option<SecretEntry>,
    web: Option<SecretEntry>,
}

#[derive(Debug, Deserialize)]
struct SecretEntry {
    client_id: String,
    client_secret: String,
    redirect_uris: Option<Vec<String>>,
}

pub async fn authenticate(cfg: &Config) -> Result<GmailSession> {
    let http = reqwest::Client::new();
    let now = unix_now();

    if let Some(cached) = load_cached_token(&cfg.token_cache_path) {
        if cached.is_fresh(now) {
            debug!("Cached Gmail token is still valid");
            return Ok(GmailSession {
                access_token: cached.access_token,
            });
        }

        if cached.should_attempt_refresh(now) {
            info!("Refreshing expired Gmail token");
            match refresh_token(&http, cfg, &cached).await {
                Ok(refreshed) => {
                    store_cached_token(&cfg.token_cache_path, &refreshed)?;
                    return Ok(GmailSession {
                        access_token: refreshed.access_token,
                    });
                }
                Err(err) => {
                    warn!("Token refresh failed, discarding cached token: {err:?}");
                    if let Err(err) = fs::remove_file(&cfg.token_cache_path) {
                        warn!(
                            "Could not delete stale token cache {}: {err}",
                            cfg.token_cache_path.display()
                        );
                    }
                }
            }
        } else {
            info!("Cached Gmail token expired and has no refresh token");
        }
    }

    let secrets = client_secrets(cfg)?;
    info!("Starting interactive Gmail authorization");
    let token = interactive_authorize(&http, &secrets).await?;
    store_cached_token(&cfg.token_cache_path, &token)?;

    Ok(GmailSession {
        access_token: token.access_token,
    })
}

fn load_cached_token(path: &Path) -> Option<CachedToken> {
    let raw = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(token) => {
            debug!("Loaded cached token from {}", path.display());
            Some(token)
        }
        Err(err) => {
            warn!("Ignoring unreadable token cache {}: {err}", path.display());
            None
        }
    }
}

fn store_cached_token(path: &Path, token: &CachedToken) -> Result<()> {
    let serialized = serde_json::to_string_pretty(token)?;
    fs::write(path, serialized)
        .with_context(|| format!("Failed to write token cache to {}", path.display()))?;
    debug!("Persisted token cache to {}", path.display());
    Ok(())
}

async fn refresh_token(
    http: &reqwest::Client,
    cfg: &Config,
    cached: &CachedToken,
) -> Result<CachedToken> {
    let secrets = client_secrets(cfg)?;
    let refresh_token = cached
        .refresh_token
        .as_deref()
        .ok_or_else(|| anyhow!("No refresh token available"))?;

    let params = [
        ("client_id", secrets.client_id.as_str()),
        ("client_secret", secrets.client_secret.as_str()),
        ("refresh_token", refresh_token),
        ("grant_type", "refresh_token"),
    ];

    let response: TokenResponse = http
        .post(TOKEN_ENDPOINT)
        .form(&params)
        .send()
        .await?
        .error_for_status()
        .context("Token refresh was rejected")?
        .json()
        .await
        .context("Malformed token refresh response")?;

    // Google usually omits the refresh token here; keep the one we had.
    Ok(CachedToken {
        access_token: response.access_token,
        refresh_token: response
            .refresh_token
            .or_else(|| cached.refresh_token.clone()),
        expires_at: unix_now() + response.expires_in,
    })
}

/// Installed-app consent flow: print the consent URL, catch the redirect on
/// a local listener, exchange the code for tokens.
async fn interactive_authorize(
    http: &reqwest::Client,
    secrets: &ClientSecrets,
) -> Result<CachedToken> {
    let requested_port = secrets
        .redirect_uri
        .as_deref()
        .and_then(|uri| Url::parse(uri).ok())
        .and_then(|uri| uri.port())
        .unwrap_or(0);

    let listener = TcpListener::bind(("127.0.0.1", requested_port))
        .await
        .context("Could not open a local port for the authorization callback")?;
    let port = listener.local_addr()?.port();

    let base = secrets
        .redirect_uri
        .clone()
        .unwrap_or_else(|| "http://127.0.0.1".to_string());
    let mut redirect = Url::parse(&base).context("Invalid redirect URI")?;
    if redirect.port().is_none() {
        redirect
            .set_port(Some(port))
            .map_err(|_| anyhow!("Redirect URI {base} does not accept a port"))?;
    }
    let redirect_uri = redirect.to_string();

    let consent_url = Url::parse_with_params(
        AUTH_ENDPOINT,
        &[
            ("client_id", secrets.client_id.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", GMAIL_SCOPE),
            ("access_type", "offline"),
            ("prompt", "consent"),
        ],
    )?;

    println!("\nOpen this URL in your browser to authorize Gmail access:\n\n{consent_url}\n");
    info!("Waiting for the authorization callback on {redirect_uri}");

    let (mut stream, _) = listener
        .accept()
        .await
        .context("Authorization callback never arrived")?;

    let mut buf = vec![0u8; 8192];
    let read = stream.read(&mut buf).await?;
    let request = String::from_utf8_lossy(&buf[..read]).into_owned();

    let outcome = auth_code_from_request(&request);
    let _ = stream.write_all(CALLBACK_RESPONSE.as_bytes()).await;
    let _ = stream.shutdown().await;
    let code = outcome?;

    debug!("Received authorization code, exchanging it for tokens");
    let params = [
        ("code", code.as_str()),
        ("client_id", secrets.client_id.as_str()),
        ("client_secret", secrets.client_secret.as_str()),
        ("redirect_uri", redirect_uri.as_str()),
        ("grant_type", "authorization_code"),
    ];

    let response: TokenResponse = http
        .post(TOKEN_ENDPOINT)
        .form(&params)
        .send()
        .await?
        .error_for_status()
        .context("Authorization code exchange was rejected")?
        .json()
        .await
        .context("Malformed token response")?;

    info!("Gmail authorization complete");
    Ok(CachedToken {
        access_token: response.access_token,
        refresh_token: response.refresh_token,
        expires_at: unix_now() + response.expires_in,
    })
}

/// Pull the `code` query parameter out of the callback's request line, or
/// report the provider-sent `error` (user declined, bad scope, ...).
fn auth_code_from_request(request: &str) -> Result<String> {
    let request_line = request.lines().next().unwrap_or_default();
    let path = request_line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| anyhow!("Malformed authorization callback request"))?;

    let parsed = Url::parse(&format!("http://localhost{path}"))
        .context("Unparseable authorization callback path")?;

    if let Some((_, reason)) = parsed.query_pairs().find(|(key, _)| key == "error") {
        bail!("Authorization was declined: {reason}");
    }

    parsed
        .query_pairs()
        .find(|(key, _)| key == "code")
        .map(|(_, value)| value.into_owned())
        .ok_or_else(|| anyhow!("Authorization callback carried no code"))
}

/// Client credentials from the environment when set, otherwise from the
/// client-secret file downloaded from Google Cloud Console.
fn client_secrets(cfg: &Config) -> Result<ClientSecrets> {
    if let (Some(client_id), Some(client_secret)) = (&cfg.client_id, &cfg.client_secret) {
        return Ok(ClientSecrets {
            client_id: client_id.clone(),
            client_secret: client_secret.clone(),
            redirect_uri: cfg.redirect_uri.clone(),
        });
    }

    let raw = fs::read_to_string(&cfg.client_secret_path).with_context(|| {
        format!(
            "{} not found. Download an OAuth client file from Google Cloud Console \
             or set GOOGLE_CLIENT_ID and GOOGLE_CLIENT_SECRET",
            cfg.client_secret_path.display()
        )
    })?;
    let parsed: SecretFile = serde_json::from_str(&raw).with_context(|| {
        format!("Invalid client-secret file {}", cfg.client_secret_path.display())
    })?;
    let entry = parsed.installed.or(parsed.web).ok_or_else(|| {
        anyhow!(
            "{} holds neither an `installed` nor a `web` client",
            cfg.client_secret_path.display()
        )
    })?;

    Ok(ClientSecrets {
        client_id: entry.client_id,
        client_secret: entry.client_secret,
        redirect_uri: cfg
            .redirect_uri
            .clone()
            .or_else(|| entry.redirect_uris.and_then(|uris| uris.into_iter().next())),
    })
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
