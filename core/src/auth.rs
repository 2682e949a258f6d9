//! Credentials for the GitHub Checks API.
//!
//! A GitHub App authenticates by signing a short lived JWT with its private
//! key and exchanging it for an installation token. Installation tokens last
//! an hour, so [`InstallationTokenSource`] caches one and refreshes it ahead
//! of expiry for commands that run longer than that.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::TimeDelta;
use chrono::Utc;
use jsonwebtoken::Algorithm;
use jsonwebtoken::EncodingKey;
use jsonwebtoken::Header;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::checks::DEFAULT_API_URL;
use crate::clock::Clock;
use crate::clock::SystemClock;

/// Installation tokens are replaced this long before GitHub expires them.
const REFRESH_MARGIN: TimeDelta = TimeDelta::minutes(5);

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("invalid GitHub App private key: {0}")]
    InvalidKey(#[source] jsonwebtoken::errors::Error),

    #[error("failed to sign GitHub App JWT: {0}")]
    Jwt(#[source] jsonwebtoken::errors::Error),

    #[error("http error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("installation token request returned {status}: {body}")]
    Http { status: u16, body: String },
}

/// Supplies the bearer token for each API call.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<String, AuthError>;
}

/// A token handed over as is, e.g. a personal access token or the workflow
/// `GITHUB_TOKEN`.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticToken(<redacted>)")
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Result<String, AuthError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AppClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

#[derive(Debug, Deserialize)]
struct InstallationTokenResponse {
    token: String,
    expires_at: DateTime<Utc>,
}

struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Mints and caches installation tokens for one GitHub App installation.
pub struct InstallationTokenSource {
    app_id: String,
    installation_id: u64,
    key: EncodingKey,
    api_url: String,
    client: reqwest::Client,
    clock: Arc<dyn Clock>,
    cached: Mutex<Option<CachedToken>>,
}

impl InstallationTokenSource {
    /// Parses the PEM encoded RSA key up front so a bad key is reported
    /// before any command runs.
    pub fn new(
        app_id: impl Into<String>,
        installation_id: u64,
        private_key_pem: &[u8],
    ) -> Result<Self, AuthError> {
        let key = EncodingKey::from_rsa_pem(private_key_pem).map_err(AuthError::InvalidKey)?;
        Ok(Self {
            app_id: app_id.into(),
            installation_id,
            key,
            api_url: DEFAULT_API_URL.to_string(),
            client: reqwest::Client::new(),
            clock: Arc::new(SystemClock),
            cached: Mutex::new(None),
        })
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn app_jwt(&self, now: DateTime<Utc>) -> Result<String, AuthError> {
        let now = now.timestamp();
        let claims = AppClaims {
            iat: now - 60,
            exp: now + 600,
            iss: self.app_id.clone(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.key)
            .map_err(AuthError::Jwt)
    }

    async fn mint(&self) -> Result<CachedToken, AuthError> {
        let jwt = self.app_jwt(self.clock.now())?;
        let endpoint = format!(
            "{}/app/installations/{}/access_tokens",
            self.api_url.trim_end_matches('/'),
            self.installation_id
        );

        let response = self
            .client
            .post(endpoint)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", crate::checks::user_agent())
            .header("X-GitHub-Api-Version", crate::checks::API_VERSION)
            .bearer_auth(jwt)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read token response body".to_string());
            return Err(AuthError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let payload: InstallationTokenResponse = response.json().await?;
        debug!(
            installation_id = self.installation_id,
            expires_at = %payload.expires_at,
            "minted installation token"
        );
        Ok(CachedToken {
            token: payload.token,
            expires_at: payload.expires_at,
        })
    }
}

impl std::fmt::Debug for InstallationTokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallationTokenSource")
            .field("app_id", &self.app_id)
            .field("installation_id", &self.installation_id)
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenSource for InstallationTokenSource {
    async fn token(&self) -> Result<String, AuthError> {
        let mut cached = self.cached.lock().await;
        if let Some(current) = cached.as_ref()
            && self.clock.now() + REFRESH_MARGIN < current.expires_at
        {
            return Ok(current.token.clone());
        }

        let fresh = self.mint().await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }
}
