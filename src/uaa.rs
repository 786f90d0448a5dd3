//! UAA client-credentials token fetching
//!
//! The routing API wants a bearer token on every request. Tokens are short-lived,
//! so the client keeps the last one in a mutex-guarded cache and only goes back to
//! UAA once the current token is within the expiration buffer of expiry (or a
//! caller forces a refresh). A failed fetch leaves the cache untouched.

use std::time::{Duration, Instant};

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{Error, Result};

/// Refetch this long before the token actually expires
pub const DEFAULT_EXPIRATION_BUFFER: Duration = Duration::from_secs(30);

/// A bearer credential issued by UAA
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Token {
    /// The opaque bearer token value
    pub access_token: String,
    /// Seconds until the token expires, from issue time
    pub expires_in: u64,
}

/// Trait for obtaining a current bearer token
///
/// This trait allows mocking token acquisition in tests while using the real
/// UAA client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TokenFetcher: Send + Sync {
    /// Return a current token, fetching a fresh one if forced or near expiry
    async fn fetch_token(&self, force_refresh: bool) -> Result<Token>;
}

/// Settings for the UAA client
#[derive(Clone, Debug)]
pub struct UaaConfig {
    /// UAA base URL, e.g. `https://uaa.cf.example.com:8443`
    pub endpoint: String,
    /// OAuth client name for the client-credentials grant
    pub client_name: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Accept self-signed certificates from UAA
    pub skip_tls_verification: bool,
    /// How long before expiry a cached token stops being served
    pub expiration_buffer: Duration,
}

struct TokenCache {
    token: Option<Token>,
    refetch_after: Instant,
}

/// UAA client with a cached token shared across concurrent callers
pub struct UaaClient {
    config: UaaConfig,
    http: reqwest::Client,
    cache: Mutex<TokenCache>,
}

impl UaaClient {
    /// Create a client for the given UAA settings
    pub fn new(config: UaaConfig) -> Result<Self> {
        if config.endpoint.is_empty() {
            return Err(Error::config("UAA endpoint required"));
        }
        if config.client_name.is_empty() {
            return Err(Error::config("UAA client name required"));
        }
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.skip_tls_verification)
            .build()?;
        Ok(Self {
            config,
            http,
            cache: Mutex::new(TokenCache {
                token: None,
                refetch_after: Instant::now(),
            }),
        })
    }

    async fn request_token(&self) -> Result<Token> {
        let url = format!("{}/oauth/token", self.config.endpoint);
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.config.client_name, Some(&self.config.client_secret))
            .header(reqwest::header::ACCEPT, "application/json; charset=utf-8")
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|err| Error::auth(format!("token request to {url}: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::auth(format!(
                "token request returned {status}: {body}"
            )));
        }

        response
            .json::<Token>()
            .await
            .map_err(|err| Error::auth(format!("decoding token response: {err}")))
    }
}

#[async_trait]
impl TokenFetcher for UaaClient {
    async fn fetch_token(&self, force_refresh: bool) -> Result<Token> {
        // The lock is held across the fetch: racing callers serialize and the
        // last writer wins.
        let mut cache = self.cache.lock().await;

        if !force_refresh && Instant::now() < cache.refetch_after {
            if let Some(token) = &cache.token {
                debug!("using cached token");
                return Ok(token.clone());
            }
        }

        let token = self.request_token().await?;
        let usable_for = Duration::from_secs(token.expires_in)
            .saturating_sub(self.config.expiration_buffer);
        cache.refetch_after = Instant::now() + usable_for;
        cache.token = Some(token.clone());
        debug!(expires_in = token.expires_in, "fetched fresh token");
        Ok(token)
    }
}
