//! Firebase token management for the document store.
//!
//! The store sessions are anonymous: a first sign-up yields an id token
//! and a refresh token, and the id token is cached until shortly before
//! expiry. Credentials (web API key) are injected; nothing here is
//! deployment-specific.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Error, Result};

const IDENTITY_URL: &str = "https://identitytoolkit.googleapis.com/v1/accounts:signUp";
const TOKEN_URL: &str = "https://securetoken.googleapis.com/v1/token";

/// Refresh the cached token this long before it actually expires.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Deserialize)]
struct SignUpResponse {
    #[serde(rename = "idToken")]
    id_token: String,
    #[serde(rename = "refreshToken")]
    refresh_token: String,
    #[serde(rename = "expiresIn")]
    expires_in: String,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

#[derive(Debug, Clone)]
struct CachedToken {
    id_token: String,
    expires_at: DateTime<Utc>,
}

fn expiry(expires_in: &str) -> DateTime<Utc> {
    let secs: i64 = expires_in.parse().unwrap_or(3600);
    Utc::now() + Duration::seconds(secs)
}

/// Anonymous Firebase session with expiry-aware id-token caching.
#[derive(Clone)]
pub struct FirebaseAuth {
    client: Client,
    api_key: String,
    refresh_token: Arc<Mutex<Option<String>>>,
    cached: Arc<Mutex<Option<CachedToken>>>,
}

impl FirebaseAuth {
    /// An auth handle that will sign in anonymously on first use.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            refresh_token: Arc::new(Mutex::new(None)),
            cached: Arc::new(Mutex::new(None)),
        }
    }

    /// An auth handle resuming an existing anonymous session.
    pub fn with_refresh_token(api_key: impl Into<String>, refresh_token: String) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            refresh_token: Arc::new(Mutex::new(Some(refresh_token))),
            cached: Arc::new(Mutex::new(None)),
        }
    }

    /// A valid id token, reusing the cache when it has at least a minute
    /// of life left.
    pub async fn id_token(&self) -> Result<String> {
        {
            let cached = self.cached.lock().await;
            if let Some(token) = cached.as_ref() {
                if token.expires_at > Utc::now() + Duration::seconds(EXPIRY_MARGIN_SECS) {
                    return Ok(token.id_token.clone());
                }
            }
        }

        let refresh = self.refresh_token.lock().await.clone();
        match refresh {
            Some(token) => self.refresh(&token).await,
            None => self.sign_in_anonymously().await,
        }
    }

    async fn sign_in_anonymously(&self) -> Result<String> {
        debug!("signing in anonymously");
        let resp = self
            .client
            .post(format!("{IDENTITY_URL}?key={}", self.api_key))
            .json(&serde_json::json!({ "returnSecureToken": true }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::store("auth", format!("sign-in failed: {status} - {body}")));
        }

        let signed: SignUpResponse = resp
            .json()
            .await
            .map_err(|e| Error::store("auth", format!("bad sign-in response: {e}")))?;

        *self.refresh_token.lock().await = Some(signed.refresh_token);
        let expires_at = expiry(&signed.expires_in);
        *self.cached.lock().await = Some(CachedToken {
            id_token: signed.id_token.clone(),
            expires_at,
        });
        Ok(signed.id_token)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<String> {
        debug!("refreshing id token");
        let resp = self
            .client
            .post(format!("{TOKEN_URL}?key={}", self.api_key))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::store("auth", format!("token refresh failed: {status} - {body}")));
        }

        let refreshed: RefreshResponse = resp
            .json()
            .await
            .map_err(|e| Error::store("auth", format!("bad refresh response: {e}")))?;

        // Firebase may rotate the refresh token.
        *self.refresh_token.lock().await = Some(refreshed.refresh_token);
        let expires_at = expiry(&refreshed.expires_in);
        let id_token = refreshed.id_token.clone();
        *self.cached.lock().await = Some(CachedToken {
            id_token: refreshed.id_token,
            expires_at,
        });
        Ok(id_token)
    }
}
