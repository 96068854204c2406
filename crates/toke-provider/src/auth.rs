//! Bearer credentials, static or refreshable.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::ProviderError;

pub const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";

/// Supplies the `Authorization` bearer token for each attempt.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Token for the next request, refreshing first when known to be expired.
    async fn token(&self, http: &Client) -> Result<Option<String>, ProviderError>;

    /// Called after a 401. Errors end the request as an authentication failure.
    async fn refresh(&self, http: &Client) -> Result<(), ProviderError>;
}

/// A fixed key, or none at all for local servers.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(key: Option<String>) -> Self {
        Self(key.filter(|k| !k.is_empty()))
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self, _http: &Client) -> Result<Option<String>, ProviderError> {
        Ok(self.0.clone())
    }

    async fn refresh(&self, _http: &Client) -> Result<(), ProviderError> {
        Err(ProviderError::AuthFailed {
            message: "API key rejected".to_string(),
        })
    }
}

/// OAuth access token with an optional refresh token and expiry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OAuthCredential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expiry: Option<DateTime<Utc>>,
}

impl OAuthCredential {
    /// Parse `access|refresh|RFC3339-expiry`; a key without `|` is a bare
    /// access token. Unparseable expiries are treated as unknown.
    pub fn parse(key: &str) -> Self {
        let mut parts = key.split('|');
        let access_token = parts.next().unwrap_or_default().to_string();
        let refresh_token = parts
            .next()
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let expiry = parts
            .next()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc));
        Self {
            access_token,
            refresh_token,
            expiry,
        }
    }

    /// Inverse of [`parse`](Self::parse), for persisting a refreshed credential.
    pub fn to_key(&self) -> String {
        match (&self.refresh_token, self.expiry) {
            (None, None) => self.access_token.clone(),
            (refresh, expiry) => format!(
                "{}|{}|{}",
                self.access_token,
                refresh.as_deref().unwrap_or_default(),
                expiry.map(|t| t.to_rfc3339()).unwrap_or_default()
            ),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry.is_some_and(|expiry| now > expiry)
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Credential refreshed in place through a GitHub-style OAuth token endpoint.
#[derive(Debug)]
pub struct OAuthTokenSource {
    credential: Mutex<OAuthCredential>,
    token_url: String,
}

impl OAuthTokenSource {
    pub fn new(credential: OAuthCredential) -> Self {
        Self {
            credential: Mutex::new(credential),
            token_url: GITHUB_TOKEN_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    /// Current credential. Persisting it is the caller's job.
    pub async fn credential(&self) -> OAuthCredential {
        self.credential.lock().await.clone()
    }

    async fn refresh_locked(
        &self,
        http: &Client,
        credential: &mut OAuthCredential,
    ) -> Result<(), ProviderError> {
        let Some(refresh_token) = credential.refresh_token.clone() else {
            return Err(ProviderError::AuthFailed {
                message: "no refresh token available".to_string(),
            });
        };
        let auth_failed = |message: String| ProviderError::AuthFailed { message };

        let response = http
            .post(&self.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
            ])
            .send()
            .await
            .map_err(|e| auth_failed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(auth_failed(format!(
                "failed to refresh token: {}",
                response.status()
            )));
        }
        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|e| auth_failed(e.to_string()))?;

        credential.access_token = body.access_token;
        if let Some(token) = body.refresh_token.filter(|t| !t.is_empty()) {
            credential.refresh_token = Some(token);
        }
        if let Some(secs) = body.expires_in.filter(|&s| s > 0) {
            credential.expiry = Some(Utc::now() + ChronoDuration::seconds(secs));
        }
        info!("Access token refreshed");
        Ok(())
    }
}

#[async_trait]
impl TokenSource for OAuthTokenSource {
    async fn token(&self, http: &Client) -> Result<Option<String>, ProviderError> {
        let mut credential = self.credential.lock().await;
        if credential.is_expired(Utc::now()) {
            info!("Access token expired, refreshing");
            self.refresh_locked(http, &mut credential).await?;
        }
        Ok(Some(credential.access_token.clone()).filter(|t| !t.is_empty()))
    }

    async fn refresh(&self, http: &Client) -> Result<(), ProviderError> {
        let mut credential = self.credential.lock().await;
        let result = self.refresh_locked(http, &mut credential).await;
        if let Err(e) = &result {
            warn!(error = %e, "Token refresh failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_key_formats() {
        let bare = OAuthCredential::parse("gho_abc");
        assert_eq!(bare.access_token, "gho_abc");
        assert_eq!(bare.refresh_token, None);
        assert_eq!(bare.to_key(), "gho_abc");

        let full = OAuthCredential::parse("gho_abc|ghr_def|2026-01-02T03:04:05Z");
        assert_eq!(full.refresh_token.as_deref(), Some("ghr_def"));
        assert_eq!(
            full.expiry.unwrap(),
            DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z").unwrap()
        );
        assert_eq!(OAuthCredential::parse(&full.to_key()), full);

        let bad_expiry = OAuthCredential::parse("a|b|tomorrow");
        assert_eq!(bad_expiry.expiry, None);
    }

    #[test]
    fn expiry_check() {
        let credential = OAuthCredential::parse("a|b|2026-01-02T03:04:05Z");
        let before = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let after = DateTime::parse_from_rfc3339("2026-02-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert!(!credential.is_expired(before));
        assert!(credential.is_expired(after));
        assert!(!OAuthCredential::parse("a").is_expired(after));
    }

    #[tokio::test]
    async fn refresh_without_refresh_token_fails() {
        let source = OAuthTokenSource::new(OAuthCredential::parse("only-access"));
        let err = source.refresh(&Client::new()).await.unwrap_err();
        assert!(matches!(err, ProviderError::AuthFailed { .. }));
        assert_eq!(
            source.token(&Client::new()).await.unwrap().as_deref(),
            Some("only-access")
        );
    }
}
