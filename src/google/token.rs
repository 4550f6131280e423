use crate::config::{Config, DRIVE_ABOUT_URL, GOOGLE_TOKEN_URI};
use crate::error::{FerryError, OauthError};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use oauth2::basic::{
    BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
    BasicTokenResponse,
};
use oauth2::{
    Client as OAuth2Client, ClientId, ClientSecret, EndpointNotSet, EndpointSet, RedirectUrl,
    RefreshToken, StandardRevocableToken, TokenResponse, TokenUrl,
};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Early-renewal buffer subtracted from the token endpoint's `expires_in`.
const EXPIRY_SKEW_SECS: i64 = 60;
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_EXPIRES_IN: Duration = Duration::from_secs(3600);

pub(crate) type DriveOauthClient = OAuth2Client<
    BasicErrorResponse,
    BasicTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn from_refresh(access_token: String, expires_in: Duration) -> Self {
        let expires_at =
            Utc::now() + ChronoDuration::seconds(expires_in.as_secs() as i64 - EXPIRY_SKEW_SECS);
        Self {
            access_token,
            expires_at,
        }
    }

    fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Process-wide bearer-token cache for the single Drive identity.
///
/// The mutex is held across the probe/refresh decision, so concurrent
/// callers share one refresh instead of racing the token endpoint.
pub struct TokenCache {
    http: reqwest::Client,
    oauth: DriveOauthClient,
    refresh_token: Option<String>,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(cfg: &Config, http: reqwest::Client) -> Result<Self, FerryError> {
        Ok(Self {
            oauth: build_oauth2_client(cfg)?,
            refresh_token: cfg.refresh_credential().map(str::to_string),
            http,
            cached: Mutex::new(None),
        })
    }

    /// Returns a valid bearer token, refreshing when the cache is empty,
    /// expired, or rejected by the liveness probe.
    pub async fn valid_token(&self) -> Result<String, FerryError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref()
            && !token.is_expired()
        {
            if self.probe(&token.access_token).await {
                return Ok(token.access_token.clone());
            }
        }

        let fresh = self.refresh().await?;
        let access_token = fresh.access_token.clone();
        *cached = Some(fresh);
        Ok(access_token)
    }

    /// Cheap authenticated GET; any non-success or transport error demotes
    /// the cached token.
    async fn probe(&self, access_token: &str) -> bool {
        let resp = self
            .http
            .get(DRIVE_ABOUT_URL.clone())
            .query(&[("fields", "user")])
            .bearer_auth(access_token)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await;

        match resp {
            Ok(r) if r.status().is_success() => true,
            Ok(r) => {
                debug!(status = %r.status(), "liveness probe rejected cached token");
                false
            }
            Err(e) => {
                debug!(error = %e, "liveness probe failed");
                false
            }
        }
    }

    async fn refresh(&self) -> Result<CachedToken, FerryError> {
        let refresh_token = self
            .refresh_token
            .as_deref()
            .ok_or(FerryError::RefreshTokenMissing)?;

        let token = self
            .oauth
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http)
            .await
            .map_err(OauthError::from)?;

        let expires_in = token.expires_in().unwrap_or(DEFAULT_EXPIRES_IN);
        info!("Access token refreshed successfully");
        Ok(CachedToken::from_refresh(
            token.access_token().secret().clone(),
            expires_in,
        ))
    }
}

/// Build the Google OAuth2 client from configured credentials.
fn build_oauth2_client(cfg: &Config) -> Result<DriveOauthClient, FerryError> {
    let mut client = OAuth2Client::new(ClientId::new(cfg.client_id.clone()))
        .set_client_secret(ClientSecret::new(cfg.client_secret.clone()))
        .set_token_uri(TokenUrl::from_url(GOOGLE_TOKEN_URI.clone()));
    if !cfg.redirect_uri.is_empty() {
        client = client.set_redirect_uri(RedirectUrl::new(cfg.redirect_uri.clone())?);
    }
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_applies_early_renewal_skew() {
        let before = Utc::now();
        let token = CachedToken::from_refresh("tok".to_string(), Duration::from_secs(3600));
        let after = Utc::now();

        assert!(token.expires_at >= before + ChronoDuration::seconds(3540));
        assert!(token.expires_at <= after + ChronoDuration::seconds(3540));
    }

    #[test]
    fn token_is_expired_at_or_after_the_instant() {
        // expires_in equal to the skew puts the expiry at "now"
        let expired = CachedToken::from_refresh("tok".to_string(), Duration::from_secs(60));
        assert!(expired.is_expired());

        let live = CachedToken::from_refresh("tok".to_string(), Duration::from_secs(120));
        assert!(!live.is_expired());
    }
}
