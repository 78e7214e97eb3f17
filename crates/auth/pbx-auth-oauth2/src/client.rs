//! HTTP client for the provider's OAuth2 endpoints.

use crate::config::ProviderConfig;
use crate::pkce::AuthAttempt;
use crate::types::{ProviderErrorBody, TokenResponse};
use pbx_auth_core::{AuthError, AuthResult};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};
use url::Url;

/// Classified failure of a token grant, for both the authorization-code
/// exchange and the refresh grant. The caller decides what each class does
/// to the stores.
#[derive(Debug, Error)]
pub enum GrantError {
    /// HTTP 429 or a provider throttle code; stored tokens may still be
    /// valid.
    #[error("provider throttled the request")]
    Throttled,

    /// HTTP 400/401: the grant is invalid or revoked upstream.
    #[error("grant rejected as invalid or revoked")]
    InvalidGrant,

    /// The provider answered outside its own protocol (unparseable body,
    /// unexpected status).
    #[error("provider protocol violation: {0}")]
    Protocol(String),

    /// Network-level failure, including timeouts. Never retried here;
    /// backoff is the rate limiter's job.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Client for the provider's authorize and token endpoints.
#[derive(Clone)]
pub struct ProviderClient {
    http_client: Client,
    config: ProviderConfig,
}

impl ProviderClient {
    pub fn new(config: ProviderConfig) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_seconds))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http_client,
            config,
        }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Build the provider authorization URL for one attempt.
    ///
    /// Fails with a configuration error (and no redirect) when client
    /// credentials are missing.
    pub fn authorize_url(&self, attempt: &AuthAttempt) -> AuthResult<Url> {
        self.config.validate_credentials()?;

        let mut url = Url::parse(&self.config.authorize_endpoint())
            .map_err(|e| AuthError::Configuration(format!("bad provider server URL: {e}")))?;

        {
            let mut params = url.query_pairs_mut();
            params.append_pair("response_type", "code");
            params.append_pair("client_id", &self.config.client_id);
            params.append_pair("redirect_uri", &self.config.redirect_uri);
            params.append_pair("state", &attempt.state);
            params.append_pair("code_challenge", &attempt.pkce.code_challenge);
            params.append_pair("code_challenge_method", &attempt.pkce.code_challenge_method);

            if !self.config.scopes.is_empty() {
                params.append_pair("scope", &self.config.formatted_scopes());
            }
        }

        debug!(state = %attempt.state, "built provider authorization URL");
        Ok(url)
    }

    /// Exchange an authorization code plus PKCE verifier for the initial
    /// token pair.
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse, GrantError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code_verifier", code_verifier),
        ];

        let response = self.token_request(&params).await?;
        debug!("authorization code exchanged for tokens");
        Ok(response)
    }

    /// Perform a `refresh_token` grant. The provider rotates the refresh
    /// token; the value sent here is dead once this returns successfully.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, GrantError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];

        let response = self.token_request(&params).await?;
        debug!("refresh grant succeeded, tokens rotated");
        Ok(response)
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenResponse, GrantError> {
        let response = self
            .http_client
            .post(self.config.token_endpoint())
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(params)
            .send()
            .await
            .map_err(|e| GrantError::Transport(e.to_string()))?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("token endpoint returned 429");
            return Err(GrantError::Throttled);
        }

        let body = response
            .text()
            .await
            .map_err(|e| GrantError::Transport(e.to_string()))?;

        if status.is_success() {
            return serde_json::from_str(&body).map_err(|e| {
                error!("token endpoint returned unparseable success body: {e}");
                GrantError::Protocol(format!("malformed token response: {e}"))
            });
        }

        let error_body: ProviderErrorBody = serde_json::from_str(&body).unwrap_or_default();

        if error_body.signals_throttling() {
            warn!(%status, "token endpoint signaled throttling in the error body");
            return Err(GrantError::Throttled);
        }

        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            warn!(
                %status,
                error = error_body.error.as_deref().unwrap_or("unknown"),
                "grant rejected by provider"
            );
            return Err(GrantError::InvalidGrant);
        }

        error!(%status, "unexpected token endpoint response");
        Err(GrantError::Protocol(format!(
            "unexpected status {status}: {body}"
        )))
    }
}
