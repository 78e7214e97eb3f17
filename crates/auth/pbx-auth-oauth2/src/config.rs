//! Provider client configuration.

use pbx_auth_core::{AuthError, AuthResult};
use serde::{Deserialize, Serialize};

/// OAuth2 configuration for the PBX provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Provider platform base URL, e.g. `https://platform.example-pbx.com`.
    pub server_url: String,
    /// Redirect URI registered with the provider.
    pub redirect_uri: String,
    /// Requested scope set, space-joined in the authorize URL.
    pub scopes: Vec<String>,
    /// Timeout for token endpoint calls, in seconds.
    pub http_timeout_seconds: u64,
}

impl ProviderConfig {
    pub fn authorize_endpoint(&self) -> String {
        format!("{}/restapi/oauth/authorize", self.server_url)
    }

    pub fn token_endpoint(&self) -> String {
        format!("{}/restapi/oauth/token", self.server_url)
    }

    /// Space-separated scope string for the authorize URL.
    pub fn formatted_scopes(&self) -> String {
        self.scopes.join(" ")
    }

    /// Client credentials are required for every grant and for building the
    /// authorize URL; a deployment without them must not emit redirects.
    pub fn validate_credentials(&self) -> AuthResult<()> {
        if self.client_id.is_empty() {
            return Err(AuthError::Configuration("client_id is not set".to_string()));
        }
        if self.client_secret.is_empty() {
            return Err(AuthError::Configuration(
                "client_secret is not set".to_string(),
            ));
        }
        Ok(())
    }
}
