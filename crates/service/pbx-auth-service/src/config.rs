//! Service configuration.
//!
//! Layered the same way as the rest of the deployment's services: an
//! optional TOML file, `PBX_`-prefixed environment variables (with `__` for
//! nesting, e.g. `PBX__SERVER__PORT`), then a handful of legacy direct
//! variables. Environment values take precedence over the file.

use crate::cookies::CookieSettings;
use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File};
use pbx_auth_oauth2::{ProviderConfig, RateLimitSettings};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub provider: ProviderSettings,
    pub rate_limit: RateLimitSettings,
    pub cookies: CookieSettings,
    pub session: SessionSettings,
    pub store: StoreSettings,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// PBX provider OAuth2 settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// OAuth client id issued by the provider's developer console.
    pub client_id: String,

    /// OAuth client secret.
    pub client_secret: String,

    /// Provider platform base URL.
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Redirect URI registered with the provider.
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,

    /// Scopes requested in the authorization URL. Must match what the
    /// provider's console has enabled for this client.
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    #[serde(default = "default_http_timeout")]
    pub http_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// HS256 secret shared with the CRM's session system.
    #[serde(default = "default_session_secret")]
    pub jwt_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Path of the durable token state file.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or full filter string.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_host() -> IpAddr {
    "127.0.0.1".parse().unwrap()
}

fn default_port() -> u16 {
    3000
}

fn default_server_url() -> String {
    "https://platform.example-pbx.com".to_string()
}

fn default_redirect_uri() -> String {
    "http://localhost:3000/auth/callback".to_string()
}

fn default_scopes() -> Vec<String> {
    [
        "ReadAccounts",
        "ReadCallLog",
        "ReadMessages",
        "ReadPresence",
        "RingOut",
        "SMS",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_http_timeout() -> u64 {
    30
}

fn default_session_secret() -> String {
    warn!("Using default session secret - this is insecure for production!");
    "dev-secret-key-change-in-production".to_string()
}

fn default_state_file() -> PathBuf {
    PathBuf::from("./data/pbx_tokens.json")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            provider: ProviderSettings::default(),
            rate_limit: RateLimitSettings::default(),
            cookies: CookieSettings::default(),
            session: SessionSettings::default(),
            store: StoreSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            server_url: default_server_url(),
            redirect_uri: default_redirect_uri(),
            scopes: default_scopes(),
            http_timeout_seconds: default_http_timeout(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            jwt_secret: default_session_secret(),
        }
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the optional config file and environment.
    pub fn load() -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        let config_path =
            std::env::var("PBX_CONFIG_FILE").unwrap_or_else(|_| "pbx-auth.toml".to_string());

        if std::path::Path::new(&config_path).exists() {
            info!("Loading configuration from {}", config_path);
            builder = builder.add_source(File::with_name(&config_path));
        } else {
            debug!("No config file found at {}, using defaults", config_path);
        }

        builder = builder.add_source(
            Environment::with_prefix("PBX")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let mut settings: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        settings.apply_env_overrides()?;
        settings.validate()?;

        Ok(settings)
    }

    /// Direct environment variables that predate the nested scheme.
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(client_id) = std::env::var("PBX_CLIENT_ID") {
            self.provider.client_id = client_id;
        }

        if let Ok(client_secret) = std::env::var("PBX_CLIENT_SECRET") {
            self.provider.client_secret = client_secret;
        }

        if let Ok(server_url) = std::env::var("PBX_SERVER") {
            self.provider.server_url = server_url;
        }

        if let Ok(redirect_uri) = std::env::var("REDIRECT_URI") {
            self.provider.redirect_uri = redirect_uri;
        }

        if let Ok(scopes) = std::env::var("PBX_OAUTH_SCOPES") {
            self.provider.scopes = scopes.split_whitespace().map(str::to_string).collect();
        }

        if let Ok(port) = std::env::var("PORT") {
            self.server.port = port.parse().context("Invalid PORT value")?;
        }

        if let Ok(jwt_secret) = std::env::var("JWT_SECRET") {
            self.session.jwt_secret = jwt_secret;
        }

        if let Ok(log_level) = std::env::var("RUST_LOG") {
            self.logging.level = log_level;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        if self.provider.scopes.is_empty() {
            anyhow::bail!("At least one OAuth scope must be requested");
        }

        if self.provider.http_timeout_seconds == 0 {
            anyhow::bail!("Provider HTTP timeout must be greater than 0");
        }

        if self.rate_limit.max_attempts == 0 {
            anyhow::bail!("Rate limit max_attempts must be greater than 0");
        }
        if self.rate_limit.window_seconds <= 0 || self.rate_limit.cooldown_seconds <= 0 {
            anyhow::bail!("Rate limit window and cooldown must be positive");
        }

        // Missing credentials are not fatal at boot: the authorize and
        // refresh paths answer 500 per request until they are configured.
        if self.provider.client_id.is_empty() || self.provider.client_secret.is_empty() {
            warn!("PBX client credentials are not configured; auth endpoints will refuse to run");
        }

        if !cfg!(debug_assertions) && self.session.jwt_secret == "dev-secret-key-change-in-production"
        {
            anyhow::bail!("Session JWT secret must be changed from default in production");
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> std::net::SocketAddr {
        std::net::SocketAddr::from((self.server.host, self.server.port))
    }

    /// Filter string for tracing; a bare level fans out to this service and
    /// the auth crates.
    pub fn log_filter(&self) -> String {
        if self.logging.level.contains('=') || self.logging.level.contains(',') {
            self.logging.level.clone()
        } else {
            format!(
                "pbx_auth_service={},pbx_auth_oauth2={},{}",
                self.logging.level, self.logging.level, self.logging.level
            )
        }
    }

    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            client_id: self.provider.client_id.clone(),
            client_secret: self.provider.client_secret.clone(),
            server_url: self.provider.server_url.clone(),
            redirect_uri: self.provider.redirect_uri.clone(),
            scopes: self.provider.scopes.clone(),
            http_timeout_seconds: self.provider.http_timeout_seconds,
        }
    }
}
