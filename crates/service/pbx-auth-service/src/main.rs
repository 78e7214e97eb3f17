use anyhow::{Context, Result};
use pbx_auth_core::FileTokenStore;
use pbx_auth_oauth2::{ProviderClient, RefreshRateLimiter};
use pbx_auth_service::handlers::{AppState, router};
use pbx_auth_service::{AppConfig, SessionVerifier, TokenLifecycle};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let config = AppConfig::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_filter()))
        .init();

    info!("Starting PBX auth service");

    let store = Arc::new(
        FileTokenStore::open(&config.store.state_file)
            .await
            .with_context(|| {
                format!(
                    "Failed to open token store at {}",
                    config.store.state_file.display()
                )
            })?,
    );

    let provider = ProviderClient::new(config.provider_config());
    let limiter = RefreshRateLimiter::new(config.rate_limit.clone());
    let lifecycle = Arc::new(TokenLifecycle::new(
        store,
        provider,
        limiter,
        config.cookies.clone(),
    ));

    let state = AppState {
        lifecycle,
        sessions: Arc::new(SessionVerifier::new(&config.session.jwt_secret)),
    };

    let app = router(state);

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("Server running on http://{addr}");
    info!("OAuth2 redirect URI: {}", config.provider.redirect_uri);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
