//! OAuth2 client for the PBX telephony provider.
//!
//! Implements the Authorization Code flow with PKCE (S256), the
//! refresh-token grant with HTTP Basic client authentication, response
//! classification for the refresh state machine, and the per-user refresh
//! rate limiter.

mod client;
mod config;
mod pkce;
mod rate_limit;
mod types;

#[cfg(test)]
mod tests;

pub use client::{GrantError, ProviderClient};
pub use config::ProviderConfig;
pub use pkce::{AuthAttempt, PkceChallenge};
pub use rate_limit::{Decision, RateLimitSettings, RefreshRateLimiter};
pub use types::{ProviderErrorBody, TokenResponse};
