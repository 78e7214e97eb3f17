//! Error taxonomy for the token lifecycle.

use chrono::{DateTime, Utc};
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

/// Failures surfaced by the token lifecycle.
///
/// The variants map one-to-one onto caller behavior: configuration and CSRF
/// errors are never retried, `UpstreamRateLimited` carries the time the
/// caller must back off until, `InvalidGrant` requires a fresh authorization
/// flow, and `NoValidToken` asks the caller to attempt a refresh first.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing or invalid client configuration: {0}")]
    Configuration(String),

    #[error("state parameter mismatch")]
    CsrfMismatch,

    #[error("provider rate limit in effect until {reset_at}")]
    UpstreamRateLimited { reset_at: DateTime<Utc> },

    #[error("refresh token invalid or revoked")]
    InvalidGrant,

    #[error("transport or protocol error: {0}")]
    TransportOrParse(String),

    #[error("no valid access token available")]
    NoValidToken,

    #[error("token store error: {0}")]
    Store(#[from] StoreError),
}

impl AuthError {
    /// Whether the caller must restart the authorization flow to recover.
    pub fn requires_reauthorize(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidGrant
                | AuthError::TransportOrParse(_)
                | AuthError::Configuration(_)
        )
    }
}

/// Failures from a [`crate::TokenStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
