//! Token lifecycle orchestration.
//!
//! Ties the durable store, the cookie transport cache, the provider client,
//! and the rate limiter together. The durable store is the source of truth;
//! cookies are a disposable mirror reconciled from it. Every failure path
//! that touches token state fails closed: a potentially stale token is
//! deleted rather than served.

use crate::cookies::{self, CookieSettings};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use pbx_auth_core::{
    AuthError, AuthResult, AuthStatus, TokenRecord, TokenSource, TokenStore,
};
use pbx_auth_oauth2::{AuthAttempt, Decision, GrantError, ProviderClient, RefreshRateLimiter};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use url::Url;

pub struct TokenLifecycle {
    store: Arc<dyn TokenStore>,
    provider: ProviderClient,
    limiter: RefreshRateLimiter,
    cookie_settings: CookieSettings,
}

impl TokenLifecycle {
    pub fn new(
        store: Arc<dyn TokenStore>,
        provider: ProviderClient,
        limiter: RefreshRateLimiter,
        cookie_settings: CookieSettings,
    ) -> Self {
        Self {
            store,
            provider,
            limiter,
            cookie_settings,
        }
    }

    /// Start an authorization attempt: generate PKCE material, stash it in
    /// the attempt cookies, and hand back the provider redirect URL.
    ///
    /// A configuration failure returns the error without touching the jar,
    /// so no redirect and no cookies are emitted.
    pub fn begin_authorize(&self, jar: CookieJar) -> AuthResult<(CookieJar, Url)> {
        let attempt = AuthAttempt::new();
        let url = self.provider.authorize_url(&attempt)?;
        let jar = cookies::write_attempt(jar, &attempt, &self.cookie_settings);

        info!(state = %attempt.state, "authorization flow started");
        Ok((jar, url))
    }

    /// Finish the authorization flow: verify the anti-forgery state, trade
    /// the code plus verifier for the initial token pair, and populate both
    /// stores. Nothing is persisted on any failure.
    pub async fn complete_callback(
        &self,
        user_id: &str,
        jar: CookieJar,
        code: &str,
        state: &str,
    ) -> (CookieJar, AuthResult<()>) {
        let Some((cached_state, verifier)) = cookies::read_attempt(&jar) else {
            warn!("callback without a pending attempt, rejecting");
            return (jar, Err(AuthError::CsrfMismatch));
        };

        if state != cached_state {
            warn!("state mismatch on callback, possible CSRF");
            return (jar, Err(AuthError::CsrfMismatch));
        }

        let response = match self.provider.exchange_code(code, &verifier).await {
            Ok(response) => response,
            Err(GrantError::InvalidGrant) => return (jar, Err(AuthError::InvalidGrant)),
            Err(err) => return (jar, Err(AuthError::TransportOrParse(err.to_string()))),
        };

        let now = Utc::now();
        let record = response.into_record(user_id, now);

        // Same dual-write contract as the refresher: cache first, then the
        // durable upsert.
        let jar = cookies::write_tokens(jar, &record, now, &self.cookie_settings);
        if let Err(err) = self.store.upsert(record).await {
            error!(user = user_id, "failed to persist initial tokens: {err}");
            let jar = self.purge(user_id, jar).await;
            return (jar, Err(err.into()));
        }

        let jar = cookies::clear_attempt(jar, &self.cookie_settings);
        info!(user = user_id, "authorization complete, tokens stored");
        (jar, Ok(()))
    }

    /// Answer "is this user authenticated" without refreshing anything.
    ///
    /// Durable record first; a valid record also rewrites the cookie mirror,
    /// which may be stale or missing after a server restart or on another
    /// device. Cookies are only consulted when the durable side cannot
    /// answer.
    pub async fn check_status(
        &self,
        user_id: Option<&str>,
        jar: CookieJar,
    ) -> (CookieJar, AuthStatus) {
        let now = Utc::now();

        if let Some(user_id) = user_id {
            match self.store.get(user_id).await {
                Ok(Some(record)) if record.usable_at(now) => {
                    let jar = cookies::write_tokens(jar, &record, now, &self.cookie_settings);
                    return (
                        jar,
                        AuthStatus {
                            is_authenticated: true,
                            source: TokenSource::Database,
                        },
                    );
                }
                Ok(_) => {}
                Err(err) => warn!(user = user_id, "durable store unavailable for check: {err}"),
            }
        }

        if let Some(entry) = cookies::read_tokens(&jar) {
            if entry.access_valid_at(now) {
                return (
                    jar,
                    AuthStatus {
                        is_authenticated: true,
                        source: TokenSource::Cookies,
                    },
                );
            }
            debug!("cached access token expired");
        }

        (jar, AuthStatus::unauthenticated())
    }

    /// Return a currently valid access token for API use. Purely a read:
    /// neither store is reconciled or mutated, and no refresh is attempted.
    pub async fn access_token(
        &self,
        user_id: Option<&str>,
        jar: &CookieJar,
    ) -> AuthResult<(String, DateTime<Utc>)> {
        let now = Utc::now();

        if let Some(user_id) = user_id {
            match self.store.get(user_id).await {
                Ok(Some(record)) if record.access_valid_at(now) => {
                    return Ok((record.access_token, record.access_expires_at));
                }
                Ok(_) => {}
                Err(err) => warn!(user = user_id, "durable store unavailable for token read: {err}"),
            }
        }

        if let Some(entry) = cookies::read_tokens(jar) {
            if entry.access_valid_at(now) {
                return Ok((entry.access_token, entry.access_expires_at));
            }
        }

        Err(AuthError::NoValidToken)
    }

    /// The refresh state machine: precondition checks, the rate limit gate,
    /// one upstream call, classification, rotation with write-then-verify.
    pub async fn refresh(
        &self,
        user_id: &str,
        jar: CookieJar,
    ) -> (CookieJar, AuthResult<TokenRecord>) {
        // Preconditions: client credentials and a refresh token to spend.
        // Without either there is no safe way to continue; clear both stores
        // and force reauthorization.
        if let Err(err) = self.provider.config().validate_credentials() {
            error!("refresh impossible: {err}");
            let jar = self.purge(user_id, jar).await;
            return (jar, Err(err));
        }

        let refresh_token = match cookies::read_refresh_token(&jar) {
            Some(token) => token,
            None => match self.store.get(user_id).await {
                Ok(Some(record)) => record.refresh_token,
                _ => {
                    warn!(user = user_id, "no refresh token available, forcing reauthorization");
                    let jar = self.purge(user_id, jar).await;
                    return (jar, Err(AuthError::InvalidGrant));
                }
            },
        };

        // Rate limit gate; a limited user never reaches the provider.
        if let Decision::Limited { reset_at } = self.limiter.check(user_id).await {
            return (jar, Err(AuthError::UpstreamRateLimited { reset_at }));
        }

        match self.provider.refresh(&refresh_token).await {
            Ok(response) => {
                let now = Utc::now();
                let record = response.into_record(user_id, now);

                // Cache write first: cheap and synchronous with the
                // response. The durable upsert follows and is verified.
                let jar = cookies::write_tokens(jar, &record, now, &self.cookie_settings);
                if let Err(err) = self.store.upsert(record.clone()).await {
                    error!(user = user_id, "token upsert failed after rotation: {err}");
                    let jar = self.purge(user_id, jar).await;
                    return (jar, Err(err.into()));
                }

                self.verify_rotation(user_id, &record).await;
                info!(user = user_id, "access token refreshed");
                (jar, Ok(record))
            }
            Err(GrantError::Throttled) => {
                // Stored tokens may still be valid; leave both stores alone.
                let reset_at = self.limiter.mark_limited(user_id).await;
                (jar, Err(AuthError::UpstreamRateLimited { reset_at }))
            }
            Err(GrantError::InvalidGrant) => {
                info!(user = user_id, "refresh token rejected upstream, clearing stores");
                let jar = self.purge(user_id, jar).await;
                (jar, Err(AuthError::InvalidGrant))
            }
            Err(err) => {
                warn!(user = user_id, "refresh failed, clearing stores: {err}");
                let jar = self.purge(user_id, jar).await;
                (jar, Err(AuthError::TransportOrParse(err.to_string())))
            }
        }
    }

    /// Clear every token cookie and delete the durable record. Succeeds with
    /// nothing to clear.
    pub async fn logout(&self, user_id: Option<&str>, jar: CookieJar) -> CookieJar {
        let jar = cookies::clear_tokens(jar, &self.cookie_settings);
        let jar = cookies::clear_attempt(jar, &self.cookie_settings);

        if let Some(user_id) = user_id {
            if let Err(err) = self.store.delete(user_id).await {
                warn!(user = user_id, "failed to delete durable tokens on logout: {err}");
            } else {
                info!(user = user_id, "logged out, token record deleted");
            }
        }

        jar
    }

    /// Re-read the row just written and compare the refresh token to the
    /// value sent. A mismatch means another writer rotated concurrently and
    /// one rotation was lost.
    async fn verify_rotation(&self, user_id: &str, written: &TokenRecord) {
        match self.store.get(user_id).await {
            Ok(Some(stored)) if stored.refresh_token == written.refresh_token => {}
            Ok(Some(_)) => error!(
                user = user_id,
                "consistency warning: durable refresh token differs from the value just written, concurrent rotation suspected"
            ),
            Ok(None) => error!(
                user = user_id,
                "consistency warning: token record missing immediately after upsert"
            ),
            Err(err) => warn!(user = user_id, "could not verify token write: {err}"),
        }
    }

    /// Best-effort clear of both stores, used on every irrecoverable path.
    async fn purge(&self, user_id: &str, jar: CookieJar) -> CookieJar {
        if let Err(err) = self.store.delete(user_id).await {
            warn!(user = user_id, "failed to clear durable tokens: {err}");
        }
        cookies::clear_tokens(jar, &self.cookie_settings)
    }
}
