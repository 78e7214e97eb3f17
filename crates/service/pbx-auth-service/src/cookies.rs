//! Cookie codec for the transport token cache.
//!
//! Every token field travels as its own named cookie so each one carries its
//! own expiry; a browser dropping one field never corrupts the others. All
//! cookies are http-only, `SameSite=Lax`, `Path=/`, `Secure` per deployment
//! config, and carry explicit expirations rather than being session-only so
//! state stays consistent across tabs.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Duration, Utc};
use pbx_auth_core::{TokenCacheEntry, TokenRecord};
use pbx_auth_oauth2::AuthAttempt;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const ACCESS_TOKEN: &str = "pbx_access_token";
pub const REFRESH_TOKEN: &str = "pbx_refresh_token";
pub const ACCESS_EXPIRY: &str = "pbx_access_expiry";
pub const REFRESH_EXPIRY: &str = "pbx_refresh_expiry";
pub const TOKEN_TYPE: &str = "pbx_token_type";
pub const SCOPE: &str = "pbx_scope";

pub const OAUTH_STATE: &str = "oauth_state";
pub const CODE_VERIFIER: &str = "oauth_code_verifier";

const TOKEN_COOKIES: [&str; 6] = [
    ACCESS_TOKEN,
    REFRESH_TOKEN,
    ACCESS_EXPIRY,
    REFRESH_EXPIRY,
    TOKEN_TYPE,
    SCOPE,
];

/// Authorization attempt cookies live ten minutes.
const ATTEMPT_TTL_SECONDS: i64 = 600;

/// Refresh-token cookies outlive the access token; thirty days matches the
/// provider's longest refresh-token tier.
const REFRESH_COOKIE_DAYS: i64 = 30;

/// Deployment-dependent cookie flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieSettings {
    /// Set the `Secure` attribute; on in production, off for local HTTP.
    pub secure: bool,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self { secure: false }
    }
}

fn cookie_expiring_at(
    name: &'static str,
    value: String,
    expires_at: DateTime<Utc>,
    settings: &CookieSettings,
) -> Cookie<'static> {
    let expires = OffsetDateTime::from_unix_timestamp(expires_at.timestamp())
        .unwrap_or(OffsetDateTime::UNIX_EPOCH);

    Cookie::build((name, value))
        .http_only(true)
        .secure(settings.secure)
        .same_site(SameSite::Lax)
        .path("/")
        .expires(expires)
        .build()
}

/// Expired empty cookie with the same path and flags as the original, so
/// browsers actually drop it.
fn removal_cookie(name: &'static str, settings: &CookieSettings) -> Cookie<'static> {
    Cookie::build((name, ""))
        .http_only(true)
        .secure(settings.secure)
        .same_site(SameSite::Lax)
        .path("/")
        .expires(OffsetDateTime::UNIX_EPOCH)
        .build()
}

/// Stash the state token and PKCE verifier for the pending authorization
/// attempt.
pub fn write_attempt(jar: CookieJar, attempt: &AuthAttempt, settings: &CookieSettings) -> CookieJar {
    let expires_at = Utc::now() + Duration::seconds(ATTEMPT_TTL_SECONDS);
    jar.add(cookie_expiring_at(
        OAUTH_STATE,
        attempt.state.clone(),
        expires_at,
        settings,
    ))
    .add(cookie_expiring_at(
        CODE_VERIFIER,
        attempt.pkce.code_verifier.clone(),
        expires_at,
        settings,
    ))
}

/// Read back the pending attempt: `(state, code_verifier)`. Cleared
/// (empty-value) cookies read as absent.
pub fn read_attempt(jar: &CookieJar) -> Option<(String, String)> {
    let state = non_empty(jar, OAUTH_STATE)?;
    let verifier = non_empty(jar, CODE_VERIFIER)?;
    Some((state, verifier))
}

pub fn clear_attempt(jar: CookieJar, settings: &CookieSettings) -> CookieJar {
    jar.add(removal_cookie(OAUTH_STATE, settings))
        .add(removal_cookie(CODE_VERIFIER, settings))
}

/// Mirror a durable record into the transport cache.
pub fn write_tokens(
    jar: CookieJar,
    record: &TokenRecord,
    now: DateTime<Utc>,
    settings: &CookieSettings,
) -> CookieJar {
    let refresh_expires = now + Duration::days(REFRESH_COOKIE_DAYS);

    let mut jar = jar
        .add(cookie_expiring_at(
            ACCESS_TOKEN,
            record.access_token.clone(),
            record.access_expires_at,
            settings,
        ))
        .add(cookie_expiring_at(
            ACCESS_EXPIRY,
            record.access_expires_at.timestamp_millis().to_string(),
            record.access_expires_at,
            settings,
        ))
        .add(cookie_expiring_at(
            REFRESH_TOKEN,
            record.refresh_token.clone(),
            refresh_expires,
            settings,
        ))
        .add(cookie_expiring_at(
            TOKEN_TYPE,
            record.token_type.clone(),
            refresh_expires,
            settings,
        ));

    if let Some(at) = record.refresh_expires_at {
        jar = jar.add(cookie_expiring_at(
            REFRESH_EXPIRY,
            at.timestamp_millis().to_string(),
            refresh_expires,
            settings,
        ));
    }
    if let Some(scope) = &record.scope {
        jar = jar.add(cookie_expiring_at(
            SCOPE,
            scope.clone(),
            refresh_expires,
            settings,
        ));
    }

    jar
}

/// Read the cached token fields from a request's cookies. Requires at least
/// the access token and its expiry; everything else is optional.
pub fn read_tokens(jar: &CookieJar) -> Option<TokenCacheEntry> {
    let access_token = non_empty(jar, ACCESS_TOKEN)?;
    let access_expires_at = parse_millis(&non_empty(jar, ACCESS_EXPIRY)?)?;

    Some(TokenCacheEntry {
        access_token,
        access_expires_at,
        refresh_token: non_empty(jar, REFRESH_TOKEN),
        refresh_expires_at: non_empty(jar, REFRESH_EXPIRY).and_then(|v| parse_millis(&v)),
        token_type: non_empty(jar, TOKEN_TYPE),
        scope: non_empty(jar, SCOPE),
    })
}

/// The refresh token may outlive the cached access token; it is readable
/// even when [`read_tokens`] has nothing to serve.
pub fn read_refresh_token(jar: &CookieJar) -> Option<String> {
    non_empty(jar, REFRESH_TOKEN)
}

pub fn clear_tokens(jar: CookieJar, settings: &CookieSettings) -> CookieJar {
    TOKEN_COOKIES
        .iter()
        .fold(jar, |jar, name| jar.add(removal_cookie(name, settings)))
}

fn non_empty(jar: &CookieJar, name: &str) -> Option<String> {
    jar.get(name)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_millis(value: &str) -> Option<DateTime<Utc>> {
    value
        .parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> TokenRecord {
        let now = Utc::now();
        TokenRecord {
            user_id: "user-1".to_string(),
            access_token: "access-1".to_string(),
            refresh_token: "refresh-1".to_string(),
            access_expires_at: now + Duration::hours(1),
            refresh_expires_at: Some(now + Duration::days(7)),
            token_type: "bearer".to_string(),
            scope: Some("RingOut SMS".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn token_cookies_round_trip() {
        let settings = CookieSettings::default();
        let record = record();
        let jar = write_tokens(CookieJar::new(), &record, Utc::now(), &settings);

        let entry = read_tokens(&jar).unwrap();
        assert_eq!(entry.access_token, "access-1");
        assert_eq!(entry.refresh_token.as_deref(), Some("refresh-1"));
        assert_eq!(
            entry.access_expires_at.timestamp_millis(),
            record.access_expires_at.timestamp_millis()
        );
        assert_eq!(entry.token_type.as_deref(), Some("bearer"));
        assert_eq!(entry.scope.as_deref(), Some("RingOut SMS"));
    }

    #[test]
    fn token_cookies_are_http_only_lax() {
        let settings = CookieSettings { secure: true };
        let jar = write_tokens(CookieJar::new(), &record(), Utc::now(), &settings);

        let cookie = jar.get(ACCESS_TOKEN).unwrap();
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
        assert!(cookie.expires().is_some());
    }

    #[test]
    fn attempt_cookies_round_trip_and_clear() {
        let settings = CookieSettings::default();
        let attempt = AuthAttempt::new();

        let jar = write_attempt(CookieJar::new(), &attempt, &settings);
        let (state, verifier) = read_attempt(&jar).unwrap();
        assert_eq!(state, attempt.state);
        assert_eq!(verifier, attempt.pkce.code_verifier);

        let jar = clear_attempt(jar, &settings);
        let state_cookie = jar.get(OAUTH_STATE).unwrap();
        assert!(state_cookie.value().is_empty());
        assert_eq!(
            state_cookie.expires(),
            Some(OffsetDateTime::UNIX_EPOCH.into())
        );
    }

    #[test]
    fn missing_access_expiry_reads_as_no_cache() {
        let settings = CookieSettings::default();
        let jar = CookieJar::new().add(cookie_expiring_at(
            ACCESS_TOKEN,
            "access-1".to_string(),
            Utc::now() + Duration::hours(1),
            &settings,
        ));

        assert!(read_tokens(&jar).is_none());
    }

    #[test]
    fn clear_tokens_expires_every_field() {
        let settings = CookieSettings::default();
        let jar = write_tokens(CookieJar::new(), &record(), Utc::now(), &settings);
        let jar = clear_tokens(jar, &settings);

        for name in TOKEN_COOKIES {
            let cookie = jar.get(name).unwrap();
            assert!(cookie.value().is_empty(), "{name} should be emptied");
            assert_eq!(cookie.expires(), Some(OffsetDateTime::UNIX_EPOCH.into()));
        }
    }
}
