//! Host-session resolution.
//!
//! The CRM's session system is an external collaborator; this module is only
//! the seam that recovers the current user id from it. Sessions arrive as an
//! HS256 JWT, either in the `crm_session` cookie or as a bearer token.

use axum_extra::extract::cookie::CookieJar;
use http::HeaderMap;
use http::header::AUTHORIZATION;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const SESSION_COOKIE: &str = "crm_session";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub exp: i64,
}

/// Verifies host-session JWTs and extracts the user id.
pub struct SessionVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl SessionVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Resolve the current user, if the request carries a valid session.
    pub fn user_id(&self, jar: &CookieJar, headers: &HeaderMap) -> Option<String> {
        let token = jar
            .get(SESSION_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .or_else(|| bearer_token(headers))?;

        match decode::<SessionClaims>(&token, &self.decoding_key, &self.validation) {
            Ok(data) => Some(data.claims.sub),
            Err(err) => {
                debug!("session token rejected: {err}");
                None
            }
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum_extra::extract::cookie::Cookie;
    use chrono::{Duration, Utc};
    use jsonwebtoken::{EncodingKey, Header, encode};

    fn session_token(secret: &str, sub: &str, ttl: Duration) -> String {
        let claims = SessionClaims {
            sub: sub.to_string(),
            exp: (Utc::now() + ttl).timestamp(),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn resolves_user_from_session_cookie() {
        let verifier = SessionVerifier::new("secret");
        let jar =
            CookieJar::new().add(Cookie::new(SESSION_COOKIE, session_token("secret", "user-1", Duration::hours(1))));

        assert_eq!(
            verifier.user_id(&jar, &HeaderMap::new()),
            Some("user-1".to_string())
        );
    }

    #[test]
    fn resolves_user_from_bearer_header() {
        let verifier = SessionVerifier::new("secret");
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            format!(
                "Bearer {}",
                session_token("secret", "user-2", Duration::hours(1))
            )
            .parse()
            .unwrap(),
        );

        assert_eq!(
            verifier.user_id(&CookieJar::new(), &headers),
            Some("user-2".to_string())
        );
    }

    #[test]
    fn rejects_wrong_secret_and_expired_sessions() {
        let verifier = SessionVerifier::new("secret");

        let forged = CookieJar::new().add(Cookie::new(
            SESSION_COOKIE,
            session_token("other-secret", "user-1", Duration::hours(1)),
        ));
        assert!(verifier.user_id(&forged, &HeaderMap::new()).is_none());

        let expired = CookieJar::new().add(Cookie::new(
            SESSION_COOKIE,
            session_token("secret", "user-1", Duration::hours(-2)),
        ));
        assert!(verifier.user_id(&expired, &HeaderMap::new()).is_none());
    }

    #[test]
    fn anonymous_request_has_no_user() {
        let verifier = SessionVerifier::new("secret");
        assert!(
            verifier
                .user_id(&CookieJar::new(), &HeaderMap::new())
                .is_none()
        );
    }
}
