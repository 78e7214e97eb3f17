//! Wire types for the provider's token endpoint.

use chrono::{DateTime, Duration, Utc};
use pbx_auth_core::TokenRecord;
use serde::{Deserialize, Serialize};

/// Successful token endpoint response, for both the authorization-code and
/// refresh-token grants. The provider rotates `refresh_token` on every
/// refresh; the previous value becomes invalid once this response arrives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub refresh_token: String,
    /// Lifetime of the rotated refresh token; not all provider tiers report
    /// it.
    pub refresh_token_expires_in: Option<u64>,
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Convert relative lifetimes into a durable record with absolute
    /// expiries anchored at `now`.
    pub fn into_record(self, user_id: &str, now: DateTime<Utc>) -> TokenRecord {
        TokenRecord {
            user_id: user_id.to_string(),
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            access_expires_at: now + Duration::seconds(self.expires_in as i64),
            refresh_expires_at: self
                .refresh_token_expires_in
                .map(|secs| now + Duration::seconds(secs as i64)),
            token_type: self.token_type,
            scope: self.scope,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Error body returned by the provider's token endpoint.
///
/// Throttling can be signaled by an application error code rather than an
/// HTTP 429, so classification inspects the body as well as the status.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderErrorBody {
    pub error: Option<String>,
    pub error_description: Option<String>,
    #[serde(rename = "errorCode")]
    pub error_code: Option<String>,
    pub message: Option<String>,
}

impl ProviderErrorBody {
    /// Provider-side throttle code used alongside HTTP 429.
    const THROTTLE_CODE: &str = "CMN-301";

    pub fn signals_throttling(&self) -> bool {
        if self.error_code.as_deref() == Some(Self::THROTTLE_CODE) {
            return true;
        }
        let mentions_rate = |s: &Option<String>| {
            s.as_deref()
                .is_some_and(|text| text.to_ascii_lowercase().contains("rate"))
        };
        mentions_rate(&self.message) || mentions_rate(&self.error_description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response() -> TokenResponse {
        TokenResponse {
            access_token: "access-1".to_string(),
            token_type: "bearer".to_string(),
            expires_in: 3600,
            refresh_token: "refresh-1".to_string(),
            refresh_token_expires_in: Some(604800),
            scope: Some("RingOut SMS".to_string()),
        }
    }

    #[test]
    fn record_gets_absolute_expiries() {
        let now = Utc::now();
        let record = response().into_record("user-1", now);

        assert_eq!(record.access_expires_at, now + Duration::seconds(3600));
        assert_eq!(
            record.refresh_expires_at,
            Some(now + Duration::seconds(604800))
        );
        assert_eq!(record.user_id, "user-1");
        assert_eq!(record.updated_at, now);
    }

    #[test]
    fn missing_refresh_lifetime_maps_to_none() {
        let now = Utc::now();
        let mut resp = response();
        resp.refresh_token_expires_in = None;

        let record = resp.into_record("user-1", now);
        assert!(record.refresh_expires_at.is_none());
    }

    #[test]
    fn throttle_classification_reads_code_and_description() {
        let by_code: ProviderErrorBody = serde_json::from_str(
            r#"{"errorCode": "CMN-301", "message": "Request rate exceeded"}"#,
        )
        .unwrap();
        assert!(by_code.signals_throttling());

        let by_description: ProviderErrorBody = serde_json::from_str(
            r#"{"error": "server_error", "error_description": "rate limit hit"}"#,
        )
        .unwrap();
        assert!(by_description.signals_throttling());

        let invalid_grant: ProviderErrorBody = serde_json::from_str(
            r#"{"error": "invalid_grant", "error_description": "Token is revoked"}"#,
        )
        .unwrap();
        assert!(!invalid_grant.signals_throttling());
    }
}
