//! Durable and transport-cached token state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One durable row per authenticated user, source of truth for token state.
///
/// Created by the callback exchange, rotated by the refresher, deleted by
/// logout or by the refresher on an irrecoverable failure. The access and
/// refresh expiries are independent clocks; `access_expires_at <=
/// refresh_expires_at` is expected but not required.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    /// Absent when the provider does not report a refresh-token lifetime.
    pub refresh_expires_at: Option<DateTime<Utc>>,
    pub token_type: String,
    pub scope: Option<String>,
    /// Set when the row is first inserted; preserved across rotations by the
    /// store.
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TokenRecord {
    pub fn access_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.access_expires_at > now
    }

    pub fn refresh_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.refresh_expires_at.is_none_or(|at| at > now)
    }

    /// Both clocks are good: the record can serve requests as-is.
    pub fn usable_at(&self, now: DateTime<Utc>) -> bool {
        self.access_valid_at(now) && self.refresh_valid_at(now)
    }
}

/// Snapshot of the token cookies attached to a request.
///
/// Mirrors [`TokenRecord`] but is never authoritative: an absent or stale
/// cache is reconciled from the durable record, never the other way around.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenCacheEntry {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: Option<DateTime<Utc>>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
}

impl TokenCacheEntry {
    pub fn access_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.access_expires_at > now
    }
}

/// Which store answered an authentication check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenSource {
    Database,
    Cookies,
    None,
}

/// Result of the auth status resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    #[serde(rename = "isAuthenticated")]
    pub is_authenticated: bool,
    pub source: TokenSource,
}

impl AuthStatus {
    pub fn unauthenticated() -> Self {
        Self {
            is_authenticated: false,
            source: TokenSource::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(access_offset: i64, refresh_offset: Option<i64>) -> TokenRecord {
        let now = Utc::now();
        TokenRecord {
            user_id: "user-1".to_string(),
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            access_expires_at: now + Duration::seconds(access_offset),
            refresh_expires_at: refresh_offset.map(|s| now + Duration::seconds(s)),
            token_type: "bearer".to_string(),
            scope: Some("RingOut SMS".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn expiries_are_independent_clocks() {
        let now = Utc::now();

        let fresh = record(3600, Some(604800));
        assert!(fresh.usable_at(now));

        let stale_access = record(-10, Some(604800));
        assert!(!stale_access.access_valid_at(now));
        assert!(stale_access.refresh_valid_at(now));
        assert!(!stale_access.usable_at(now));

        let stale_refresh = record(3600, Some(-10));
        assert!(stale_refresh.access_valid_at(now));
        assert!(!stale_refresh.usable_at(now));
    }

    #[test]
    fn missing_refresh_expiry_does_not_gate_validity() {
        let now = Utc::now();
        let rec = record(3600, None);
        assert!(rec.refresh_valid_at(now));
        assert!(rec.usable_at(now));
    }

    #[test]
    fn auth_status_serializes_with_wire_names() {
        let status = AuthStatus {
            is_authenticated: true,
            source: TokenSource::Database,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["isAuthenticated"], true);
        assert_eq!(json["source"], "database");
    }
}
