//! Integration tests for the provider client against a mock token endpoint.

use crate::{AuthAttempt, GrantError, ProviderClient, ProviderConfig};
use base64::{Engine, engine::general_purpose::STANDARD};
use std::collections::HashMap;
use url::Url;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider_config(server_url: &str) -> ProviderConfig {
    ProviderConfig {
        client_id: "mock_client_id".to_string(),
        client_secret: "mock_secret".to_string(),
        server_url: server_url.to_string(),
        redirect_uri: "http://localhost:3000/auth/callback".to_string(),
        scopes: vec!["RingOut".to_string(), "SMS".to_string()],
        http_timeout_seconds: 5,
    }
}

fn token_body(access: &str, refresh: &str) -> serde_json::Value {
    serde_json::json!({
        "access_token": access,
        "token_type": "bearer",
        "expires_in": 3600,
        "refresh_token": refresh,
        "refresh_token_expires_in": 604800,
        "scope": "RingOut SMS"
    })
}

#[test]
fn authorize_url_carries_pkce_and_state() {
    let client = ProviderClient::new(provider_config("https://platform.example-pbx.com"));
    let attempt = AuthAttempt::new();

    let url = client.authorize_url(&attempt).unwrap();
    assert_eq!(url.host_str(), Some("platform.example-pbx.com"));
    assert_eq!(url.path(), "/restapi/oauth/authorize");

    let params: HashMap<_, _> = url.query_pairs().collect();
    assert_eq!(params.get("response_type"), Some(&"code".into()));
    assert_eq!(params.get("client_id"), Some(&"mock_client_id".into()));
    assert_eq!(
        params.get("redirect_uri"),
        Some(&"http://localhost:3000/auth/callback".into())
    );
    assert_eq!(params.get("state"), Some(&attempt.state.clone().into()));
    assert_eq!(
        params.get("code_challenge"),
        Some(&attempt.pkce.code_challenge.clone().into())
    );
    assert_eq!(params.get("code_challenge_method"), Some(&"S256".into()));
    assert_eq!(params.get("scope"), Some(&"RingOut SMS".into()));
}

#[test]
fn authorize_url_refused_without_credentials() {
    let mut config = provider_config("https://platform.example-pbx.com");
    config.client_id.clear();

    let client = ProviderClient::new(config);
    assert!(client.authorize_url(&AuthAttempt::new()).is_err());
}

#[tokio::test]
async fn code_exchange_posts_verifier_with_basic_auth() {
    let mock_server = MockServer::start().await;
    let expected_auth = format!("Basic {}", STANDARD.encode("mock_client_id:mock_secret"));

    Mock::given(method("POST"))
        .and(path("/restapi/oauth/token"))
        .and(header("Authorization", expected_auth.as_str()))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=mock_auth_code"))
        .and(body_string_contains("code_verifier=mock_verifier"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(token_body("access-1", "refresh-1")),
        )
        .mount(&mock_server)
        .await;

    let client = ProviderClient::new(provider_config(&mock_server.uri()));
    let response = client
        .exchange_code("mock_auth_code", "mock_verifier")
        .await
        .unwrap();

    assert_eq!(response.access_token, "access-1");
    assert_eq!(response.refresh_token, "refresh-1");
    assert_eq!(response.expires_in, 3600);
    assert_eq!(response.refresh_token_expires_in, Some(604800));
}

#[tokio::test]
async fn refresh_rotates_and_old_token_is_rejected() {
    let mock_server = MockServer::start().await;

    // The provider accepts the current refresh token once and rotates it.
    Mock::given(method("POST"))
        .and(path("/restapi/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-old"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(token_body("access-2", "refresh-new")),
        )
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    // Replaying the consumed value is an invalid grant.
    Mock::given(method("POST"))
        .and(path("/restapi/oauth/token"))
        .and(body_string_contains("refresh_token=refresh-old"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "Refresh token is invalid"
        })))
        .mount(&mock_server)
        .await;

    let client = ProviderClient::new(provider_config(&mock_server.uri()));

    let rotated = client.refresh("refresh-old").await.unwrap();
    assert_eq!(rotated.refresh_token, "refresh-new");
    assert_ne!(rotated.refresh_token, "refresh-old");

    let replay = client.refresh("refresh-old").await;
    assert!(matches!(replay, Err(GrantError::InvalidGrant)));
}

#[tokio::test]
async fn http_429_classifies_as_throttled() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/restapi/oauth/token"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&mock_server)
        .await;

    let client = ProviderClient::new(provider_config(&mock_server.uri()));
    let result = client.refresh("refresh-1").await;
    assert!(matches!(result, Err(GrantError::Throttled)));
}

#[tokio::test]
async fn throttle_code_in_error_body_classifies_as_throttled() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/restapi/oauth/token"))
        .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
            "errorCode": "CMN-301",
            "message": "Request rate exceeded"
        })))
        .mount(&mock_server)
        .await;

    let client = ProviderClient::new(provider_config(&mock_server.uri()));
    let result = client.refresh("refresh-1").await;
    assert!(matches!(result, Err(GrantError::Throttled)));
}

#[tokio::test]
async fn unauthorized_refresh_classifies_as_invalid_grant() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/restapi/oauth/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "Token is revoked"
        })))
        .mount(&mock_server)
        .await;

    let client = ProviderClient::new(provider_config(&mock_server.uri()));
    let result = client.refresh("refresh-1").await;
    assert!(matches!(result, Err(GrantError::InvalidGrant)));
}

#[tokio::test]
async fn malformed_success_body_is_a_protocol_violation() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/restapi/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&mock_server)
        .await;

    let client = ProviderClient::new(provider_config(&mock_server.uri()));
    let result = client.refresh("refresh-1").await;
    assert!(matches!(result, Err(GrantError::Protocol(_))));
}

#[tokio::test]
async fn unreachable_provider_is_a_transport_error() {
    // Bind-then-drop leaves a port with nothing listening.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = ProviderClient::new(provider_config(&format!("http://{addr}")));
    let result = client.refresh("refresh-1").await;
    assert!(matches!(result, Err(GrantError::Transport(_))));
}

#[test]
fn authorize_url_is_parseable_by_the_browser() {
    let client = ProviderClient::new(provider_config("https://platform.example-pbx.com"));
    let url = client.authorize_url(&AuthAttempt::new()).unwrap();

    // Round-trips through a plain string parse without losing params.
    let reparsed = Url::parse(url.as_str()).unwrap();
    assert_eq!(reparsed.query_pairs().count(), url.query_pairs().count());
}
