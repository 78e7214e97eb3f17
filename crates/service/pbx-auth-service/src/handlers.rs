//! HTTP surface: the action-dispatched `/auth` endpoint, the OAuth2
//! callback, and liveness.

use crate::flow::TokenLifecycle;
use crate::session::SessionVerifier;
use axum::extract::{Query, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Json, Router};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Utc};
use http::HeaderMap;
use pbx_auth_core::AuthError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<TokenLifecycle>,
    pub sessions: Arc<SessionVerifier>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/auth", get(auth_handler))
        .route("/auth/callback", get(callback_handler))
        .route("/ping", get(ping_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET])
                .allow_headers(Any),
        )
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct AuthQuery {
    action: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reauthorize: Option<bool>,
    /// Millisecond timestamp the caller may retry at, for 429 responses.
    #[serde(rename = "resetTime", skip_serializing_if = "Option::is_none")]
    reset_time: Option<i64>,
}

impl ErrorBody {
    fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            reauthorize: None,
            reset_time: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct TokenBody {
    #[serde(rename = "accessToken")]
    access_token: String,
    #[serde(rename = "expiresAt")]
    expires_at: i64,
}

#[derive(Debug, Serialize)]
struct RefreshBody {
    success: bool,
    #[serde(rename = "accessToken")]
    access_token: String,
    #[serde(rename = "expiresAt")]
    expires_at: i64,
}

#[derive(Debug, Serialize)]
struct SuccessBody {
    success: bool,
}

#[derive(Debug, Serialize)]
struct PingBody {
    status: &'static str,
    timestamp: DateTime<Utc>,
}

/// Map a lifecycle error to its HTTP status and JSON envelope.
fn error_response(err: &AuthError) -> (StatusCode, Json<ErrorBody>) {
    let status = match err {
        AuthError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        AuthError::CsrfMismatch => StatusCode::BAD_REQUEST,
        AuthError::UpstreamRateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        AuthError::InvalidGrant | AuthError::NoValidToken => StatusCode::UNAUTHORIZED,
        AuthError::TransportOrParse(_) => StatusCode::BAD_GATEWAY,
        AuthError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let mut body = ErrorBody::new(err.to_string());
    if err.requires_reauthorize() {
        body.reauthorize = Some(true);
    }
    if let AuthError::UpstreamRateLimited { reset_at } = err {
        body.reset_time = Some(reset_at.timestamp_millis());
    }

    (status, Json(body))
}

async fn auth_handler(
    State(state): State<AppState>,
    Query(query): Query<AuthQuery>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Response {
    let user = state.sessions.user_id(&jar, &headers);

    match query.action.as_deref() {
        Some("authorize") => match state.lifecycle.begin_authorize(jar) {
            Ok((jar, url)) => (jar, Redirect::to(url.as_str())).into_response(),
            Err(err) => error_response(&err).into_response(),
        },

        Some("check") => {
            let (jar, status) = state.lifecycle.check_status(user.as_deref(), jar).await;
            (jar, Json(status)).into_response()
        }

        Some("token") => match state.lifecycle.access_token(user.as_deref(), &jar).await {
            Ok((access_token, expires_at)) => Json(TokenBody {
                access_token,
                expires_at: expires_at.timestamp_millis(),
            })
            .into_response(),
            Err(err) => error_response(&err).into_response(),
        },

        Some("refresh") => {
            let Some(user) = user else {
                let mut body = ErrorBody::new("No active session");
                body.reauthorize = Some(true);
                return (StatusCode::UNAUTHORIZED, Json(body)).into_response();
            };

            let (jar, result) = state.lifecycle.refresh(&user, jar).await;
            match result {
                Ok(record) => (
                    jar,
                    Json(RefreshBody {
                        success: true,
                        access_token: record.access_token,
                        expires_at: record.access_expires_at.timestamp_millis(),
                    }),
                )
                    .into_response(),
                Err(err) => {
                    let (status, body) = error_response(&err);
                    (status, jar, body).into_response()
                }
            }
        }

        Some("logout") => {
            let jar = state.lifecycle.logout(user.as_deref(), jar).await;
            (jar, Json(SuccessBody { success: true })).into_response()
        }

        _ => (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody::new("Invalid action")),
        )
            .into_response(),
    }
}

async fn callback_handler(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Response {
    if let Some(error) = &query.error {
        warn!(
            error,
            description = query.error_description.as_deref().unwrap_or("none"),
            "provider returned an error on callback"
        );
    }

    let Some(code) = query.code else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody::new("Missing authorization code")),
        )
            .into_response();
    };
    let Some(state_param) = query.state else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody::new("Missing state parameter")),
        )
            .into_response();
    };

    let Some(user) = state.sessions.user_id(&jar, &headers) else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorBody::new("No active session")),
        )
            .into_response();
    };

    let (jar, result) = state
        .lifecycle
        .complete_callback(&user, jar, &code, &state_param)
        .await;

    match result {
        Ok(()) => (jar, Json(SuccessBody { success: true })).into_response(),
        Err(err) => {
            let (status, body) = error_response(&err);
            (status, jar, body).into_response()
        }
    }
}

async fn ping_handler() -> Json<PingBody> {
    Json(PingBody {
        status: "ok",
        timestamp: Utc::now(),
    })
}
