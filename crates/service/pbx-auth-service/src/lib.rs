//! HTTP service for the PBX token lifecycle.
//!
//! Exposes the action-dispatched `/auth` endpoint plus the OAuth2 callback
//! route, keeps the cookie transport cache in step with the durable token
//! store, and runs the refresh state machine behind the per-user rate
//! limiter.

pub mod config;
pub mod cookies;
pub mod flow;
pub mod handlers;
pub mod session;

pub use config::AppConfig;
pub use flow::TokenLifecycle;
pub use handlers::{AppState, router};
pub use session::SessionVerifier;
