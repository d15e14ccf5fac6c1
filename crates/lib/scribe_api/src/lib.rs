//! # scribe_api
//!
//! HTTP API library for Scribe.

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use scribe_core::auth::AuthError;
use scribe_core::auth::apikey::{ApiKeyStore, PgApiKeyStore};
use scribe_core::auth::jwt::TokenService;
use scribe_core::auth::keys::load_signing_keys;
use scribe_core::auth::keystore::PgKeystore;
use scribe_core::auth::service::AuthService;
use scribe_core::users::{PgUserStore, UserStore};
use sqlx::PgPool;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::handlers::{auth, not_found_handler, profile};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthService,
    pub users: Arc<dyn UserStore>,
    pub api_keys: Arc<dyn ApiKeyStore>,
}

/// Run embedded database migrations.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    scribe_core::migrate::migrate(pool).await
}

/// Build PostgreSQL-backed state. Fails if the signing keys cannot be loaded.
pub fn load_state(config: &ApiConfig, pool: PgPool) -> Result<AppState, AuthError> {
    let keys = load_signing_keys(&config.private_key_path, &config.public_key_path)?;
    let tokens = TokenService::new(Arc::new(keys), config.tokens.clone());

    let users: Arc<dyn UserStore> = Arc::new(PgUserStore::new(pool.clone(), config.query_timeout));
    let keystore = Arc::new(PgKeystore::new(pool.clone(), config.query_timeout));
    let api_keys = Arc::new(PgApiKeyStore::new(pool, config.query_timeout));

    let auth =
        AuthService::new(users.clone(), keystore, tokens).with_bcrypt_cost(config.bcrypt_cost);
    Ok(AppState {
        auth,
        users,
        api_keys,
    })
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (API key only)
    let public = Router::new()
        .route(routes::POST_AUTH_SIGNUP_BASIC, post(auth::sign_up_handler))
        .route(routes::POST_AUTH_SIGNIN_BASIC, post(auth::sign_in_handler))
        .route(routes::POST_AUTH_TOKEN_REFRESH, post(auth::refresh_handler))
        .route(routes::GET_PROFILE_ID, get(profile::public_profile_handler));

    // Protected routes (require a live session); the gate must not wrap the fallback.
    let protected = Router::new()
        .route(routes::DELETE_AUTH_SIGNOUT, delete(auth::sign_out_handler))
        .route(routes::GET_PROFILE_MINE, get(profile::my_profile_handler))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .fallback(not_found_handler)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::api_key::require_api_key,
        ))
        .layer(CatchPanicLayer::custom(error::panic_response))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
