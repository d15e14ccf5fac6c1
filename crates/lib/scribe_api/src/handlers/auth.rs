//! Authentication request handlers.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::{Extension, Json};

use crate::AppState;
use crate::error::AppResult;
use crate::extract::JsonBody;
use crate::middleware::auth::{AuthenticatedUser, bearer_token};
use crate::models::{
    AuthResponse, PrivateUser, RefreshRequest, SignInRequest, SignUpRequest, SuccessResponse,
    TokensResponse,
};

fn access_expires_in(state: &AppState) -> u64 {
    state.auth.tokens().settings().access_validity.as_secs()
}

/// `POST /auth/signup/basic`: create an account and open a session.
pub async fn sign_up_handler(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<SignUpRequest>,
) -> AppResult<Json<AuthResponse>> {
    let auth = state.auth.sign_up_basic(body.into()).await?;
    Ok(Json(AuthResponse {
        user: PrivateUser::from(&auth.user),
        tokens: TokensResponse::bearer(auth.tokens, access_expires_in(&state)),
    }))
}

/// `POST /auth/signin/basic`: authenticate with email + password.
pub async fn sign_in_handler(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<SignInRequest>,
) -> AppResult<Json<AuthResponse>> {
    let auth = state.auth.sign_in_basic(&body.email, &body.password).await?;
    Ok(Json(AuthResponse {
        user: PrivateUser::from(&auth.user),
        tokens: TokensResponse::bearer(auth.tokens, access_expires_in(&state)),
    }))
}

/// `DELETE /auth/signout`: revoke the session behind the bearer token.
pub async fn sign_out_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(session)): Extension<AuthenticatedUser>,
) -> AppResult<Json<SuccessResponse>> {
    state.auth.sign_out(&session.keystore).await?;
    Ok(Json(SuccessResponse { success: true }))
}

/// `POST /auth/token/refresh`: exchange the refresh token for a new pair.
///
/// The (possibly expired) access token travels in the `Authorization` header.
pub async fn refresh_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(body): JsonBody<RefreshRequest>,
) -> AppResult<Json<TokensResponse>> {
    let access_token = bearer_token(&headers)?;
    let pair = state.auth.refresh(access_token, &body.refresh_token).await?;
    Ok(Json(TokensResponse::bearer(pair, access_expires_in(&state))))
}
