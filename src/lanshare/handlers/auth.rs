//! Login, logout and session introspection.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Extension, State};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::auth::password::{verify_password, verify_password_stub};
use crate::auth::{random_token, Principal, CSRF_TOKEN_BYTES, SESSION_TOKEN_BYTES};
use crate::lanshare::error::ApiError;
use crate::lanshare::permissions::{self, PermissionSet};
use crate::lanshare::session::{
    clear_session_cookie, client_ip, session_cookie, ttl_for, SESSION_COOKIE_NAME,
};
use crate::lanshare::App;
use crate::store::login_attempts::throttle_key;
use crate::store::now_unix;
use crate::store::types::Session;

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub remember: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    pub username: Option<String>,
    pub role: &'static str,
    pub anonymous: bool,
    pub csrf_token: String,
    pub permissions: PermissionSet,
}

#[utoipa::path(
    get,
    path = "/api/me",
    responses(
        (status = 200, description = "Current principal and capabilities", body = MeResponse)
    ),
    tag = "auth",
)]
pub async fn me(
    State(app): State<App>,
    Extension(session): Extension<Session>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<MeResponse>, ApiError> {
    let settings = app.effective_settings().await?;
    let perms = permissions::resolve(&principal, app.opts.auth_enabled, &settings);
    Ok(Json(MeResponse {
        username: (!principal.anonymous).then(|| principal.username.clone()),
        role: principal.role.as_str(),
        anonymous: principal.anonymous,
        csrf_token: session.csrf_token,
        permissions: perms,
    }))
}

#[utoipa::path(
    post,
    path = "/api/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = MeResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 429, description = "Account locked")
    ),
    tag = "auth",
)]
pub async fn login(
    State(app): State<App>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Extension(session): Extension<Session>,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let ip = client_ip(&headers, addr);
    let key = throttle_key(&ip, &request.username);
    if let Some(retry_in) = app.store.check_login_allowed(&key).await? {
        return Err(ApiError::AccountLocked(retry_in));
    }

    let user = app.store.get_user_by_username(&request.username).await?;
    // Verify against a throwaway hash for unknown accounts so the timing
    // does not reveal whether the username exists.
    let verified = match &user {
        Some(user) if !user.disabled => verify_password(&user.password_hash, &request.password),
        _ => {
            verify_password_stub(&request.password);
            false
        }
    };
    if !verified {
        let lock_seconds = app.store.register_failed_login(&key).await?;
        if lock_seconds > 0 {
            warn!("login throttled for {lock_seconds}s");
        }
        app.store
            .record_audit(None, "login.failed", &request.username, "")
            .await?;
        return Err(ApiError::InvalidCredentials);
    }
    let user = user.ok_or(ApiError::InvalidCredentials)?;

    app.store.reset_login_attempts(&key).await?;

    // Rotate the session so the pre-login token is worthless afterwards.
    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let now = now_unix();
    let mut rotated = Session {
        token: random_token(SESSION_TOKEN_BYTES)?,
        user_id: Some(user.id),
        csrf_token: random_token(CSRF_TOKEN_BYTES)?,
        remember: request.remember,
        ip,
        user_agent: user_agent.to_string(),
        expires_at: 0,
        created_at: now,
        last_seen_at: now,
    };
    rotated.expires_at = now + ttl_for(&rotated);
    app.store.rotate_session(&session.token, &rotated).await?;
    app.store
        .record_audit(Some(user.id), "login.success", &user.username, "")
        .await?;
    info!("user {} logged in", user.username);

    let principal = Principal {
        user_id: user.id,
        username: user.username,
        role: user.role,
        anonymous: false,
    };
    let settings = app.effective_settings().await?;
    let perms = permissions::resolve(&principal, app.opts.auth_enabled, &settings);
    let body = MeResponse {
        username: Some(principal.username),
        role: principal.role.as_str(),
        anonymous: false,
        csrf_token: rotated.csrf_token.clone(),
        permissions: perms,
    };

    let mut response = (StatusCode::OK, Json(body)).into_response();
    if let Ok(cookie) = session_cookie(&app, &rotated.token, ttl_for(&rotated)) {
        response.headers_mut().insert(SET_COOKIE, cookie);
    }
    Ok(response)
}

#[utoipa::path(
    post,
    path = "/api/logout",
    responses(
        (status = 204, description = "Session cleared")
    ),
    tag = "auth",
)]
pub async fn logout(
    State(app): State<App>,
    Extension(session): Extension<Session>,
    Extension(principal): Extension<Principal>,
) -> Result<Response, ApiError> {
    app.store.delete_session(&session.token).await?;
    if !principal.anonymous {
        app.store
            .record_audit(Some(principal.user_id), "logout", &principal.username, "")
            .await?;
    }

    // Clearing the cookie here also stops the middleware from re-issuing
    // the deleted token; the next request starts anonymous.
    let mut response = StatusCode::NO_CONTENT.into_response();
    if let Ok(cookie) = clear_session_cookie(&app) {
        response.headers_mut().insert(SET_COOKIE, cookie);
    } else {
        warn!("failed to build {SESSION_COOKIE_NAME} clearing cookie");
    }
    Ok(response)
}
