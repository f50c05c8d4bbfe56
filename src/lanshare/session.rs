//! Session resolution middleware and cookie plumbing.
//!
//! Every request resolves to a session: a valid token slides its expiry
//! forward, an unknown or expired token is silently replaced with a fresh
//! anonymous session. Handlers read the session and principal from request
//! extensions.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use tracing::warn;

use super::error::ApiError;
use super::App;
use crate::auth::{random_token, Principal, CSRF_TOKEN_BYTES, SESSION_TOKEN_BYTES};
use crate::store::now_unix;
use crate::store::types::Session;

pub const SESSION_COOKIE_NAME: &str = "lanshare_session";

/// Anonymous sessions last a day.
pub const ANON_TTL_SECS: i64 = 24 * 3600;
/// Authenticated sessions last half a day, sliding.
pub const AUTH_TTL_SECS: i64 = 12 * 3600;
/// "Remember me" stretches the sliding window to thirty days.
pub const REMEMBER_TTL_SECS: i64 = 30 * 24 * 3600;

#[must_use]
pub fn ttl_for(session: &Session) -> i64 {
    if session.user_id.is_none() {
        ANON_TTL_SECS
    } else if session.remember {
        REMEMBER_TTL_SECS
    } else {
        AUTH_TTL_SECS
    }
}

/// Resolve the request's session, stashing `Session` and `Principal` in
/// extensions, and make sure the response carries the session cookie.
/// Handlers that rotate the session (login) set their own cookie, which
/// wins over the one appended here.
pub async fn middleware(
    State(app): State<App>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let ip = client_ip(request.headers(), addr);
    let user_agent = request
        .headers()
        .get(axum::http::header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let session = resolve_session(&app, request.headers(), &ip, &user_agent).await?;
    let principal = principal_for(&app, &session).await?;

    request.extensions_mut().insert(session.clone());
    request.extensions_mut().insert(principal);

    let mut response = next.run(request).await;

    if !has_session_cookie(response.headers()) {
        match session_cookie(&app, &session.token, ttl_for(&session)) {
            Ok(cookie) => {
                response.headers_mut().append(SET_COOKIE, cookie);
            }
            Err(error) => warn!("failed to build session cookie: {error}"),
        }
    }
    Ok(response)
}

async fn resolve_session(
    app: &App,
    headers: &HeaderMap,
    ip: &str,
    user_agent: &str,
) -> Result<Session, ApiError> {
    if let Some(token) = extract_session_token(headers) {
        if let Some(session) = app.store.get_session(&token).await? {
            let expires_at = now_unix() + ttl_for(&session);
            app.store.touch_session(&token, expires_at).await?;
            return Ok(Session {
                expires_at,
                ..session
            });
        }
    }
    // Unknown and expired tokens are replaced, never reported.
    let session = anonymous_session(ip, user_agent)?;
    app.store.create_session(&session).await?;
    Ok(session)
}

/// Fresh anonymous session with new session and CSRF tokens.
pub fn anonymous_session(ip: &str, user_agent: &str) -> Result<Session, ApiError> {
    let now = now_unix();
    Ok(Session {
        token: random_token(SESSION_TOKEN_BYTES)?,
        user_id: None,
        csrf_token: random_token(CSRF_TOKEN_BYTES)?,
        remember: false,
        ip: ip.to_string(),
        user_agent: user_agent.to_string(),
        expires_at: now + ANON_TTL_SECS,
        created_at: now,
        last_seen_at: now,
    })
}

/// Derive the request principal from the session's bound user, if any.
/// Deleted or disabled accounts fall back to the guest principal.
async fn principal_for(app: &App, session: &Session) -> Result<Principal, ApiError> {
    let Some(user_id) = session.user_id else {
        return Ok(Principal::guest());
    };
    match app.store.get_user_by_id(user_id).await? {
        Some(user) if !user.disabled => Ok(Principal {
            user_id: user.id,
            username: user.username,
            role: user.role,
            anonymous: false,
        }),
        _ => Ok(Principal::guest()),
    }
}

/// Client address for throttling and audit. A reverse proxy in front of the
/// server supplies `X-Forwarded-For`; otherwise the socket peer is used.
#[must_use]
pub fn client_ip(headers: &HeaderMap, addr: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map_or_else(|| addr.ip().to_string(), str::to_string)
}

pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let mut parts = pair.trim().splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == SESSION_COOKIE_NAME {
            return Some(val.to_string());
        }
    }
    None
}

fn has_session_cookie(headers: &HeaderMap) -> bool {
    headers.get_all(SET_COOKIE).iter().any(|value| {
        value
            .to_str()
            .map(|v| v.starts_with(SESSION_COOKIE_NAME))
            .unwrap_or(false)
    })
}

/// Session cookie scoped to the configured base path. `Secure` is tied to
/// TLS being enabled.
pub fn session_cookie(
    app: &App,
    token: &str,
    max_age: i64,
) -> Result<HeaderValue, axum::http::header::InvalidHeaderValue> {
    let path = app.cookie_path();
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path={path}; HttpOnly; SameSite=Lax; Max-Age={max_age}"
    );
    if app.opts.tls {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub fn clear_session_cookie(
    app: &App,
) -> Result<HeaderValue, axum::http::header::InvalidHeaderValue> {
    session_cookie(app, "", 0)
}
