//! CSRF double-submit checks for mutating requests.
//!
//! Every session carries a CSRF token; mutating requests must echo it via
//! the `X-CSRF-Token` header or a `_csrf` form field. Share-link routes are
//! exempt: their capability comes from the unguessable token in the URL,
//! not from an ambient cookie.

use axum::body::{to_bytes, Body};
use axum::extract::{Extension, Request};
use axum::http::{header, HeaderMap, Method};
use axum::middleware::Next;
use axum::response::Response;

use super::error::ApiError;
use crate::store::types::Session;

pub const CSRF_HEADER: &str = "x-csrf-token";
pub const CSRF_FORM_FIELD: &str = "_csrf";

/// Ceiling when buffering a body to look for the form field. Anything
/// larger has to send the header instead.
const FORM_BODY_LIMIT: usize = 1 << 20;

/// Safe methods never mutate and skip the check.
#[must_use]
pub fn requires_check(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Share-link routes authenticate via the URL token alone.
#[must_use]
pub fn exempt_path(path: &str) -> bool {
    path == "/s" || path.starts_with("/s/")
}

/// Check a submitted token against the session's token. The check runs
/// before any mutation; a missing submission fails the same way as a
/// mismatched one.
pub fn verify(
    session_token: &str,
    headers: &HeaderMap,
    form_token: Option<&str>,
) -> Result<(), ApiError> {
    let submitted = headers
        .get(CSRF_HEADER)
        .and_then(|value| value.to_str().ok())
        .or(form_token)
        .unwrap_or_default();
    if submitted.is_empty() || submitted != session_token {
        return Err(ApiError::CsrfMismatch);
    }
    Ok(())
}

/// Router-level enforcement. Mutating methods on non-exempt paths must
/// echo the session's token before any handler runs; safe methods and the
/// `/s/` surface pass through untouched.
///
/// The header is checked first without touching the body. When it is
/// absent the body is buffered to look for the form field, except for
/// multipart uploads, which are never buffered and therefore carry the
/// token in the header.
pub async fn middleware(
    Extension(session): Extension<Session>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !requires_check(request.method()) || exempt_path(request.uri().path()) {
        return Ok(next.run(request).await);
    }
    if verify(&session.csrf_token, request.headers(), None).is_ok() {
        return Ok(next.run(request).await);
    }

    let multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/"));
    if multipart {
        return Err(ApiError::CsrfMismatch);
    }

    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, FORM_BODY_LIMIT)
        .await
        .map_err(|_| ApiError::CsrfMismatch)?;
    let form_token = serde_json::from_slice::<serde_json::Value>(&bytes)
        .ok()
        .and_then(|value| {
            value
                .get(CSRF_FORM_FIELD)
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
        });
    verify(&session.csrf_token, &parts.headers, form_token.as_deref())?;

    // Hand the buffered bytes back so extractors see the original body.
    let request = Request::from_parts(parts, Body::from(bytes));
    Ok(next.run(request).await)
}
