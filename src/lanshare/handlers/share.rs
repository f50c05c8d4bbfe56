//! Share links: creation, revocation and the anonymous `/s/{token}` surface.
//!
//! Share requests never consult session permissions; the unguessable token
//! is the whole capability, bounded by the link's mode and base path.

use axum::extract::{Extension, Multipart, Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

use super::files::{read_listing, serve_file, store_multipart};
use super::{parse_expiry, require};
use crate::auth::{random_token, Principal, SHARE_TOKEN_BYTES};
use crate::lanshare::error::ApiError;
use crate::lanshare::permissions;
use crate::lanshare::App;
use crate::sandbox::{normalize_rel_path, safe_join};
use crate::store::now_unix;
use crate::store::types::{ShareLink, ShareMode};

/// Contain a requested sub-path inside a link's base path.
///
/// Both inputs are normalized, joined, and the result must equal the base
/// or sit strictly below it on a path-segment boundary. A sibling whose
/// name merely starts with the base string never qualifies.
pub fn resolve_scoped(base: &str, sub: &str) -> Result<String, ApiError> {
    let base = normalize_rel_path(base);
    let sub = normalize_rel_path(sub);
    if sub.is_empty() {
        return Ok(base);
    }
    let joined = normalize_rel_path(&format!("{base}/{sub}"));
    if base.is_empty() {
        return Ok(joined);
    }
    if joined == base || joined.starts_with(&format!("{base}/")) {
        Ok(joined)
    } else {
        Err(ApiError::ScopeEscape)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ShareCreateRequest {
    pub path: String,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub expiry: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/share/create",
    request_body = ShareCreateRequest,
    responses(
        (status = 200, description = "Link created"),
        (status = 400, description = "Invalid path, mode or expiry"),
        (status = 403, description = "Missing share capability or CSRF token")
    ),
    tag = "share",
)]
pub async fn create(
    State(app): State<App>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<ShareCreateRequest>,
) -> Result<Response, ApiError> {
    let settings = app.effective_settings().await?;
    let perms = permissions::resolve(&principal, app.opts.auth_enabled, &settings);
    require(perms.share)?;

    let rel = normalize_rel_path(&request.path);
    // The target must resolve inside the root today, even though the link
    // stores the relative path.
    safe_join(&app.root, &rel)?;

    let expiry = request
        .expiry
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .unwrap_or(&settings.default_share_expiry)
        .to_string();
    let ttl = parse_expiry(&expiry)
        .ok_or_else(|| ApiError::BadRequest(format!("invalid expiry duration {expiry:?}")))?;

    let mode = match request.mode.as_deref().map(str::trim) {
        None | Some("") => ShareMode::Browse,
        Some(raw) => ShareMode::parse(raw)
            .ok_or_else(|| ApiError::BadRequest(format!("invalid mode {raw:?}")))?,
    };

    let token = random_token(SHARE_TOKEN_BYTES)?;
    let created_by = (!principal.anonymous).then_some(principal.user_id);
    let link = app
        .store
        .create_share_link(&token, &rel, mode, created_by, now_unix() + ttl)
        .await?;
    if created_by.is_some() {
        app.store
            .record_audit(created_by, "share.create", &rel, mode.as_str())
            .await?;
    }

    let url = app.absolute_url(&format!("/s/{token}"));
    Ok((
        StatusCode::OK,
        Json(json!({
            "token": link.token,
            "url": url,
            "mode": link.mode,
            "path": link.path,
            "expires_at": link.expires_at,
        })),
    )
        .into_response())
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ShareRevokeRequest {
    pub token: String,
}

#[utoipa::path(
    post,
    path = "/api/share/revoke",
    request_body = ShareRevokeRequest,
    responses(
        (status = 200, description = "Link revoked"),
        (status = 403, description = "Only the creator or an admin can revoke"),
        (status = 404, description = "Unknown token")
    ),
    tag = "share",
)]
pub async fn revoke(
    State(app): State<App>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<ShareRevokeRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let settings = app.effective_settings().await?;
    let perms = permissions::resolve(&principal, app.opts.auth_enabled, &settings);
    require(perms.share)?;

    let link = app.store.get_share_link(&request.token).await?;
    let owner = !principal.anonymous && link.created_by == Some(principal.user_id);
    if !perms.admin && !owner {
        return Err(ApiError::Forbidden);
    }
    app.store.revoke_share_link(&request.token).await?;
    app.store
        .record_audit(
            (!principal.anonymous).then_some(principal.user_id),
            "share.revoke",
            &request.token,
            "",
        )
        .await?;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct ShareQuery {
    #[serde(default)]
    pub p: String,
    #[serde(default)]
    pub download: Option<String>,
}

#[utoipa::path(
    get,
    path = "/s/{token}",
    params(
        ("token" = String, Path, description = "Share link token"),
        ("p" = Option<String>, Query, description = "Sub-path inside the link scope"),
        ("download" = Option<String>, Query, description = "Force a direct fetch")
    ),
    responses(
        (status = 200, description = "Listing, upload form, or file content"),
        (status = 404, description = "Unknown token"),
        (status = 410, description = "Link expired or revoked")
    ),
    tag = "share",
)]
pub async fn serve(
    State(app): State<App>,
    AxumPath(token): AxumPath<String>,
    Query(query): Query<ShareQuery>,
) -> Result<Response, ApiError> {
    let link = app.store.access_share_link(&token).await?;

    match link.mode {
        ShareMode::Upload => Ok(upload_form(&app, &link).into_response()),
        ShareMode::Download => serve_scoped_file(&app, &link.path).await,
        ShareMode::Browse => browse(&app, &link, &query).await,
    }
}

async fn browse(app: &App, link: &ShareLink, query: &ShareQuery) -> Result<Response, ApiError> {
    let scoped = resolve_scoped(&link.path, &query.p)?;
    if query.download.as_deref().is_some_and(|d| !d.is_empty()) {
        return serve_scoped_file(app, &scoped).await;
    }
    let abs = safe_join(&app.root, &scoped)?;
    let metadata = tokio::fs::metadata(&abs)
        .await
        .map_err(crate::sandbox::SandboxError::Io)?;
    if !metadata.is_dir() {
        return serve_scoped_file(app, &scoped).await;
    }

    let listing = read_listing(&app.root, &abs).await?;
    let base = app.opts.base_path.trim_end_matches('/');
    let mut page = String::from(
        "<!doctype html><html><head><meta charset=\"utf-8\">\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
         <title>shared folder</title></head><body><main><h1>Shared folder</h1>",
    );
    page.push_str(&format!(
        "<p><strong>Path:</strong> <code>{}</code></p><ul>",
        html_escape(&scoped)
    ));
    if scoped != link.path {
        let parent = match scoped.rsplit_once('/') {
            Some((parent, _)) => parent.to_string(),
            None => String::new(),
        };
        page.push_str(&format!(
            "<li><a href=\"{}\">..</a></li>",
            html_escape(&format!(
                "{base}/s/{}?p={}",
                link.token,
                urlencode(&parent)
            ))
        ));
    }
    for entry in &listing.entries {
        let next = normalize_rel_path(&format!("{scoped}/{}", entry.name));
        let href = if entry.dir {
            format!("{base}/s/{}?p={}", link.token, urlencode(&next))
        } else {
            format!("{base}/s/{}?p={}&download=1", link.token, urlencode(&next))
        };
        let suffix = if entry.dir { "/" } else { "" };
        page.push_str(&format!(
            "<li><a href=\"{}\">{}{suffix}</a></li>",
            html_escape(&href),
            html_escape(&entry.name)
        ));
    }
    page.push_str("</ul></main></body></html>");
    Ok(Html(page).into_response())
}

/// Single-file fetch inside a link scope. Directory fetches are refused
/// since archive downloads are not offered on share links.
async fn serve_scoped_file(app: &App, rel: &str) -> Result<Response, ApiError> {
    let abs = safe_join(&app.root, rel)?;
    serve_file(&abs).await
}

fn upload_form(app: &App, link: &ShareLink) -> Html<String> {
    let base = app.opts.base_path.trim_end_matches('/');
    let action = format!("{base}/s/{}/upload", link.token);
    Html(format!(
        "<!doctype html><html><head><meta charset=\"utf-8\">\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
         <title>upload</title></head><body><main><h1>Upload</h1>\
         <p>Files land in <code>{}</code>.</p>\
         <form method=\"post\" action=\"{}\" enctype=\"multipart/form-data\">\
         <input type=\"file\" name=\"file\" multiple required>\
         <button type=\"submit\">Upload</button></form></main></body></html>",
        html_escape(&link.path),
        html_escape(&action)
    ))
}

#[utoipa::path(
    post,
    path = "/s/{token}/upload",
    params(("token" = String, Path, description = "Upload-mode share link token")),
    responses(
        (status = 200, description = "Stored file names"),
        (status = 403, description = "Link is not an upload link, or read-only mode is on"),
        (status = 410, description = "Link expired or revoked")
    ),
    tag = "share",
)]
pub async fn upload(
    State(app): State<App>,
    AxumPath(token): AxumPath<String>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let link = app.store.access_share_link(&token).await?;
    if link.mode != ShareMode::Upload {
        return Err(ApiError::Forbidden);
    }
    let settings = app.effective_settings().await?;
    if settings.read_only {
        return Err(ApiError::Forbidden);
    }

    // A link that points at a file accepts uploads into its directory.
    let mut base = link.path.clone();
    if let Ok(abs) = safe_join(&app.root, &base) {
        if let Ok(metadata) = tokio::fs::metadata(&abs).await {
            if !metadata.is_dir() {
                base = match base.rsplit_once('/') {
                    Some((parent, _)) => parent.to_string(),
                    None => String::new(),
                };
            }
        }
    }
    let dir = safe_join(&app.root, &base)?;
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(crate::sandbox::SandboxError::Io)?;

    let stored = store_multipart(&app, &settings, &dir, multipart).await?;
    app.store
        .record_audit(
            link.created_by,
            "share.upload",
            &stored.join(","),
            &format!("token={token}"),
        )
        .await?;
    Ok((StatusCode::OK, Json(json!({ "stored": stored }))).into_response())
}

fn html_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn urlencode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoped_join_descends_inside_the_base() {
        assert_eq!(resolve_scoped("docs", "images").expect("scoped"), "docs/images");
        assert_eq!(resolve_scoped("docs", "").expect("scoped"), "docs");
        assert_eq!(
            resolve_scoped("docs", "a/b/c").expect("scoped"),
            "docs/a/b/c"
        );
    }

    #[test]
    fn scope_escapes_are_rejected() {
        assert!(matches!(
            resolve_scoped("docs", "../../etc"),
            Err(ApiError::ScopeEscape)
        ));
        assert!(matches!(
            resolve_scoped("docs", "../docs2"),
            Err(ApiError::ScopeEscape)
        ));
    }

    #[test]
    fn sibling_prefix_does_not_satisfy_containment() {
        // "docs/../docs2" collapses to "docs2": a string prefix of
        // "docs2/..." must not pass as a descendant of "docs".
        assert!(matches!(
            resolve_scoped("docs", "../docs2/readme.md"),
            Err(ApiError::ScopeEscape)
        ));
    }

    #[test]
    fn empty_base_scopes_to_the_whole_root() {
        assert_eq!(resolve_scoped("", "any/where").expect("scoped"), "any/where");
        assert_eq!(resolve_scoped("", "../etc").expect("scoped"), "etc");
    }

    #[test]
    fn html_and_url_escaping() {
        assert_eq!(
            html_escape("<b>\"x\" & 'y'</b>"),
            "&lt;b&gt;&quot;x&quot; &amp; &#39;y&#39;&lt;/b&gt;"
        );
        assert_eq!(urlencode("docs/My File (1).txt"), "docs/My%20File%20%281%29.txt");
    }
}
