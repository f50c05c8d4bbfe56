//! Filesystem endpoints: listing, download, upload, delete, rename.
//!
//! Every target path goes through the sandbox first; handlers only ever
//! touch the absolute paths it returns.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use axum::body::Body;
use axum::extract::{ConnectInfo, Extension, Multipart, Query, State};
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tower::util::ServiceExt;
use tower_http::services::ServeFile;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use super::{require, require_browse};
use crate::auth::Principal;
use crate::lanshare::error::ApiError;
use crate::lanshare::permissions::{self, PermissionSet};
use crate::lanshare::session::client_ip;
use crate::lanshare::App;
use crate::sandbox::{rel_path_from_root, safe_join};
use crate::store::types::{AppSettings, CollisionPolicy};

#[derive(Debug, Deserialize)]
pub struct PathQuery {
    #[serde(default)]
    pub p: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DirEntry {
    pub name: String,
    pub dir: bool,
    pub size: u64,
    pub modified: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Listing {
    pub path: String,
    pub entries: Vec<DirEntry>,
}

async fn request_perms(
    app: &App,
    principal: &Principal,
) -> Result<(PermissionSet, AppSettings), ApiError> {
    let settings = app.effective_settings().await?;
    let perms = permissions::resolve(principal, app.opts.auth_enabled, &settings);
    Ok((perms, settings))
}

#[utoipa::path(
    get,
    path = "/api/list",
    params(("p" = String, Query, description = "Relative path under the share root")),
    responses(
        (status = 200, description = "Directory listing", body = Listing),
        (status = 400, description = "Path escapes the share root")
    ),
    tag = "files",
)]
pub async fn list(
    State(app): State<App>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<PathQuery>,
) -> Result<Json<Listing>, ApiError> {
    let (perms, _) = request_perms(&app, &principal).await?;
    require_browse(&principal, &perms)?;

    let dir = safe_join(&app.root, &query.p)?;
    let listing = read_listing(&app.root, &dir).await?;
    Ok(Json(listing))
}

pub async fn read_listing(root: &Path, dir: &Path) -> Result<Listing, ApiError> {
    let mut entries = Vec::new();
    let mut reader = tokio::fs::read_dir(dir)
        .await
        .map_err(crate::sandbox::SandboxError::Io)?;
    while let Some(entry) = reader
        .next_entry()
        .await
        .map_err(crate::sandbox::SandboxError::Io)?
    {
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        let name = entry.file_name().to_string_lossy().into_owned();
        let modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .and_then(|d| i64::try_from(d.as_secs()).ok())
            .unwrap_or(0);
        entries.push(DirEntry {
            name,
            dir: metadata.is_dir(),
            size: if metadata.is_dir() { 0 } else { metadata.len() },
            modified,
        });
    }
    // Directories first, then case-insensitive by name.
    entries.sort_by(|a, b| {
        b.dir
            .cmp(&a.dir)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
    Ok(Listing {
        path: rel_path_from_root(root, dir).unwrap_or_default(),
        entries,
    })
}

#[utoipa::path(
    get,
    path = "/api/download",
    params(("p" = String, Query, description = "Relative file path under the share root")),
    responses(
        (status = 200, description = "File content"),
        (status = 400, description = "Path escapes the root or names a directory"),
        (status = 404, description = "File not found")
    ),
    tag = "files",
)]
pub async fn download(
    State(app): State<App>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<PathQuery>,
) -> Result<Response, ApiError> {
    let (perms, _) = request_perms(&app, &principal).await?;
    require_browse(&principal, &perms)?;

    let path = safe_join(&app.root, &query.p)?;
    serve_file(&path).await
}

/// Stream a single file as an attachment. Directories are refused.
pub async fn serve_file(path: &Path) -> Result<Response, ApiError> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(crate::sandbox::SandboxError::Io)?;
    if metadata.is_dir() {
        return Err(ApiError::BadRequest(
            "directory download is not supported".to_string(),
        ));
    }

    let served = ServeFile::new(path)
        .oneshot(Request::new(Body::empty()))
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("serve file: {e}")))?;
    let mut response = served.map(Body::new);
    if response.status() == StatusCode::NOT_FOUND {
        return Err(ApiError::NotFound);
    }

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
        .replace(['"', '\\', '\r', '\n'], "_");
    if let Ok(value) = format!("attachment; filename=\"{filename}\"").parse() {
        response
            .headers_mut()
            .insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

#[utoipa::path(
    post,
    path = "/api/upload",
    params(("p" = String, Query, description = "Target directory, relative to the share root")),
    responses(
        (status = 200, description = "Stored file names"),
        (status = 400, description = "Rejected by size or filename policy"),
        (status = 403, description = "Missing upload capability or CSRF token")
    ),
    tag = "files",
)]
pub async fn upload(
    State(app): State<App>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<PathQuery>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let (perms, settings) = request_perms(&app, &principal).await?;
    require(perms.upload)?;

    let base = if settings.upload_subdir.is_empty() {
        query.p.clone()
    } else {
        format!("{}/{}", settings.upload_subdir.trim_matches('/'), query.p)
    };
    let dir = safe_join(&app.root, &base)?;
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(crate::sandbox::SandboxError::Io)?;

    let stored = store_multipart(&app, &settings, &dir, multipart).await?;
    let actor = (!principal.anonymous).then_some(principal.user_id);
    let ip = client_ip(&headers, addr);
    let action = if actor.is_some() { "upload" } else { "upload.guest" };
    app.store
        .record_audit(
            actor,
            action,
            &stored.join(","),
            &json!({ "ip": ip }).to_string(),
        )
        .await?;

    Ok((StatusCode::OK, Json(json!({ "stored": stored }))).into_response())
}

pub async fn store_multipart(
    app: &App,
    settings: &AppSettings,
    dir: &Path,
    mut multipart: Multipart,
) -> Result<Vec<String>, ApiError> {
    let max_bytes = settings
        .max_upload_size_mb
        .saturating_mul(1024 * 1024)
        .max(0) as u64;
    let allow = compile_pattern(&settings.upload_allow_regex)?;
    let deny = compile_pattern(&settings.upload_deny_regex)?;

    let mut stored = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        let Some(raw_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let name = sanitize_filename(&raw_name)
            .ok_or_else(|| ApiError::BadRequest(format!("invalid filename {raw_name:?}")))?;
        check_filename_policy(&name, allow.as_ref(), deny.as_ref())?;

        let target = final_target(dir, &name, settings.collision_policy).await?;
        let stored_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.clone());
        write_field(field, &target, max_bytes).await?;
        info!("stored upload {}", target.display());

        spawn_scan_hook(app, settings, target);
        stored.push(stored_name);
    }
    if stored.is_empty() {
        return Err(ApiError::BadRequest("no file in upload body".to_string()));
    }
    Ok(stored)
}

/// Stream one multipart field to `<target>.part`, enforcing the size
/// ceiling as bytes arrive, then rename into place.
async fn write_field(
    mut field: axum::extract::multipart::Field<'_>,
    target: &Path,
    max_bytes: u64,
) -> Result<(), ApiError> {
    let part = target.with_extension(format!(
        "{}part",
        target
            .extension()
            .map(|e| format!("{}.", e.to_string_lossy()))
            .unwrap_or_default()
    ));
    let mut file = tokio::fs::File::create(&part)
        .await
        .map_err(crate::sandbox::SandboxError::Io)?;
    let mut written: u64 = 0;

    loop {
        let chunk = match field.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                let _ = tokio::fs::remove_file(&part).await;
                return Err(ApiError::BadRequest(format!("upload aborted: {e}")));
            }
        };
        written += chunk.len() as u64;
        if written > max_bytes {
            drop(file);
            let _ = tokio::fs::remove_file(&part).await;
            return Err(ApiError::BadRequest(format!(
                "file exceeds the {max_bytes} byte upload limit"
            )));
        }
        if let Err(e) = file.write_all(&chunk).await {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(crate::sandbox::SandboxError::Io(e).into());
        }
    }

    file.flush().await.map_err(crate::sandbox::SandboxError::Io)?;
    drop(file);
    tokio::fs::rename(&part, target)
        .await
        .map_err(crate::sandbox::SandboxError::Io)?;
    Ok(())
}

/// Detached post-upload scan. Runs with its own timeout and never blocks
/// the response; a failed or timed-out scan quarantines by deletion.
fn spawn_scan_hook(app: &App, settings: &AppSettings, target: PathBuf) {
    let command = settings.virus_scan_command.trim().to_string();
    if command.is_empty() {
        return;
    }
    let store = app.store.clone();
    tokio::spawn(async move {
        let mut parts = command.split_whitespace();
        let Some(program) = parts.next() else { return };
        let mut cmd = tokio::process::Command::new(program);
        cmd.args(parts).arg(&target);

        let verdict = tokio::time::timeout(std::time::Duration::from_secs(120), async {
            cmd.status().await
        })
        .await;
        let clean = matches!(&verdict, Ok(Ok(status)) if status.success());
        if !clean {
            match &verdict {
                Ok(Ok(status)) => warn!("scan flagged {}: {status}", target.display()),
                Ok(Err(e)) => error!("scan failed to run on {}: {e}", target.display()),
                Err(_) => warn!("scan timed out on {}", target.display()),
            }
            let _ = tokio::fs::remove_file(&target).await;
            let _ = store
                .record_audit(
                    None,
                    "upload_quarantined",
                    &target.display().to_string(),
                    "",
                )
                .await;
        }
    });
}

fn compile_pattern(pattern: &str) -> Result<Option<Regex>, ApiError> {
    if pattern.trim().is_empty() {
        return Ok(None);
    }
    Regex::new(pattern)
        .map(Some)
        .map_err(|e| ApiError::BadRequest(format!("invalid filename pattern: {e}")))
}

fn check_filename_policy(
    name: &str,
    allow: Option<&Regex>,
    deny: Option<&Regex>,
) -> Result<(), ApiError> {
    if let Some(allow) = allow {
        if !allow.is_match(name) {
            return Err(ApiError::BadRequest(format!(
                "filename {name:?} is not permitted"
            )));
        }
    }
    if let Some(deny) = deny {
        if deny.is_match(name) {
            return Err(ApiError::BadRequest(format!(
                "filename {name:?} is not permitted"
            )));
        }
    }
    Ok(())
}

/// Reduce an uploaded filename to a bare base name. Client-supplied
/// directories never influence where the file lands.
#[must_use]
pub fn sanitize_filename(raw: &str) -> Option<String> {
    let base = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();
    if base.is_empty() || base == "." || base == ".." || base.contains('\0') {
        return None;
    }
    Some(base)
}

/// Pick the final destination under the collision policy.
async fn final_target(
    dir: &Path,
    name: &str,
    policy: CollisionPolicy,
) -> Result<PathBuf, ApiError> {
    let target = dir.join(name);
    if policy == CollisionPolicy::Overwrite || !target.exists() {
        return Ok(target);
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem.to_string(), format!(".{ext}")),
        _ => (name.to_string(), String::new()),
    };
    for n in 1..1000 {
        let candidate = dir.join(format!("{stem}_{n}{ext}"));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(ApiError::BadRequest(format!(
        "too many colliding copies of {name:?}"
    )))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeleteRequest {
    pub p: String,
}

#[utoipa::path(
    post,
    path = "/api/delete",
    request_body = DeleteRequest,
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Missing delete capability or CSRF token")
    ),
    tag = "files",
)]
pub async fn delete(
    State(app): State<App>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Extension(principal): Extension<Principal>,
    headers: HeaderMap,
    Json(request): Json<DeleteRequest>,
) -> Result<StatusCode, ApiError> {
    let (perms, _) = request_perms(&app, &principal).await?;
    require(perms.delete)?;

    let path = safe_join(&app.root, &request.p)?;
    if path == app.root {
        return Err(ApiError::BadRequest(
            "refusing to delete the share root".to_string(),
        ));
    }
    let metadata = tokio::fs::metadata(&path)
        .await
        .map_err(crate::sandbox::SandboxError::Io)?;
    if metadata.is_dir() {
        tokio::fs::remove_dir_all(&path)
            .await
            .map_err(crate::sandbox::SandboxError::Io)?;
    } else {
        tokio::fs::remove_file(&path)
            .await
            .map_err(crate::sandbox::SandboxError::Io)?;
    }

    let actor = (!principal.anonymous).then_some(principal.user_id);
    let ip = client_ip(&headers, addr);
    app.store
        .record_audit(actor, "file.delete", &request.p, &json!({ "ip": ip }).to_string())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RenameRequest {
    pub from: String,
    pub to: String,
}

#[utoipa::path(
    post,
    path = "/api/rename",
    request_body = RenameRequest,
    responses(
        (status = 204, description = "Renamed"),
        (status = 400, description = "Either path escapes the share root"),
        (status = 403, description = "Missing rename capability or CSRF token")
    ),
    tag = "files",
)]
pub async fn rename(
    State(app): State<App>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Extension(principal): Extension<Principal>,
    headers: HeaderMap,
    Json(request): Json<RenameRequest>,
) -> Result<StatusCode, ApiError> {
    let (perms, _) = request_perms(&app, &principal).await?;
    require(perms.rename)?;

    let from = safe_join(&app.root, &request.from)?;
    let to = safe_join(&app.root, &request.to)?;
    if from == app.root || to == app.root {
        return Err(ApiError::BadRequest(
            "refusing to rename the share root".to_string(),
        ));
    }
    tokio::fs::rename(&from, &to)
        .await
        .map_err(crate::sandbox::SandboxError::Io)?;

    let actor = (!principal.anonymous).then_some(principal.user_id);
    let ip = client_ip(&headers, addr);
    app.store
        .record_audit(
            actor,
            "file.rename",
            &request.from,
            &json!({ "to": request.to, "ip": ip }).to_string(),
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filenames_are_reduced_to_base_names() {
        assert_eq!(sanitize_filename("report.pdf").as_deref(), Some("report.pdf"));
        assert_eq!(
            sanitize_filename("../../etc/passwd").as_deref(),
            Some("passwd")
        );
        assert_eq!(
            sanitize_filename("C:\\Users\\x\\notes.txt").as_deref(),
            Some("notes.txt")
        );
        assert!(sanitize_filename("").is_none());
        assert!(sanitize_filename("..").is_none());
        assert!(sanitize_filename("dir/").is_none());
    }

    #[test]
    fn filename_policy_applies_allow_then_deny() {
        let allow = Regex::new(r"\.(png|jpg)$").expect("regex");
        let deny = Regex::new(r"(?i)\.php").expect("regex");
        assert!(check_filename_policy("cat.png", Some(&allow), Some(&deny)).is_ok());
        assert!(check_filename_policy("cat.exe", Some(&allow), Some(&deny)).is_err());
        assert!(check_filename_policy("shell.PHP.png", Some(&allow), Some(&deny)).is_err());
        assert!(check_filename_policy("anything", None, None).is_ok());
    }

    #[tokio::test]
    async fn collisions_rename_with_numeric_suffix() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("notes.txt"), b"x").expect("write");
        std::fs::write(dir.path().join("notes_1.txt"), b"x").expect("write");

        let target = final_target(dir.path(), "notes.txt", CollisionPolicy::Rename)
            .await
            .expect("target");
        assert_eq!(target, dir.path().join("notes_2.txt"));

        let target = final_target(dir.path(), "notes.txt", CollisionPolicy::Overwrite)
            .await
            .expect("target");
        assert_eq!(target, dir.path().join("notes.txt"));

        let target = final_target(dir.path(), "fresh.txt", CollisionPolicy::Rename)
            .await
            .expect("target");
        assert_eq!(target, dir.path().join("fresh.txt"));
    }

    #[tokio::test]
    async fn listing_sorts_directories_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("zeta")).expect("mkdir");
        std::fs::write(dir.path().join("alpha.txt"), b"hi").expect("write");
        std::fs::write(dir.path().join("Beta.txt"), b"hello").expect("write");

        let listing = read_listing(dir.path(), dir.path()).await.expect("listing");
        let names: Vec<&str> = listing.entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha.txt", "Beta.txt"]);
        assert!(listing.entries[0].dir);
        assert_eq!(listing.entries[2].size, 5);
        assert_eq!(listing.path, "");
    }
}
