//! Admin surface: settings, user management, link inventory, audit trail.

use axum::extract::{Extension, Query, State};
use axum::http::StatusCode;
use axum::Json;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

use super::parse_expiry;
use crate::auth::{password::hash_password, Principal, Role};
use crate::lanshare::error::ApiError;
use crate::lanshare::permissions;
use crate::lanshare::App;
use crate::store::settings as settings_keys;
use crate::store::types::{AppSettings, AuditEntry, ShareLink, User};

async fn require_admin(app: &App, principal: &Principal) -> Result<(), ApiError> {
    let settings = app.effective_settings().await?;
    let perms = permissions::resolve(principal, app.opts.auth_enabled, &settings);
    if perms.admin {
        Ok(())
    } else if principal.anonymous {
        Err(ApiError::Unauthorized)
    } else {
        Err(ApiError::Forbidden)
    }
}

#[utoipa::path(
    get,
    path = "/api/admin/settings",
    responses(
        (status = 200, description = "Current settings", body = AppSettings),
        (status = 403, description = "Admin capability required")
    ),
    tag = "admin",
)]
pub async fn get_settings(
    State(app): State<App>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<AppSettings>, ApiError> {
    require_admin(&app, &principal).await?;
    Ok(Json(app.effective_settings().await?))
}

#[utoipa::path(
    put,
    path = "/api/admin/settings",
    request_body = AppSettings,
    responses(
        (status = 200, description = "Settings stored", body = AppSettings),
        (status = 400, description = "A value failed validation")
    ),
    tag = "admin",
)]
pub async fn update_settings(
    State(app): State<App>,
    Extension(principal): Extension<Principal>,
    Json(mut next): Json<AppSettings>,
) -> Result<Json<AppSettings>, ApiError> {
    require_admin(&app, &principal).await?;

    if next.default_share_expiry.trim().is_empty() {
        next.default_share_expiry = "24h".to_string();
    }
    if parse_expiry(&next.default_share_expiry).is_none() {
        return Err(ApiError::BadRequest(format!(
            "invalid default share expiry {:?}",
            next.default_share_expiry
        )));
    }
    if next.max_upload_size_mb <= 0 {
        return Err(ApiError::BadRequest(
            "max upload size must be positive".to_string(),
        ));
    }
    for (label, pattern) in [
        ("allow", &next.upload_allow_regex),
        ("deny", &next.upload_deny_regex),
    ] {
        if !pattern.trim().is_empty() && Regex::new(pattern).is_err() {
            return Err(ApiError::BadRequest(format!(
                "invalid upload {label} pattern"
            )));
        }
    }

    let pairs = [
        (settings_keys::KEY_GUEST_MODE, next.guest_mode.as_str().to_string()),
        (
            settings_keys::KEY_MAX_UPLOAD_SIZE_MB,
            next.max_upload_size_mb.to_string(),
        ),
        (
            settings_keys::KEY_UPLOAD_ALLOW_REGEX,
            next.upload_allow_regex.clone(),
        ),
        (
            settings_keys::KEY_UPLOAD_DENY_REGEX,
            next.upload_deny_regex.clone(),
        ),
        (settings_keys::KEY_UPLOAD_SUBDIR, next.upload_subdir.clone()),
        (
            settings_keys::KEY_COLLISION_POLICY,
            next.collision_policy.as_str().to_string(),
        ),
        (
            settings_keys::KEY_DEFAULT_SHARE_EXPIRY,
            next.default_share_expiry.clone(),
        ),
        (
            settings_keys::KEY_ALLOW_DELETE,
            next.allow_delete.to_string(),
        ),
        (
            settings_keys::KEY_ALLOW_RENAME,
            next.allow_rename.to_string(),
        ),
        (settings_keys::KEY_READ_ONLY, next.read_only.to_string()),
        (
            settings_keys::KEY_VIRUS_SCAN_COMMAND,
            next.virus_scan_command.clone(),
        ),
    ];
    for (key, value) in pairs {
        app.store.set_setting(key, &value).await?;
    }
    app.store
        .record_audit(
            (!principal.anonymous).then_some(principal.user_id),
            "admin.settings.update",
            "settings",
            "",
        )
        .await?;

    Ok(Json(app.effective_settings().await?))
}

#[utoipa::path(
    get,
    path = "/api/admin/users",
    responses(
        (status = 200, description = "All accounts", body = [User]),
        (status = 403, description = "Admin capability required")
    ),
    tag = "admin",
)]
pub async fn list_users(
    State(app): State<App>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<User>>, ApiError> {
    require_admin(&app, &principal).await?;
    Ok(Json(app.store.list_users().await?))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/admin/users",
    request_body = CreateUserRequest,
    responses(
        (status = 200, description = "Account created"),
        (status = 400, description = "Invalid username, password or role")
    ),
    tag = "admin",
)]
pub async fn create_user(
    State(app): State<App>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<CreateUserRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_admin(&app, &principal).await?;

    let username = request.username.trim();
    if username.is_empty() {
        return Err(ApiError::BadRequest("username is required".to_string()));
    }
    if app.store.get_user_by_username(username).await?.is_some() {
        return Err(ApiError::BadRequest(format!(
            "user {username:?} already exists"
        )));
    }
    let role = match request.role.as_deref().map(str::trim) {
        None | Some("") | Some("user") => Role::User,
        Some("admin") => Role::Admin,
        Some(other) => {
            return Err(ApiError::BadRequest(format!("invalid role {other:?}")));
        }
    };
    let hash =
        hash_password(&request.password).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let id = app.store.create_user(username, &hash, role).await?;
    app.store
        .record_audit((!principal.anonymous).then_some(principal.user_id), "admin.user.create", username, "")
        .await?;
    Ok(Json(json!({ "id": id, "username": username.to_lowercase() })))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetPasswordRequest {
    pub username: String,
    pub password: String,
}

#[utoipa::path(
    put,
    path = "/api/admin/users/password",
    request_body = SetPasswordRequest,
    responses(
        (status = 204, description = "Password replaced"),
        (status = 404, description = "Unknown account")
    ),
    tag = "admin",
)]
pub async fn set_password(
    State(app): State<App>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<SetPasswordRequest>,
) -> Result<StatusCode, ApiError> {
    require_admin(&app, &principal).await?;

    let hash =
        hash_password(&request.password).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    app.store
        .set_user_password(&request.username, &hash)
        .await?;
    app.store
        .record_audit(
            (!principal.anonymous).then_some(principal.user_id),
            "admin.user.password",
            &request.username,
            "",
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetDisabledRequest {
    pub username: String,
    pub disabled: bool,
}

#[utoipa::path(
    post,
    path = "/api/admin/users/disable",
    request_body = SetDisabledRequest,
    responses(
        (status = 204, description = "Flag updated"),
        (status = 400, description = "Would remove the last active admin")
    ),
    tag = "admin",
)]
pub async fn set_disabled(
    State(app): State<App>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<SetDisabledRequest>,
) -> Result<StatusCode, ApiError> {
    require_admin(&app, &principal).await?;

    app.store
        .set_user_disabled(&request.username, request.disabled)
        .await?;
    app.store
        .record_audit(
            (!principal.anonymous).then_some(principal.user_id),
            "admin.user.disable",
            &request.username,
            &json!({ "disabled": request.disabled }).to_string(),
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeleteUserRequest {
    pub username: String,
}

#[utoipa::path(
    post,
    path = "/api/admin/users/delete",
    request_body = DeleteUserRequest,
    responses(
        (status = 204, description = "Account removed"),
        (status = 400, description = "Would remove the last active admin"),
        (status = 404, description = "Unknown account")
    ),
    tag = "admin",
)]
pub async fn delete_user(
    State(app): State<App>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<DeleteUserRequest>,
) -> Result<StatusCode, ApiError> {
    require_admin(&app, &principal).await?;

    app.store.delete_user(&request.username).await?;
    app.store
        .record_audit(
            (!principal.anonymous).then_some(principal.user_id),
            "admin.user.delete",
            &request.username,
            "",
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/admin/links",
    responses(
        (status = 200, description = "All share links, newest first", body = [ShareLink]),
        (status = 403, description = "Admin capability required")
    ),
    tag = "admin",
)]
pub async fn list_links(
    State(app): State<App>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<ShareLink>>, ApiError> {
    require_admin(&app, &principal).await?;
    Ok(Json(app.store.list_share_links().await?))
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    #[serde(default)]
    pub limit: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/api/admin/audit",
    params(("limit" = Option<i64>, Query, description = "Page size, newest first")),
    responses(
        (status = 200, description = "Audit trail", body = [AuditEntry]),
        (status = 403, description = "Admin capability required")
    ),
    tag = "admin",
)]
pub async fn list_audit(
    State(app): State<App>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditEntry>>, ApiError> {
    require_admin(&app, &principal).await?;
    let limit = query.limit.unwrap_or(100).clamp(1, 1000);
    Ok(Json(app.store.list_audit(limit).await?))
}
