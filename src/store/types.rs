//! Persisted record shapes.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::Role;

#[derive(Clone, Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub role: Role,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub disabled: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct Session {
    pub token: String,
    pub user_id: Option<i64>,
    pub csrf_token: String,
    pub remember: bool,
    pub ip: String,
    pub user_agent: String,
    pub expires_at: i64,
    pub created_at: i64,
    pub last_seen_at: i64,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ShareMode {
    /// Recursive read-only listing under the link's base path.
    Browse,
    /// Single-resource fetch only, no listing.
    Download,
    /// Write-only into the link's base path.
    Upload,
}

impl ShareMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Browse => "browse",
            Self::Download => "download",
            Self::Upload => "upload",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "browse" => Some(Self::Browse),
            "download" => Some(Self::Download),
            "upload" => Some(Self::Upload),
            _ => None,
        }
    }
}

/// Share links are append-only: after creation only the `revoked` flag and
/// the last-accessed timestamp ever change.
#[derive(Clone, Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct ShareLink {
    pub token: String,
    pub path: String,
    pub mode: ShareMode,
    pub created_by: Option<i64>,
    pub expires_at: i64,
    pub revoked: bool,
    pub created_at: i64,
    pub last_accessed_at: Option<i64>,
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct AuditEntry {
    pub id: i64,
    pub actor_user_id: Option<i64>,
    pub action: String,
    pub target: String,
    pub metadata: String,
    pub created_at: i64,
    pub username: Option<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum GuestMode {
    Off,
    Read,
    Upload,
}

impl GuestMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Read => "read",
            Self::Upload => "upload",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "off" => Some(Self::Off),
            "read" => Some(Self::Read),
            "upload" => Some(Self::Upload),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Suffix colliding filenames with `_N`.
    Rename,
    Overwrite,
}

impl CollisionPolicy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rename => "rename",
            Self::Overwrite => "overwrite",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "rename" => Some(Self::Rename),
            "overwrite" => Some(Self::Overwrite),
            _ => None,
        }
    }
}

/// Global settings, re-read fresh on every request.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct AppSettings {
    pub guest_mode: GuestMode,
    pub max_upload_size_mb: i64,
    pub upload_allow_regex: String,
    pub upload_deny_regex: String,
    pub upload_subdir: String,
    pub collision_policy: CollisionPolicy,
    pub default_share_expiry: String,
    pub allow_delete: bool,
    pub allow_rename: bool,
    pub read_only: bool,
    pub virus_scan_command: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            guest_mode: GuestMode::Read,
            max_upload_size_mb: 1024,
            upload_allow_regex: String::new(),
            upload_deny_regex: String::new(),
            upload_subdir: String::new(),
            collision_policy: CollisionPolicy::Rename,
            default_share_expiry: "24h".to_string(),
            allow_delete: false,
            allow_rename: false,
            read_only: false,
            virus_scan_command: String::new(),
        }
    }
}
