//! Key/value settings table, materialized as [`AppSettings`].
//!
//! Settings are re-read fresh on every request so an admin change takes
//! effect immediately without a restart. Unknown or malformed values fall
//! back to the built-in defaults.

use super::types::{AppSettings, CollisionPolicy, GuestMode};
use super::{now_unix, Store, StoreError};

pub const KEY_GUEST_MODE: &str = "guest_mode";
pub const KEY_MAX_UPLOAD_SIZE_MB: &str = "max_upload_size_mb";
pub const KEY_UPLOAD_ALLOW_REGEX: &str = "upload_allow_regex";
pub const KEY_UPLOAD_DENY_REGEX: &str = "upload_deny_regex";
pub const KEY_UPLOAD_SUBDIR: &str = "upload_subdir";
pub const KEY_COLLISION_POLICY: &str = "collision_policy";
pub const KEY_DEFAULT_SHARE_EXPIRY: &str = "default_share_expiry";
pub const KEY_ALLOW_DELETE: &str = "allow_delete";
pub const KEY_ALLOW_RENAME: &str = "allow_rename";
pub const KEY_READ_ONLY: &str = "read_only";
pub const KEY_VIRUS_SCAN_COMMAND: &str = "virus_scan_command";

fn default_pairs() -> Vec<(&'static str, String)> {
    let defaults = AppSettings::default();
    vec![
        (KEY_GUEST_MODE, defaults.guest_mode.as_str().to_string()),
        (KEY_MAX_UPLOAD_SIZE_MB, defaults.max_upload_size_mb.to_string()),
        (KEY_UPLOAD_ALLOW_REGEX, defaults.upload_allow_regex),
        (KEY_UPLOAD_DENY_REGEX, defaults.upload_deny_regex),
        (KEY_UPLOAD_SUBDIR, defaults.upload_subdir),
        (KEY_COLLISION_POLICY, defaults.collision_policy.as_str().to_string()),
        (KEY_DEFAULT_SHARE_EXPIRY, defaults.default_share_expiry),
        (KEY_ALLOW_DELETE, bool_str(defaults.allow_delete)),
        (KEY_ALLOW_RENAME, bool_str(defaults.allow_rename)),
        (KEY_READ_ONLY, bool_str(defaults.read_only)),
        (KEY_VIRUS_SCAN_COMMAND, defaults.virus_scan_command),
    ]
}

fn bool_str(value: bool) -> String {
    if value { "true" } else { "false" }.to_string()
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

impl Store {
    /// Seed any missing settings row with its default. Existing values are
    /// never touched, so this is safe to run on every startup.
    pub(super) async fn ensure_default_settings(&self) -> Result<(), StoreError> {
        let now = now_unix();
        for (key, value) in default_pairs() {
            sqlx::query(
                "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?)
                 ON CONFLICT(key) DO NOTHING",
            )
            .bind(key)
            .bind(value)
            .bind(now)
            .execute(self.pool())
            .await?;
        }
        Ok(())
    }

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
                .bind(key)
                .fetch_optional(self.pool())
                .await?;
        Ok(value)
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET
                 value = excluded.value,
                 updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(now_unix())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Load the full settings map into a typed struct.
    pub async fn app_settings(&self) -> Result<AppSettings, StoreError> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM settings")
                .fetch_all(self.pool())
                .await?;

        let mut settings = AppSettings::default();
        for (key, value) in rows {
            match key.as_str() {
                KEY_GUEST_MODE => {
                    if let Some(mode) = GuestMode::parse(&value) {
                        settings.guest_mode = mode;
                    }
                }
                KEY_MAX_UPLOAD_SIZE_MB => {
                    if let Ok(mb) = value.trim().parse::<i64>() {
                        if mb > 0 {
                            settings.max_upload_size_mb = mb;
                        }
                    }
                }
                KEY_UPLOAD_ALLOW_REGEX => settings.upload_allow_regex = value,
                KEY_UPLOAD_DENY_REGEX => settings.upload_deny_regex = value,
                KEY_UPLOAD_SUBDIR => settings.upload_subdir = value,
                KEY_COLLISION_POLICY => {
                    if let Some(policy) = CollisionPolicy::parse(&value) {
                        settings.collision_policy = policy;
                    }
                }
                KEY_DEFAULT_SHARE_EXPIRY => settings.default_share_expiry = value,
                KEY_ALLOW_DELETE => settings.allow_delete = parse_bool(&value),
                KEY_ALLOW_RENAME => settings.allow_rename = parse_bool(&value),
                KEY_READ_ONLY => settings.read_only = parse_bool(&value),
                KEY_VIRUS_SCAN_COMMAND => settings.virus_scan_command = value,
                _ => {}
            }
        }
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_store_carries_defaults() {
        let store = Store::open_in_memory().await.expect("store");
        let settings = store.app_settings().await.expect("settings");
        assert_eq!(settings.guest_mode, GuestMode::Read);
        assert_eq!(settings.max_upload_size_mb, 1024);
        assert_eq!(settings.collision_policy, CollisionPolicy::Rename);
        assert!(!settings.read_only);
        assert!(!settings.allow_delete);
    }

    #[tokio::test]
    async fn updates_survive_round_trip() {
        let store = Store::open_in_memory().await.expect("store");
        store
            .set_setting(KEY_GUEST_MODE, "off")
            .await
            .expect("set");
        store.set_setting(KEY_READ_ONLY, "true").await.expect("set");
        store
            .set_setting(KEY_MAX_UPLOAD_SIZE_MB, "64")
            .await
            .expect("set");

        let settings = store.app_settings().await.expect("settings");
        assert_eq!(settings.guest_mode, GuestMode::Off);
        assert!(settings.read_only);
        assert_eq!(settings.max_upload_size_mb, 64);
    }

    #[tokio::test]
    async fn malformed_values_fall_back_to_defaults() {
        let store = Store::open_in_memory().await.expect("store");
        store
            .set_setting(KEY_GUEST_MODE, "sideways")
            .await
            .expect("set");
        store
            .set_setting(KEY_MAX_UPLOAD_SIZE_MB, "-3")
            .await
            .expect("set");

        let settings = store.app_settings().await.expect("settings");
        assert_eq!(settings.guest_mode, GuestMode::Read);
        assert_eq!(settings.max_upload_size_mb, 1024);
    }

    #[tokio::test]
    async fn seeding_never_clobbers_existing_values() {
        let store = Store::open_in_memory().await.expect("store");
        store
            .set_setting(KEY_GUEST_MODE, "upload")
            .await
            .expect("set");
        store.ensure_default_settings().await.expect("seed");

        let value = store
            .get_setting(KEY_GUEST_MODE)
            .await
            .expect("get")
            .expect("present");
        assert_eq!(value, "upload");
    }
}
