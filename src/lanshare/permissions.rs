//! Effective capability computation.
//!
//! `resolve` is a pure function of the request principal and the current
//! settings snapshot. It is called once per request with freshly loaded
//! settings and the result is never cached, so an admin flipping a flag is
//! visible on the very next request.

use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::Principal;
use crate::store::types::{AppSettings, GuestMode};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, ToSchema)]
pub struct PermissionSet {
    pub browse: bool,
    pub upload: bool,
    pub delete: bool,
    pub rename: bool,
    pub share: bool,
    pub admin: bool,
    pub read_only: bool,
}

/// Compute the capability set for one request.
///
/// `auth_enabled` is the server-level switch: with authentication disabled
/// every visitor gets the full capability set. The global read-only flag
/// strips every write capability afterwards, admin included.
#[must_use]
pub fn resolve(principal: &Principal, auth_enabled: bool, settings: &AppSettings) -> PermissionSet {
    let mut set = if !auth_enabled {
        PermissionSet {
            browse: true,
            upload: true,
            delete: true,
            rename: true,
            share: true,
            admin: true,
            read_only: false,
        }
    } else if principal.anonymous {
        match settings.guest_mode {
            GuestMode::Off => PermissionSet::default(),
            GuestMode::Read => PermissionSet {
                browse: true,
                ..PermissionSet::default()
            },
            GuestMode::Upload => PermissionSet {
                browse: true,
                upload: true,
                ..PermissionSet::default()
            },
        }
    } else if principal.is_admin() {
        PermissionSet {
            browse: true,
            upload: true,
            delete: true,
            rename: true,
            share: true,
            admin: true,
            read_only: false,
        }
    } else {
        PermissionSet {
            browse: true,
            upload: true,
            delete: settings.allow_delete,
            rename: settings.allow_rename,
            share: true,
            admin: false,
            read_only: false,
        }
    };

    if settings.read_only {
        set.upload = false;
        set.delete = false;
        set.rename = false;
        set.read_only = true;
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;

    fn user(role: Role) -> Principal {
        Principal {
            user_id: 1,
            username: "alice".to_string(),
            role,
            anonymous: false,
        }
    }

    #[test]
    fn guest_mode_off_denies_everything() {
        let set = resolve(&Principal::guest(), true, &AppSettings::default().with_guest(GuestMode::Off));
        assert_eq!(set, PermissionSet::default());
    }

    #[test]
    fn guest_mode_read_is_browse_only() {
        let set = resolve(&Principal::guest(), true, &AppSettings::default());
        assert!(set.browse);
        assert!(!set.upload && !set.delete && !set.rename && !set.share && !set.admin);
    }

    #[test]
    fn guest_mode_upload_adds_upload_only() {
        let settings = AppSettings::default().with_guest(GuestMode::Upload);
        let set = resolve(&Principal::guest(), true, &settings);
        assert!(set.browse && set.upload);
        assert!(!set.delete && !set.rename && !set.share && !set.admin);
    }

    #[test]
    fn regular_user_writes_follow_the_allow_flags() {
        let mut settings = AppSettings::default();
        let set = resolve(&user(Role::User), true, &settings);
        assert!(set.browse && set.upload && set.share);
        assert!(!set.delete && !set.rename && !set.admin);

        settings.allow_delete = true;
        settings.allow_rename = true;
        let set = resolve(&user(Role::User), true, &settings);
        assert!(set.delete && set.rename);
        assert!(!set.admin);
    }

    #[test]
    fn admin_gets_everything() {
        let set = resolve(&user(Role::Admin), true, &AppSettings::default());
        assert!(set.browse && set.upload && set.delete && set.rename && set.share && set.admin);
    }

    #[test]
    fn auth_disabled_grants_the_full_set() {
        let set = resolve(&Principal::guest(), false, &AppSettings::default());
        assert!(set.browse && set.upload && set.delete && set.rename && set.share && set.admin);
    }

    #[test]
    fn read_only_overrides_every_role() {
        let mut settings = AppSettings::default();
        settings.read_only = true;

        // Admin keeps admin but loses writes.
        let set = resolve(&user(Role::Admin), true, &settings);
        assert!(set.browse && set.share && set.admin && set.read_only);
        assert!(!set.upload && !set.delete && !set.rename);

        // Guest upload mode is also forced off.
        let settings = settings.with_guest(GuestMode::Upload);
        let set = resolve(&Principal::guest(), true, &settings);
        assert!(set.browse && !set.upload);

        // Even with authentication disabled.
        let set = resolve(&Principal::guest(), false, &settings);
        assert!(set.admin && !set.upload && !set.delete && !set.rename);
    }

    impl AppSettings {
        fn with_guest(mut self, mode: GuestMode) -> Self {
            self.guest_mode = mode;
            self
        }
    }
}
