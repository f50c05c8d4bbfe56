use std::path::PathBuf;

use anyhow::Result;
use secrecy::SecretString;

use crate::cli::actions::Action;
use crate::lanshare::Options;
use crate::store::types::GuestMode;

pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let root_dir = matches
        .get_one::<String>("root")
        .map(PathBuf::from)
        .ok_or_else(|| anyhow::anyhow!("missing required argument: --root"))?;

    let base_path = matches
        .get_one::<String>("basepath")
        .map(|s| normalize_base_path(s))
        .unwrap_or_default();

    let opts = Options {
        root_dir,
        data_dir: matches
            .get_one::<String>("data-dir")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".lanshare")),
        port: matches.get_one::<u16>("port").copied().unwrap_or(7331),
        bind: matches
            .get_one::<String>("bind")
            .cloned()
            .unwrap_or_else(|| "0.0.0.0".to_string()),
        base_path,
        external_url: matches.get_one::<String>("host").cloned(),
        auth_enabled: matches
            .get_one::<String>("auth")
            .is_none_or(|mode| mode != "off"),
        guest_mode: matches
            .get_one::<String>("guest-mode")
            .and_then(|mode| GuestMode::parse(mode)),
        read_only: matches.get_flag("readonly"),
        tls: matches.get_flag("https"),
        admin_user: matches.get_one::<String>("admin-user").cloned(),
        admin_password: matches
            .get_one::<String>("admin-password")
            .map(|p| SecretString::from(p.clone())),
    };

    Ok(Action::Server {
        opts: Box::new(opts),
    })
}

/// Base paths always look like `/prefix`, never `/prefix/` or `prefix`.
fn normalize_base_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;

    #[test]
    fn server_action_from_flags() {
        let matches = commands::new().get_matches_from(vec![
            "lanshare",
            "--root",
            "/srv/share",
            "--port",
            "9000",
            "--auth",
            "off",
            "--basepath",
            "files/",
            "--guest-mode",
            "upload",
            "--readonly",
        ]);
        let Action::Server { opts } = handler(&matches).expect("action");
        assert_eq!(opts.root_dir, PathBuf::from("/srv/share"));
        assert_eq!(opts.port, 9000);
        assert!(!opts.auth_enabled);
        assert_eq!(opts.base_path, "/files");
        assert_eq!(opts.guest_mode, Some(GuestMode::Upload));
        assert!(opts.read_only);
        assert!(!opts.tls);
        assert!(opts.admin_user.is_none());
    }

    #[test]
    fn base_paths_are_normalized() {
        assert_eq!(normalize_base_path(""), "");
        assert_eq!(normalize_base_path("/"), "");
        assert_eq!(normalize_base_path("files"), "/files");
        assert_eq!(normalize_base_path("/files/"), "/files");
    }
}
