use clap::{
    builder::{
        styling::{AnsiColor, Effects, Styles},
        ValueParser,
    },
    Arg, ArgAction, ColorChoice, Command,
};

pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            // Successfully parsed as a number
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

pub fn validator_guest_mode() -> ValueParser {
    ValueParser::from(
        move |mode: &str| -> std::result::Result<String, String> {
            match mode.to_lowercase().as_str() {
                "off" | "read" | "upload" => Ok(mode.to_lowercase()),
                _ => Err("guest mode must be one of: off, read, upload".to_string()),
            }
        },
    )
}

pub fn validator_auth_mode() -> ValueParser {
    ValueParser::from(move |mode: &str| -> std::result::Result<String, String> {
        match mode.to_lowercase().as_str() {
            "on" | "off" => Ok(mode.to_lowercase()),
            _ => Err("auth must be on or off".to_string()),
        }
    })
}

pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new("lanshare")
        .about("Share a directory over the LAN")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new("root")
                .short('r')
                .long("root")
                .help("Directory to share")
                .env("LANSHARE_ROOT")
                .required(true),
        )
        .arg(
            Arg::new("data-dir")
                .long("data-dir")
                .help("Directory holding the SQLite database")
                .default_value(".lanshare")
                .env("LANSHARE_DATA_DIR"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port to listen on")
                .default_value("7331")
                .env("LANSHARE_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("bind")
                .long("bind")
                .help("Bind address")
                .default_value("0.0.0.0")
                .env("LANSHARE_BIND"),
        )
        .arg(
            Arg::new("basepath")
                .long("basepath")
                .help("Base URL path when served behind a reverse proxy, e.g. /files")
                .env("LANSHARE_BASEPATH"),
        )
        .arg(
            Arg::new("host")
                .long("host")
                .help("Advertised origin for generated links, e.g. https://share.lan")
                .env("LANSHARE_HOST"),
        )
        .arg(
            Arg::new("auth")
                .long("auth")
                .help("Authentication mode: on or off")
                .default_value("on")
                .env("LANSHARE_AUTH")
                .value_parser(validator_auth_mode()),
        )
        .arg(
            Arg::new("guest-mode")
                .long("guest-mode")
                .help("Override the stored guest mode: off, read or upload")
                .env("LANSHARE_GUEST_MODE")
                .value_parser(validator_guest_mode()),
        )
        .arg(
            Arg::new("readonly")
                .long("readonly")
                .help("Force read-only mode regardless of stored settings")
                .env("LANSHARE_READONLY")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("https")
                .long("https")
                .help("TLS terminates in front of the server; marks cookies Secure")
                .env("LANSHARE_HTTPS")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("admin-user")
                .long("admin-user")
                .help("Bootstrap admin username, created on first start")
                .env("LANSHARE_ADMIN_USER")
                .requires("admin-password"),
        )
        .arg(
            Arg::new("admin-password")
                .long("admin-password")
                .help("Bootstrap admin password")
                .env("LANSHARE_ADMIN_PASSWORD")
                .requires("admin-user"),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("LANSHARE_LOG_LEVEL")
                .global(true)
                .action(ArgAction::Count)
                .value_parser(validator_log_level()),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "lanshare");
        assert_eq!(
            command.get_about().unwrap().to_string(),
            "Share a directory over the LAN"
        );
        assert_eq!(
            command.get_version().unwrap().to_string(),
            env!("CARGO_PKG_VERSION")
        );
    }

    #[test]
    fn test_check_root_and_port() {
        let command = new();
        let matches = command.get_matches_from(vec![
            "lanshare",
            "--root",
            "/srv/share",
            "--port",
            "9000",
            "--guest-mode",
            "upload",
        ]);

        assert_eq!(matches.get_one::<u16>("port").copied(), Some(9000));
        assert_eq!(
            matches.get_one::<String>("root").map(String::as_str),
            Some("/srv/share")
        );
        assert_eq!(
            matches.get_one::<String>("guest-mode").map(String::as_str),
            Some("upload")
        );
        assert_eq!(
            matches.get_one::<String>("bind").map(String::as_str),
            Some("0.0.0.0")
        );
        assert!(!matches.get_flag("readonly"));
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars(
            [
                ("LANSHARE_ROOT", Some("/srv/share")),
                ("LANSHARE_PORT", Some("8443")),
                ("LANSHARE_AUTH", Some("off")),
                ("LANSHARE_READONLY", Some("true")),
                ("LANSHARE_BASEPATH", Some("/files")),
                ("LANSHARE_LOG_LEVEL", Some("info")),
            ],
            || {
                let command = new();
                let matches = command.get_matches_from(vec!["lanshare"]);
                assert_eq!(matches.get_one::<u16>("port").copied(), Some(8443));
                assert_eq!(
                    matches.get_one::<String>("auth").map(String::as_str),
                    Some("off")
                );
                assert_eq!(
                    matches.get_one::<String>("basepath").map(String::as_str),
                    Some("/files")
                );
                assert!(matches.get_flag("readonly"));
                assert_eq!(matches.get_one::<u8>("verbosity").copied(), Some(2));
            },
        );
    }

    #[test]
    fn test_check_log_level_env() {
        // loop cover all possible value_parse
        let levels = vec!["error", "warn", "info", "debug", "trace"];
        for (index, &level) in levels.iter().enumerate() {
            temp_env::with_vars(
                [
                    ("LANSHARE_LOG_LEVEL", Some(level)),
                    ("LANSHARE_ROOT", Some("/srv/share")),
                ],
                || {
                    let command = new();
                    let matches = command.get_matches_from(vec!["lanshare"]);
                    assert_eq!(
                        matches.get_one::<u8>("verbosity").copied(),
                        Some(index as u8)
                    );
                },
            );
        }
    }

    #[test]
    fn test_check_log_level_verbosity() {
        let levels = vec!["error", "warn", "info", "debug", "trace"];
        for (index, _) in levels.iter().enumerate() {
            temp_env::with_vars([("LANSHARE_LOG_LEVEL", None::<String>)], || {
                let mut args = vec![
                    "lanshare".to_string(),
                    "--root".to_string(),
                    "/srv/share".to_string(),
                ];

                // Add the appropriate number of "-v" flags based on the index
                if index > 0 {
                    let v = format!("-{}", "v".repeat(index));
                    args.push(v);
                }

                let command = new();
                let matches = command.get_matches_from(args);

                assert_eq!(
                    matches.get_one::<u8>("verbosity").copied(),
                    Some(index as u8)
                );
            });
        }
    }

    #[test]
    fn test_invalid_guest_mode_is_rejected() {
        let command = new();
        let result = command.try_get_matches_from(vec![
            "lanshare",
            "--root",
            "/srv/share",
            "--guest-mode",
            "sideways",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_admin_user_requires_password() {
        let command = new();
        let result = command.try_get_matches_from(vec![
            "lanshare",
            "--root",
            "/srv/share",
            "--admin-user",
            "root",
        ]);
        assert!(result.is_err());
    }
}
