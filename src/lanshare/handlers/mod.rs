pub mod admin;
pub mod auth;
pub mod files;
pub mod health;
pub mod share;

// common helpers for the handlers

use crate::auth::Principal;
use crate::lanshare::error::ApiError;
use crate::lanshare::permissions::PermissionSet;

/// Gate a read endpoint. Anonymous visitors without browse get a 401 so a
/// client can prompt for login; signed-in users get a plain 403.
pub fn require_browse(principal: &Principal, perms: &PermissionSet) -> Result<(), ApiError> {
    if perms.browse {
        Ok(())
    } else if principal.anonymous {
        Err(ApiError::Unauthorized)
    } else {
        Err(ApiError::Forbidden)
    }
}

pub fn require(allowed: bool) -> Result<(), ApiError> {
    if allowed {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

/// Parse a human expiry like `30m`, `24h` or `7d` (bare numbers are
/// seconds) into a duration in seconds.
pub fn parse_expiry(value: &str) -> Option<i64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let (digits, unit) = match value.char_indices().last()? {
        (i, c) if c.is_ascii_alphabetic() => (&value[..i], Some(c.to_ascii_lowercase())),
        _ => (value, None),
    };
    let amount: i64 = digits.trim().parse().ok()?;
    if amount <= 0 {
        return None;
    }
    let factor = match unit {
        None | Some('s') => 1,
        Some('m') => 60,
        Some('h') => 3600,
        Some('d') => 86_400,
        _ => return None,
    };
    amount.checked_mul(factor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;

    #[test]
    fn expiry_units_parse() {
        assert_eq!(parse_expiry("30m"), Some(1800));
        assert_eq!(parse_expiry("24h"), Some(86_400));
        assert_eq!(parse_expiry("7d"), Some(604_800));
        assert_eq!(parse_expiry("90"), Some(90));
        assert_eq!(parse_expiry("90s"), Some(90));
    }

    #[test]
    fn bad_expiry_is_rejected() {
        assert_eq!(parse_expiry(""), None);
        assert_eq!(parse_expiry("0h"), None);
        assert_eq!(parse_expiry("-4h"), None);
        assert_eq!(parse_expiry("soon"), None);
        assert_eq!(parse_expiry("10w"), None);
    }

    #[test]
    fn browse_gate_distinguishes_anonymous() {
        let denied = PermissionSet::default();
        assert!(matches!(
            require_browse(&Principal::guest(), &denied),
            Err(ApiError::Unauthorized)
        ));
        let user = Principal {
            user_id: 1,
            username: "bob".to_string(),
            role: Role::User,
            anonymous: false,
        };
        assert!(matches!(
            require_browse(&user, &denied),
            Err(ApiError::Forbidden)
        ));
    }
}
