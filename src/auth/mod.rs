//! Principals and token generation.

use anyhow::{Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod password;

/// Random bytes behind a session token (>= 256 bits of entropy).
pub const SESSION_TOKEN_BYTES: usize = 32;
/// Random bytes behind a CSRF token.
pub const CSRF_TOKEN_BYTES: usize = 24;
/// Random bytes behind a share-link token.
pub const SHARE_TOKEN_BYTES: usize = 18;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
    /// Anonymous requests only; never stored in the user directory.
    Guest,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
            Self::Guest => "guest",
        }
    }
}

/// Resolved identity driving permission decisions for one request.
///
/// Derived fresh each request from the session's bound user id; never
/// persisted.
#[derive(Clone, Debug)]
pub struct Principal {
    pub user_id: i64,
    pub username: String,
    pub role: Role,
    pub anonymous: bool,
}

impl Principal {
    #[must_use]
    pub fn guest() -> Self {
        Self {
            user_id: 0,
            username: "guest".to_string(),
            role: Role::Guest,
            anonymous: true,
        }
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        !self.anonymous && self.role == Role::Admin
    }
}

/// URL-safe random token with `n` bytes of entropy.
/// The raw value is only handed to the client; lookups use it as an opaque key.
pub fn random_token(n: usize) -> Result<String> {
    let mut bytes = vec![0u8; n];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate random token")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_token_is_url_safe() {
        let token = random_token(SESSION_TOKEN_BYTES).expect("token");
        assert!(token.len() >= 43);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn random_tokens_are_unique() {
        let a = random_token(SESSION_TOKEN_BYTES).expect("token");
        let b = random_token(SESSION_TOKEN_BYTES).expect("token");
        assert_ne!(a, b);
    }

    #[test]
    fn guest_principal_is_not_admin() {
        let guest = Principal::guest();
        assert!(guest.anonymous);
        assert!(!guest.is_admin());
        assert_eq!(guest.role.as_str(), "guest");
    }
}
