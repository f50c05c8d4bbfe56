//! Login throttling keyed by client network identity + normalized username.
//!
//! The composite key means a shared address throttles unrelated identities
//! trying the same username together; that trade-off is deliberate and
//! documented in DESIGN.md.

use super::{now_unix, Store, StoreError};

/// Failures below this count never lock.
const LOCK_THRESHOLD: i64 = 5;
/// Exponent cap: the backoff tops out at 2^5 = 32 minutes.
const MAX_LOCK_EXPONENT: u32 = 5;

/// Build the composite throttle key.
#[must_use]
pub fn throttle_key(client_ip: &str, username: &str) -> String {
    format!("{client_ip}|{}", username.trim().to_lowercase())
}

impl Store {
    /// Returns the remaining lockout in seconds, or `None` when the key
    /// may attempt a login.
    pub async fn check_login_allowed(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let locked_until: Option<Option<i64>> =
            sqlx::query_scalar("SELECT locked_until FROM login_attempts WHERE key = ?")
                .bind(key)
                .fetch_optional(self.pool())
                .await?;
        let Some(Some(locked_until)) = locked_until else {
            return Ok(None);
        };
        let remaining = locked_until - now_unix();
        if remaining > 0 {
            Ok(Some(remaining))
        } else {
            Ok(None)
        }
    }

    /// Record one failed login and return the lock duration in seconds
    /// (zero below the threshold). Read, increment and lock computation run
    /// in one transaction so concurrent failures cannot lose updates.
    pub async fn register_failed_login(&self, key: &str) -> Result<i64, StoreError> {
        let mut tx = self.pool().begin().await?;
        let failed: i64 =
            sqlx::query_scalar("SELECT failed_count FROM login_attempts WHERE key = ?")
                .bind(key)
                .fetch_optional(&mut *tx)
                .await?
                .unwrap_or(0);
        let failed = failed + 1;

        let lock_seconds = if failed >= LOCK_THRESHOLD {
            let exponent =
                u32::try_from(failed - LOCK_THRESHOLD).unwrap_or(MAX_LOCK_EXPONENT).min(MAX_LOCK_EXPONENT);
            60 * (1i64 << exponent)
        } else {
            0
        };
        let now = now_unix();
        let locked_until = (lock_seconds > 0).then(|| now + lock_seconds);

        sqlx::query(
            r"INSERT INTO login_attempts (key, failed_count, locked_until, updated_at)
              VALUES (?, ?, ?, ?)
              ON CONFLICT(key) DO UPDATE SET
                  failed_count = excluded.failed_count,
                  locked_until = excluded.locked_until,
                  updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(failed)
        .bind(locked_until)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(lock_seconds)
    }

    /// Successful authentication deletes the record entirely.
    pub async fn reset_login_attempts(&self, key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM login_attempts WHERE key = ?")
            .bind(key)
            .execute(self.pool())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_combines_address_and_normalized_username() {
        assert_eq!(throttle_key("10.0.0.9", "  Alice "), "10.0.0.9|alice");
    }

    #[tokio::test]
    async fn backoff_schedule_is_capped_exponential() {
        let store = Store::open_in_memory().await.expect("store");
        let key = throttle_key("10.0.0.9", "alice");

        for _ in 0..4 {
            let lock = store.register_failed_login(&key).await.expect("failure");
            assert_eq!(lock, 0);
            assert!(store
                .check_login_allowed(&key)
                .await
                .expect("check")
                .is_none());
        }

        // Failure 5 locks for 1 minute, 6 for 2, doubling up to 32.
        let expected = [60, 120, 240, 480, 960, 1920, 1920];
        for minutes in expected {
            let lock = store.register_failed_login(&key).await.expect("failure");
            assert_eq!(lock, minutes);
            let remaining = store
                .check_login_allowed(&key)
                .await
                .expect("check")
                .expect("locked");
            assert!(remaining > 0 && remaining <= minutes);
        }
    }

    #[tokio::test]
    async fn success_resets_counter_and_lock() {
        let store = Store::open_in_memory().await.expect("store");
        let key = throttle_key("10.0.0.9", "alice");

        for _ in 0..5 {
            store.register_failed_login(&key).await.expect("failure");
        }
        assert!(store
            .check_login_allowed(&key)
            .await
            .expect("check")
            .is_some());

        store.reset_login_attempts(&key).await.expect("reset");
        assert!(store
            .check_login_allowed(&key)
            .await
            .expect("check")
            .is_none());
        // The counter restarts from zero, so the next failure does not lock.
        let lock = store.register_failed_login(&key).await.expect("failure");
        assert_eq!(lock, 0);
    }

    #[tokio::test]
    async fn unknown_key_is_allowed() {
        let store = Store::open_in_memory().await.expect("store");
        assert!(store
            .check_login_allowed("10.0.0.1|nobody")
            .await
            .expect("check")
            .is_none());
    }
}
