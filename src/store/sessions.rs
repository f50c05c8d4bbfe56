//! Session records: one row per token, replaced atomically on login.

use super::types::Session;
use super::{now_unix, Store, StoreError};

impl Store {
    pub async fn create_session(&self, session: &Session) -> Result<(), StoreError> {
        sqlx::query(
            r"INSERT INTO sessions
                (token, user_id, csrf_token, remember, ip, user_agent, expires_at, created_at, last_seen_at)
              VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&session.token)
        .bind(session.user_id)
        .bind(&session.csrf_token)
        .bind(session.remember)
        .bind(&session.ip)
        .bind(&session.user_agent)
        .bind(session.expires_at)
        .bind(session.created_at)
        .bind(session.last_seen_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Fetch a session by token. Expired rows are deleted lazily and
    /// reported as absent, indistinguishable from an unknown token.
    pub async fn get_session(&self, token: &str) -> Result<Option<Session>, StoreError> {
        let session = sqlx::query_as::<_, Session>(
            r"SELECT token, user_id, csrf_token, remember, ip, user_agent,
                     expires_at, created_at, last_seen_at
              FROM sessions WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(self.pool())
        .await?;

        match session {
            Some(session) if session.expires_at <= now_unix() => {
                self.delete_session(token).await?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// Sliding expiration: push the expiry forward and stamp last-seen.
    pub async fn touch_session(&self, token: &str, expires_at: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE sessions SET expires_at = ?, last_seen_at = ? WHERE token = ?")
            .bind(expires_at)
            .bind(now_unix())
            .bind(token)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Replace `old_token` with a fresh authenticated session in one
    /// transaction, so there is no window in which both tokens resolve.
    pub async fn rotate_session(
        &self,
        old_token: &str,
        new_session: &Session,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool().begin().await?;
        sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(old_token)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            r"INSERT INTO sessions
                (token, user_id, csrf_token, remember, ip, user_agent, expires_at, created_at, last_seen_at)
              VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&new_session.token)
        .bind(new_session.user_id)
        .bind(&new_session.csrf_token)
        .bind(new_session.remember)
        .bind(&new_session.ip)
        .bind(&new_session.user_agent)
        .bind(new_session.expires_at)
        .bind(new_session.created_at)
        .bind(new_session.last_seen_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn delete_session(&self, token: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn purge_expired_sessions(&self) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
            .bind(now_unix())
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
