//! Tokenized share links scoped to a path inside the share root.

use super::types::{ShareLink, ShareMode};
use super::{now_unix, Store, StoreError};

const LINK_COLUMNS: &str =
    "token, path, mode, created_by, expires_at, revoked, created_at, last_accessed_at";

impl Store {
    pub async fn create_share_link(
        &self,
        token: &str,
        path: &str,
        mode: ShareMode,
        created_by: Option<i64>,
        expires_at: i64,
    ) -> Result<ShareLink, StoreError> {
        let now = now_unix();
        sqlx::query(
            r"INSERT INTO share_links (token, path, mode, created_by, expires_at, revoked, created_at)
              VALUES (?, ?, ?, ?, ?, 0, ?)",
        )
        .bind(token)
        .bind(path)
        .bind(mode)
        .bind(created_by)
        .bind(expires_at)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(ShareLink {
            token: token.to_string(),
            path: path.to_string(),
            mode,
            created_by,
            expires_at,
            revoked: false,
            created_at: now,
            last_accessed_at: None,
        })
    }

    pub async fn get_share_link(&self, token: &str) -> Result<ShareLink, StoreError> {
        sqlx::query_as::<_, ShareLink>(&format!(
            "SELECT {LINK_COLUMNS} FROM share_links WHERE token = ?"
        ))
        .bind(token)
        .fetch_optional(self.pool())
        .await?
        .ok_or(StoreError::NotFound)
    }

    /// Resolve a link for anonymous access. Revoked and expired links both
    /// collapse to [`StoreError::LinkGone`] so the response does not reveal
    /// which condition tripped. Accessing a live link stamps
    /// `last_accessed_at` best-effort.
    pub async fn access_share_link(&self, token: &str) -> Result<ShareLink, StoreError> {
        let link = self.get_share_link(token).await?;
        if link.revoked || link.expires_at <= now_unix() {
            return Err(StoreError::LinkGone);
        }
        if let Err(error) = sqlx::query(
            "UPDATE share_links SET last_accessed_at = ? WHERE token = ?",
        )
        .bind(now_unix())
        .bind(token)
        .execute(self.pool())
        .await
        {
            tracing::warn!("failed to stamp share link access: {error}");
        }
        Ok(link)
    }

    pub async fn revoke_share_link(&self, token: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE share_links SET revoked = 1 WHERE token = ?")
            .bind(token)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// All links, newest first, including revoked and expired ones. The
    /// admin view decides how to present dead links.
    pub async fn list_share_links(&self) -> Result<Vec<ShareLink>, StoreError> {
        let links = sqlx::query_as::<_, ShareLink>(&format!(
            "SELECT {LINK_COLUMNS} FROM share_links ORDER BY created_at DESC"
        ))
        .fetch_all(self.pool())
        .await?;
        Ok(links)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{random_token, SHARE_TOKEN_BYTES};

    async fn live_link(store: &Store, ttl: i64) -> ShareLink {
        let token = random_token(SHARE_TOKEN_BYTES).expect("token");
        store
            .create_share_link(&token, "docs", ShareMode::Browse, None, now_unix() + ttl)
            .await
            .expect("create")
    }

    #[tokio::test]
    async fn access_stamps_last_accessed() {
        let store = Store::open_in_memory().await.expect("store");
        let link = live_link(&store, 3600).await;
        assert!(link.last_accessed_at.is_none());

        store.access_share_link(&link.token).await.expect("access");
        let stored = store.get_share_link(&link.token).await.expect("get");
        assert!(stored.last_accessed_at.is_some());
    }

    #[tokio::test]
    async fn revoked_and_expired_links_are_indistinguishable() {
        let store = Store::open_in_memory().await.expect("store");

        let revoked = live_link(&store, 3600).await;
        store
            .revoke_share_link(&revoked.token)
            .await
            .expect("revoke");
        assert!(matches!(
            store.access_share_link(&revoked.token).await,
            Err(StoreError::LinkGone)
        ));

        let expired = live_link(&store, -10).await;
        assert!(matches!(
            store.access_share_link(&expired.token).await,
            Err(StoreError::LinkGone)
        ));
    }

    #[tokio::test]
    async fn unknown_token_is_not_found() {
        let store = Store::open_in_memory().await.expect("store");
        assert!(matches!(
            store.access_share_link("missing").await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn list_returns_newest_first_including_dead_links() {
        let store = Store::open_in_memory().await.expect("store");
        let first = live_link(&store, 3600).await;
        let second = live_link(&store, 3600).await;
        store.revoke_share_link(&first.token).await.expect("revoke");

        let links = store.list_share_links().await.expect("list");
        assert_eq!(links.len(), 2);
        assert!(links.iter().any(|l| l.token == second.token && !l.revoked));
        assert!(links.iter().any(|l| l.token == first.token && l.revoked));
    }
}
