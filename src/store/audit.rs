//! Append-only audit ledger for security-relevant actions.

use super::types::AuditEntry;
use super::{now_unix, Store, StoreError};

impl Store {
    pub async fn record_audit(
        &self,
        actor_user_id: Option<i64>,
        action: &str,
        target: &str,
        metadata: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r"INSERT INTO audit_logs (actor_user_id, action, target, metadata, created_at)
              VALUES (?, ?, ?, ?, ?)",
        )
        .bind(actor_user_id)
        .bind(action)
        .bind(target)
        .bind(metadata)
        .bind(now_unix())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Newest entries first, with the actor's username joined in where the
    /// account still exists.
    pub async fn list_audit(&self, limit: i64) -> Result<Vec<AuditEntry>, StoreError> {
        let entries = sqlx::query_as::<_, AuditEntry>(
            r"SELECT a.id, a.actor_user_id, a.action, a.target, a.metadata,
                     a.created_at, u.username AS username
              FROM audit_logs a
              LEFT JOIN users u ON u.id = a.actor_user_id
              ORDER BY a.id DESC
              LIMIT ?",
        )
        .bind(limit.max(1))
        .fetch_all(self.pool())
        .await?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;

    #[tokio::test]
    async fn entries_come_back_newest_first_with_usernames() {
        let store = Store::open_in_memory().await.expect("store");
        let admin = store
            .create_user("root", "hash", Role::Admin)
            .await
            .expect("user");

        store
            .record_audit(Some(admin), "login", "root", "")
            .await
            .expect("record");
        store
            .record_audit(None, "share_access", "docs", r#"{"mode":"browse"}"#)
            .await
            .expect("record");

        let entries = store.list_audit(50).await.expect("list");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, "share_access");
        assert!(entries[0].username.is_none());
        assert_eq!(entries[1].username.as_deref(), Some("root"));
    }

    #[tokio::test]
    async fn limit_caps_the_page() {
        let store = Store::open_in_memory().await.expect("store");
        for i in 0..10 {
            store
                .record_audit(None, "upload", &format!("file-{i}"), "")
                .await
                .expect("record");
        }
        let entries = store.list_audit(3).await.expect("list");
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].target, "file-9");
    }
}
