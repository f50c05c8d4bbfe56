//! User directory: lookup, role and disabled-flag management.
//!
//! The last-admin guard lives inside the store transactions so a pair of
//! concurrent admin removals cannot race past the handler-level check.

use super::types::User;
use super::{now_unix, Store, StoreError};
use crate::auth::Role;

fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

const USER_COLUMNS: &str =
    "id, username, password_hash, role, disabled, created_at, updated_at";

impl Store {
    pub async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<i64, StoreError> {
        let now = now_unix();
        let result = sqlx::query(
            r"INSERT INTO users (username, password_hash, role, disabled, created_at, updated_at)
              VALUES (?, ?, ?, 0, ?, ?)",
        )
        .bind(normalize_username(username))
        .bind(password_hash)
        .bind(role)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = ?"
        ))
        .bind(normalize_username(username))
        .fetch_optional(self.pool())
        .await?;
        Ok(user)
    }

    pub async fn get_user_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        let user =
            sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
                .bind(id)
                .fetch_optional(self.pool())
                .await?;
        Ok(user)
    }

    pub async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY username ASC"
        ))
        .fetch_all(self.pool())
        .await?;
        Ok(users)
    }

    pub async fn set_user_password(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = ?, updated_at = ? WHERE username = ?",
        )
        .bind(password_hash)
        .bind(now_unix())
        .bind(normalize_username(username))
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Enable or disable an account. Disabling the last active admin is
    /// refused with [`StoreError::LastAdminProtection`].
    pub async fn set_user_disabled(&self, username: &str, disabled: bool) -> Result<(), StoreError> {
        let username = normalize_username(username);
        let mut tx = self.pool().begin().await?;
        let target = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = ?"
        ))
        .bind(&username)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound)?;

        if disabled && !target.disabled && target.role == Role::Admin {
            let admins = active_admin_count(&mut tx).await?;
            if admins <= 1 {
                return Err(StoreError::LastAdminProtection);
            }
        }

        sqlx::query("UPDATE users SET disabled = ?, updated_at = ? WHERE username = ?")
            .bind(disabled)
            .bind(now_unix())
            .bind(&username)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Delete an account. Removing the last active admin is refused.
    pub async fn delete_user(&self, username: &str) -> Result<(), StoreError> {
        let username = normalize_username(username);
        let mut tx = self.pool().begin().await?;
        let target = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = ?"
        ))
        .bind(&username)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound)?;

        if target.role == Role::Admin && !target.disabled {
            let admins = active_admin_count(&mut tx).await?;
            if admins <= 1 {
                return Err(StoreError::LastAdminProtection);
            }
        }

        sqlx::query("DELETE FROM users WHERE username = ?")
            .bind(&username)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn admin_count(&self) -> Result<i64, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE role = 'admin' AND disabled = 0")
                .fetch_one(self.pool())
                .await?;
        Ok(count)
    }
}

async fn active_admin_count(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
) -> Result<i64, StoreError> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE role = 'admin' AND disabled = 0")
            .fetch_one(&mut **tx)
            .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn usernames_are_normalized() {
        let store = Store::open_in_memory().await.expect("store");
        store
            .create_user("  Alice ", "hash", Role::User)
            .await
            .expect("create");
        let user = store
            .get_user_by_username("ALICE")
            .await
            .expect("get")
            .expect("present");
        assert_eq!(user.username, "alice");
        assert_eq!(user.role, Role::User);
    }

    #[tokio::test]
    async fn last_active_admin_cannot_be_disabled() {
        let store = Store::open_in_memory().await.expect("store");
        store
            .create_user("root", "hash", Role::Admin)
            .await
            .expect("create");

        assert!(matches!(
            store.set_user_disabled("root", true).await,
            Err(StoreError::LastAdminProtection)
        ));
        assert!(matches!(
            store.delete_user("root").await,
            Err(StoreError::LastAdminProtection)
        ));
    }

    #[tokio::test]
    async fn second_admin_unlocks_disable_and_delete() {
        let store = Store::open_in_memory().await.expect("store");
        store
            .create_user("root", "hash", Role::Admin)
            .await
            .expect("create");
        store
            .create_user("backup", "hash", Role::Admin)
            .await
            .expect("create");

        store
            .set_user_disabled("root", true)
            .await
            .expect("disable with two admins");
        // "backup" is now the only active admin again.
        assert!(matches!(
            store.delete_user("backup").await,
            Err(StoreError::LastAdminProtection)
        ));

        store.set_user_disabled("root", false).await.expect("enable");
        store.delete_user("backup").await.expect("delete");
        assert_eq!(store.admin_count().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn disabling_a_regular_user_needs_no_quorum() {
        let store = Store::open_in_memory().await.expect("store");
        store
            .create_user("root", "hash", Role::Admin)
            .await
            .expect("create");
        store
            .create_user("bob", "hash", Role::User)
            .await
            .expect("create");
        store.set_user_disabled("bob", true).await.expect("disable");
        let bob = store
            .get_user_by_username("bob")
            .await
            .expect("get")
            .expect("present");
        assert!(bob.disabled);
    }
}
