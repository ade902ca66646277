//! Users, per-owner settings and Stripe credentials.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::{info, instrument};

use barback_core::{StripeAccount, User};

use super::SqliteStore;
use crate::error::{DbError, DbResult};
use crate::store::{SettingsStore, StripeKeyStore, UserStore};

const USER_COLUMNS: &str = "id, username, password_hash, totp_secret, totp_enabled, created_at";

#[async_trait]
impl UserStore for SqliteStore {
    #[instrument(skip(self, user), fields(username = %user.username))]
    async fn create_user(&self, user: &User) -> DbResult<()> {
        let result = sqlx::query(
            "INSERT INTO users (id, username, password_hash, totp_secret, totp_enabled, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.totp_secret)
        .bind(user.totp_enabled)
        .bind(user.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                info!("User created");
                Ok(())
            }
            // report the username rather than the column sqlite names
            Err(e) => match DbError::from(e) {
                DbError::UniqueViolation { .. } => Err(DbError::duplicate("username", &user.username)),
                other => Err(other),
            },
        }
    }

    async fn find_user_by_username(&self, username: &str) -> DbResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1 COLLATE NOCASE");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(username.trim())
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn get_user(&self, id: &str) -> DbResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    #[instrument(skip(self, secret))]
    async fn set_totp(&self, user_id: &str, secret: Option<&str>, enabled: bool) -> DbResult<()> {
        let result = sqlx::query("UPDATE users SET totp_secret = ?1, totp_enabled = ?2 WHERE id = ?3")
            .bind(secret)
            .bind(enabled)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("User", user_id));
        }
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for SqliteStore {
    async fn get_settings(&self, owner_id: &str) -> DbResult<BTreeMap<String, String>> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM settings WHERE owner_id = ?1")
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().collect())
    }

    #[instrument(skip(self, pairs), fields(keys = pairs.len()))]
    async fn put_settings(&self, owner_id: &str, pairs: &BTreeMap<String, String>) -> DbResult<()> {
        let mut tx = self.begin_write().await?;
        for (key, value) in pairs {
            sqlx::query(
                "INSERT INTO settings (owner_id, key, value) VALUES (?1, ?2, ?3) \
                 ON CONFLICT (owner_id, key) DO UPDATE SET value = excluded.value",
            )
            .bind(owner_id)
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl StripeKeyStore for SqliteStore {
    async fn get_stripe_account(&self, owner_id: &str) -> DbResult<Option<StripeAccount>> {
        let account = sqlx::query_as::<_, StripeAccount>(
            "SELECT owner_id, secret_key, location_id, updated_at FROM stripe_accounts WHERE owner_id = ?1",
        )
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(account)
    }

    #[instrument(skip(self, account), fields(owner_id = %account.owner_id))]
    async fn put_stripe_account(&self, account: &StripeAccount) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO stripe_accounts (owner_id, secret_key, location_id, updated_at) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT (owner_id) DO UPDATE SET \
                 secret_key = excluded.secret_key, \
                 location_id = excluded.location_id, \
                 updated_at = excluded.updated_at",
        )
        .bind(&account.owner_id)
        .bind(&account.secret_key)
        .bind(&account.location_id)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
