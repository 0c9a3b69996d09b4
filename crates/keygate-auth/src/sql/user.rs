//! Relational credential store.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{AnyPool, Row};
use tracing::debug;

use super::backend::{DatabaseType, DbLock, get_flag, get_int, get_user_id, map_unique};
use super::queries::UserQueries;
use crate::error::AuthError;
use crate::hash::PasswordHasher;
use crate::time::{format_timestamp, now_utc, parse_timestamp};
use crate::traits::CredentialStore;
use crate::types::{BaseUserInformation, NO_USER_ID, NewUser, UserId};

/// [`CredentialStore`] over a SQL `users` table.
pub struct SqlCredentialStore {
    pool: AnyPool,
    db_type: DatabaseType,
    lock: Arc<DbLock>,
    queries: UserQueries,
    hasher: Arc<dyn PasswordHasher>,
}

impl SqlCredentialStore {
    pub(crate) fn new(
        pool: AnyPool,
        db_type: DatabaseType,
        lock: Arc<DbLock>,
        table: &str,
        hasher: Arc<dyn PasswordHasher>,
    ) -> Self {
        let queries = UserQueries::new(db_type, table, hasher.hash_length());
        Self {
            pool,
            db_type,
            lock,
            queries,
            hasher,
        }
    }

    pub fn queries(&self) -> &UserQueries {
        &self.queries
    }
}

#[async_trait]
impl CredentialStore for SqlCredentialStore {
    async fn init(&self) -> Result<(), AuthError> {
        let _guard = self.lock.exclusive().await;
        sqlx::query(&self.queries.init).execute(&self.pool).await?;
        Ok(())
    }

    async fn insert(&self, user: NewUser<'_>, password: &[u8]) -> Result<UserId, AuthError> {
        // hash before taking the lock; bcrypt is slow
        let hash = self.hasher.generate_hash(password)?;
        let now = format_timestamp(now_utc());

        let _guard = self.lock.exclusive().await;
        let query = sqlx::query(&self.queries.insert)
            .bind(user.username)
            .bind(user.first_name)
            .bind(user.last_name)
            .bind(user.email)
            .bind(hash)
            .bind(1_i32)
            .bind(now);

        let id = if self.db_type == DatabaseType::PostgreSQL {
            let row = query
                .fetch_one(&self.pool)
                .await
                .map_err(|e| map_unique(e, AuthError::DuplicateUsername))?;
            get_int(&row, 0)?
        } else {
            query
                .execute(&self.pool)
                .await
                .map_err(|e| map_unique(e, AuthError::DuplicateUsername))?
                .last_insert_id()
                .ok_or_else(|| AuthError::backend("database did not report the inserted id"))?
        };

        let id = UserId::from_i64(id)?;
        debug!(user = %id, username = user.username, "user inserted");
        Ok(id)
    }

    async fn validate(&self, username: &str, password: &[u8]) -> Result<UserId, AuthError> {
        let row = {
            let _guard = self.lock.shared().await;
            sqlx::query(&self.queries.validate)
                .bind(username)
                .fetch_optional(&self.pool)
                .await?
                .ok_or(AuthError::UserNotFound)?
        };
        let id = get_user_id(&row, 0)?;
        let hash: String = row.try_get(1)?;

        if !self.hasher.check_password(hash.as_bytes(), password)? {
            return Ok(NO_USER_ID);
        }

        let _guard = self.lock.exclusive().await;
        let result = sqlx::query(&self.queries.touch_login)
            .bind(format_timestamp(now_utc()))
            .bind(id.as_i64())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            // MySQL reports an unchanged row as unaffected
            let exists = sqlx::query(&self.queries.get_name)
                .bind(id.as_i64())
                .fetch_optional(&self.pool)
                .await?
                .is_some();
            if !exists {
                // deleted between the read and the update
                return Err(AuthError::UserNotFound);
            }
        }
        Ok(id)
    }

    async fn update_password(&self, username: &str, password: &[u8]) -> Result<(), AuthError> {
        let hash = self.hasher.generate_hash(password)?;
        let _guard = self.lock.exclusive().await;
        let result = sqlx::query(&self.queries.update_password)
            .bind(hash)
            .bind(username)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AuthError::UserNotFound);
        }
        Ok(())
    }

    async fn list_users(&self) -> Result<BTreeMap<UserId, String>, AuthError> {
        let rows = {
            let _guard = self.lock.shared().await;
            sqlx::query(&self.queries.list)
                .fetch_all(&self.pool)
                .await?
        };
        rows.iter()
            .map(|row| -> Result<(UserId, String), AuthError> {
                Ok((get_user_id(row, 0)?, row.try_get(1)?))
            })
            .collect()
    }

    async fn get_user_name(&self, id: UserId) -> Result<String, AuthError> {
        let _guard = self.lock.shared().await;
        let row = sqlx::query(&self.queries.get_name)
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        Ok(row.try_get(0)?)
    }

    async fn get_user_id(&self, username: &str) -> Result<UserId, AuthError> {
        let _guard = self.lock.shared().await;
        let row = sqlx::query(&self.queries.get_id)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        get_user_id(&row, 0)
    }

    async fn get_user_base_info(&self, username: &str) -> Result<BaseUserInformation, AuthError> {
        let row = {
            let _guard = self.lock.shared().await;
            sqlx::query(&self.queries.get_info)
                .bind(username)
                .fetch_optional(&self.pool)
                .await?
                .ok_or(AuthError::UserNotFound)?
        };
        let last_login: String = row.try_get(5)?;
        Ok(BaseUserInformation {
            id: get_user_id(&row, 0)?,
            username: username.to_string(),
            first_name: row.try_get(1)?,
            last_name: row.try_get(2)?,
            email: row.try_get(3)?,
            is_active: get_flag(&row, 4)?,
            last_login: parse_timestamp(&last_login)?,
        })
    }

    async fn delete_user(&self, username: &str) -> Result<(), AuthError> {
        let _guard = self.lock.exclusive().await;
        let result = sqlx::query(&self.queries.delete)
            .bind(username)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AuthError::UserNotFound);
        }
        Ok(())
    }
}

impl std::fmt::Debug for SqlCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlCredentialStore")
            .field("db_type", &self.db_type)
            .field("hasher", &self.hasher)
            .finish_non_exhaustive()
    }
}
