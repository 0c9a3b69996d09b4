//! Relational session store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::{AnyPool, Row};

use super::backend::{DatabaseType, DbLock, get_user_id, map_unique};
use super::config::SqlStoreConfig;
use super::queries::SessionQueries;
use crate::error::AuthError;
use crate::time::{format_timestamp, now_utc, parse_timestamp};
use crate::traits::SessionStore;
use crate::types::{SessionKeyData, UserId};

/// [`SessionStore`] over a SQL table.
///
/// Uniqueness of keys comes from the primary key, expiry from
/// [`delete_invalid_keys`](SessionStore::delete_invalid_keys).
pub struct SqlSessionStore {
    pool: AnyPool,
    db_type: DatabaseType,
    lock: Arc<DbLock>,
    queries: SessionQueries,
}

impl SqlSessionStore {
    pub(crate) fn new(
        pool: AnyPool,
        db_type: DatabaseType,
        lock: Arc<DbLock>,
        config: &SqlStoreConfig,
    ) -> Self {
        let queries = SessionQueries::new(
            db_type,
            &config.session_table,
            &config.user_id_type,
            config.key_size,
        );
        Self {
            pool,
            db_type,
            lock,
            queries,
        }
    }

    /// Rendered statements, mainly for inspection.
    pub fn queries(&self) -> &SessionQueries {
        &self.queries
    }
}

#[async_trait]
impl SessionStore for SqlSessionStore {
    async fn init(&self) -> Result<(), AuthError> {
        let _guard = self.lock.exclusive().await;
        sqlx::query(&self.queries.init).execute(&self.pool).await?;
        Ok(())
    }

    async fn create_entry(
        &self,
        user: UserId,
        key: &str,
        valid_for: Duration,
    ) -> Result<SessionKeyData, AuthError> {
        let data = SessionKeyData::starting_now(user, valid_for)?;
        let _guard = self.lock.exclusive().await;
        sqlx::query(&self.queries.create)
            .bind(user.as_i64())
            .bind(key)
            .bind(format_timestamp(data.creation_time))
            .bind(format_timestamp(data.valid_until))
            .execute(&self.pool)
            .await
            .map_err(|e| map_unique(e, AuthError::DuplicateKey))?;
        Ok(data)
    }

    async fn get_data(&self, key: &str) -> Result<SessionKeyData, AuthError> {
        let row = {
            let _guard = self.lock.shared().await;
            sqlx::query(&self.queries.get)
                .bind(key)
                .fetch_optional(&self.pool)
                .await?
                .ok_or(AuthError::KeyNotFound)?
        };

        let created: String = row.try_get(1)?;
        let valid_until: String = row.try_get(2)?;
        Ok(SessionKeyData {
            user: get_user_id(&row, 0)?,
            creation_time: parse_timestamp(&created)?,
            valid_until: parse_timestamp(&valid_until)?,
        })
    }

    async fn delete_key(&self, key: &str) -> Result<(), AuthError> {
        let _guard = self.lock.exclusive().await;
        sqlx::query(&self.queries.delete_key)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_entries_for_user(&self, user: UserId) -> Result<u64, AuthError> {
        let _guard = self.lock.exclusive().await;
        let result = sqlx::query(&self.queries.delete_for_user)
            .bind(user.as_i64())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_invalid_keys(&self) -> Result<u64, AuthError> {
        let now = format_timestamp(now_utc());
        let _guard = self.lock.exclusive().await;
        let result = sqlx::query(&self.queries.delete_invalid)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

impl std::fmt::Debug for SqlSessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlSessionStore")
            .field("db_type", &self.db_type)
            .finish_non_exhaustive()
    }
}
