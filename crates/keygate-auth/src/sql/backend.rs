//! Connection pool, database detection and the single-writer lock.

use std::sync::Arc;

use sqlx::AnyPool;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::Row;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use super::config::SqlStoreConfig;
use super::session::SqlSessionStore;
use super::user::SqlCredentialStore;
use crate::error::AuthError;
use crate::hash::PasswordHasher;
use crate::types::UserId;

/// Database type enum for query selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseType {
    /// PostgreSQL database.
    PostgreSQL,
    /// MySQL/MariaDB database.
    MySQL,
    /// SQLite database.
    SQLite,
}

impl DatabaseType {
    /// Detect database type from URL.
    pub fn from_url(url: &str) -> Option<Self> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Some(Self::PostgreSQL)
        } else if url.starts_with("mysql://") || url.starts_with("mariadb://") {
            Some(Self::MySQL)
        } else if url.starts_with("sqlite:") {
            Some(Self::SQLite)
        } else {
            None
        }
    }
}

/// Optional reader/writer lock held for the duration of each call.
///
/// Used for databases that do not tolerate concurrent writers (SQLite).
/// When disabled every acquire returns `None` immediately.
#[derive(Debug)]
pub(crate) struct DbLock {
    enabled: bool,
    lock: RwLock<()>,
}

impl DbLock {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            enabled,
            lock: RwLock::new(()),
        }
    }

    /// Guard for read-only statements.
    pub(crate) async fn shared(&self) -> Option<RwLockReadGuard<'_, ()>> {
        if self.enabled {
            Some(self.lock.read().await)
        } else {
            None
        }
    }

    /// Guard for mutating statements.
    pub(crate) async fn exclusive(&self) -> Option<RwLockWriteGuard<'_, ()>> {
        if self.enabled {
            Some(self.lock.write().await)
        } else {
            None
        }
    }
}

/// Shared connection to one database.
///
/// Session and credential stores created from the same backend share its
/// pool and lock.
///
/// # Example
///
/// ```ignore
/// use keygate_auth::sql::{SqlBackend, SqlStoreConfig};
///
/// let backend = SqlBackend::connect(SqlStoreConfig::new("sqlite:keygate.db")).await?;
/// let sessions = backend.session_store();
/// sessions.init().await?;
/// ```
#[derive(Clone)]
pub struct SqlBackend {
    pool: AnyPool,
    db_type: DatabaseType,
    lock: Arc<DbLock>,
    config: SqlStoreConfig,
}

impl SqlBackend {
    /// Connect to the database described by `config`.
    pub async fn connect(config: SqlStoreConfig) -> Result<Self, AuthError> {
        // Install database drivers for the "any" pool
        sqlx::any::install_default_drivers();

        let db_type = DatabaseType::from_url(&config.database_url)
            .ok_or_else(|| AuthError::Config("unsupported database URL scheme".into()))?;
        check_identifier(&config.session_table)?;
        check_identifier(&config.user_table)?;

        let pool = AnyPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .max_lifetime(config.max_lifetime)
            .idle_timeout(config.idle_timeout)
            .connect(&config.database_url)
            .await?;

        let lock_db = config
            .lock_db
            .unwrap_or(db_type == DatabaseType::SQLite);
        debug!(?db_type, lock_db, "connected to database");

        Ok(Self {
            pool,
            db_type,
            lock: Arc::new(DbLock::new(lock_db)),
            config,
        })
    }

    /// Session store over this connection.
    pub fn session_store(&self) -> SqlSessionStore {
        SqlSessionStore::new(
            self.pool.clone(),
            self.db_type,
            self.lock.clone(),
            &self.config,
        )
    }

    /// Credential store over this connection.
    pub fn credential_store(&self, hasher: Arc<dyn PasswordHasher>) -> SqlCredentialStore {
        SqlCredentialStore::new(
            self.pool.clone(),
            self.db_type,
            self.lock.clone(),
            &self.config.user_table,
            hasher,
        )
    }

    /// Get the connection pool (for advanced usage).
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Get database type.
    pub fn database_type(&self) -> DatabaseType {
        self.db_type
    }
}

// Debug implementation (don't leak credentials)
impl std::fmt::Debug for SqlBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlBackend")
            .field("db_type", &self.db_type)
            .field("max_connections", &self.config.max_connections)
            .field("session_table", &self.config.session_table)
            .field("user_table", &self.config.user_table)
            .finish_non_exhaustive()
    }
}

/// Table names are spliced into statements, so only plain identifiers pass.
fn check_identifier(name: &str) -> Result<(), AuthError> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(AuthError::Config(format!("invalid table name {name:?}")))
    }
}

/// Read an integer column whatever width the driver reports.
pub(crate) fn get_int(row: &AnyRow, idx: usize) -> Result<i64, AuthError> {
    row.try_get::<i64, _>(idx)
        .or_else(|_| row.try_get::<i32, _>(idx).map(i64::from))
        .map_err(AuthError::from)
}

/// Read a user ID column.
pub(crate) fn get_user_id(row: &AnyRow, idx: usize) -> Result<UserId, AuthError> {
    UserId::from_i64(get_int(row, idx)?)
}

/// Read a boolean flag; SQLite and MySQL store booleans as integers.
pub(crate) fn get_flag(row: &AnyRow, idx: usize) -> Result<bool, AuthError> {
    row.try_get::<bool, _>(idx)
        .or_else(|_| get_int(row, idx).map(|v| v != 0))
}

/// Map a unique-constraint violation to `duplicate`, anything else through `From`.
pub(crate) fn map_unique(err: sqlx::Error, duplicate: AuthError) -> AuthError {
    match err {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => duplicate,
        other => other.into(),
    }
}
