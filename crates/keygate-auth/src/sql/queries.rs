//! SQL statements for each supported database.
//!
//! Statements are rendered once when a store is created. Timestamps are
//! stored as `VARCHAR(19)` text (see [`crate::time`]) because the `any`
//! driver has no portable temporal type; the fixed-width format sorts the
//! same way as the instants it encodes.

use super::backend::DatabaseType;
use crate::time::TIMESTAMP_LEN;

/// Default session table name.
pub const DEFAULT_SESSION_TABLE: &str = "user_sessions";

/// Default users table name.
pub const DEFAULT_USER_TABLE: &str = "users";

/// Default column type of `user_sessions.user_id`.
///
/// Signed on every database so that [`NO_USER_ID`](crate::NO_USER_ID) can
/// never be stored.
pub const DEFAULT_USER_ID_TYPE: &str = "BIGINT NOT NULL";

/// `n`-th bind placeholder (1-based) for `db`.
fn ph(db: DatabaseType, n: usize) -> String {
    match db {
        DatabaseType::PostgreSQL => format!("${n}"),
        DatabaseType::MySQL | DatabaseType::SQLite => "?".to_string(),
    }
}

/// Statements used by [`SqlSessionStore`](super::SqlSessionStore).
#[derive(Debug, Clone)]
pub struct SessionQueries {
    pub init: String,
    pub get: String,
    pub create: String,
    pub delete_for_user: String,
    pub delete_invalid: String,
    pub delete_key: String,
}

impl SessionQueries {
    pub fn new(db: DatabaseType, table: &str, user_id_type: &str, key_size: usize) -> Self {
        let p = |n| ph(db, n);
        let init = format!(
            "CREATE TABLE IF NOT EXISTS {table} (\n    \
                user_id {user_id_type},\n    \
                session_key VARCHAR({key_size}) NOT NULL,\n    \
                created VARCHAR({TIMESTAMP_LEN}) NOT NULL,\n    \
                valid_until VARCHAR({TIMESTAMP_LEN}) NOT NULL,\n    \
                PRIMARY KEY (session_key)\n\
            )"
        );

        Self {
            init,
            get: format!(
                "SELECT user_id, created, valid_until FROM {table} WHERE session_key = {}",
                p(1)
            ),
            create: format!(
                "INSERT INTO {table} (user_id, session_key, created, valid_until) VALUES ({}, {}, {}, {})",
                p(1),
                p(2),
                p(3),
                p(4)
            ),
            delete_for_user: format!("DELETE FROM {table} WHERE user_id = {}", p(1)),
            // invalid iff valid_until <= now
            delete_invalid: format!("DELETE FROM {table} WHERE valid_until <= {}", p(1)),
            delete_key: format!("DELETE FROM {table} WHERE session_key = {}", p(1)),
        }
    }
}

/// Statements used by [`SqlCredentialStore`](super::SqlCredentialStore).
#[derive(Debug, Clone)]
pub struct UserQueries {
    /// Width of the password column.
    pub pw_length: usize,
    pub init: String,
    pub insert: String,
    pub validate: String,
    pub update_password: String,
    pub touch_login: String,
    pub list: String,
    pub get_name: String,
    pub get_id: String,
    pub get_info: String,
    pub delete: String,
}

impl UserQueries {
    pub fn new(db: DatabaseType, table: &str, pw_length: usize) -> Self {
        let p = |n| ph(db, n);
        let id_column = match db {
            DatabaseType::PostgreSQL => "id BIGSERIAL PRIMARY KEY",
            DatabaseType::MySQL => "id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY",
            // INTEGER PRIMARY KEY aliases the rowid; AUTOINCREMENT stops reuse
            DatabaseType::SQLite => "id INTEGER PRIMARY KEY AUTOINCREMENT",
        };
        let init = format!(
            "CREATE TABLE IF NOT EXISTS {table} (\n    \
                {id_column},\n    \
                username VARCHAR(150) NOT NULL,\n    \
                first_name VARCHAR(30) NOT NULL,\n    \
                last_name VARCHAR(30) NOT NULL,\n    \
                email VARCHAR(254) NOT NULL,\n    \
                password VARCHAR({pw_length}) NOT NULL,\n    \
                is_active INTEGER NOT NULL,\n    \
                last_login VARCHAR({TIMESTAMP_LEN}) NOT NULL,\n    \
                UNIQUE (username)\n\
            )"
        );

        let mut insert = format!(
            "INSERT INTO {table} (username, first_name, last_name, email, password, is_active, last_login) \
             VALUES ({}, {}, {}, {}, {}, {}, {})",
            p(1),
            p(2),
            p(3),
            p(4),
            p(5),
            p(6),
            p(7)
        );
        if db == DatabaseType::PostgreSQL {
            insert.push_str(" RETURNING id");
        }

        Self {
            pw_length,
            init,
            insert,
            validate: format!("SELECT id, password FROM {table} WHERE username = {}", p(1)),
            update_password: format!(
                "UPDATE {table} SET password = {} WHERE username = {}",
                p(1),
                p(2)
            ),
            touch_login: format!(
                "UPDATE {table} SET last_login = {} WHERE id = {}",
                p(1),
                p(2)
            ),
            list: format!("SELECT id, username FROM {table}"),
            get_name: format!("SELECT username FROM {table} WHERE id = {}", p(1)),
            get_id: format!("SELECT id FROM {table} WHERE username = {}", p(1)),
            get_info: format!(
                "SELECT id, first_name, last_name, email, is_active, last_login FROM {table} WHERE username = {}",
                p(1)
            ),
            delete: format!("DELETE FROM {table} WHERE username = {}", p(1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders_per_database() {
        let pg = SessionQueries::new(DatabaseType::PostgreSQL, "s", DEFAULT_USER_ID_TYPE, 64);
        assert!(pg.create.ends_with("VALUES ($1, $2, $3, $4)"));

        let my = SessionQueries::new(DatabaseType::MySQL, "s", DEFAULT_USER_ID_TYPE, 64);
        assert!(my.create.ends_with("VALUES (?, ?, ?, ?)"));
        assert!(my.init.contains("session_key VARCHAR(64)"));
    }

    #[test]
    fn test_delete_invalid_direction() {
        let q = SessionQueries::new(DatabaseType::SQLite, "s", DEFAULT_USER_ID_TYPE, 64);
        assert_eq!(q.delete_invalid, "DELETE FROM s WHERE valid_until <= ?");
    }

    #[test]
    fn test_user_insert_returns_id_on_postgres() {
        let pg = UserQueries::new(DatabaseType::PostgreSQL, DEFAULT_USER_TABLE, 60);
        assert!(pg.insert.ends_with("RETURNING id"));
        assert!(pg.init.contains("password VARCHAR(60)"));

        let lite = UserQueries::new(DatabaseType::SQLite, DEFAULT_USER_TABLE, 60);
        assert!(!lite.insert.contains("RETURNING"));
    }
}
