//! In-memory session and credential stores.
//!
//! Suitable for tests, single-process deployments and development. Nothing
//! survives a restart.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::error::AuthError;
use crate::hash::{BcryptHasher, PasswordHasher};
use crate::time::now_utc;
use crate::traits::{CredentialStore, SessionStore};
use crate::types::{BaseUserInformation, NO_USER_ID, NewUser, SessionKeyData, UserId};

/// Session store backed by a `HashMap`.
///
/// Expired entries stay until [`delete_invalid_keys`](SessionStore::delete_invalid_keys)
/// runs, so the controller's liveness check is what hides them.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, SessionKeyData>>,
}

impl MemorySessionStore {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included.
    #[inline]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

#[cfg(test)]
impl MemorySessionStore {
    /// Store `data` under `key` as-is.
    pub(crate) fn insert_raw(&self, key: &str, data: SessionKeyData) {
        self.sessions.write().insert(key.to_string(), data);
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn init(&self) -> Result<(), AuthError> {
        Ok(())
    }

    async fn create_entry(
        &self,
        user: UserId,
        key: &str,
        valid_for: Duration,
    ) -> Result<SessionKeyData, AuthError> {
        let data = SessionKeyData::starting_now(user, valid_for)?;
        let mut sessions = self.sessions.write();
        if sessions.contains_key(key) {
            return Err(AuthError::DuplicateKey);
        }
        sessions.insert(key.to_string(), data.clone());
        Ok(data)
    }

    async fn get_data(&self, key: &str) -> Result<SessionKeyData, AuthError> {
        self.sessions
            .read()
            .get(key)
            .cloned()
            .ok_or(AuthError::KeyNotFound)
    }

    async fn delete_key(&self, key: &str) -> Result<(), AuthError> {
        self.sessions.write().remove(key);
        Ok(())
    }

    async fn delete_entries_for_user(&self, user: UserId) -> Result<u64, AuthError> {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, data| data.user != user);
        Ok((before - sessions.len()) as u64)
    }

    async fn delete_invalid_keys(&self) -> Result<u64, AuthError> {
        let now = now_utc();
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, data| data.is_valid_at(now));
        Ok((before - sessions.len()) as u64)
    }
}

#[derive(Debug, Clone)]
struct UserRecord {
    id: UserId,
    first_name: String,
    last_name: String,
    email: String,
    password: String,
    is_active: bool,
    last_login: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct UserTable {
    by_name: HashMap<String, UserRecord>,
    names: BTreeMap<UserId, String>,
    next_id: u64,
}

/// Credential store backed by in-process maps.
///
/// IDs start at 1 and are never reused, even after a delete.
#[derive(Debug)]
pub struct MemoryCredentialStore {
    users: RwLock<UserTable>,
    hasher: Arc<dyn PasswordHasher>,
}

impl MemoryCredentialStore {
    /// Create a store using the default bcrypt hasher.
    pub fn new() -> Self {
        Self::with_hasher(Arc::new(BcryptHasher::default()))
    }

    pub fn with_hasher(hasher: Arc<dyn PasswordHasher>) -> Self {
        Self {
            users: RwLock::new(UserTable::default()),
            hasher,
        }
    }
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn init(&self) -> Result<(), AuthError> {
        Ok(())
    }

    async fn insert(&self, user: NewUser<'_>, password: &[u8]) -> Result<UserId, AuthError> {
        let password = self.hasher.generate_hash(password)?;
        let mut table = self.users.write();
        if table.by_name.contains_key(user.username) {
            return Err(AuthError::DuplicateUsername);
        }
        table.next_id += 1;
        let id = UserId(table.next_id);
        table.by_name.insert(
            user.username.to_string(),
            UserRecord {
                id,
                first_name: user.first_name.to_string(),
                last_name: user.last_name.to_string(),
                email: user.email.to_string(),
                password,
                is_active: true,
                last_login: now_utc(),
            },
        );
        table.names.insert(id, user.username.to_string());
        Ok(id)
    }

    async fn validate(&self, username: &str, password: &[u8]) -> Result<UserId, AuthError> {
        let (id, hash) = {
            let table = self.users.read();
            let record = table.by_name.get(username).ok_or(AuthError::UserNotFound)?;
            (record.id, record.password.clone())
        };
        if !self.hasher.check_password(hash.as_bytes(), password)? {
            return Ok(NO_USER_ID);
        }
        match self.users.write().by_name.get_mut(username) {
            Some(record) if record.id == id => {
                record.last_login = now_utc();
                Ok(id)
            }
            // deleted (or replaced) between the read and the update
            _ => Err(AuthError::UserNotFound),
        }
    }

    async fn update_password(&self, username: &str, password: &[u8]) -> Result<(), AuthError> {
        let password = self.hasher.generate_hash(password)?;
        let mut table = self.users.write();
        let record = table
            .by_name
            .get_mut(username)
            .ok_or(AuthError::UserNotFound)?;
        record.password = password;
        Ok(())
    }

    async fn list_users(&self) -> Result<BTreeMap<UserId, String>, AuthError> {
        Ok(self.users.read().names.clone())
    }

    async fn get_user_name(&self, id: UserId) -> Result<String, AuthError> {
        self.users
            .read()
            .names
            .get(&id)
            .cloned()
            .ok_or(AuthError::UserNotFound)
    }

    async fn get_user_id(&self, username: &str) -> Result<UserId, AuthError> {
        self.users
            .read()
            .by_name
            .get(username)
            .map(|r| r.id)
            .ok_or(AuthError::UserNotFound)
    }

    async fn get_user_base_info(&self, username: &str) -> Result<BaseUserInformation, AuthError> {
        let table = self.users.read();
        let record = table.by_name.get(username).ok_or(AuthError::UserNotFound)?;
        Ok(BaseUserInformation {
            id: record.id,
            username: username.to_string(),
            first_name: record.first_name.clone(),
            last_name: record.last_name.clone(),
            email: record.email.clone(),
            last_login: record.last_login,
            is_active: record.is_active,
        })
    }

    async fn delete_user(&self, username: &str) -> Result<(), AuthError> {
        let mut table = self.users.write();
        let record = table
            .by_name
            .remove(username)
            .ok_or(AuthError::UserNotFound)?;
        table.names.remove(&record.id);
        Ok(())
    }
}
