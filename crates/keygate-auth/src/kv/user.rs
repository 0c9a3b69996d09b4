//! Key-value credential store.
//!
//! A user is a hash `user:<username>` plus the reverse mapping
//! `userID:<id> -> username`. IDs come from the `nxtUserid` counter and are
//! never reused.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::prefixes::KvPrefixes;
use super::store::KeyValueStore;
use crate::error::AuthError;
use crate::hash::{BcryptHasher, PasswordHasher};
use crate::time::{format_timestamp, now_utc, parse_timestamp};
use crate::traits::CredentialStore;
use crate::types::{BaseUserInformation, NO_USER_ID, NewUser, UserId};

const FIELD_ID: &str = "id";
const FIELD_USERNAME: &str = "username";
const FIELD_FIRST_NAME: &str = "firstName";
const FIELD_LAST_NAME: &str = "lastName";
const FIELD_EMAIL: &str = "email";
const FIELD_PASSWORD: &str = "password";
const FIELD_IS_ACTIVE: &str = "is_active";
const FIELD_LAST_LOGIN: &str = "last_login";

fn parse_flag(value: &str) -> Result<bool, AuthError> {
    match value {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        other => Err(AuthError::corruption(format!(
            "invalid is_active value {other:?}"
        ))),
    }
}

/// [`CredentialStore`] over any [`KeyValueStore`].
pub struct KvCredentialStore<K: ?Sized> {
    kv: Arc<K>,
    prefixes: KvPrefixes,
    hasher: Arc<dyn PasswordHasher>,
}

impl<K> KvCredentialStore<K>
where
    K: KeyValueStore + ?Sized,
{
    /// Create a store using the default bcrypt hasher.
    pub fn new(kv: Arc<K>) -> Self {
        Self::with_hasher(kv, Arc::new(BcryptHasher::default()))
    }

    pub fn with_hasher(kv: Arc<K>, hasher: Arc<dyn PasswordHasher>) -> Self {
        Self {
            kv,
            prefixes: KvPrefixes::default(),
            hasher,
        }
    }

    pub fn prefixes(mut self, prefixes: KvPrefixes) -> Self {
        self.prefixes = prefixes;
        self
    }

    async fn password_hash(&self, username: &str) -> Result<(UserId, String), AuthError> {
        let values = self
            .kv
            .hash_get(
                &self.prefixes.user_key(username),
                &[FIELD_ID, FIELD_PASSWORD],
            )
            .await?;
        match values.as_slice() {
            [Some(id), Some(hash)] => Ok((id.parse::<UserId>()?, hash.clone())),
            [None, _] => Err(AuthError::UserNotFound),
            _ => Err(AuthError::corruption(format!(
                "user {username:?} has no password hash"
            ))),
        }
    }
}

#[async_trait]
impl<K> CredentialStore for KvCredentialStore<K>
where
    K: KeyValueStore + ?Sized,
{
    async fn init(&self) -> Result<(), AuthError> {
        Ok(())
    }

    async fn insert(&self, user: NewUser<'_>, password: &[u8]) -> Result<UserId, AuthError> {
        let hash = self.hasher.generate_hash(password)?;

        let next = self.kv.incr(&self.prefixes.next_id_key).await?;
        let id = u64::try_from(next)
            .map(UserId)
            .map_err(|_| AuthError::corruption(format!("user id counter is negative: {next}")))?;

        // reverse mapping first so a listed user always resolves by id
        let id_key = self.prefixes.user_id_key(id);
        self.kv.set(&id_key, user.username).await?;

        let fields = [
            (FIELD_ID, id.to_string()),
            (FIELD_USERNAME, user.username.to_string()),
            (FIELD_FIRST_NAME, user.first_name.to_string()),
            (FIELD_LAST_NAME, user.last_name.to_string()),
            (FIELD_EMAIL, user.email.to_string()),
            (FIELD_PASSWORD, hash),
            (FIELD_IS_ACTIVE, "1".to_string()),
            (FIELD_LAST_LOGIN, format_timestamp(now_utc())),
        ];
        let created = self
            .kv
            .hash_create(&self.prefixes.user_key(user.username), &fields, None)
            .await?;
        if !created {
            if let Err(e) = self.kv.delete(&[id_key]).await {
                warn!(id = %id, error = %e, "failed to roll back user id mapping");
            }
            return Err(AuthError::DuplicateUsername);
        }

        debug!(id = %id, username = user.username, "user created");
        Ok(id)
    }

    async fn validate(&self, username: &str, password: &[u8]) -> Result<UserId, AuthError> {
        let (id, hash) = self.password_hash(username).await?;
        if !self.hasher.check_password(hash.as_bytes(), password)? {
            return Ok(NO_USER_ID);
        }

        let touched = self
            .kv
            .hash_update(
                &self.prefixes.user_key(username),
                &[(FIELD_LAST_LOGIN, format_timestamp(now_utc()))],
            )
            .await?;
        if !touched {
            // deleted between the read and the update
            return Err(AuthError::UserNotFound);
        }
        Ok(id)
    }

    async fn update_password(&self, username: &str, password: &[u8]) -> Result<(), AuthError> {
        let hash = self.hasher.generate_hash(password)?;
        let updated = self
            .kv
            .hash_update(&self.prefixes.user_key(username), &[(FIELD_PASSWORD, hash)])
            .await?;
        if updated {
            Ok(())
        } else {
            Err(AuthError::UserNotFound)
        }
    }

    async fn list_users(&self) -> Result<BTreeMap<UserId, String>, AuthError> {
        let keys = self.kv.scan_prefix(&self.prefixes.user).await?;
        let mut users: BTreeMap<UserId, String> = BTreeMap::new();
        for key in keys {
            let values = self.kv.hash_get(&key, &[FIELD_ID, FIELD_USERNAME]).await?;
            match values.as_slice() {
                [Some(id), Some(name)] => {
                    users.insert(id.parse::<UserId>()?, name.clone());
                }
                // deleted since the scan
                [None, None] => {}
                _ => {
                    return Err(AuthError::corruption(format!(
                        "incomplete user record {key:?}"
                    )));
                }
            }
        }
        Ok(users)
    }

    async fn get_user_name(&self, id: UserId) -> Result<String, AuthError> {
        self.kv
            .get(&self.prefixes.user_id_key(id))
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    async fn get_user_id(&self, username: &str) -> Result<UserId, AuthError> {
        let values = self
            .kv
            .hash_get(&self.prefixes.user_key(username), &[FIELD_ID])
            .await?;
        match values.into_iter().next().flatten() {
            Some(id) => id.parse::<UserId>(),
            None => Err(AuthError::UserNotFound),
        }
    }

    async fn get_user_base_info(&self, username: &str) -> Result<BaseUserInformation, AuthError> {
        let values = self
            .kv
            .hash_get(
                &self.prefixes.user_key(username),
                &[
                    FIELD_ID,
                    FIELD_FIRST_NAME,
                    FIELD_LAST_NAME,
                    FIELD_EMAIL,
                    FIELD_LAST_LOGIN,
                    FIELD_IS_ACTIVE,
                ],
            )
            .await?;

        match values.as_slice() {
            [
                Some(id),
                Some(first_name),
                Some(last_name),
                Some(email),
                Some(last_login),
                Some(is_active),
            ] => Ok(BaseUserInformation {
                id: id.parse::<UserId>()?,
                username: username.to_string(),
                first_name: first_name.clone(),
                last_name: last_name.clone(),
                email: email.clone(),
                last_login: parse_timestamp(last_login)?,
                is_active: parse_flag(is_active)?,
            }),
            values if values.iter().all(Option::is_none) => Err(AuthError::UserNotFound),
            _ => Err(AuthError::corruption(format!(
                "incomplete user record for {username:?}"
            ))),
        }
    }

    async fn delete_user(&self, username: &str) -> Result<(), AuthError> {
        let id = self.get_user_id(username).await?;
        let removed = self
            .kv
            .delete(&[
                self.prefixes.user_key(username),
                self.prefixes.user_id_key(id),
            ])
            .await?;
        if removed == 0 {
            return Err(AuthError::UserNotFound);
        }
        debug!(id = %id, username, "user deleted");
        Ok(())
    }
}

impl<K: ?Sized> std::fmt::Debug for KvCredentialStore<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvCredentialStore")
            .field("prefixes", &self.prefixes)
            .field("hasher", &self.hasher)
            .finish_non_exhaustive()
    }
}
