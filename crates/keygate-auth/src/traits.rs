//! Storage capability traits.
//!
//! [`SessionStore`] and [`CredentialStore`] are implemented once per backend
//! family (relational, key-value, in-memory). Contracts are identical across
//! implementations; tests in each backend module check them.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::AuthError;
use crate::types::{BaseUserInformation, NewUser, SessionKeyData, UserId};

/// Durable session-key records with expiry.
///
/// Implementations must be thread-safe (`Send + Sync`); they are shared
/// between request handlers and background cleanup.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create underlying structures if absent. Idempotent.
    async fn init(&self) -> Result<(), AuthError>;

    /// Record a new session for `user` that stays valid for `valid_for`.
    ///
    /// # Errors
    /// [`AuthError::DuplicateKey`] if `key` is already stored.
    async fn create_entry(
        &self,
        user: UserId,
        key: &str,
        valid_for: Duration,
    ) -> Result<SessionKeyData, AuthError>;

    /// Fetch the record for `key`.
    ///
    /// Does not check `valid_until`; callers decide liveness.
    ///
    /// # Errors
    /// [`AuthError::KeyNotFound`] if absent.
    async fn get_data(&self, key: &str) -> Result<SessionKeyData, AuthError>;

    /// Delete one session. Deleting an absent key is not an error.
    async fn delete_key(&self, key: &str) -> Result<(), AuthError>;

    /// Delete every session of `user`, returning how many were removed.
    async fn delete_entries_for_user(&self, user: UserId) -> Result<u64, AuthError>;

    /// Delete every session whose `valid_until` has passed.
    ///
    /// Backends with native expiry may return `Ok(0)`.
    async fn delete_invalid_keys(&self) -> Result<u64, AuthError>;
}

/// Durable user records and password verification.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Create underlying structures if absent. Idempotent.
    async fn init(&self) -> Result<(), AuthError>;

    /// Store a new user, hashing `password` before any write.
    ///
    /// # Errors
    /// [`AuthError::DuplicateUsername`] if the username is taken.
    async fn insert(&self, user: NewUser<'_>, password: &[u8]) -> Result<UserId, AuthError>;

    /// Check a password.
    ///
    /// Returns the user's ID on success and [`NO_USER_ID`](crate::NO_USER_ID)
    /// with no error on mismatch.
    ///
    /// # Errors
    /// [`AuthError::UserNotFound`] if the username does not exist.
    async fn validate(&self, username: &str, password: &[u8]) -> Result<UserId, AuthError>;

    /// Replace the stored password hash.
    async fn update_password(&self, username: &str, password: &[u8]) -> Result<(), AuthError>;

    /// All users as `id -> username`. Empty when there are none.
    async fn list_users(&self) -> Result<BTreeMap<UserId, String>, AuthError>;

    async fn get_user_name(&self, id: UserId) -> Result<String, AuthError>;

    async fn get_user_id(&self, username: &str) -> Result<UserId, AuthError>;

    async fn get_user_base_info(&self, username: &str) -> Result<BaseUserInformation, AuthError>;

    async fn delete_user(&self, username: &str) -> Result<(), AuthError>;
}

macro_rules! forward_session_store {
    ($ty:ty) => {
        #[async_trait]
        impl<S: SessionStore + ?Sized> SessionStore for $ty {
            #[inline]
            async fn init(&self) -> Result<(), AuthError> {
                (**self).init().await
            }

            #[inline]
            async fn create_entry(
                &self,
                user: UserId,
                key: &str,
                valid_for: Duration,
            ) -> Result<SessionKeyData, AuthError> {
                (**self).create_entry(user, key, valid_for).await
            }

            #[inline]
            async fn get_data(&self, key: &str) -> Result<SessionKeyData, AuthError> {
                (**self).get_data(key).await
            }

            #[inline]
            async fn delete_key(&self, key: &str) -> Result<(), AuthError> {
                (**self).delete_key(key).await
            }

            #[inline]
            async fn delete_entries_for_user(&self, user: UserId) -> Result<u64, AuthError> {
                (**self).delete_entries_for_user(user).await
            }

            #[inline]
            async fn delete_invalid_keys(&self) -> Result<u64, AuthError> {
                (**self).delete_invalid_keys().await
            }
        }
    };
}

macro_rules! forward_credential_store {
    ($ty:ty) => {
        #[async_trait]
        impl<C: CredentialStore + ?Sized> CredentialStore for $ty {
            #[inline]
            async fn init(&self) -> Result<(), AuthError> {
                (**self).init().await
            }

            #[inline]
            async fn insert(&self, user: NewUser<'_>, password: &[u8]) -> Result<UserId, AuthError> {
                (**self).insert(user, password).await
            }

            #[inline]
            async fn validate(&self, username: &str, password: &[u8]) -> Result<UserId, AuthError> {
                (**self).validate(username, password).await
            }

            #[inline]
            async fn update_password(&self, username: &str, password: &[u8]) -> Result<(), AuthError> {
                (**self).update_password(username, password).await
            }

            #[inline]
            async fn list_users(&self) -> Result<BTreeMap<UserId, String>, AuthError> {
                (**self).list_users().await
            }

            #[inline]
            async fn get_user_name(&self, id: UserId) -> Result<String, AuthError> {
                (**self).get_user_name(id).await
            }

            #[inline]
            async fn get_user_id(&self, username: &str) -> Result<UserId, AuthError> {
                (**self).get_user_id(username).await
            }

            #[inline]
            async fn get_user_base_info(
                &self,
                username: &str,
            ) -> Result<BaseUserInformation, AuthError> {
                (**self).get_user_base_info(username).await
            }

            #[inline]
            async fn delete_user(&self, username: &str) -> Result<(), AuthError> {
                (**self).delete_user(username).await
            }
        }
    };
}

// Blanket impls so `Arc<dyn SessionStore>` etc. can be passed where
// `impl SessionStore` is expected.
forward_session_store!(Arc<S>);
forward_session_store!(Box<S>);
forward_credential_store!(Arc<C>);
forward_credential_store!(Box<C>);
