//! Primitive operations of a Redis-like key-value store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::AuthError;

/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// The key does not exist.
    Missing,
    /// The key exists and never expires.
    Persistent,
    /// The key expires after this long.
    Expires(Duration),
}

/// Store primitives the key-value session and credential stores are built on.
///
/// Every method is atomic on its own; nothing spans unrelated keys except
/// [`delete`](Self::delete). A value of the wrong type for the operation
/// must be reported as [`AuthError::DataCorruption`].
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Create hash `key` with `fields` only if `key` does not exist.
    ///
    /// With `ttl` the hash is written together with its expiry. Returns
    /// `false` (and writes nothing) if the key already existed.
    async fn hash_create(
        &self,
        key: &str,
        fields: &[(&str, String)],
        ttl: Option<Duration>,
    ) -> Result<bool, AuthError>;

    /// Overwrite `fields` of hash `key` only if `key` exists.
    async fn hash_update(&self, key: &str, fields: &[(&str, String)]) -> Result<bool, AuthError>;

    /// Read `fields` of hash `key`; absent fields (or key) read as `None`.
    async fn hash_get(&self, key: &str, fields: &[&str]) -> Result<Vec<Option<String>>, AuthError>;

    /// Add `member` to set `key` and make the set live for at least `ttl`.
    ///
    /// An existing longer expiry is kept, and an existing set without
    /// expiry stays without one. The TTL is never shortened.
    async fn set_add_extend(&self, key: &str, member: &str, ttl: Duration)
    -> Result<(), AuthError>;

    /// All members of set `key`; empty if absent.
    async fn set_members(&self, key: &str) -> Result<Vec<String>, AuthError>;

    /// Remove `members` from set `key`, returning how many were present.
    async fn set_remove(&self, key: &str, members: &[String]) -> Result<u64, AuthError>;

    async fn ttl(&self, key: &str) -> Result<KeyTtl, AuthError>;

    async fn exists(&self, key: &str) -> Result<bool, AuthError>;

    /// Existence of each of `keys`, in order.
    ///
    /// Backends with pipelining should answer in one round trip.
    async fn exists_many(&self, keys: &[String]) -> Result<Vec<bool>, AuthError> {
        let mut found = Vec::with_capacity(keys.len());
        for key in keys {
            found.push(self.exists(key).await?);
        }
        Ok(found)
    }

    /// Delete `keys` in one command, returning how many existed.
    async fn delete(&self, keys: &[String]) -> Result<u64, AuthError>;

    /// Atomically increment integer `key` (starting from 0) and return the new value.
    async fn incr(&self, key: &str) -> Result<i64, AuthError>;

    async fn get(&self, key: &str) -> Result<Option<String>, AuthError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), AuthError>;

    /// All keys starting with `prefix`.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, AuthError>;
}

#[async_trait]
impl<K: KeyValueStore + ?Sized> KeyValueStore for Arc<K> {
    #[inline]
    async fn hash_create(
        &self,
        key: &str,
        fields: &[(&str, String)],
        ttl: Option<Duration>,
    ) -> Result<bool, AuthError> {
        (**self).hash_create(key, fields, ttl).await
    }

    #[inline]
    async fn hash_update(&self, key: &str, fields: &[(&str, String)]) -> Result<bool, AuthError> {
        (**self).hash_update(key, fields).await
    }

    #[inline]
    async fn hash_get(&self, key: &str, fields: &[&str]) -> Result<Vec<Option<String>>, AuthError> {
        (**self).hash_get(key, fields).await
    }

    #[inline]
    async fn set_add_extend(
        &self,
        key: &str,
        member: &str,
        ttl: Duration,
    ) -> Result<(), AuthError> {
        (**self).set_add_extend(key, member, ttl).await
    }

    #[inline]
    async fn set_members(&self, key: &str) -> Result<Vec<String>, AuthError> {
        (**self).set_members(key).await
    }

    #[inline]
    async fn set_remove(&self, key: &str, members: &[String]) -> Result<u64, AuthError> {
        (**self).set_remove(key, members).await
    }

    #[inline]
    async fn ttl(&self, key: &str) -> Result<KeyTtl, AuthError> {
        (**self).ttl(key).await
    }

    #[inline]
    async fn exists(&self, key: &str) -> Result<bool, AuthError> {
        (**self).exists(key).await
    }

    #[inline]
    async fn exists_many(&self, keys: &[String]) -> Result<Vec<bool>, AuthError> {
        (**self).exists_many(keys).await
    }

    #[inline]
    async fn delete(&self, keys: &[String]) -> Result<u64, AuthError> {
        (**self).delete(keys).await
    }

    #[inline]
    async fn incr(&self, key: &str) -> Result<i64, AuthError> {
        (**self).incr(key).await
    }

    #[inline]
    async fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
        (**self).get(key).await
    }

    #[inline]
    async fn set(&self, key: &str, value: &str) -> Result<(), AuthError> {
        (**self).set(key, value).await
    }

    #[inline]
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, AuthError> {
        (**self).scan_prefix(prefix).await
    }
}
