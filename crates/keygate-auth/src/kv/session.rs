//! Key-value session store with a self-healing per-user index.
//!
//! Each session is a hash `skey:<key>` with fields `User`, `CreationTime`
//! and `ValidUntil`, expiring natively after its lifetime. Each user has a
//! set `usessions:<id>` listing candidate session keys, used only by
//! [`delete_entries_for_user`](SessionStore::delete_entries_for_user).
//!
//! The set may hold stale keys but must never miss a live one:
//! - members are added by the [`IndexMaintainer`] after the session is
//!   written, and the set TTL only ever grows;
//! - until then revoke-all picks them up from the maintainer's pending map;
//! - the maintainer's sweep removes a member only after seeing its record
//!   gone;
//! - revoke-all deletes every member blindly, so stale members are harmless.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use super::maintainer::IndexMaintainer;
use super::prefixes::KvPrefixes;
use super::store::KeyValueStore;
use crate::error::AuthError;
use crate::time::{format_timestamp, parse_timestamp};
use crate::traits::SessionStore;
use crate::types::{SessionKeyData, UserId};

const FIELD_USER: &str = "User";
const FIELD_CREATION_TIME: &str = "CreationTime";
const FIELD_VALID_UNTIL: &str = "ValidUntil";

/// [`SessionStore`] over any [`KeyValueStore`].
///
/// Must be created inside a tokio runtime; it spawns its index maintainer.
pub struct KvSessionStore<K: ?Sized> {
    kv: Arc<K>,
    prefixes: KvPrefixes,
    maintainer: IndexMaintainer<K>,
}

impl<K> KvSessionStore<K>
where
    K: KeyValueStore + ?Sized + 'static,
{
    pub fn new(kv: Arc<K>) -> Self {
        Self::with_prefixes(kv, KvPrefixes::default())
    }

    pub fn with_prefixes(kv: Arc<K>, prefixes: KvPrefixes) -> Self {
        let maintainer = IndexMaintainer::spawn(kv.clone(), prefixes.session.clone());
        Self {
            kv,
            prefixes,
            maintainer,
        }
    }

    /// Wait for queued index updates from this process to land.
    pub async fn flush_index(&self) {
        self.maintainer.flush().await;
    }

    /// Current candidate keys for `user`, read straight from the store.
    pub async fn indexed_keys(&self, user: UserId) -> Result<Vec<String>, AuthError> {
        self.kv
            .set_members(&self.prefixes.user_sessions_key(user))
            .await
    }

    pub fn prefixes(&self) -> &KvPrefixes {
        &self.prefixes
    }
}

#[async_trait]
impl<K> SessionStore for KvSessionStore<K>
where
    K: KeyValueStore + ?Sized + 'static,
{
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
        let lifetime = data.lifetime();
        let fields = [
            (FIELD_USER, user.to_string()),
            (FIELD_CREATION_TIME, format_timestamp(data.creation_time)),
            (FIELD_VALID_UNTIL, format_timestamp(data.valid_until)),
        ];
        let created = self
            .kv
            .hash_create(&self.prefixes.session_key(key), &fields, Some(lifetime))
            .await?;
        if !created {
            return Err(AuthError::DuplicateKey);
        }

        self.maintainer
            .track(
                self.prefixes.user_sessions_key(user),
                key.to_string(),
                lifetime,
            )
            .await;
        Ok(data)
    }

    async fn get_data(&self, key: &str) -> Result<SessionKeyData, AuthError> {
        let values = self
            .kv
            .hash_get(
                &self.prefixes.session_key(key),
                &[FIELD_USER, FIELD_CREATION_TIME, FIELD_VALID_UNTIL],
            )
            .await?;

        match values.as_slice() {
            [Some(user), Some(created), Some(valid_until)] => Ok(SessionKeyData {
                user: user.parse::<UserId>()?,
                creation_time: parse_timestamp(created)?,
                valid_until: parse_timestamp(valid_until)?,
            }),
            values if values.iter().all(Option::is_none) => Err(AuthError::KeyNotFound),
            _ => Err(AuthError::corruption(format!(
                "incomplete session record for key {key:?}"
            ))),
        }
    }

    async fn delete_key(&self, key: &str) -> Result<(), AuthError> {
        // the index entry goes stale and is swept later
        self.kv.delete(&[self.prefixes.session_key(key)]).await?;
        Ok(())
    }

    async fn delete_entries_for_user(&self, user: UserId) -> Result<u64, AuthError> {
        let set_key = self.prefixes.user_sessions_key(user);
        // pending first: a member leaves the pending map only once it is in the set
        let mut candidates = self.maintainer.pending_members(&set_key);
        let indexed = self.kv.set_members(&set_key).await?;
        candidates.extend(indexed.iter().cloned());
        candidates.sort_unstable();
        candidates.dedup();
        if candidates.is_empty() {
            return Ok(0);
        }

        let records: Vec<String> = candidates
            .iter()
            .map(|m| self.prefixes.session_key(m))
            .collect();
        let removed = self.kv.delete(&records).await?;
        // only what was read; members added meanwhile stay, pending ones get swept
        self.kv.set_remove(&set_key, &indexed).await?;

        info!(user = %user, removed, candidates = candidates.len(), "deleted user sessions");
        Ok(removed)
    }

    async fn delete_invalid_keys(&self) -> Result<u64, AuthError> {
        // expiry is native
        Ok(0)
    }
}

impl<K: ?Sized> std::fmt::Debug for KvSessionStore<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvSessionStore")
            .field("prefixes", &self.prefixes)
            .finish_non_exhaustive()
    }
}
