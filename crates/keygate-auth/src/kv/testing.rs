//! Instrumented [`KeyValueStore`] for index maintenance tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use super::memory::MemoryKv;
use super::store::{KeyTtl, KeyValueStore};
use crate::error::AuthError;

/// [`MemoryKv`] whose set writes can be held back, counting index reads.
///
/// While the gate is closed every `set_add_extend` waits; [`open`](Self::open)
/// lets all of them through for good.
pub(crate) struct GatedKv {
    pub(crate) inner: MemoryKv,
    gate: Semaphore,
    /// `set_members` calls.
    pub(crate) sweeps: AtomicUsize,
    /// Single-key `exists` calls.
    pub(crate) single_exists: AtomicUsize,
}

impl GatedKv {
    pub(crate) fn closed() -> Self {
        Self {
            inner: MemoryKv::new(),
            gate: Semaphore::new(0),
            sweeps: AtomicUsize::new(0),
            single_exists: AtomicUsize::new(0),
        }
    }

    pub(crate) fn open(&self) {
        // a closed semaphore fails every acquire at once
        self.gate.close();
    }
}

#[async_trait]
impl KeyValueStore for GatedKv {
    async fn hash_create(
        &self,
        key: &str,
        fields: &[(&str, String)],
        ttl: Option<Duration>,
    ) -> Result<bool, AuthError> {
        self.inner.hash_create(key, fields, ttl).await
    }

    async fn hash_update(&self, key: &str, fields: &[(&str, String)]) -> Result<bool, AuthError> {
        self.inner.hash_update(key, fields).await
    }

    async fn hash_get(&self, key: &str, fields: &[&str]) -> Result<Vec<Option<String>>, AuthError> {
        self.inner.hash_get(key, fields).await
    }

    async fn set_add_extend(
        &self,
        key: &str,
        member: &str,
        ttl: Duration,
    ) -> Result<(), AuthError> {
        let _ = self.gate.acquire().await;
        self.inner.set_add_extend(key, member, ttl).await
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, AuthError> {
        self.sweeps.fetch_add(1, Ordering::SeqCst);
        self.inner.set_members(key).await
    }

    async fn set_remove(&self, key: &str, members: &[String]) -> Result<u64, AuthError> {
        self.inner.set_remove(key, members).await
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, AuthError> {
        self.inner.ttl(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool, AuthError> {
        self.single_exists.fetch_add(1, Ordering::SeqCst);
        self.inner.exists(key).await
    }

    async fn exists_many(&self, keys: &[String]) -> Result<Vec<bool>, AuthError> {
        self.inner.exists_many(keys).await
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, AuthError> {
        self.inner.delete(keys).await
    }

    async fn incr(&self, key: &str) -> Result<i64, AuthError> {
        self.inner.incr(key).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, AuthError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), AuthError> {
        self.inner.set(key, value).await
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, AuthError> {
        self.inner.scan_prefix(prefix).await
    }
}
