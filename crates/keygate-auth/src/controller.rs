//! Session issuing and validation on top of any [`SessionStore`].

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use rand::distr::Alphanumeric;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AuthError;
use crate::time::now_utc;
use crate::traits::SessionStore;
use crate::types::{SessionKeyData, UserId};

/// Default length of generated session keys.
pub const DEFAULT_KEY_LENGTH: usize = 64;

/// Default number of keys tried before giving up on a collision streak.
pub const DEFAULT_MAX_KEY_ATTEMPTS: u32 = 10;

/// Default session lifetime used by [`SessionController::issue_default`].
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(14 * 24 * 60 * 60);

/// Generate a random alphanumeric session key.
///
/// Draws from the thread-local CSPRNG. The charset needs no escaping in any
/// supported backend.
pub fn generate_session_key(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Key-generation and TTL policy for [`SessionController`].
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Length of generated keys.
    pub key_length: usize,
    /// Attempts before [`AuthError::KeyGenerationExhausted`].
    pub max_attempts: u32,
    /// Lifetime used by [`SessionController::issue_default`].
    pub default_ttl: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            key_length: DEFAULT_KEY_LENGTH,
            max_attempts: DEFAULT_MAX_KEY_ATTEMPTS,
            default_ttl: DEFAULT_SESSION_TTL,
        }
    }
}

impl ControllerConfig {
    pub fn key_length(mut self, len: usize) -> Self {
        self.key_length = len;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }
}

/// Entry point for transport layers: issue, validate and revoke sessions.
///
/// Expired sessions are reported exactly like missing ones.
#[derive(Debug)]
pub struct SessionController<S> {
    store: S,
    config: ControllerConfig,
}

impl<S: SessionStore> SessionController<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, ControllerConfig::default())
    }

    pub fn with_config(store: S, config: ControllerConfig) -> Self {
        Self { store, config }
    }

    /// The wrapped store.
    #[inline]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[inline]
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Initialise the underlying store.
    pub async fn init(&self) -> Result<(), AuthError> {
        self.store.init().await
    }

    /// Issue a new session for `user`, returning the raw key and its record.
    ///
    /// # Errors
    /// [`AuthError::KeyGenerationExhausted`] if every generated key collided.
    pub async fn issue(
        &self,
        user: UserId,
        valid_for: Duration,
    ) -> Result<(String, SessionKeyData), AuthError> {
        for attempt in 1..=self.config.max_attempts {
            let key = generate_session_key(self.config.key_length);
            match self.store.create_entry(user, &key, valid_for).await {
                Ok(data) => return Ok((key, data)),
                Err(AuthError::DuplicateKey) => {
                    debug!(attempt, "session key collision, retrying");
                }
                Err(e) => return Err(e),
            }
        }
        warn!(
            attempts = self.config.max_attempts,
            "session key generation exhausted"
        );
        Err(AuthError::KeyGenerationExhausted {
            attempts: self.config.max_attempts,
        })
    }

    /// Issue a session with the configured default lifetime.
    pub async fn issue_default(&self, user: UserId) -> Result<(String, SessionKeyData), AuthError> {
        self.issue(user, self.config.default_ttl).await
    }

    /// Look up a session and check it is still valid.
    ///
    /// # Errors
    /// [`AuthError::KeyNotFound`] for both absent and expired keys.
    pub async fn validate(&self, key: &str) -> Result<SessionKeyData, AuthError> {
        let data = self.store.get_data(key).await?;
        if !data.is_valid_at(now_utc()) {
            return Err(AuthError::KeyNotFound);
        }
        Ok(data)
    }

    /// Revoke one session.
    pub async fn revoke(&self, key: &str) -> Result<(), AuthError> {
        self.store.delete_key(key).await
    }

    /// Revoke every session of `user`.
    pub async fn revoke_all(&self, user: UserId) -> Result<u64, AuthError> {
        let removed = self.store.delete_entries_for_user(user).await?;
        info!(user = %user, removed, "revoked user sessions");
        Ok(removed)
    }

    /// Remove expired sessions from the store.
    pub async fn delete_invalid_keys(&self) -> Result<u64, AuthError> {
        self.store.delete_invalid_keys().await
    }
}

impl<S: SessionStore + 'static> SessionController<S> {
    /// Periodically run [`delete_invalid_keys`](Self::delete_invalid_keys)
    /// until `shutdown` is cancelled.
    ///
    /// Failures are logged and the loop keeps going.
    pub fn spawn_cleanup(
        self: Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;

                    _ = shutdown.cancelled() => {
                        debug!("session cleanup stopped");
                        break;
                    }

                    _ = ticker.tick() => {
                        match self.delete_invalid_keys().await {
                            Ok(0) => {}
                            Ok(removed) => info!(removed, "deleted expired sessions"),
                            Err(e) => warn!(error = %e, "session cleanup failed"),
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::memory::MemorySessionStore;

    /// Reports a collision for the first `collisions` inserts.
    struct Colliding {
        inner: MemorySessionStore,
        collisions: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl SessionStore for Colliding {
        async fn init(&self) -> Result<(), AuthError> {
            Ok(())
        }

        async fn create_entry(
            &self,
            user: UserId,
            key: &str,
            valid_for: Duration,
        ) -> Result<SessionKeyData, AuthError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.collisions {
                return Err(AuthError::DuplicateKey);
            }
            self.inner.create_entry(user, key, valid_for).await
        }

        async fn get_data(&self, key: &str) -> Result<SessionKeyData, AuthError> {
            self.inner.get_data(key).await
        }

        async fn delete_key(&self, key: &str) -> Result<(), AuthError> {
            self.inner.delete_key(key).await
        }

        async fn delete_entries_for_user(&self, user: UserId) -> Result<u64, AuthError> {
            self.inner.delete_entries_for_user(user).await
        }

        async fn delete_invalid_keys(&self) -> Result<u64, AuthError> {
            self.inner.delete_invalid_keys().await
        }
    }

    fn colliding(collisions: u32) -> Colliding {
        Colliding {
            inner: MemorySessionStore::new(),
            collisions,
            calls: AtomicU32::new(0),
        }
    }

    #[test]
    fn test_generated_keys() {
        let key = generate_session_key(64);
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(key, generate_session_key(64));
    }

    #[tokio::test]
    async fn test_issue_and_validate() {
        let controller = SessionController::new(MemorySessionStore::new());
        let (key, data) = controller
            .issue(UserId(5), Duration::from_secs(300))
            .await
            .unwrap();
        assert_eq!(key.len(), DEFAULT_KEY_LENGTH);
        assert_eq!(controller.validate(&key).await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_expired_is_not_found() {
        let store = MemorySessionStore::new();
        store.insert_raw("stale", SessionKeyData::expired(UserId(5)));
        let controller = SessionController::new(store);

        // still physically stored
        assert!(controller.store().get_data("stale").await.is_ok());

        let expired = controller.validate("stale").await.unwrap_err();
        let missing = controller.validate("never-issued").await.unwrap_err();
        assert!(matches!(expired, AuthError::KeyNotFound));
        assert!(matches!(missing, AuthError::KeyNotFound));
    }

    #[tokio::test]
    async fn test_retries_on_collision() {
        let controller = SessionController::with_config(
            colliding(3),
            ControllerConfig::default().max_attempts(5),
        );
        let (key, _) = controller
            .issue(UserId(1), Duration::from_secs(60))
            .await
            .unwrap();
        assert!(controller.validate(&key).await.is_ok());
        assert_eq!(controller.store().calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_exhaustion() {
        let controller = SessionController::with_config(
            colliding(u32::MAX),
            ControllerConfig::default().max_attempts(3),
        );
        let err = controller
            .issue(UserId(1), Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::KeyGenerationExhausted { attempts: 3 }
        ));
    }

    #[tokio::test]
    async fn test_revoke_all() {
        let controller = SessionController::new(MemorySessionStore::new());
        let mut keys = Vec::new();
        for _ in 0..3 {
            keys.push(controller.issue_default(UserId(9)).await.unwrap().0);
        }
        let (other, _) = controller.issue_default(UserId(10)).await.unwrap();

        assert_eq!(controller.revoke_all(UserId(9)).await.unwrap(), 3);
        for key in &keys {
            assert!(controller.validate(key).await.unwrap_err().is_not_found());
        }
        assert!(controller.validate(&other).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_task() {
        let store = MemorySessionStore::new();
        store.insert_raw("stale", SessionKeyData::expired(UserId(1)));
        let controller = Arc::new(SessionController::new(store));
        controller
            .issue(UserId(1), Duration::from_secs(3600))
            .await
            .unwrap();

        let shutdown = CancellationToken::new();
        let handle = controller
            .clone()
            .spawn_cleanup(Duration::from_secs(30), shutdown.clone());

        // first tick fires immediately
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(controller.store().len(), 1);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
