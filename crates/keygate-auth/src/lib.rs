//! Session-key and credential storage for keygate.
//!
//! Two capabilities, each with relational, key-value and in-memory
//! implementations:
//!
//! - [`SessionStore`]: opaque session keys mapped to a user and a validity
//!   window, wrapped by [`SessionController`] for issuing and validation.
//! - [`CredentialStore`]: users with bcrypt password hashes.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use keygate_auth::{
//!     BcryptHasher, CredentialStore, MemoryCredentialStore, MemorySessionStore, NewUser,
//!     SessionController,
//! };
//!
//! # async fn example() -> Result<(), keygate_auth::AuthError> {
//! let users = MemoryCredentialStore::with_hasher(std::sync::Arc::new(BcryptHasher::new(4)));
//! let alice = users.insert(NewUser::named("alice"), b"secret").await?;
//!
//! let sessions = SessionController::new(MemorySessionStore::new());
//! let (key, _) = sessions.issue(alice, Duration::from_secs(3600)).await?;
//! assert_eq!(sessions.validate(&key).await?.user, alice);
//! # Ok(())
//! # }
//! ```

mod controller;
mod error;
mod hash;
mod memory;
pub mod time;
mod traits;
mod types;

pub mod kv;
#[cfg(feature = "sql")]
pub mod sql;

#[cfg(feature = "cli")]
pub mod cli;

pub use controller::{
    ControllerConfig, DEFAULT_KEY_LENGTH, DEFAULT_MAX_KEY_ATTEMPTS, DEFAULT_SESSION_TTL,
    SessionController, generate_session_key,
};
pub use error::AuthError;
pub use hash::{BCRYPT_HASH_LENGTH, BcryptHasher, DEFAULT_BCRYPT_COST, PasswordHasher};
pub use memory::{MemoryCredentialStore, MemorySessionStore};
pub use time::{format_timestamp, now_utc, parse_timestamp};
pub use traits::{CredentialStore, SessionStore};
pub use types::{BaseUserInformation, NO_USER_ID, NewUser, SessionKeyData, UserId};

#[cfg(feature = "cli")]
pub use cli::{AuthArgs, AuthCommands};
