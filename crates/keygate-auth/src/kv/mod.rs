//! Key-value backend.
//!
//! Sessions and users are stored on top of a small set of Redis-like
//! primitives ([`KeyValueStore`]). Two implementations are provided:
//! [`MemoryKv`] for tests and single-process use, and `RedisKv` (feature
//! `redis`).
//!
//! # Layout
//!
//! ```text
//! skey:<key>          hash  User, CreationTime, ValidUntil   (expires)
//! usessions:<id>      set   candidate session keys           (expires)
//! user:<username>     hash  id, username, names, password, ...
//! userID:<id>         string username
//! nxtUserid           counter
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use keygate_auth::kv::{KvSessionStore, RedisKv};
//! use keygate_auth::SessionController;
//!
//! let kv = Arc::new(RedisKv::connect("redis://127.0.0.1/").await?);
//! let sessions = SessionController::new(KvSessionStore::new(kv));
//! let (key, _) = sessions.issue_default(user_id).await?;
//! ```

mod maintainer;
mod memory;
mod prefixes;
#[cfg(feature = "redis")]
mod redis;
mod session;
mod store;
#[cfg(test)]
mod testing;
mod user;

pub use maintainer::IndexMaintainer;
pub use memory::MemoryKv;
pub use prefixes::KvPrefixes;
#[cfg(feature = "redis")]
pub use redis::RedisKv;
pub use session::KvSessionStore;
pub use store::{KeyTtl, KeyValueStore};
pub use user::KvCredentialStore;
