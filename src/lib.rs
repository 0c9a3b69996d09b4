//! # keygate
//!
//! Session-key and credential storage with interchangeable backends.
//!
//! ## Crates
//!
//! - [`keygate_auth`] - Session and credential stores, controller, admin CLI
//! - [`keygate_config`] - Configuration loading and validation

pub use keygate_auth as auth;
pub use keygate_config as config;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use keygate_auth::{
        AuthError, BcryptHasher, CredentialStore, MemoryCredentialStore, MemorySessionStore,
        NewUser, SessionController, SessionStore, UserId,
    };
    pub use keygate_config::{Config, load_config, validate_config};
}
