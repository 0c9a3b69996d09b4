//! Key naming for the key-value stores.

use crate::types::UserId;

/// Prefixes used to build store keys.
///
/// The defaults give the layout `skey:<key>`, `usessions:<user id>`,
/// `user:<username>`, `userID:<user id>` and the counter `nxtUserid`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvPrefixes {
    /// Session record hashes.
    pub session: String,
    /// Per-user session index sets.
    pub user_sessions: String,
    /// User record hashes.
    pub user: String,
    /// ID to username mapping.
    pub user_id: String,
    /// Counter that hands out user IDs.
    pub next_id_key: String,
}

impl Default for KvPrefixes {
    fn default() -> Self {
        Self {
            session: "skey:".to_string(),
            user_sessions: "usessions:".to_string(),
            user: "user:".to_string(),
            user_id: "userID:".to_string(),
            next_id_key: "nxtUserid".to_string(),
        }
    }
}

impl KvPrefixes {
    #[inline]
    pub fn session_key(&self, key: &str) -> String {
        format!("{}{key}", self.session)
    }

    #[inline]
    pub fn user_sessions_key(&self, user: UserId) -> String {
        format!("{}{user}", self.user_sessions)
    }

    #[inline]
    pub fn user_key(&self, username: &str) -> String {
        format!("{}{username}", self.user)
    }

    #[inline]
    pub fn user_id_key(&self, id: UserId) -> String {
        format!("{}{id}", self.user_id)
    }
}
