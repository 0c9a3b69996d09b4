//! Value types passed between stores, the controller and callers.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::time::now_utc;

/// Numeric user identifier assigned by a credential store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

/// Sentinel returned by [`CredentialStore::validate`](crate::CredentialStore::validate)
/// on a password mismatch.
///
/// Stores keep IDs in signed 64-bit columns, so `u64::MAX` can never be a
/// real ID.
pub const NO_USER_ID: UserId = UserId(u64::MAX);

impl UserId {
    /// Whether this is the "no user" sentinel.
    #[inline]
    pub fn is_none(self) -> bool {
        self == NO_USER_ID
    }

    /// Convert to the signed representation used by SQL columns.
    #[allow(clippy::cast_possible_wrap)]
    #[inline]
    pub fn as_i64(self) -> i64 {
        self.0 as i64
    }

    /// Convert from a signed SQL column, rejecting negative values.
    pub fn from_i64(id: i64) -> Result<Self, AuthError> {
        u64::try_from(id)
            .map(UserId)
            .map_err(|_| AuthError::corruption(format!("negative user id {id}")))
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(UserId)
            .map_err(|e| AuthError::corruption(format!("invalid user id {s:?}: {e}")))
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Data stored for one session key.
///
/// A record with `valid_until <= now` is logically expired even when the
/// backend still holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionKeyData {
    /// Owner of the session.
    pub user: UserId,
    /// When the session was created.
    pub creation_time: DateTime<Utc>,
    /// First instant at which the session is no longer valid.
    pub valid_until: DateTime<Utc>,
}

impl SessionKeyData {
    /// Build a record starting now and lasting `valid_for`.
    ///
    /// Timestamps are kept at whole seconds, so a fractional lifetime is
    /// rounded up. A zero lifetime is rejected.
    pub fn starting_now(user: UserId, valid_for: Duration) -> Result<Self, AuthError> {
        let lifetime = whole_seconds(valid_for)?;
        let creation_time = now_utc();
        let delta = chrono::Duration::from_std(lifetime)
            .map_err(|e| AuthError::Config(format!("session duration out of range: {e}")))?;
        let valid_until = creation_time
            .checked_add_signed(delta)
            .ok_or_else(|| AuthError::Config("session duration out of range".into()))?;
        Ok(Self {
            user,
            creation_time,
            valid_until,
        })
    }

    /// Time from creation to expiry.
    pub fn lifetime(&self) -> Duration {
        (self.valid_until - self.creation_time)
            .to_std()
            .unwrap_or_default()
    }

    /// Whether the session is still valid at `now`.
    #[inline]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_until > now
    }
}

#[cfg(test)]
impl SessionKeyData {
    /// A record that ran out an hour ago.
    pub(crate) fn expired(user: UserId) -> Self {
        let now = now_utc();
        Self {
            user,
            creation_time: now - chrono::Duration::hours(2),
            valid_until: now - chrono::Duration::hours(1),
        }
    }
}

/// Round `valid_for` up to whole seconds.
fn whole_seconds(valid_for: Duration) -> Result<Duration, AuthError> {
    let secs = valid_for.as_secs() + u64::from(valid_for.subsec_nanos() > 0);
    if secs == 0 {
        return Err(AuthError::Config(
            "session lifetime must be at least one second".into(),
        ));
    }
    Ok(Duration::from_secs(secs))
}

/// Read-only profile projection of a stored user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseUserInformation {
    pub id: UserId,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub last_login: DateTime<Utc>,
    pub is_active: bool,
}

/// Fields supplied when creating a user.
#[derive(Debug, Clone, Copy)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub email: &'a str,
}

impl<'a> NewUser<'a> {
    /// New user with only a username; name and email left empty.
    pub fn named(username: &'a str) -> Self {
        Self {
            username,
            first_name: "",
            last_name: "",
            email: "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_is_distinct() {
        assert!(NO_USER_ID.is_none());
        assert!(!UserId(1).is_none());
        assert!(UserId::from_i64(-1).is_err());
        assert_eq!(UserId::from_i64(42).unwrap(), UserId(42));
    }

    #[test]
    fn test_user_id_parse() {
        assert_eq!("17".parse::<UserId>().unwrap(), UserId(17));
        assert!(matches!(
            "abc".parse::<UserId>(),
            Err(AuthError::DataCorruption(_))
        ));
    }

    #[test]
    fn test_session_data_duration() {
        let data = SessionKeyData::starting_now(UserId(3), Duration::from_secs(90)).unwrap();
        assert_eq!(
            (data.valid_until - data.creation_time).num_seconds(),
            90
        );
        assert!(data.is_valid_at(data.creation_time));
        assert!(!data.is_valid_at(data.valid_until));
        assert_eq!(data.lifetime(), Duration::from_secs(90));
    }

    #[test]
    fn test_session_lifetime_rounds_up() {
        let data = SessionKeyData::starting_now(UserId(3), Duration::from_millis(1500)).unwrap();
        assert_eq!(data.lifetime(), Duration::from_secs(2));
        assert!(data.valid_until > data.creation_time);

        let data = SessionKeyData::starting_now(UserId(3), Duration::from_millis(1)).unwrap();
        assert_eq!(data.lifetime(), Duration::from_secs(1));
    }

    #[test]
    fn test_zero_lifetime_rejected() {
        assert!(matches!(
            SessionKeyData::starting_now(UserId(3), Duration::ZERO),
            Err(AuthError::Config(_))
        ));
    }
}
