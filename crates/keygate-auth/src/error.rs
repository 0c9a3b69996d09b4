//! Authentication and storage error types.

/// Error returned by every store, hasher and controller operation.
///
/// Callers that only care about "absent or not" should use
/// [`is_not_found`](Self::is_not_found) instead of matching the two
/// not-found variants individually.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Session key absent (or logically expired when reported by the controller).
    #[error("session key not found")]
    KeyNotFound,

    /// Username or user ID does not resolve to a stored user.
    #[error("user not found")]
    UserNotFound,

    /// A session with this key already exists.
    #[error("session key already exists")]
    DuplicateKey,

    /// The username is already taken.
    #[error("username already in use")]
    DuplicateUsername,

    /// A stored value has an unexpected shape or type.
    ///
    /// Never coerced: this signals tampering or an incompatible writer.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Transport or storage failure, passed through opaquely.
    #[error("backend error: {0}")]
    Backend(String),

    /// Key generation kept colliding with existing keys.
    #[error("session key generation exhausted after {attempts} attempts")]
    KeyGenerationExhausted {
        /// Number of keys tried before giving up.
        attempts: u32,
    },

    /// The password hashing algorithm failed internally.
    #[error("password hashing failed: {0}")]
    Hash(String),

    /// Invalid store or controller configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// Create a backend error from any error type.
    #[inline]
    pub fn backend<E: std::fmt::Display>(err: E) -> Self {
        Self::Backend(err.to_string())
    }

    /// Create a data-corruption error from any error type.
    #[inline]
    pub fn corruption<E: std::fmt::Display>(err: E) -> Self {
        Self::DataCorruption(err.to_string())
    }

    /// Whether this error means "key or user absent".
    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound | Self::UserNotFound)
    }
}

#[cfg(feature = "sql")]
impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::Decode(_)
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::TypeNotFound { .. } => Self::corruption(err),
            other => Self::backend(other),
        }
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for AuthError {
    fn from(err: redis::RedisError) -> Self {
        match err.kind() {
            redis::ErrorKind::TypeError => Self::corruption(err),
            // WRONGTYPE replies arrive as server errors carrying that code
            _ if err.code() == Some("WRONGTYPE") => Self::corruption(err),
            _ => Self::backend(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        assert!(AuthError::KeyNotFound.is_not_found());
        assert!(AuthError::UserNotFound.is_not_found());
        assert!(!AuthError::DuplicateKey.is_not_found());
        assert!(!AuthError::corruption("bad").is_not_found());
    }

    #[test]
    fn test_constructors_keep_message() {
        let err = AuthError::backend("connection refused");
        assert_eq!(err.to_string(), "backend error: connection refused");

        let err = AuthError::corruption("weird value");
        assert_eq!(err.to_string(), "data corruption: weird value");
    }
}
