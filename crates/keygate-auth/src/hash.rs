//! Password hashing.

use crate::error::AuthError;

/// Default bcrypt work factor.
pub const DEFAULT_BCRYPT_COST: u32 = 13;

/// Length of a bcrypt hash in modular crypt format (`$2b$13$...`).
pub const BCRYPT_HASH_LENGTH: usize = 60;

/// Turns plaintext credentials into stored hashes and checks them.
///
/// A mismatch is `Ok(false)`, never an error. Errors are reserved for a
/// malformed stored hash ([`AuthError::DataCorruption`]) or an internal
/// algorithm failure ([`AuthError::Hash`]).
pub trait PasswordHasher: Send + Sync + std::fmt::Debug {
    /// Hash a plaintext password with a fresh salt.
    fn generate_hash(&self, plaintext: &[u8]) -> Result<String, AuthError>;

    /// Check a plaintext password against a stored hash.
    fn check_password(&self, hash: &[u8], plaintext: &[u8]) -> Result<bool, AuthError>;

    /// Fixed width of every hash this hasher produces.
    fn hash_length(&self) -> usize;
}

/// bcrypt-backed [`PasswordHasher`].
#[derive(Debug, Clone, Copy)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    /// Create a hasher with the given work factor.
    ///
    /// The cost is checked on first use; bcrypt accepts 4..=31.
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self::new(DEFAULT_BCRYPT_COST)
    }
}

impl PasswordHasher for BcryptHasher {
    fn generate_hash(&self, plaintext: &[u8]) -> Result<String, AuthError> {
        bcrypt::hash(plaintext, self.cost).map_err(|e| AuthError::Hash(e.to_string()))
    }

    fn check_password(&self, hash: &[u8], plaintext: &[u8]) -> Result<bool, AuthError> {
        let hash = std::str::from_utf8(hash)
            .map_err(|e| AuthError::corruption(format!("stored hash is not utf-8: {e}")))?;
        // CHAR(n) columns may pad with spaces
        bcrypt::verify(plaintext, hash.trim_end())
            .map_err(|e| AuthError::corruption(format!("malformed stored hash: {e}")))
    }

    #[inline]
    fn hash_length(&self) -> usize {
        BCRYPT_HASH_LENGTH
    }
}
