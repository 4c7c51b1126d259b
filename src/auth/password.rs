// Password hashing and validation service

use argon2::{
    password_hash::{
        rand_core::OsRng, Error as PhcError, PasswordHash, PasswordHasher as _,
        PasswordVerifier, SaltString,
    },
    Algorithm, Argon2, Params, Version,
};

use crate::auth::error::AuthError;

/// Argon2id hasher with a configurable work factor and password policy
///
/// Stored hashes are PHC strings that embed the salt and the parameters they
/// were produced with, so verification never needs the current work factor.
/// Holds no mutable state and is safe to share across threads.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    params: Params,
    min_length: usize,
}

impl PasswordHasher {
    /// Create a hasher
    ///
    /// * `work_factor` - argon2 iteration count (t_cost)
    /// * `memory_kib` - argon2 memory cost in KiB (m_cost)
    /// * `min_length` - minimum password length in characters
    pub fn new(work_factor: u32, memory_kib: u32, min_length: usize) -> Result<Self, AuthError> {
        let params = Params::new(memory_kib, work_factor, 1, None)
            .map_err(|e| AuthError::PasswordHash(format!("invalid argon2 parameters: {e}")))?;

        Ok(Self { params, min_length })
    }

    pub fn min_length(&self) -> usize {
        self.min_length
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Check the password policy without hashing
    pub fn check_policy(&self, password: &str) -> Result<(), AuthError> {
        let length = password.chars().count();
        if length < self.min_length {
            return Err(AuthError::Policy(format!(
                "password must be at least {} characters",
                self.min_length
            )));
        }
        Ok(())
    }

    /// Hash a password using Argon2id
    pub fn hash(&self, password: &str) -> Result<String, AuthError> {
        self.check_policy(password)?;

        let salt = SaltString::generate(&mut OsRng);
        self.argon2()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AuthError::PasswordHash(e.to_string()))
    }

    /// Verify a password against a stored hash
    ///
    /// A mismatch is `Ok(false)`; only an unparseable stored hash is an error.
    pub fn verify(&self, password: &str, stored_hash: &str) -> Result<bool, AuthError> {
        let parsed = PasswordHash::new(stored_hash)
            .map_err(|e| AuthError::CorruptHash(format!("invalid password hash format: {e}")))?;

        match self.argon2().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(PhcError::Password) => Ok(false),
            Err(e) => Err(AuthError::CorruptHash(format!(
                "stored password hash cannot be verified: {e}"
            ))),
        }
    }
}
