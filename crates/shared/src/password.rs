//! Password hashing utilities using Argon2id.
//!
//! Hashes are stored as PHC strings, which carry the algorithm, parameters and
//! salt alongside the digest. [`needs_rehash`] reports hashes created with
//! parameters other than the current ones so callers can upgrade them on login.
//!
//! Legacy bcrypt hashes (`$2a$`, `$2b$`, `$2x$`, `$2y$`) still verify, and are
//! always reported as needing a rehash.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use thiserror::Error;

/// Error type for password operations.
#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("Failed to hash password: {0}")]
    HashError(String),

    #[error("Failed to verify password: {0}")]
    VerifyError(String),

    #[error("Invalid password hash format")]
    InvalidHashFormat,
}

/// Argon2id parameters following OWASP recommendations (2024).
const MEMORY_COST: u32 = 19456; // 19 MiB in KiB
const TIME_COST: u32 = 2;
const PARALLELISM: u32 = 1;
const OUTPUT_LEN: usize = 32;

const BCRYPT_PREFIXES: [&str; 4] = ["$2a$", "$2b$", "$2x$", "$2y$"];

fn is_bcrypt(hash: &str) -> bool {
    BCRYPT_PREFIXES.iter().any(|prefix| hash.starts_with(prefix))
}

fn hasher() -> Result<Argon2<'static>, PasswordError> {
    let params = Params::new(MEMORY_COST, TIME_COST, PARALLELISM, Some(OUTPUT_LEN))
        .map_err(|e| PasswordError::HashError(format!("Failed to create Argon2 params: {}", e)))?;

    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hashes a password with a random salt and returns the PHC string.
///
/// # Example
/// ```
/// use shared::password::hash_password;
///
/// let hash = hash_password("my_secure_password").unwrap();
/// assert!(hash.starts_with("$argon2id$"));
/// ```
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);

    hasher()?
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::HashError(e.to_string()))
}

/// Verifies a password against a stored hash.
///
/// Returns `Ok(false)` on mismatch. The parameters are read from the hash itself.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    if is_bcrypt(hash) {
        return bcrypt::verify(password, hash).map_err(|_| PasswordError::InvalidHashFormat);
    }

    let parsed = PasswordHash::new(hash).map_err(|_| PasswordError::InvalidHashFormat)?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::VerifyError(e.to_string())),
    }
}

/// Boolean form of [`verify_password`]; any error counts as a mismatch.
///
/// ```
/// use shared::password::{check_password_hash, hash_password};
///
/// let hash = hash_password("my_password").unwrap();
/// assert!(check_password_hash("my_password", &hash));
/// assert!(!check_password_hash("wrong_password", &hash));
/// ```
pub fn check_password_hash(password: &str, hash: &str) -> bool {
    verify_password(password, hash).unwrap_or(false)
}

/// Whether a stored hash should be recomputed with the current parameters.
pub fn needs_rehash(hash: &str) -> bool {
    if is_bcrypt(hash) {
        return true;
    }
    let Ok(parsed) = PasswordHash::new(hash) else {
        return true;
    };
    if parsed.algorithm != Algorithm::Argon2id.ident() {
        return true;
    }

    match Params::try_from(&parsed) {
        Ok(params) => {
            params.m_cost() != MEMORY_COST
                || params.t_cost() != TIME_COST
                || params.p_cost() != PARALLELISM
        }
        Err(_) => true,
    }
}
