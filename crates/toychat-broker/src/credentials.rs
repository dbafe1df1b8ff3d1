use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use toychat_types::ExchangeError;

/// Hash a password with Argon2id. Only the hash ever leaves the caller.
pub fn hash_password(password: &str) -> Result<String, ExchangeError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ExchangeError::failure(format!("password hashing failed: {}", e)))
}

/// Check a password against a stored hash. A hash that does not parse is a
/// failure, a wrong password is `Ok(false)`.
pub fn verify_password(stored_hash: &str, password: &str) -> Result<bool, ExchangeError> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| ExchangeError::failure(format!("stored hash unreadable: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}
