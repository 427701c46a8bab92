// Peppered Argon2id password hashing.

use argon2::{
    password_hash::{rand_core::OsRng, Error as HashError, PasswordHash, SaltString},
    Argon2, PasswordHasher, PasswordVerifier,
};

/// Hashes a password with Argon2id and a random salt.
///
/// The server-wide pepper is appended to the password before hashing, so
/// a leaked database alone is not enough to mount an offline attack.
pub fn hash_password(plain: &str, pepper: &str) -> Result<String, HashError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(peppered(plain, pepper).as_bytes(), &salt)
        .map(|hash| hash.to_string())
}

/// Checks a password against a stored PHC-format hash. An unparseable
/// stored hash verifies as false rather than erroring.
pub fn verify_password(plain: &str, pepper: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };

    Argon2::default().verify_password(peppered(plain, pepper).as_bytes(), &parsed).is_ok()
}

fn peppered(plain: &str, pepper: &str) -> String {
    format!("{plain}{pepper}")
}
