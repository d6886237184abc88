//! Admin password hashing built around Argon2id.
//! The admin password only ever exists in memory as a PHC string; logins are
//! checked through Argon2 verification.

use argon2::password_hash::SaltString;
use argon2::{
    password_hash, Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier,
    Version,
};
use rand::rngs::OsRng;

const MEMORY_COST_KIB: u32 = 19 * 1024;
const TIME_COST: u32 = 2;
const PARALLELISM: u32 = 1;

fn argon2_config() -> Result<Argon2<'static>, password_hash::Error> {
    let params = Params::new(MEMORY_COST_KIB, TIME_COST, PARALLELISM, None)?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hashes a password with Argon2id and returns the PHC string.
pub fn hash_password(plaintext: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = argon2_config()?;
    let password_hash = argon2.hash_password(plaintext.as_bytes(), &salt)?.to_string();
    Ok(password_hash)
}

/// Checks a login attempt against the stored PHC string.
/// Malformed hashes never verify.
pub fn verify_password(plaintext: &str, stored_hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(stored_hash) {
        Ok(hash) => hash,
        Err(_) => return false,
    };

    // Parameters come from the PHC string, so hashes made with other costs still verify.
    Argon2::default()
        .verify_password(plaintext.as_bytes(), &parsed_hash)
        .is_ok()
}

/// True when the value parses as a PHC hash string.
pub fn is_password_hash(value: &str) -> bool {
    PasswordHash::new(value).is_ok()
}

#[cfg(test)]
mod tests {
    use super::{hash_password, is_password_hash, verify_password};

    #[test]
    fn hashes_and_verifies_passwords() {
        let hash = hash_password("admin-test-password").expect("hashing should succeed");
        assert!(verify_password("admin-test-password", &hash));
        assert!(!verify_password("wrong-password", &hash));
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!verify_password("anything", "not-a-phc-string"));
        assert!(!verify_password("", ""));
    }

    #[test]
    fn recognizes_phc_strings() {
        let hash = hash_password("pw").expect("hash");
        assert!(hash.starts_with("$argon2id$"));
        assert!(is_password_hash(&hash));
        assert!(!is_password_hash("plain-password"));
    }
}
