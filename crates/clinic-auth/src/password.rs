//! Credential service: Argon2id hashing and verification.
//!
//! Digests are PHC strings carrying their own parameters. Legacy bcrypt
//! digests still verify and always report as needing rotation. KDF work
//! runs on the blocking pool through the `*_blocking` wrappers.

use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};

use crate::config::AuthConfig;
use crate::error::AuthError;

fn is_bcrypt(digest: &str) -> bool {
    ["$2a$", "$2b$", "$2y$"]
        .iter()
        .any(|prefix| digest.starts_with(prefix))
}

fn hasher(config: &AuthConfig) -> Result<Argon2<'static>, AuthError> {
    let params = Params::new(
        config.kdf_memory_kib,
        config.kdf_iterations,
        config.kdf_parallelism,
        None,
    )
    .map_err(|e| AuthError::Crypto(format!("invalid KDF parameters: {e}")))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Enforce the minimum plaintext length.
pub fn check_policy(password: &str, config: &AuthConfig) -> Result<(), AuthError> {
    if password.chars().count() < config.min_password_length {
        return Err(AuthError::PasswordTooShort(config.min_password_length));
    }
    Ok(())
}

/// Hash a plaintext password with the configured Argon2id policy.
pub fn hash_password(password: &str, config: &AuthConfig) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    hasher(config)?
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Crypto(format!("hash error: {e}")))
}

/// A digest under `config` whose plaintext is thrown away. Verifying a
/// submitted password against it costs the same KDF work as a real
/// account.
pub fn decoy_digest(config: &AuthConfig) -> Result<String, AuthError> {
    let plaintext = SaltString::generate(&mut OsRng);
    hash_password(plaintext.as_str(), config)
}

/// Verify a plaintext password against a stored digest.
///
/// Returns `Ok(false)` on mismatch and `Err(AuthError::Crypto)` when the
/// digest is malformed.
pub fn verify_password(password: &str, digest: &str) -> Result<bool, AuthError> {
    if is_bcrypt(digest) {
        return bcrypt::verify(password, digest)
            .map_err(|e| AuthError::Crypto(format!("bcrypt verify error: {e}")));
    }

    let parsed = PasswordHash::new(digest)
        .map_err(|e| AuthError::Crypto(format!("invalid hash format: {e}")))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::Crypto(format!("verify error: {e}"))),
    }
}

/// Whether `digest` was produced under a weaker policy than `config`.
pub fn needs_rehash(digest: &str, config: &AuthConfig) -> bool {
    if is_bcrypt(digest) {
        return true;
    }
    let Ok(parsed) = PasswordHash::new(digest) else {
        return true;
    };
    if parsed.algorithm.as_str() != "argon2id" {
        return true;
    }
    match Params::try_from(&parsed) {
        Ok(params) => {
            params.m_cost() < config.kdf_memory_kib
                || params.t_cost() < config.kdf_iterations
                || params.p_cost() < config.kdf_parallelism
        }
        Err(_) => true,
    }
}

pub async fn hash_password_blocking(
    password: String,
    config: AuthConfig,
) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || hash_password(&password, &config))
        .await
        .map_err(|e| AuthError::Crypto(format!("hash task failed: {e}")))?
}

pub async fn verify_password_blocking(password: String, digest: String) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &digest))
        .await
        .map_err(|e| AuthError::Crypto(format!("verify task failed: {e}")))?
}
