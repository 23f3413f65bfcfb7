// Password hashing and verification service

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use std::sync::{Arc, OnceLock};
use tokio::task;

use crate::auth::error::AuthError;

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordHashParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordHashParams {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

/// Password service for hashing and verification
///
/// Hashing is slow on purpose; the async entry points run it on the
/// blocking pool so request workers stay responsive.
#[derive(Clone)]
pub struct PasswordService {
    params: PasswordHashParams,
    dummy_hash: Arc<OnceLock<String>>,
}

impl PasswordService {
    pub fn new(params: PasswordHashParams) -> Self {
        Self {
            params,
            dummy_hash: Arc::new(OnceLock::new()),
        }
    }

    fn hasher(&self) -> Result<Argon2<'static>, AuthError> {
        let params = Params::new(
            self.params.memory_kib,
            self.params.iterations,
            self.params.parallelism,
            None,
        )
        .map_err(|e| AuthError::ConfigError(format!("invalid argon2 params: {}", e)))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    /// Hash a password using Argon2id with a fresh random salt
    pub fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .hasher()?
            .hash_password(password.as_bytes(), &salt)
            .map_err(|_| AuthError::PasswordHashError)?;
        Ok(hash.to_string())
    }

    /// Verify a password against a PHC-format hash
    ///
    /// Parameters embedded in the stored hash win over the configured ones,
    /// so hashes written with older settings still verify.
    pub fn verify_password(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        let parsed = PasswordHash::new(hash).map_err(|_| AuthError::PasswordHashError)?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }

    pub async fn hash_password_blocking(&self, password: &str) -> Result<String, AuthError> {
        let service = self.clone();
        let password = password.to_string();
        task::spawn_blocking(move || service.hash_password(&password))
            .await
            .map_err(|_| AuthError::PasswordHashError)?
    }

    pub async fn verify_password_blocking(
        &self,
        password: &str,
        hash: &str,
    ) -> Result<bool, AuthError> {
        let service = self.clone();
        let password = password.to_string();
        let hash = hash.to_string();
        task::spawn_blocking(move || service.verify_password(&password, &hash))
            .await
            .map_err(|_| AuthError::PasswordHashError)?
    }

    /// Burn one verification against a throwaway hash
    ///
    /// Used when the username does not exist so the response takes as long
    /// as a real password mismatch.
    pub async fn equalize_timing(&self, password: &str) -> Result<(), AuthError> {
        let dummy = match self.dummy_hash.get() {
            Some(hash) => hash.clone(),
            None => {
                let hash = self.hash_password_blocking("store-auth-timing-equalizer").await?;
                self.dummy_hash.get_or_init(|| hash).clone()
            }
        };
        self.verify_password_blocking(password, &dummy).await?;
        Ok(())
    }
}

impl Default for PasswordService {
    fn default() -> Self {
        Self::new(PasswordHashParams::default())
    }
}
